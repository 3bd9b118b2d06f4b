//! Carbon Black Cloud profile loading.
//!
//! Profiles live in INI credentials files, one `[section]` per profile with
//! `url`, `token`, `org_key` and optional `ssl_verify` keys. All files on the
//! search path are merged, the first file listed winning for each key.
//! `CBC_URL`, `CBC_TOKEN` and `CBC_ORG_KEY` override the file values.

use ini::Ini;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

const CREDENTIALS_FILE: &str = "credentials.cbc";

#[derive(Error, Debug)]
pub enum CredentialsError {
    #[error("failed to read credentials file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid line {line} in credentials file {path}: {message}")]
    Syntax {
        path: PathBuf,
        line: usize,
        message: String,
    },
    #[error("profile '{profile}' not found (searched: {searched})")]
    ProfileNotFound { profile: String, searched: String },
    #[error("profile '{profile}' is missing '{key}' (searched: {searched})")]
    MissingKey {
        profile: String,
        key: &'static str,
        searched: String,
    },
}

#[derive(Clone, PartialEq, Eq)]
pub struct CbcCredentials {
    pub url: String,
    pub token: String,
    pub org_key: String,
    pub ssl_verify: bool,
}

impl std::fmt::Debug for CbcCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CbcCredentials")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("org_key", &self.org_key)
            .field("ssl_verify", &self.ssl_verify)
            .finish()
    }
}

impl CbcCredentials {
    /// Resolve `profile` from `explicit` (when given) or the default search
    /// paths, then apply environment overrides.
    pub fn load(profile: &str, explicit: Option<&Path>) -> Result<Self, CredentialsError> {
        let candidates = match explicit {
            Some(path) => vec![path.to_path_buf()],
            None => Self::default_paths(),
        };
        Self::resolve(profile, &candidates, explicit.is_some(), |key| std::env::var(key).ok())
    }

    /// `./.carbonblack`, then the home directory, then `/etc/carbonblack`.
    pub fn default_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".carbonblack").join(CREDENTIALS_FILE)];
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".carbonblack").join(CREDENTIALS_FILE));
        }
        paths.push(PathBuf::from("/etc/carbonblack").join(CREDENTIALS_FILE));
        paths
    }

    fn resolve<F>(profile: &str, candidates: &[PathBuf], required: bool, env: F) -> Result<Self, CredentialsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let searched = candidates
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");

        // Every existing file contributes; earlier files win key by key.
        let mut profiles: Profiles = HashMap::new();
        let mut read_any = false;
        for path in candidates.iter().filter(|path| required || path.is_file()) {
            debug!("Reading credentials from {}", path.display());
            let content = fs::read_to_string(path).map_err(|source| CredentialsError::Read {
                path: path.clone(),
                source,
            })?;
            let parsed = parse_profiles(&content).map_err(|(line, message)| CredentialsError::Syntax {
                path: path.clone(),
                line,
                message,
            })?;
            merge_profiles(&mut profiles, parsed);
            read_any = true;
        }

        let mut values = match profiles.remove(profile) {
            Some(section) => section,
            // Environment variables may still supply everything.
            None if read_any
                && (env("CBC_URL").is_none() || env("CBC_TOKEN").is_none() || env("CBC_ORG_KEY").is_none()) =>
            {
                return Err(CredentialsError::ProfileNotFound {
                    profile: profile.to_string(),
                    searched,
                });
            }
            None => HashMap::new(),
        };

        for (var, key) in [("CBC_URL", "url"), ("CBC_TOKEN", "token"), ("CBC_ORG_KEY", "org_key")] {
            if let Some(value) = env(var).filter(|v| !v.is_empty()) {
                debug!("Using {} from the environment", var);
                values.insert(key.to_string(), value);
            }
        }

        let take = |values: &mut HashMap<String, String>, key: &'static str| {
            values
                .remove(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| CredentialsError::MissingKey {
                    profile: profile.to_string(),
                    key,
                    searched: searched.clone(),
                })
        };

        let url = take(&mut values, "url")?;
        let token = take(&mut values, "token")?;
        let org_key = take(&mut values, "org_key")?;
        let ssl_verify = values.get("ssl_verify").map(|v| parse_bool(v)).unwrap_or(true);

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            token,
            org_key,
            ssl_verify,
        })
    }
}

type Profiles = HashMap<String, HashMap<String, String>>;

/// Split an INI document into named sections with lowercased keys.
///
/// Keys outside any section are ignored. Errors carry the 1-based line.
fn parse_profiles(content: &str) -> Result<Profiles, (usize, String)> {
    let ini = Ini::load_from_str(content).map_err(|e| (e.line, e.msg.to_string()))?;

    let mut profiles: Profiles = HashMap::new();
    for (section, properties) in ini.iter() {
        let Some(name) = section else { continue };
        let entry = profiles.entry(name.trim().to_string()).or_default();
        for (key, value) in properties.iter() {
            entry.insert(key.trim().to_lowercase(), value.trim().to_string());
        }
    }
    Ok(profiles)
}

/// Fold `later` into `merged` without replacing keys already present.
fn merge_profiles(merged: &mut Profiles, later: Profiles) {
    for (name, section) in later {
        let entry = merged.entry(name).or_default();
        for (key, value) in section {
            entry.entry(key).or_insert(value);
        }
    }
}

fn parse_bool(value: &str) -> bool {
    !matches!(value.trim().to_lowercase().as_str(), "false" | "no" | "0" | "off")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = "\
# Carbon Black Cloud profiles
[default]
url = https://defense-eu.conferdeploy.net/
token = SECRET/APIID
org_key = ORG123

[dev]
url=https://defense-dev.example
token=DEVSECRET/DEVID
org_key=DEVORG
ssl_verify=false
";

    fn file_with(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn sample_file() -> NamedTempFile {
        file_with(SAMPLE)
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_parse_profiles() {
        let profiles = parse_profiles(SAMPLE).unwrap();
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles["dev"]["ssl_verify"], "false");
        assert_eq!(profiles["default"]["org_key"], "ORG123");
    }

    #[test]
    fn test_parse_colon_pairs_and_quotes() {
        let profiles = parse_profiles("orphan = x\n[default]\nURL: https://cbc.example\ntoken = \"S/I\"\n").unwrap();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles["default"]["url"], "https://cbc.example");
        assert_eq!(profiles["default"]["token"], "S/I");
    }

    #[test]
    fn test_resolve_profile_from_file() {
        let file = sample_file();
        let paths = vec![file.path().to_path_buf()];

        let default = CbcCredentials::resolve("default", &paths, true, no_env).unwrap();
        assert_eq!(default.url, "https://defense-eu.conferdeploy.net");
        assert_eq!(default.token, "SECRET/APIID");
        assert!(default.ssl_verify);

        let dev = CbcCredentials::resolve("dev", &paths, true, no_env).unwrap();
        assert_eq!(dev.org_key, "DEVORG");
        assert!(!dev.ssl_verify);
    }

    #[test]
    fn test_environment_overrides_file() {
        let file = sample_file();
        let paths = vec![file.path().to_path_buf()];
        let env = |key: &str| match key {
            "CBC_ORG_KEY" => Some("ENVORG".to_string()),
            _ => None,
        };

        let creds = CbcCredentials::resolve("default", &paths, true, env).unwrap();
        assert_eq!(creds.org_key, "ENVORG");
        assert_eq!(creds.token, "SECRET/APIID");
    }

    #[test]
    fn test_missing_profile() {
        let file = sample_file();
        let paths = vec![file.path().to_path_buf()];

        let err = CbcCredentials::resolve("prod", &paths, true, no_env).unwrap_err();
        assert!(matches!(err, CredentialsError::ProfileNotFound { ref profile, .. } if profile == "prod"));
    }

    #[test]
    fn test_profile_found_in_later_file() {
        let first = file_with("[other]\nurl = https://other.example\ntoken = O/I\norg_key = OTHER\n");
        let second = file_with("[default]\nurl = https://home.example\ntoken = H/I\norg_key = HOME\n");
        let paths = vec![first.path().to_path_buf(), second.path().to_path_buf()];

        let creds = CbcCredentials::resolve("default", &paths, false, no_env).unwrap();
        assert_eq!(creds.url, "https://home.example");
        assert_eq!(creds.org_key, "HOME");
    }

    #[test]
    fn test_earlier_file_wins_per_key() {
        let local = file_with("[default]\norg_key = LOCAL\n");
        let home = file_with("[default]\nurl = https://home.example\ntoken = H/I\norg_key = HOME\n");
        let paths = vec![local.path().to_path_buf(), home.path().to_path_buf()];

        let creds = CbcCredentials::resolve("default", &paths, false, no_env).unwrap();
        assert_eq!(creds.org_key, "LOCAL");
        assert_eq!(creds.token, "H/I");
    }

    #[test]
    fn test_environment_only() {
        let env = |key: &str| match key {
            "CBC_URL" => Some("https://cbc.example".to_string()),
            "CBC_TOKEN" => Some("S/I".to_string()),
            "CBC_ORG_KEY" => Some("ORG".to_string()),
            _ => None,
        };

        let paths = vec![PathBuf::from("/nonexistent/credentials.cbc")];
        let creds = CbcCredentials::resolve("default", &paths, false, env).unwrap();
        assert_eq!(creds.url, "https://cbc.example");

        let err = CbcCredentials::resolve("default", &paths, false, no_env).unwrap_err();
        assert!(matches!(err, CredentialsError::MissingKey { key: "url", .. }));
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let paths = vec![PathBuf::from("/nonexistent/credentials.cbc")];
        let err = CbcCredentials::resolve("default", &paths, true, no_env).unwrap_err();
        assert!(matches!(err, CredentialsError::Read { .. }));
    }

    #[test]
    fn test_debug_redacts_token() {
        let creds = CbcCredentials {
            url: "https://cbc.example".into(),
            token: "SECRET/ID".into(),
            org_key: "ORG".into(),
            ssl_verify: true,
        };
        assert!(!format!("{:?}", creds).contains("SECRET"));
    }
}
