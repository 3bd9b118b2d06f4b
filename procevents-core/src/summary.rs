// Summary configuration and the per-event field summarizer

use crate::model::{display_value, EventRecord};
use crate::transforms::TransformRegistry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read summary file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse summary file {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("summary file {path}: attribute '{attribute}' uses unknown transform '{transform}' (known transforms: {known})")]
    UnknownTransform {
        path: PathBuf,
        attribute: String,
        transform: String,
        known: String,
    },
}

/// Which attributes to surface per event type, and how to transform them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryConfig {
    pub types: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub transforms: HashMap<String, String>,
}

impl SummaryConfig {
    /// Load a summary file (JSON, or TOML when the extension is `.toml`) and
    /// check that every transform it names is registered.
    pub fn load<P: AsRef<Path>>(path: P, registry: &TransformRegistry) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let is_toml = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);

        let config = if is_toml {
            Self::from_toml_str(&content)
        } else {
            Self::from_json_str(&content)
        }
        .map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })?;

        config.validate(path, registry)?;
        debug!(
            "Loaded summary file {} with {} event types and {} transforms",
            path.display(),
            config.types.len(),
            config.transforms.len()
        );
        Ok(config)
    }

    pub fn from_json_str(s: &str) -> Result<Self, String> {
        serde_json::from_str(s).map_err(|e| e.to_string())
    }

    pub fn from_toml_str(s: &str) -> Result<Self, String> {
        toml::from_str(s).map_err(|e| e.to_string())
    }

    fn validate(&self, path: &Path, registry: &TransformRegistry) -> Result<(), ConfigError> {
        let mut attributes: Vec<&String> = self.transforms.keys().collect();
        attributes.sort();

        for attribute in attributes {
            let transform = &self.transforms[attribute];
            if !registry.contains(transform) {
                return Err(ConfigError::UnknownTransform {
                    path: path.to_path_buf(),
                    attribute: attribute.clone(),
                    transform: transform.clone(),
                    known: registry.names().join(", "),
                });
            }
        }
        Ok(())
    }
}

/// Why part of a summary could not be produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryIssue {
    UnknownEventType {
        event_type: String,
    },
    MissingAttribute {
        event_type: String,
        attribute: String,
    },
    UnknownTransform {
        event_type: String,
        attribute: String,
        transform: String,
    },
    TransformFailed {
        event_type: String,
        attribute: String,
        reason: String,
    },
}

impl std::fmt::Display for SummaryIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SummaryIssue::UnknownEventType { event_type } => {
                write!(f, "The event type '{}' is not listed in the summary file", event_type)
            }
            SummaryIssue::MissingAttribute { event_type, attribute } => write!(
                f,
                "The attribute '{}' does not exist for event type '{}'",
                attribute, event_type
            ),
            SummaryIssue::UnknownTransform {
                event_type,
                attribute,
                transform,
            } => write!(
                f,
                "The transform '{}' for attribute '{}' of event type '{}' is not registered",
                transform, attribute, event_type
            ),
            SummaryIssue::TransformFailed {
                event_type,
                attribute,
                reason,
            } => write!(
                f,
                "Could not transform attribute '{}' of event type '{}': {}",
                attribute, event_type, reason
            ),
        }
    }
}

/// A produced summary and everything that was skipped while building it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub text: String,
    pub issues: Vec<SummaryIssue>,
}

pub struct Summarizer {
    config: SummaryConfig,
    registry: TransformRegistry,
    source: String,
}

impl Summarizer {
    /// `source` names where the config came from and is quoted in warnings.
    pub fn new(config: SummaryConfig, registry: TransformRegistry, source: impl Into<String>) -> Self {
        Self {
            config,
            registry,
            source: source.into(),
        }
    }

    /// Load the summary file with the builtin transforms.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let registry = TransformRegistry::builtin();
        let config = SummaryConfig::load(path.as_ref(), &registry)?;
        Ok(Self::new(config, registry, path.as_ref().display().to_string()))
    }

    pub fn config(&self) -> &SummaryConfig {
        &self.config
    }

    /// Human-readable summary of the configured attributes. Never fails.
    pub fn summarize(&self, event: &EventRecord) -> String {
        self.summarize_detailed(event).text
    }

    pub fn summarize_detailed(&self, event: &EventRecord) -> Summary {
        let mut summary = Summary::default();
        let event_type = event.event_type().unwrap_or_default();

        let Some(attributes) = self.config.types.get(event_type) else {
            self.record(
                &mut summary,
                SummaryIssue::UnknownEventType {
                    event_type: event_type.to_string(),
                },
            );
            return summary;
        };

        for attribute in attributes {
            let Some(value) = event.get(attribute) else {
                self.record(
                    &mut summary,
                    SummaryIssue::MissingAttribute {
                        event_type: event_type.to_string(),
                        attribute: attribute.clone(),
                    },
                );
                continue;
            };

            let rendered = match self.config.transforms.get(attribute) {
                None => display_value(value),
                Some(name) => match self.registry.get(name) {
                    None => {
                        self.record(
                            &mut summary,
                            SummaryIssue::UnknownTransform {
                                event_type: event_type.to_string(),
                                attribute: attribute.clone(),
                                transform: name.clone(),
                            },
                        );
                        continue;
                    }
                    Some(transform) => match transform(value) {
                        Ok(rendered) => rendered,
                        Err(e) => {
                            self.record(
                                &mut summary,
                                SummaryIssue::TransformFailed {
                                    event_type: event_type.to_string(),
                                    attribute: attribute.clone(),
                                    reason: e.to_string(),
                                },
                            );
                            continue;
                        }
                    },
                },
            };

            summary.text.push_str(&format!(" {}: {}", attribute, rendered));
        }

        summary
    }

    fn record(&self, summary: &mut Summary, issue: SummaryIssue) {
        warn!("{}. Review the summary file {}", issue, self.source);
        summary.issues.push(issue);
    }
}
