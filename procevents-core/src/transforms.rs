//! Named value transforms applied to summary attributes.

use serde_json::Value;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum TransformError {
    #[error("expected an integer, got {0}")]
    NotAnInteger(String),
    #[error("value {0} does not fit in 32 bits")]
    OutOfRange(i64),
}

/// A pure function mapping one raw field value to its display form.
pub type TransformFn = fn(&Value) -> Result<String, TransformError>;

/// Explicit lookup table from transform name to function.
#[derive(Debug, Clone, Default)]
pub struct TransformRegistry {
    transforms: HashMap<String, TransformFn>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every transform shipped with the crate.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("int2ip", int2ip);
        registry
    }

    pub fn register(&mut self, name: &str, transform: TransformFn) {
        self.transforms.insert(name.to_string(), transform);
    }

    pub fn get(&self, name: &str) -> Option<TransformFn> {
        self.transforms.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.transforms.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.transforms.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Render an IPv4 address reported as a 32-bit integer in dotted-decimal form.
///
/// The event source reports addresses as signed 32-bit integers, so negative
/// values are read as the two's-complement bit pattern.
pub fn int2ip(value: &Value) -> Result<String, TransformError> {
    let raw = match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| TransformError::NotAnInteger(n.to_string()))?,
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| TransformError::NotAnInteger(s.clone()))?,
        other => return Err(TransformError::NotAnInteger(other.to_string())),
    };

    if raw < i64::from(i32::MIN) || raw > i64::from(u32::MAX) {
        return Err(TransformError::OutOfRange(raw));
    }

    Ok(Ipv4Addr::from(raw as u32).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_int2ip_unsigned() {
        assert_eq!(int2ip(&json!(3232235521u64)).unwrap(), "192.168.0.1");
        assert_eq!(int2ip(&json!(0)).unwrap(), "0.0.0.0");
        assert_eq!(int2ip(&json!(4294967295u64)).unwrap(), "255.255.255.255");
    }

    #[test]
    fn test_int2ip_signed() {
        assert_eq!(int2ip(&json!(-1062731775)).unwrap(), "192.168.0.1");
        assert_eq!(int2ip(&json!(-1)).unwrap(), "255.255.255.255");
        assert_eq!(int2ip(&json!(16777343)).unwrap(), "1.0.0.127");
    }

    #[test]
    fn test_int2ip_string_input() {
        assert_eq!(int2ip(&json!("3232235521")).unwrap(), "192.168.0.1");
    }

    #[test]
    fn test_int2ip_rejects_bad_input() {
        assert_eq!(
            int2ip(&json!("10.0.0.1")),
            Err(TransformError::NotAnInteger("10.0.0.1".into()))
        );
        assert!(matches!(int2ip(&json!(1.5)), Err(TransformError::NotAnInteger(_))));
        assert!(matches!(int2ip(&json!(null)), Err(TransformError::NotAnInteger(_))));
        assert_eq!(
            int2ip(&json!(4294967296u64)),
            Err(TransformError::OutOfRange(4294967296))
        );
    }

    #[test]
    fn test_registry_lookup() {
        let registry = TransformRegistry::builtin();
        assert!(registry.contains("int2ip"));
        assert!(registry.get("does_not_exist").is_none());

        let transform = registry.get("int2ip").unwrap();
        assert_eq!(transform(&json!(3232235521u64)).unwrap(), "192.168.0.1");
    }

    #[test]
    fn test_registry_custom_transform() {
        fn upper(value: &Value) -> Result<String, TransformError> {
            Ok(value.as_str().unwrap_or_default().to_uppercase())
        }

        let mut registry = TransformRegistry::builtin();
        registry.register("upper", upper);
        assert_eq!(registry.names(), vec!["int2ip", "upper"]);
    }
}
