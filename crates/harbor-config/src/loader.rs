//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for assembling the structured
//! document from multiple sources: defaults, files, inline strings, a `.env`
//! file and environment variables.

use serde_json::Value;
use std::env;
use std::path::Path;

use crate::{ConfigError, HarborConfig, StructuredConfig};

/// Configuration loader with layered approach.
///
/// Layers are applied in order, later ones overriding earlier ones:
/// 1. Defaults (an empty document, or one given with [`with_defaults`](Self::with_defaults))
/// 2. Configuration files (TOML or JSON), deep-merged
/// 3. Inline strings
/// 4. Environment variables `PREFIX__SECTION__KEY`
///
/// # Example
///
/// ```no_run
/// use harbor_config::ConfigLoader;
///
/// # fn main() -> Result<(), harbor_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_file("harbor.toml")?
///     .with_env_prefix("HARBOR")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ConfigLoader {
    document: StructuredConfig,
    env_prefix: Option<String>,
    env_vars: Option<Vec<(String, String)>>,
}

impl ConfigLoader {
    /// Create a new configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the base layer.
    #[must_use]
    pub fn with_defaults(mut self, defaults: StructuredConfig) -> Self {
        self.document = defaults;
        self
    }

    /// Merge a configuration file.
    ///
    /// Supports TOML (.toml) and JSON (.json); the format is determined by
    /// the file extension.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file does not exist, cannot be read or
    /// contains invalid TOML/JSON.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let layer = StructuredConfig::from_file(path)?;
        self.document.merge(layer);
        Ok(self)
    }

    /// Merge a configuration file if it exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be parsed.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Merge configuration from a string.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if parsing fails.
    ///
    /// # Example
    ///
    /// ```
    /// use harbor_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     [app]
    ///     name = "orders"
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.value("app.name").and_then(|v| v.as_str()), Some("orders"));
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        let layer = StructuredConfig::parse(content, format)?;
        self.document.merge(layer);
        Ok(self)
    }

    /// Set environment variable prefix for overrides.
    ///
    /// Variables use the format `PREFIX__SECTION__KEY`; segments are
    /// lower-cased and numeric segments index arrays:
    /// - `HARBOR__DATA__CACHES__ACTIVE=memB`
    /// - `HARBOR__MIDDLEWARES__CONFIGS__0__ENABLED=false`
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Use an explicit variable set instead of the process environment.
    #[must_use]
    pub fn with_env_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env_vars = Some(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Load a `.env` file into the process environment.
    ///
    /// A missing `.env` file is not an error.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be parsed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(e) if e.not_found() => Ok(self),
            Err(e) => Err(ConfigError::env_parse_error(".env", e.to_string())),
        }
    }

    /// Finalize: apply environment overrides and validate identities.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override is malformed or a group entry has
    /// an empty identity.
    pub fn load(self) -> Result<StructuredConfig, ConfigError> {
        let document = self.load_unvalidated()?;
        let typed: HarborConfig = document.decode_or_default("")?;
        typed.validate()?;
        Ok(document)
    }

    /// Finalize without validation.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override is malformed.
    pub fn load_unvalidated(mut self) -> Result<StructuredConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            let vars = self
                .env_vars
                .take()
                .unwrap_or_else(|| env::vars().collect());
            self.apply_env_overrides(&prefix, vars)?;
        }
        Ok(self.document)
    }

    // Apply environment variable overrides
    fn apply_env_overrides(
        &mut self,
        prefix: &str,
        vars: Vec<(String, String)>,
    ) -> Result<(), ConfigError> {
        let mut matching: Vec<(String, String)> = vars
            .into_iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .collect();
        // Deterministic order so array appends land predictably.
        matching.sort();

        for (key, value) in matching {
            self.apply_env_var(&key, &value, prefix)?;
        }
        Ok(())
    }

    // Apply a single environment variable
    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let key_without_prefix = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ConfigError::env_parse_error(key, "invalid key format"))?;

        let path = key_without_prefix
            .split("__")
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(".");

        self.document
            .set(&path, parse_env_value(value))
            .map_err(|e| ConfigError::env_parse_error(key, e.to_string()))
    }
}

/// Parses an override value: bool, integer, float, inline JSON array/object,
/// or a plain string.
fn parse_env_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    match trimmed {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        if f.is_finite() {
            return Value::from(f);
        }
    }
    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        if let Ok(v) = serde_json::from_str(trimmed) {
            return v;
        }
    }
    Value::String(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_is_empty_document() {
        let cfg = ConfigLoader::new().load().unwrap();
        assert_eq!(cfg.root(), &json!({}));
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            r#"
            [app]
            name = "orders"

            [[data.caches.configs]]
            name = "memA"
            driver = "memory"
            "#
        )
        .unwrap();

        let cfg = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();
        assert_eq!(cfg.value("app.name"), Some(&json!("orders")));
        assert_eq!(cfg.value("data.caches.configs.0.driver"), Some(&json!("memory")));
    }

    #[test]
    fn test_load_from_json_file() {
        let mut file = NamedTempFile::with_suffix(".json").unwrap();
        writeln!(file, r#"{{ "app": {{ "name": "billing" }} }}"#).unwrap();

        let cfg = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();
        assert_eq!(cfg.value("app.name"), Some(&json!("billing")));
    }

    #[test]
    fn test_file_not_found() {
        let result = ConfigLoader::new().with_file("/nonexistent/harbor.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_optional_file_missing() {
        let cfg = ConfigLoader::new()
            .with_optional_file("/nonexistent/harbor.toml")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(cfg.root(), &json!({}));
    }

    #[test]
    fn test_layers_deep_merge() {
        let cfg = ConfigLoader::new()
            .with_string(r#"{"app": {"name": "orders", "version": "1"}}"#, "json")
            .unwrap()
            .with_string("[app]\nversion = \"2\"", "toml")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(cfg.value("app.name"), Some(&json!("orders")));
        assert_eq!(cfg.value("app.version"), Some(&json!("2")));
    }

    #[test]
    fn test_env_overrides() {
        let cfg = ConfigLoader::new()
            .with_string(
                r#"{"data": {"caches": {"configs": [{"name": "memA", "driver": "memory"}]}}}"#,
                "json",
            )
            .unwrap()
            .with_env_prefix("HARBOR")
            .with_env_vars([
                ("HARBOR__DATA__CACHES__ACTIVE", "memA"),
                ("HARBOR__DATA__CACHES__CONFIGS__0__ENABLED", "false"),
                ("HARBOR__APP__METADATA__REPLICAS", "3"),
                ("OTHER__APP__NAME", "ignored"),
            ])
            .load()
            .unwrap();

        assert_eq!(cfg.value("data.caches.active"), Some(&json!("memA")));
        assert_eq!(cfg.value("data.caches.configs.0.enabled"), Some(&json!(false)));
        assert_eq!(cfg.value("app.metadata.replicas"), Some(&json!(3)));
        assert!(cfg.value("app.name").is_none());
    }

    #[test]
    fn test_env_invalid_key() {
        let result = ConfigLoader::new()
            .with_env_prefix("HARBOR")
            .with_env_vars([("HARBOR__", "x")])
            .load();
        assert!(matches!(result, Err(ConfigError::EnvParseError { .. })));
    }

    #[test]
    fn test_load_rejects_empty_identity() {
        let result = ConfigLoader::new()
            .with_string(r#"{"middlewares": {"configs": [{"enabled": true}]}}"#, "json")
            .unwrap()
            .load();
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_parse_env_value() {
        assert_eq!(parse_env_value("true"), json!(true));
        assert_eq!(parse_env_value("42"), json!(42));
        assert_eq!(parse_env_value("1.5"), json!(1.5));
        assert_eq!(parse_env_value("[\"a\",\"b\"]"), json!(["a", "b"]));
        assert_eq!(parse_env_value("memory"), json!("memory"));
    }
}
