//! Inference configuration
//!
//! Read from a `pyinfer.toml` file; every field is optional.
//!
//! ```toml
//! infer_parameters = true
//! unbound_as_none = true
//! builtins_as_any = ["__builtins__", "_"]
//! ```

use crate::error::{InferError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File name looked up in a project root
pub const CONFIG_FILE_NAME: &str = "pyinfer.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferConfig {
    /// Derive parameter types from their usage inside the function body.
    /// When disabled every unannotated parameter is `Any`.
    pub infer_parameters: bool,
    /// A variable that may be unbound along some path also holds `None`
    pub unbound_as_none: bool,
    /// Report `__init__` methods that return a value
    pub check_constructor_returns: bool,
    /// Surface `break`/`continue`/`return` placement errors as diagnostics
    pub report_construction_errors: bool,
    /// Extra global names resolved to `Any` instead of being looked up
    pub builtins_as_any: Vec<String>,
}

impl Default for InferConfig {
    fn default() -> Self {
        Self {
            infer_parameters: true,
            unbound_as_none: true,
            check_constructor_returns: true,
            report_construction_errors: true,
            builtins_as_any: Vec::new(),
        }
    }
}

impl InferConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| InferError::io(path, e))?;
        Self::from_toml_str(&content)
    }

    /// Load `pyinfer.toml` from `root` if present, defaults otherwise
    pub fn discover(root: &Path) -> Result<Self> {
        let candidate = root.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            Self::from_file(&candidate)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = InferConfig::from_toml_str("").unwrap();
        assert_eq!(config, InferConfig::default());
        assert!(config.infer_parameters);
    }

    #[test]
    fn test_partial_config() {
        let config = InferConfig::from_toml_str(
            r#"
infer_parameters = false
builtins_as_any = ["__file__"]
"#,
        )
        .unwrap();
        assert!(!config.infer_parameters);
        assert!(config.unbound_as_none);
        assert_eq!(config.builtins_as_any, vec!["__file__".to_string()]);
    }

    #[test]
    fn test_invalid_config_is_error() {
        let err = InferConfig::from_toml_str("infer_parameters = 3").unwrap_err();
        assert!(matches!(err, InferError::Config(_)));
    }

    #[test]
    fn test_discover_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = InferConfig::discover(dir.path()).unwrap();
        assert_eq!(config, InferConfig::default());
    }

    #[test]
    fn test_discover_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "unbound_as_none = false\n").unwrap();
        let config = InferConfig::discover(dir.path()).unwrap();
        assert!(!config.unbound_as_none);
    }
}
