// Configuration document loading shared by every sightline crate

use serde::de::DeserializeOwned;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::ParseError(e) => write!(f, "Parse error: {}", e),
            ConfigError::ValidationError(e) => write!(f, "Validation error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for crate::Error {
    fn from(err: ConfigError) -> Self {
        crate::Error::Configuration(err.to_string())
    }
}

/// Load a configuration document from disk.
///
/// The format is picked from the extension (`.toml`, `.yaml`/`.yml`, `.json`);
/// unknown extensions are tried in that order.
pub fn load_document<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string())),
        Some("yaml") | Some("yml") => {
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
        }
        Some("json") => {
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
        }
        _ => parse_document(&content),
    }
}

/// Parse a configuration document of unknown format
pub fn parse_document<T: DeserializeOwned>(content: &str) -> Result<T, ConfigError> {
    if let Ok(config) = toml::from_str::<T>(content) {
        return Ok(config);
    }

    if let Ok(config) = serde_yaml::from_str::<T>(content) {
        return Ok(config);
    }

    if let Ok(config) = serde_json::from_str::<T>(content) {
        return Ok(config);
    }

    Err(ConfigError::ParseError("Unknown format".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        name: String,
        port: u16,
    }

    #[test]
    fn test_parse_toml_and_yaml() {
        let toml_doc: Sample = parse_document("name = \"a\"\nport = 8\n").unwrap();
        assert_eq!(toml_doc, Sample { name: "a".to_string(), port: 8 });

        let yaml_doc: Sample = parse_document("name: b\nport: 9\n").unwrap();
        assert_eq!(yaml_doc, Sample { name: "b".to_string(), port: 9 });
    }

    #[test]
    fn test_parse_garbage() {
        let result = parse_document::<Sample>("[[[");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_document_by_extension() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "name = \"cam\"").unwrap();
        writeln!(file, "port = 5000").unwrap();

        let doc: Sample = load_document(file.path()).unwrap();
        assert_eq!(doc.port, 5000);
    }

    #[test]
    fn test_load_document_missing_file() {
        let result = load_document::<Sample>("/nonexistent/sightline.toml");
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }
}
