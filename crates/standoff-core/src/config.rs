//! Standoff Configuration Management
//!
//! Handles configuration from TOML files and environment variables, with
//! defaults that reproduce the plain library behavior.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::relations::{DistanceThreshold, NegativeSampling, DEFAULT_NO_RELATION_LABEL};

/// Main toolkit configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct KitConfig {
    /// Relation row generation
    pub relations: RelationConfig,

    /// Token label generation
    pub labeling: LabelingConfig,

    /// Corpus discovery and validation
    pub corpus: CorpusConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl KitConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_overrides(|key| std::env::var(key).ok())
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Reject values no operation can work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.relations.no_relation_label.is_empty() {
            return Err(ConfigError::MissingRequired(
                "relations.no_relation_label".to_string(),
            ));
        }
        if self.labeling.outside_label.is_empty() {
            return Err(ConfigError::MissingRequired("labeling.outside_label".to_string()));
        }
        Ok(())
    }

    fn apply_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Relations
        if let Some(label) = lookup("STANDOFF_NO_RELATION_LABEL") {
            self.relations.no_relation_label = label;
        }
        if let Some(negatives) = lookup("STANDOFF_NEGATIVES") {
            self.relations.negatives = negatives.parse().map_err(|_| ConfigError::InvalidValue {
                key: "STANDOFF_NEGATIVES".to_string(),
                value: negatives,
            })?;
        }
        if let Some(seed) = lookup("STANDOFF_SEED") {
            self.relations.seed = Some(seed.parse().map_err(|_| ConfigError::InvalidValue {
                key: "STANDOFF_SEED".to_string(),
                value: seed,
            })?);
        }

        // Corpus
        if let Some(flag) = lookup("STANDOFF_RECURSIVE") {
            self.corpus.recursive = parse_flag("STANDOFF_RECURSIVE", flag)?;
        }
        if let Some(flag) = lookup("STANDOFF_SKIP_ERRORS") {
            self.corpus.skip_errors = parse_flag("STANDOFF_SKIP_ERRORS", flag)?;
        }

        // Logging
        if let Some(level) = lookup("STANDOFF_LOG_LEVEL") {
            self.logging.level = level;
        }

        self.validate()?;
        Ok(self)
    }
}

fn parse_flag(key: &str, value: String) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        }),
    }
}

/// Relation row configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationConfig {
    /// Label for entity pairs with no direct relation
    pub no_relation_label: String,

    /// Negative sampling: "all", "auto" or a count
    pub negatives: NegativeSampling,

    /// Either one threshold or a nested per-type-pair table
    pub distance_threshold: DistanceThreshold,

    /// Seed for negative sampling
    pub seed: Option<u64>,
}

impl Default for RelationConfig {
    fn default() -> Self {
        Self {
            no_relation_label: DEFAULT_NO_RELATION_LABEL.to_string(),
            negatives: NegativeSampling::All,
            distance_threshold: DistanceThreshold::Uniform(0),
            seed: None,
        }
    }
}

/// Token label configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelingConfig {
    /// Label for tokens outside every entity
    pub outside_label: String,

    /// Only label entities of these types
    pub filter_labels: Option<Vec<String>>,

    /// Label scheme
    pub scheme: LabelScheme,
}

impl Default for LabelingConfig {
    fn default() -> Self {
        Self {
            outside_label: "O".to_string(),
            filter_labels: None,
            scheme: LabelScheme::Plain,
        }
    }
}

/// How entity types are written onto tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelScheme {
    /// Every covered token carries the bare entity type
    #[default]
    Plain,
    /// First token gets `B-type`, the rest `I-type`
    Bio,
}

impl std::str::FromStr for LabelScheme {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plain" => Ok(Self::Plain),
            "bio" => Ok(Self::Bio),
            _ => Err(ConfigError::InvalidValue {
                key: "labeling.scheme".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Corpus configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// Search sub-directories for annotation files
    pub recursive: bool,

    /// Log and skip unreadable documents instead of failing
    pub skip_errors: bool,

    /// Compare trimmed entity content during validation
    pub strip_content: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = KitConfig::default();
        assert_eq!(config.relations.no_relation_label, "NO_RELATION");
        assert_eq!(config.relations.negatives, NegativeSampling::All);
        assert_eq!(config.relations.distance_threshold, DistanceThreshold::Uniform(0));
        assert_eq!(config.labeling.outside_label, "O");
        assert_eq!(config.labeling.scheme, LabelScheme::Plain);
        assert!(!config.corpus.recursive);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_label_scheme_parse() {
        assert_eq!("BIO".parse::<LabelScheme>().unwrap(), LabelScheme::Bio);
        assert_eq!("plain".parse::<LabelScheme>().unwrap(), LabelScheme::Plain);
        assert!("iob2".parse::<LabelScheme>().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let config = KitConfig::default()
            .apply_overrides(lookup(&[
                ("STANDOFF_NEGATIVES", "auto"),
                ("STANDOFF_SEED", "42"),
                ("STANDOFF_RECURSIVE", "true"),
                ("STANDOFF_LOG_LEVEL", "debug"),
            ]))
            .unwrap();
        assert_eq!(config.relations.negatives, NegativeSampling::Auto);
        assert_eq!(config.relations.seed, Some(42));
        assert!(config.corpus.recursive);
        assert!(!config.corpus.skip_errors);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_env_invalid_values() {
        let err = KitConfig::default()
            .apply_overrides(lookup(&[("STANDOFF_SEED", "abc")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "STANDOFF_SEED"));

        let err = KitConfig::default()
            .apply_overrides(lookup(&[("STANDOFF_NO_RELATION_LABEL", "")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[relations]
negatives = 5
seed = 7

[relations.distance_threshold.Protein]
Entity = 120

[labeling]
scheme = "bio"
filter_labels = ["Protein"]
"#
        )
        .unwrap();

        let config = KitConfig::from_file(file.path()).unwrap();
        assert_eq!(config.relations.negatives, NegativeSampling::Limit(5));
        assert_eq!(config.relations.seed, Some(7));
        assert_eq!(config.relations.distance_threshold.for_pair("Entity", "Protein"), 120);
        assert_eq!(config.relations.no_relation_label, "NO_RELATION");
        assert_eq!(config.labeling.scheme, LabelScheme::Bio);
        assert_eq!(config.labeling.filter_labels, Some(vec!["Protein".to_string()]));
        assert_eq!(config.labeling.outside_label, "O");
    }

    #[test]
    fn test_from_file_keyword_negatives() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[relations]\nnegatives = \"auto\"\ndistance_threshold = 50").unwrap();
        let config = KitConfig::from_file(file.path()).unwrap();
        assert_eq!(config.relations.negatives, NegativeSampling::Auto);
        assert_eq!(config.relations.distance_threshold, DistanceThreshold::Uniform(50));
    }

    #[test]
    fn test_from_file_errors() {
        let missing = KitConfig::from_file("/nonexistent/standoff.toml").unwrap_err();
        assert!(matches!(missing, ConfigError::FileReadError { .. }));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[relations]\nnegatives = \"some\"").unwrap();
        let bad = KitConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(bad, ConfigError::ParseError { .. }));
    }
}
