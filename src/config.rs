use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub trialgraph: TrialGraphConfig,
    #[serde(default)]
    pub annotator: AnnotatorConfig,
    #[serde(default)]
    pub document: DocumentConfig,
}

/// Paths and logging for a build
#[derive(Debug, Clone, Deserialize)]
pub struct TrialGraphConfig {
    /// Directory holding the study records (`.xml` or `.json`) to build graphs from.
    pub source_folder: PathBuf,
    pub db_path: PathBuf,
    /// Where the parsed document and the annotation record are written per document.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// CoreNLP server settings
#[derive(Debug, Clone, Deserialize)]
pub struct AnnotatorConfig {
    #[serde(default = "default_annotator_url")]
    pub url: String,
    #[serde(default = "default_annotators")]
    pub annotators: String,
    #[serde(default = "default_boundary_token_regex")]
    pub boundary_token_regex: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            url: default_annotator_url(),
            annotators: default_annotators(),
            boundary_token_regex: default_boundary_token_regex(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Field names that steer the document walk
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentConfig {
    /// Path to the document id, outermost key first.
    #[serde(default = "default_id_path")]
    pub id_path: Vec<String>,
    /// Subtrees under these keys are never visited.
    #[serde(default = "default_skip_fields")]
    pub skip_fields: Vec<String>,
    /// Keys whose string value is free prose.
    #[serde(default = "default_prose_fields")]
    pub prose_fields: Vec<String>,
    /// Key of the eligibility block that is split into inclusion/exclusion sections.
    #[serde(default = "default_criteria_field")]
    pub criteria_field: String,
    #[serde(default = "default_exclusion_marker")]
    pub exclusion_marker: String,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            id_path: default_id_path(),
            skip_fields: default_skip_fields(),
            prose_fields: default_prose_fields(),
            criteria_field: default_criteria_field(),
            exclusion_marker: default_exclusion_marker(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("out")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_annotator_url() -> String {
    "http://localhost:9000".to_string()
}

fn default_annotators() -> String {
    "tokenize,ssplit,pos,lemma,parse".to_string()
}

fn default_boundary_token_regex() -> String {
    "\\.|;|\n".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_id_path() -> Vec<String> {
    vec![
        "clinical_study".to_string(),
        "id_info".to_string(),
        "nct_id".to_string(),
    ]
}

fn default_skip_fields() -> Vec<String> {
    vec!["brief_summary".to_string()]
}

fn default_prose_fields() -> Vec<String> {
    vec!["textblock".to_string(), "description".to_string()]
}

fn default_criteria_field() -> String {
    "criteria".to_string()
}

fn default_exclusion_marker() -> String {
    "Exclusion Criteria".to_string()
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in TRIALGRAPH_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        let _ = dotenv::dotenv();

        let config_path = std::env::var("TRIALGRAPH_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config = Self::from_toml(&config_str)?;
        config.validate()?;

        Ok(config)
    }

    /// Parse configuration text without touching the filesystem
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse config.toml")
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        let source = &self.trialgraph.source_folder;
        if !source.exists() {
            anyhow::bail!(
                "source_folder path does not exist: {}. Set source_folder in config.toml to your study records directory.",
                source.display()
            );
        }

        if !source.is_dir() {
            anyhow::bail!("source_folder must be a directory, not a file: {}", source.display());
        }

        url::Url::parse(&self.annotator.url)
            .with_context(|| format!("annotator.url is not a valid URL: {}", self.annotator.url))?;

        if self.annotator.timeout_secs == 0 {
            anyhow::bail!("annotator.timeout_secs must be greater than 0");
        }

        if self.document.id_path.is_empty() {
            anyhow::bail!("document.id_path must name at least one field");
        }

        Ok(())
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.trialgraph.db_path
    }

    /// Get the directory holding study records
    pub fn source_folder(&self) -> &Path {
        &self.trialgraph.source_folder
    }

    /// Get the debug output directory
    pub fn output_dir(&self) -> &Path {
        &self.trialgraph.output_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serialize config tests that mutate process-wide env so they don't race.
    static CONFIG_TEST_LOCK: Mutex<()> = Mutex::new(());

    fn create_test_config(temp_dir: &TempDir) -> String {
        let source = temp_dir.path().canonicalize().unwrap();
        let source_str = source.to_str().unwrap().replace('\\', "\\\\");
        format!(
            r#"
[trialgraph]
source_folder = "{}"
db_path = "./test.db"
log_level = "debug"

[annotator]
url = "http://corenlp.internal:9000"
"#,
            source_str
        )
    }

    fn with_config_env(config_path: &std::path::Path, f: impl FnOnce()) {
        let original = std::env::var("TRIALGRAPH_CONFIG").ok();
        std::env::set_var("TRIALGRAPH_CONFIG", config_path.to_str().unwrap());
        f();
        std::env::remove_var("TRIALGRAPH_CONFIG");
        if let Some(val) = original {
            std::env::set_var("TRIALGRAPH_CONFIG", val);
        }
    }

    #[test]
    fn test_config_load_success() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, create_test_config(&temp_dir)).unwrap();

        with_config_env(&config_path, || {
            let config = Config::load();
            assert!(config.is_ok(), "Config::load() failed: {:?}", config.err());
            let config = config.unwrap();
            assert_eq!(config.trialgraph.log_level, "debug");
            assert_eq!(config.annotator.url, "http://corenlp.internal:9000");
            assert_eq!(config.annotator.timeout_secs, 120);
            assert_eq!(config.output_dir(), Path::new("out"));
        });
    }

    #[test]
    fn test_document_defaults() {
        let config = Config::from_toml(
            r#"
[trialgraph]
source_folder = "xml"
db_path = "graph.db"
"#,
        )
        .unwrap();
        assert_eq!(config.document.id_path, vec!["clinical_study", "id_info", "nct_id"]);
        assert_eq!(config.document.skip_fields, vec!["brief_summary"]);
        assert_eq!(config.document.prose_fields, vec!["textblock", "description"]);
        assert_eq!(config.document.criteria_field, "criteria");
        assert_eq!(config.document.exclusion_marker, "Exclusion Criteria");
        assert_eq!(config.annotator.boundary_token_regex, "\\.|;|\n");
    }

    #[test]
    fn test_config_rejects_bad_url() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let content = create_test_config(&temp_dir)
            .replace("http://corenlp.internal:9000", "not a url");
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, content).unwrap();

        with_config_env(&config_path, || {
            let err = Config::load().unwrap_err();
            assert!(err.to_string().contains("annotator.url"));
        });
    }

    #[test]
    fn test_config_missing_source_folder() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(
            &config_path,
            "[trialgraph]\nsource_folder = \"/definitely/not/here\"\ndb_path = \"x.db\"\n",
        )
        .unwrap();

        with_config_env(&config_path, || {
            let err = Config::load().unwrap_err();
            assert!(err.to_string().contains("source_folder"));
        });
    }

    #[test]
    fn test_config_invalid_path() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        with_config_env(Path::new("nonexistent.toml"), || {
            assert!(Config::load().is_err());
        });
    }
}
