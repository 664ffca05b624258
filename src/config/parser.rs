use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigResult;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and validates a configuration file
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Parsed configuration that passed validation
/// * `Err(ConfigError)` - The file could not be read, parsed, or validated
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use kb_harvest::config::load_config;
///
/// let config = load_config(Path::new("harvest.toml")).unwrap();
/// println!("Jobs configured: {}", config.jobs.len());
/// ```
pub fn load_config(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration from TOML text
///
/// # Arguments
///
/// * `content` - Raw TOML, e.g. the contents of a configuration file
pub fn parse_config(content: &str) -> ConfigResult<Config> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Hex-encoded SHA-256 of the raw configuration file
///
/// Logged at startup so operators can tell which configuration a run used.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 of the raw file bytes
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> ConfigResult<String> {
    let content = std::fs::read(path)?;
    Ok(hex::encode(Sha256::digest(&content)))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> ConfigResult<(Config, String)> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConfigError;
    use crate::config::CategoryHierarchy;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let config_content = r#"
[runtime]
max-concurrent-crawls = 3
max-concurrent-fetches = 4
category-hierarchy = "nested"

[output]
database-path = "./test.db"

[[job]]
name = "rmm"
sitemap-url = "https://docs.example.com/help/Content/Sitemap.xml"
allowed-domains = ["docs.example.com"]
default-category = "Datto RMM"
crawl-interval = "12h"
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.runtime.max_concurrent_crawls, 3);
        assert_eq!(config.runtime.max_concurrent_fetches, 4);
        assert_eq!(config.runtime.category_hierarchy, CategoryHierarchy::Nested);
        assert_eq!(config.jobs.len(), 1);

        let job = &config.jobs[0];
        assert_eq!(job.default_category, "Datto RMM");
        assert_eq!(job.user_agent, "KB Crawler Bot v1.0");
        assert_eq!(job.max_depth, 10);
        assert_eq!(job.nav_selector, "nav.sidebarNav");
        assert_eq!(job.breadcrumb_selectors.len(), 4);
        assert!(job.map_url.is_empty());
    }

    #[test]
    fn test_runtime_defaults() {
        let config_content = r#"
[output]
database-path = "./test.db"
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.runtime.max_concurrent_crawls, 5);
        assert_eq!(config.runtime.max_concurrent_fetches, 2);
        assert_eq!(config.runtime.random_delay_ms, 2000);
        assert_eq!(config.runtime.request_timeout_secs, 30);
        assert_eq!(config.runtime.category_hierarchy, CategoryHierarchy::Flat);
        assert!(config.jobs.is_empty());
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let config_content = "this is not valid TOML {{{";
        let file = create_temp_config(config_content);
        let result = load_config(file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let config_content = r#"
[runtime]
max-concurrent-fetches = 0

[output]
database-path = "./test.db"
"#;

        let file = create_temp_config(config_content);
        let result = load_config(file.path());
        assert!(result.is_err());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_duplicate_job_names_rejected() {
        let config_content = r#"
[output]
database-path = "./test.db"

[[job]]
name = "rmm"
sitemap-url = "https://docs.example.com/Sitemap.xml"
default-category = "RMM"

[[job]]
name = "rmm"
sitemap-url = "https://other.example.com/Sitemap.xml"
default-category = "Other"
"#;

        let file = create_temp_config(config_content);
        assert!(matches!(
            load_config(file.path()),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }
}
