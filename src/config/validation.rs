use crate::config::types::{Config, JobConfig, OutputConfig, RuntimeConfig};
use crate::state::parse_interval;
use crate::ConfigError;
use scraper::Selector;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_runtime_config(&config.runtime)?;
    validate_output_config(&config.output)?;

    let mut names = HashSet::new();
    for job in &config.jobs {
        if !names.insert(job.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Duplicate job name '{}'",
                job.name
            )));
        }
        validate_job_config(job)?;
    }

    Ok(())
}

/// Validates process-wide limits
fn validate_runtime_config(config: &RuntimeConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_crawls < 1 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_crawls must be >= 1, got {}",
            config.max_concurrent_crawls
        )));
    }

    if config.max_concurrent_fetches < 1 || config.max_concurrent_fetches > 100 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_fetches must be between 1 and 100, got {}",
            config.max_concurrent_fetches
        )));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.run_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "run_timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates a single job entry
fn validate_job_config(job: &JobConfig) -> Result<(), ConfigError> {
    if job.name.trim().is_empty() {
        return Err(ConfigError::Validation("job name cannot be empty".to_string()));
    }

    if job.default_category.trim().is_empty() {
        return Err(ConfigError::Validation(format!(
            "Job '{}' must have a default_category",
            job.name
        )));
    }

    validate_http_url(&job.sitemap_url, "sitemap_url")?;
    if !job.map_url.is_empty() {
        validate_http_url(&job.map_url, "map_url")?;
    }

    for pattern in &job.allowed_domains {
        validate_domain_pattern(pattern)?;
    }

    parse_interval(&job.crawl_interval)?;

    validate_selector(&job.nav_selector)?;
    for selector in &job.breadcrumb_selectors {
        validate_selector(selector)?;
    }

    Ok(())
}

fn validate_http_url(value: &str, field: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", field, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            field, value
        )));
    }

    Ok(())
}

fn validate_selector(selector: &str) -> Result<(), ConfigError> {
    Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| ConfigError::Validation(format!("Invalid selector '{}': {:?}", selector, e)))
}

/// Validates a domain pattern (supports wildcards)
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    if let Some(domain) = pattern.strip_prefix("*.") {
        validate_domain_string(domain)?;
    } else {
        validate_domain_string(pattern)?;
    }

    Ok(())
}

/// Validates a domain string (without wildcard prefix)
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    Ok(())
}
