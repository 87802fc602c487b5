use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Parsed configuration with every missing key defaulted
/// * `Err(ConfigError)` - Unreadable file, bad TOML, or a value out of range
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use greenbook_harvest::config::load_config;
///
/// let config = load_config(Path::new("harvest.toml")).unwrap();
/// println!("End page: {}", config.crawler.end_page);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Hex-encoded SHA-256 of the configuration file
///
/// Logged at startup so two runs against one checkpoint can be told apart.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let bytes = std::fs::read(path)?;
    Ok(digest(&bytes))
}

/// Reads the file once, returning the parsed configuration and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    Ok((config, digest(content.as_bytes())))
}

fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiMethod;
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
[site]
url = "https://greenbook.example.org/products"

[crawler]
page-size = 25
end-page = 40
max-page-failures = 5

[session]
headless = false

[api]
method = "post"
columns = ["name", "ingredient", "form", "category", "reg_no", "applicant", "maker", "approved"]

[output]
checkpoint-path = "./out/products.csv"
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.site.url, "https://greenbook.example.org/products");
        assert_eq!(config.crawler.page_size, 25);
        assert_eq!(config.crawler.end_page, 40);
        assert_eq!(config.crawler.max_page_failures, 5);
        assert_eq!(config.crawler.empty_page_limit, 2);
        assert!(!config.session.headless);
        assert_eq!(config.api.method, ApiMethod::Post);
        assert_eq!(config.api.columns.as_ref().map(Vec::len), Some(8));
        assert_eq!(
            config.output.skip_log_path(),
            Path::new("./out/products.skipped.log")
        );
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.crawler.page_size, 10);
        assert_eq!(config.crawler.end_page, 876);
        assert_eq!(config.site.table_selector, "table.dataTable");
        assert_eq!(
            config.output.snapshot_path(),
            Path::new("nafdac_greenbook.snapshot.db")
        );
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/harvest.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let file = create_temp_config("[crawler]\npage-size = 0\n");
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_config_hash_tracks_content() {
        let first = create_temp_config("[crawler]\nend-page = 10\n");
        let second = create_temp_config("[crawler]\nend-page = 11\n");

        let (config, hash) = load_config_with_hash(first.path()).unwrap();
        assert_eq!(config.crawler.end_page, 10);
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, compute_config_hash(first.path()).unwrap());
        assert_ne!(hash, compute_config_hash(second.path()).unwrap());
    }
}
