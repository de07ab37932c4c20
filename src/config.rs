use std::{fs, path::Path, path::PathBuf};

use serde::Deserialize;

use crate::Result;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// number of async worker threads, range [1, 32768), defaults to 16
    pub async_worker_thread_number: u16,
    /// http client config
    pub http: HttpConfig,
    /// parser code sandbox config
    pub sandbox: SandboxConfig,
    /// batch runner config
    pub batch: BatchConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// request timeout in milliseconds when a template sets none
    pub timeout_ms: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// parser code timeout in milliseconds
    pub timeout_ms: u64,
    /// QuickJS heap limit, 0 for unbounded
    pub memory_limit_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// directory relative batch output directories are placed under
    pub output_root: PathBuf,
    /// upper bound on workers of a single batch task
    pub max_concurrency: usize,
    /// buffered batch events per subscriber
    pub event_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            async_worker_thread_number: 16,
            http: HttpConfig::default(),
            sandbox: SandboxConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            user_agent: format!("scrapeflow/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            memory_limit_bytes: 64 * 1024 * 1024,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("data"),
            max_concurrency: 64,
            event_capacity: 1024,
        }
    }
}

impl Config {
    pub fn create<T: AsRef<Path>>(path: T) -> Result<Self> {
        let data = fs::read_to_string(path.as_ref())?;
        Self::load_from_str(data.as_str())
    }

    pub fn load_from_str(toml_str: &str) -> Result<Self> {
        let config = toml::from_str::<Config>(toml_str)?;
        Ok(config)
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use super::*;
    use crate::ScrapeError;

    #[test]
    fn test_config_deserialize() {
        let toml_str = r#"
        async_worker_thread_number = 4
        [http]
        timeout_ms = 5000

        [batch]
        output_root = "/var/lib/scrapeflow"
        max_concurrency = 8
        "#;
        let config = Config::load_from_str(toml_str).unwrap();
        assert_eq!(config.async_worker_thread_number, 4);
        assert_eq!(config.http.timeout_ms, 5000);
        assert!(config.http.user_agent.starts_with("scrapeflow/"));
        assert_eq!(config.sandbox.timeout_ms, 10_000);
        assert_eq!(config.batch.output_root, PathBuf::from("/var/lib/scrapeflow"));
        assert_eq!(config.batch.max_concurrency, 8);
        assert_eq!(config.batch.event_capacity, 1024);
    }

    #[test]
    fn test_config_defaults_and_errors() {
        let config = Config::load_from_str("").unwrap();
        assert_eq!(config.async_worker_thread_number, 16);
        assert_eq!(config.http.timeout_ms, 30_000);
        assert_eq!(config.batch.output_root, PathBuf::from("data"));

        assert!(matches!(Config::load_from_str("[http]\ntimeout_ms = \"soon\""), Err(ScrapeError::ConfigurationError(_))));
        assert!(matches!(Config::create("/definitely/not/here.toml"), Err(ScrapeError::IoError(_))));
    }

    #[test]
    fn test_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[sandbox]\ntimeout_ms = 250").unwrap();
        let config = Config::create(file.path()).unwrap();
        assert_eq!(config.sandbox.timeout_ms, 250);
    }
}
