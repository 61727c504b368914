/// Configuration management for resize-service
///
/// Loads configuration from environment variables with sensible defaults.
use crate::error::ConfigError;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    pub app: AppConfig,
    pub orchestrator: OrchestratorConfig,
    pub cache: CacheConfig,
    pub fetch: FetchConfig,
    pub resize: ResizeConfig,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Public prefix for retrieval URLs handed back to clients
    pub base_url: String,
    pub env: String,
    /// Upper bound for JSON request bodies
    pub max_body_bytes: usize,
}

#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Concurrent fetch/resize units allowed on the synchronous path
    pub sync_max_concurrency: usize,
    /// Concurrent units the background worker may dispatch
    pub async_max_concurrency: usize,
    /// Idle delay of the worker loop when no token or task is available
    pub worker_backoff: Duration,
    /// Hard bound on one fetch+resize unit
    pub task_timeout: Duration,
    /// How long a retrieval waits for an in-flight image
    pub wait_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            sync_max_concurrency: 10,
            async_max_concurrency: 10,
            worker_backoff: Duration::from_millis(50),
            task_timeout: Duration::from_secs(10),
            wait_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}

#[derive(Clone, Debug)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub max_bytes: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_bytes: 15 * 1024 * 1024,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ResizeConfig {
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    /// Largest output width or height accepted, in pixels
    pub max_dimension: u32,
}

impl Default for ResizeConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: 85,
            max_dimension: 4096,
        }
    }
}

/// Upper bound for either worker pool; tokio semaphores cap permits well above this
const MAX_POOL_SIZE: usize = 4096;

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port: u16 = parse_or(&lookup, "RESIZE_SERVICE_PORT", 8080)?;
        let defaults = OrchestratorConfig::default();

        let config = Config {
            app: AppConfig {
                host: lookup("RESIZE_SERVICE_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port,
                base_url: lookup("BASE_URL")
                    .map(|url| url.trim_end_matches('/').to_string())
                    .unwrap_or_else(|| format!("http://localhost:{}", port)),
                env: lookup("APP_ENV").unwrap_or_else(|| "development".to_string()),
                max_body_bytes: parse_or(&lookup, "MAX_BODY_BYTES", 8 * 1024)?,
            },
            orchestrator: OrchestratorConfig {
                sync_max_concurrency: parse_or(
                    &lookup,
                    "SYNC_MAX_CONCURRENCY",
                    defaults.sync_max_concurrency,
                )?,
                async_max_concurrency: parse_or(
                    &lookup,
                    "ASYNC_MAX_CONCURRENCY",
                    defaults.async_max_concurrency,
                )?,
                worker_backoff: Duration::from_millis(parse_or(&lookup, "WORKER_BACKOFF_MS", 50)?),
                task_timeout: Duration::from_secs(parse_or(&lookup, "TASK_TIMEOUT_SECS", 10)?),
                wait_timeout: Duration::from_secs(parse_or(&lookup, "WAIT_TIMEOUT_SECS", 30)?),
            },
            cache: CacheConfig {
                capacity: parse_or(&lookup, "CACHE_CAPACITY", CacheConfig::default().capacity)?,
            },
            fetch: FetchConfig {
                timeout: Duration::from_secs(parse_or(&lookup, "FETCH_TIMEOUT_SECS", 10)?),
                max_bytes: parse_or(&lookup, "FETCH_MAX_BYTES", FetchConfig::default().max_bytes)?,
            },
            resize: ResizeConfig {
                jpeg_quality: parse_or(&lookup, "JPEG_QUALITY", ResizeConfig::default().jpeg_quality)?,
                max_dimension: parse_or(
                    &lookup,
                    "MAX_DIMENSION",
                    ResizeConfig::default().max_dimension,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.orchestrator.sync_max_concurrency == 0 {
            return Err(ConfigError::Zero("SYNC_MAX_CONCURRENCY"));
        }
        if self.orchestrator.async_max_concurrency == 0 {
            return Err(ConfigError::Zero("ASYNC_MAX_CONCURRENCY"));
        }
        if self.orchestrator.sync_max_concurrency > MAX_POOL_SIZE {
            return Err(ConfigError::TooLarge {
                name: "SYNC_MAX_CONCURRENCY",
                limit: MAX_POOL_SIZE,
            });
        }
        if self.orchestrator.async_max_concurrency > MAX_POOL_SIZE {
            return Err(ConfigError::TooLarge {
                name: "ASYNC_MAX_CONCURRENCY",
                limit: MAX_POOL_SIZE,
            });
        }
        if self.cache.capacity == 0 {
            return Err(ConfigError::Zero("CACHE_CAPACITY"));
        }
        if self.resize.jpeg_quality == 0 || self.resize.jpeg_quality > 100 {
            return Err(ConfigError::InvalidValue {
                name: "JPEG_QUALITY",
                value: self.resize.jpeg_quality.to_string(),
            });
        }
        if self.resize.max_dimension == 0 {
            return Err(ConfigError::Zero("MAX_DIMENSION"));
        }
        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value: raw }),
        None => Ok(default),
    }
}
