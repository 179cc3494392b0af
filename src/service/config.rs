//! Service configuration loading.
//!
//! Configuration is read once at startup from `config.toml` (at
//! `$JOBAPPS_CONFIG`, or inside the data directory), then overridden by
//! environment variables. The resulting [`ServiceConfig`] is immutable for
//! the lifetime of the process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::db::RetryPolicy;
use crate::{AppError, Result};

/// Longest accepted file link lifetime (7 days, the S3 presign limit).
pub const MAX_LINK_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// Source of environment-style settings.
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;
}

/// The process environment.
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }
}

impl EnvSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).filter(|v| !v.is_empty()).cloned()
    }
}

/// Service configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Data directory for database, blobs and logs
    pub data_dir: PathBuf,
    /// SQLite database file (defaults to `<data_dir>/applications.db`)
    pub database_path: Option<PathBuf>,
    /// Bucket holding uploaded files
    pub bucket: String,
    /// Address the IPC server listens on
    pub listen_addr: String,
    /// Base URL file links are rendered against
    pub public_url: String,
    /// Secret for signing file links; random per process when unset
    pub signing_secret: Option<String>,
    pub database: DatabaseConfig,
    pub retry: RetryConfig,
    pub links: LinkConfig,
}

/// `[database]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub busy_timeout_ms: u64,
}

/// `[retry]` section - bounds on transaction conflict retries.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// 0 disables the deadline
    pub deadline_ms: u64,
}

/// `[links]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub ttl_secs: i64,
}

fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "jobapps")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("data"))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_path: None,
            bucket: "job-applications".to_string(),
            listen_addr: "127.0.0.1:7878".to_string(),
            public_url: "http://127.0.0.1:8080".to_string(),
            signing_secret: None,
            database: DatabaseConfig::default(),
            retry: RetryConfig::default(),
            links: LinkConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5000,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            deadline_ms: policy.deadline.map_or(0, |d| d.as_millis() as u64),
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self { ttl_secs: 900 }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            deadline: (self.deadline_ms > 0).then(|| Duration::from_millis(self.deadline_ms)),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from the process environment and config file.
    pub fn load() -> Result<Self> {
        Self::load_from(&ProcessEnv)
    }

    /// Load configuration using `env` for file location and overrides.
    pub fn load_from(env: &dyn EnvSource) -> Result<Self> {
        let data_dir = env
            .get("JOBAPPS_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);

        let path = env
            .get("JOBAPPS_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            Self {
                data_dir: data_dir.clone(),
                ..Self::default()
            }
        };

        config.apply_env(env);
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read {:?}: {}", path, e)))?;
        toml::from_str(&text)
            .map_err(|e| AppError::Config(format!("Failed to parse {:?}: {}", path, e)))
    }

    fn apply_env(&mut self, env: &dyn EnvSource) {
        if let Some(dir) = env.get("JOBAPPS_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(path) = env.get("DATABASE_PATH") {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(bucket) = env.get("BUCKET_NAME") {
            self.bucket = bucket;
        }
        if let Some(addr) = env.get("JOBAPPS_LISTEN") {
            self.listen_addr = addr;
        }
        if let Some(url) = env.get("JOBAPPS_PUBLIC_URL") {
            self.public_url = url;
        }
        if let Some(secret) = env.get("JOBAPPS_SIGNING_SECRET") {
            self.signing_secret = Some(secret);
        }
    }

    fn validate(&self) -> Result<()> {
        if self.bucket.is_empty() {
            return Err(AppError::Config("bucket name is required".into()));
        }
        if self.links.ttl_secs <= 0 || self.links.ttl_secs > MAX_LINK_TTL_SECS {
            return Err(AppError::Config(format!(
                "links.ttl_secs must be between 1 and {}, got {}",
                MAX_LINK_TTL_SECS, self.links.ttl_secs
            )));
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("applications.db"))
    }

    pub fn blob_root(&self) -> PathBuf {
        self.data_dir.join("blobs")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.database.busy_timeout_ms)
    }

    /// Lifetime of file links; bounded by [`MAX_LINK_TTL_SECS`] once validated.
    pub fn link_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.links.ttl_secs.clamp(1, MAX_LINK_TTL_SECS))
    }
}
