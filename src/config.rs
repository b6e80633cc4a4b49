/// Runtime configuration
///
/// Everything comes from environment variables with sensible defaults,
/// there is no config file.
use std::path::PathBuf;
use std::time::Duration;

use crate::error::GalleryError;

pub const DEFAULT_API_BASE: &str = "http://localhost:3001";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);
pub const DEFAULT_LOAD_RETRIES: u32 = 2;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(250);

/// How the collection store talks to the remote source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestPolicy {
    /// Upper bound for a single fetch or delete
    pub timeout: Duration,
    /// Extra attempts after a failed transient fetch
    pub load_retries: u32,
    /// Pause between fetch attempts
    pub retry_delay: Duration,
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            load_retries: DEFAULT_LOAD_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GalleryConfig {
    /// Base address of the image API, without trailing slash
    pub api_base: String,
    pub policy: RequestPolicy,
    /// SQLite file holding annotations
    pub db_path: PathBuf,
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            policy: RequestPolicy::default(),
            db_path: default_db_path(),
        }
    }
}

impl GalleryConfig {
    /// Read `GALLERY_API_BASE`, `GALLERY_TIMEOUT_MS` and `GALLERY_DB_PATH`
    pub fn from_env() -> Result<Self, GalleryError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as `from_env` but with an injectable variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, GalleryError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(base) = lookup("GALLERY_API_BASE") {
            let base = base.trim().trim_end_matches('/');
            if base.is_empty() {
                return Err(GalleryError::Config("GALLERY_API_BASE is empty".to_string()));
            }
            config.api_base = base.to_string();
        }

        if let Some(raw) = lookup("GALLERY_TIMEOUT_MS") {
            let millis: u64 = raw.trim().parse().map_err(|_| {
                GalleryError::Config(format!("GALLERY_TIMEOUT_MS is not a number: {raw:?}"))
            })?;
            if millis == 0 {
                return Err(GalleryError::Config("GALLERY_TIMEOUT_MS must be positive".to_string()));
            }
            config.policy.timeout = Duration::from_millis(millis);
        }

        if let Some(path) = lookup("GALLERY_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }

        Ok(config)
    }
}

/// Where annotations are stored when nothing is configured
///
/// - Linux: ~/.local/share/photo-gallery/annotations.db
/// - macOS: ~/Library/Application Support/photo-gallery/annotations.db
/// - Windows: %APPDATA%\photo-gallery\annotations.db
fn default_db_path() -> PathBuf {
    let mut path = dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."));

    path.push("photo-gallery");
    path.push("annotations.db");
    path
}
