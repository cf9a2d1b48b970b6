//! Store configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Environment variable naming the credential file for the backing worker.
pub const ENV_CREDENTIALS: &str = "DOCBUS_CREDENTIALS";

/// Environment variable overriding the backing-worker thread-pool size.
pub const ENV_WORKER_THREADS: &str = "DOCBUS_WORKER_THREADS";

/// Store configuration.
///
/// The credential path and thread-pool size are consumed by the backing
/// worker at initialization; this layer only carries them. The timeouts bound
/// dispatch replies (59 s) and listener registration (10 s).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to the backing worker's credential file.
    pub credentials_path: Option<PathBuf>,

    /// Backing-worker thread-pool size. Defaults to 2x available cores.
    pub worker_threads: usize,

    /// Bound on each dispatch request's reply.
    pub send_timeout: Duration,

    /// Bound on blocking listener registration.
    pub register_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            credentials_path: None,
            worker_threads: default_worker_threads(),
            send_timeout: Duration::from_millis(59_000),
            register_timeout: Duration::from_secs(10),
        }
    }
}

impl StoreConfig {
    /// Create a configuration with the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder.
    pub fn builder() -> StoreConfigBuilder {
        StoreConfigBuilder::new()
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> StoreConfigBuilder {
        let mut builder = StoreConfigBuilder::new();

        if let Ok(path) = std::env::var(ENV_CREDENTIALS) {
            builder = builder.credentials_path(path);
        }

        if let Ok(threads) = std::env::var(ENV_WORKER_THREADS) {
            if let Ok(threads) = threads.parse::<usize>() {
                builder = builder.worker_threads(threads);
            }
        }

        builder
    }
}

fn default_worker_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() * 2)
        .unwrap_or(4)
}

/// Builder for store configuration.
#[derive(Debug, Default)]
pub struct StoreConfigBuilder {
    credentials_path: Option<PathBuf>,
    worker_threads: Option<usize>,
    send_timeout: Option<Duration>,
    register_timeout: Option<Duration>,
}

impl StoreConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the credential file path.
    pub fn credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_path = Some(path.into());
        self
    }

    /// Set the backing-worker thread-pool size.
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads);
        self
    }

    /// Set the dispatch reply timeout.
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }

    /// Set the listener registration timeout.
    pub fn register_timeout(mut self, timeout: Duration) -> Self {
        self.register_timeout = Some(timeout);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> StoreConfig {
        let defaults = StoreConfig::default();
        StoreConfig {
            credentials_path: self.credentials_path,
            worker_threads: self.worker_threads.unwrap_or(defaults.worker_threads),
            send_timeout: self.send_timeout.unwrap_or(defaults.send_timeout),
            register_timeout: self.register_timeout.unwrap_or(defaults.register_timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.send_timeout, Duration::from_millis(59_000));
        assert_eq!(config.register_timeout, Duration::from_secs(10));
        assert!(config.worker_threads >= 2);
        assert!(config.credentials_path.is_none());
    }

    // One test for all env handling: the variables are process-global, so
    // splitting this up would race under the parallel test runner.
    #[test]
    fn test_from_env_overrides_and_fallbacks() {
        unsafe {
            std::env::set_var(ENV_CREDENTIALS, "/etc/docbus/key.json");
            std::env::set_var(ENV_WORKER_THREADS, "8");
        }
        let config = StoreConfig::from_env().build();
        assert_eq!(
            config.credentials_path,
            Some(PathBuf::from("/etc/docbus/key.json"))
        );
        assert_eq!(config.worker_threads, 8);

        // A malformed thread count is discarded in favor of the default.
        unsafe {
            std::env::set_var(ENV_WORKER_THREADS, "not-a-number");
        }
        let config = StoreConfig::from_env().build();
        assert_eq!(config.worker_threads, StoreConfig::default().worker_threads);

        unsafe {
            std::env::remove_var(ENV_CREDENTIALS);
            std::env::remove_var(ENV_WORKER_THREADS);
        }
        let config = StoreConfig::from_env().build();
        assert!(config.credentials_path.is_none());
        assert_eq!(config.worker_threads, StoreConfig::default().worker_threads);
    }

    #[test]
    fn test_builder_overrides() {
        let config = StoreConfig::builder()
            .credentials_path("/etc/docbus/key.json")
            .worker_threads(8)
            .send_timeout(Duration::from_secs(5))
            .register_timeout(Duration::from_secs(2))
            .build();

        assert_eq!(
            config.credentials_path,
            Some(PathBuf::from("/etc/docbus/key.json"))
        );
        assert_eq!(config.worker_threads, 8);
        assert_eq!(config.send_timeout, Duration::from_secs(5));
        assert_eq!(config.register_timeout, Duration::from_secs(2));
    }
}
