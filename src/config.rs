use std::time::Duration;

/// application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// listen address
    pub host: String,
    /// listen port
    pub port: u16,
    /// number of tokio worker threads
    pub worker_threads: usize,
    /// size of the chunks forwarded to the client
    pub chunk_size: usize,
    /// how long a terminal snapshot stays readable before it is retired
    pub retire_after: Duration,
    /// how often a subscription polls the status store
    pub poll_interval: Duration,
    /// how long a subscription waits for an unknown transfer to appear
    pub subscribe_grace: Duration,
    /// upstream connect timeout
    pub connect_timeout: Duration,
    /// longest silence tolerated between two upstream body reads
    pub read_timeout: Duration,
    /// user agent sent upstream
    pub user_agent: String,
    /// cors allowed origins, empty means any
    pub cors_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5001,
            worker_threads: 8,
            chunk_size: 1024 * 1024, // 1MB
            retire_after: Duration::from_secs(10),
            poll_interval: Duration::from_millis(1000),
            subscribe_grace: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            user_agent: concat!("nexus-relay/", env!("CARGO_PKG_VERSION")).to_string(),
            cors_origins: Vec::new(),
        }
    }
}

impl Config {
    /// load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        // parse cors origins, "*" or nothing allows any origin
        let cors_origins = std::env::var("CORS_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty() && s != "*")
            .collect();

        let chunk_size = env_parse("CHUNK_SIZE").unwrap_or(defaults.chunk_size);
        if chunk_size == 0 {
            tracing::warn!("CHUNK_SIZE must be positive, falling back to {}", defaults.chunk_size);
        }

        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: env_parse("PORT").unwrap_or(defaults.port),
            worker_threads: env_parse("WORKER_THREADS").unwrap_or(defaults.worker_threads),
            chunk_size: if chunk_size == 0 { defaults.chunk_size } else { chunk_size },
            retire_after: env_parse("RETIRE_AFTER_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.retire_after),
            poll_interval: env_parse("POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            subscribe_grace: env_parse("SUBSCRIBE_GRACE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.subscribe_grace),
            connect_timeout: env_parse("CONNECT_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
            read_timeout: env_parse("READ_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.read_timeout),
            user_agent: std::env::var("USER_AGENT").unwrap_or(defaults.user_agent),
            cors_origins,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
