use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_opt(key).and_then(|v| v.parse().ok())
}

// ── Top-level config ──────────────────────────────────────────

/// Full runtime configuration.
///
/// Parsed from a TOML document with `SWITCHBOARD_<SECTION>_<KEY>` environment
/// overrides applied on top. Every section has defaults, so an empty document
/// is a valid (stdio, unauthenticated) configuration once a command is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub balancer: BalancerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl RuntimeConfig {
    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Load only the `[auth]` section of a config file, with env overrides.
    ///
    /// The rest of the document must still parse but is not validated, so
    /// a server can share a file written for clients or carry `[auth]`
    /// alone.
    pub fn auth_from_file(path: impl AsRef<Path>) -> Result<AuthConfig, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let mut config: Self = toml::from_str(&content)?;
        config.apply_env_overrides();
        config.auth.validate()?;
        Ok(config.auth)
    }

    // ── Environment variable overrides ──────────────────────────────

    /// Apply environment variable overrides.
    ///
    /// Convention: `SWITCHBOARD_SECTION_KEY` overrides `section.key`.
    /// Examples:
    /// - `SWITCHBOARD_TRANSPORT_BASE_URL` → `transport.base_url`
    /// - `SWITCHBOARD_TRANSPORT_TIMEOUT_MS` → `transport.timeout_ms`
    /// - `SWITCHBOARD_SESSION_MAX_SESSIONS` → `session.max_sessions`
    /// - `SWITCHBOARD_BALANCER_STRATEGY` → `balancer.strategy`
    /// - `SWITCHBOARD_AUTH_TOKEN_SECRET` → `auth.token_secret`
    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_opt("SWITCHBOARD_TRANSPORT_COMMAND") {
            self.transport.command = Some(v);
        }
        if let Some(v) = env_opt("SWITCHBOARD_TRANSPORT_BASE_URL") {
            self.transport.base_url = Some(v);
        }
        if let Some(v) = env_parse("SWITCHBOARD_TRANSPORT_TIMEOUT_MS") {
            self.transport.timeout_ms = v;
        }
        if let Some(v) = env_parse("SWITCHBOARD_CLIENT_RETRY_ATTEMPTS") {
            self.client.retry_attempts = v;
        }
        if let Some(v) = env_parse("SWITCHBOARD_CLIENT_RETRY_DELAY_MS") {
            self.client.retry_delay_ms = v;
        }
        if let Some(v) = env_parse("SWITCHBOARD_SESSION_MAX_SESSIONS") {
            self.session.max_sessions = v;
        }
        if let Some(v) = env_parse("SWITCHBOARD_SESSION_TIMEOUT_MS") {
            self.session.session_timeout_ms = v;
        }
        if let Some(v) = env_opt("SWITCHBOARD_BALANCER_STRATEGY") {
            match v.parse() {
                Ok(strategy) => self.balancer.strategy = strategy,
                Err(e) => tracing::warn!(value = %v, error = %e, "ignoring invalid strategy override"),
            }
        }
        if let Some(v) = env_opt("SWITCHBOARD_AUTH_TOKEN_SECRET") {
            self.auth.token_secret = Some(v);
        }
        if let Some(v) = env_opt("SWITCHBOARD_AUTH_CERTIFICATE_PATH") {
            self.auth.certificate_path = Some(PathBuf::from(v));
        }
    }

    // ── Validation ──────────────────────────────────────────────────

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.transport.validate()?;
        if self.session.max_sessions == 0 {
            return Err(ConfigError::Invalid(
                "session.max_sessions must be at least 1".into(),
            ));
        }
        if self.balancer.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "balancer.failure_threshold must be at least 1".into(),
            ));
        }
        self.auth.validate()
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!(
            "  transport:  kind={}, target={}, timeout={}ms",
            self.transport.kind,
            self.transport.target(),
            self.transport.timeout_ms
        );
        tracing::info!(
            "  client:     retries={}, retry_delay={}ms, cache={}",
            self.client.retry_attempts,
            self.client.retry_delay_ms,
            self.client.cache_enabled
        );
        tracing::info!(
            "  session:    max={}, idle_timeout={}ms",
            self.session.max_sessions,
            self.session.session_timeout_ms
        );
        tracing::info!(
            "  balancer:   strategy={}, threshold={}",
            self.balancer.strategy,
            self.balancer.failure_threshold
        );
        tracing::info!(
            "  auth:       enabled={}, anchors={}",
            self.auth.is_enabled(),
            self.auth
                .certificate_path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(none)".into())
        );
    }
}

// ── Transport ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Stdio,
    Http,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Stdio => write!(f, "stdio"),
            TransportKind::Http => write!(f, "http"),
        }
    }
}

/// Connection parameters for one peer.
///
/// `stdio` uses `command`/`args`/`env`; `http` uses `base_url`/`path`/`headers`
/// and the pool settings. `timeout_ms` bounds every send on either kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub kind: TransportKind,

    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,

    pub base_url: Option<String>,
    #[serde(default = "default_http_path")]
    pub path: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Bearer token sent as `Authorization` on HTTP requests.
    pub auth_token: Option<String>,
    /// Max idle pooled connections per host; 0 disables pooling.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_http_path() -> String {
    "/mcp".into()
}

fn default_pool_size() -> usize {
    8
}

fn default_keep_alive_secs() -> u64 {
    90
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::Stdio,
            command: None,
            args: Vec::new(),
            env: HashMap::new(),
            base_url: None,
            path: default_http_path(),
            headers: HashMap::new(),
            auth_token: None,
            pool_size: default_pool_size(),
            keep_alive_secs: default_keep_alive_secs(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl TransportConfig {
    /// Subprocess transport running `command args..`.
    pub fn stdio(command: impl Into<String>, args: &[&str]) -> Self {
        Self {
            kind: TransportKind::Stdio,
            command: Some(command.into()),
            args: args.iter().map(|a| a.to_string()).collect(),
            ..Self::default()
        }
    }

    /// HTTP transport posting to `base_url` + `/mcp`.
    pub fn http(base_url: impl Into<String>) -> Self {
        Self {
            kind: TransportKind::Http,
            base_url: Some(base_url.into()),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    /// Human-readable target (command line or URL) for logs.
    pub fn target(&self) -> String {
        match self.kind {
            TransportKind::Stdio => {
                let mut parts = vec![self.command.clone().unwrap_or_else(|| "(none)".into())];
                parts.extend(self.args.iter().cloned());
                parts.join(" ")
            }
            TransportKind::Http => format!(
                "{}{}",
                self.base_url.as_deref().unwrap_or("(none)"),
                self.path
            ),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid("transport.timeout_ms must be > 0".into()));
        }
        match self.kind {
            TransportKind::Stdio => {
                if self.command.as_deref().map_or(true, str::is_empty) {
                    return Err(ConfigError::Invalid(
                        "stdio transport requires transport.command".into(),
                    ));
                }
            }
            TransportKind::Http => {
                let url = self.base_url.as_deref().unwrap_or("");
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(ConfigError::Invalid(format!(
                        "http transport requires an http(s) base_url, got '{url}'"
                    )));
                }
                if !self.path.starts_with('/') {
                    return Err(ConfigError::Invalid(format!(
                        "transport.path must start with '/', got '{}'",
                        self.path
                    )));
                }
            }
        }
        Ok(())
    }
}

// ── Client ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Total connect attempts (1 = no retry).
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
    pub client_name: Option<String>,
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl_ms() -> u64 {
    60_000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            cache_enabled: true,
            cache_ttl_ms: default_cache_ttl_ms(),
            client_name: None,
        }
    }
}

impl ClientConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }
}

// ── Sessions ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

fn default_max_sessions() -> usize {
    10
}

fn default_session_timeout_ms() -> u64 {
    300_000
}

fn default_sweep_interval_ms() -> u64 {
    30_000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            session_timeout_ms: default_session_timeout_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

impl SessionConfig {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

// ── Load balancer ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    RoundRobin,
    LeastConnections,
    Weighted,
    Random,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StrategyKind::RoundRobin => "round_robin",
            StrategyKind::LeastConnections => "least_connections",
            StrategyKind::Weighted => "weighted",
            StrategyKind::Random => "random",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "round_robin" => Ok(StrategyKind::RoundRobin),
            "least_connections" => Ok(StrategyKind::LeastConnections),
            "weighted" => Ok(StrategyKind::Weighted),
            "random" => Ok(StrategyKind::Random),
            other => Err(ConfigError::Invalid(format!(
                "unknown balancing strategy '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalancerConfig {
    #[serde(default)]
    pub strategy: StrategyKind,
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,
    /// Failures within `failure_window_ms` that open a circuit.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_failure_window_ms")]
    pub failure_window_ms: u64,
    #[serde(default = "default_reset_timeout_ms")]
    pub reset_timeout_ms: u64,
}

fn default_health_check_interval_ms() -> u64 {
    30_000
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_failure_window_ms() -> u64 {
    60_000
}

fn default_reset_timeout_ms() -> u64 {
    30_000
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            health_check_interval_ms: default_health_check_interval_ms(),
            failure_threshold: default_failure_threshold(),
            failure_window_ms: default_failure_window_ms(),
            reset_timeout_ms: default_reset_timeout_ms(),
        }
    }
}

impl BalancerConfig {
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn failure_window(&self) -> Duration {
        Duration::from_millis(self.failure_window_ms)
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}

// ── Auth ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for bearer tokens. Without it only certificates are
    /// accepted; auth is off when this and `certificate_path` are unset.
    pub token_secret: Option<String>,
    #[serde(default = "default_token_expiry_secs")]
    pub token_expiry_secs: u64,
    /// File of trusted certificate issuer keys.
    pub certificate_path: Option<PathBuf>,
}

fn default_token_expiry_secs() -> u64 {
    3_600
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: None,
            token_expiry_secs: default_token_expiry_secs(),
            certificate_path: None,
        }
    }
}

impl AuthConfig {
    pub fn is_enabled(&self) -> bool {
        self.token_secret.is_some() || self.certificate_path.is_some()
    }

    pub fn token_expiry(&self) -> Duration {
        Duration::from_secs(self.token_expiry_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token_secret.as_deref() == Some("") {
            return Err(ConfigError::Invalid("auth.token_secret must not be empty".into()));
        }
        if self.token_expiry_secs == 0 {
            return Err(ConfigError::Invalid(
                "auth.token_expiry_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
