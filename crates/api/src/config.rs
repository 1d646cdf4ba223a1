use serde::Deserialize;
use std::net::SocketAddr;
use validator::ValidateEmail;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub security: SecurityConfig,
    /// JWT verification configuration
    pub jwt: JwtAuthConfig,
    /// External worker (job API) configuration
    pub worker: WorkerConfig,
    /// Export orchestration configuration
    pub export: ExportConfig,
    /// Background job configuration
    #[serde(default)]
    pub jobs: JobsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl DatabaseConfig {
    /// Connection pool settings in the form the persistence layer expects.
    pub fn pool_config(&self) -> persistence::db::DatabaseConfig {
        persistence::db::DatabaseConfig {
            url: self.url.clone(),
            max_connections: self.max_connections,
            min_connections: self.min_connections,
            connect_timeout_secs: self.connect_timeout_secs,
            idle_timeout_secs: self.idle_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Shared secret required by the scheduled-export trigger endpoint.
    pub cron_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtAuthConfig {
    /// RSA public key in PEM format for verifying tokens
    pub public_key: String,

    /// RSA private key in PEM format. Only needed by tooling that mints
    /// tokens; the server itself never signs.
    #[serde(default)]
    pub private_key: String,

    /// Leeway in seconds for clock skew tolerance
    #[serde(default = "default_jwt_leeway")]
    pub leeway_secs: u64,
}

/// Token lifetime used when a private key is configured for local tooling.
const ACCESS_TOKEN_EXPIRY_SECS: i64 = 900;

impl JwtAuthConfig {
    /// Builds the token validator. Signing is only enabled when a private
    /// key is configured; the server itself never needs one.
    pub fn build(&self) -> Result<shared::jwt::JwtConfig, shared::jwt::JwtError> {
        if self.private_key.trim().is_empty() {
            shared::jwt::JwtConfig::verify_only(&self.public_key, self.leeway_secs)
        } else {
            shared::jwt::JwtConfig::new(
                &self.private_key,
                &self.public_key,
                ACCESS_TOKEN_EXPIRY_SECS,
                self.leeway_secs,
            )
        }
    }
}

/// Configuration for the external export worker's job API.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Base URL of the worker, e.g. http://localhost:8090
    pub url: String,

    /// Shared secret sent as X-API-Key on every call
    pub api_key: String,

    /// Request timeout in seconds
    #[serde(default = "default_worker_timeout")]
    pub timeout_secs: u64,
}

/// Configuration for export orchestration.
#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    /// Administrative mailbox that receives consolidated reports. May be
    /// overridden at runtime by the admin_notification_email setting.
    pub destination_email: String,

    /// Priority assigned to enqueued jobs
    #[serde(default = "default_job_priority")]
    pub job_priority: i32,

    /// Maximum batches enqueued concurrently per invocation
    #[serde(default = "default_enqueue_concurrency")]
    pub enqueue_concurrency: usize,

    /// Enqueue retry attempts per batch (bounded exponential backoff)
    #[serde(default = "default_enqueue_attempts")]
    pub enqueue_attempts: u32,

    /// Base backoff delay in milliseconds
    #[serde(default = "default_enqueue_backoff_ms")]
    pub enqueue_backoff_base_ms: u64,

    /// Deadline for a single invocation in seconds
    #[serde(default = "default_invocation_deadline")]
    pub invocation_deadline_secs: u64,

    /// Default row limit for status queries
    #[serde(default = "default_status_query_limit")]
    pub status_query_limit: i64,
}

/// Background job configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    /// Run the scheduled export from inside this process. Off by default;
    /// most deployments drive the run via the admin endpoint from cron.
    #[serde(default)]
    pub scheduled_export_enabled: bool,

    /// Minutes between internal scheduled-export ticks
    #[serde(default = "default_scheduled_export_interval")]
    pub scheduled_export_interval_minutes: u64,

    /// Reconcile PENDING/PROCESSING records against worker job status
    #[serde(default = "default_true")]
    pub reconcile_enabled: bool,

    /// Minutes between reconciliation polls
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_minutes: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            scheduled_export_enabled: false,
            scheduled_export_interval_minutes: default_scheduled_export_interval(),
            reconcile_enabled: true,
            reconcile_interval_minutes: default_reconcile_interval(),
        }
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_max_connections() -> u32 {
    20
}
fn default_min_connections() -> u32 {
    5
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_idle_timeout() -> u64 {
    600
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_jwt_leeway() -> u64 {
    30
}
fn default_worker_timeout() -> u64 {
    10
}
fn default_job_priority() -> i32 {
    1
}
fn default_enqueue_concurrency() -> usize {
    4
}
fn default_enqueue_attempts() -> u32 {
    3
}
fn default_enqueue_backoff_ms() -> u64 {
    500
}
fn default_invocation_deadline() -> u64 {
    120
}
fn default_status_query_limit() -> i64 {
    50
}
fn default_scheduled_export_interval() -> u64 {
    1440
}
fn default_reconcile_interval() -> u64 {
    5
}
fn default_true() -> bool {
    true
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with FC__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("FC").separator("__"))
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Validate settings that must never be silently defaulted.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.database.url.is_empty() {
            return Err(ConfigValidationError::MissingRequired("database.url".into()));
        }
        if self.worker.url.is_empty() {
            return Err(ConfigValidationError::MissingRequired("worker.url".into()));
        }
        if self.worker.api_key.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "worker.api_key".into(),
            ));
        }
        if self.security.cron_secret.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "security.cron_secret".into(),
            ));
        }
        if self.export.destination_email.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "export.destination_email".into(),
            ));
        }
        if !self.export.destination_email.validate_email() {
            return Err(ConfigValidationError::InvalidValue(
                "export.destination_email is not a valid email address".into(),
            ));
        }
        if self.export.enqueue_concurrency == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "export.enqueue_concurrency must be at least 1".into(),
            ));
        }
        if self.export.enqueue_attempts == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "export.enqueue_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Socket address the server binds to.
    pub fn socket_addr(&self) -> SocketAddr {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .expect("Invalid host/port configuration")
    }

    /// Load configuration for testing with custom overrides.
    ///
    /// Creates a config entirely from embedded defaults and overrides,
    /// without relying on config files.
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [server]
            host = "127.0.0.1"
            port = 0
            request_timeout_secs = 30

            [database]
            url = "postgres://localhost/finclass_test"
            max_connections = 5
            min_connections = 1
            connect_timeout_secs = 5
            idle_timeout_secs = 60

            [logging]
            level = "debug"
            format = "pretty"

            [security]
            cors_origins = []
            cron_secret = "test-cron-secret"

            [jwt]
            public_key = "test-public-key"
            private_key = "test-private-key"
            leeway_secs = 0

            [worker]
            url = "http://localhost:8090"
            api_key = "test-worker-key"
            timeout_secs = 2

            [export]
            destination_email = "reports@example.com"
            job_priority = 1
            enqueue_concurrency = 2
            enqueue_attempts = 1
            enqueue_backoff_base_ms = 1
            invocation_deadline_secs = 30
            status_query_limit = 50

            [jobs]
            scheduled_export_enabled = false
            scheduled_export_interval_minutes = 1440
            reconcile_enabled = false
            reconcile_interval_minutes = 5
        "#;

        let mut builder = config::Config::builder().add_source(config::File::from_str(
            defaults,
            config::FileFormat::Toml,
        ));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        builder.build()?.try_deserialize()
    }
}
