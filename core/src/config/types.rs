use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub progress: ProgressConfig,

    #[serde(default)]
    pub http_server: HttpServerConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default = "default_logging_file")]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "artiflow_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Optional directory for log files. If empty or unset, uses OS temp dir.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_file() -> bool {
    false
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: default_logging_file(),
            level: default_logging_level(),
            directory: None,
        }
    }
}

/// Default retry policy applied to tasks that do not declare their own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// "exponential-backoff" or "fixed"
    #[serde(default = "default_retry_strategy")]
    pub strategy: String,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound for a single backoff sleep; 0 disables the cap.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_retry_strategy() -> String {
    "exponential-backoff".to_string()
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    3
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            strategy: default_retry_strategy(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Cap on concurrently running tasks inside one fan-out stage; 0 means unbounded.
    #[serde(default = "default_max_parallel_tasks")]
    pub max_parallel_tasks: usize,
}

fn default_max_parallel_tasks() -> usize {
    8
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_parallel_tasks: default_max_parallel_tasks(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressBackend {
    Memory,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    #[serde(default = "default_progress_backend")]
    pub backend: ProgressBackend,

    /// Snapshot directory for the file backend. Defaults to `~/.artiflow/sessions`.
    #[serde(default)]
    pub directory: Option<String>,

    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_progress_backend() -> ProgressBackend {
    ProgressBackend::File
}

fn default_event_capacity() -> usize {
    1000
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            backend: default_progress_backend(),
            directory: None,
            event_capacity: default_event_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_http_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_http_host() -> String {
    "127.0.0.1".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: default_http_host(),
            port: default_http_port(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// "text" or "jsonl"
    #[serde(default = "default_output_format")]
    pub format: String,
    #[serde(default)]
    pub ascii_only: bool,
    #[serde(default = "default_progress_bar")]
    pub progress_bar: bool,
}

fn default_output_format() -> String {
    "text".to_string()
}

fn default_progress_bar() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_output_format(),
            ascii_only: false,
            progress_bar: default_progress_bar(),
        }
    }
}
