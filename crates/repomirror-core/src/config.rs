use crate::constants;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub mirror: MirrorConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u32,
    #[serde(default = "default_cache_size")]
    pub cache_size: i32,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Mirror root. Empty means `<data_dir>/mirrors`.
    #[serde(default)]
    pub root: String,
    #[serde(default = "default_git_binary")]
    pub git_binary: String,
    /// Injected into clone/fetch URLs in memory only.
    #[serde(default, skip_serializing)]
    pub access_token: Option<String>,
    #[serde(default = "default_clone_timeout_secs")]
    pub clone_timeout_secs: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

impl std::fmt::Debug for MirrorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorConfig")
            .field("root", &self.root)
            .field("git_binary", &self.git_binary)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| constants::REDACTED),
            )
            .field("clone_timeout_secs", &self.clone_timeout_secs)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("command_timeout_secs", &self.command_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_max_items_per_kind")]
    pub max_items_per_kind: usize,
    #[serde(default = "default_max_search_text_chars")]
    pub max_search_text_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_job_retention_hours")]
    pub job_retention_hours: u32,
    #[serde(default = "default_stale_running_minutes")]
    pub stale_running_minutes: u32,
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    #[serde(default = "default_store_max_retries")]
    pub store_max_retries: u32,
    #[serde(default = "default_store_initial_backoff_ms")]
    pub store_initial_backoff_ms: u64,
    #[serde(default = "default_store_max_backoff_ms")]
    pub store_max_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    #[serde(default = "default_grep_timeout_secs")]
    pub grep_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_data_dir() -> String {
    format!("~/{}", constants::DEFAULT_DATA_DIR)
}
fn default_busy_timeout() -> u32 {
    5000
}
fn default_cache_size() -> i32 {
    -64000
}
fn default_git_binary() -> String {
    "git".to_string()
}
fn default_clone_timeout_secs() -> u64 {
    600
}
fn default_fetch_timeout_secs() -> u64 {
    300
}
fn default_command_timeout_secs() -> u64 {
    60
}
fn default_max_file_size() -> u64 {
    constants::MAX_FILE_SIZE
}
fn default_max_items_per_kind() -> usize {
    constants::MAX_ITEMS_PER_KIND
}
fn default_max_search_text_chars() -> usize {
    constants::MAX_SEARCH_TEXT_CHARS
}
fn default_poll_interval_ms() -> u64 {
    2000
}
fn default_job_retention_hours() -> u32 {
    24
}
fn default_stale_running_minutes() -> u32 {
    120
}
fn default_cleanup_interval_secs() -> u64 {
    300
}
fn default_store_max_retries() -> u32 {
    3
}
fn default_store_initial_backoff_ms() -> u64 {
    100
}
fn default_store_max_backoff_ms() -> u64 {
    10_000
}
fn default_limit() -> usize {
    constants::DEFAULT_LIMIT
}
fn default_max_limit() -> usize {
    constants::MAX_LIMIT
}
fn default_grep_timeout_secs() -> u64 {
    30
}
fn default_bind() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    9180
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            busy_timeout_ms: default_busy_timeout(),
            cache_size: default_cache_size(),
        }
    }
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            root: String::new(),
            git_binary: default_git_binary(),
            access_token: None,
            clone_timeout_secs: default_clone_timeout_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            max_items_per_kind: default_max_items_per_kind(),
            max_search_text_chars: default_max_search_text_chars(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            job_retention_hours: default_job_retention_hours(),
            stale_running_minutes: default_stale_running_minutes(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            store_max_retries: default_store_max_retries(),
            store_initial_backoff_ms: default_store_initial_backoff_ms(),
            store_max_backoff_ms: default_store_max_backoff_ms(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            grep_timeout_secs: default_grep_timeout_secs(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl MirrorConfig {
    pub fn clone_timeout(&self) -> Duration {
        Duration::from_secs(self.clone_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl SearchConfig {
    /// Resolve a requested result count against the configured default and ceiling.
    pub fn effective_limit(&self, requested: Option<usize>) -> usize {
        requested
            .filter(|limit| *limit > 0)
            .unwrap_or(self.default_limit)
            .min(self.max_limit)
    }
}

impl Config {
    /// Load configuration with layered precedence:
    /// 1. Environment variables `REPOMIRROR_<SECTION>_<KEY>` (highest priority)
    /// 2. Explicit config file (from `--config` flag)
    /// 3. Global config: `~/.repomirror/config.toml`
    /// 4. Built-in defaults (lowest priority)
    ///
    /// Only fields explicitly set in a higher-priority file override lower layers.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_file(None)
    }

    /// Load configuration with an explicit config file path.
    pub fn load_with_file(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut merged = toml::Value::Table(toml::map::Map::new());

        if let Some(home) = dirs::home_dir() {
            let global_path = home
                .join(constants::DEFAULT_DATA_DIR)
                .join(constants::CONFIG_FILE);
            if global_path.exists() {
                let raw = load_toml_value(&global_path)?;
                merge_toml_values(&mut merged, &raw);
            }
        }

        if let Some(cf) = config_file {
            if !cf.exists() {
                return Err(ConfigError::NotFound {
                    path: cf.display().to_string(),
                });
            }
            let raw = load_toml_value(cf)?;
            merge_toml_values(&mut merged, &raw);
        }

        let config_str =
            toml::to_string(&merged).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        let mut config: Config =
            toml::from_str(&config_str).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        apply_env_overrides(&mut config);
        config.normalize();
        Ok(config)
    }

    /// Clamp out-of-range values and expand `~` in paths.
    fn normalize(&mut self) {
        self.storage.data_dir = expand_tilde(&self.storage.data_dir);
        self.mirror.root = expand_tilde(self.mirror.root.trim());
        self.mirror.access_token = self
            .mirror
            .access_token
            .take()
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty());
        if self.mirror.git_binary.trim().is_empty() {
            self.mirror.git_binary = default_git_binary();
        }

        self.mirror.clone_timeout_secs = clamp_min_u64_with_warning(
            self.mirror.clone_timeout_secs,
            1,
            default_clone_timeout_secs(),
            "mirror.clone_timeout_secs",
        );
        self.mirror.fetch_timeout_secs = clamp_min_u64_with_warning(
            self.mirror.fetch_timeout_secs,
            1,
            default_fetch_timeout_secs(),
            "mirror.fetch_timeout_secs",
        );
        self.mirror.command_timeout_secs = clamp_min_u64_with_warning(
            self.mirror.command_timeout_secs,
            1,
            default_command_timeout_secs(),
            "mirror.command_timeout_secs",
        );
        self.index.max_items_per_kind = clamp_min_usize_with_warning(
            self.index.max_items_per_kind,
            1,
            default_max_items_per_kind(),
            "index.max_items_per_kind",
        );
        self.index.max_search_text_chars = clamp_min_usize_with_warning(
            self.index.max_search_text_chars,
            64,
            default_max_search_text_chars(),
            "index.max_search_text_chars",
        );
        self.queue.poll_interval_ms = clamp_min_u64_with_warning(
            self.queue.poll_interval_ms,
            10,
            default_poll_interval_ms(),
            "queue.poll_interval_ms",
        );
        if self.queue.job_retention_hours == 0 {
            tracing::warn!(
                field = "queue.job_retention_hours",
                fallback = default_job_retention_hours(),
                "config value below minimum; falling back to default"
            );
            self.queue.job_retention_hours = default_job_retention_hours();
        }
        self.search.max_limit = clamp_min_usize_with_warning(
            self.search.max_limit,
            1,
            default_max_limit(),
            "search.max_limit",
        );
        self.search.default_limit = clamp_min_usize_with_warning(
            self.search.default_limit,
            1,
            default_limit(),
            "search.default_limit",
        )
        .min(self.search.max_limit);
        self.search.grep_timeout_secs = clamp_min_u64_with_warning(
            self.search.grep_timeout_secs,
            1,
            default_grep_timeout_secs(),
            "search.grep_timeout_secs",
        );
    }

    /// Path to the shared SQLite state database.
    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(&self.storage.data_dir).join(constants::STATE_DB_FILE)
    }

    /// Resolve the mirror root directory.
    pub fn mirror_root(&self) -> PathBuf {
        if self.mirror.root.is_empty() {
            PathBuf::from(&self.storage.data_dir).join(constants::MIRRORS_DIR)
        } else {
            PathBuf::from(&self.mirror.root)
        }
    }
}

/// Load a TOML file as a raw `toml::Value` (preserving only explicitly-set fields).
fn load_toml_value(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    content
        .parse::<toml::Value>()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Deep-merge `overlay` into `base`. Only keys present in `overlay` are written.
fn merge_toml_values(base: &mut toml::Value, overlay: &toml::Value) {
    if let (toml::Value::Table(base_map), toml::Value::Table(overlay_map)) = (base, overlay) {
        for (key, overlay_val) in overlay_map {
            if let Some(base_val) = base_map.get_mut(key) {
                if base_val.is_table() && overlay_val.is_table() {
                    merge_toml_values(base_val, overlay_val);
                } else {
                    *base_val = overlay_val.clone();
                }
            } else {
                base_map.insert(key.clone(), overlay_val.clone());
            }
        }
    }
}

/// Apply environment variable overrides to config fields.
/// Convention: `REPOMIRROR_<SECTION>_<KEY>` in UPPER_SNAKE_CASE.
fn apply_env_overrides(config: &mut Config) {
    apply_overrides_from(config, |key| std::env::var(key).ok());
}

fn apply_overrides_from(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    fn parsed<T: std::str::FromStr>(
        lookup: &impl Fn(&str) -> Option<String>,
        key: &str,
    ) -> Option<T> {
        lookup(key).and_then(|v| v.trim().parse().ok())
    }

    if let Some(v) = lookup("REPOMIRROR_STORAGE_DATA_DIR") {
        config.storage.data_dir = v;
    }
    if let Some(n) = parsed(&lookup, "REPOMIRROR_STORAGE_BUSY_TIMEOUT_MS") {
        config.storage.busy_timeout_ms = n;
    }
    if let Some(n) = parsed(&lookup, "REPOMIRROR_STORAGE_CACHE_SIZE") {
        config.storage.cache_size = n;
    }
    if let Some(v) = lookup("REPOMIRROR_MIRROR_ROOT") {
        config.mirror.root = v;
    }
    if let Some(v) = lookup("REPOMIRROR_MIRROR_GIT_BINARY") {
        config.mirror.git_binary = v;
    }
    if let Some(v) = lookup("REPOMIRROR_MIRROR_ACCESS_TOKEN") {
        config.mirror.access_token = Some(v);
    }
    if let Some(n) = parsed(&lookup, "REPOMIRROR_MIRROR_CLONE_TIMEOUT_SECS") {
        config.mirror.clone_timeout_secs = n;
    }
    if let Some(n) = parsed(&lookup, "REPOMIRROR_MIRROR_FETCH_TIMEOUT_SECS") {
        config.mirror.fetch_timeout_secs = n;
    }
    if let Some(n) = parsed(&lookup, "REPOMIRROR_MIRROR_COMMAND_TIMEOUT_SECS") {
        config.mirror.command_timeout_secs = n;
    }
    if let Some(n) = parsed(&lookup, "REPOMIRROR_INDEX_MAX_FILE_SIZE") {
        config.index.max_file_size = n;
    }
    if let Some(n) = parsed(&lookup, "REPOMIRROR_INDEX_MAX_ITEMS_PER_KIND") {
        config.index.max_items_per_kind = n;
    }
    if let Some(n) = parsed(&lookup, "REPOMIRROR_INDEX_MAX_SEARCH_TEXT_CHARS") {
        config.index.max_search_text_chars = n;
    }
    if let Some(n) = parsed(&lookup, "REPOMIRROR_QUEUE_POLL_INTERVAL_MS") {
        config.queue.poll_interval_ms = n;
    }
    if let Some(n) = parsed(&lookup, "REPOMIRROR_QUEUE_JOB_RETENTION_HOURS") {
        config.queue.job_retention_hours = n;
    }
    if let Some(n) = parsed(&lookup, "REPOMIRROR_QUEUE_STALE_RUNNING_MINUTES") {
        config.queue.stale_running_minutes = n;
    }
    if let Some(n) = parsed(&lookup, "REPOMIRROR_QUEUE_STORE_MAX_RETRIES") {
        config.queue.store_max_retries = n;
    }
    if let Some(n) = parsed(&lookup, "REPOMIRROR_SEARCH_DEFAULT_LIMIT") {
        config.search.default_limit = n;
    }
    if let Some(n) = parsed(&lookup, "REPOMIRROR_SEARCH_MAX_LIMIT") {
        config.search.max_limit = n;
    }
    if let Some(n) = parsed(&lookup, "REPOMIRROR_SEARCH_GREP_TIMEOUT_SECS") {
        config.search.grep_timeout_secs = n;
    }
    if let Some(v) = lookup("REPOMIRROR_SERVER_BIND") {
        config.server.bind = v;
    }
    if let Some(n) = parsed(&lookup, "REPOMIRROR_SERVER_PORT") {
        config.server.port = n;
    }
    if let Some(v) = lookup("REPOMIRROR_LOGGING_LEVEL") {
        config.logging.level = v;
    }
}

fn clamp_min_usize_with_warning(value: usize, min: usize, fallback: usize, field: &str) -> usize {
    if value < min {
        tracing::warn!(
            field,
            value,
            min,
            fallback,
            "config value below minimum; falling back to default"
        );
        fallback
    } else {
        value
    }
}

fn clamp_min_u64_with_warning(value: u64, min: u64, fallback: u64, field: &str) -> u64 {
    if value < min {
        tracing::warn!(
            field,
            value,
            min,
            fallback,
            "config value below minimum; falling back to default"
        );
        fallback
    } else {
        value
    }
}

fn expand_tilde(path: &str) -> String {
    if path.starts_with('~')
        && let Some(home) = dirs::home_dir()
    {
        return path.replacen('~', &home.to_string_lossy(), 1);
    }
    path.to_string()
}
