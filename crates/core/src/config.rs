use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub telegram: TelegramConfig,
    pub access: AccessConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    pub api_base_url: String,
    pub mode: BotMode,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<SecretString>,
    pub poll_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AccessConfig {
    pub allowed_user_ids: Vec<i64>,
    pub notify_denied: bool,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
    pub in_memory: bool,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// How updates reach the bot: long polling or Telegram pushing to our endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotMode {
    Polling,
    Webhook,
}

impl BotMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Polling => "polling",
            Self::Webhook => "webhook",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub database_in_memory: Option<bool>,
    pub log_level: Option<String>,
    pub bot_token: Option<String>,
    pub mode: Option<BotMode>,
    pub allowed_user_ids: Option<Vec<i64>>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    /// Skip the bot token and allow-list checks. Used by operator commands
    /// that only touch the database.
    pub offline: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            telegram: TelegramConfig {
                bot_token: String::new().into(),
                api_base_url: "https://api.telegram.org".to_string(),
                mode: BotMode::Polling,
                webhook_url: None,
                webhook_secret: None,
                poll_timeout_secs: 30,
            },
            access: AccessConfig { allowed_user_ids: Vec::new(), notify_denied: false },
            database: DatabaseConfig {
                url: "sqlite://storytime.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
                in_memory: false,
            },
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for BotMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "polling" | "false" => Ok(Self::Polling),
            "webhook" | "true" => Ok(Self::Webhook),
            other => Err(ConfigError::Validation(format!(
                "unsupported telegram mode `{other}` (expected polling|webhook)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("storytime.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        if options.offline {
            config.validate_offline()?;
        } else {
            config.validate()?;
        }

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(telegram) = patch.telegram {
            if let Some(bot_token_value) = telegram.bot_token {
                self.telegram.bot_token = secret_value(bot_token_value);
            }
            if let Some(api_base_url) = telegram.api_base_url {
                self.telegram.api_base_url = api_base_url;
            }
            if let Some(mode) = telegram.mode {
                self.telegram.mode = mode;
            }
            if let Some(webhook_url) = telegram.webhook_url {
                self.telegram.webhook_url = Some(webhook_url);
            }
            if let Some(webhook_secret_value) = telegram.webhook_secret {
                self.telegram.webhook_secret = Some(secret_value(webhook_secret_value));
            }
            if let Some(poll_timeout_secs) = telegram.poll_timeout_secs {
                self.telegram.poll_timeout_secs = poll_timeout_secs;
            }
        }

        if let Some(access) = patch.access {
            if let Some(allowed_user_ids) = access.allowed_user_ids {
                self.access.allowed_user_ids = allowed_user_ids;
            }
            if let Some(notify_denied) = access.notify_denied {
                self.access.notify_denied = notify_denied;
            }
        }

        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
            if let Some(in_memory) = database.in_memory {
                self.database.in_memory = in_memory;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    /// `STORYTIME_*` variables win; the bare names deployed bots already use are
    /// accepted as fallbacks.
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let bot_token =
            read_env("STORYTIME_TELEGRAM_BOT_TOKEN").or_else(|| read_env("TELEGRAM_BOT_TOKEN"));
        if let Some(value) = bot_token {
            self.telegram.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("STORYTIME_TELEGRAM_API_BASE_URL") {
            self.telegram.api_base_url = value;
        }
        if let Some(value) = read_env("STORYTIME_TELEGRAM_MODE") {
            self.telegram.mode = value.parse()?;
        } else if let Some(value) = read_env("WEBHOOK_MODE") {
            self.telegram.mode = if parse_bool("WEBHOOK_MODE", &value)? {
                BotMode::Webhook
            } else {
                BotMode::Polling
            };
        }
        let webhook_url =
            read_env("STORYTIME_TELEGRAM_WEBHOOK_URL").or_else(|| read_env("WEBHOOK_URL"));
        if let Some(value) = webhook_url {
            self.telegram.webhook_url = Some(value);
        }
        if let Some(value) = read_env("STORYTIME_TELEGRAM_WEBHOOK_SECRET") {
            self.telegram.webhook_secret = Some(secret_value(value));
        }
        if let Some(value) = read_env("STORYTIME_TELEGRAM_POLL_TIMEOUT_SECS") {
            self.telegram.poll_timeout_secs =
                parse_u64("STORYTIME_TELEGRAM_POLL_TIMEOUT_SECS", &value)?;
        }

        let allowed = read_env("STORYTIME_ACCESS_ALLOWED_USER_IDS")
            .map(|value| ("STORYTIME_ACCESS_ALLOWED_USER_IDS", value))
            .or_else(|| read_env("ALLOWED_USER_IDS").map(|value| ("ALLOWED_USER_IDS", value)));
        if let Some((key, value)) = allowed {
            self.access.allowed_user_ids = parse_id_list(key, &value)?;
        }
        if let Some(value) = read_env("STORYTIME_ACCESS_NOTIFY_DENIED") {
            self.access.notify_denied = parse_bool("STORYTIME_ACCESS_NOTIFY_DENIED", &value)?;
        }

        if let Some(value) = read_env("STORYTIME_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("STORYTIME_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("STORYTIME_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("STORYTIME_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("STORYTIME_DATABASE_TIMEOUT_SECS", &value)?;
        }
        let in_memory = read_env("STORYTIME_DATABASE_IN_MEMORY")
            .map(|value| ("STORYTIME_DATABASE_IN_MEMORY", value))
            .or_else(|| read_env("USE_MOCK_DB").map(|value| ("USE_MOCK_DB", value)));
        if let Some((key, value)) = in_memory {
            self.database.in_memory = parse_bool(key, &value)?;
        }

        if let Some(value) = read_env("STORYTIME_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        let port = read_env("STORYTIME_SERVER_PORT")
            .map(|value| ("STORYTIME_SERVER_PORT", value))
            .or_else(|| read_env("PORT").map(|value| ("PORT", value)));
        if let Some((key, value)) = port {
            self.server.port = parse_u16(key, &value)?;
        }
        if let Some(value) = read_env("STORYTIME_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("STORYTIME_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("STORYTIME_LOGGING_LEVEL").or_else(|| read_env("STORYTIME_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("STORYTIME_LOGGING_FORMAT").or_else(|| read_env("STORYTIME_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(in_memory) = overrides.database_in_memory {
            self.database.in_memory = in_memory;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(bot_token) = overrides.bot_token {
            self.telegram.bot_token = secret_value(bot_token);
        }
        if let Some(mode) = overrides.mode {
            self.telegram.mode = mode;
        }
        if let Some(allowed_user_ids) = overrides.allowed_user_ids {
            self.access.allowed_user_ids = allowed_user_ids;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_telegram(&self.telegram)?;
        validate_access(&self.access)?;
        self.validate_offline()
    }

    /// Checks everything except bot credentials and the allow-list.
    pub fn validate_offline(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }

    /// Effective configuration with secrets replaced, for operator display.
    pub fn redacted_summary(&self) -> Vec<(&'static str, String)> {
        let secret_state = |present: bool| if present { "[redacted]" } else { "[unset]" };
        vec![
            (
                "telegram.bot_token",
                secret_state(!self.telegram.bot_token.expose_secret().is_empty()).to_string(),
            ),
            ("telegram.api_base_url", self.telegram.api_base_url.clone()),
            ("telegram.mode", self.telegram.mode.as_str().to_string()),
            ("telegram.webhook_url", self.telegram.webhook_url.clone().unwrap_or_default()),
            (
                "telegram.webhook_secret",
                secret_state(self.telegram.webhook_secret.is_some()).to_string(),
            ),
            ("telegram.poll_timeout_secs", self.telegram.poll_timeout_secs.to_string()),
            (
                "access.allowed_user_ids",
                self.access
                    .allowed_user_ids
                    .iter()
                    .map(i64::to_string)
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            ("access.notify_denied", self.access.notify_denied.to_string()),
            ("database.url", self.database.url.clone()),
            ("database.max_connections", self.database.max_connections.to_string()),
            ("database.timeout_secs", self.database.timeout_secs.to_string()),
            ("database.in_memory", self.database.in_memory.to_string()),
            ("server.bind_address", self.server.bind_address.clone()),
            ("server.port", self.server.port.to_string()),
            ("server.graceful_shutdown_secs", self.server.graceful_shutdown_secs.to_string()),
            ("logging.level", self.logging.level.clone()),
            ("logging.format", format!("{:?}", self.logging.format).to_ascii_lowercase()),
        ]
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("storytime.toml"), PathBuf::from("config/storytime.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_telegram(telegram: &TelegramConfig) -> Result<(), ConfigError> {
    let token = telegram.bot_token.expose_secret();
    if token.is_empty() {
        return Err(ConfigError::Validation(
            "telegram.bot_token is required. Create a bot with @BotFather and copy its token"
                .to_string(),
        ));
    }
    let well_formed = token
        .split_once(':')
        .map(|(id, secret)| {
            !id.is_empty() && id.bytes().all(|byte| byte.is_ascii_digit()) && !secret.is_empty()
        })
        .unwrap_or(false);
    if !well_formed {
        return Err(ConfigError::Validation(
            "telegram.bot_token must look like `<bot id>:<secret>` as issued by @BotFather"
                .to_string(),
        ));
    }

    if !is_http_url(&telegram.api_base_url) {
        return Err(ConfigError::Validation(
            "telegram.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    if telegram.mode == BotMode::Webhook {
        match telegram.webhook_url.as_deref().map(str::trim) {
            None | Some("") => {
                return Err(ConfigError::Validation(
                    "telegram.webhook_url is required when telegram.mode is webhook".to_string(),
                ))
            }
            Some(url) if !is_http_url(url) => {
                return Err(ConfigError::Validation(
                    "telegram.webhook_url must start with http:// or https://".to_string(),
                ))
            }
            Some(_) => {}
        }
    }

    if telegram.poll_timeout_secs > 50 {
        return Err(ConfigError::Validation(
            "telegram.poll_timeout_secs must be in range 0..=50".to_string(),
        ));
    }

    Ok(())
}

fn validate_access(access: &AccessConfig) -> Result<(), ConfigError> {
    if access.allowed_user_ids.is_empty() {
        return Err(ConfigError::Validation(
            "access.allowed_user_ids must list at least one Telegram user id".to_string(),
        ));
    }

    Ok(())
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    if database.in_memory {
        return Ok(());
    }

    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.trim().to_ascii_lowercase().parse::<bool>().map_err(|_| {
        ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
    })
}

fn parse_id_list(key: &str, value: &str) -> Result<Vec<i64>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<i64>().map_err(|_| ConfigError::InvalidEnvOverride {
                key: key.to_string(),
                value: value.to_string(),
            })
        })
        .collect()
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    telegram: Option<TelegramPatch>,
    access: Option<AccessPatch>,
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct TelegramPatch {
    bot_token: Option<String>,
    api_base_url: Option<String>,
    mode: Option<BotMode>,
    webhook_url: Option<String>,
    webhook_secret: Option<String>,
    poll_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AccessPatch {
    allowed_user_ids: Option<Vec<i64>>,
    notify_denied: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
    in_memory: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
