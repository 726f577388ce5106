use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

const DEFAULT_REDEEM_ATTEMPTS: u32 = 3;
const DEFAULT_HISTORY_LIMIT: usize = 50;
const DEFAULT_POINTS_PER_DOLLAR: i64 = 10;
/// Hard ceiling on a single history page.
pub const MAX_HISTORY_LIMIT: usize = 500;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the loyalty service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub loyalty: LoyaltyConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let format = match env::var("APP_LOG_FORMAT") {
            Ok(raw) => LogFormat::parse(&raw)?,
            Err(_) => LogFormat::Compact,
        };

        let loyalty = LoyaltyConfig::from_env()?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level, format },
            loyalty,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Output layout for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "compact" | "text" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::InvalidLogFormat(other.to_string())),
        }
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub format: LogFormat,
}

/// Knobs for the loyalty service facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoyaltyConfig {
    /// Upper bound on compare-and-swap attempts for a single redemption.
    pub redeem_attempts: u32,
    /// Page size used when a history request does not name one.
    pub history_limit: usize,
    /// Earning rate for shops that have not saved their own.
    pub default_points_per_dollar: i64,
}

impl Default for LoyaltyConfig {
    fn default() -> Self {
        Self {
            redeem_attempts: DEFAULT_REDEEM_ATTEMPTS,
            history_limit: DEFAULT_HISTORY_LIMIT,
            default_points_per_dollar: DEFAULT_POINTS_PER_DOLLAR,
        }
    }
}

impl LoyaltyConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(raw) = env::var("LOYALTY_REDEEM_ATTEMPTS") {
            config.redeem_attempts = raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|attempts| *attempts >= 1)
                .ok_or(ConfigError::InvalidRedeemAttempts(raw))?;
        }

        if let Ok(raw) = env::var("LOYALTY_HISTORY_LIMIT") {
            config.history_limit = raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|limit| (1..=MAX_HISTORY_LIMIT).contains(limit))
                .ok_or(ConfigError::InvalidHistoryLimit(raw))?;
        }

        if let Ok(raw) = env::var("LOYALTY_DEFAULT_POINTS_PER_DOLLAR") {
            config.default_points_per_dollar = raw
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|rate| *rate >= 1)
                .ok_or(ConfigError::InvalidPointsPerDollar(raw))?;
        }

        Ok(config)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidLogFormat(String),
    InvalidRedeemAttempts(String),
    InvalidHistoryLimit(String),
    InvalidPointsPerDollar(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidLogFormat(value) => {
                write!(f, "APP_LOG_FORMAT must be 'compact' or 'json', got '{value}'")
            }
            ConfigError::InvalidRedeemAttempts(value) => write!(
                f,
                "LOYALTY_REDEEM_ATTEMPTS must be a positive integer, got '{value}'"
            ),
            ConfigError::InvalidHistoryLimit(value) => write!(
                f,
                "LOYALTY_HISTORY_LIMIT must be between 1 and {MAX_HISTORY_LIMIT}, got '{value}'"
            ),
            ConfigError::InvalidPointsPerDollar(value) => write!(
                f,
                "LOYALTY_DEFAULT_POINTS_PER_DOLLAR must be a positive integer, got '{value}'"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidLogFormat(_)
            | ConfigError::InvalidRedeemAttempts(_)
            | ConfigError::InvalidHistoryLimit(_)
            | ConfigError::InvalidPointsPerDollar(_) => None,
        }
    }
}
