use std::str::FromStr;
use std::time::Duration;

/// Environment variable selecting the [`BeginMode`].
pub const BEGIN_MODE_ENV: &str = "UOW_BEGIN_MODE";
/// Environment variable holding the begin timeout in milliseconds.
pub const BEGIN_TIMEOUT_ENV: &str = "UOW_BEGIN_TIMEOUT_MS";

/// How `get_repository` behaves when no transaction is open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BeginMode {
    /// `begin` (or `execute`) must open the transaction first.
    #[default]
    Explicit,
    /// The first repository request opens the transaction.
    Lazy,
}

impl FromStr for BeginMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "explicit" => Ok(Self::Explicit),
            "lazy" => Ok(Self::Lazy),
            other => Err(ConfigError::InvalidBeginMode(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid UOW_BEGIN_MODE `{0}`, expected `explicit` or `lazy`")]
    InvalidBeginMode(String),

    #[error("invalid UOW_BEGIN_TIMEOUT_MS `{0}`, expected milliseconds")]
    InvalidBeginTimeout(String),
}

/// Settings for a [`UnitOfWork`](crate::UnitOfWork).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitOfWorkConfig {
    pub begin_mode: BeginMode,
    /// Deadline for acquiring a transaction from the pool.
    pub begin_timeout: Option<Duration>,
}

impl UnitOfWorkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_mode(mut self, mode: BeginMode) -> Self {
        self.begin_mode = mode;
        self
    }

    pub fn begin_timeout(mut self, timeout: Duration) -> Self {
        self.begin_timeout = Some(timeout);
        self
    }

    /// Read settings from `UOW_BEGIN_MODE` and `UOW_BEGIN_TIMEOUT_MS`.
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(mode) = lookup(BEGIN_MODE_ENV) {
            config.begin_mode = mode.parse()?;
        }
        if let Some(raw) = lookup(BEGIN_TIMEOUT_ENV) {
            let millis: u64 = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidBeginTimeout(raw.clone()))?;
            config.begin_timeout = Some(Duration::from_millis(millis));
        }
        Ok(config)
    }
}
