use std::{env, str::FromStr, time::Duration};

use crate::{error::ConfigError, LogLevel};

/// Default connect/read/write timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
/// Write timeout for clients that upload label images.
pub const UPLOAD_WRITE_TIMEOUT: Duration = Duration::from_secs(120);
/// Largest success body buffered for a logging peek.
pub const DEFAULT_PEEK_LIMIT: usize = 1024 * 1024;

/// Configures retry attempts and backoff.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RetryOptions {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Backoff unit in milliseconds, doubled per failed attempt.
    pub base_delay_ms: u64,
    /// Upper bound (exclusive) of the random jitter added to each wait.
    pub max_jitter_ms: u64,
    /// Only retry methods that are safe to repeat.
    pub idempotent_only: bool,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_jitter_ms: 100,
            idempotent_only: false,
        }
    }
}

impl RetryOptions {
    /// A single attempt, never retried.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

/// Configures the HTTP client: endpoint, timeouts, logging and retries.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientOptions {
    /// Prefix joined with relative paths by [`LabelClient::url`](crate::LabelClient::url).
    pub base_url: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    /// Deadline enforced around each attempt in addition to the transport's
    /// own timeouts.
    pub attempt_timeout: Option<Duration>,
    pub log_level: LogLevel,
    /// Bytes buffered when peeking a success body for logging.
    pub peek_limit: usize,
    pub retry: RetryOptions,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            connect_timeout: DEFAULT_TIMEOUT,
            read_timeout: DEFAULT_TIMEOUT,
            write_timeout: DEFAULT_TIMEOUT,
            attempt_timeout: None,
            log_level: LogLevel::Basic,
            peek_limit: DEFAULT_PEEK_LIMIT,
            retry: RetryOptions::default(),
        }
    }
}

impl ClientOptions {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Options for authenticated, upload-heavy clients.
    pub fn authenticated(base_url: impl Into<String>) -> Self {
        Self {
            write_timeout: UPLOAD_WRITE_TIMEOUT,
            ..Self::new(base_url)
        }
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    pub fn with_retry(mut self, retry: RetryOptions) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// Sets connect, read and write timeouts at once.
    pub fn with_timeouts(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self.read_timeout = timeout;
        self.write_timeout = timeout;
        self
    }

    /// Overall per-request deadline handed to the transport.
    pub fn request_timeout(&self) -> Duration {
        self.read_timeout.max(self.write_timeout)
    }

    /// Creates options from environment variables.
    ///
    /// Reads:
    /// - `FOODLABEL_BASE_URL` (required)
    /// - `FOODLABEL_TIMEOUT_SECS` for connect/read/write timeouts
    /// - `FOODLABEL_WRITE_TIMEOUT_SECS` to override the write timeout
    /// - `FOODLABEL_LOG_LEVEL`: one of `NONE`, `BASIC`, `HEADERS`, `BODY`
    /// - `FOODLABEL_MAX_ATTEMPTS`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        const BASE_URL: &str = "FOODLABEL_BASE_URL";
        let base_url = lookup(BASE_URL).ok_or(ConfigError::MissingVar(BASE_URL))?;
        if base_url.trim().is_empty() {
            return Err(ConfigError::EmptyVar(BASE_URL));
        }

        let mut options = Self::new(base_url.trim());
        if let Some(secs) = parse_var::<u64, _>(&lookup, "FOODLABEL_TIMEOUT_SECS")? {
            options = options.with_timeouts(Duration::from_secs(secs));
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "FOODLABEL_WRITE_TIMEOUT_SECS")? {
            options.write_timeout = Duration::from_secs(secs);
        }
        if let Some(level) = parse_var::<LogLevel, _>(&lookup, "FOODLABEL_LOG_LEVEL")? {
            options.log_level = level;
        }
        if let Some(attempts) = parse_var::<u32, _>(&lookup, "FOODLABEL_MAX_ATTEMPTS")? {
            if attempts == 0 {
                return Err(ConfigError::InvalidValue {
                    name: "FOODLABEL_MAX_ATTEMPTS",
                    value: attempts.to_string(),
                });
            }
            options.retry.max_attempts = attempts;
        }
        Ok(options)
    }
}

fn parse_var<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { name, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, time::Duration};

    use super::{ClientOptions, UPLOAD_WRITE_TIMEOUT};
    use crate::{error::ConfigError, LogLevel};

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_match_documented_policy() {
        let options = ClientOptions::new("https://api.example");
        assert_eq!(options.read_timeout, Duration::from_secs(60));
        assert_eq!(options.retry.max_attempts, 3);
        assert_eq!(options.retry.base_delay_ms, 100);
        assert_eq!(options.request_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn authenticated_preset_extends_write_timeout() {
        let options = ClientOptions::authenticated("https://api.example");
        assert_eq!(options.write_timeout, UPLOAD_WRITE_TIMEOUT);
        assert_eq!(options.request_timeout(), UPLOAD_WRITE_TIMEOUT);
    }

    #[test]
    fn from_env_reads_all_variables() {
        let options = ClientOptions::from_lookup(lookup(&[
            ("FOODLABEL_BASE_URL", " https://api.example "),
            ("FOODLABEL_TIMEOUT_SECS", "5"),
            ("FOODLABEL_WRITE_TIMEOUT_SECS", "9"),
            ("FOODLABEL_LOG_LEVEL", "body"),
            ("FOODLABEL_MAX_ATTEMPTS", "4"),
        ]))
        .expect("options must parse");

        assert_eq!(options.base_url, "https://api.example");
        assert_eq!(options.connect_timeout, Duration::from_secs(5));
        assert_eq!(options.write_timeout, Duration::from_secs(9));
        assert_eq!(options.log_level, LogLevel::Body);
        assert_eq!(options.retry.max_attempts, 4);
    }

    #[test]
    fn from_env_requires_base_url() {
        let err = ClientOptions::from_lookup(lookup(&[])).expect_err("must fail");
        assert!(matches!(err, ConfigError::MissingVar("FOODLABEL_BASE_URL")));

        let err = ClientOptions::from_lookup(lookup(&[("FOODLABEL_BASE_URL", "  ")]))
            .expect_err("must fail");
        assert!(matches!(err, ConfigError::EmptyVar(_)));
    }

    #[test]
    fn from_env_rejects_bad_values() {
        let err = ClientOptions::from_lookup(lookup(&[
            ("FOODLABEL_BASE_URL", "https://api.example"),
            ("FOODLABEL_LOG_LEVEL", "verbose"),
        ]))
        .expect_err("must fail");
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                name: "FOODLABEL_LOG_LEVEL",
                ..
            }
        ));

        let err = ClientOptions::from_lookup(lookup(&[
            ("FOODLABEL_BASE_URL", "https://api.example"),
            ("FOODLABEL_MAX_ATTEMPTS", "0"),
        ]))
        .expect_err("must fail");
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
