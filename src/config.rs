use std::time::Duration;

use clap::Args;

use crate::Error;

pub const DEFAULT_ADDR: &str = "127.0.0.1:6379";
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8192;
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 100;
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 1000;

/// Settings of a single dispatcher. Every field can also be set from the environment when parsed
/// as command line arguments.
#[derive(Args, Clone, Debug, PartialEq)]
pub struct Config {
    /// Address of the server, `host:port`
    #[arg(short, long, env = "RESPLINE_ADDR", default_value = DEFAULT_ADDR)]
    pub addr: String,

    /// Password sent with AUTH on every (re)connect
    #[arg(long, env = "RESPLINE_PASSWORD")]
    pub password: Option<String>,

    /// Size in bytes of the socket read buffer
    #[arg(long, env = "RESPLINE_READ_BUFFER_SIZE", default_value_t = DEFAULT_READ_BUFFER_SIZE)]
    pub read_buffer_size: usize,

    /// Upper bound in milliseconds on a single wait for socket readiness
    #[arg(long, env = "RESPLINE_POLL_TIMEOUT_MS", default_value_t = DEFAULT_POLL_TIMEOUT_MS)]
    pub poll_timeout_ms: u64,

    /// Pause in milliseconds between reconnection attempts
    #[arg(long, env = "RESPLINE_RECONNECT_DELAY_MS", default_value_t = DEFAULT_RECONNECT_DELAY_MS)]
    pub reconnect_delay_ms: u64,
}

impl Config {
    pub fn new(addr: impl Into<String>) -> Config {
        Config {
            addr: addr.into(),
            ..Config::default()
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Config {
        self.password = Some(password.into());
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Config {
        self.read_buffer_size = size;
        self
    }

    /// Timeouts are kept in whole milliseconds: a shorter non-zero duration rounds up to 1 ms and
    /// anything beyond `u64::MAX` ms saturates.
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Config {
        self.poll_timeout_ms = whole_millis(timeout);
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Config {
        self.reconnect_delay_ms = whole_millis(delay);
        self
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.read_buffer_size == 0 {
            return Err(Error::Config("read buffer size must be > 0".to_string()));
        }
        if self.poll_timeout_ms == 0 {
            return Err(Error::Config("poll timeout must be > 0".to_string()));
        }
        if self.addr.is_empty() {
            return Err(Error::Config("address must not be empty".to_string()));
        }
        Ok(())
    }
}

fn whole_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX)
}

impl Default for Config {
    fn default() -> Self {
        Config {
            addr: DEFAULT_ADDR.to_string(),
            password: None,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        config: Config,
    }

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.addr, "127.0.0.1:6379");
        assert_eq!(config.read_buffer_size, 8192);
        assert_eq!(config.reconnect_delay(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder() {
        let config = Config::new("localhost:7000")
            .with_password("secret")
            .with_read_buffer_size(16)
            .with_poll_timeout(Duration::from_millis(5))
            .with_reconnect_delay(Duration::from_millis(20));

        assert_eq!(config.addr, "localhost:7000");
        assert_eq!(config.password.as_deref(), Some("secret"));
        assert_eq!(config.poll_timeout(), Duration::from_millis(5));
        assert_eq!(config.reconnect_delay(), Duration::from_millis(20));
    }

    #[test]
    fn durations_round_to_whole_milliseconds() {
        let config = Config::default().with_poll_timeout(Duration::from_micros(300));
        assert_eq!(config.poll_timeout_ms, 1);
        assert!(config.validate().is_ok());

        let config = Config::default().with_poll_timeout(Duration::from_micros(2500));
        assert_eq!(config.poll_timeout(), Duration::from_millis(3));

        let config = Config::default().with_reconnect_delay(Duration::ZERO);
        assert_eq!(config.reconnect_delay_ms, 0);

        let config = Config::default().with_poll_timeout(Duration::MAX);
        assert_eq!(config.poll_timeout_ms, u64::MAX);

        let config = Config::default().with_poll_timeout(Duration::ZERO);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn rejects_empty_read_buffer() {
        let config = Config::default().with_read_buffer_size(0);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn parses_arguments() {
        let cli = Cli::parse_from([
            "respline",
            "--addr",
            "10.0.0.1:6380",
            "--password",
            "pw",
            "--read-buffer-size",
            "1024",
        ]);

        assert_eq!(cli.config.addr, "10.0.0.1:6380");
        assert_eq!(cli.config.password.as_deref(), Some("pw"));
        assert_eq!(cli.config.read_buffer_size, 1024);
        assert_eq!(cli.config.poll_timeout_ms, DEFAULT_POLL_TIMEOUT_MS);
    }
}
