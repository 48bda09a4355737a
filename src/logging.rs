//! Logging and tracing initialization for conreald.
//!
//! Structured logging through the `tracing` ecosystem, with pretty console
//! output by default and JSON output for log aggregation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::Level;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Configuration for the logging system.
pub struct LogConfig {
    /// Output logs as JSON (for machine parsing)
    pub json: bool,
    /// Default level for the daemon's own targets
    pub level: Level,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            json: false,
            level: Level::INFO,
        }
    }
}

impl LogConfig {
    /// Map the `--debug` / `--verbose` flags to a level.
    pub fn from_flags(json: bool, debug: bool, verbose: bool) -> Self {
        let level = if debug {
            Level::TRACE
        } else if verbose {
            Level::DEBUG
        } else {
            Level::INFO
        };
        Self { json, level }
    }

    fn default_directives(&self) -> String {
        let level = self.level.as_str().to_lowercase();
        // mdns_sd reports every interface hiccup at error level while shutting down.
        format!("conreald={level},mdns_sd=warn")
    }
}

/// Initialize the tracing subscriber with the given configuration.
///
/// The level can be overridden at runtime via the `RUST_LOG` environment variable.
pub fn init(config: LogConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_directives()));

    if config.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_span_events(FmtSpan::CLOSE)
                    .with_current_span(true)
                    .with_target(true),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .init();
    }
}

/// A rate limiter for throttling repeated log messages.
///
/// ```ignore
/// let throttle = LogThrottle::new(Duration::from_secs(1));
///
/// if throttle.should_log() {
///     tracing::warn!(error = %e, "Transient accept error");
/// }
/// ```
pub struct LogThrottle {
    interval_ms: u64,
    /// Stores the last log time in ms, or u64::MAX to indicate "never logged"
    last_log_ms: AtomicU64,
    start: Instant,
}

const NEVER_LOGGED: u64 = u64::MAX;

impl LogThrottle {
    pub fn new(interval: std::time::Duration) -> Self {
        Self {
            interval_ms: interval.as_millis() as u64,
            last_log_ms: AtomicU64::new(NEVER_LOGGED),
            start: Instant::now(),
        }
    }

    /// Returns true if enough time has passed since the last log.
    pub fn should_log(&self) -> bool {
        let now_ms = self.start.elapsed().as_millis() as u64;
        let last = self.last_log_ms.load(Ordering::Relaxed);

        let should = last == NEVER_LOGGED || now_ms.saturating_sub(last) >= self.interval_ms;

        if should {
            // Losing the race means another caller just logged.
            self.last_log_ms
                .compare_exchange(last, now_ms, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn flags_select_level() {
        assert_eq!(LogConfig::from_flags(false, false, false).level, Level::INFO);
        assert_eq!(LogConfig::from_flags(false, false, true).level, Level::DEBUG);
        assert_eq!(LogConfig::from_flags(false, true, true).level, Level::TRACE);
    }

    #[test]
    fn directives_quiet_mdns() {
        let config = LogConfig::from_flags(false, false, true);
        assert_eq!(config.default_directives(), "conreald=debug,mdns_sd=warn");
    }

    #[test]
    fn throttle_allows_first_log() {
        let throttle = LogThrottle::new(Duration::from_secs(1));
        assert!(throttle.should_log());
    }

    #[test]
    fn throttle_blocks_immediate_second_log() {
        let throttle = LogThrottle::new(Duration::from_secs(1));
        assert!(throttle.should_log());
        assert!(!throttle.should_log());
    }
}
