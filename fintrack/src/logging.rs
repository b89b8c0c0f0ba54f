//! Tracing subscriber setup.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::api::HTTP_LOG_TARGET;

/// Environment variable holding an `EnvFilter` directive string.
pub const LOG_ENV: &str = "FINTRACK_LOG";

/// Default level for a `-v` count.
pub const fn default_level(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

fn build_filter(env: Option<&str>, verbosity: u8, log_http: bool) -> EnvFilter {
    let mut filter = env
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(default_level(verbosity)));

    if log_http {
        if let Ok(directive) = format!("{HTTP_LOG_TARGET}=info").parse() {
            filter = filter.add_directive(directive);
        }
    }
    filter
}

/// Install the global subscriber, writing to stderr.
///
/// `FINTRACK_LOG` wins over `-v`. With `log_http` the request/response echo
/// is enabled regardless of level.
pub fn init(verbosity: u8, log_http: bool) {
    let env = std::env::var(LOG_ENV).ok();
    let filter = build_filter(env.as_deref(), verbosity, log_http);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbosity > 1),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_level() {
        assert_eq!(default_level(0), "warn");
        assert_eq!(default_level(1), "info");
        assert_eq!(default_level(5), "debug");
    }

    #[test]
    fn test_env_overrides_verbosity() {
        let filter = build_filter(Some("fintrack=trace"), 0, false);
        assert_eq!(filter.to_string(), "fintrack=trace");
    }

    #[test]
    fn test_invalid_env_falls_back() {
        let filter = build_filter(Some("fintrack=loud"), 1, false);
        assert_eq!(filter.to_string(), "info");
    }

    #[test]
    fn test_log_http_adds_directive() {
        let filter = build_filter(None, 0, true);
        assert!(filter.to_string().contains("fintrack::http=info"));
    }
}
