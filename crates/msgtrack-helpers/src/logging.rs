#[cfg(target_os = "linux")]
use std::env;
use std::io;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Where log events end up after [`init_logging`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Journald,
    Stderr,
}

/// Installs the global subscriber.
///
/// The filter comes from `env_key`, then `RUST_LOG`, then `default_filter`.
/// Under systemd events go to journald; everywhere else they are formatted
/// on stderr so stdout stays free for record output.
pub fn init_logging(
    default_filter: &str,
    env_key: &str,
    service_name: &str
) -> LogTarget {
    #[cfg(not(target_os = "linux"))]
    let _ = service_name;

    let env_filter = build_env_filter(default_filter, env_key);

    #[cfg(target_os = "linux")]
    {
        if is_running_under_systemd() {
            match tracing_journald::layer() {
                Ok(layer) => {
                    tracing_subscriber::registry()
                        .with(env_filter)
                        .with(layer.with_syslog_identifier(service_name.to_string()))
                        .init();
                    return LogTarget::Journald;
                }
                Err(err) => {
                    eprintln!(
                        "{service_name}: journald init failed, logging to stderr: {err}"
                    );
                }
            }
        }
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
    LogTarget::Stderr
}

fn build_env_filter(
    default_filter: &str,
    env_key: &str
) -> EnvFilter {
    EnvFilter::try_from_env(env_key)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_filter))
}

#[cfg(target_os = "linux")]
#[inline]
fn is_running_under_systemd() -> bool {
    env::var_os("JOURNAL_STREAM").is_some()
        || env::var_os("INVOCATION_ID").is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_default_filter() {
        let filter = build_env_filter(
            "msgtrack_ingest=debug",
            "MSGTRACK_TEST_UNSET_LOG_KEY"
        );
        let rendered = filter.to_string();
        if std::env::var_os("RUST_LOG").is_none() {
            assert_eq!(rendered, "msgtrack_ingest=debug");
        }
    }
}
