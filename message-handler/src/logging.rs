//! # Host Logging
//!
//! The client and the handler only emit `tracing` events; nothing is printed
//! unless the embedding process installs a subscriber. Hosts that have no
//! subscriber of their own call [`init_logging`] once at startup.
//!
//! Events go to stderr so a binding that talks over stdout is not disturbed.
//! Each dispatched command runs inside a `command` span carrying its name and
//! a request id, so both formats show which call an event belongs to.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line text with source locations.
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// `"json"` in any case selects [`LogFormat::Json`]; every other name
    /// falls back to text.
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Installs a process-wide subscriber writing `format` to stderr.
///
/// `default_level` is an `EnvFilter` directive such as `"info"` or
/// `"iota_client::node_manager=debug,warn"`, used only when `RUST_LOG` is
/// unset. Returns whether this call installed the subscriber; when the host
/// already has one, nothing changes.
pub fn init_logging(default_level: &str, format: LogFormat) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true).with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .pretty()
                    .with_file(true)
                    .with_line_number(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    }
    .is_ok();

    if installed {
        tracing::debug!(?format, "subscriber installed");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_format_names_mean_text() {
        assert_eq!(LogFormat::from_name("Json"), LogFormat::Json);
        assert_eq!(LogFormat::from_name("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::from_name("logfmt"), LogFormat::Pretty);
    }

    #[test]
    fn existing_subscriber_is_left_alone() {
        init_logging("warn", LogFormat::Json);
        assert!(!init_logging("debug", LogFormat::Pretty));
    }
}
