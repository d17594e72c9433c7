//! # Prometheus Metrics
//!
//! Counters and latencies for dispatched commands. Every handler owns a
//! dedicated [`prometheus::Registry`], so several handlers in one process
//! never collide; the host decides whether and how to expose
//! [`HandlerMetrics::encode`].
//!
//! | Metric                             | Type      | Labels    |
//! |------------------------------------|-----------|-----------|
//! | `iota_commands_total`              | counter   | `command` |
//! | `iota_command_errors_total`        | counter   | `kind`    |
//! | `iota_command_duration_seconds`    | histogram | `command` |

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

use iota_client::ErrorKind;

/// Metric handles for one message handler.
#[derive(Clone)]
pub struct HandlerMetrics {
    registry: Registry,
    /// Commands received, by name. Unknown names count as `unknown`.
    pub commands_total: IntCounterVec,
    /// Failed commands, by error kind.
    pub command_errors_total: IntCounterVec,
    /// Time from dispatch to result, by command name.
    pub command_duration_seconds: HistogramVec,
}

impl HandlerMetrics {
    /// Creates and registers all metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("iota".into()), None)?;

        let commands_total = IntCounterVec::new(
            Opts::new("commands_total", "Total number of commands dispatched"),
            &["command"],
        )?;
        registry.register(Box::new(commands_total.clone()))?;

        let command_errors_total = IntCounterVec::new(
            Opts::new("command_errors_total", "Total number of failed commands"),
            &["kind"],
        )?;
        registry.register(Box::new(command_errors_total.clone()))?;

        let command_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "command_duration_seconds",
                "Command latency from dispatch to result in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
            ]),
            &["command"],
        )?;
        registry.register(Box::new(command_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            commands_total,
            command_errors_total,
            command_duration_seconds,
        })
    }

    pub(crate) fn observe(&self, command: &str, seconds: f64, error: Option<ErrorKind>) {
        self.commands_total.with_label_values(&[command]).inc();
        self.command_duration_seconds
            .with_label_values(&[command])
            .observe(seconds);
        if let Some(kind) = error {
            self.command_errors_total
                .with_label_values(&[kind.as_str()])
                .inc();
        }
    }

    /// All metrics in the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observations_show_up_in_the_exposition() {
        let metrics = HandlerMetrics::new().unwrap();
        metrics.observe("GetNode", 0.002, None);
        metrics.observe("GetNode", 0.003, Some(ErrorKind::NoSyncedNodeError));

        assert_eq!(metrics.commands_total.with_label_values(&["GetNode"]).get(), 2);
        let text = metrics.encode().unwrap();
        assert!(text.contains("iota_commands_total{command=\"GetNode\"} 2"));
        assert!(text.contains("iota_command_errors_total{kind=\"NoSyncedNodeError\"} 1"));
        assert!(text.contains("iota_command_duration_seconds_count{command=\"GetNode\"} 2"));
    }

    #[test]
    fn handlers_do_not_share_registries() {
        let a = HandlerMetrics::new().unwrap();
        let b = HandlerMetrics::new().unwrap();
        a.observe("GetTips", 0.1, None);
        assert_eq!(b.commands_total.with_label_values(&["GetTips"]).get(), 0);
    }
}
