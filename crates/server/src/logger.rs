//! Stderr logger initialization, timestamped in UTC. A single append
//! target — this gateway has no OTEL collector or TUI to fan out to.

use jiff::{tz::TimeZone, Zoned};
use logforth::{append::Stderr, filter::EnvFilter, layout::Layout};
use std::{fmt::Write as _, io::IsTerminal, str::FromStr, sync::Once};

static INIT: Once = Once::new();

#[derive(Debug)]
struct UtcLayout {
    no_color: bool,
}

impl Layout for UtcLayout {
    fn format(
        &self,
        record: &log::Record<'_>,
        _diagnostics: &[Box<dyn logforth::diagnostic::Diagnostic>],
    ) -> anyhow::Result<Vec<u8>> {
        let mut output = String::new();
        let now = Zoned::now().with_time_zone(TimeZone::UTC);
        write!(output, "{} ", now.strftime("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level_str = if self.no_color {
            format!("{:>5}", record.level())
        } else {
            match record.level() {
                log::Level::Error => format!("\x1b[31m{:>5}\x1b[0m", record.level()),
                log::Level::Warn => format!("\x1b[33m{:>5}\x1b[0m", record.level()),
                log::Level::Info => format!("\x1b[32m{:>5}\x1b[0m", record.level()),
                log::Level::Debug => format!("\x1b[34m{:>5}\x1b[0m", record.level()),
                log::Level::Trace => format!("\x1b[35m{:>5}\x1b[0m", record.level()),
            }
        };

        write!(output, "{level_str}  {}", record.args())?;
        Ok(output.into_bytes())
    }
}

/// Initializes the global logger from a filter string (e.g. `"info"` or
/// `"server=debug,bridge=debug"`). Idempotent.
pub fn init(log_filter: &str) {
    let log_filter = log_filter.to_owned();
    INIT.call_once(move || {
        let layout = if std::io::stderr().is_terminal() {
            UtcLayout { no_color: false }
        } else {
            UtcLayout { no_color: true }
        };

        logforth::builder()
            .dispatch(move |d| {
                let filter = EnvFilter::from_str(&log_filter)
                    .unwrap_or_else(|_| EnvFilter::from_str("info").expect("default filter is valid"));
                d.filter(filter).append(Stderr::default().with_layout(layout))
            })
            .apply();
    });
}
