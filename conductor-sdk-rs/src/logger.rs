use colored::Colorize;
use std::env;
use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber with colorized, single-line
/// output. `RUST_LOG` controls the level filter (default: info).
pub fn init_logging() {
    if env::var("RUST_LOG").is_err() {
        unsafe { env::set_var("RUST_LOG", "info") };
    }

    colored::control::set_override(true);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_ansi(true)
        .with_writer(std::io::stdout)
        .event_format(LineFormatter)
        .init();
}

struct LineFormatter;

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for LineFormatter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: tracing_subscriber::fmt::format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");
        let level = match *event.metadata().level() {
            tracing::Level::ERROR => "ERROR".red().bold(),
            tracing::Level::WARN => " WARN".yellow().bold(),
            tracing::Level::INFO => " INFO".green().bold(),
            tracing::Level::DEBUG => "DEBUG".blue().bold(),
            tracing::Level::TRACE => "TRACE".magenta().bold(),
        };

        write!(writer, "{} {} ", timestamp.to_string().dimmed(), level)?;

        let mut collector = FieldCollector::default();
        event.record(&mut collector);
        writeln!(writer, "{}", collector.line)
    }
}

#[derive(Default)]
struct FieldCollector {
    line: String,
}

impl tracing::field::Visit for FieldCollector {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        use std::fmt::Write;
        if field.name() == "message" {
            let _ = write!(self.line, "{value:?}");
        } else {
            let _ = write!(self.line, " {}={:?}", field.name(), value);
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        use std::fmt::Write;
        if field.name() == "message" {
            let _ = write!(self.line, "{value}");
        } else {
            let _ = write!(self.line, " {}={}", field.name(), value);
        }
    }
}
