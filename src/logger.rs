use log::{LevelFilter, Log, Metadata, Record};

const SEPARATOR: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

/// Writes to stderr so that traces printed on stdout stay machine-readable.
pub struct SimpleLogger;

impl Log for SimpleLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("{}", render(record));
        }
    }

    fn flush(&self) {}
}

fn render(record: &Record) -> String {
    // Output of the traced program's console calls
    if record.target() == "js-console" {
        let level_str = match record.level() {
            log::Level::Error => "ERROR",
            log::Level::Warn => "WARN",
            log::Level::Info => "INFO",
            log::Level::Debug => "DEBUG",
            log::Level::Trace => "TRACE",
        };
        return format!(
            "{sep}\n[JS Console.{level}] {message}\n{sep}",
            sep = SEPARATOR,
            level = level_str,
            message = record.args()
        );
    }

    let location = match (record.file(), record.line()) {
        (Some(file), Some(line)) => format!("{}:{}", file, line),
        (Some(file), None) => file.to_string(),
        (None, _) => String::from("unknown location"),
    };

    format!(
        "[{level}][{target}][{location}] {message}",
        level = record.level(),
        target = record.target(),
        location = location,
        message = record.args()
    )
}

pub fn init(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    static LOGGER: SimpleLogger = SimpleLogger;
    log::set_logger(&LOGGER).map(|()| log::set_max_level(level))
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;

    #[test]
    fn test_console_records_are_framed() {
        let rendered = render(
            &Record::builder()
                .target("js-console")
                .level(Level::Warn)
                .args(format_args!("careful"))
                .build(),
        );
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], SEPARATOR);
        assert_eq!(lines[1], "[JS Console.WARN] careful");
    }

    #[test]
    fn test_regular_records_show_target_and_location() {
        let rendered = render(
            &Record::builder()
                .target("trace")
                .level(Level::Info)
                .file(Some("src/trace/controller.rs"))
                .line(Some(42))
                .args(format_args!("Step 1/8"))
                .build(),
        );
        assert_eq!(rendered, "[INFO][trace][src/trace/controller.rs:42] Step 1/8");
    }
}
