//! The ambient event logger the core writes through.
//!
//! A Splunk-style JSON line sink with call-site capture and severity
//! levels: `debug`/`info`/`warn`/`error`/`exception`, each taking an event
//! string and an optional field map. `EventLog` is the seam; the real sink
//! (`TracingEventLog`) is built on `tracing` + `tracing-subscriber`.

/// A single structured field.
pub type Field<'a> = (&'a str, &'a str);

/// The core logs through this trait exclusively; concrete call sites never
/// reach for `println!`/`eprintln!` directly.
pub trait EventLog: Send + Sync {
    fn debug(&self, event: &str, fields: &[Field]);
    fn info(&self, event: &str, fields: &[Field]);
    fn warn(&self, event: &str, fields: &[Field]);
    fn error(&self, event: &str, fields: &[Field]);
    /// For errors safely handled by the system, distinct from `error` for
    /// unhandled-but-reported failures.
    fn exception(&self, event: &str, fields: &[Field]);
}

/// Default sink: emits through `tracing`, whose field capture already
/// records call-site (file/line) automatically.
pub struct TracingEventLog;

impl EventLog for TracingEventLog {
    fn debug(&self, event: &str, fields: &[Field]) {
        tracing::debug!(fields = ?FieldList(fields), "{event}");
    }

    fn info(&self, event: &str, fields: &[Field]) {
        tracing::info!(fields = ?FieldList(fields), "{event}");
    }

    fn warn(&self, event: &str, fields: &[Field]) {
        tracing::warn!(fields = ?FieldList(fields), "{event}");
    }

    fn error(&self, event: &str, fields: &[Field]) {
        tracing::error!(fields = ?FieldList(fields), "{event}");
    }

    fn exception(&self, event: &str, fields: &[Field]) {
        tracing::error!(exception = true, fields = ?FieldList(fields), "{event}");
    }
}

/// Wrapper so `&[Field]` renders as a compact `{key=val, ...}` debug
/// string in the tracing output rather than a nested tuple-list.
struct FieldList<'a>(&'a [Field<'a>]);

impl std::fmt::Debug for FieldList<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (k, v) in self.0 {
            map.entry(k, v);
        }
        map.finish()
    }
}

/// Initialize the global `tracing` subscriber. `verbosity` follows the
/// standard `-v`/`-vv` convention: 0 = warn, 1 = info, 2 = debug, 3+ =
/// trace. When `logfile` is given, JSON lines are appended there instead
/// of stderr.
pub fn init_tracing(verbosity: u8, logfile: Option<&std::path::Path>) {
    use tracing_subscriber::EnvFilter;

    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).json();

    match logfile {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .unwrap_or_else(|e| panic!("opening log file {}: {e}", path.display()));
            builder.with_writer(move || file.try_clone().expect("clone log file handle")).init();
        }
        None => {
            builder.with_writer(std::io::stderr).init();
        }
    }
}

/// An in-memory `EventLog` for tests across this crate (and its
/// integration tests, which link the library outside `cfg(test)`) that
/// don't want to depend on the global `tracing` subscriber.
pub mod test_support {
    use super::{EventLog, Field};

    #[derive(Default)]
    pub struct RecordingLog {
        pub events: std::sync::Mutex<Vec<(String, String)>>,
    }

    impl RecordingLog {
        pub fn events(&self) -> Vec<(String, String)> {
            self.events.lock().unwrap().clone()
        }

        fn record(&self, level: &str, event: &str) {
            self.events
                .lock()
                .unwrap()
                .push((level.to_string(), event.to_string()));
        }
    }

    impl EventLog for RecordingLog {
        fn debug(&self, event: &str, _fields: &[Field]) {
            self.record("DEBUG", event);
        }
        fn info(&self, event: &str, _fields: &[Field]) {
            self.record("INFO", event);
        }
        fn warn(&self, event: &str, _fields: &[Field]) {
            self.record("WARN", event);
        }
        fn error(&self, event: &str, _fields: &[Field]) {
            self.record("ERROR", event);
        }
        fn exception(&self, event: &str, _fields: &[Field]) {
            self.record("EXCEPTION", event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::RecordingLog;

    #[test]
    fn recording_log_captures_level_and_event() {
        use super::EventLog;
        let log = RecordingLog::default();
        log.info("hello", &[("k", "v")]);
        log.error("oops", &[]);
        let events = log.events();
        assert_eq!(events[0], ("INFO".to_string(), "hello".to_string()));
        assert_eq!(events[1], ("ERROR".to_string(), "oops".to_string()));
    }
}
