//! Telemetry: tracing bootstrap and the subsystem self-description trait.
//!
//! # Usage
//!
//! ```no_run
//! use tessera_core::telemetry;
//!
//! fn main() {
//!     telemetry::init_dev_subscriber();
//!     tracing::info!("Application started");
//! }
//! ```

use tracing_subscriber::EnvFilter;

/// Initialize a stderr subscriber for development.
///
/// Honors the `RUST_LOG` environment variable for filtering (e.g.
/// `RUST_LOG=tessera_db=debug,info`); without it, DEBUG and above are shown.
/// Events carry the target module, file, and line number.
///
/// Call this once at application (or test harness) startup, not in library
/// code.
///
/// # Panics
/// Panics if a global subscriber has already been set.
pub fn init_dev_subscriber() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_line_number(true)
        .init();
}

/// Static configuration info exposed by a subsystem.
///
/// Implemented by each subsystem's info struct so startup diagnostics render
/// consistently across crates.
pub trait SubsystemInfo {
    /// Human-readable subsystem name (e.g., "Deref Map (RocksDB)").
    fn name(&self) -> &'static str;

    /// Key/value lines describing the subsystem's configuration.
    fn info_lines(&self) -> Vec<(&'static str, String)>;
}

/// Format a subsystem's info block for terminal output.
///
/// Produces the name as a header followed by aligned `key: value` lines.
pub fn format_subsystem_info(info: &dyn SubsystemInfo) -> String {
    let lines = info.info_lines();
    let width = lines.iter().map(|(k, _)| k.len()).max().unwrap_or(0);

    let mut out = String::new();
    out.push_str(info.name());
    out.push('\n');
    for (key, value) in &lines {
        out.push_str(&format!("  {key:width$}  {value}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    // Subscriber initialization is exercised from the tessera-db integration
    // tests; it cannot run here because set_global_default is once-per-process.

    struct Probe;

    impl SubsystemInfo for Probe {
        fn name(&self) -> &'static str {
            "Probe"
        }

        fn info_lines(&self) -> Vec<(&'static str, String)> {
            vec![("Cache Size", "64 MB".to_string()), ("Tables", "2".to_string())]
        }
    }

    #[test]
    fn format_includes_name_and_lines() {
        let rendered = format_subsystem_info(&Probe);
        assert!(rendered.starts_with("Probe\n"));
        assert!(rendered.contains("Cache Size"));
        assert!(rendered.contains("64 MB"));
        assert!(rendered.contains("Tables"));
    }
}
