//! Telemetry initialization.
//!
//! Controlled by `STOMPER_LOG_FORMAT`:
//! - unset or `"text"` → human-readable events to stderr
//! - `"json"` → JSON events to stderr (one object per line)
//!
//! Verbosity comes from `RUST_LOG` (tracing's standard env filter); the
//! default is `info`.

use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber for the binary.
///
/// Safe to call once; a second call is a no-op (the first subscriber wins).
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json = std::env::var("STOMPER_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        let _ = tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    }
}
