/// Application-level constants
pub const APP_NAME: &str = "Folio";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tracing filter when `RUST_LOG` is unset.
/// Keeps this crate at info and silences noisy dependencies.
pub fn default_log_filter() -> String {
    "folio_extract=info,warn".to_string()
}
