mod atomic;

pub use atomic::atomic_write;

/// File name of the persisted ledger inside a model store.
pub const LEDGER_FILENAME: &str = "sha256-list.csv";

/// Recognized model-file suffixes. Anything else in a store is left alone.
pub const MODEL_SUFFIXES: &[&str] = &[".ckpt", ".ckpt-tensordata"];

/// Check whether a filename is a recognized model file.
///
/// The ledger's own persisted file is excluded even though it sits in the
/// same directory.
#[must_use]
pub fn is_model_file(name: &str) -> bool {
    name != LEDGER_FILENAME && MODEL_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// Local cache filename for the ledger of a remote store, keyed by hostname.
#[must_use]
pub fn ledger_cache_filename(hostname: &str) -> String {
    format!("sha256-list-{hostname}.csv")
}

/// Format a byte count in human-readable form.
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    for unit in &UNITS[..UNITS.len() - 1] {
        if size < 1024.0 {
            return format!("{size:.2} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.2} {}", UNITS[UNITS.len() - 1])
}

/// Format a path for display, replacing the home directory with ~/
#[must_use]
pub fn format_display_path(path: &str) -> String {
    replace_homedir::replace_homedir(path, "~")
}
