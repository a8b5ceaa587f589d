// Allow panic/unwrap/expect in tests (denied globally via Cargo.toml lints)
#![cfg_attr(
    test,
    allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic_in_result_fn,
        clippy::unwrap_in_result,
        clippy::indexing_slicing
    )
)]

pub mod cleanup;
pub mod config;
pub mod fingerprint;
pub mod fleet;
pub mod ledger;
pub mod logging;
pub mod reconcile;
pub mod refresh;
pub mod store;
pub mod sync;
pub mod transport;
pub mod utils;

// Re-export commonly used types
pub use cleanup::{cleanup_store, CleanupError, CleanupOptions, CleanupReport};
pub use config::{load_config, ConfigError, FleetConfig};
pub use fingerprint::{
    file_size, full_digest, quick_digest, FingerprintError, Level, LevelSelector,
};
pub use fleet::{
    counts_consistent, export_model_list, group_by_count, parse_server_list, verify_counts,
    CountReport, FleetError, ServerCounts,
};
pub use ledger::{load_ledger, save_ledger, Fingerprint, Ledger, LedgerEntry, LedgerError};
pub use reconcile::{
    classify, reconcile, reconcile_level, Classification, LevelReport, Mismatch, ReconcileReport,
};
pub use refresh::{refresh_store, PurgedFile, RefreshError, RefreshOptions, RefreshReport};
pub use store::{ModelStore, RemoteSpec, StoreError};
pub use sync::{
    run_fleet_sync, FleetOutcome, ProgressEvent, ServerOutcome, SyncError, SyncOptions, SyncPhase,
};
pub use transport::{Transport, TransportError};
