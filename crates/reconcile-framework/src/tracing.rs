//! # Logging Setup
//!
//! The engine logs through `tracing`. Every pass runs in a `pass` span and every
//! instance in a `reconcile` span carrying its key and kind, so a line like
//!
//! ```text
//! INFO pass{pass=2}:reconcile{key=access_point.main kind=access_point}: Ready target=access_point access_point.main (id ap-abc123)
//! ```
//!
//! reads as "pass 2, reconciling `access_point.main`". Lifecycle transitions log at
//! `info`, failures at `warn`, payloads (with sensitive values masked) at `debug`.
//!
//! Set `RUST_LOG` to control verbosity, e.g. `RUST_LOG=reconcile_framework=debug`.

/// Installs a compact fmt subscriber filtered by `RUST_LOG`.
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .try_init();
}
