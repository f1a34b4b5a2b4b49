//! Shared helpers for the Tranca integration tests.

use std::sync::Arc;

use tranca_backend::MemoryBackend;
use tranca_client::LockClient;

/// A fresh in-process backend plus one client attached to it. Tests that
/// simulate multiple processes attach further clients to the returned
/// backend.
pub fn test_client() -> (Arc<MemoryBackend>, LockClient) {
    let backend = Arc::new(MemoryBackend::new());
    let client = LockClient::new(backend.clone());
    (backend, client)
}

/// Opt-in tracing output for debugging a failing test, driven by
/// `RUST_LOG`. Safe to call from every test; only the first call wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
