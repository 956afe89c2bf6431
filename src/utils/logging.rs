// src/utils/logging.rs
//! Tracing subscriber setup
//!
//! The governor itself only emits `tracing` events; hosts that have no
//! subscriber of their own (and tests) can install one here. Honors
//! `RUST_LOG`, defaulting to `info`.

use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber; safe to call more than once
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_tracing();
        init_tracing();
    }
}
