//! Subscriber setup shared by the binaries.

use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_FILTER: &str = "vidrelay_tools=info,backend=info,fetch_video=info";

/// Installs a fmt subscriber honouring `RUST_LOG`, falling back to info
/// level for our own crates. Safe to call more than once.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }

    #[test]
    fn init_is_idempotent() {
        init();
        init();
    }
}
