use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "graphboard=info";

/// Install the global `fmt` subscriber. `RUST_LOG` overrides
/// [`DEFAULT_FILTER`]. Calling this twice is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());

    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_err()
    {
        tracing::debug!("Tracing subscriber already installed");
    }
}
