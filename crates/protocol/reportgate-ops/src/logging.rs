//! Tracing setup for processes embedding the services.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global tracing subscriber.
///
/// Does nothing unless `verbose` is set or `RUST_LOG` is present. With
/// `verbose`, `reportgate` crates log at `debug` on top of `RUST_LOG`.
/// Returns `false` if a subscriber was already installed.
pub fn init_tracing(verbose: bool) -> bool {
    if !verbose && std::env::var_os("RUST_LOG").is_none() {
        return false;
    }

    let mut filter = EnvFilter::from_default_env();
    if verbose {
        for crate_name in ["reportgate_ops", "reportgate_gateway", "reportgate_store"] {
            if let Ok(directive) = format!("{crate_name}=debug").parse() {
                filter = filter.add_directive(directive);
            }
        }
    }

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init()
        .is_ok()
}
