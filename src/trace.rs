//! Log output setup.
//!
//! Events go to stderr so stdout only carries the run summaries. The filter
//! is read from `RUST_LOG`; lock hand-overs are logged at `trace`, single
//! pushes and pops at `debug`.
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "mt_queue_demo=info";

pub fn init_tracing()
{
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_timer(fmt::time::uptime())
        )
        .with(filter)
        .init();
}
