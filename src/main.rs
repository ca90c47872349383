use std::time::Duration;

use anyhow::Result;
use time_tracker::{cli::run_cli, utils::runtime::single_thread_runtime};
use tracing::error;

/// Stdin is read on a blocking thread. After an interrupt that read may still be pending, so
/// the runtime is only given a short time to wind down.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(100);

fn main() -> Result<()> {
    let runtime = single_thread_runtime()?;
    let result = runtime.block_on(run_cli());
    runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);

    result.inspect_err(|e| {
        error!("Error running cli {e:?}");
    })
}
