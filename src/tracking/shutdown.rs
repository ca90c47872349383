use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Turns an interrupt (Ctrl-C) into cancellation of `cancelation`. The command loop treats it
/// like the end of input, so a running session is still saved.
pub async fn detect_shutdown(cancelation: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => {
                info!("Received interrupt, shutting down");
                cancelation.cancel();
            }
            Err(e) => error!("Failed to listen for interrupts {e:?}"),
        },
        _ = cancelation.cancelled() => (),
    };
}
