//! Graceful shutdown shared by the server, maker, and flow loops.

use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Returns a token that fires when the process receives ctrl-c. Loops check
/// it between ticks; individual engine calls are short and never cancelled
/// mid-operation.
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let tc = token.clone();
    tokio::spawn(async move {
        signal::ctrl_c()
            .await
            .expect("failed to install ctrl+C handler");
        tc.cancel();
    });
    token
}
