use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// How long the operator API may keep draining after the shutdown token
/// fires before in-flight requests are abandoned.
pub const DRAIN_DEADLINE: Duration = Duration::from_secs(5);

/// Wire SIGINT and SIGTERM to a cancellation token for the given role.
///
/// The first signal cancels the token and lets the role drain: the
/// coordinator holds its API open up to [`DRAIN_DEADLINE`], a worker winds
/// down its registration and reconcile loops. A second signal skips
/// whatever drain remains and exits on the spot.
pub fn install_shutdown_handler(role: &'static str) -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
        tracing::info!(
            role,
            drain_deadline_secs = DRAIN_DEADLINE.as_secs(),
            "shutdown signal received, draining"
        );
        trigger.cancel();

        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
        tracing::warn!(role, "second shutdown signal, abandoning drain");
        std::process::exit(0);
    });

    token
}
