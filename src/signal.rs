use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing::info;

pub type SignalRx = mpsc::Receiver<SignalTo>;

/// Control messages surfaced to the update loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalTo {
    /// Run an update cycle now instead of waiting for the next tick.
    Reload,
    /// Shutdown cleanly between cycles.
    Shutdown,
    /// Shutdown immediately.
    Quit,
}

/// Spawns a task translating OS signals into [`SignalTo`] messages.
/// There is room for 2 messages at a time so the task never blocks.
pub fn watch() -> SignalRx {
    let (tx, rx) = mpsc::channel(2);

    let mut sigint = signal(SignalKind::interrupt()).expect("Failed to set up SIGINT handle");
    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to set up SIGTERM handle");
    let mut sigquit = signal(SignalKind::quit()).expect("Failed to set up SIGQUIT handle");
    let mut sighup = signal(SignalKind::hangup()).expect("Failed to set up SIGHUP handle");

    tokio::spawn(async move {
        loop {
            let to = tokio::select! {
                _ = sigint.recv() => {
                    info!(message = "Signal received", signal = "SIGINT");
                    SignalTo::Shutdown
                }
                _ = sigterm.recv() => {
                    info!(message = "Signal received", signal = "SIGTERM");
                    SignalTo::Shutdown
                }
                _ = sigquit.recv() => {
                    info!(message = "Signal received", signal = "SIGQUIT");
                    SignalTo::Quit
                }
                _ = sighup.recv() => {
                    info!(message = "Signal received", signal = "SIGHUP");
                    SignalTo::Reload
                }
            };

            if tx.send(to).await.is_err() {
                break;
            }
        }
    });

    rx
}
