use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Resolves on the first SIGINT or SIGTERM.
pub async fn shutdown_signal() -> std::io::Result<()> {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())?;

    tokio::select! {
        _ = term.recv() => {},
        _ = interrupt.recv() => {},
    };

    info!("shutting down gracefully...");
    Ok(())
}

/// Cloneable view of the process shutdown state, checked by every work loop.
#[derive(Clone)]
pub struct Shutdown {
    receiver: watch::Receiver<bool>,
}

pub struct ShutdownTrigger {
    sender: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }
}

impl Shutdown {
    /// A shutdown that only fires when the returned trigger is used.
    pub fn manual() -> (ShutdownTrigger, Shutdown) {
        let (sender, receiver) = watch::channel(false);
        (ShutdownTrigger { sender }, Shutdown { receiver })
    }

    /// A shutdown wired to the process signals.
    pub fn from_signals() -> Shutdown {
        let (trigger, shutdown) = Self::manual();
        tokio::spawn(async move {
            match shutdown_signal().await {
                Ok(()) => trigger.trigger(),
                Err(err) => {
                    error!("failed to install signal handlers: {}", err);
                    // Keep the trigger alive so waiters are not released.
                    std::future::pending::<()>().await;
                }
            }
        });
        shutdown
    }

    pub fn is_triggered(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once shutdown has been triggered.
    pub async fn wait(&mut self) {
        if self.receiver.wait_for(|triggered| *triggered).await.is_err() {
            debug!("shutdown trigger dropped");
        }
    }
}
