//! Sequential activation worker

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::Activation;

/// Work done for each activation (screenshot, save, clipboard, notify)
///
/// Runs on a blocking thread; failures are the handler's own concern and
/// never reach the listener.
pub trait ActivationHandler: Send + Sync + 'static {
    fn handle(&self, activation: &Activation);
}

/// Drain the activation queue until every sender is gone
///
/// Each handler call finishes before the next one starts, so activations are
/// handled in the order their key events occurred.
pub async fn run_worker(mut activation_rx: mpsc::Receiver<Activation>, handler: Arc<dyn ActivationHandler>) {
    info!("activation worker started");

    while let Some(activation) = activation_rx.recv().await {
        debug!(%activation, "handling activation");
        let handler = Arc::clone(&handler);
        let seq = activation.seq;
        if let Err(e) = tokio::task::spawn_blocking(move || handler.handle(&activation)).await {
            error!(seq, error = %e, "activation handler panicked");
        }
    }

    info!("activation worker stopped");
}
