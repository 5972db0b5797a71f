//! Abandonment signal shared between the listener and a running pipeline.
//!
//! A request is abandoned when its client disconnects or when the request
//! deadline passes. The first cause wins.

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonReason {
    ClientClosed,
    TimedOut,
}

impl AbandonReason {
    /// Status recorded for the request: 499 for a closed client, 504 for a
    /// missed deadline.
    pub fn status_code(&self) -> u16 {
        match self {
            AbandonReason::ClientClosed => 499,
            AbandonReason::TimedOut => 504,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Abandonment {
    tx: Arc<watch::Sender<Option<AbandonReason>>>,
}

impl Default for Abandonment {
    fn default() -> Self {
        Self::new()
    }
}

impl Abandonment {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Mark the request abandoned. Returns `false` if it already was.
    pub fn abandon(&self, reason: AbandonReason) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        })
    }

    pub fn reason(&self) -> Option<AbandonReason> {
        *self.tx.borrow()
    }

    /// Resolve once the request is abandoned.
    pub async fn wait(&self) -> AbandonReason {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(reason) = *rx.borrow_and_update() {
                return reason;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Guard that reports [`AbandonReason::ClientClosed`] if dropped before
    /// being disarmed, e.g. when hyper drops the service future because the
    /// connection went away.
    pub fn disconnect_guard(&self) -> DisconnectGuard {
        DisconnectGuard {
            abandonment: Some(self.clone()),
        }
    }
}

pub struct DisconnectGuard {
    abandonment: Option<Abandonment>,
}

impl DisconnectGuard {
    pub fn disarm(mut self) {
        self.abandonment = None;
    }
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if let Some(abandonment) = self.abandonment.take()
            && abandonment.abandon(AbandonReason::ClientClosed)
        {
            tracing::debug!("client disconnected before the response was ready");
        }
    }
}
