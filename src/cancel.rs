//! Cooperative cancellation for store operations.
//!
//! A [`Canceller`] / [`CancelSignal`] pair wraps a `tokio::sync::watch` channel
//! holding a single flag. Operations check the signal at their boundaries
//! (before starting, between purge steps); nothing is unwound mid-mutation.
//!
//! ```rust
//! use spitedb_memory::cancel;
//!
//! let (canceller, signal) = cancel::channel();
//! assert!(!signal.is_cancelled());
//! canceller.cancel();
//! assert!(signal.is_cancelled());
//! ```

use tokio::sync::watch;

use crate::error::{Error, Result};

/// Creates a connected canceller/signal pair.
pub fn channel() -> (Canceller, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (Canceller { tx }, CancelSignal { rx: Some(rx) })
}

/// The sending half. Cancelling is idempotent.
#[derive(Debug)]
pub struct Canceller {
    tx: watch::Sender<bool>,
}

impl Canceller {
    /// Fires the signal.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Returns a new signal connected to this canceller.
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: Some(self.tx.subscribe()),
        }
    }
}

/// The receiving half, passed to store operations. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    // None = never cancelled
    rx: Option<watch::Receiver<bool>>,
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn none() -> Self {
        Self { rx: None }
    }

    /// Returns true once the canceller has fired.
    ///
    /// Dropping the canceller without firing does not cancel.
    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Returns `Err(Error::Cancelled)` if the signal has fired.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves once the signal fires. Never resolves for [`CancelSignal::none`]
    /// or when the canceller is dropped without firing.
    pub async fn cancelled(&mut self) {
        match self.rx.as_mut() {
            Some(rx) => {
                if rx.wait_for(|cancelled| *cancelled).await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
            None => std::future::pending::<()>().await,
        }
    }
}
