//! Write-once cancellation shared by every task of one race.
//!
//! The signal is a channel that never carries a message: firing it closes
//! the channel, which wakes every pending `recv` at once. Closing is
//! idempotent, so a trigger can be fired any number of times and observers
//! only ever see one transition.

/// Owning side of a cancellation signal.
///
/// Dropping the trigger fires it.
#[derive(Debug)]
pub struct Trigger {
    tx: async_channel::Sender<()>,
    rx: async_channel::Receiver<()>,
}

/// Observing side of a cancellation signal. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Signal {
    rx: async_channel::Receiver<()>,
}

/// Create a connected trigger/signal pair.
#[must_use]
pub fn pair() -> (Trigger, Signal) {
    let (tx, rx) = async_channel::bounded::<()>(1);
    let signal = Signal { rx: rx.clone() };
    (Trigger { tx, rx }, signal)
}

impl Trigger {
    /// Fire the signal. Returns `true` only for the call that fired it.
    pub fn cancel(&self) -> bool {
        self.tx.close()
    }

    /// Another observer of this trigger.
    #[must_use]
    pub fn signal(&self) -> Signal {
        Signal {
            rx: self.rx.clone(),
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.tx.is_closed()
    }
}

impl Drop for Trigger {
    fn drop(&mut self) {
        self.tx.close();
    }
}

impl Signal {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.rx.is_closed()
    }

    /// Resolve once the signal fires. Resolves immediately if it already has.
    pub async fn cancelled(&self) {
        // Nothing is ever sent, so `recv` only returns once the channel closes.
        let _ = self.rx.recv().await;
    }
}
