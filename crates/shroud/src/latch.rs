//! single-fire completion signal
//!
//! reply-driven success, reply-driven failure and the timer may all race to
//! finish a run. the first caller to win the flag delivers the result, the
//! rest are no-ops.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::oneshot;

pub struct Latch {
    fired: AtomicBool,
    sender: Mutex<Option<oneshot::Sender<bool>>>,
}

impl Latch {
    pub fn new() -> (Self, oneshot::Receiver<bool>) {
        let (tx, rx) = oneshot::channel();
        let latch = Self {
            fired: AtomicBool::new(false),
            sender: Mutex::new(Some(tx)),
        };
        (latch, rx)
    }

    /// win the right to complete; true for exactly one caller
    pub fn claim(&self) -> bool {
        self.fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// hand the result to the receiver. only the claimant should call this
    pub fn deliver(&self, success: bool) {
        if let Some(tx) = self.sender.lock().take() {
            // receiver may already be gone
            let _ = tx.send(success);
        }
    }

    pub fn fire(&self, success: bool) -> bool {
        if !self.claim() {
            return false;
        }
        self.deliver(success);
        true
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}
