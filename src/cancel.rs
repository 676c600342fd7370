//! Cancellation source for region decodes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use enough::{Stop, StopReason};

/// A cloneable cancellation flag.
///
/// Clones share the flag, so one clone can be handed to the decoding thread
/// while another stays with whoever may cancel. Decodes poll it through
/// [`Stop`]; the request is honored at the next safe point.
///
/// ```
/// use zenregion::{CancelToken, Stop};
///
/// let token = CancelToken::new();
/// let remote = token.clone();
/// assert!(token.check().is_ok());
/// remote.cancel();
/// assert!(token.check().is_err());
/// ```
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

impl Stop for CancelToken {
    fn check(&self) -> Result<(), StopReason> {
        if self.is_cancelled() {
            Err(StopReason::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let a = CancelToken::new();
        let b = a.clone();
        assert!(!b.is_cancelled());
        a.cancel();
        assert!(b.is_cancelled());
        assert!(matches!(b.check(), Err(StopReason::Cancelled)));
    }

    #[test]
    fn cancel_from_another_thread() {
        let token = CancelToken::new();
        let remote = token.clone();
        std::thread::spawn(move || remote.cancel()).join().unwrap();
        assert!(token.check().is_err());
    }
}
