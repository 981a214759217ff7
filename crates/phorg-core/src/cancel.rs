use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::progress::Stage;

/// Set from a signal handler, polled by the run between files. Clones share
/// the flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn check(&self, stage: Stage) -> Result<(), CancelledError> {
        if self.is_cancelled() {
            return Err(CancelledError { stage });
        }
        Ok(())
    }
}

/// The run stopped before finishing `stage`. Files written by earlier
/// stages stay where they are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Run cancelled during the {stage} stage")]
pub struct CancelledError {
    pub stage: Stage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let token = CancellationToken::new();
        assert!(token.check(Stage::Scan).is_ok());

        token.clone().cancel();
        assert!(token.is_cancelled());
        let err = token.check(Stage::Apply).unwrap_err();
        assert_eq!(err, CancelledError { stage: Stage::Apply });
        assert_eq!(err.to_string(), "Run cancelled during the apply stage");
    }
}
