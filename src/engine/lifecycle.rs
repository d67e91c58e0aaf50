// Engine lifecycle: state machine + single-instance token

use super::EngineError;
use std::sync::atomic::{AtomicBool, Ordering};

/// Where an engine is in its life.
///
/// ```text
/// Uninitialized -> Initialized -> Running -> ShuttingDown -> Destroyed
/// ```
///
/// Shutdown may also start from `Uninitialized` (init failed) or
/// `Initialized` (quit before the first frame).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Initialized,
    Running,
    ShuttingDown,
    Destroyed,
}

impl LifecycleState {
    pub fn can_advance_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;

        matches!(
            (self, next),
            (Uninitialized, Initialized)
                | (Initialized, Running)
                | (Uninitialized | Initialized | Running, ShuttingDown)
                | (ShuttingDown, Destroyed)
        )
    }

    pub fn advance(&mut self, next: LifecycleState) -> Result<(), EngineError> {
        if !self.can_advance_to(next) {
            return Err(EngineError::InvalidTransition { from: *self, to: next });
        }
        log::debug!("Engine state {:?} -> {:?}", self, next);
        *self = next;
        Ok(())
    }
}

static ENGINE_LIVE: AtomicBool = AtomicBool::new(false);

/// Proof that this is the only live engine in the process.
///
/// Released when dropped.
#[derive(Debug)]
pub struct EngineToken(());

impl EngineToken {
    pub fn acquire() -> Result<Self, EngineError> {
        ENGINE_LIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| EngineToken(()))
            .map_err(|_| EngineError::AlreadyRunning)
    }
}

impl Drop for EngineToken {
    fn drop(&mut self) {
        ENGINE_LIVE.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::LifecycleState::*;
    use super::*;

    #[test]
    fn normal_lifecycle() {
        let mut state = Uninitialized;
        for next in [Initialized, Running, ShuttingDown, Destroyed] {
            state.advance(next).unwrap();
        }
        assert_eq!(state, Destroyed);
    }

    #[test]
    fn failed_init_can_still_shut_down() {
        let mut state = Uninitialized;
        state.advance(ShuttingDown).unwrap();
        state.advance(Destroyed).unwrap();
    }

    #[test]
    fn rejects_skipping_and_going_back() {
        let mut state = Uninitialized;
        assert!(matches!(
            state.advance(Running),
            Err(EngineError::InvalidTransition { from: Uninitialized, to: Running })
        ));
        assert_eq!(state, Uninitialized);

        state.advance(Initialized).unwrap();
        assert!(state.advance(Uninitialized).is_err());
        assert!(!Destroyed.can_advance_to(Initialized));
        assert!(!Running.can_advance_to(Destroyed));
    }
}
