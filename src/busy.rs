use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::OniError;

#[derive(Debug, Default)]
struct BusyInner {
    busy: bool,
    label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusySnapshot {
    pub busy: bool,
    pub label: String,
}

/// Shared "operation in progress" flag. At most one [`BusyGuard`] exists at a
/// time; dropping it clears the flag.
#[derive(Debug, Clone, Default)]
pub struct BusyState {
    inner: Arc<Mutex<BusyInner>>,
}

impl BusyState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_begin(&self, label: &str) -> Result<BusyGuard, OniError> {
        let mut inner = lock(&self.inner);
        if inner.busy {
            return Err(OniError::Busy(inner.label.clone()));
        }
        inner.busy = true;
        inner.label = label.to_string();
        Ok(BusyGuard {
            inner: self.inner.clone(),
        })
    }

    pub fn is_busy(&self) -> bool {
        lock(&self.inner).busy
    }

    pub fn label(&self) -> String {
        lock(&self.inner).label.clone()
    }

    pub fn snapshot(&self) -> BusySnapshot {
        let inner = lock(&self.inner);
        BusySnapshot {
            busy: inner.busy,
            label: inner.label.clone(),
        }
    }
}

#[must_use = "the busy flag is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct BusyGuard {
    inner: Arc<Mutex<BusyInner>>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        let mut inner = lock(&self.inner);
        inner.busy = false;
        inner.label.clear();
    }
}

// A panic while the flag is held must not leave it stuck.
fn lock(inner: &Mutex<BusyInner>) -> MutexGuard<'_, BusyInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn guard_sets_and_clears() {
        let state = BusyState::new();
        {
            let _guard = state.try_begin("Retrieving collection info...").unwrap();
            assert_eq!(
                state.snapshot(),
                BusySnapshot {
                    busy: true,
                    label: "Retrieving collection info...".to_string(),
                }
            );
        }
        assert!(!state.is_busy());
        assert_eq!(state.label(), "");
    }

    #[test]
    fn second_begin_is_rejected() {
        let state = BusyState::new();
        let _guard = state.try_begin("first").unwrap();
        let err = state.clone().try_begin("second").unwrap_err();
        assert_matches!(err, OniError::Busy(label) if label == "first");
    }

    #[test]
    fn cleared_on_error_path() {
        fn failing(state: &BusyState) -> Result<(), OniError> {
            let _guard = state.try_begin("working")?;
            Err(OniError::Conversion("boom".to_string()))
        }

        let state = BusyState::new();
        assert!(failing(&state).is_err());
        assert!(!state.is_busy());
        assert!(state.try_begin("again").is_ok());
    }

    #[test]
    fn cleared_on_panic() {
        let state = BusyState::new();
        let shared = state.clone();
        let result = std::thread::spawn(move || {
            let _guard = shared.try_begin("doomed").unwrap();
            panic!("operation panicked");
        })
        .join();
        assert!(result.is_err());
        assert!(!state.is_busy());
    }
}
