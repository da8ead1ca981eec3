use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::PipelineError;

/// Tracks sessions with an active run so at most one orchestrator drives a
/// session at a time.
#[derive(Clone, Default)]
pub struct RunRegistry {
    active: Arc<Mutex<HashSet<String>>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reserve `session_id`; the reservation lasts until the guard is dropped.
    pub fn claim(&self, session_id: &str) -> Result<RunGuard, PipelineError> {
        if !self.lock().insert(session_id.to_string()) {
            return Err(PipelineError::SessionBusy(session_id.to_string()));
        }
        Ok(RunGuard {
            registry: self.clone(),
            session_id: session_id.to_string(),
        })
    }

    pub fn is_active(&self, session_id: &str) -> bool {
        self.lock().contains(session_id)
    }

    pub fn active(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().iter().cloned().collect();
        ids.sort();
        ids
    }
}

pub struct RunGuard {
    registry: RunRegistry,
    session_id: String,
}

impl RunGuard {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_is_busy_until_guard_drops() {
        let registry = RunRegistry::new();
        let guard = registry.claim("s-1").unwrap();
        assert!(registry.is_active("s-1"));
        assert!(matches!(
            registry.claim("s-1"),
            Err(PipelineError::SessionBusy(id)) if id == "s-1"
        ));
        assert!(registry.claim("s-2").is_ok());

        drop(guard);
        assert!(!registry.is_active("s-1"));
        assert!(registry.claim("s-1").is_ok());
    }
}
