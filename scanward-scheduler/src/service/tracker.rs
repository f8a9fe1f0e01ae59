//! Local job tracking
//!
//! Jobs executing on this instance, each with its own cancellation token
//! derived from the instance's shutdown token. A [`LocalJobGuard`] removes its
//! entry when the job task ends.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

struct Entry {
    generation: u64,
    token: CancellationToken,
}

#[derive(Default)]
pub struct LocalJobs {
    entries: Mutex<HashMap<Uuid, Entry>>,
    generations: AtomicU64,
}

impl LocalJobs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking a job, `None` if it is already tracked
    pub fn register(
        self: &Arc<Self>,
        job_id: Uuid,
        parent: &CancellationToken,
    ) -> Option<LocalJobGuard> {
        let mut entries = self.entries.lock().expect("local jobs lock poisoned");
        if entries.contains_key(&job_id) {
            return None;
        }

        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let token = parent.child_token();
        entries.insert(
            job_id,
            Entry {
                generation,
                token: token.clone(),
            },
        );

        Some(LocalJobGuard {
            jobs: Arc::clone(self),
            job_id,
            generation,
            token,
        })
    }

    pub fn contains(&self, job_id: Uuid) -> bool {
        let entries = self.entries.lock().expect("local jobs lock poisoned");
        entries.contains_key(&job_id)
    }

    pub fn ids(&self) -> Vec<Uuid> {
        let entries = self.entries.lock().expect("local jobs lock poisoned");
        let mut ids: Vec<Uuid> = entries.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("local jobs lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops local execution of a job, returns false if it was not tracked
    pub fn release(&self, job_id: Uuid) -> bool {
        let removed = self
            .entries
            .lock()
            .expect("local jobs lock poisoned")
            .remove(&job_id);

        match removed {
            Some(entry) => {
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Forgets every tracked job
    pub fn clear(&self) {
        self.entries.lock().expect("local jobs lock poisoned").clear();
    }

    fn remove_generation(&self, job_id: Uuid, generation: u64) {
        let mut entries = self.entries.lock().expect("local jobs lock poisoned");
        if entries
            .get(&job_id)
            .is_some_and(|entry| entry.generation == generation)
        {
            entries.remove(&job_id);
        }
    }
}

/// Tracking entry of one running job task
pub struct LocalJobGuard {
    jobs: Arc<LocalJobs>,
    job_id: Uuid,
    generation: u64,
    token: CancellationToken,
}

impl LocalJobGuard {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for LocalJobGuard {
    fn drop(&mut self) {
        self.jobs.remove_generation(self.job_id, self.generation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_once_until_guard_dropped() {
        let jobs = Arc::new(LocalJobs::new());
        let shutdown = CancellationToken::new();
        let id = Uuid::new_v4();

        let guard = jobs.register(id, &shutdown).unwrap();
        assert!(jobs.register(id, &shutdown).is_none());
        assert!(jobs.contains(id));

        drop(guard);
        assert!(jobs.is_empty());
        assert!(jobs.register(id, &shutdown).is_some());
    }

    #[test]
    fn test_release_cancels_job_token() {
        let jobs = Arc::new(LocalJobs::new());
        let shutdown = CancellationToken::new();
        let id = Uuid::new_v4();
        let guard = jobs.register(id, &shutdown).unwrap();

        assert!(jobs.release(id));
        assert!(guard.token().is_cancelled());
        assert!(!shutdown.is_cancelled());
        assert!(!jobs.release(id));
    }

    #[test]
    fn test_old_guard_does_not_remove_new_registration() {
        let jobs = Arc::new(LocalJobs::new());
        let shutdown = CancellationToken::new();
        let id = Uuid::new_v4();

        let old = jobs.register(id, &shutdown).unwrap();
        jobs.release(id);
        let _new = jobs.register(id, &shutdown).unwrap();
        drop(old);

        assert!(jobs.contains(id));
    }

    #[test]
    fn test_shutdown_cancels_children() {
        let jobs = Arc::new(LocalJobs::new());
        let shutdown = CancellationToken::new();
        let guard = jobs.register(Uuid::new_v4(), &shutdown).unwrap();

        shutdown.cancel();
        assert!(guard.token().is_cancelled());
    }
}
