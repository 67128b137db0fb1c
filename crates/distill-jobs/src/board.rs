//! Read projection of every Job Record.
//!
//! The board is what reporting layers read. Queued jobs are owned by the
//! board itself; once admitted, the pipeline running a job owns its record
//! and publishes a copy here after every change.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use uuid::Uuid;

use distill_core::{Job, JobReport};

#[derive(Default)]
pub struct JobBoard {
    jobs: RwLock<HashMap<Uuid, Job>>,
}

impl JobBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, Job>> {
        self.jobs.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, Job>> {
        self.jobs.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert(&self, job: Job) {
        self.write().insert(job.id, job);
    }

    /// Publish the worker's copy of a running job.
    ///
    /// The stop flag is read under the board lock so a concurrent stop
    /// request is never overwritten by a stale copy.
    pub fn publish(&self, job: &mut Job, cancel: &AtomicBool) {
        let mut jobs = self.write();
        if cancel.load(Ordering::SeqCst) {
            job.cancel_requested = true;
        }
        jobs.insert(job.id, job.clone());
    }

    /// Mutate a job in place, returning the closure's result.
    pub fn update<R>(&self, id: Uuid, f: impl FnOnce(&mut Job) -> R) -> Option<R> {
        self.write().get_mut(&id).map(f)
    }

    pub fn get(&self, id: Uuid) -> Option<Job> {
        self.read().get(&id).cloned()
    }

    pub fn report(&self, id: Uuid) -> Option<JobReport> {
        self.read().get(&id).map(Job::report)
    }

    /// All jobs in submission order.
    pub fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.read().values().cloned().collect();
        jobs.sort_by_key(|j| (j.created_at, j.id));
        jobs
    }

    pub fn reports(&self) -> Vec<JobReport> {
        self.list().iter().map(Job::report).collect()
    }

    pub fn remove(&self, id: Uuid) -> Option<Job> {
        self.write().remove(&id)
    }
}
