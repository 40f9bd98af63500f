//! # Job Registry
//!
//! Name-keyed map of scheduled jobs owned by one [`JobScheduler`](super::JobScheduler).
//! Replacing a job happens under the entry's shard lock: the predecessor is cancelled and
//! the successor spawned and installed before any other submission for that name can
//! observe the entry, so two submissions racing on one name never both survive.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use super::job::JobInfo;
use crate::execution::JobHandle;

#[derive(Debug, Clone)]
struct JobEntry {
    info: JobInfo,
    handle: JobHandle,
}

#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: DashMap<String, JobEntry>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the job described by `info`, cancelling an unfinished job of the same name
    /// first. `spawn` starts the new job and is called exactly once.
    pub fn replace<F>(&self, info: JobInfo, spawn: F) -> JobHandle
    where
        F: FnOnce() -> JobHandle,
    {
        match self.jobs.entry(info.name.clone()) {
            Entry::Occupied(mut occupied) => {
                let previous = &occupied.get().handle;
                if !previous.is_done() {
                    debug!(job = %info.name, "Cancelling job replaced by a new submission");
                    previous.cancel();
                }
                let handle = spawn();
                occupied.insert(JobEntry {
                    info,
                    handle: handle.clone(),
                });
                handle
            }
            Entry::Vacant(vacant) => {
                let handle = spawn();
                vacant.insert(JobEntry {
                    info,
                    handle: handle.clone(),
                });
                handle
            }
        }
    }

    /// Remove a job, returning its last known state and handle.
    pub fn remove(&self, name: &str) -> Option<(JobInfo, JobHandle)> {
        self.jobs
            .remove(name)
            .map(|(_, entry)| (entry.info.with_state(&entry.handle), entry.handle))
    }

    pub fn handle(&self, name: &str) -> Option<JobHandle> {
        self.jobs.get(name).map(|entry| entry.handle.clone())
    }

    pub fn info(&self, name: &str) -> Option<JobInfo> {
        self.jobs
            .get(name)
            .map(|entry| entry.info.clone().with_state(&entry.handle))
    }

    /// Snapshot of every registered job, ordered by name.
    pub fn list(&self) -> Vec<JobInfo> {
        let mut jobs: Vec<JobInfo> = self
            .jobs
            .iter()
            .map(|entry| entry.info.clone().with_state(&entry.handle))
            .collect();
        jobs.sort_by(|a, b| a.name.cmp(&b.name));
        jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
