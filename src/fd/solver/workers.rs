use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::fd::domain::{Domain, DOMAIN_MAX, DOMAIN_MIN};
use crate::fd::solver::objective::Objective;


/// One accepted solution, as recorded into the shared log.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Solution {
    /// Worker that found it.
    pub worker: u32,
    /// Named variables with their concrete values.
    pub values: Vec<(String, Domain)>,
    /// Best objective value at the time of publication.
    pub best: Domain,
}


/// The state shared between workers. Compound updates happen under the
/// lock; the timeout flag is read without it and tolerates one-iteration
/// staleness.
#[derive(Debug)]
pub struct Shared {
    lock: Mutex<()>,
    workers: AtomicU32,
    workers_id: AtomicU32,
    best: AtomicI32,
    solutions: AtomicU64,
    timeout: AtomicBool,
    found: Mutex<Vec<Solution>>,
}

impl Shared {
    pub fn new(objective: Objective) -> Shared {
        let best = match objective {
            Objective::Any | Objective::All => 0,
            Objective::Min => DOMAIN_MAX,
            Objective::Max => DOMAIN_MIN,
        };
        Shared {
            lock: Mutex::new(()),
            workers: AtomicU32::new(1),
            workers_id: AtomicU32::new(1),
            best: AtomicI32::new(best),
            solutions: AtomicU64::new(0),
            timeout: AtomicBool::new(false),
            found: Mutex::new(Vec::new()),
        }
    }

    pub fn lock(&self) -> MutexGuard<()> {
        match self.lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }


    #[inline]
    pub fn workers(&self) -> u32 {
        self.workers.load(Ordering::Relaxed)
    }

    /// Claim a worker slot and a fresh worker id. Caller holds the lock.
    pub fn claim_worker(&self) -> u32 {
        self.workers.fetch_add(1, Ordering::Relaxed);
        self.workers_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn release_worker(&self) {
        self.workers.fetch_sub(1, Ordering::Relaxed);
    }


    #[inline]
    pub fn best(&self) -> Domain {
        self.best.load(Ordering::Relaxed)
    }

    pub fn set_best(&self, best: Domain) {
        self.best.store(best, Ordering::Relaxed);
    }


    #[inline]
    pub fn solutions(&self) -> u64 {
        self.solutions.load(Ordering::Relaxed)
    }

    /// Record a solution. Caller holds the lock.
    pub fn add_solution(&self, solution: Solution) {
        self.solutions.fetch_add(1, Ordering::Relaxed);
        match self.found.lock() {
            Ok(mut log) => log.push(solution),
            Err(poisoned) => poisoned.into_inner().push(solution),
        }
    }

    /// Snapshot of all recorded solutions.
    pub fn found(&self) -> Vec<Solution> {
        match self.found.lock() {
            Ok(log) => log.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }


    #[inline]
    pub fn timed_out(&self) -> bool {
        self.timeout.load(Ordering::Relaxed)
    }

    pub fn set_timeout(&self) {
        self.timeout.store(true, Ordering::Relaxed);
    }
}
