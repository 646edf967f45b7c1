use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::fd::constr::{Marker, VarId};
use crate::fd::domain::{Domain, Val};
use crate::fd::solver::objective::Objective;
use crate::fd::solver::propagate::PropError;
use crate::fd::solver::workers::Solution;
use crate::fd::solver::Solver;
use crate::fd::{trail, Error};


/// Iteration state of one decision level.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Step {
    pub active: bool,
    pub var: VarId,
    pub bounds: Val,
    pub iter: u32,
    pub seed: u32,
    pub bind_depth: usize,
    pub patch_depth: usize,
    pub marker: Marker,
}

impl Step {
    pub fn new() -> Step {
        Step {
            active: false,
            var: VarId(0),
            bounds: Val::value(0),
            iter: 0,
            seed: 0,
            bind_depth: 0,
            patch_depth: 0,
            marker: Marker::default(),
        }
    }
}


/// Restart bookkeeping: fail counting against a threshold that follows the
/// Luby sequence 1,1,2,1,1,2,4,...
#[derive(Clone, Debug)]
pub struct RestartSchedule {
    fails: u32,
    threshold: u64,
    counter: u64,
}

impl RestartSchedule {
    pub fn new() -> RestartSchedule {
        RestartSchedule {
            fails: 0,
            threshold: 1,
            counter: 1,
        }
    }

    #[inline]
    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Move the threshold along the Luby sequence (Knuth's rule).
    pub fn advance(&mut self) {
        if self.counter & self.counter.wrapping_neg() == self.threshold {
            self.counter += 1;
            self.threshold = 1;
        } else {
            self.threshold <<= 1;
        }
    }

    /// Count a failure; true when a restart is due.
    pub fn record_fail(&mut self, frequency: u64) -> bool {
        self.fails += 1;
        if self.fails as u64 > self.threshold * frequency {
            self.fails = 0;
            self.advance();
            return true;
        }
        false
    }
}

impl Default for RestartSchedule {
    fn default() -> Self {
        RestartSchedule::new()
    }
}


impl Solver {
    #[inline]
    fn found_any(&self) -> bool {
        self.objective == Objective::Any && self.shared.solutions() > 0
    }

    #[inline]
    fn is_restartable(&self) -> bool {
        self.objective == Objective::Any && self.settings.restart_freq > 0
    }

    #[inline]
    fn is_solution_restartable(&self) -> bool {
        self.objective != Objective::All
    }


    fn step_activate(&mut self, level: usize, var: VarId) {
        let bounds = self.store.term_val(self.env[var.0].term);
        let seed = if self.is_restartable() {
            self.rand.irand(0x8000_0000) as u32
        } else {
            0
        };
        let step = &mut self.steps[level];
        step.active = true;
        step.var = var;
        step.bounds = bounds;
        step.iter = 0;
        step.seed = seed;
    }

    fn step_deactivate(&mut self, level: usize) {
        let var = self.steps[level].var;
        self.order.push(&self.store, &mut self.env, var);
        self.steps[level].active = false;
    }

    fn step_enter(&mut self, level: usize, val: Domain) -> Result<(), Error> {
        let marker = self.store.mark();
        let patch_depth = self.patches.depth();
        let bind_depth = self.trail.depth();
        {
            let step = &mut self.steps[level];
            step.marker = marker;
            step.patch_depth = patch_depth;
            step.bind_depth = bind_depth;
        }

        let var = self.steps[level].var;
        if !self.store.is_const(self.env[var.0].term) {
            trail::bind(
                &mut self.trail,
                &mut self.store,
                &mut self.env,
                var,
                Val::value(val),
                None,
            )?;
        }
        Ok(())
    }

    fn step_leave(&mut self, level: usize) -> Result<(), Error> {
        let step = self.steps[level];
        trail::unbind(&mut self.trail, &mut self.store, &mut self.env, step.bind_depth);
        trail::unpatch(&mut self.patches, &mut self.store, step.patch_depth);
        self.store.release(step.marker)
    }

    // Whether the iteration interval still has values left.
    fn step_check(&self, level: usize) -> bool {
        let step = &self.steps[level];
        step.iter <= step.bounds.hi.wrapping_sub(step.bounds.lo) as u32
    }

    // Pick values ricocheting between the ends of the interval.
    fn step_val(&self, level: usize) -> Domain {
        let step = &self.steps[level];
        let i = step.iter;
        let lo = step.bounds.lo;
        let hi = step.bounds.hi;
        if (i ^ step.seed) & 1 != 0 {
            (hi as u32).wrapping_sub(i >> 1) as Domain
        } else {
            (lo as u32).wrapping_add(i >> 1) as Domain
        }
    }


    // Unwind search steps from `level` down to (and including) `stop`.
    fn unwind(&mut self, level: usize, stop: usize) -> Result<(), Error> {
        let mut i = level;
        while i.wrapping_add(1) != stop {
            self.step_leave(i)?;
            self.step_deactivate(i);
            i = i.wrapping_sub(1);
        }
        Ok(())
    }

    fn restart(&mut self, level: usize) -> Result<usize, Error> {
        self.unwind(level, self.min_level)?;
        Ok(self.min_level)
    }

    fn check_restart(&mut self) -> bool {
        if self.is_restartable() {
            if self.restarts.record_fail(self.settings.restart_freq) {
                self.stats.restarts += 1;
                return true;
            }
        }
        false
    }

    // Back-track until the pending conflict can be resolved, re-propagating
    // the asserting variable at each stop.
    fn conflict_backtrack(&mut self, mut level: usize) -> Result<usize, Error> {
        let mut failed = true;
        if self.confl.level <= level {
            self.unwind(level, level)?;
        }
        while failed && self.confl.level <= level {
            self.unwind(level.wrapping_sub(1), self.confl.level)?;
            level = self.confl.level;
            self.trail.set_level(level.wrapping_sub(1));
            let var = self.confl.var.expect("conflict without variable");
            failed = match self.propagate_clauses(var) {
                Ok(_) => false,
                Err(PropError::Conflict) => true,
                Err(PropError::Fatal(e)) => return Err(e),
            };
        }
        Ok(level)
    }


    // Propagate the consequences of the newest assignment.
    fn check_assignment(&mut self, var: VarId, level: usize) -> Result<bool, Error> {
        let mut failed = match self.propagate_clauses(var) {
            Ok(_) => false,
            Err(PropError::Conflict) => true,
            Err(PropError::Fatal(e)) => return Err(e),
        };

        if !failed {
            if let Some(obj) = self.obj_var {
                failed = match self.propagate_clauses(obj) {
                    Ok(_) => false,
                    Err(PropError::Conflict) => true,
                    Err(PropError::Fatal(e)) => return Err(e),
                };
            }
        }

        if failed {
            self.stats.cuts += 1;
            self.stats.cut_level += level as u64;
        }
        Ok(failed)
    }

    // Verify and publish a full assignment.
    fn update_solution(&mut self) -> bool {
        if !self.store.eval(self.root).is_true() {
            return false;
        }

        let guard = self.shared.lock();
        let mut updated = false;

        // print only solutions that are actually better, inside the lock to
        // avoid racing workers
        if !self.found_any() && self.objective_better() {
            self.objective_update_best();

            let values: Vec<(String, Domain)> = self.env[..self.search_vars]
                .iter()
                .map(|e| (e.name.clone(), self.store.term_val(e.term).lo))
                .collect();
            let best = self.shared.best();

            let mut line = format!("#{}: SOLUTION: ", self.worker_id);
            for (name, value) in values.iter() {
                line.push_str(&format!("{} = {}, ", name, value));
            }
            line.push_str(&format!("BEST: {}", best));
            println!("{}", line);

            self.shared.add_solution(Solution {
                worker: self.worker_id,
                values,
                best,
            });
            updated = true;
        }

        drop(guard);
        updated
    }


    fn print_stats(&mut self) {
        self.stats.alloc_max = self.store.peak_bytes();
        println!(
            "#{}: {}, SOLUTIONS: {}",
            self.worker_id,
            self.stats,
            self.shared.solutions()
        );
        self.stats.reset_levels();
    }

    fn update_stats(&mut self, level: usize) {
        self.stats.note_level(level);
        self.stats.calls += 1;
        if self.settings.stats_freq != 0 && self.stats.calls % self.settings.stats_freq == 0 {
            self.print_stats();
        }
    }


    fn timeout_start(&self) {
        if self.settings.time_max == 0 {
            return;
        }
        let shared = Arc::clone(&self.shared);
        let secs = self.settings.time_max as u64;
        thread::spawn(move || {
            thread::sleep(Duration::from_secs(secs));
            shared.set_timeout();
        });
    }


    /// Run the search to completion. Solutions and statistics are printed
    /// as they happen and recorded in the shared record.
    pub fn run(&mut self) -> Result<(), Error> {
        if self.worker_id == 1 {
            self.timeout_start();
        }

        if self.steps.is_empty() {
            // no variables to branch on
            self.update_solution();
            self.worker_die();
            return Ok(());
        }

        let size = self.steps.len();
        let mut level = self.min_level;

        while !self.shared.timed_out() {
            if level < self.min_level {
                break;
            }

            // stop as soon as anyone found a solution when any will do
            if self.found_any() {
                break;
            }

            // a full assignment was reached
            if level == size {
                let updated = self.update_solution();
                if updated && self.is_solution_restartable() {
                    level -= 1;
                    level = self.restart(level)?;
                    continue;
                } else if level != 0 {
                    level -= 1;
                    continue;
                } else {
                    break;
                }
            }

            if !self.steps[level].active {
                // pick a variable, or resume the one chosen at a fork
                let var = match self.resume_var.take() {
                    Some(var) => var,
                    None => {
                        let var = self
                            .order
                            .pop(&self.store, &mut self.env)
                            .expect("variable order underflow");
                        self.worker_spawn(var, level)?;
                        var
                    }
                };
                self.step_activate(level, var);
            } else {
                // continue with the next iteration value
                self.step_leave(level)?;
                self.steps[level].iter += 1;
            }

            // check if the values for this variable are exhausted
            if !self.step_check(level) {
                self.step_deactivate(level);
                if level != 0 {
                    level -= 1;
                    continue;
                }
                break;
            }

            // try the next value
            self.trail.set_level(level);
            let val = self.step_val(level);
            self.step_enter(level, val)?;

            self.objective_update_val();
            self.update_stats(level);

            // decide whether to move on, stay, restart, or backjump
            let var = self.steps[level].var;
            let failed = self.check_assignment(var, level)?;
            if !failed {
                self.env[var.0].prio -= 1;
                level += 1;
            } else {
                self.env[var.0].prio += 1;
                if self.check_restart() {
                    level = self.restart(level)?;
                } else if self.settings.create_conflicts {
                    level = self.conflict_backtrack(level)?;
                }
            }
        }

        self.worker_die();
        Ok(())
    }


    // Split the branching variable's interval with a new worker when there
    // is room: the child takes the upper half, this worker the lower half.
    fn worker_spawn(&mut self, var: VarId, level: usize) -> Result<(), Error> {
        let val = self.store.term_val(self.env[var.0].term);
        if val.is_value() || self.shared.workers() >= self.settings.workers_max {
            return Ok(());
        }

        let id = {
            let _guard = self.shared.lock();
            if self.shared.workers() >= self.settings.workers_max {
                return Ok(());
            }
            self.shared.claim_worker()
        };

        let lo = val.lo;
        let hi = val.hi;
        let mid = ((lo as i64 + hi as i64) / 2) as Domain;

        // pick up a child that may have finished
        self.reap_child();

        let mut child = self.fork(id, level);
        child.trail.set_level(level);
        let upper = if mid + 1 == hi {
            Val::value(hi)
        } else {
            Val::interval(mid + 1, hi)
        };
        trail::bind(
            &mut child.trail,
            &mut child.store,
            &mut child.env,
            var,
            upper,
            None,
        )?;
        child.resume_var = Some(var);

        match thread::Builder::new().spawn(move || {
            let mut child = child;
            if let Err(e) = child.run() {
                eprintln!("worker {}: error: {}", child.worker_id, e);
                process::exit(1);
            }
        }) {
            Ok(handle) => self.children.push(handle),
            Err(e) => {
                eprintln!("error: {}", e);
                process::exit(1);
            }
        }

        // this worker searches the lower half
        self.trail.set_level(level);
        let lower = if lo == mid {
            Val::value(lo)
        } else {
            Val::interval(lo, mid)
        };
        trail::bind(
            &mut self.trail,
            &mut self.store,
            &mut self.env,
            var,
            lower,
            None,
        )
    }

    // Clone this solver for a child worker starting at `level`.
    fn fork(&self, id: u32, level: usize) -> Solver {
        let mut stats = crate::fd::solver::Stats::new();
        stats.level_min = level;
        stats.level_max = level;

        Solver {
            settings: self.settings.clone(),
            store: self.store.clone(),
            env: self.env.clone(),
            registry: self.registry.clone(),
            root: self.root,
            trail: self.trail.clone(),
            patches: self.patches.clone(),
            order: self.order.clone(),
            confl: self.confl.clone(),
            objective: self.objective,
            obj_var: self.obj_var,
            prop_tag: self.prop_tag,
            rand: self.rand.clone(),
            restarts: self.restarts.clone(),
            steps: self.steps.clone(),
            resume_var: None,
            stats,
            shared: Arc::clone(&self.shared),
            worker_id: id,
            min_level: level,
            children: Vec::new(),
            search_vars: self.search_vars,
        }
    }

    // Join at most one already-finished child, keeping the handle list
    // short without ever blocking.
    fn reap_child(&mut self) {
        for i in 0..self.children.len() {
            if self.children[i].is_finished() {
                let handle = self.children.swap_remove(i);
                let _ = handle.join();
                break;
            }
        }
    }

    fn await_children(&mut self) {
        for handle in self.children.drain(..) {
            let _ = handle.join();
        }
    }

    // Release the worker slot, wait for children, report.
    fn worker_die(&mut self) {
        {
            let _guard = self.shared.lock();
            self.shared.release_worker();
        }

        self.await_children();

        if self.stats.calls > 0 {
            self.print_stats();
        }

        if self.worker_id == 1 {
            if self.shared.timed_out() {
                println!("TIMEOUT");
            }
            if self.shared.solutions() == 0 {
                println!("NO SOLUTION FOUND");
            }
        }
    }
}
