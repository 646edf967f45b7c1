use crate::fd::domain::{add, neg};
use crate::fd::solver::Solver;


/// What kind of solution to look for.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum Objective {
    /// Find any solution.
    Any,
    /// Find all solutions.
    All,
    /// Find a solution minimizing the objective expression.
    Min,
    /// Find a solution maximizing the objective expression.
    Max,
}

impl Default for Objective {
    fn default() -> Self {
        Objective::Any
    }
}


impl Solver {
    /// Whether the objective pseudo-variable can still beat the best
    /// solution found so far.
    pub(crate) fn objective_better(&self) -> bool {
        match self.objective {
            Objective::Any | Objective::All => true,
            Objective::Min => match self.obj_var {
                Some(v) => self.store.term_val(self.env[v.0].term).lo < self.shared.best(),
                None => true,
            },
            Objective::Max => match self.obj_var {
                Some(v) => self.store.term_val(self.env[v.0].term).hi > self.shared.best(),
                None => true,
            },
        }
    }

    /// Publish the objective pseudo-variable's bound as the new best.
    /// Caller holds the shared lock.
    pub(crate) fn objective_update_best(&self) {
        match self.objective {
            Objective::Any | Objective::All => {}
            Objective::Min => {
                if let Some(v) = self.obj_var {
                    self.shared
                        .set_best(self.store.term_val(self.env[v.0].term).lo);
                }
            }
            Objective::Max => {
                if let Some(v) = self.obj_var {
                    self.shared
                        .set_best(self.store.term_val(self.env[v.0].term).hi);
                }
            }
        }
    }

    /// Tighten the objective pseudo-variable toward the published best.
    /// This narrowing is monotonic for the rest of the search and is
    /// deliberately not recorded on the trail.
    pub(crate) fn objective_update_val(&mut self) {
        let v = match self.obj_var {
            Some(v) => v,
            None => return,
        };
        let term = self.env[v.0].term;
        let val = self.store.term_val(term);

        match self.objective {
            Objective::Any | Objective::All => {}
            Objective::Min => {
                let limit = add(self.shared.best(), neg(1));
                if val.hi > limit {
                    let mut val = val;
                    val.hi = limit;
                    self.store.set_term_val(term, val);
                }
            }
            Objective::Max => {
                let limit = add(self.shared.best(), 1);
                if val.lo < limit {
                    let mut val = val;
                    val.lo = limit;
                    self.store.set_term_val(term, val);
                }
            }
        }
    }
}
