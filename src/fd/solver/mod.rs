use std::sync::Arc;
use std::thread;

use crate::fd::constr::{ClauseRef, Constr, ConstrRef, Op, Slot, Store, VarId};
use crate::fd::domain::{Val, DOMAIN_MAX, DOMAIN_MIN};
use crate::fd::input::Problem;
use crate::fd::registry::{self, Registry, VarEntry};
use crate::fd::solver::conflict::ConflictState;
use crate::fd::solver::order::VarOrder;
use crate::fd::solver::random::Random;
use crate::fd::solver::search::{RestartSchedule, Step};
use crate::fd::trail::{BindTrail, PatchTrail};
use crate::fd::{normalize, Error};

pub mod conflict;
pub mod objective;
pub mod order;
pub mod propagate;
pub mod random;
pub mod search;
pub mod stats;
pub mod workers;

pub use self::objective::Objective;
pub use self::order::Order;
pub use self::propagate::{PropError, PropResult};
pub use self::stats::Stats;
pub use self::workers::{Shared, Solution};


/// Default bind trail capacity.
pub const BIND_STACK_SIZE_DEFAULT: usize = 1024;
/// Default patch trail capacity.
pub const PATCH_STACK_SIZE_DEFAULT: usize = 16 * 1024;
/// Default size of the primary arena.
pub const ALLOC_STACK_SIZE_DEFAULT: usize = 16 * 1024 * 1024;
/// Default size of the conflict arena.
pub const CONFLICT_ALLOC_STACK_SIZE_DEFAULT: usize = 16 * 1024 * 1024;


/// Search configuration, as handed over by the option surface.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Maximum number of binds.
    pub bind_capacity: usize,
    /// Maximum number of patches.
    pub patch_capacity: usize,
    /// Primary arena size in bytes.
    pub memory: usize,
    /// Conflict arena size in bytes.
    pub confl_memory: usize,
    /// Learn conflict clauses on failed propagation.
    pub create_conflicts: bool,
    /// Break ordering ties with variable priority.
    pub prefer_failing: bool,
    /// Compute initial variable weights from the constraint tree.
    pub compute_weights: bool,
    /// Variable order mode.
    pub order: Order,
    /// Restart base when looking for any solution; 0 disables restarts.
    pub restart_freq: u64,
    /// Print statistics every this many search steps; 0 disables.
    pub stats_freq: u64,
    /// Time limit in seconds; 0 disables.
    pub time_max: u32,
    /// Maximum number of concurrent workers.
    pub workers_max: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            bind_capacity: BIND_STACK_SIZE_DEFAULT,
            patch_capacity: PATCH_STACK_SIZE_DEFAULT,
            memory: ALLOC_STACK_SIZE_DEFAULT,
            confl_memory: CONFLICT_ALLOC_STACK_SIZE_DEFAULT,
            create_conflicts: true,
            prefer_failing: true,
            compute_weights: true,
            order: Order::None,
            restart_freq: 100,
            stats_freq: 10_000_000,
            time_max: 0,
            workers_max: 1,
        }
    }
}


/// The solver: one value owning the whole search state. Workers are clones
/// of this value sharing only the `Shared` record.
pub struct Solver {
    pub(crate) settings: Settings,
    pub(crate) store: Store,
    pub(crate) env: Vec<VarEntry>,
    pub(crate) registry: Registry,
    pub(crate) root: ConstrRef,
    pub(crate) trail: BindTrail,
    pub(crate) patches: PatchTrail,
    pub(crate) order: VarOrder,
    pub(crate) confl: ConflictState,
    pub(crate) objective: Objective,
    pub(crate) obj_var: Option<VarId>,
    pub(crate) prop_tag: u64,
    pub(crate) rand: Random,
    pub(crate) restarts: RestartSchedule,
    pub(crate) steps: Vec<Step>,
    pub(crate) resume_var: Option<VarId>,
    pub(crate) stats: Stats,
    pub(crate) shared: Arc<Shared>,
    pub(crate) worker_id: u32,
    pub(crate) min_level: usize,
    pub(crate) children: Vec<thread::JoinHandle<()>>,
    pub(crate) search_vars: usize,
}

impl Solver {
    /// Assemble a solver from an ingested problem. For `MIN`/`MAX` the
    /// objective pseudo-variable is created here and wired to the objective
    /// expression with an equality clause.
    pub fn new(store: Store, problem: Problem, settings: Settings) -> Result<Solver, Error> {
        let Problem {
            root,
            vars,
            registry,
            objective,
            obj_expr,
        } = problem;

        let mut store = store;
        let mut env = vars;
        let search_vars = env.len();

        let mut obj_var = None;
        if objective == Objective::Min || objective == Objective::Max {
            if let Some(expr) = obj_expr {
                let term = store.alloc(Constr::Term {
                    val: Val::interval(DOMAIN_MIN + 1, DOMAIN_MAX - 1),
                    var: None,
                })?;
                let eq = store.alloc(Constr::Expr {
                    op: Op::Eq,
                    l: term,
                    r: Some(expr),
                })?;
                let slot = store.add_slot(Slot {
                    constr: eq,
                    orig: eq,
                    prop_tag: 0,
                });
                store.wand_push(root, slot);

                let id = VarId(env.len());
                env.push(VarEntry::new("<objective>", term));
                obj_var = Some(id);
            }
        }

        let order = VarOrder::new(settings.order, settings.prefer_failing);
        let trail = BindTrail::new(settings.bind_capacity);
        let patches = PatchTrail::new(settings.patch_capacity);
        let shared = Arc::new(Shared::new(objective));

        Ok(Solver {
            settings,
            store,
            env,
            registry,
            root,
            trail,
            patches,
            order,
            confl: ConflictState::new(),
            objective,
            obj_var,
            prop_tag: 0,
            rand: Random::new(91648253.0),
            restarts: RestartSchedule::new(),
            steps: Vec::new(),
            resume_var: None,
            stats: Stats::new(),
            shared,
            worker_id: 1,
            min_level: 0,
            children: Vec::new(),
            search_vars,
        })
    }

    /// Normalize the problem, run the initial propagation, and build the
    /// search structures. Returns false when the root constraint is already
    /// inconsistent.
    pub fn preprocess(&mut self) -> Result<bool, Error> {
        self.root = normalize::normalize(&mut self.store, &mut self.patches, self.root)?;
        trace!("normalized root:{}", self.store.dump(self.root));

        // initial propagation writes cells directly: the terms are not yet
        // linked back to the environment, so nothing lands on the trail
        let consistent = match self.propagate_root() {
            Ok(_) => true,
            Err(PropError::Conflict) => false,
            Err(PropError::Fatal(e)) => return Err(e),
        };
        self.trail.commit();
        self.patches.commit();
        if !consistent {
            return Ok(false);
        }

        // every variable must be bounded now; link the back-references
        for i in 0..self.env.len() {
            let term = self.env[i].term;
            let val = self.store.term_val(term);
            if val.lo == DOMAIN_MIN || val.hi == DOMAIN_MAX {
                return Err(Error::UnboundedVariable(self.env[i].name.clone()));
            }
            self.store.set_term_var(term, VarId(i));
        }

        // membership of variables in top-level clauses
        for i in 0..self.store.wand_len(self.root) {
            let cl = self.store.wand_elem(self.root, i);
            let c = self.store.slot(cl).constr;
            self.register_clause(cl, c);
        }

        if self.settings.compute_weights {
            for i in 0..self.store.wand_len(self.root) {
                let cl = self.store.wand_elem(self.root, i);
                let c = self.store.slot(cl).constr;
                let weight = registry::clause_weight(&self.store, c);
                registry::weighten(&self.store, &self.registry, &mut self.env, c, weight);
            }
        }

        // queue the searchable variables
        for i in 0..self.search_vars {
            self.order.push(&self.store, &mut self.env, VarId(i));
        }
        self.steps = vec![Step::new(); self.search_vars];

        Ok(true)
    }

    // Append the clause slot to the clause list of every variable in `c`.
    fn register_clause(&mut self, cl: ClauseRef, c: ConstrRef) {
        enum Walk {
            Var(Option<VarId>),
            Children(ConstrRef, Option<ConstrRef>),
            Skip,
        }

        let walk = match *self.store.node(c) {
            Constr::Term { var, .. } => Walk::Var(var),
            Constr::Expr { l, r, .. } => Walk::Children(l, r),
            Constr::WAnd(_) | Constr::Confl(_) => Walk::Skip,
        };

        match walk {
            Walk::Var(Some(v)) => self.env[v.0].clause_append(cl),
            Walk::Var(None) => {}
            Walk::Children(l, r) => {
                if let Some(r) = r {
                    self.register_clause(cl, r);
                }
                self.register_clause(cl, l);
            }
            Walk::Skip => {}
        }
    }


    pub fn n_vars(&self) -> usize {
        self.search_vars
    }

    pub fn n_clauses(&self) -> usize {
        self.store.wand_len(self.root)
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Handle to the record shared between workers.
    pub fn shared(&self) -> Arc<Shared> {
        Arc::clone(&self.shared)
    }
}
