use std::collections::HashMap;
use vec_map::VecMap;

use crate::fd::constr::{ClauseRef, Constr, ConstrRef, Op, Store, VarId};


/// Heap position of a variable that is not currently queued.
pub const NOT_IN_HEAP: usize = usize::max_value();

/// Assignment level of a variable that has never been bound.
pub const LEVEL_NONE: usize = usize::max_value();

/// Weight added to the priority of variables in an equality clause.
pub const WEIGHT_EQUAL: i64 = 1000;
/// Weight for variables in a comparison clause.
pub const WEIGHT_COMPARE: i64 = 100;
/// Weight for variables in a negated-equality clause.
pub const WEIGHT_NOT_EQUAL: i64 = 10;


/// Per-variable environment entry.
#[derive(Clone, Debug)]
pub struct VarEntry {
    /// Identifier of the variable.
    pub name: String,
    /// The value-cell term in the store.
    pub term: ConstrRef,
    /// Head of the bind history (index of the newest bind on the trail).
    pub binds: Option<u32>,
    /// Clause slots this variable participates in.
    pub clauses: Vec<ClauseRef>,
    /// Position in the variable heap, `NOT_IN_HEAP` when not queued.
    pub order: usize,
    /// Priority, bumped on failure and decayed on success.
    pub prio: i64,
    /// Level of the newest assignment, `LEVEL_NONE` when unbound.
    pub level: usize,
}

impl VarEntry {
    pub fn new(name: &str, term: ConstrRef) -> VarEntry {
        VarEntry {
            name: name.to_string(),
            term,
            binds: None,
            clauses: Vec::new(),
            order: NOT_IN_HEAP,
            prio: 0,
            level: LEVEL_NONE,
        }
    }

    /// Append a clause slot unless it is already listed.
    pub fn clause_append(&mut self, cl: ClauseRef) {
        if !self.clauses.contains(&cl) {
            self.clauses.push(cl);
        }
    }
}


/// Lookup tables over the environment, built at ingestion time.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    by_name: HashMap<String, usize>,
    by_term: VecMap<usize>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    /// Register a variable under both tables. Returns false when the name
    /// is already taken.
    pub fn insert(&mut self, name: &str, id: VarId, term: ConstrRef) -> bool {
        if self.by_name.contains_key(name) {
            return false;
        }
        self.by_name.insert(name.to_string(), id.0);
        self.by_term.insert(term.key(), id.0);
        true
    }

    pub fn find_name(&self, name: &str) -> Option<VarId> {
        self.by_name.get(name).map(|&i| VarId(i))
    }

    pub fn find_term(&self, term: ConstrRef) -> Option<VarId> {
        self.by_term.get(term.key()).map(|&i| VarId(i))
    }
}


/// Add `weight` to the priority of every variable occurring in `c`.
pub fn weighten(
    store: &Store,
    registry: &Registry,
    env: &mut [VarEntry],
    c: ConstrRef,
    weight: i64,
) {
    match *store.node(c) {
        Constr::Term { val, .. } => {
            if !val.is_value() {
                if let Some(VarId(i)) = registry.find_term(c) {
                    env[i].prio += weight;
                }
            }
        }
        Constr::Expr { l, r, .. } => {
            if let Some(r) = r {
                weighten(store, registry, env, r, weight);
            }
            weighten(store, registry, env, l, weight);
        }
        Constr::WAnd(_) | Constr::Confl(_) => {}
    }
}

/// The weight a top-level clause contributes to its variables.
pub fn clause_weight(store: &Store, c: ConstrRef) -> i64 {
    match *store.node(c) {
        Constr::Expr { op: Op::Eq, .. } => WEIGHT_EQUAL,
        Constr::Expr { op: Op::Lt, .. } => WEIGHT_COMPARE,
        _ => WEIGHT_NOT_EQUAL,
    }
}
