use crate::fd::constr::{ClauseRef, Constr, ConflItem, ConstrRef, Slot, VarId};
use crate::fd::solver::Solver;
use crate::fd::Error;


// Breadth of the array of already seen conflict elements.
const SEEN_WIDTH: usize = 64;
// Maximum fill of one bucket; exceeding it aborts clause construction.
const SEEN_LENGTH_MAX: usize = 1024;

// How conflict-clause construction ended early.
enum Abort {
    // Seen set overflowed or a literal was not a concrete binary value;
    // the clause is discarded and search continues without learning.
    Soft,
    // Resource exhaustion.
    Fatal(Error),
}

impl From<Error> for Abort {
    fn from(e: Error) -> Abort {
        Abort::Fatal(e)
    }
}

type ConflResult = Result<(), Abort>;


/// Bounded set of constraint nodes and variables already absorbed into the
/// conflict clause under construction.
#[derive(Clone, Debug)]
struct SeenSet {
    buckets: Vec<Vec<usize>>,
}

impl SeenSet {
    fn new() -> SeenSet {
        SeenSet {
            buckets: vec![Vec::new(); SEEN_WIDTH],
        }
    }

    fn reset(&mut self) {
        for bucket in self.buckets.iter_mut() {
            bucket.clear();
        }
    }

    fn contains(&self, key: usize) -> bool {
        self.buckets[key % SEEN_WIDTH].contains(&key)
    }

    fn add(&mut self, key: usize) -> ConflResult {
        let bucket = &mut self.buckets[key % SEEN_WIDTH];
        if bucket.len() >= SEEN_LENGTH_MAX {
            return Err(Abort::Soft);
        }
        bucket.push(key);
        Ok(())
    }
}

#[inline]
fn constr_key(c: ConstrRef) -> usize {
    c.key() << 1
}

#[inline]
fn var_key(v: VarId) -> usize {
    (v.0 << 1) | 1
}


/// Conflict bookkeeping: the level the last conflict resolves at, the
/// variable asserting it, and the seen set used during construction.
#[derive(Clone, Debug)]
pub(crate) struct ConflictState {
    /// Assignment level where the conflict should be resolved.
    pub level: usize,
    /// The asserting variable.
    pub var: Option<VarId>,
    max_level: usize,
    seen: SeenSet,
}

impl ConflictState {
    pub fn new() -> ConflictState {
        ConflictState {
            level: usize::max_value(),
            var: None,
            max_level: 0,
            seen: SeenSet::new(),
        }
    }

    pub fn reset(&mut self) {
        self.level = usize::max_value();
        self.var = None;
    }
}


impl Solver {
    /// Build a conflict clause for a failed propagation of `clause` at
    /// variable `var`, and register it with every variable it mentions.
    /// Construction failures are soft: the clause is simply discarded.
    pub(crate) fn conflict_create(&mut self, var: VarId, clause: ClauseRef) -> Result<(), Error> {
        let mark = self.store.confl_mark();
        let confl = self.store.alloc_confl(Constr::Confl(Vec::new()))?;

        self.confl.seen.reset();
        self.confl.reset();
        self.confl.max_level = 0;

        // absorb the clause that caused the conflict, then the history of
        // the conflicting variable
        let orig = self.store.slot(clause).orig;
        let absorbed = self
            .confl_add_constr(var, confl, orig)
            .and_then(|_| self.confl_add_var(var, confl));
        match absorbed {
            Ok(()) => {}
            Err(Abort::Soft) => {
                self.store.confl_release(mark);
                return Ok(());
            }
            Err(Abort::Fatal(e)) => return Err(e),
        }

        self.conflict_update(confl);

        // hook the new clause into the clause lists of its variables
        let slot = self.store.add_confl_slot(Slot {
            constr: confl,
            orig: confl,
            prop_tag: 0,
        })?;
        for i in 0..self.store.confl_len(confl) {
            let item = self.store.confl_item(confl, i);
            if let Some(v) = self.store.term_var(item.var) {
                self.env[v.0].clause_append(slot);
            }
        }

        self.stats.confl += 1;
        Ok(())
    }

    // Determine the level where the conflict can be resolved and the
    // variable asserting it.
    fn conflict_update(&mut self, confl: ConstrRef) {
        let len = self.store.confl_len(confl);
        if len == 0 {
            return;
        }

        self.confl.level = 0;
        self.confl.var = self.store.term_var(self.store.confl_item(confl, 0).var);
        for i in 0..len {
            let item = self.store.confl_item(confl, i);
            let v = match self.store.term_var(item.var) {
                Some(v) => v,
                None => continue,
            };
            let level = self.env[v.0].level;
            if level < self.confl.max_level && level.wrapping_add(1) > self.confl.level {
                self.confl.level = level.wrapping_add(1);
                self.confl.var = Some(v);
            }
        }
    }

    // Add a literal for a variable term with its current value.
    fn confl_add_term(&mut self, confl: ConstrRef, term: ConstrRef) -> ConflResult {
        let val = self.store.term_val(term);

        // only learn over concrete binary values
        if !val.is_value() || val.lo > 1 || val.lo < 0 {
            return Err(Abort::Soft);
        }

        self.store.confl_push(confl, ConflItem { var: term, val })?;

        if let Some(v) = self.store.term_var(term) {
            let level = self.env[v.0].level;
            if level > self.confl.max_level {
                self.confl.max_level = level;
            }
        }

        Ok(())
    }

    // Absorb a constraint: terminals become literals or recurse into their
    // variable's history, everything else recurses structurally.
    fn confl_add_constr(&mut self, var: VarId, confl: ConstrRef, c: ConstrRef) -> ConflResult {
        if self.confl.seen.contains(constr_key(c)) {
            return Ok(());
        }
        self.confl.seen.add(constr_key(c))?;

        enum Walk {
            Term,
            Children(ConstrRef, Option<ConstrRef>),
            WAnd,
            Confl,
        }

        let walk = match *self.store.node(c) {
            Constr::Term { .. } => Walk::Term,
            Constr::Expr { l, r, .. } => Walk::Children(l, r),
            Constr::WAnd(_) => Walk::WAnd,
            Constr::Confl(_) => Walk::Confl,
        };

        match walk {
            Walk::Term => self.confl_add_constr_term(var, confl, c),
            Walk::Children(l, r) => {
                if let Some(r) = r {
                    self.confl_add_constr(var, confl, r)?;
                }
                self.confl_add_constr(var, confl, l)
            }
            Walk::WAnd => {
                for i in 0..self.store.wand_len(c) {
                    let cl = self.store.wand_elem(c, i);
                    let elem = self.store.slot(cl).constr;
                    self.confl_add_constr(var, confl, elem)?;
                }
                Ok(())
            }
            Walk::Confl => {
                for i in 0..self.store.confl_len(c) {
                    let item = self.store.confl_item(c, i);
                    self.confl_add_constr(var, confl, item.var)?;
                }
                Ok(())
            }
        }
    }

    fn confl_add_constr_term(&mut self, var: VarId, confl: ConstrRef, c: ConstrRef) -> ConflResult {
        let v = match self.store.term_var(c) {
            Some(v) if v != var => v,
            _ => return Ok(()),
        };

        // a terminal bound at a lower level, or bound without being
        // inferred, enters the clause as a literal; otherwise its own bind
        // history is absorbed
        let decided = match self.env[v.0].binds {
            Some(b) => self.trail.record(b).clause.is_none(),
            None => false,
        };
        if self.env[v.0].level < self.trail.level() || decided {
            return self.confl_add_term(confl, c);
        }
        self.confl_add_var(v, confl)
    }

    // Absorb a variable by walking its bind history newest-first.
    fn confl_add_var(&mut self, var: VarId, confl: ConstrRef) -> ConflResult {
        if self.confl.seen.contains(var_key(var)) {
            return Ok(());
        }
        self.confl.seen.add(var_key(var))?;

        let mut bind = self.env[var.0].binds;
        while let Some(b) = bind {
            let record = self.trail.record(b);
            match record.clause {
                Some(cl) => {
                    let orig = self.store.slot(cl).orig;
                    self.confl_add_constr(var, confl, orig)?;
                }
                None => {
                    let term = self.env[var.0].term;
                    self.confl_add_term(confl, term)?;
                }
            }
            bind = record.prev;
        }

        Ok(())
    }
}
