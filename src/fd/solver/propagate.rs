use crate::fd::constr::{ClauseRef, Constr, ConstrRef, Op, VarId};
use crate::fd::domain::*;
use crate::fd::solver::Solver;
use crate::fd::{normalize, trail, Error};


/// Why a propagation stopped short.
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum PropError {
    /// A value became empty: the current assignment cannot be completed.
    Conflict,
    /// An unrecoverable resource error.
    Fatal(Error),
}

impl From<Error> for PropError {
    fn from(e: Error) -> PropError {
        PropError::Fatal(e)
    }
}

/// Successful propagations report the number of narrowings performed.
pub type PropResult = Result<u64, PropError>;


// Copyable projection of a node for dispatch without holding a borrow.
enum Shape {
    Term,
    Expr(Op, ConstrRef, Option<ConstrRef>),
    WAnd,
    Confl,
}

impl Solver {
    /// Narrow the constraint toward taking the value `val`.
    pub(crate) fn propagate(
        &mut self,
        c: ConstrRef,
        val: Val,
        clause: Option<ClauseRef>,
    ) -> PropResult {
        let shape = match *self.store.node(c) {
            Constr::Term { .. } => Shape::Term,
            Constr::Expr { op, l, r } => Shape::Expr(op, l, r),
            Constr::WAnd(_) => Shape::WAnd,
            Constr::Confl(_) => Shape::Confl,
        };

        match shape {
            Shape::Term => self.propagate_term(c, val, clause),
            Shape::Expr(op, l, r) => match op {
                Op::Eq => self.propagate_eq(l, r.unwrap(), val, clause),
                Op::Lt => self.propagate_lt(l, r.unwrap(), val, clause),
                Op::Neg => self.propagate_neg(l, val, clause),
                Op::Add => self.propagate_add(l, r.unwrap(), val, clause),
                Op::Mul => self.propagate_mul(l, r.unwrap(), val, clause),
                Op::Not => self.propagate_not(l, val, clause),
                Op::And => self.propagate_and(l, r.unwrap(), val, clause),
                Op::Or => self.propagate_or(l, r.unwrap(), val, clause),
            },
            Shape::WAnd => self.propagate_wand(c, val, clause),
            Shape::Confl => self.propagate_confl(c, val, clause),
        }
    }

    // Update variable priority and create a conflict clause.
    fn propagate_term_confl(&mut self, var: VarId, clause: Option<ClauseRef>) -> Result<(), Error> {
        self.env[var.0].prio += 1;
        self.order.update(&self.store, &mut self.env, var);
        if self.settings.create_conflicts {
            if let Some(clause) = clause {
                self.conflict_create(var, clause)?;
            }
        }
        Ok(())
    }

    // Propagate a new variable value to all affected clauses.
    fn propagate_term_recurse(&mut self, var: VarId) -> PropResult {
        match self.propagate_clauses(var) {
            Ok(p) => Ok(p + 1),
            Err(PropError::Conflict) => {
                self.env[var.0].prio += 1;
                self.order.update(&self.store, &mut self.env, var);
                Err(PropError::Conflict)
            }
            Err(e) => Err(e),
        }
    }

    fn propagate_term(&mut self, c: ConstrRef, val: Val, clause: Option<ClauseRef>) -> PropResult {
        let term = self.store.term_val(c);
        let var = self.store.term_var(c);

        if term.lo > val.hi || term.hi < val.lo {
            // conflicting propagation
            if let Some(var) = var {
                self.propagate_term_confl(var, clause)?;
            }
            return Err(PropError::Conflict);
        }

        let lo = max(term.lo, val.lo);
        let hi = min(term.hi, val.hi);
        // propagate only if actually restricting the value
        if lo != term.lo || hi != term.hi {
            let v = Val::interval(lo, hi);
            if let Some(var) = var {
                trail::bind(
                    &mut self.trail,
                    &mut self.store,
                    &mut self.env,
                    var,
                    v,
                    clause,
                )?;
                self.stats.props += 1;
                return self.propagate_term_recurse(var);
            }
            // just assign the value if there is no variable
            self.store.set_term_val(c, v);
            return Ok(1);
        }

        Ok(0)
    }

    fn propagate_eq(
        &mut self,
        l: ConstrRef,
        r: ConstrRef,
        val: Val,
        clause: Option<ClauseRef>,
    ) -> PropResult {
        if val.is_true() {
            // propagate each side's interval to the other
            let lval = self.store.eval(l);
            let p = self.propagate(r, lval, clause)?;
            let rval = self.store.eval(r);
            let q = self.propagate(l, rval, clause)?;
            return Ok(p + q);
        }
        if val.is_false() {
            let lval = self.store.eval(l);
            let rval = self.store.eval(r);
            let p = self.propagate_eq_false_side(r, rval, lval, clause)?;
            let q = self.propagate_eq_false_side(l, lval, rval, clause)?;
            return Ok(p + q);
        }

        Ok(0)
    }

    // Shrink one side of a disequality away from the other side's value
    // when that value sits on an interval boundary.
    fn propagate_eq_false_side(
        &mut self,
        p: ConstrRef,
        pval: Val,
        val: Val,
        clause: Option<ClauseRef>,
    ) -> PropResult {
        if val.is_value() && val.lo != DOMAIN_MIN && val.lo != DOMAIN_MAX {
            if val.lo == pval.lo {
                return self.propagate(p, Val::interval(val.lo + 1, DOMAIN_MAX), clause);
            }
            if val.lo == pval.hi {
                return self.propagate(p, Val::interval(DOMAIN_MIN, val.lo - 1), clause);
            }
        }
        Ok(0)
    }

    fn propagate_lt(
        &mut self,
        l: ConstrRef,
        r: ConstrRef,
        val: Val,
        clause: Option<ClauseRef>,
    ) -> PropResult {
        if val.is_true() {
            let lval = self.store.eval(l);
            let mut p = 0;
            if lval.lo != DOMAIN_MIN && lval.lo != DOMAIN_MAX {
                p = self.propagate(r, Val::interval(lval.lo + 1, DOMAIN_MAX), clause)?;
            }

            let rval = self.store.eval(r);
            let mut q = 0;
            if rval.hi != DOMAIN_MIN && rval.hi != DOMAIN_MAX {
                q = self.propagate(l, Val::interval(DOMAIN_MIN, rval.hi - 1), clause)?;
            }

            return Ok(p + q);
        }
        if val.is_false() {
            let lval = self.store.eval(l);
            let p = self.propagate(r, Val::interval(DOMAIN_MIN, lval.hi), clause)?;
            let rval = self.store.eval(r);
            let q = self.propagate(l, Val::interval(rval.lo, DOMAIN_MAX), clause)?;
            return Ok(p + q);
        }

        Ok(0)
    }

    fn propagate_neg(&mut self, l: ConstrRef, val: Val, clause: Option<ClauseRef>) -> PropResult {
        // flip the bounds for propagation
        let v = Val::interval(neg(val.hi), neg(val.lo));
        self.propagate(l, v, clause)
    }

    // Propagate to one side of an addition by subtracting the other side.
    fn propagate_add_side(
        &mut self,
        p: ConstrRef,
        other: ConstrRef,
        val: Val,
        clause: Option<ClauseRef>,
    ) -> PropResult {
        let cval = self.store.eval(other);
        let lo = add(val.lo, neg(cval.hi));
        let hi = add(val.hi, neg(cval.lo));
        self.propagate(p, Val::interval(lo, hi), clause)
    }

    fn propagate_add(
        &mut self,
        l: ConstrRef,
        r: ConstrRef,
        val: Val,
        clause: Option<ClauseRef>,
    ) -> PropResult {
        let p = self.propagate_add_side(r, l, val, clause)?;
        let q = self.propagate_add_side(l, r, val, clause)?;
        Ok(p + q)
    }

    // Propagate to one side of a multiplication by dividing through the
    // other side when it is a concrete non-zero value.
    fn propagate_mul_side(
        &mut self,
        p: ConstrRef,
        other: ConstrRef,
        val: Val,
        clause: Option<ClauseRef>,
    ) -> PropResult {
        if val.lo != DOMAIN_MIN && val.hi != DOMAIN_MIN {
            let cval = self.store.eval(other);
            if cval.is_value() {
                if ((val.lo > 0 || val.hi < 0) && cval.lo == 0)
                    || (val.is_value() && cval.lo != 0 && val.lo % cval.lo != 0)
                {
                    return Err(PropError::Conflict);
                }
                if cval.lo != 0 {
                    let lo = val.lo / cval.lo;
                    let hi = val.hi / cval.lo;
                    return self.propagate(p, Val::interval(min(lo, hi), max(lo, hi)), clause);
                }
            }
        }
        Ok(0)
    }

    fn propagate_mul(
        &mut self,
        l: ConstrRef,
        r: ConstrRef,
        val: Val,
        clause: Option<ClauseRef>,
    ) -> PropResult {
        let p = self.propagate_mul_side(r, l, val, clause)?;
        let q = self.propagate_mul_side(l, r, val, clause)?;
        Ok(p + q)
    }

    fn propagate_not(&mut self, l: ConstrRef, val: Val, clause: Option<ClauseRef>) -> PropResult {
        // flip true/false for propagation
        if val.is_true() {
            return self.propagate(l, Val::value(0), clause);
        }
        if val.is_false() {
            return self.propagate(l, Val::value(1), clause);
        }
        Ok(0)
    }

    // Both sub-expressions must take the propagated value.
    fn propagate_logic_both(
        &mut self,
        l: ConstrRef,
        r: ConstrRef,
        val: Val,
        clause: Option<ClauseRef>,
    ) -> PropResult {
        let p = self.propagate(r, val, clause)?;
        let q = self.propagate(l, val, clause)?;
        Ok(p + q)
    }

    // Only a side whose current evaluation is the neutral element is forced
    // to take the propagated value.
    fn propagate_logic_either(
        &mut self,
        l: ConstrRef,
        r: ConstrRef,
        val: Val,
        neutral: fn(Val) -> bool,
        clause: Option<ClauseRef>,
    ) -> PropResult {
        let mut p = 0;
        let lval = self.store.eval(l);
        if neutral(lval) {
            p = self.propagate(r, val, clause)?;
        }

        let mut q = 0;
        let rval = self.store.eval(r);
        if neutral(rval) {
            q = self.propagate(l, val, clause)?;
        }

        Ok(p + q)
    }

    fn propagate_and(
        &mut self,
        l: ConstrRef,
        r: ConstrRef,
        val: Val,
        clause: Option<ClauseRef>,
    ) -> PropResult {
        if val.is_true() {
            return self.propagate_logic_both(l, r, val, clause);
        }
        if val.is_false() {
            return self.propagate_logic_either(l, r, val, |v| v.is_true(), clause);
        }
        Ok(0)
    }

    fn propagate_or(
        &mut self,
        l: ConstrRef,
        r: ConstrRef,
        val: Val,
        clause: Option<ClauseRef>,
    ) -> PropResult {
        if val.is_false() {
            return self.propagate_logic_both(l, r, val, clause);
        }
        if val.is_true() {
            return self.propagate_logic_either(l, r, val, |v| v.is_false(), clause);
        }
        Ok(0)
    }

    fn propagate_wand(&mut self, c: ConstrRef, val: Val, clause: Option<ClauseRef>) -> PropResult {
        // only "true" propagates through the conjunction
        let mut r = 0;
        if val.is_true() {
            for i in 0..self.store.wand_len(c) {
                let cl = self.store.wand_elem(c, i);
                let elem = self.store.slot(cl).constr;
                r += self.propagate(elem, val, clause)?;
            }
        }
        Ok(r)
    }

    // Find the single unassigned variable of a conflict clause, if any.
    // Witness elements are swapped to the front so later scans stop early.
    fn propagate_confl_find(&mut self, c: ConstrRef) -> Option<usize> {
        let len = self.store.confl_len(c);
        let mut free: Option<usize> = None;

        for i in 0..len {
            let item = self.store.confl_item(c, i);
            let v = self.store.term_val(item.var);

            if v.is_value() {
                // some variable already differs from its forbidden value
                if v.lo != item.val.lo {
                    if i > 0 {
                        self.store.confl_swap(c, 0, i);
                    }
                    return None;
                }
            } else if free.is_none() {
                free = Some(i);
            } else {
                // more than one unassigned variable, nothing to infer
                if i > 1 {
                    self.store.confl_swap(c, 0, free.unwrap());
                    self.store.confl_swap(c, 1, i);
                }
                return None;
            }
        }

        free
    }

    // Narrow the remaining variable away from its forbidden value.
    fn propagate_confl_infer(
        &mut self,
        c: ConstrRef,
        i: usize,
        clause: Option<ClauseRef>,
    ) -> PropResult {
        let item = self.store.confl_item(c, i);
        let v = self.store.eval(item.var);

        if v.lo == item.val.lo && v.lo != DOMAIN_MIN && v.lo != DOMAIN_MAX {
            return self.propagate(item.var, Val::interval(v.lo + 1, DOMAIN_MAX), clause);
        }
        if v.hi == item.val.hi && v.hi != DOMAIN_MIN && v.hi != DOMAIN_MAX {
            return self.propagate(item.var, Val::interval(DOMAIN_MIN, v.hi - 1), clause);
        }

        Ok(0)
    }

    fn propagate_confl(&mut self, c: ConstrRef, val: Val, clause: Option<ClauseRef>) -> PropResult {
        if val.is_true() {
            if let Some(i) = self.propagate_confl_find(c) {
                return self.propagate_confl_infer(c, i, clause);
            }
        }
        Ok(0)
    }


    /// Propagate "true" through the root constraint until quiescent.
    pub(crate) fn propagate_root(&mut self) -> PropResult {
        let mut r = 0;
        loop {
            let p = self.propagate(self.root, Val::value(1), None)?;
            r += p;
            if p == 0 {
                return Ok(r);
            }
        }
    }

    /// Propagate "true" through every clause on a variable's list, skipping
    /// slots a nested call already visited this round, and re-normalising
    /// slots that made progress.
    pub(crate) fn propagate_clauses(&mut self, var: VarId) -> PropResult {
        self.prop_tag += 1;
        let tag = self.prop_tag;

        let mut r = 0;
        self.confl.reset();

        let len = self.env[var.0].clauses.len();
        for i in 0..len {
            let cl = self.env[var.0].clauses[i];
            if self.store.slot(cl).prop_tag > tag {
                continue;
            }
            self.store.set_slot_tag(cl, tag);

            let c = self.store.slot(cl).constr;
            let p = self.propagate(c, Val::value(1), Some(cl))?;
            r += p;

            // if propagation happened, normalize and patch as needed
            if p != 0 {
                let mut patched = 0u32;
                let norm = normalize::normal(&mut self.store, &mut self.patches, &mut patched, c)?;
                if norm != c {
                    trail::patch(&mut self.patches, &mut self.store, cl, norm)?;
                }
            }
        }

        Ok(r)
    }
}
