use crate::fd::constr::{Constr, ConstrRef, Op, Store};
use crate::fd::domain::*;


impl Store {
    /// Evaluate a constraint to the interval of values it may take under
    /// the current variable cells.
    pub fn eval(&self, c: ConstrRef) -> Val {
        match *self.node(c) {
            Constr::Term { val, .. } => val,
            Constr::Expr { op, l, r } => match op {
                Op::Eq => self.eval_eq(l, r.unwrap()),
                Op::Lt => self.eval_lt(l, r.unwrap()),
                Op::Neg => self.eval_neg(l),
                Op::Add => self.eval_add(l, r.unwrap()),
                Op::Mul => self.eval_mul(l, r.unwrap()),
                Op::Not => self.eval_not(l),
                Op::And => self.eval_and(l, r.unwrap()),
                Op::Or => self.eval_or(l, r.unwrap()),
            },
            Constr::WAnd(_) => self.eval_wand(c),
            Constr::Confl(_) => self.eval_confl(c),
        }
    }

    fn eval_eq(&self, l: ConstrRef, r: ConstrRef) -> Val {
        let a = self.eval(l);
        let b = self.eval(r);

        // saturated operands leave the comparison undecided
        if a.lo == DOMAIN_MIN || a.hi == DOMAIN_MAX || b.lo == DOMAIN_MIN || b.hi == DOMAIN_MAX {
            return Val::interval(0, 1);
        }

        if a.hi == b.hi && a.lo == b.lo && a.hi == a.lo {
            return Val::value(1);
        }

        if a.hi < b.lo || a.lo > b.hi {
            return Val::value(0);
        }

        Val::interval(0, 1)
    }

    fn eval_lt(&self, l: ConstrRef, r: ConstrRef) -> Val {
        let a = self.eval(l);
        let b = self.eval(r);

        if a.lo == DOMAIN_MIN || a.hi == DOMAIN_MAX || b.lo == DOMAIN_MIN || b.hi == DOMAIN_MAX {
            return Val::interval(0, 1);
        }

        if a.hi < b.lo {
            return Val::value(1);
        }

        if a.lo >= b.hi {
            return Val::value(0);
        }

        Val::interval(0, 1)
    }

    fn eval_neg(&self, l: ConstrRef) -> Val {
        let a = self.eval(l);
        Val::interval(neg(a.hi), neg(a.lo))
    }

    fn eval_add(&self, l: ConstrRef, r: ConstrRef) -> Val {
        let a = self.eval(l);
        let b = self.eval(r);
        Val::interval(add(a.lo, b.lo), add(a.hi, b.hi))
    }

    fn eval_mul(&self, l: ConstrRef, r: ConstrRef) -> Val {
        let a = self.eval(l);
        let b = self.eval(r);

        let ll = mul(a.lo, b.lo);
        let lh = mul(a.lo, b.hi);
        let hl = mul(a.hi, b.lo);
        let hh = mul(a.hi, b.hi);
        Val::interval(min(min(ll, lh), min(hl, hh)), max(max(ll, lh), max(hl, hh)))
    }

    fn eval_not(&self, l: ConstrRef) -> Val {
        let a = self.eval(l);

        if a.is_true() {
            return Val::value(0);
        }
        if a.is_false() {
            return Val::value(1);
        }

        Val::interval(0, 1)
    }

    fn eval_and(&self, l: ConstrRef, r: ConstrRef) -> Val {
        // short-circuit on a false side
        let lval = self.eval(l);
        if lval.is_false() {
            return Val::value(0);
        }

        let rval = self.eval(r);
        if rval.is_false() {
            return Val::value(0);
        }

        if lval.is_true() && rval.is_true() {
            return Val::value(1);
        }

        Val::interval(0, 1)
    }

    fn eval_or(&self, l: ConstrRef, r: ConstrRef) -> Val {
        // short-circuit on a true side
        let lval = self.eval(l);
        if lval.is_true() {
            return Val::value(1);
        }

        let rval = self.eval(r);
        if rval.is_true() {
            return Val::value(1);
        }

        if lval.is_false() && rval.is_false() {
            return Val::value(0);
        }

        Val::interval(0, 1)
    }

    fn eval_wand(&self, c: ConstrRef) -> Val {
        let mut all_true = true;

        for i in 0..self.wand_len(c) {
            let cl = self.wand_elem(c, i);
            let val = self.eval(self.slot(cl).constr);
            if val.is_false() {
                return Val::value(0);
            }
            if !val.is_true() {
                all_true = false;
            }
        }

        if all_true {
            return Val::value(1);
        }

        Val::interval(0, 1)
    }

    fn eval_confl(&self, c: ConstrRef) -> Val {
        for i in 0..self.confl_len(c) {
            let item = self.confl_item(c, i);
            let v = self.eval(item.var);

            if v.is_value() {
                // some variable moved away from its forbidden value
                if v.lo != item.val.lo {
                    return Val::value(1);
                }
            } else {
                return Val::interval(0, 1);
            }
        }

        Val::interval(0, 1)
    }
}
