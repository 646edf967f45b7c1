use crate::fd::constr::{Constr, ConstrRef, Op, Store};
use crate::fd::domain::Val;
use crate::fd::trail::{self, PatchTrail};
use crate::fd::Error;


/// Fully normalize a constraint: apply rewrite steps until neither the root
/// nor any wide-and slot changes.
pub fn normalize(
    store: &mut Store,
    patches: &mut PatchTrail,
    c: ConstrRef,
) -> Result<ConstrRef, Error> {
    let mut retval = c;
    loop {
        let mut patched = 0u32;
        let prev = retval;
        retval = normal(store, patches, &mut patched, retval)?;
        if retval == prev && patched == 0 {
            return Ok(retval);
        }
    }
}

// Copyable projection for dispatch without holding a borrow of the store.
enum NodeKind {
    Term,
    Expr(Op),
    WAnd,
    Confl,
}

/// Perform a single recursive normalization pass over a constraint.
pub fn normal(
    store: &mut Store,
    patches: &mut PatchTrail,
    patched: &mut u32,
    c: ConstrRef,
) -> Result<ConstrRef, Error> {
    let kind = match *store.node(c) {
        Constr::Term { .. } => NodeKind::Term,
        Constr::Expr { op, .. } => NodeKind::Expr(op),
        Constr::WAnd(_) => NodeKind::WAnd,
        Constr::Confl(_) => NodeKind::Confl,
    };

    match kind {
        NodeKind::Term => Ok(c),
        NodeKind::Expr(op) => match op {
            Op::Eq => normal_eq(store, patches, patched, c),
            Op::Lt => normal_lt(store, patches, patched, c),
            Op::Neg | Op::Not => normal_unary(store, patches, patched, c, op),
            Op::Add => normal_arith(store, patches, patched, c, Op::Add, 0),
            Op::Mul => normal_arith(store, patches, patched, c, Op::Mul, 1),
            Op::And => normal_logic(store, patches, patched, c, Op::And),
            Op::Or => normal_logic(store, patches, patched, c, Op::Or),
        },
        NodeKind::WAnd => normal_wand(store, patches, patched, c),
        NodeKind::Confl => normal_confl(store, c),
    }
}


fn children(store: &Store, c: ConstrRef) -> (ConstrRef, Option<ConstrRef>) {
    match *store.node(c) {
        Constr::Expr { l, r, .. } => (l, r),
        _ => panic!("not an expression node"),
    }
}

fn expr_op(store: &Store, c: ConstrRef) -> Option<Op> {
    match *store.node(c) {
        Constr::Expr { op, .. } => Some(op),
        _ => None,
    }
}

fn constant(store: &mut Store, v: Val) -> Result<ConstrRef, Error> {
    store.alloc(Constr::Term { val: v, var: None })
}

// Return a newly allocated expression if the sub-expressions changed, or
// the old expression if they are unchanged.
fn update_expr(
    store: &mut Store,
    c: ConstrRef,
    l: ConstrRef,
    r: ConstrRef,
) -> Result<ConstrRef, Error> {
    let (l0, r0) = children(store, c);
    if l != l0 || Some(r) != r0 {
        let op = expr_op(store, c).unwrap();
        return store.alloc(Constr::Expr { op, l, r: Some(r) });
    }
    Ok(c)
}

fn update_unary_expr(store: &mut Store, c: ConstrRef, l: ConstrRef) -> Result<ConstrRef, Error> {
    let (l0, _) = children(store, c);
    if l != l0 {
        let op = expr_op(store, c).unwrap();
        return store.alloc(Constr::Expr { op, l, r: None });
    }
    Ok(c)
}

// Replace an expression with a constant if evaluation yields one.
fn normal_eval(store: &mut Store, c: ConstrRef) -> Result<Option<ConstrRef>, Error> {
    let val = store.eval(c);
    if val.is_value() {
        return Ok(Some(constant(store, val)?));
    }
    Ok(None)
}


fn normal_eq(
    store: &mut Store,
    patches: &mut PatchTrail,
    patched: &mut u32,
    c: ConstrRef,
) -> Result<ConstrRef, Error> {
    if let Some(e) = normal_eval(store, c)? {
        return Ok(e);
    }

    let (l0, r0) = children(store, c);
    let l = normal(store, patches, patched, l0)?;
    let r = normal(store, patches, patched, r0.unwrap())?;

    // shortcut if both sides are the same
    if l == r {
        return constant(store, Val::value(1));
    }

    update_expr(store, c, l, r)
}

fn normal_lt(
    store: &mut Store,
    patches: &mut PatchTrail,
    patched: &mut u32,
    c: ConstrRef,
) -> Result<ConstrRef, Error> {
    if let Some(e) = normal_eval(store, c)? {
        return Ok(e);
    }

    let (l0, r0) = children(store, c);
    let l = normal(store, patches, patched, l0)?;
    let r = normal(store, patches, patched, r0.unwrap())?;

    // shortcut if both sides are the same
    if l == r {
        return constant(store, Val::value(0));
    }

    // swap sides if both are negations
    if expr_op(store, l) == Some(Op::Neg) && expr_op(store, r) == Some(Op::Neg) {
        let (ll, _) = children(store, l);
        let (rl, _) = children(store, r);
        return update_expr(store, c, rl, ll);
    }

    if store.is_const(l) {
        // move a constant of an addition on the right side to the left side
        if expr_op(store, r) == Some(Op::Add) {
            let (rl, rr) = children(store, r);
            let rr = rr.unwrap();
            if store.is_const(rr) {
                let nk = store.alloc(Constr::Expr {
                    op: Op::Neg,
                    l: rr,
                    r: None,
                })?;
                let sum = update_expr(store, r, l, nk)?;
                let folded = normal(store, patches, patched, sum)?;
                return update_expr(store, c, folded, rl);
            }
        }

        // swap sides if the right side is a negation
        if expr_op(store, r) == Some(Op::Neg) {
            let (rl, _) = children(store, r);
            let flipped = update_unary_expr(store, r, l)?;
            let flipped = normal(store, patches, patched, flipped)?;
            return update_expr(store, c, rl, flipped);
        }
    }

    if store.is_const(r) {
        // move a constant of an addition on the left side to the right side
        if expr_op(store, l) == Some(Op::Add) {
            let (ll, lr) = children(store, l);
            let lr = lr.unwrap();
            if store.is_const(lr) {
                let nk = store.alloc(Constr::Expr {
                    op: Op::Neg,
                    l: lr,
                    r: None,
                })?;
                let sum = update_expr(store, l, r, nk)?;
                let folded = normal(store, patches, patched, sum)?;
                return update_expr(store, c, ll, folded);
            }
        }

        // swap sides if the left side is a negation
        if expr_op(store, l) == Some(Op::Neg) {
            let (ll, _) = children(store, l);
            let flipped = update_unary_expr(store, l, r)?;
            let flipped = normal(store, patches, patched, flipped)?;
            return update_expr(store, c, flipped, ll);
        }
    }

    update_expr(store, c, l, r)
}

fn normal_arith(
    store: &mut Store,
    patches: &mut PatchTrail,
    patched: &mut u32,
    c: ConstrRef,
    op: Op,
    neutral: i32,
) -> Result<ConstrRef, Error> {
    if let Some(e) = normal_eval(store, c)? {
        return Ok(e);
    }

    let (l0, r0) = children(store, c);
    let l = normal(store, patches, patched, l0)?;
    let r = normal(store, patches, patched, r0.unwrap())?;

    // swap constants to the right side
    if store.is_const(l) {
        return update_expr(store, c, r, l);
    }

    // reduce to the left side if the right side is the neutral element
    if store.is_const(r) && store.term_val(r).lo == neutral {
        return Ok(l);
    }

    // re-associate to collect constants on the outermost right
    if expr_op(store, r) == Some(op) {
        let (rl, rr) = children(store, r);
        let rr = rr.unwrap();
        if store.is_const(rr) {
            let inner = update_expr(store, r, l, rl)?;
            return update_expr(store, c, inner, rr);
        }
    }

    if expr_op(store, l) == Some(op) {
        let (ll, lr) = children(store, l);
        let lr = lr.unwrap();
        if store.is_const(lr) {
            let inner = update_expr(store, l, r, lr)?;
            return update_expr(store, c, ll, inner);
        }
    }

    update_expr(store, c, l, r)
}

fn normal_unary(
    store: &mut Store,
    patches: &mut PatchTrail,
    patched: &mut u32,
    c: ConstrRef,
    op: Op,
) -> Result<ConstrRef, Error> {
    if let Some(e) = normal_eval(store, c)? {
        return Ok(e);
    }

    let (l0, _) = children(store, c);
    let l = normal(store, patches, patched, l0)?;

    // collapse a doubled operation
    if expr_op(store, l) == Some(op) {
        let (ll, _) = children(store, l);
        return Ok(ll);
    }

    update_unary_expr(store, c, l)
}

fn normal_logic(
    store: &mut Store,
    patches: &mut PatchTrail,
    patched: &mut u32,
    c: ConstrRef,
    op: Op,
) -> Result<ConstrRef, Error> {
    if let Some(e) = normal_eval(store, c)? {
        return Ok(e);
    }

    let (l0, r0) = children(store, c);
    let l = normal(store, patches, patched, l0)?;
    let r = normal(store, patches, patched, r0.unwrap())?;

    // shortcut if both sides are the same
    if l == r {
        return Ok(l);
    }

    let neutral = |v: Val| match op {
        Op::And => v.is_true(),
        _ => v.is_false(),
    };

    // absorption by the neutral element
    if store.is_term(l) && neutral(store.term_val(l)) {
        return Ok(r);
    }
    if store.is_term(r) && neutral(store.term_val(r)) {
        return Ok(l);
    }

    // DeMorgan's law
    if expr_op(store, l) == Some(Op::Not) && expr_op(store, r) == Some(Op::Not) {
        let (ll, _) = children(store, l);
        let (rl, _) = children(store, r);
        let inv = match op {
            Op::And => Op::Or,
            _ => Op::And,
        };
        let inner = store.alloc(Constr::Expr {
            op: inv,
            l: ll,
            r: Some(rl),
        })?;
        return update_unary_expr(store, l, inner);
    }

    update_expr(store, c, l, r)
}

fn normal_wand(
    store: &mut Store,
    patches: &mut PatchTrail,
    patched: &mut u32,
    c: ConstrRef,
) -> Result<ConstrRef, Error> {
    // patch slots whose constraint could be reduced
    for i in 0..store.wand_len(c) {
        let cl = store.wand_elem(c, i);
        let o = store.slot(cl).constr;
        let n = normal(store, patches, patched, o)?;
        if n != o {
            trail::patch(patches, store, cl, n)?;
            *patched += 1;
        }
    }

    Ok(c)
}

fn normal_confl(store: &mut Store, c: ConstrRef) -> Result<ConstrRef, Error> {
    if let Some(e) = normal_eval(store, c)? {
        return Ok(e);
    }

    Ok(c)
}
