use fdsolve::fd::constr::{ClauseRef, Constr, ConflItem, ConstrRef, Op, Slot, Store, VarId};
use fdsolve::fd::domain::{add, mul, neg, Val, DOMAIN_MAX, DOMAIN_MIN};
use fdsolve::fd::normalize;
use fdsolve::fd::registry::{VarEntry, LEVEL_NONE, NOT_IN_HEAP};
use fdsolve::fd::solver::order::{Order, VarOrder};
use fdsolve::fd::solver::search::RestartSchedule;
use fdsolve::fd::trail::{self, BindTrail, PatchTrail};
use fdsolve::fd::Error;


fn store() -> Store {
    Store::new(1 << 20, 1 << 20)
}

fn term(store: &mut Store, val: Val) -> ConstrRef {
    store.alloc(Constr::Term { val, var: None }).unwrap()
}

fn expr(store: &mut Store, op: Op, l: ConstrRef, r: ConstrRef) -> ConstrRef {
    store.alloc(Constr::Expr { op, l, r: Some(r) }).unwrap()
}

fn unary(store: &mut Store, op: Op, l: ConstrRef) -> ConstrRef {
    store.alloc(Constr::Expr { op, l, r: None }).unwrap()
}


// ---------------------------------------------------------------- arithmetic

#[test]
fn neg_saturates_at_the_sentinels() {
    assert_eq!(neg(5), -5);
    assert_eq!(neg(-5), 5);
    assert_eq!(neg(0), 0);
    assert_eq!(neg(DOMAIN_MIN), DOMAIN_MAX);
    assert_eq!(neg(DOMAIN_MAX), DOMAIN_MIN);
}

#[test]
fn add_saturates_on_overflow() {
    assert_eq!(add(2, 3), 5);
    assert_eq!(add(-2, -3), -5);
    assert_eq!(add(DOMAIN_MAX, 1), DOMAIN_MAX);
    assert_eq!(add(1, DOMAIN_MAX), DOMAIN_MAX);
    assert_eq!(add(DOMAIN_MIN, -1), DOMAIN_MIN);
    assert_eq!(add(2_000_000_000, 2_000_000_000), DOMAIN_MAX);
    assert_eq!(add(-2_000_000_000, -2_000_000_000), DOMAIN_MIN);
    // minus infinity wins when both sentinels meet
    assert_eq!(add(DOMAIN_MAX, DOMAIN_MIN), DOMAIN_MIN);
}

#[test]
fn mul_follows_the_sign_rules_under_saturation() {
    assert_eq!(mul(3, 4), 12);
    assert_eq!(mul(-3, 4), -12);
    assert_eq!(mul(DOMAIN_MIN, 2), DOMAIN_MIN);
    assert_eq!(mul(DOMAIN_MIN, -2), DOMAIN_MAX);
    assert_eq!(mul(DOMAIN_MAX, 2), DOMAIN_MAX);
    assert_eq!(mul(DOMAIN_MAX, -2), DOMAIN_MIN);
    assert_eq!(mul(2, DOMAIN_MIN), DOMAIN_MIN);
    assert_eq!(mul(-2, DOMAIN_MAX), DOMAIN_MIN);
    // finite overflow saturates with the sign of the true product
    assert_eq!(mul(65536, 65536), DOMAIN_MAX);
    assert_eq!(mul(-65536, 65536), DOMAIN_MIN);
}

#[test]
fn val_truth_predicates() {
    assert!(Val::value(1).is_true());
    assert!(Val::interval(3, 9).is_true());
    assert!(Val::interval(-9, -3).is_true());
    assert!(!Val::interval(0, 1).is_true());
    assert!(Val::value(0).is_false());
    assert!(!Val::interval(0, 1).is_false());
    assert!(Val::value(7).is_value());
    assert!(!Val::interval(0, 1).is_value());
}


// ----------------------------------------------------------------- evaluator

#[test]
fn eval_eq_decides_disjoint_and_equal_singletons() {
    let mut s = store();
    let a = term(&mut s, Val::interval(0, 1));
    let b = term(&mut s, Val::interval(5, 9));
    let e = expr(&mut s, Op::Eq, a, b);
    assert_eq!(s.eval(e), Val::value(0));

    let c = term(&mut s, Val::value(4));
    let d = term(&mut s, Val::value(4));
    let e = expr(&mut s, Op::Eq, c, d);
    assert_eq!(s.eval(e), Val::value(1));

    let x = term(&mut s, Val::interval(0, 1));
    let y = term(&mut s, Val::interval(0, 1));
    let e = expr(&mut s, Op::Eq, x, y);
    assert_eq!(s.eval(e), Val::interval(0, 1));
}

#[test]
fn eval_eq_is_undecided_under_saturation() {
    let mut s = store();
    let a = term(&mut s, Val::interval(DOMAIN_MIN, 5));
    let b = term(&mut s, Val::value(3));
    let e = expr(&mut s, Op::Eq, a, b);
    assert_eq!(s.eval(e), Val::interval(0, 1));
}

#[test]
fn eval_lt_compares_bounds() {
    let mut s = store();
    let a = term(&mut s, Val::interval(1, 2));
    let b = term(&mut s, Val::interval(3, 4));
    let lt = expr(&mut s, Op::Lt, a, b);
    assert_eq!(s.eval(lt), Val::value(1));

    let c = term(&mut s, Val::interval(5, 9));
    let d = term(&mut s, Val::interval(1, 5));
    let lt = expr(&mut s, Op::Lt, c, d);
    assert_eq!(s.eval(lt), Val::value(0));

    let x = term(&mut s, Val::interval(1, 5));
    let y = term(&mut s, Val::interval(3, 9));
    let lt = expr(&mut s, Op::Lt, x, y);
    assert_eq!(s.eval(lt), Val::interval(0, 1));
}

#[test]
fn eval_arithmetic_intervals() {
    let mut s = store();
    let a = term(&mut s, Val::interval(2, 5));
    let n = unary(&mut s, Op::Neg, a);
    assert_eq!(s.eval(n), Val::interval(-5, -2));

    let b = term(&mut s, Val::interval(1, 2));
    let c = term(&mut s, Val::interval(3, 4));
    let sum = expr(&mut s, Op::Add, b, c);
    assert_eq!(s.eval(sum), Val::interval(4, 6));

    let d = term(&mut s, Val::interval(-2, 3));
    let e = term(&mut s, Val::interval(4, 5));
    let prod = expr(&mut s, Op::Mul, d, e);
    assert_eq!(s.eval(prod), Val::interval(-10, 15));
}

#[test]
fn eval_narrows_monotonically_with_its_inputs() {
    let mut s = store();
    let a = term(&mut s, Val::interval(0, 9));
    let b = term(&mut s, Val::interval(1, 2));
    let sum = expr(&mut s, Op::Add, a, b);

    let wide = s.eval(sum);
    s.set_term_val(a, Val::interval(2, 5));
    let narrow = s.eval(sum);

    assert!(narrow.lo >= wide.lo && narrow.hi <= wide.hi);
}

#[test]
fn eval_logic_short_circuits() {
    let mut s = store();
    let t = term(&mut s, Val::value(1));
    let f = term(&mut s, Val::value(0));
    let u = term(&mut s, Val::interval(0, 1));

    let e = expr(&mut s, Op::And, f, u);
    assert_eq!(s.eval(e), Val::value(0));
    let e = expr(&mut s, Op::And, t, t);
    assert_eq!(s.eval(e), Val::value(1));
    let e = expr(&mut s, Op::And, t, u);
    assert_eq!(s.eval(e), Val::interval(0, 1));

    let e = expr(&mut s, Op::Or, t, u);
    assert_eq!(s.eval(e), Val::value(1));
    let e = expr(&mut s, Op::Or, f, f);
    assert_eq!(s.eval(e), Val::value(0));

    let e = unary(&mut s, Op::Not, f);
    assert_eq!(s.eval(e), Val::value(1));
    let e = unary(&mut s, Op::Not, t);
    assert_eq!(s.eval(e), Val::value(0));
    let e = unary(&mut s, Op::Not, u);
    assert_eq!(s.eval(e), Val::interval(0, 1));
}

#[test]
fn eval_wand_over_slots() {
    let mut s = store();
    let t = term(&mut s, Val::value(1));
    let u = term(&mut s, Val::interval(0, 1));
    let f = term(&mut s, Val::value(0));

    let mk = |s: &mut Store, c: ConstrRef| -> ClauseRef {
        s.add_slot(Slot {
            constr: c,
            orig: c,
            prop_tag: 0,
        })
    };

    let c1 = mk(&mut s, t);
    let c2 = mk(&mut s, u);
    let wand = s.alloc(Constr::WAnd(vec![c1, c2])).unwrap();
    assert_eq!(s.eval(wand), Val::interval(0, 1));

    let c3 = mk(&mut s, t);
    let wand = s.alloc(Constr::WAnd(vec![c3])).unwrap();
    assert_eq!(s.eval(wand), Val::value(1));

    let c4 = mk(&mut s, f);
    let c5 = mk(&mut s, t);
    let wand = s.alloc(Constr::WAnd(vec![c4, c5])).unwrap();
    assert_eq!(s.eval(wand), Val::value(0));
}

#[test]
fn eval_conflict_clause() {
    let mut s = store();
    let x = term(&mut s, Val::value(1));
    let y = term(&mut s, Val::value(0));

    // some variable differs from its forbidden value: satisfied
    let c = s
        .alloc(Constr::Confl(vec![
            ConflItem {
                var: x,
                val: Val::value(0),
            },
            ConflItem {
                var: y,
                val: Val::value(0),
            },
        ]))
        .unwrap();
    assert_eq!(s.eval(c), Val::value(1));

    // an unassigned variable leaves the clause undecided
    let z = term(&mut s, Val::interval(0, 1));
    let c = s
        .alloc(Constr::Confl(vec![ConflItem {
            var: z,
            val: Val::value(0),
        }]))
        .unwrap();
    assert_eq!(s.eval(c), Val::interval(0, 1));

    // every variable pinned at its forbidden value stays undecided
    let c = s
        .alloc(Constr::Confl(vec![ConflItem {
            var: y,
            val: Val::value(0),
        }]))
        .unwrap();
    assert_eq!(s.eval(c), Val::interval(0, 1));
}


// ---------------------------------------------------------------- normaliser

fn normalize_all(s: &mut Store, p: &mut PatchTrail, c: ConstrRef) -> ConstrRef {
    normalize::normalize(s, p, c).unwrap()
}

#[test]
fn normalize_folds_constant_expressions() {
    let mut s = store();
    let mut p = PatchTrail::new(64);
    let two = term(&mut s, Val::value(2));
    let three = term(&mut s, Val::value(3));
    let sum = expr(&mut s, Op::Add, two, three);
    let n = normalize_all(&mut s, &mut p, sum);
    assert!(s.is_const(n));
    assert_eq!(s.term_val(n), Val::value(5));
}

#[test]
fn normalize_drops_neutral_elements() {
    let mut s = store();
    let mut p = PatchTrail::new(64);
    let x = term(&mut s, Val::interval(0, 9));
    let zero = term(&mut s, Val::value(0));
    let sum = expr(&mut s, Op::Add, x, zero);
    assert_eq!(normalize_all(&mut s, &mut p, sum), x);

    let one = term(&mut s, Val::value(1));
    let prod = expr(&mut s, Op::Mul, x, one);
    assert_eq!(normalize_all(&mut s, &mut p, prod), x);
}

#[test]
fn normalize_moves_constants_to_the_right() {
    let mut s = store();
    let mut p = PatchTrail::new(64);
    let x = term(&mut s, Val::interval(0, 9));
    let five = term(&mut s, Val::value(5));
    let sum = expr(&mut s, Op::Add, five, x);
    let n = normalize_all(&mut s, &mut p, sum);
    match *s.node(n) {
        Constr::Expr {
            op: Op::Add,
            l,
            r: Some(r),
        } => {
            assert_eq!(l, x);
            assert_eq!(s.term_val(r), Val::value(5));
        }
        ref other => panic!("unexpected shape: {:?}", other),
    }
}

#[test]
fn normalize_reflexive_comparisons() {
    let mut s = store();
    let mut p = PatchTrail::new(64);
    let x = term(&mut s, Val::interval(0, 9));
    let eq = expr(&mut s, Op::Eq, x, x);
    let n = normalize_all(&mut s, &mut p, eq);
    assert_eq!(s.term_val(n), Val::value(1));

    let lt = expr(&mut s, Op::Lt, x, x);
    let n = normalize_all(&mut s, &mut p, lt);
    assert_eq!(s.term_val(n), Val::value(0));
}

#[test]
fn normalize_collapses_double_negation() {
    let mut s = store();
    let mut p = PatchTrail::new(64);
    let x = term(&mut s, Val::interval(0, 9));
    let n1 = unary(&mut s, Op::Neg, x);
    let n2 = unary(&mut s, Op::Neg, n1);
    assert_eq!(normalize_all(&mut s, &mut p, n2), x);

    let b = term(&mut s, Val::interval(0, 1));
    let m1 = unary(&mut s, Op::Not, b);
    let m2 = unary(&mut s, Op::Not, m1);
    assert_eq!(normalize_all(&mut s, &mut p, m2), b);
}

#[test]
fn normalize_applies_demorgan() {
    let mut s = store();
    let mut p = PatchTrail::new(64);
    let a = term(&mut s, Val::interval(0, 1));
    let b = term(&mut s, Val::interval(0, 1));
    let na = unary(&mut s, Op::Not, a);
    let nb = unary(&mut s, Op::Not, b);
    let and = expr(&mut s, Op::And, na, nb);
    let n = normalize_all(&mut s, &mut p, and);

    match *s.node(n) {
        Constr::Expr {
            op: Op::Not,
            l,
            r: None,
        } => match *s.node(l) {
            Constr::Expr {
                op: Op::Or,
                l: il,
                r: Some(ir),
            } => {
                assert_eq!(il, a);
                assert_eq!(ir, b);
            }
            ref other => panic!("unexpected inner shape: {:?}", other),
        },
        ref other => panic!("unexpected shape: {:?}", other),
    }
}

#[test]
fn normalize_shifts_addition_constants_across_less_than() {
    let mut s = store();
    let mut p = PatchTrail::new(64);
    let x = term(&mut s, Val::interval(0, 9));
    let ten = term(&mut s, Val::value(10));
    let three = term(&mut s, Val::value(3));
    let sum = expr(&mut s, Op::Add, x, three);
    let lt = expr(&mut s, Op::Lt, ten, sum);
    let n = normalize_all(&mut s, &mut p, lt);

    match *s.node(n) {
        Constr::Expr {
            op: Op::Lt,
            l,
            r,
        } => {
            assert_eq!(s.term_val(l), Val::value(7));
            assert_eq!(r, Some(x));
        }
        ref other => panic!("unexpected shape: {:?}", other),
    }
}

#[test]
fn normalize_is_idempotent() {
    let mut s = store();
    let mut p = PatchTrail::new(64);
    let x = term(&mut s, Val::interval(0, 9));
    let y = term(&mut s, Val::interval(-3, 3));
    let two = term(&mut s, Val::value(2));
    let sum = expr(&mut s, Op::Add, two, x);
    let neg = unary(&mut s, Op::Neg, y);
    let lt = expr(&mut s, Op::Lt, neg, sum);
    let b = term(&mut s, Val::interval(0, 1));
    let nb = unary(&mut s, Op::Not, b);
    let or = expr(&mut s, Op::Or, lt, nb);

    let once = normalize_all(&mut s, &mut p, or);
    let twice = normalize_all(&mut s, &mut p, once);
    assert_eq!(once, twice);
}

#[test]
fn normalize_patches_wand_slots() {
    let mut s = store();
    let mut p = PatchTrail::new(64);
    let x = term(&mut s, Val::interval(0, 9));
    let one = term(&mut s, Val::value(1));
    let and = expr(&mut s, Op::And, x, one);
    let slot = s.add_slot(Slot {
        constr: and,
        orig: and,
        prop_tag: 0,
    });
    let wand = s.alloc(Constr::WAnd(vec![slot])).unwrap();

    let n = normalize_all(&mut s, &mut p, wand);
    assert_eq!(n, wand);
    assert_eq!(s.slot(slot).constr, x);
    assert_eq!(s.slot(slot).orig, and);
    assert_eq!(p.depth(), 1);
}


// ------------------------------------------------------------ trail & arenas

#[test]
fn bind_trail_round_trips() {
    let mut s = store();
    let t0 = term(&mut s, Val::interval(0, 9));
    let t1 = term(&mut s, Val::interval(5, 5));
    let mut env = vec![VarEntry::new("x", t0), VarEntry::new("y", t1)];
    s.set_term_var(t0, VarId(0));
    s.set_term_var(t1, VarId(1));

    let mut bt = BindTrail::new(16);
    bt.set_level(0);
    trail::bind(&mut bt, &mut s, &mut env, VarId(0), Val::interval(1, 3), None).unwrap();
    bt.set_level(1);
    trail::bind(&mut bt, &mut s, &mut env, VarId(1), Val::value(5), None).unwrap();
    trail::bind(&mut bt, &mut s, &mut env, VarId(0), Val::value(2), None).unwrap();

    assert_eq!(s.term_val(t0), Val::value(2));
    assert_eq!(env[0].level, 1);
    assert_eq!(bt.depth(), 3);

    trail::unbind(&mut bt, &mut s, &mut env, 0);
    assert_eq!(bt.depth(), 0);
    assert_eq!(s.term_val(t0), Val::interval(0, 9));
    assert_eq!(s.term_val(t1), Val::interval(5, 5));
    assert_eq!(env[0].binds, None);
    assert_eq!(env[1].binds, None);
    assert_eq!(env[0].level, LEVEL_NONE);
    assert_eq!(env[1].level, LEVEL_NONE);
}

#[test]
fn bind_trail_reports_exhaustion() {
    let mut s = store();
    let t0 = term(&mut s, Val::interval(0, 9));
    let mut env = vec![VarEntry::new("x", t0)];
    s.set_term_var(t0, VarId(0));

    let mut bt = BindTrail::new(1);
    bt.set_level(0);
    assert!(trail::bind(&mut bt, &mut s, &mut env, VarId(0), Val::value(1), None).is_ok());
    assert_eq!(
        trail::bind(&mut bt, &mut s, &mut env, VarId(0), Val::value(2), None),
        Err(Error::TooManyBinds)
    );
}

#[test]
fn patch_trail_round_trips() {
    let mut s = store();
    let a = term(&mut s, Val::interval(0, 9));
    let b = term(&mut s, Val::value(1));
    let slot = s.add_slot(Slot {
        constr: a,
        orig: a,
        prop_tag: 0,
    });

    let mut pt = PatchTrail::new(2);
    trail::patch(&mut pt, &mut s, slot, b).unwrap();
    assert_eq!(s.slot(slot).constr, b);
    trail::unpatch(&mut pt, &mut s, 0);
    assert_eq!(s.slot(slot).constr, a);

    trail::patch(&mut pt, &mut s, slot, b).unwrap();
    trail::patch(&mut pt, &mut s, slot, a).unwrap();
    assert_eq!(
        trail::patch(&mut pt, &mut s, slot, b),
        Err(Error::TooManyPatches)
    );
}

#[test]
fn arena_release_is_a_strict_stack() {
    let mut s = store();
    let early = s.mark();
    term(&mut s, Val::value(1));
    term(&mut s, Val::value(2));
    let late = s.mark();

    assert!(s.release(early).is_ok());
    assert_eq!(s.release(late), Err(Error::WrongDealloc));
}

#[test]
fn arena_exhaustion_is_reported() {
    let mut s = Store::new(0, 1 << 20);
    assert_eq!(
        s.alloc(Constr::Term {
            val: Val::value(1),
            var: None
        }),
        Err(Error::OutOfMemory)
    );
}


// ------------------------------------------------------------- variable heap

fn heap_env(s: &mut Store, vals: &[Val]) -> Vec<VarEntry> {
    vals.iter()
        .enumerate()
        .map(|(i, &v)| {
            let t = term(s, v);
            s.set_term_var(t, VarId(i));
            VarEntry::new(&format!("v{}", i), t)
        })
        .collect()
}

#[test]
fn heap_single_element() {
    let mut s = store();
    let mut env = heap_env(&mut s, &[Val::interval(0, 9)]);
    let mut heap = VarOrder::new(Order::SmallestDomain, false);

    heap.push(&s, &mut env, VarId(0));
    assert_eq!(env[0].order, 0);
    assert_eq!(heap.pop(&s, &mut env), Some(VarId(0)));
    assert_eq!(heap.len(), 0);
    assert_eq!(env[0].order, NOT_IN_HEAP);
    assert_eq!(heap.pop(&s, &mut env), None);
}

#[test]
fn heap_orders_by_smallest_value() {
    let mut s = store();
    let mut env = heap_env(
        &mut s,
        &[
            Val::interval(5, 9),
            Val::interval(1, 9),
            Val::interval(3, 9),
        ],
    );
    let mut heap = VarOrder::new(Order::SmallestValue, false);
    for i in 0..3 {
        heap.push(&s, &mut env, VarId(i));
    }

    assert_eq!(heap.pop(&s, &mut env), Some(VarId(1)));
    assert_eq!(heap.pop(&s, &mut env), Some(VarId(2)));
    assert_eq!(heap.pop(&s, &mut env), Some(VarId(0)));
}

#[test]
fn heap_orders_by_domain_size() {
    let mut s = store();
    let mut env = heap_env(
        &mut s,
        &[
            Val::interval(0, 9),
            Val::interval(0, 1),
            Val::interval(0, 4),
        ],
    );
    let mut heap = VarOrder::new(Order::SmallestDomain, false);
    for i in 0..3 {
        heap.push(&s, &mut env, VarId(i));
    }
    assert_eq!(heap.pop(&s, &mut env), Some(VarId(1)));
    assert_eq!(heap.pop(&s, &mut env), Some(VarId(2)));
    assert_eq!(heap.pop(&s, &mut env), Some(VarId(0)));

    let mut heap = VarOrder::new(Order::LargestDomain, false);
    for i in 0..3 {
        heap.push(&s, &mut env, VarId(i));
    }
    assert_eq!(heap.pop(&s, &mut env), Some(VarId(0)));
}

#[test]
fn heap_breaks_ties_with_priority_and_updates_in_place() {
    let mut s = store();
    let mut env = heap_env(
        &mut s,
        &[
            Val::interval(0, 1),
            Val::interval(0, 1),
            Val::interval(0, 1),
        ],
    );
    env[0].prio = 5;
    env[1].prio = 10;
    env[2].prio = 1;

    let mut heap = VarOrder::new(Order::None, true);
    for i in 0..3 {
        heap.push(&s, &mut env, VarId(i));
    }

    // priorities change while queued; update restores the heap property
    env[2].prio = 20;
    heap.update(&s, &mut env, VarId(2));

    assert_eq!(heap.pop(&s, &mut env), Some(VarId(2)));
    assert_eq!(heap.pop(&s, &mut env), Some(VarId(1)));
    assert_eq!(heap.pop(&s, &mut env), Some(VarId(0)));
}


// ------------------------------------------------------------------ restarts

#[test]
fn restart_thresholds_follow_the_luby_sequence() {
    let mut schedule = RestartSchedule::new();
    let mut seq = vec![schedule.threshold()];
    for _ in 0..14 {
        schedule.advance();
        seq.push(schedule.threshold());
    }
    assert_eq!(seq, vec![1, 1, 2, 1, 1, 2, 4, 1, 1, 2, 1, 1, 2, 4, 8]);
}

#[test]
fn restart_triggers_above_threshold_times_frequency() {
    let mut schedule = RestartSchedule::new();
    // threshold 1, frequency 2: the third failure trips the restart
    assert!(!schedule.record_fail(2));
    assert!(!schedule.record_fail(2));
    assert!(schedule.record_fail(2));
    // and the threshold has moved along the sequence
    assert_eq!(schedule.threshold(), 1);
}
