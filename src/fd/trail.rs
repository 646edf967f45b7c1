use crate::fd::constr::{ClauseRef, ConstrRef, Store, VarId};
use crate::fd::domain::Val;
use crate::fd::registry::VarEntry;
use crate::fd::Error;


/// One reversible narrowing of a variable.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct Bind {
    /// The narrowed variable.
    pub var: VarId,
    /// Value of the cell before the bind.
    pub val: Val,
    /// Assignment level of the variable before the bind.
    pub level: usize,
    /// Clause that forced the narrowing, `None` for a decision.
    pub clause: Option<ClauseRef>,
    /// Previous bind of the same variable.
    pub prev: Option<u32>,
}


/// The bind trail: a fixed-capacity stack of narrowings, unwound on
/// backtrack. The current assignment level is set explicitly by the driver
/// and recorded with every bind.
#[derive(Clone, Debug)]
pub struct BindTrail {
    stack: Vec<Bind>,
    limit: usize,
    level: usize,
}

impl BindTrail {
    pub fn new(limit: usize) -> BindTrail {
        BindTrail {
            stack: Vec::new(),
            limit,
            level: usize::max_value(),
        }
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    #[inline]
    pub fn level(&self) -> usize {
        self.level
    }

    #[inline]
    pub fn set_level(&mut self, level: usize) {
        self.level = level;
    }

    #[inline]
    pub fn record(&self, i: u32) -> Bind {
        self.stack[i as usize]
    }

    /// Make all current binds permanent.
    pub fn commit(&mut self) {
        self.stack.clear();
    }
}

/// Narrow a variable's cell to `val`, recording the previous state.
pub fn bind(
    trail: &mut BindTrail,
    store: &mut Store,
    env: &mut [VarEntry],
    var: VarId,
    val: Val,
    clause: Option<ClauseRef>,
) -> Result<(), Error> {
    if trail.stack.len() >= trail.limit {
        return Err(Error::TooManyBinds);
    }

    let entry = &mut env[var.0];
    trail.stack.push(Bind {
        var,
        val: store.term_val(entry.term),
        level: entry.level,
        clause,
        prev: entry.binds,
    });

    store.set_term_val(entry.term, val);
    entry.level = trail.level;
    entry.binds = Some((trail.stack.len() - 1) as u32);
    Ok(())
}

/// Undo binds down to `depth`, restoring cells, levels and bind heads.
pub fn unbind(trail: &mut BindTrail, store: &mut Store, env: &mut [VarEntry], depth: usize) {
    while trail.stack.len() > depth {
        let b = trail.stack.pop().unwrap();
        let entry = &mut env[b.var.0];
        store.set_term_val(entry.term, b.val);
        entry.level = b.level;
        entry.binds = b.prev;
    }
}


#[derive(PartialEq, Eq, Copy, Clone, Debug)]
struct Patch {
    slot: ClauseRef,
    constr: ConstrRef,
}

/// The patch trail: same stack discipline for clause-slot replacement.
#[derive(Clone, Debug)]
pub struct PatchTrail {
    stack: Vec<Patch>,
    limit: usize,
}

impl PatchTrail {
    pub fn new(limit: usize) -> PatchTrail {
        PatchTrail {
            stack: Vec::new(),
            limit,
        }
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Make all current patches permanent.
    pub fn commit(&mut self) {
        self.stack.clear();
    }
}

/// Replace the current constraint of a clause slot, recording the old one.
pub fn patch(
    patches: &mut PatchTrail,
    store: &mut Store,
    slot: ClauseRef,
    c: ConstrRef,
) -> Result<(), Error> {
    if patches.stack.len() >= patches.limit {
        return Err(Error::TooManyPatches);
    }
    patches.stack.push(Patch {
        slot,
        constr: store.slot(slot).constr,
    });
    store.set_slot_constr(slot, c);
    Ok(())
}

/// Undo patches down to `depth`.
pub fn unpatch(patches: &mut PatchTrail, store: &mut Store, depth: usize) {
    while patches.stack.len() > depth {
        let p = patches.stack.pop().unwrap();
        store.set_slot_constr(p.slot, p.constr);
    }
}
