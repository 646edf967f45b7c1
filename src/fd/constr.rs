use std::fmt::Write;
use std::mem;

use crate::fd::domain::Val;
use crate::fd::Error;


/// Identifies a variable in the environment.
#[derive(PartialEq, Eq, PartialOrd, Ord, Copy, Clone, Debug)]
pub struct VarId(pub usize);

/// Handle of a constraint node inside the store. The top bit selects the
/// space the node lives in (base or conflict).
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct ConstrRef(u32);

const CONFL_SPACE: u32 = 1 << 31;

impl ConstrRef {
    #[inline]
    fn idx(self) -> usize {
        (self.0 & !CONFL_SPACE) as usize
    }

    #[inline]
    fn in_confl(self) -> bool {
        self.0 & CONFL_SPACE != 0
    }

    /// Raw key for registry tables. Distinct per node.
    #[inline]
    pub fn key(self) -> usize {
        self.0 as usize
    }
}

/// Handle of a clause slot.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct ClauseRef(u32);

impl ClauseRef {
    #[inline]
    pub fn key(self) -> usize {
        self.0 as usize
    }
}

/// Marker into the base arena; releasing to it drops everything allocated
/// after the marker was taken.
#[derive(PartialEq, Eq, PartialOrd, Ord, Copy, Clone, Debug, Default)]
pub struct Marker(usize);

/// Marker into the conflict arena, used to discard a half-built clause.
#[derive(Copy, Clone, Debug)]
pub struct ConflMark {
    nodes: usize,
    used: usize,
}


/// Supported operators of expression nodes.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum Op {
    Eq,
    Lt,
    Neg,
    Add,
    Mul,
    Not,
    And,
    Or,
}

impl Op {
    pub fn symbol(self) -> char {
        match self {
            Op::Eq => '=',
            Op::Lt => '<',
            Op::Neg => '-',
            Op::Add => '+',
            Op::Mul => '*',
            Op::Not => '!',
            Op::And => '&',
            Op::Or => '|',
        }
    }
}


/// One element of a conflict clause: a variable term and the value it must
/// move away from for the clause to be satisfied.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct ConflItem {
    pub var: ConstrRef,
    pub val: Val,
}

/// One element of the top-level conjunction. `constr` is the current (maybe
/// patched) form, `orig` the form it was built with, `prop_tag` the
/// propagation generation that last visited this slot.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct Slot {
    pub constr: ConstrRef,
    pub orig: ConstrRef,
    pub prop_tag: u64,
}

/// A constraint node.
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum Constr {
    /// A value cell; `var` links a variable term back to its environment
    /// entry and is `None` for anonymous constants.
    Term { val: Val, var: Option<VarId> },
    /// An operator application; `r` is absent for unary operators.
    Expr {
        op: Op,
        l: ConstrRef,
        r: Option<ConstrRef>,
    },
    /// The top-level conjunction, an ordered sequence of clause slots.
    WAnd(Vec<ClauseRef>),
    /// A learnt conflict clause.
    Confl(Vec<ConflItem>),
}


const NODE_SIZE: usize = mem::size_of::<Constr>();
const ITEM_SIZE: usize = mem::size_of::<ConflItem>();
const SLOT_SIZE: usize = mem::size_of::<Slot>();


/// Node and slot storage. Two spaces with stack discipline: the base space
/// is released to markers when search steps exit, the conflict space holds
/// learnt clauses and is never rewound within a search episode.
#[derive(Clone, Debug)]
pub struct Store {
    base: Vec<Constr>,
    confl: Vec<Constr>,
    slots: Vec<Slot>,
    base_limit: usize,
    confl_limit: usize,
    confl_used: usize,
    peak: usize,
}

impl Store {
    pub fn new(base_bytes: usize, confl_bytes: usize) -> Store {
        Store {
            base: Vec::new(),
            confl: Vec::new(),
            slots: Vec::new(),
            base_limit: base_bytes,
            confl_limit: confl_bytes,
            confl_used: 0,
            peak: 0,
        }
    }

    #[inline]
    fn base_used(&self) -> usize {
        self.base.len() * NODE_SIZE
    }

    fn note_peak(&mut self) {
        let used = self.base_used() + self.confl_used;
        if used > self.peak {
            self.peak = used;
        }
    }

    /// Peak number of bytes ever held across both spaces.
    pub fn peak_bytes(&self) -> usize {
        self.peak
    }


    /// Allocate a node in the base space.
    pub fn alloc(&mut self, c: Constr) -> Result<ConstrRef, Error> {
        if self.base_used() + NODE_SIZE > self.base_limit {
            return Err(Error::OutOfMemory);
        }
        self.base.push(c);
        self.note_peak();
        Ok(ConstrRef((self.base.len() - 1) as u32))
    }

    /// Allocate a node in the conflict space.
    pub fn alloc_confl(&mut self, c: Constr) -> Result<ConstrRef, Error> {
        if self.confl_used + NODE_SIZE > self.confl_limit {
            return Err(Error::OutOfMemory);
        }
        self.confl.push(c);
        self.confl_used += NODE_SIZE;
        self.note_peak();
        Ok(ConstrRef((self.confl.len() - 1) as u32 | CONFL_SPACE))
    }

    #[inline]
    pub fn mark(&self) -> Marker {
        Marker(self.base.len())
    }

    /// Release the base space down to a marker.
    pub fn release(&mut self, m: Marker) -> Result<(), Error> {
        if m.0 > self.base.len() {
            return Err(Error::WrongDealloc);
        }
        self.base.truncate(m.0);
        Ok(())
    }

    #[inline]
    pub fn confl_mark(&self) -> ConflMark {
        ConflMark {
            nodes: self.confl.len(),
            used: self.confl_used,
        }
    }

    /// Discard a half-built conflict clause.
    pub fn confl_release(&mut self, m: ConflMark) {
        self.confl.truncate(m.nodes);
        self.confl_used = m.used;
    }


    #[inline]
    pub fn node(&self, r: ConstrRef) -> &Constr {
        if r.in_confl() {
            &self.confl[r.idx()]
        } else {
            &self.base[r.idx()]
        }
    }

    #[inline]
    pub fn node_mut(&mut self, r: ConstrRef) -> &mut Constr {
        if r.in_confl() {
            &mut self.confl[r.idx()]
        } else {
            &mut self.base[r.idx()]
        }
    }

    #[inline]
    pub fn is_term(&self, r: ConstrRef) -> bool {
        match *self.node(r) {
            Constr::Term { .. } => true,
            _ => false,
        }
    }

    /// Whether the node is a constant value.
    #[inline]
    pub fn is_const(&self, r: ConstrRef) -> bool {
        match *self.node(r) {
            Constr::Term { val, .. } => val.is_value(),
            _ => false,
        }
    }

    #[inline]
    pub fn term_val(&self, r: ConstrRef) -> Val {
        match *self.node(r) {
            Constr::Term { val, .. } => val,
            _ => panic!("not a terminal node"),
        }
    }

    #[inline]
    pub fn set_term_val(&mut self, r: ConstrRef, v: Val) {
        match *self.node_mut(r) {
            Constr::Term { ref mut val, .. } => *val = v,
            _ => panic!("not a terminal node"),
        }
    }

    #[inline]
    pub fn term_var(&self, r: ConstrRef) -> Option<VarId> {
        match *self.node(r) {
            Constr::Term { var, .. } => var,
            _ => panic!("not a terminal node"),
        }
    }

    pub fn set_term_var(&mut self, r: ConstrRef, v: VarId) {
        match *self.node_mut(r) {
            Constr::Term { ref mut var, .. } => *var = Some(v),
            _ => panic!("not a terminal node"),
        }
    }


    pub fn add_slot(&mut self, slot: Slot) -> ClauseRef {
        self.slots.push(slot);
        ClauseRef((self.slots.len() - 1) as u32)
    }

    /// Add a slot charged to the conflict space.
    pub fn add_confl_slot(&mut self, slot: Slot) -> Result<ClauseRef, Error> {
        if self.confl_used + SLOT_SIZE > self.confl_limit {
            return Err(Error::OutOfMemory);
        }
        self.confl_used += SLOT_SIZE;
        self.note_peak();
        Ok(self.add_slot(slot))
    }

    #[inline]
    pub fn slot(&self, cl: ClauseRef) -> Slot {
        self.slots[cl.key()]
    }

    #[inline]
    pub fn set_slot_constr(&mut self, cl: ClauseRef, c: ConstrRef) {
        self.slots[cl.key()].constr = c;
    }

    #[inline]
    pub fn set_slot_tag(&mut self, cl: ClauseRef, tag: u64) {
        self.slots[cl.key()].prop_tag = tag;
    }


    #[inline]
    pub fn wand_len(&self, r: ConstrRef) -> usize {
        match *self.node(r) {
            Constr::WAnd(ref elems) => elems.len(),
            _ => panic!("not a wide-and node"),
        }
    }

    #[inline]
    pub fn wand_elem(&self, r: ConstrRef, i: usize) -> ClauseRef {
        match *self.node(r) {
            Constr::WAnd(ref elems) => elems[i],
            _ => panic!("not a wide-and node"),
        }
    }

    pub fn wand_push(&mut self, r: ConstrRef, cl: ClauseRef) {
        match *self.node_mut(r) {
            Constr::WAnd(ref mut elems) => elems.push(cl),
            _ => panic!("not a wide-and node"),
        }
    }


    #[inline]
    pub fn confl_len(&self, r: ConstrRef) -> usize {
        match *self.node(r) {
            Constr::Confl(ref elems) => elems.len(),
            _ => panic!("not a conflict node"),
        }
    }

    #[inline]
    pub fn confl_item(&self, r: ConstrRef, i: usize) -> ConflItem {
        match *self.node(r) {
            Constr::Confl(ref elems) => elems[i],
            _ => panic!("not a conflict node"),
        }
    }

    pub fn confl_swap(&mut self, r: ConstrRef, i: usize, j: usize) {
        match *self.node_mut(r) {
            Constr::Confl(ref mut elems) => elems.swap(i, j),
            _ => panic!("not a conflict node"),
        }
    }

    /// Append a literal to a conflict clause, charging the conflict space.
    pub fn confl_push(&mut self, r: ConstrRef, item: ConflItem) -> Result<(), Error> {
        if self.confl_used + ITEM_SIZE > self.confl_limit {
            return Err(Error::OutOfMemory);
        }
        self.confl_used += ITEM_SIZE;
        self.note_peak();
        match *self.node_mut(r) {
            Constr::Confl(ref mut elems) => elems.push(item),
            _ => panic!("not a conflict node"),
        }
        Ok(())
    }


    /// Render a constraint for diagnostics.
    pub fn dump(&self, r: ConstrRef) -> String {
        let mut out = String::new();
        self.dump_into(&mut out, r);
        out
    }

    fn dump_into(&self, out: &mut String, r: ConstrRef) {
        match *self.node(r) {
            Constr::Term { val, .. } => {
                let _ = write!(out, " {}", val);
            }
            Constr::Expr { op, l, r: rhs } => {
                let _ = write!(out, " ({}", op.symbol());
                self.dump_into(out, l);
                if let Some(rhs) = rhs {
                    self.dump_into(out, rhs);
                }
                out.push(')');
            }
            Constr::WAnd(ref elems) => {
                for &cl in elems.iter() {
                    self.dump_into(out, self.slots[cl.key()].constr);
                    out.push(';');
                }
            }
            Constr::Confl(ref elems) => {
                out.push_str(" (conflict");
                for item in elems.iter() {
                    self.dump_into(out, item.var);
                    let _ = write!(out, "/{}", item.val);
                }
                out.push(')');
            }
        }
    }
}
