//! Problem reader.
//!
//! The text format is line-free: items separated by `;`. Variables are
//! declared as `var x in [0, 9];`, every other item is a constraint over
//! the declared variables, and an optional `any;` / `all;` / `min <expr>;`
//! / `max <expr>;` item selects what to search for.

use std::{fs, io, path, str};

use flate2::read::GzDecoder;

use crate::fd::constr::{ClauseRef, Constr, ConstrRef, Op, Slot, Store, VarId};
use crate::fd::domain::{Domain, Val, DOMAIN_MAX, DOMAIN_MIN};
use crate::fd::registry::{Registry, VarEntry};
use crate::fd::solver::Objective;


/// An ingested problem: the root conjunction, the variable environment and
/// its lookup tables, and the requested objective.
#[derive(Debug)]
pub struct Problem {
    pub root: ConstrRef,
    pub vars: Vec<VarEntry>,
    pub registry: Registry,
    pub objective: Objective,
    pub obj_expr: Option<ConstrRef>,
}


pub fn parse_file<P: AsRef<path::Path>>(path: P, store: &mut Store) -> io::Result<Problem> {
    let file = fs::File::open(&path)?;
    let gzipped = path.as_ref().extension().map_or(false, |ext| ext == "gz");
    if gzipped {
        parse(&mut GzDecoder::new(file), store)
    } else {
        parse(&mut io::BufReader::new(file), store)
    }
}

pub fn parse<R: io::Read>(reader: &mut R, store: &mut Store) -> io::Result<Problem> {
    let mut buf = String::new();
    reader.read_to_string(&mut buf)?;

    let mut parser = ModelParser {
        chars: buf.chars(),
        cur: None,
        line: 1,
        pending: None,
        store,
        vars: Vec::new(),
        registry: Registry::new(),
        slots: Vec::new(),
        objective: None,
    };
    parser.next();
    parser.parse_problem()
}


fn parse_error(line: u32, msg: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("{} in line {}", msg, line),
    )
}


struct ModelParser<'p, 's> {
    chars: str::Chars<'p>,
    cur: Option<char>,
    line: u32,
    pending: Option<String>,
    store: &'s mut Store,
    vars: Vec<VarEntry>,
    registry: Registry,
    slots: Vec<Slot>,
    objective: Option<(Objective, Option<ConstrRef>)>,
}

impl<'p, 's> ModelParser<'p, 's> {
    fn parse_problem(mut self) -> io::Result<Problem> {
        loop {
            self.skip_whitespace();
            match self.cur {
                None => break,
                Some(c) if c.is_alphabetic() || c == '_' => {
                    let word = self.read_ident();
                    match word.as_str() {
                        "var" => self.parse_decl()?,
                        "any" => self.parse_objective(Objective::Any, false)?,
                        "all" => self.parse_objective(Objective::All, false)?,
                        "min" => self.parse_objective(Objective::Min, true)?,
                        "max" => self.parse_objective(Objective::Max, true)?,
                        _ => {
                            // an expression starting with an identifier
                            self.pending = Some(word);
                            self.parse_constraint()?;
                        }
                    }
                }
                _ => self.parse_constraint()?,
            }
        }

        let line = self.line;
        let slots = self.slots;
        let store = self.store;
        let elems: Vec<ClauseRef> = slots.iter().map(|&slot| store.add_slot(slot)).collect();
        let root = store
            .alloc(Constr::WAnd(elems))
            .map_err(|e| parse_error(line, &e.to_string()))?;

        let (objective, obj_expr) = self.objective.unwrap_or((Objective::Any, None));
        Ok(Problem {
            root,
            vars: self.vars,
            registry: self.registry,
            objective,
            obj_expr,
        })
    }

    fn parse_decl(&mut self) -> io::Result<()> {
        self.skip_whitespace();
        let name = self.read_ident();
        if name.is_empty() {
            return Err(parse_error(self.line, "expected variable name"));
        }
        match name.as_str() {
            "var" | "in" | "any" | "all" | "min" | "max" => {
                return Err(parse_error(
                    self.line,
                    &format!("reserved word used as variable name: {}", name),
                ));
            }
            _ => {}
        }

        self.consume_word("in")?;
        self.consume('[')?;
        let lo = self.parse_int()?;
        self.consume(',')?;
        let hi = self.parse_int()?;
        self.consume(']')?;
        self.consume(';')?;

        if lo > hi {
            return Err(parse_error(self.line, "empty variable interval"));
        }

        let term = self
            .store
            .alloc(Constr::Term {
                val: Val::interval(lo, hi),
                var: None,
            })
            .map_err(|e| parse_error(self.line, &e.to_string()))?;

        let id = VarId(self.vars.len());
        if !self.registry.insert(&name, id, term) {
            let e = crate::fd::Error::DuplicateVariable(name);
            return Err(parse_error(self.line, &e.to_string()));
        }
        self.vars.push(VarEntry::new(&name, term));
        Ok(())
    }

    fn parse_objective(&mut self, objective: Objective, with_expr: bool) -> io::Result<()> {
        if self.objective.is_some() {
            return Err(parse_error(self.line, "multiple objectives"));
        }
        let expr = if with_expr {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.consume(';')?;
        self.objective = Some((objective, expr));
        Ok(())
    }

    fn parse_constraint(&mut self) -> io::Result<()> {
        let expr = self.parse_expr()?;
        self.consume(';')?;
        self.slots.push(Slot {
            constr: expr,
            orig: expr,
            prop_tag: 0,
        });
        Ok(())
    }


    fn alloc(&mut self, c: Constr) -> io::Result<ConstrRef> {
        self.store
            .alloc(c)
            .map_err(|e| parse_error(self.line, &e.to_string()))
    }

    fn binary(&mut self, op: Op, l: ConstrRef, r: ConstrRef) -> io::Result<ConstrRef> {
        self.alloc(Constr::Expr { op, l, r: Some(r) })
    }

    fn unary(&mut self, op: Op, l: ConstrRef) -> io::Result<ConstrRef> {
        self.alloc(Constr::Expr { op, l, r: None })
    }


    fn parse_expr(&mut self) -> io::Result<ConstrRef> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> io::Result<ConstrRef> {
        let mut l = self.parse_and()?;
        loop {
            self.skip_whitespace();
            if self.cur == Some('|') {
                self.next();
                let r = self.parse_and()?;
                l = self.binary(Op::Or, l, r)?;
            } else {
                return Ok(l);
            }
        }
    }

    fn parse_and(&mut self) -> io::Result<ConstrRef> {
        let mut l = self.parse_cmp()?;
        loop {
            self.skip_whitespace();
            if self.cur == Some('&') {
                self.next();
                let r = self.parse_cmp()?;
                l = self.binary(Op::And, l, r)?;
            } else {
                return Ok(l);
            }
        }
    }

    fn parse_cmp(&mut self) -> io::Result<ConstrRef> {
        let l = self.parse_sum()?;
        self.skip_whitespace();
        match self.cur {
            Some('=') => {
                self.next();
                let r = self.parse_sum()?;
                self.binary(Op::Eq, l, r)
            }
            Some('<') => {
                self.next();
                if self.cur == Some('=') {
                    self.next();
                    let r = self.parse_sum()?;
                    let lt = self.binary(Op::Lt, r, l)?;
                    self.unary(Op::Not, lt)
                } else {
                    let r = self.parse_sum()?;
                    self.binary(Op::Lt, l, r)
                }
            }
            Some('>') => {
                self.next();
                if self.cur == Some('=') {
                    self.next();
                    let r = self.parse_sum()?;
                    let lt = self.binary(Op::Lt, l, r)?;
                    self.unary(Op::Not, lt)
                } else {
                    let r = self.parse_sum()?;
                    self.binary(Op::Lt, r, l)
                }
            }
            Some('!') => {
                self.next();
                if self.cur == Some('=') {
                    self.next();
                    let r = self.parse_sum()?;
                    let eq = self.binary(Op::Eq, l, r)?;
                    self.unary(Op::Not, eq)
                } else {
                    Err(parse_error(self.line, "expected `=` after `!`"))
                }
            }
            _ => Ok(l),
        }
    }

    fn parse_sum(&mut self) -> io::Result<ConstrRef> {
        let mut l = self.parse_product()?;
        loop {
            self.skip_whitespace();
            match self.cur {
                Some('+') => {
                    self.next();
                    let r = self.parse_product()?;
                    l = self.binary(Op::Add, l, r)?;
                }
                Some('-') => {
                    self.next();
                    let r = self.parse_product()?;
                    let neg = self.unary(Op::Neg, r)?;
                    l = self.binary(Op::Add, l, neg)?;
                }
                _ => return Ok(l),
            }
        }
    }

    fn parse_product(&mut self) -> io::Result<ConstrRef> {
        let mut l = self.parse_unary()?;
        loop {
            self.skip_whitespace();
            if self.cur == Some('*') {
                self.next();
                let r = self.parse_unary()?;
                l = self.binary(Op::Mul, l, r)?;
            } else {
                return Ok(l);
            }
        }
    }

    fn parse_unary(&mut self) -> io::Result<ConstrRef> {
        self.skip_whitespace();
        match self.cur {
            Some('-') => {
                self.next();
                let l = self.parse_unary()?;
                self.unary(Op::Neg, l)
            }
            Some('!') => {
                self.next();
                let l = self.parse_unary()?;
                self.unary(Op::Not, l)
            }
            _ => self.parse_atom(),
        }
    }

    fn parse_atom(&mut self) -> io::Result<ConstrRef> {
        self.skip_whitespace();

        if let Some(name) = self.pending.take() {
            return self.var_ref(&name);
        }

        match self.cur {
            Some(c) if c.is_ascii_digit() => {
                let v = self.read_uint()?;
                self.alloc(Constr::Term {
                    val: Val::value(v),
                    var: None,
                })
            }
            Some(c) if c.is_alphabetic() || c == '_' => {
                let name = self.read_ident();
                self.var_ref(&name)
            }
            Some('(') => {
                self.next();
                let e = self.parse_expr()?;
                self.consume(')')?;
                Ok(e)
            }
            Some(c) => Err(parse_error(self.line, &format!("invalid input `{}`", c))),
            None => Err(parse_error(self.line, "unexpected end of input")),
        }
    }

    fn var_ref(&mut self, name: &str) -> io::Result<ConstrRef> {
        match self.registry.find_name(name) {
            Some(id) => Ok(self.vars[id.0].term),
            None => Err(parse_error(
                self.line,
                &format!("undefined variable: {}", name),
            )),
        }
    }


    fn next(&mut self) {
        if self.cur == Some('\n') {
            self.line += 1;
        }
        self.cur = self.chars.next();
    }

    fn skip_whitespace(&mut self) {
        loop {
            match self.cur {
                Some('#') => {
                    // comment until end of line
                    while self.cur.is_some() && self.cur != Some('\n') {
                        self.next();
                    }
                }
                Some(c) if c.is_whitespace() => self.next(),
                _ => break,
            }
        }
    }

    fn consume(&mut self, target: char) -> io::Result<()> {
        self.skip_whitespace();
        if self.cur == Some(target) {
            self.next();
            Ok(())
        } else {
            Err(parse_error(self.line, &format!("expected `{}`", target)))
        }
    }

    fn consume_word(&mut self, target: &str) -> io::Result<()> {
        self.skip_whitespace();
        let word = self.read_ident();
        if word == target {
            Ok(())
        } else {
            Err(parse_error(self.line, &format!("expected `{}`", target)))
        }
    }

    fn read_ident(&mut self) -> String {
        let mut ident = String::new();
        while let Some(c) = self.cur {
            if c.is_alphanumeric() || c == '_' {
                ident.push(c);
                self.next();
            } else {
                break;
            }
        }
        ident
    }

    fn read_uint_raw(&mut self) -> io::Result<i64> {
        let mut value: i64 = 0;
        let mut len = 0;
        while let Some(d) = self.cur.and_then(|c| c.to_digit(10)) {
            value = value * 10 + d as i64;
            if value > DOMAIN_MAX as i64 + 1 {
                return Err(parse_error(self.line, "integer out of range"));
            }
            len += 1;
            self.next();
        }
        if len == 0 {
            return Err(parse_error(self.line, "expected integer"));
        }
        Ok(value)
    }

    fn read_uint(&mut self) -> io::Result<Domain> {
        let v = self.read_uint_raw()?;
        if v > DOMAIN_MAX as i64 {
            return Err(parse_error(self.line, "integer out of range"));
        }
        Ok(v as Domain)
    }

    fn parse_int(&mut self) -> io::Result<Domain> {
        self.skip_whitespace();
        let negative = if self.cur == Some('-') {
            self.next();
            true
        } else {
            false
        };
        let v = self.read_uint_raw()?;
        let v = if negative { -v } else { v };
        if v < DOMAIN_MIN as i64 || v > DOMAIN_MAX as i64 {
            return Err(parse_error(self.line, "integer out of range"));
        }
        Ok(v as Domain)
    }
}
