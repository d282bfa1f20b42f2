use crate::env::Environment;
use crate::error::{Result, SchemeError};
use crate::symbol::Symbol;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

pub type BuiltinFn = fn(&[Value]) -> Result<Value>;

// A pair owns mutable car and cdr slots so set-car!/set-cdr! work and
// user code can build cyclic structure.
#[derive(Debug)]
pub struct Pair {
    pub car: Value,
    pub cdr: Value,
}

#[derive(Debug, Clone)]
pub struct Lambda {
    pub formals: Value,
    pub body: Value,
    pub env: Rc<RefCell<Environment>>,
}

#[derive(Debug, Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFn,
}

#[derive(Debug, Clone)]
pub enum Value {
    Pair(Rc<RefCell<Pair>>),
    Nil,
    Symbol(Symbol),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Unspecified,
    Eof,
    Builtin(Builtin),
    Lambda(Rc<Lambda>),
}

impl Value {
    pub fn cons(car: Value, cdr: Value) -> Value {
        Value::Pair(Rc::new(RefCell::new(Pair { car, cdr })))
    }

    pub fn symbol(name: &str) -> Value {
        Value::Symbol(Symbol::intern(name))
    }

    // Proper list from the items, in order.
    pub fn list(items: Vec<Value>) -> Value {
        let mut result = Value::Nil;
        for item in items.into_iter().rev() {
            result = Value::cons(item, result);
        }
        result
    }

    pub fn car(&self) -> Result<Value> {
        match self {
            Value::Pair(p) => Ok(p.borrow().car.clone()),
            _ => Err(Value::type_error("pair", self)),
        }
    }

    pub fn cdr(&self) -> Result<Value> {
        match self {
            Value::Pair(p) => Ok(p.borrow().cdr.clone()),
            _ => Err(Value::type_error("pair", self)),
        }
    }

    // k-th element of a proper list, counting from zero.
    pub fn nth(&self, k: usize) -> Result<Value> {
        let mut rest = self.clone();
        for _ in 0..k {
            rest = rest.cdr()?;
        }
        rest.car()
    }

    pub fn is_pair(&self) -> bool {
        matches!(self, Value::Pair(_))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn is_symbol(&self) -> bool {
        matches!(self, Value::Symbol(_))
    }

    // An atom is anything that is neither a pair nor the empty list.
    pub fn is_atom(&self) -> bool {
        !self.is_pair() && !self.is_nil()
    }

    // True for the empty list and for pairs whose cdr chain ends at it.
    pub fn is_list(&self) -> bool {
        let mut rest = self.clone();
        loop {
            match rest {
                Value::Nil => return true,
                Value::Pair(p) => {
                    let next = p.borrow().cdr.clone();
                    rest = next;
                }
                _ => return false,
            }
        }
    }

    // Everything except #f counts as true in a test position.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Bool(false))
    }

    pub fn as_symbol(&self) -> Option<Symbol> {
        match self {
            Value::Symbol(s) => Some(s.clone()),
            _ => None,
        }
    }

    // Length of a proper list; None when the chain is improper.
    pub fn list_length(&self) -> Option<usize> {
        let mut len = 0;
        let mut rest = self.clone();
        loop {
            match rest {
                Value::Nil => return Some(len),
                Value::Pair(p) => {
                    len += 1;
                    let next = p.borrow().cdr.clone();
                    rest = next;
                }
                _ => return None,
            }
        }
    }

    pub fn list_to_vec(&self) -> Option<Vec<Value>> {
        let mut items = Vec::new();
        let mut rest = self.clone();
        loop {
            match rest {
                Value::Nil => return Some(items),
                Value::Pair(p) => {
                    let pair = p.borrow();
                    items.push(pair.car.clone());
                    let next = pair.cdr.clone();
                    drop(pair);
                    rest = next;
                }
                _ => return None,
            }
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Pair(_) => "pair",
            Value::Nil => "empty list",
            Value::Symbol(_) => "symbol",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Bool(_) => "boolean",
            Value::Unspecified => "unspecified",
            Value::Eof => "eof object",
            Value::Builtin(_) => "primitive procedure",
            Value::Lambda(_) => "closure",
        }
    }

    pub fn type_error(expected: &str, found: &Value) -> SchemeError {
        SchemeError::Type {
            expected: expected.to_string(),
            found: found.type_name().to_string(),
        }
    }

    // eq?: identity for pairs, closures and symbols; the numeric and
    // singleton variants compare by value.
    pub fn is_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Pair(a), Value::Pair(b)) => Rc::ptr_eq(a, b),
            (Value::Lambda(a), Value::Lambda(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a.func == b.func,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Nil, Value::Nil) => true,
            (Value::Unspecified, Value::Unspecified) => true,
            (Value::Eof, Value::Eof) => true,
            _ => false,
        }
    }

    // eqv?: as eq?, except numbers compare by numeric value across the
    // integer/float split, matching the original interpreter.
    pub fn is_eqv(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Float(b)) => *a as f64 == *b,
            (Value::Float(a), Value::Integer(b)) => *a == *b as f64,
            _ => self.is_eq(other),
        }
    }

    // equal?: structural descent through pairs, eqv? at the leaves.
    pub fn is_equal(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Pair(a), Value::Pair(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.car.is_equal(&b.car) && a.cdr.is_equal(&b.cdr)
            }
            _ => self.is_eqv(other),
        }
    }

    // The machine-readable form: symbols needing it are |…|-escaped.
    pub fn write_form(&self) -> String {
        let mut out = String::new();
        self.format_into(&mut out, true);
        out
    }

    // The human form used by display: symbols print raw.
    pub fn display_form(&self) -> String {
        let mut out = String::new();
        self.format_into(&mut out, false);
        out
    }

    fn format_into(&self, out: &mut String, escape: bool) {
        match self {
            Value::Pair(_) => {
                out.push('(');
                let mut rest = self.clone();
                let mut first = true;
                loop {
                    match rest {
                        Value::Pair(p) => {
                            if !first {
                                out.push(' ');
                            }
                            first = false;
                            let pair = p.borrow();
                            pair.car.format_into(out, escape);
                            let next = pair.cdr.clone();
                            drop(pair);
                            rest = next;
                        }
                        Value::Nil => break,
                        tail => {
                            out.push_str(" . ");
                            tail.format_into(out, escape);
                            break;
                        }
                    }
                }
                out.push(')');
            }
            Value::Nil => out.push_str("()"),
            Value::Symbol(s) => {
                if escape {
                    out.push_str(&escaped_symbol_name(s.as_str()));
                } else {
                    out.push_str(s.as_str());
                }
            }
            Value::Integer(n) => out.push_str(&n.to_string()),
            Value::Float(x) => out.push_str(&format_float(*x)),
            Value::Bool(true) => out.push_str("#t"),
            Value::Bool(false) => out.push_str("#f"),
            Value::Unspecified => out.push_str("#<unspecified>"),
            Value::Eof => out.push_str("#<eof>"),
            Value::Builtin(b) => {
                out.push_str("#<builtin:");
                out.push_str(b.name);
                out.push('>');
            }
            Value::Lambda(l) => {
                out.push_str("#<procedure:");
                l.formals.format_into(out, escape);
                out.push('>');
            }
        }
    }
}

// PartialEq follows equal? so tests can compare structurally.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.is_equal(other)
    }
}

impl PartialEq for Builtin {
    fn eq(&self, other: &Self) -> bool {
        self.func == other.func
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_form())
    }
}

// Floats always show a decimal point so they read back as floats.
fn format_float(x: f64) -> String {
    if x.is_finite() && x.fract() == 0.0 {
        format!("{x:.1}")
    } else {
        format!("{x}")
    }
}

fn is_symbol_inner_char(c: char) -> bool {
    c.is_ascii_lowercase()
        || c.is_ascii_uppercase()
        || c.is_ascii_digit()
        || "!$%&*/:<=>?@^_~+-.".contains(c)
}

// Symbols containing uppercase or out-of-alphabet characters print in
// |…| form so the reader can reconstruct them.
fn escaped_symbol_name(name: &str) -> String {
    let plain = !name.is_empty()
        && name
            .chars()
            .all(|c| is_symbol_inner_char(c) && !c.is_ascii_uppercase());
    if plain {
        return name.to_string();
    }
    let mut out = String::from("|");
    for c in name.chars() {
        if c == '|' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('|');
    out
}
