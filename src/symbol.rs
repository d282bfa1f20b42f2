use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

// Interned symbol. Two symbols with the same name share one allocation,
// so eq? reduces to pointer identity.
#[derive(Debug, Clone)]
pub struct Symbol(Rc<str>);

thread_local! {
    static INTERN_TABLE: RefCell<HashMap<String, Symbol>> = RefCell::new(HashMap::new());
}

impl Symbol {
    pub fn intern(name: &str) -> Symbol {
        INTERN_TABLE.with(|table| {
            let mut table = table.borrow_mut();
            if let Some(sym) = table.get(name) {
                sym.clone()
            } else {
                let sym = Symbol(Rc::from(name));
                table.insert(name.to_string(), sym.clone());
                sym
            }
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    // Hash the name, not the pointer: interning makes same-name symbols
    // share one Rc, so this stays consistent with eq.
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
