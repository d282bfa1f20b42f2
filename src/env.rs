use crate::error::{Result, SchemeError};
use crate::symbol::Symbol;
use crate::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::collections::HashSet;
use std::rc::Rc;

// One frame of the lexical environment chain. Frames are shared between
// closures and call frames, so they live behind Rc<RefCell<_>>.
#[derive(Debug)]
pub struct Environment {
    bindings: HashMap<Symbol, Value>,
    parent: Option<Rc<RefCell<Environment>>>,
}

impl Environment {
    pub fn new() -> Self {
        Environment {
            bindings: HashMap::new(),
            parent: None,
        }
    }

    pub fn new_child(parent: Rc<RefCell<Environment>>) -> Self {
        Environment {
            bindings: HashMap::new(),
            parent: Some(parent),
        }
    }

    pub fn child_rc(parent: &Rc<RefCell<Environment>>) -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(Environment::new_child(Rc::clone(parent))))
    }

    // Bind or replace in this frame, shadowing any ancestor binding.
    pub fn define(&mut self, sym: Symbol, value: Value) {
        self.bindings.insert(sym, value);
    }

    // Walk the parent chain to the nearest frame that defines sym.
    pub fn lookup(&self, sym: &Symbol) -> Result<Value> {
        if let Some(value) = self.bindings.get(sym) {
            Ok(value.clone())
        } else if let Some(parent) = &self.parent {
            parent.borrow().lookup(sym)
        } else {
            Err(SchemeError::UnknownIdentifier(sym.as_str().to_string()))
        }
    }

    // Rebind at the defining frame; unlike define this never creates.
    pub fn assign(&mut self, sym: &Symbol, value: Value) -> Result<()> {
        if self.bindings.contains_key(sym) {
            self.bindings.insert(sym.clone(), value);
            Ok(())
        } else if let Some(parent) = &self.parent {
            parent.borrow_mut().assign(sym, value)
        } else {
            Err(SchemeError::UnknownIdentifier(sym.as_str().to_string()))
        }
    }

    // New call frame attached to PARENT binding FORMALS to ARGS. A symbol
    // in the final cdr position collects the remaining args as a list.
    pub fn make_call_frame(
        parent: &Rc<RefCell<Environment>>,
        formals: &Value,
        args: Vec<Value>,
    ) -> Result<Rc<RefCell<Environment>>> {
        let mut frame = Environment::new_child(Rc::clone(parent));
        let mut rest = formals.clone();
        let mut i = 0;
        loop {
            match rest {
                Value::Pair(p) => {
                    let (car, cdr) = {
                        let pair = p.borrow();
                        (pair.car.clone(), pair.cdr.clone())
                    };
                    let sym = car
                        .as_symbol()
                        .ok_or_else(|| SchemeError::message("formal parameter is not a symbol"))?;
                    if i >= args.len() {
                        return Err(SchemeError::TooFewArguments);
                    }
                    frame.define(sym, args[i].clone());
                    i += 1;
                    rest = cdr;
                }
                Value::Nil => {
                    if i < args.len() {
                        return Err(SchemeError::TooManyArguments);
                    }
                    break;
                }
                Value::Symbol(sym) => {
                    frame.define(sym, Value::list(args[i..].to_vec()));
                    break;
                }
                _ => return Err(SchemeError::message("formal parameter is not a symbol")),
            }
        }
        Ok(Rc::new(RefCell::new(frame)))
    }

    // Valid formals are (s1 s2 ... sn) or (s1 s2 ... sn . rest), with
    // every symbol distinct.
    pub fn check_formals(formals: &Value) -> Result<()> {
        let mut seen: HashSet<Symbol> = HashSet::new();
        let mut rest = formals.clone();
        loop {
            let item = match &rest {
                Value::Nil => return Ok(()),
                Value::Pair(p) => p.borrow().car.clone(),
                tail => tail.clone(),
            };
            let sym = item
                .as_symbol()
                .ok_or_else(|| SchemeError::message("formal parameter is not a symbol"))?;
            if !seen.insert(sym) {
                return Err(SchemeError::message(
                    "formal parameters provided are not distinct",
                ));
            }
            match rest.clone() {
                Value::Pair(p) => {
                    let next = p.borrow().cdr.clone();
                    rest = next;
                }
                // rest was the variadic tail symbol itself
                _ => return Ok(()),
            }
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::Symbol;

    fn root() -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(Environment::new()))
    }

    #[test]
    fn test_define_and_lookup() {
        let env = root();
        env.borrow_mut()
            .define(Symbol::intern("x"), Value::Integer(42));
        assert_eq!(
            env.borrow().lookup(&Symbol::intern("x")).unwrap(),
            Value::Integer(42)
        );
    }

    #[test]
    fn test_lookup_walks_the_chain() {
        let parent = root();
        parent
            .borrow_mut()
            .define(Symbol::intern("x"), Value::Integer(1));
        let child = Environment::child_rc(&parent);
        assert_eq!(
            child.borrow().lookup(&Symbol::intern("x")).unwrap(),
            Value::Integer(1)
        );
    }

    #[test]
    fn test_lookup_miss_reports_the_name() {
        let env = root();
        let err = env.borrow().lookup(&Symbol::intern("nope")).unwrap_err();
        assert_eq!(err.to_string(), "unknown identifier: nope");
    }

    #[test]
    fn test_define_shadows_parent() {
        let parent = root();
        parent
            .borrow_mut()
            .define(Symbol::intern("x"), Value::Integer(1));
        let child = Environment::child_rc(&parent);
        child
            .borrow_mut()
            .define(Symbol::intern("x"), Value::Integer(2));
        assert_eq!(
            child.borrow().lookup(&Symbol::intern("x")).unwrap(),
            Value::Integer(2)
        );
        assert_eq!(
            parent.borrow().lookup(&Symbol::intern("x")).unwrap(),
            Value::Integer(1)
        );
    }

    #[test]
    fn test_assign_rebinds_at_defining_frame() {
        let parent = root();
        parent
            .borrow_mut()
            .define(Symbol::intern("x"), Value::Integer(1));
        let child = Environment::child_rc(&parent);
        child
            .borrow_mut()
            .assign(&Symbol::intern("x"), Value::Integer(9))
            .unwrap();
        assert_eq!(
            parent.borrow().lookup(&Symbol::intern("x")).unwrap(),
            Value::Integer(9)
        );
        // assign never creates a local binding
        assert!(
            child
                .borrow_mut()
                .assign(&Symbol::intern("missing"), Value::Nil)
                .is_err()
        );
    }

    #[test]
    fn test_call_frame_fixed_arity() {
        let env = root();
        let formals = Value::list(vec![Value::symbol("a"), Value::symbol("b")]);
        let frame =
            Environment::make_call_frame(&env, &formals, vec![Value::Integer(1), Value::Integer(2)])
                .unwrap();
        assert_eq!(
            frame.borrow().lookup(&Symbol::intern("b")).unwrap(),
            Value::Integer(2)
        );
    }

    #[test]
    fn test_call_frame_arity_errors() {
        let env = root();
        let formals = Value::list(vec![Value::symbol("a"), Value::symbol("b")]);
        let err = Environment::make_call_frame(&env, &formals, vec![Value::Integer(1)]).unwrap_err();
        assert_eq!(err.to_string(), "too few arguments provided");
        let err = Environment::make_call_frame(
            &env,
            &formals,
            vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)],
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "too many arguments provided");
    }

    #[test]
    fn test_call_frame_variadic_tail() {
        let env = root();
        // (a . rest)
        let formals = Value::cons(Value::symbol("a"), Value::symbol("rest"));
        let frame = Environment::make_call_frame(
            &env,
            &formals,
            vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)],
        )
        .unwrap();
        assert_eq!(
            frame.borrow().lookup(&Symbol::intern("rest")).unwrap(),
            Value::list(vec![Value::Integer(2), Value::Integer(3)])
        );
        // zero extras bind the empty list
        let frame =
            Environment::make_call_frame(&env, &formals, vec![Value::Integer(1)]).unwrap();
        assert_eq!(
            frame.borrow().lookup(&Symbol::intern("rest")).unwrap(),
            Value::Nil
        );
    }

    #[test]
    fn test_check_formals() {
        let fixed = Value::list(vec![Value::symbol("a"), Value::symbol("b")]);
        assert!(Environment::check_formals(&fixed).is_ok());

        let variadic = Value::cons(Value::symbol("a"), Value::symbol("rest"));
        assert!(Environment::check_formals(&variadic).is_ok());

        let duplicated = Value::list(vec![Value::symbol("a"), Value::symbol("a")]);
        let err = Environment::check_formals(&duplicated).unwrap_err();
        assert_eq!(err.to_string(), "formal parameters provided are not distinct");

        let non_symbol = Value::list(vec![Value::symbol("a"), Value::Integer(1)]);
        assert!(Environment::check_formals(&non_symbol).is_err());
    }
}
