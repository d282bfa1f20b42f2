use crate::env::Environment;
use crate::error::{Result, SchemeError};
use crate::eval;
use crate::lexer::TokenBuffer;
use crate::parser;
use crate::value::Value;
use std::cell::RefCell;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::rc::Rc;

// The current input port is the top of this stack. load pushes a file
// port for its duration, so read always sees the innermost source.
thread_local! {
    static INPUT_STACK: RefCell<Vec<TokenBuffer>> = const { RefCell::new(Vec::new()) };
}

pub fn push_input(buffer: TokenBuffer) {
    INPUT_STACK.with(|stack| stack.borrow_mut().push(buffer));
}

pub fn pop_input() {
    INPUT_STACK.with(|stack| {
        stack.borrow_mut().pop();
    });
}

// Read one datum from the current input port. The borrow is released
// before the caller evaluates, so evaluation may read or load freely.
pub fn read_current() -> Result<Value> {
    INPUT_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        let buffer = stack
            .last_mut()
            .ok_or_else(|| SchemeError::message("no input source"))?;
        parser::read(buffer)
    })
}

fn report(err: &SchemeError) {
    let message = err.to_string();
    if message.is_empty() {
        eprintln!("Error");
    } else {
        eprintln!("Error: {message}");
    }
}

// Read and evaluate from the current input port until end of file. When
// ECHO is set, the written form of every non-unspecified value is
// printed. Failures are reported and the loop continues with the next
// datum.
pub fn read_eval_print(env: &Rc<RefCell<Environment>>, echo: bool) {
    loop {
        match read_current() {
            Ok(Value::Eof) => return,
            Ok(expr) => match eval::eval(expr, Rc::clone(env)) {
                Ok(value) => {
                    if echo && !matches!(value, Value::Unspecified) {
                        println!("{}", value.write_form());
                    }
                }
                Err(err) => report(&err),
            },
            Err(err) => report(&err),
        }
    }
}

// Evaluate the contents of a file, silently, with the file temporarily
// installed as the current input port.
pub fn load_file(path: &str, env: &Rc<RefCell<Environment>>) -> Result<()> {
    let file = File::open(path)
        .map_err(|err| SchemeError::message(format!("could not open {path}: {err}")))?;
    let mut lines = BufReader::new(file).lines();
    push_input(TokenBuffer::new(Box::new(move || {
        lines.next().and_then(|line| line.ok())
    })));
    read_eval_print(env, false);
    pop_input();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins;

    #[test]
    fn test_input_stack_nesting() {
        push_input(TokenBuffer::from_string("1 2"));
        assert_eq!(read_current().unwrap(), Value::Integer(1));
        push_input(TokenBuffer::from_string("99"));
        assert_eq!(read_current().unwrap(), Value::Integer(99));
        assert_eq!(read_current().unwrap(), Value::Eof);
        pop_input();
        assert_eq!(read_current().unwrap(), Value::Integer(2));
        pop_input();
    }

    #[test]
    fn test_read_with_no_source_fails() {
        assert!(read_current().is_err());
    }

    #[test]
    fn test_read_eval_print_consumes_all_datums() {
        let env = builtins::global_environment();
        push_input(TokenBuffer::from_string("(define x 1) (define x (+ x 41))"));
        read_eval_print(&env, false);
        pop_input();
        let x = env
            .borrow()
            .lookup(&crate::symbol::Symbol::intern("x"))
            .unwrap();
        assert_eq!(x, Value::Integer(42));
    }

    #[test]
    fn test_errors_do_not_stop_the_loop() {
        let env = builtins::global_environment();
        push_input(TokenBuffer::from_string(
            "(set! missing 1) (define survived 7)",
        ));
        read_eval_print(&env, false);
        pop_input();
        let survived = env
            .borrow()
            .lookup(&crate::symbol::Symbol::intern("survived"))
            .unwrap();
        assert_eq!(survived, Value::Integer(7));
    }

    #[test]
    fn test_prelude_loads_and_its_procedures_work() {
        let env = builtins::global_environment();
        load_file("scheme_prelude.scm", &env).unwrap();
        push_input(TokenBuffer::from_string(
            "(define squares (map (lambda (x) (* x x)) '(1 2 3)))\
             (define flipped (reverse '(1 2 3)))\
             (define found (assoc 'b '((a 1) (b 2))))",
        ));
        read_eval_print(&env, false);
        pop_input();
        let lookup = |name: &str| {
            env.borrow()
                .lookup(&crate::symbol::Symbol::intern(name))
                .unwrap()
                .write_form()
        };
        assert_eq!(lookup("squares"), "(1 4 9)");
        assert_eq!(lookup("flipped"), "(3 2 1)");
        assert_eq!(lookup("found"), "(b 2)");
    }

    #[test]
    fn test_load_file_missing() {
        let env = builtins::global_environment();
        let err = load_file("no-such-file.scm", &env).unwrap_err();
        assert!(err.to_string().starts_with("could not open no-such-file.scm"));
    }
}
