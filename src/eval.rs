use crate::env::Environment;
use crate::error::{Result, SchemeError};
use crate::value::{Lambda, Value};
use lazy_static::lazy_static;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

// An Evaluation holds an expression and the environment it is evaluated
// in. step() performs part of the work: either it deposits the final
// value, or it replaces the expression (and possibly the environment)
// with the remaining computation. Tail positions go through set_expr, so
// the same context is reused instead of growing the host stack.
pub struct Evaluation {
    expr: Option<Value>,
    env: Rc<RefCell<Environment>>,
    value: Option<Value>,
}

type FormHandler = fn(&mut Evaluation) -> Result<()>;

lazy_static! {
    // Built once; dispatch is by the (interned, case-folded) name of the
    // symbol in operator position.
    static ref SPECIAL_FORMS: HashMap<&'static str, FormHandler> = {
        let mut table: HashMap<&'static str, FormHandler> = HashMap::new();
        table.insert("quote", Evaluation::do_quote_form as FormHandler);
        table.insert("lambda", Evaluation::do_lambda_form);
        table.insert("if", Evaluation::do_if_form);
        table.insert("and", Evaluation::do_and_form);
        table.insert("or", Evaluation::do_or_form);
        table.insert("cond", Evaluation::do_cond_form);
        table.insert("case", Evaluation::do_case_form);
        table.insert("set!", Evaluation::do_set_bang_form);
        table.insert("define", Evaluation::do_define_form);
        table.insert("begin", Evaluation::do_begin_form);
        table.insert("let", Evaluation::do_let_form);
        table.insert("let*", Evaluation::do_let_star_form);
        table
    };
}

// Evaluate EXPR in ENV to a value. Every non-tail subevaluation comes
// back through here with a fresh context.
pub fn eval(expr: Value, env: Rc<RefCell<Environment>>) -> Result<Value> {
    Evaluation::new(expr, env).step_to_value()
}

// The application protocol shared by primitives and closures, driven to
// completion. Used by the apply primitive.
pub fn apply(op: &Value, args: Vec<Value>) -> Result<Value> {
    match op {
        Value::Builtin(b) => (b.func)(&args),
        Value::Lambda(l) => {
            let frame = Environment::make_call_frame(&l.env, &l.formals, args)?;
            eval(l.body.clone(), frame)
        }
        _ => Err(SchemeError::NotProcedure(op.write_form())),
    }
}

// One application step against the current context: primitives deposit
// their result, closures install their body and call frame as the next
// expression (the tail position reuse for calls).
fn apply_step(op: &Value, args: Vec<Value>, ctx: &mut Evaluation) -> Result<()> {
    match op {
        Value::Builtin(b) => {
            let value = (b.func)(&args)?;
            ctx.set_value(value);
            Ok(())
        }
        Value::Lambda(l) => {
            let frame = Environment::make_call_frame(&l.env, &l.formals, args)?;
            ctx.set_expr_in(l.body.clone(), frame);
            Ok(())
        }
        _ => Err(SchemeError::NotProcedure(op.write_form())),
    }
}

// EXPR must be a proper list of length at least MIN (and at most MAX
// when given) to be a well formed special form or call.
fn check_form(expr: &Value, min: usize, max: Option<usize>) -> Result<()> {
    if !expr.is_list() {
        return Err(SchemeError::BadlyFormedExpression);
    }
    let len = expr.list_length().unwrap_or(0);
    if len < min {
        return Err(SchemeError::TooFewOperands);
    }
    if let Some(max) = max {
        if len > max {
            return Err(SchemeError::TooManyOperands);
        }
    }
    Ok(())
}

// A lambda body of several expressions becomes one (begin …) form.
fn make_single_body(exprs: Value) -> Result<Value> {
    if exprs.cdr()?.is_nil() {
        exprs.car()
    } else {
        Ok(Value::cons(Value::symbol("begin"), exprs))
    }
}

impl Evaluation {
    pub fn new(expr: Value, env: Rc<RefCell<Environment>>) -> Self {
        Evaluation {
            expr: Some(expr),
            env,
            value: None,
        }
    }

    // Deposit the final value; the expression slot is cleared.
    fn set_value(&mut self, value: Value) {
        self.expr = None;
        self.value = Some(value);
    }

    // Replace the expression, keeping the current environment.
    fn set_expr(&mut self, expr: Value) {
        self.expr = Some(expr);
        self.value = None;
    }

    fn set_expr_in(&mut self, expr: Value, env: Rc<RefCell<Environment>>) {
        self.expr = Some(expr);
        self.env = env;
        self.value = None;
    }

    fn evaluated(&self) -> bool {
        self.value.is_some()
    }

    // The live expression. Handlers only run while one is present.
    fn current(&self) -> Value {
        self.expr.clone().expect("no live expression")
    }

    fn full_eval(&self, expr: Value) -> Result<Value> {
        eval(expr, Rc::clone(&self.env))
    }

    fn full_eval_in(&self, expr: Value, env: &Rc<RefCell<Environment>>) -> Result<Value> {
        eval(expr, Rc::clone(env))
    }

    pub fn step_to_value(&mut self) -> Result<Value> {
        while !self.evaluated() {
            self.step()?;
        }
        Ok(self.value.clone().expect("evaluated without a value"))
    }

    // Advance the evaluation by one increment.
    pub fn step(&mut self) -> Result<()> {
        let expr = self.current();
        match &expr {
            Value::Symbol(sym) => {
                let value = self.env.borrow().lookup(sym)?;
                self.set_value(value);
                Ok(())
            }
            // atoms and the empty list are self-evaluating
            e if e.is_atom() => {
                self.set_value(expr.clone());
                Ok(())
            }
            Value::Nil => {
                self.set_value(Value::Nil);
                Ok(())
            }
            _ if !expr.is_list() => Err(SchemeError::MalformedList(expr.write_form())),
            _ => {
                let op = expr.car()?;
                match op.as_symbol() {
                    Some(sym) => match SPECIAL_FORMS.get(sym.as_str()) {
                        Some(handler) => handler(self),
                        None => self.do_call_form(),
                    },
                    None => self.do_call_form(),
                }
            }
        }
    }

    fn check_form(&self, min: usize, max: Option<usize>) -> Result<()> {
        check_form(&self.current(), min, max)
    }

    fn do_quote_form(&mut self) -> Result<()> {
        self.check_form(2, Some(2))?;
        let datum = self.current().nth(1)?;
        self.set_value(datum);
        Ok(())
    }

    fn do_lambda_form(&mut self) -> Result<()> {
        self.check_form(3, None)?;
        let expr = self.current();
        let formals = expr.nth(1)?;
        Environment::check_formals(&formals)?;
        let body = make_single_body(expr.cdr()?.cdr()?)?;
        self.set_value(Value::Lambda(Rc::new(Lambda {
            formals,
            body,
            env: Rc::clone(&self.env),
        })));
        Ok(())
    }

    fn do_if_form(&mut self) -> Result<()> {
        self.check_form(3, Some(4))?;
        let expr = self.current();
        let test = self.full_eval(expr.nth(1)?)?;
        let next = if test.is_truthy() {
            expr.nth(2)?
        } else if expr.list_length() == Some(3) {
            Value::Unspecified
        } else {
            expr.nth(3)?
        };
        // the chosen branch is in tail position
        self.set_expr(next);
        Ok(())
    }

    fn do_and_form(&mut self) -> Result<()> {
        self.check_form(1, None)?;
        let expr = self.current();
        if expr.list_length() == Some(1) {
            self.set_value(Value::Bool(true));
            return Ok(());
        }
        let mut rest = expr.cdr()?;
        while rest.cdr()?.is_pair() {
            if !self.full_eval(rest.car()?)?.is_truthy() {
                self.set_expr(rest.car()?);
                return Ok(());
            }
            rest = rest.cdr()?;
        }
        self.set_expr(rest.car()?);
        Ok(())
    }

    fn do_or_form(&mut self) -> Result<()> {
        self.check_form(1, None)?;
        let expr = self.current();
        if expr.list_length() == Some(1) {
            self.set_value(Value::Bool(false));
            return Ok(());
        }
        let mut rest = expr.cdr()?;
        while rest.cdr()?.is_pair() {
            if self.full_eval(rest.car()?)?.is_truthy() {
                self.set_expr(rest.car()?);
                return Ok(());
            }
            rest = rest.cdr()?;
        }
        self.set_expr(rest.car()?);
        Ok(())
    }

    fn do_cond_form(&mut self) -> Result<()> {
        self.check_form(1, None)?;
        let mut clauses = self.current().cdr()?;
        while clauses.is_pair() {
            let clause = clauses.car()?;
            check_form(&clause, 1, None)?;

            let head = clause.car()?;
            let is_else = head.as_symbol().is_some_and(|s| s.as_str() == "else");
            let test = if is_else {
                check_form(&clause, 2, None)
                    .map_err(|_| SchemeError::message("badly formed else clause"))?;
                if !clauses.cdr()?.is_nil() {
                    return Err(SchemeError::message(
                        "else clause must be the last clause in cond",
                    ));
                }
                Value::Bool(true)
            } else {
                self.full_eval(head)?
            };

            if test.is_truthy() {
                if clause.list_length() == Some(1) {
                    self.set_value(test);
                } else if clause
                    .nth(1)?
                    .as_symbol()
                    .is_some_and(|s| s.as_str() == "=>")
                {
                    if clause.cdr()?.cdr()?.is_nil() {
                        return Err(SchemeError::message("no function specified for 'cond'"));
                    }
                    // the receiving procedure gets the test's value
                    self.set_expr(Value::list(vec![clause.nth(2)?, test]));
                } else {
                    self.eval_seq_and_set_expr_as_last(clause.cdr()?, Value::Unspecified)?;
                }
                return Ok(());
            }
            clauses = clauses.cdr()?;
        }
        self.set_value(Value::Unspecified);
        Ok(())
    }

    fn do_case_form(&mut self) -> Result<()> {
        self.check_form(2, None)?;
        let expr = self.current();
        let key = self.full_eval(expr.nth(1)?)?;
        let mut clauses = expr.cdr()?.cdr()?;

        while clauses.is_pair() {
            let clause = clauses.car()?;
            check_form(&clause, 1, None)?;
            let data = clause.car()?;
            let body = clause.cdr()?;

            if data.as_symbol().is_some_and(|s| s.as_str() == "else") {
                check_form(&clause, 2, None)
                    .map_err(|_| SchemeError::message("badly formed else clause"))?;
                if !clauses.cdr()?.is_nil() {
                    // the original reuses the cond wording here
                    return Err(SchemeError::message(
                        "else clause must be the last clause in cond",
                    ));
                }
                return self.eval_seq_and_set_expr_as_last(body, Value::Bool(true));
            }

            // an atomic clause head matches the key directly
            if data.is_atom() && key.is_eqv(&data) {
                return self.eval_seq_and_set_expr_as_last(body, Value::Bool(true));
            }

            let mut data = data;
            while data.is_pair() {
                if key.is_eqv(&data.car()?) {
                    return self.eval_seq_and_set_expr_as_last(body, Value::Bool(true));
                }
                data = data.cdr()?;
            }
            clauses = clauses.cdr()?;
        }
        self.set_value(Value::Unspecified);
        Ok(())
    }

    fn do_set_bang_form(&mut self) -> Result<()> {
        self.check_form(3, Some(3))?;
        let expr = self.current();
        let target = expr.nth(1)?;
        // the new value is computed before the target is checked
        let value = self.full_eval(expr.nth(2)?)?;
        let sym = target
            .as_symbol()
            .ok_or_else(|| SchemeError::message("first argument is not a symbol!"))?;
        self.env.borrow_mut().assign(&sym, value)?;
        self.set_value(Value::Unspecified);
        Ok(())
    }

    fn do_define_form(&mut self) -> Result<()> {
        self.check_form(3, None)?;
        let expr = self.current();
        let target = expr.nth(1)?;

        if let Some(sym) = target.as_symbol() {
            self.check_form(3, Some(3))?;
            let value = self.full_eval(expr.nth(2)?)?;
            self.env.borrow_mut().define(sym, value);
        } else if target.is_pair() {
            // (define (name . formals) body…) is shorthand for a lambda
            let name = target
                .car()?
                .as_symbol()
                .ok_or_else(|| SchemeError::message("bad argument to define"))?;
            let formals = target.cdr()?;
            Environment::check_formals(&formals)?;
            let body = make_single_body(expr.cdr()?.cdr()?)?;
            let lambda = Value::Lambda(Rc::new(Lambda {
                formals,
                body,
                env: Rc::clone(&self.env),
            }));
            self.env.borrow_mut().define(name, lambda);
        } else {
            return Err(SchemeError::message("bad argument to define"));
        }
        self.set_value(Value::Unspecified);
        Ok(())
    }

    fn do_begin_form(&mut self) -> Result<()> {
        self.check_form(2, None)?;
        let mut rest = self.current().cdr()?;
        while rest.cdr()?.is_pair() {
            self.full_eval(rest.car()?)?;
            rest = rest.cdr()?;
        }
        self.set_expr(rest.car()?);
        Ok(())
    }

    // Shared between let and let*: the body runs in FRAME with its last
    // expression in tail position.
    fn set_body_in_frame(&mut self, body: Value, frame: Rc<RefCell<Environment>>) -> Result<()> {
        let mut rest = body;
        while rest.cdr()?.is_pair() {
            self.full_eval_in(rest.car()?, &frame)?;
            rest = rest.cdr()?;
        }
        self.set_expr_in(rest.car()?, frame);
        Ok(())
    }

    fn check_binding(binding: &Value) -> Result<()> {
        check_form(binding, 2, Some(2))
            .map_err(|_| SchemeError::message("badly formed binding - incorrect binding format"))
    }

    fn do_let_form(&mut self) -> Result<()> {
        self.check_form(3, None)?;
        let expr = self.current();
        let mut bindings = expr.nth(1)?;
        let body = expr.cdr()?.cdr()?;
        check_form(&bindings, 0, None).map_err(|_| {
            SchemeError::message("badly formed bindings - incorrect number of subforms")
        })?;

        // every init is evaluated in the outer environment, left to
        // right, before any binding is installed
        let mut bound = Vec::new();
        while bindings.is_pair() {
            let binding = bindings.car()?;
            Self::check_binding(&binding)?;
            let sym = binding.car()?.as_symbol().ok_or_else(|| {
                SchemeError::message("badly formed binding - incorrect binding format")
            })?;
            bound.push((sym, self.full_eval(binding.nth(1)?)?));
            bindings = bindings.cdr()?;
        }

        let frame = Environment::child_rc(&self.env);
        for (sym, value) in bound {
            frame.borrow_mut().define(sym, value);
        }
        self.set_body_in_frame(body, frame)
    }

    fn do_let_star_form(&mut self) -> Result<()> {
        self.check_form(3, None)?;
        let expr = self.current();
        let mut bindings = expr.nth(1)?;
        let body = expr.cdr()?.cdr()?;
        check_form(&bindings, 0, None).map_err(|_| {
            SchemeError::message("badly formed bindings - incorrect number of subforms")
        })?;

        // each init sees the bindings made before it
        let frame = Environment::child_rc(&self.env);
        while bindings.is_pair() {
            let binding = bindings.car()?;
            Self::check_binding(&binding)?;
            let sym = binding.car()?.as_symbol().ok_or_else(|| {
                SchemeError::message("badly formed binding - incorrect binding format")
            })?;
            let value = self.full_eval_in(binding.nth(1)?, &frame)?;
            frame.borrow_mut().define(sym, value);
            bindings = bindings.cdr()?;
        }
        self.set_body_in_frame(body, frame)
    }

    // cond and case bodies: run all but the last expression, then put
    // the last in tail position. An empty body produces DEFAULT.
    fn eval_seq_and_set_expr_as_last(&mut self, seq: Value, default: Value) -> Result<()> {
        if seq.is_nil() {
            self.set_expr(default);
            return Ok(());
        }
        let mut rest = seq;
        while rest.cdr()?.is_pair() {
            self.full_eval(rest.car()?)?;
            rest = rest.cdr()?;
        }
        self.set_expr(rest.car()?);
        Ok(())
    }

    // Ordinary application: evaluate the operator, then the operands
    // left to right, then apply.
    fn do_call_form(&mut self) -> Result<()> {
        self.check_form(1, None)?;
        let expr = self.current();
        let op = self.full_eval(expr.car()?)?;
        let mut args = Vec::new();
        let mut rest = expr.cdr()?;
        while !rest.is_nil() {
            args.push(self.full_eval(rest.car()?)?);
            rest = rest.cdr()?;
        }
        apply_step(&op, args, self)
    }
}
