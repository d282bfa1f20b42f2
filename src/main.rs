mod builtins;
mod env;
mod error;
mod eval;
mod lexer;
mod parser;
mod repl;
mod symbol;
mod value;

use env::Environment;
use lexer::TokenBuffer;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::cell::RefCell;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::process;
use std::rc::Rc;

// Scheme definitions loaded into the global frame at startup.
const PRELUDE_FILE: &str = "scheme_prelude.scm";

const PROMPT: &str = "scm> ";

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first() {
        Some(path) => run_file(path),
        None => run_interactive(),
    }
}

// The global environment carries the primitives already; the prelude is
// loaded on top of them, so it may use any primitive it likes.
fn load_prelude(env: &Rc<RefCell<Environment>>) {
    if let Err(err) = repl::load_file(PRELUDE_FILE, env) {
        eprintln!("{err}");
        process::exit(1);
    }
}

// Batch mode: read the file silently; nothing is echoed.
fn run_file(path: &str) {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("could not open {path}: {err}");
            process::exit(1);
        }
    };
    let env = builtins::global_environment();
    load_prelude(&env);

    let mut lines = BufReader::new(file).lines();
    repl::push_input(TokenBuffer::new(Box::new(move || {
        lines.next().and_then(|line| line.ok())
    })));
    repl::read_eval_print(&env, false);
    repl::pop_input();
}

// Interactive mode: rustyline supplies the lines (and the prompt), the
// token buffer pulls one whenever the reader needs more input, and
// values are echoed.
fn run_interactive() {
    let env = builtins::global_environment();
    load_prelude(&env);

    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(err) => {
            eprintln!("could not start line editor: {err}");
            process::exit(1);
        }
    };

    repl::push_input(TokenBuffer::new(Box::new(move || {
        match editor.readline(PROMPT) {
            Ok(line) => {
                let _ = editor.add_history_entry(line.as_str());
                Some(line)
            }
            // Ctrl-C and Ctrl-D both end the session, as end of input
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => None,
            Err(err) => {
                eprintln!("readline error: {err}");
                None
            }
        }
    })));
    repl::read_eval_print(&env, true);
    repl::pop_input();
}
