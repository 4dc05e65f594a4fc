//! Driver: wires the scanner → parser → resolver → interpreter pipeline and
//! owns the pieces that persist across REPL lines (interpreter state,
//! diagnostic sink, expression-id counter).

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;

use log::debug;

use crate::ast::Stmt;
use crate::ast_printer::AstPrinter;
use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::interpreter::Interpreter;
use crate::parser::Parser;
use crate::resolver::{Locals, Resolver};
use crate::scanner::Scanner;
use crate::token::Token;

/// Process exit code for static (lex/parse/resolve) errors.
pub const EXIT_STATIC_ERROR: i32 = 65;

/// Process exit code for runtime errors.
pub const EXIT_RUNTIME_ERROR: i32 = 70;

pub struct Lox {
    interpreter: Interpreter,
    diagnostics: Diagnostics,
    /// Expression ids must stay unique across REPL lines: closures from
    /// earlier lines keep their side-table entries alive.
    next_expr_id: u32,
    debug: bool,
}

impl Lox {
    pub fn new() -> Self {
        Lox {
            interpreter: Interpreter::new(),
            diagnostics: Diagnostics::new(),
            next_expr_id: 0,
            debug: false,
        }
    }

    /// Routes `print` output through `out` instead of stdout.
    pub fn with_output(out: Box<dyn Write>) -> Self {
        Lox {
            interpreter: Interpreter::with_output(out),
            ..Lox::new()
        }
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Runs one source unit through the whole pipeline. If any phase
    /// reports a static error the later phases are skipped; the sink
    /// carries the outcome until the next `run`.
    pub fn run(&mut self, source: &str) {
        self.diagnostics.reset();

        let scanner = Scanner::new(source.as_bytes());

        let mut tokens: Vec<Token> = Vec::new();
        for item in scanner {
            match item {
                Ok(token) => {
                    if self.debug {
                        debug!("token: {}", token);
                    }
                    tokens.push(token);
                }

                Err(err) => self.diagnostics.static_error(&err),
            }
        }

        let mut parser = Parser::with_first_id(tokens, &mut self.diagnostics, self.next_expr_id);
        let statements: Vec<Stmt> = parser.parse();
        self.next_expr_id = parser.next_id();

        if self.diagnostics.had_static_error() {
            return;
        }

        if self.debug {
            for stmt in &statements {
                debug!("ast: {}", AstPrinter::print_stmt(stmt));
            }
        }

        let resolver = Resolver::new(&mut self.diagnostics);
        let locals: Locals = resolver.resolve(&statements);

        if self.diagnostics.had_static_error() {
            return;
        }

        self.interpreter.add_locals(locals);
        self.interpreter.interpret(&statements, &mut self.diagnostics);
    }

    /// Runs a script file and returns the process exit code: `65` for
    /// static errors, `70` for runtime errors, `0` otherwise.
    pub fn run_file(&mut self, path: &Path) -> Result<i32> {
        let bytes: Vec<u8> = fs::read(path)?;
        let source: String = String::from_utf8(bytes)?;

        self.run(&source);

        if self.diagnostics.had_static_error() {
            return Ok(EXIT_STATIC_ERROR);
        }

        if self.diagnostics.had_runtime_error() {
            return Ok(EXIT_RUNTIME_ERROR);
        }

        Ok(0)
    }

    /// Interactive prompt: one line at a time; `run` resets the sink at
    /// entry, so one bad line does not poison the next. Ends at EOF.
    pub fn run_prompt(&mut self) -> Result<()> {
        let stdin = io::stdin();
        let mut stdout = io::stdout();
        let mut line: String = String::new();

        loop {
            write!(stdout, "> ")?;
            stdout.flush()?;

            line.clear();
            let bytes_read: usize = stdin.lock().read_line(&mut line)?;

            if bytes_read == 0 {
                // EOF (Ctrl-D).
                writeln!(stdout)?;
                return Ok(());
            }

            self.run(&line);
        }
    }
}

impl Default for Lox {
    fn default() -> Self {
        Self::new()
    }
}
