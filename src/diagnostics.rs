//! Diagnostic sink consumed by the scanner, parser, resolver and interpreter.
//!
//! The core pipeline never writes to stderr directly; every diagnostic flows
//! through [`Diagnostics`], which renders the canonical
//! `[line N] Error <where>: <message>` form, emits it, and retains the entry
//! so tests (and the REPL) can inspect what was reported.

use log::warn;

use crate::error::{location_of, LoxError};
use crate::token::Token;

#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<String>,
    had_static_error: bool,
    had_runtime_error: bool,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports a static (lex/parse/resolve) diagnostic.
    ///
    /// `location` is the where-part, already padded, e.g. ` at '+'`; pass an
    /// empty string when no lexeme is available.
    pub fn report(&mut self, line: usize, location: &str, message: &str) {
        let entry: String = format!("[line {}] Error{}: {}", line, location, message);

        warn!("Static diagnostic: {}", entry);

        eprintln!("{}", entry);
        self.entries.push(entry);
        self.had_static_error = true;
    }

    /// Reports a static diagnostic anchored at a token (` at 'lexeme'`, or
    /// ` at end` for EOF).
    pub fn report_token(&mut self, token: &Token, message: &str) {
        let location: String = location_of(token);
        self.report(token.line, &location, message);
    }

    /// Forwards a static error that was built elsewhere (scanner results,
    /// parser unwinds). The rendered form comes from the error's `Display`.
    pub fn static_error(&mut self, err: &LoxError) {
        let entry: String = err.to_string();

        warn!("Static diagnostic: {}", entry);

        eprintln!("{}", entry);
        self.entries.push(entry);
        self.had_static_error = true;
    }

    /// Reports a runtime error. Does not set the static flag, so the driver
    /// can distinguish exit code 70 from 65.
    pub fn runtime_error(&mut self, err: &LoxError) {
        let entry: String = err.to_string();

        warn!("Runtime diagnostic: {}", entry);

        eprintln!("{}", entry);
        self.entries.push(entry);
        self.had_runtime_error = true;
    }

    #[inline]
    pub fn had_static_error(&self) -> bool {
        self.had_static_error
    }

    #[inline]
    pub fn had_runtime_error(&self) -> bool {
        self.had_runtime_error
    }

    /// Clears flags and retained entries. The REPL calls this between lines.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.had_static_error = false;
        self.had_runtime_error = false;
    }

    /// Entries reported since the last `reset`, in order.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }
}
