//! Static resolution pass.
//!
//! A single AST walk that runs between parsing and interpretation:
//!
//! 1. **Builds lexical scopes**: maintains a stack of maps tracking, per
//!    name, the slot it will occupy in its runtime frame, whether its
//!    initializer has finished, and whether it was ever read.
//! 2. **Enforces static rules**: redeclaration in the same scope, reading a
//!    variable in its own initializer, `return` outside a function, `break`
//!    outside a loop, and locals that are declared but never used.
//! 3. **Records binding coordinates**: every resolvable `Variable`/`Assign`
//!    occurrence gets a `(depth, slot)` entry in the side table, keyed by
//!    the expression's id. Absence from the table means "global; look up by
//!    name at runtime".
//!
//! Slots are handed out in declaration order per scope, which is the same
//! order the interpreter calls `define` on the matching frame, so the two
//! index spaces agree by construction. Diagnostics go to the sink and
//! resolution continues; the driver refuses to interpret if anything was
//! reported.

use std::collections::HashMap;
use std::mem;

use log::{debug, trace};

use crate::ast::{Expr, ExprId, ExprKind, Stmt};
use crate::diagnostics::Diagnostics;
use crate::error::LoxError;
use crate::token::Token;

/// Side table: expression identity → binding coordinate.
pub type Locals = HashMap<ExprId, VarLocation>;

/// Where a resolved reference lives: `depth` frames out, at index `slot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarLocation {
    pub depth: usize,
    pub slot: usize,
}

/// Are we inside a user function? Used to validate `return`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum FunctionType {
    None,
    Function,
}

#[derive(Debug)]
struct VarInfo {
    slot: usize,
    defined: bool,
    used: bool,
    /// Declaration token, kept for the unused-local report.
    token: Token,
}

pub struct Resolver<'d> {
    scopes: Vec<HashMap<String, VarInfo>>,
    locations: Locals,
    current_function: FunctionType,
    loop_depth: usize,
    diagnostics: &'d mut Diagnostics,
}

impl<'d> Resolver<'d> {
    pub fn new(diagnostics: &'d mut Diagnostics) -> Self {
        Resolver {
            scopes: Vec::new(),
            locations: Locals::new(),
            current_function: FunctionType::None,
            loop_depth: 0,
            diagnostics,
        }
    }

    /// Walks all top-level statements and returns the completed side table.
    pub fn resolve(mut self, statements: &[Stmt]) -> Locals {
        debug!(
            "Beginning resolve pass over {} statement(s)",
            statements.len()
        );

        for stmt in statements {
            self.resolve_stmt(stmt);
        }

        self.locations
    }

    // ─────────────────────────────────────────────────────────────────────
    // Statement resolution
    // ─────────────────────────────────────────────────────────────────────

    fn resolve_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block(statements) => {
                self.begin_scope();

                for statement in statements {
                    self.resolve_stmt(statement);
                }

                self.end_scope();
            }

            Stmt::Var { name, initializer } => {
                self.declare(name);

                if let Some(expr) = initializer {
                    self.resolve_expr(expr);
                }

                self.define(name);
            }

            Stmt::Function { name, params, body } => {
                // Declared and defined up front so the body can recurse.
                self.declare(name);
                self.define(name);

                self.resolve_function(params, body);
            }

            Stmt::Expression(expr) | Stmt::Print(expr) => {
                self.resolve_expr(expr);
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition);
                self.resolve_stmt(then_branch);

                if let Some(else_branch) = else_branch {
                    self.resolve_stmt(else_branch);
                }
            }

            Stmt::While { condition, body } => {
                self.resolve_expr(condition);

                self.loop_depth += 1;
                self.resolve_stmt(body);
                self.loop_depth -= 1;
            }

            Stmt::Break(keyword) => {
                if self.loop_depth == 0 {
                    self.diagnostics.static_error(&LoxError::resolve(
                        keyword,
                        "Cannot use 'break' outside of a loop.",
                    ));
                }
            }

            Stmt::Return { keyword, value } => {
                if self.current_function == FunctionType::None {
                    self.diagnostics.static_error(&LoxError::resolve(
                        keyword,
                        "Cannot use 'return' outside of a function.",
                    ));
                }

                if let Some(expr) = value {
                    self.resolve_expr(expr);
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Expression resolution
    // ─────────────────────────────────────────────────────────────────────

    fn resolve_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Literal(_) => {}

            ExprKind::Grouping(inner) => {
                self.resolve_expr(inner);
            }

            ExprKind::Unary { right, .. } => {
                self.resolve_expr(right);
            }

            ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }

            ExprKind::Ternary {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition);
                self.resolve_expr(then_branch);
                self.resolve_expr(else_branch);
            }

            ExprKind::Variable(name) => {
                // Reading a name whose initializer is still running is the
                // classic `var a = a;` mistake.
                if let Some(scope) = self.scopes.last() {
                    if scope.get(&name.lexeme).is_some_and(|info| !info.defined) {
                        self.diagnostics.static_error(&LoxError::resolve(
                            name,
                            "Cannot read local variable in its own initializer",
                        ));
                    }
                }

                self.resolve_local(expr.id, name);
            }

            ExprKind::Assign { name, value } => {
                self.resolve_expr(value);
                self.resolve_local(expr.id, name);
            }

            ExprKind::Call {
                callee, arguments, ..
            } => {
                self.resolve_expr(callee);

                for argument in arguments {
                    self.resolve_expr(argument);
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Function helper
    // ─────────────────────────────────────────────────────────────────────

    /// Enter a fresh scope for a function's parameters + body. Parameters
    /// take the first slots; body locals follow in the same scope. The loop
    /// counter resets so `break` cannot bind to a loop outside the function.
    fn resolve_function(&mut self, params: &[Token], body: &[Stmt]) {
        let enclosing_function: FunctionType =
            mem::replace(&mut self.current_function, FunctionType::Function);
        let enclosing_loops: usize = mem::take(&mut self.loop_depth);

        self.begin_scope();

        for param in params {
            self.declare(param);
            self.define(param);
        }

        for stmt in body {
            self.resolve_stmt(stmt);
        }

        self.end_scope();

        self.current_function = enclosing_function;
        self.loop_depth = enclosing_loops;
    }

    // ─────────────────────────────────────────────────────────────────────
    // Scope management
    // ─────────────────────────────────────────────────────────────────────

    #[inline]
    fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    /// Pops the innermost scope, flagging locals that were never read.
    /// Entries are checked in slot (declaration) order so diagnostics come
    /// out deterministically.
    fn end_scope(&mut self) {
        let Some(scope) = self.scopes.pop() else {
            return;
        };

        let mut entries: Vec<VarInfo> = scope.into_values().collect();
        entries.sort_by_key(|info| info.slot);

        for info in entries {
            if !info.used {
                self.diagnostics.static_error(&LoxError::resolve(
                    &info.token,
                    format!(
                        "Local variable '{}' is declared but never used.",
                        info.token.lexeme
                    ),
                ));
            }
        }
    }

    /// Adds `name` to the innermost scope with the next slot index, marked
    /// not-yet-defined. No-op at global scope.
    fn declare(&mut self, name: &Token) {
        let Some(scope) = self.scopes.last_mut() else {
            return;
        };

        if scope.contains_key(&name.lexeme) {
            self.diagnostics.static_error(&LoxError::resolve(
                name,
                format!(
                    "Variable '{}' is already declared in this scope.",
                    name.lexeme
                ),
            ));
            return;
        }

        let slot: usize = scope.len();

        trace!("Declared '{}' at slot {}", name.lexeme, slot);

        scope.insert(
            name.lexeme.clone(),
            VarInfo {
                slot,
                defined: false,
                used: false,
                token: name.clone(),
            },
        );
    }

    /// Marks `name` as fully initialized in the innermost scope.
    fn define(&mut self, name: &Token) {
        if let Some(scope) = self.scopes.last_mut() {
            if let Some(info) = scope.get_mut(&name.lexeme) {
                info.defined = true;
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Binding-coordinate helper
    // ─────────────────────────────────────────────────────────────────────

    /// Records this occurrence as a local at `(depth, slot)` if any
    /// enclosing scope declares the name; otherwise leaves it for the
    /// globals (silently — globals may be defined later than their uses).
    fn resolve_local(&mut self, id: ExprId, name: &Token) {
        for (depth, scope) in self.scopes.iter_mut().rev().enumerate() {
            if let Some(info) = scope.get_mut(&name.lexeme) {
                debug!(
                    "Resolved '{}' at depth {}, slot {}",
                    name.lexeme, depth, info.slot
                );

                info.used = true;
                self.locations.insert(
                    id,
                    VarLocation {
                        depth,
                        slot: info.slot,
                    },
                );
                return;
            }
        }

        debug!("Resolved '{}' as global", name.lexeme);
    }
}
