//! Tree-walking evaluator.
//!
//! Statements execute for effect, expressions evaluate post-order to a
//! [`Value`]. Non-local control flow (`break`, `return`, runtime errors)
//! travels as the `Err` side of every evaluation result — see [`Signal`] —
//! so each construct that catches a transfer does it with an ordinary
//! `match`, and the frame swap around a block is restored on every exit
//! path.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, trace};

use crate::ast::{Expr, ExprId, ExprKind, LiteralValue, Stmt};
use crate::diagnostics::Diagnostics;
use crate::environment::{Frame, Globals};
use crate::error::LoxError;
use crate::resolver::Locals;
use crate::token::{Token, TokenType};
use crate::value::{LoxFunction, NativeFunction, Value};

/// Non-local exit unwinding through the evaluator.
///
/// `Break` is caught by the nearest `while` executor, `Return` by the
/// nearest call executor; anything that reaches the top level is reported
/// as a runtime error.
#[derive(Debug)]
pub enum Signal {
    Error(LoxError),
    Break { line: usize },
    Return { value: Value, line: usize },
}

impl From<LoxError> for Signal {
    fn from(err: LoxError) -> Self {
        Signal::Error(err)
    }
}

impl From<io::Error> for Signal {
    fn from(err: io::Error) -> Self {
        Signal::Error(LoxError::from(err))
    }
}

type Exec = Result<(), Signal>;
type Eval = Result<Value, Signal>;

pub struct Interpreter {
    globals: Globals,
    /// Innermost active frame; `None` while executing at global scope.
    environment: Option<Rc<RefCell<Frame>>>,
    /// Side table produced by the resolver; read-only here.
    locals: Locals,
    out: Box<dyn Write>,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_output(Box::new(io::stdout()))
    }

    /// Uses `out` for `print` output instead of stdout. Tests pass a shared
    /// byte buffer here.
    pub fn with_output(out: Box<dyn Write>) -> Self {
        let mut globals: Globals = Globals::new();

        globals.define_by_name(
            "clock",
            Value::NativeFunction(Rc::new(NativeFunction {
                name: "clock".to_string(),
                arity: 0,
                func: clock_native,
            })),
        );

        Interpreter {
            globals,
            environment: None,
            locals: Locals::new(),
            out,
        }
    }

    /// Merges a freshly resolved side table. Entries accumulate across REPL
    /// lines because closures from earlier lines keep their ids alive.
    pub fn add_locals(&mut self, locals: Locals) {
        debug!("Adding {} side-table entries", locals.len());

        self.locals.extend(locals);
    }

    /// Executes top-level statements, reporting the first runtime error (or
    /// stray `break`/`return`) to the sink and stopping.
    pub fn interpret(&mut self, statements: &[Stmt], diagnostics: &mut Diagnostics) {
        for stmt in statements {
            if let Err(signal) = self.execute(stmt) {
                match signal {
                    Signal::Error(err) => diagnostics.runtime_error(&err),

                    Signal::Break { line } => diagnostics.runtime_error(
                        &LoxError::runtime_at_line(line, "Cannot use 'break' outside of a loop."),
                    ),

                    Signal::Return { line, .. } => {
                        diagnostics.runtime_error(&LoxError::runtime_at_line(
                            line,
                            "Cannot use 'return' outside of a function.",
                        ))
                    }
                }
                return;
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Statements
    // ─────────────────────────────────────────────────────────────────────

    fn execute(&mut self, stmt: &Stmt) -> Exec {
        match stmt {
            Stmt::Expression(expr) => {
                self.evaluate(expr)?;

                Ok(())
            }

            Stmt::Print(expr) => {
                let value: Value = self.evaluate(expr)?;

                writeln!(self.out, "{}", value)?;
                self.out.flush()?;

                Ok(())
            }

            Stmt::Var { name, initializer } => {
                let value: Value = match initializer {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };

                self.define(&name.lexeme, value);

                Ok(())
            }

            Stmt::Block(statements) => {
                let frame = Frame::with_enclosing(self.environment.clone());

                self.execute_block(statements, frame)
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.execute(then_branch)?;
                } else if let Some(else_branch) = else_branch {
                    self.execute(else_branch)?;
                }

                Ok(())
            }

            Stmt::While { condition, body } => {
                while self.evaluate(condition)?.is_truthy() {
                    match self.execute(body) {
                        Ok(()) => {}

                        // `break` unwinds to here and is discarded.
                        Err(Signal::Break { .. }) => break,

                        Err(other) => return Err(other),
                    }
                }

                Ok(())
            }

            Stmt::Break(keyword) => Err(Signal::Break { line: keyword.line }),

            Stmt::Function { name, params, body } => {
                let function: Value = Value::Function(Rc::new(LoxFunction {
                    name: name.lexeme.clone(),
                    params: params.clone(),
                    body: Rc::clone(body),
                    closure: self.environment.clone(),
                }));

                // The callable lands in the frame it captured, so the body
                // can resolve its own name for recursion.
                self.define(&name.lexeme, function);

                Ok(())
            }

            Stmt::Return { keyword, value } => {
                let value: Value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };

                Err(Signal::Return {
                    value,
                    line: keyword.line,
                })
            }
        }
    }

    /// Runs `statements` with `frame` active, restoring the previous frame
    /// on every exit path — normal completion, `break`, `return`, or error.
    fn execute_block(&mut self, statements: &[Stmt], frame: Rc<RefCell<Frame>>) -> Exec {
        let previous: Option<Rc<RefCell<Frame>>> = self.environment.replace(frame);

        let mut result: Exec = Ok(());

        for statement in statements {
            result = self.execute(statement);

            if result.is_err() {
                break;
            }
        }

        self.environment = previous;

        result
    }

    /// Declares a value in the innermost frame, or in the globals when
    /// executing at top level.
    fn define(&mut self, name: &str, value: Value) {
        match &self.environment {
            Some(frame) => {
                let slot: usize = frame.borrow_mut().define(value);

                trace!("Defined local '{}' at slot {}", name, slot);
            }

            None => self.globals.define_by_name(name, value),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Expressions
    // ─────────────────────────────────────────────────────────────────────

    fn evaluate(&mut self, expr: &Expr) -> Eval {
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(match literal {
                LiteralValue::Nil => Value::Nil,
                LiteralValue::Bool(b) => Value::Bool(*b),
                LiteralValue::Number(n) => Value::Number(*n),
                LiteralValue::Str(s) => Value::String(s.clone()),
            }),

            ExprKind::Grouping(inner) => self.evaluate(inner),

            ExprKind::Unary { operator, right } => self.evaluate_unary(operator, right),

            ExprKind::Binary {
                left,
                operator,
                right,
            } => self.evaluate_binary(left, operator, right),

            ExprKind::Logical {
                left,
                operator,
                right,
            } => self.evaluate_logical(left, operator, right),

            ExprKind::Ternary {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.evaluate(then_branch)
                } else {
                    self.evaluate(else_branch)
                }
            }

            ExprKind::Variable(name) => self.look_up_variable(name, expr.id),

            ExprKind::Assign { name, value } => {
                let value: Value = self.evaluate(value)?;

                match self.locals.get(&expr.id) {
                    Some(location) => {
                        let frame = self.current_frame(name)?;
                        Frame::assign_at(&frame, location.depth, location.slot, value.clone());
                    }

                    None => self.globals.assign_by_name(name, value.clone())?,
                }

                Ok(value)
            }

            ExprKind::Call {
                callee,
                paren,
                arguments,
            } => self.evaluate_call(callee, paren, arguments),
        }
    }

    fn evaluate_unary(&mut self, operator: &Token, right: &Expr) -> Eval {
        let value: Value = self.evaluate(right)?;

        match operator.token_type {
            TokenType::MINUS => match value {
                Value::Number(n) => Ok(Value::Number(-n)),

                _ => Err(LoxError::runtime(operator, "Operand must be a number.").into()),
            },

            TokenType::BANG => Ok(Value::Bool(!value.is_truthy())),

            _ => Err(LoxError::runtime(operator, "Invalid unary operator.").into()),
        }
    }

    fn evaluate_logical(&mut self, left: &Expr, operator: &Token, right: &Expr) -> Eval {
        let left_value: Value = self.evaluate(left)?;

        // The deciding operand is returned as-is, not coerced to a boolean.
        match operator.token_type {
            TokenType::OR => {
                if left_value.is_truthy() {
                    Ok(left_value)
                } else {
                    self.evaluate(right)
                }
            }

            TokenType::AND => {
                if !left_value.is_truthy() {
                    Ok(left_value)
                } else {
                    self.evaluate(right)
                }
            }

            _ => Err(LoxError::runtime(operator, "Invalid logical operator.").into()),
        }
    }

    fn evaluate_binary(&mut self, left: &Expr, operator: &Token, right: &Expr) -> Eval {
        let left_value: Value = self.evaluate(left)?;
        let right_value: Value = self.evaluate(right)?;

        match operator.token_type {
            TokenType::PLUS => match (&left_value, &right_value) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),

                // If either side is a string, the other is stringified and
                // the two concatenated.
                (Value::String(_), _) | (_, Value::String(_)) => {
                    Ok(Value::String(format!("{}{}", left_value, right_value)))
                }

                _ => Err(LoxError::runtime(operator, "Operands must be numbers or strings.").into()),
            },

            TokenType::MINUS => match (left_value, right_value) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a - b)),

                _ => Err(LoxError::runtime(operator, "Operands must be numbers.").into()),
            },

            TokenType::STAR => match (left_value, right_value) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a * b)),

                _ => Err(LoxError::runtime(operator, "Operands must be numbers.").into()),
            },

            TokenType::SLASH => match (left_value, right_value) {
                (Value::Number(a), Value::Number(b)) => {
                    if b == 0.0 {
                        Err(LoxError::runtime(operator, "Division by zero.").into())
                    } else {
                        Ok(Value::Number(a / b))
                    }
                }

                _ => Err(LoxError::runtime(operator, "Operands must be numbers.").into()),
            },

            TokenType::MODULO => match (left_value, right_value) {
                (Value::Number(a), Value::Number(b)) => {
                    // Both operands truncate toward zero before the
                    // remainder is taken.
                    if b as i64 == 0 {
                        Err(LoxError::runtime(operator, "Modulo by zero.").into())
                    } else {
                        Ok(Value::Number(((a as i64) % (b as i64)) as f64))
                    }
                }

                _ => Err(LoxError::runtime(operator, "Operands must be numbers.").into()),
            },

            TokenType::GREATER => match (left_value, right_value) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Bool(a > b)),

                _ => Err(LoxError::runtime(operator, "Operands must be numbers.").into()),
            },

            TokenType::GREATER_EQUAL => match (left_value, right_value) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Bool(a >= b)),

                _ => Err(LoxError::runtime(operator, "Operands must be numbers.").into()),
            },

            TokenType::LESS => match (left_value, right_value) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Bool(a < b)),

                _ => Err(LoxError::runtime(operator, "Operands must be numbers.").into()),
            },

            TokenType::LESS_EQUAL => match (left_value, right_value) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Bool(a <= b)),

                _ => Err(LoxError::runtime(operator, "Operands must be numbers.").into()),
            },

            TokenType::EQUAL_EQUAL => Ok(Value::Bool(left_value == right_value)),

            TokenType::BANG_EQUAL => Ok(Value::Bool(left_value != right_value)),

            // Sequence operator: the left value is discarded.
            TokenType::COMMA => Ok(right_value),

            _ => Err(LoxError::runtime(operator, "Invalid binary operator.").into()),
        }
    }

    fn evaluate_call(&mut self, callee: &Expr, paren: &Token, arguments: &[Expr]) -> Eval {
        let callee_value: Value = self.evaluate(callee)?;

        let mut args: Vec<Value> = Vec::with_capacity(arguments.len());
        for argument in arguments {
            args.push(self.evaluate(argument)?);
        }

        match callee_value {
            Value::NativeFunction(native) => {
                if args.len() != native.arity {
                    return Err(LoxError::runtime(
                        paren,
                        format!(
                            "Expected {} arguments but got {}.",
                            native.arity,
                            args.len()
                        ),
                    )
                    .into());
                }

                trace!("Calling native function '{}'", native.name);

                (native.func)(&args).map_err(Signal::Error)
            }

            Value::Function(function) => {
                if args.len() != function.params.len() {
                    return Err(LoxError::runtime(
                        paren,
                        format!(
                            "Expected {} arguments but got {}.",
                            function.params.len(),
                            args.len()
                        ),
                    )
                    .into());
                }

                trace!("Calling function '{}'", function.name);

                self.call_function(&function, args)
            }

            _ => Err(LoxError::runtime(paren, "Can only call functions.").into()),
        }
    }

    /// Runs a user function: a fresh frame is chained onto the captured
    /// closure frame, arguments fill the first slots (mirroring the
    /// resolver's parameter slots), and a `Return` unwinding out of the body
    /// becomes the call result. Falling off the end yields `nil`.
    fn call_function(&mut self, function: &LoxFunction, args: Vec<Value>) -> Eval {
        let frame: Rc<RefCell<Frame>> = Frame::with_enclosing(function.closure.clone());

        {
            let mut active = frame.borrow_mut();
            for arg in args {
                active.define(arg);
            }
        }

        match self.execute_block(&function.body, frame) {
            Ok(()) => Ok(Value::Nil),

            Err(Signal::Return { value, .. }) => Ok(value),

            // A loop never spans a function boundary.
            Err(Signal::Break { line }) => Err(Signal::Error(LoxError::runtime_at_line(
                line,
                "Cannot use 'break' outside of a loop.",
            ))),

            Err(err) => Err(err),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Variable access
    // ─────────────────────────────────────────────────────────────────────

    fn look_up_variable(&self, name: &Token, id: ExprId) -> Eval {
        match self.locals.get(&id) {
            Some(location) => {
                let frame = self.current_frame(name)?;
                Ok(Frame::get_at(&frame, location.depth, location.slot))
            }

            None => self.globals.get_by_name(name).map_err(Signal::Error),
        }
    }

    /// The resolver only hands out coordinates for references inside some
    /// frame, so this failing means the side table and the execution state
    /// disagree; surface it as a runtime error rather than unwinding the
    /// host stack.
    fn current_frame(&self, name: &Token) -> Result<Rc<RefCell<Frame>>, Signal> {
        self.environment.clone().ok_or_else(|| {
            Signal::Error(LoxError::runtime(
                name,
                format!("Invalid resolved reference to '{}'.", name.lexeme),
            ))
        })
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

/// Seconds since the Unix epoch, as a Lox number.
fn clock_native(_args: &[Value]) -> Result<Value, LoxError> {
    let timestamp: f64 = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| LoxError::runtime_at_line(0, format!("Clock error: {}", e)))?
        .as_secs_f64();

    Ok(Value::Number(timestamp))
}
