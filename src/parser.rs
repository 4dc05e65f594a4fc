//! Recursive-descent parser.
//!
//! Consumes the token vector by index and produces a best-effort statement
//! list. Errors are reported to the [`Diagnostics`] sink at the point of
//! detection, then unwound (as `Err`) to the nearest `declaration`, which
//! synchronizes to a statement boundary and keeps going — the caller always
//! gets a tree back and checks the sink to learn whether it is trustworthy.
//!
//! Precedence ladder, lowest to highest:
//!
//! ```text
//! expression → assignment
//! assignment → or ( "=" assignment )?
//! or         → and  ( "or"  and  )*
//! and        → comma ( "and" comma )*
//! comma      → conditional ( "," conditional )*
//! conditional→ equality ( "?" expression ":" conditional )?
//! equality   → comparison ( ("!="|"==") comparison )*
//! comparison → term ( (">"|">="|"<"|"<=") term )*
//! term       → factor ( ("-"|"+") factor )*
//! factor     → unary  ( ("/"|"*"|"%") unary )*
//! unary      → ("!"|"-") unary | call
//! call       → primary ( "(" arguments? ")" )*
//! ```

use log::debug;

use crate::ast::{Expr, ExprId, ExprKind, LiteralValue, Stmt};
use crate::diagnostics::Diagnostics;
use crate::error::LoxError;
use crate::token::{Token, TokenType};

/// Maximum number of call arguments (and parameters).
const MAX_ARITY: usize = 255;

pub struct Parser<'d> {
    tokens: Vec<Token>,
    current: usize,
    diagnostics: &'d mut Diagnostics,
    next_id: u32,
}

/// Internal unwind type; every `Err` has already been reported to the sink.
type ParseResult<T> = Result<T, LoxError>;

impl<'d> Parser<'d> {
    pub fn new(tokens: Vec<Token>, diagnostics: &'d mut Diagnostics) -> Self {
        Self::with_first_id(tokens, diagnostics, 0)
    }

    /// Like [`Parser::new`] but numbering expressions from `first_id`. The
    /// REPL threads its counter through here so ids from earlier lines are
    /// never reused while their closures are still callable.
    pub fn with_first_id(
        tokens: Vec<Token>,
        diagnostics: &'d mut Diagnostics,
        first_id: u32,
    ) -> Self {
        debug_assert!(
            tokens.last().is_some_and(Token::is_eof),
            "token vector must end with EOF"
        );

        Parser {
            tokens,
            current: 0,
            diagnostics,
            next_id: first_id,
        }
    }

    /// One past the last expression id handed out so far.
    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    /// Parses the whole token stream. Never fails; check the sink for
    /// `had_static_error` before trusting the result.
    pub fn parse(&mut self) -> Vec<Stmt> {
        let mut statements: Vec<Stmt> = Vec::new();

        while !self.is_at_end() {
            if let Some(stmt) = self.declaration() {
                statements.push(stmt);
            }
        }

        debug!("Parsed {} top-level statement(s)", statements.len());

        statements
    }

    // ─────────────────────────────────────────────────────────────────────
    // Statements
    // ─────────────────────────────────────────────────────────────────────

    /// declaration → varDecl | funDecl | statement
    ///
    /// This is the panic-mode recovery boundary: a parse error inside any
    /// declaration discards tokens up to the next statement boundary.
    fn declaration(&mut self) -> Option<Stmt> {
        let result: ParseResult<Stmt> = if self.match_token(&TokenType::VAR) {
            self.var_declaration()
        } else if self.match_token(&TokenType::FUN) {
            self.function_declaration()
        } else {
            self.statement()
        };

        match result {
            Ok(stmt) => Some(stmt),

            Err(_) => {
                self.synchronize();
                None
            }
        }
    }

    fn var_declaration(&mut self) -> ParseResult<Stmt> {
        let name: Token = self.consume(&TokenType::IDENTIFIER, "Expect variable name.")?;

        let initializer: Option<Expr> = if self.match_token(&TokenType::EQUAL) {
            Some(self.expression()?)
        } else {
            None
        };

        self.consume(
            &TokenType::SEMICOLON,
            "Expect ';' after variable declaration.",
        )?;

        Ok(Stmt::Var { name, initializer })
    }

    fn function_declaration(&mut self) -> ParseResult<Stmt> {
        let name: Token = self.consume(&TokenType::IDENTIFIER, "Expect function name.")?;

        debug!("Parsing function '{}'", name.lexeme);

        self.consume(&TokenType::LEFT_PAREN, "Expect '(' after function name.")?;

        let mut params: Vec<Token> = Vec::new();

        if !self.check(&TokenType::RIGHT_PAREN) {
            loop {
                if params.len() >= MAX_ARITY {
                    let token: Token = self.peek().clone();
                    self.diagnostics
                        .report_token(&token, "Can't have more than 255 parameters.");
                }

                params.push(self.consume(&TokenType::IDENTIFIER, "Expect parameter name.")?);

                if !self.match_token(&TokenType::COMMA) {
                    break;
                }
            }
        }

        self.consume(&TokenType::RIGHT_PAREN, "Expect ')' after parameters.")?;
        self.consume(&TokenType::LEFT_BRACE, "Expect '{' before function body.")?;

        let body: Vec<Stmt> = self.block()?;

        Ok(Stmt::Function {
            name,
            params,
            body: body.into(),
        })
    }

    fn statement(&mut self) -> ParseResult<Stmt> {
        if self.match_token(&TokenType::PRINT) {
            return self.print_statement();
        }

        if self.match_token(&TokenType::LEFT_BRACE) {
            return Ok(Stmt::Block(self.block()?));
        }

        if self.match_token(&TokenType::IF) {
            return self.if_statement();
        }

        if self.match_token(&TokenType::WHILE) {
            return self.while_statement();
        }

        if self.match_token(&TokenType::FOR) {
            return self.for_statement();
        }

        if self.match_token(&TokenType::BREAK) {
            return self.break_statement();
        }

        if self.match_token(&TokenType::RETURN) {
            return self.return_statement();
        }

        self.expression_statement()
    }

    fn print_statement(&mut self) -> ParseResult<Stmt> {
        let value: Expr = self.expression()?;
        self.consume(&TokenType::SEMICOLON, "Expect ';' after value.")?;
        Ok(Stmt::Print(value))
    }

    /// Statements inside `{ ... }`; the opening brace is already consumed.
    fn block(&mut self) -> ParseResult<Vec<Stmt>> {
        let mut statements: Vec<Stmt> = Vec::new();

        while !self.check(&TokenType::RIGHT_BRACE) && !self.is_at_end() {
            if let Some(stmt) = self.declaration() {
                statements.push(stmt);
            }
        }

        self.consume(&TokenType::RIGHT_BRACE, "Expect '}' after block.")?;

        Ok(statements)
    }

    fn if_statement(&mut self) -> ParseResult<Stmt> {
        self.consume(&TokenType::LEFT_PAREN, "Expect '(' after 'if'.")?;
        let condition: Expr = self.expression()?;
        self.consume(&TokenType::RIGHT_PAREN, "Expect ')' after if condition.")?;

        let then_branch: Stmt = self.statement()?;

        let else_branch: Option<Box<Stmt>> = if self.match_token(&TokenType::ELSE) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };

        Ok(Stmt::If {
            condition,
            then_branch: Box::new(then_branch),
            else_branch,
        })
    }

    fn while_statement(&mut self) -> ParseResult<Stmt> {
        self.consume(&TokenType::LEFT_PAREN, "Expect '(' after 'while'.")?;
        let condition: Expr = self.expression()?;
        self.consume(&TokenType::RIGHT_PAREN, "Expect ')' after condition.")?;

        let body: Stmt = self.statement()?;

        Ok(Stmt::While {
            condition,
            body: Box::new(body),
        })
    }

    /// for-loops desugar to while-loops:
    ///
    /// ```text
    /// for (init; cond; incr) body
    ///   ⇒ { init; while (cond_or_true) { body; incr; } }
    /// ```
    fn for_statement(&mut self) -> ParseResult<Stmt> {
        self.consume(&TokenType::LEFT_PAREN, "Expect '(' after 'for'.")?;

        let initializer: Option<Stmt> = if self.match_token(&TokenType::SEMICOLON) {
            None
        } else if self.match_token(&TokenType::VAR) {
            Some(self.var_declaration()?)
        } else {
            Some(self.expression_statement()?)
        };

        let condition: Option<Expr> = if !self.check(&TokenType::SEMICOLON) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(&TokenType::SEMICOLON, "Expect ';' after loop condition.")?;

        let increment: Option<Expr> = if !self.check(&TokenType::RIGHT_PAREN) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(&TokenType::RIGHT_PAREN, "Expect ')' after for clauses.")?;

        let mut body: Stmt = self.statement()?;

        if let Some(increment) = increment {
            body = Stmt::Block(vec![body, Stmt::Expression(increment)]);
        }

        let condition: Expr = match condition {
            Some(condition) => condition,
            None => self.make_expr(ExprKind::Literal(LiteralValue::Bool(true))),
        };

        body = Stmt::While {
            condition,
            body: Box::new(body),
        };

        if let Some(initializer) = initializer {
            body = Stmt::Block(vec![initializer, body]);
        }

        Ok(body)
    }

    fn break_statement(&mut self) -> ParseResult<Stmt> {
        let keyword: Token = self.previous().clone();
        self.consume(&TokenType::SEMICOLON, "Expect ';' after 'break'.")?;
        Ok(Stmt::Break(keyword))
    }

    fn return_statement(&mut self) -> ParseResult<Stmt> {
        let keyword: Token = self.previous().clone();

        let value: Option<Expr> = if !self.check(&TokenType::SEMICOLON) {
            Some(self.expression()?)
        } else {
            None
        };

        self.consume(&TokenType::SEMICOLON, "Expect ';' after return value.")?;

        Ok(Stmt::Return { keyword, value })
    }

    fn expression_statement(&mut self) -> ParseResult<Stmt> {
        let expr: Expr = self.expression()?;
        self.consume(&TokenType::SEMICOLON, "Expect ';' after expression.")?;
        Ok(Stmt::Expression(expr))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Expressions
    // ─────────────────────────────────────────────────────────────────────

    fn expression(&mut self) -> ParseResult<Expr> {
        self.assignment()
    }

    /// assignment → or ( "=" assignment )?   (right-associative)
    ///
    /// The left side is parsed as a general expression first and
    /// re-interpreted once `=` is seen; anything that is not a plain
    /// variable reports "Invalid assignment target." but parsing continues
    /// (the right side is consumed and discarded).
    fn assignment(&mut self) -> ParseResult<Expr> {
        let expr: Expr = self.or_expression()?;

        if self.match_token(&TokenType::EQUAL) {
            let equals: Token = self.previous().clone();
            let value: Expr = self.assignment()?;

            return match expr.kind {
                ExprKind::Variable(name) => Ok(self.make_expr(ExprKind::Assign {
                    name,
                    value: Box::new(value),
                })),

                kind => {
                    self.diagnostics
                        .report_token(&equals, "Invalid assignment target.");
                    Ok(Expr::new(expr.id, kind))
                }
            };
        }

        Ok(expr)
    }

    fn or_expression(&mut self) -> ParseResult<Expr> {
        let mut expr: Expr = self.and_expression()?;

        while self.match_token(&TokenType::OR) {
            let operator: Token = self.previous().clone();
            let right: Expr = self.and_expression()?;
            expr = self.make_expr(ExprKind::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            });
        }

        Ok(expr)
    }

    fn and_expression(&mut self) -> ParseResult<Expr> {
        let mut expr: Expr = self.comma()?;

        while self.match_token(&TokenType::AND) {
            let operator: Token = self.previous().clone();
            let right: Expr = self.comma()?;
            expr = self.make_expr(ExprKind::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            });
        }

        Ok(expr)
    }

    /// comma → conditional ( "," conditional )*
    ///
    /// Left-associative; a single sub-expression gets no wrapping node.
    fn comma(&mut self) -> ParseResult<Expr> {
        let mut expr: Expr = match self.missing_operand(&[TokenType::COMMA]) {
            Some(placeholder) => placeholder,
            None => self.conditional()?,
        };

        while self.match_token(&TokenType::COMMA) {
            let operator: Token = self.previous().clone();
            let right: Expr = self.conditional()?;
            expr = self.make_expr(ExprKind::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            });
        }

        Ok(expr)
    }

    /// conditional → equality ( "?" expression ":" conditional )?
    ///
    /// Right-associative through the recursive else branch.
    fn conditional(&mut self) -> ParseResult<Expr> {
        let expr: Expr = self.equality()?;

        if self.match_token(&TokenType::QUESTION) {
            let then_branch: Expr = self.expression()?;
            self.consume(
                &TokenType::COLON,
                "Expect ':' after then branch of ternary expression.",
            )?;
            let else_branch: Expr = self.conditional()?;

            return Ok(self.make_expr(ExprKind::Ternary {
                condition: Box::new(expr),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            }));
        }

        Ok(expr)
    }

    fn equality(&mut self) -> ParseResult<Expr> {
        let operators = [TokenType::BANG_EQUAL, TokenType::EQUAL_EQUAL];

        let mut expr: Expr = match self.missing_operand(&operators) {
            Some(placeholder) => placeholder,
            None => self.comparison()?,
        };

        while self.match_any(&operators) {
            let operator: Token = self.previous().clone();
            let right: Expr = self.comparison()?;
            expr = self.make_expr(ExprKind::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            });
        }

        Ok(expr)
    }

    fn comparison(&mut self) -> ParseResult<Expr> {
        let operators = [
            TokenType::GREATER,
            TokenType::GREATER_EQUAL,
            TokenType::LESS,
            TokenType::LESS_EQUAL,
        ];

        let mut expr: Expr = match self.missing_operand(&operators) {
            Some(placeholder) => placeholder,
            None => self.term()?,
        };

        while self.match_any(&operators) {
            let operator: Token = self.previous().clone();
            let right: Expr = self.term()?;
            expr = self.make_expr(ExprKind::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            });
        }

        Ok(expr)
    }

    fn term(&mut self) -> ParseResult<Expr> {
        // Only '+' is an error production here; leading '-' is unary.
        let mut expr: Expr = match self.missing_operand(&[TokenType::PLUS]) {
            Some(placeholder) => placeholder,
            None => self.factor()?,
        };

        while self.match_any(&[TokenType::MINUS, TokenType::PLUS]) {
            let operator: Token = self.previous().clone();
            let right: Expr = self.factor()?;
            expr = self.make_expr(ExprKind::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            });
        }

        Ok(expr)
    }

    fn factor(&mut self) -> ParseResult<Expr> {
        let operators = [TokenType::SLASH, TokenType::STAR, TokenType::MODULO];

        let mut expr: Expr = match self.missing_operand(&operators) {
            Some(placeholder) => placeholder,
            None => self.unary()?,
        };

        while self.match_any(&operators) {
            let operator: Token = self.previous().clone();
            let right: Expr = self.unary()?;
            expr = self.make_expr(ExprKind::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            });
        }

        Ok(expr)
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        if self.match_any(&[TokenType::BANG, TokenType::MINUS]) {
            let operator: Token = self.previous().clone();
            let right: Expr = self.unary()?;
            return Ok(self.make_expr(ExprKind::Unary {
                operator,
                right: Box::new(right),
            }));
        }

        self.call()
    }

    fn call(&mut self) -> ParseResult<Expr> {
        let mut expr: Expr = self.primary()?;

        while self.match_token(&TokenType::LEFT_PAREN) {
            expr = self.finish_call(expr)?;
        }

        Ok(expr)
    }

    /// Arguments are conditional-level expressions, so `,` separates
    /// arguments rather than acting as the sequence operator.
    fn finish_call(&mut self, callee: Expr) -> ParseResult<Expr> {
        let mut arguments: Vec<Expr> = Vec::new();

        if !self.check(&TokenType::RIGHT_PAREN) {
            loop {
                if arguments.len() >= MAX_ARITY {
                    let token: Token = self.peek().clone();
                    self.diagnostics
                        .report_token(&token, "Can't have more than 255 arguments.");
                }

                arguments.push(self.conditional()?);

                if !self.match_token(&TokenType::COMMA) {
                    break;
                }
            }
        }

        let paren: Token = self.consume(&TokenType::RIGHT_PAREN, "Expect ')' after arguments.")?;

        Ok(self.make_expr(ExprKind::Call {
            callee: Box::new(callee),
            paren,
            arguments,
        }))
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        if self.match_token(&TokenType::FALSE) {
            return Ok(self.make_expr(ExprKind::Literal(LiteralValue::Bool(false))));
        }

        if self.match_token(&TokenType::TRUE) {
            return Ok(self.make_expr(ExprKind::Literal(LiteralValue::Bool(true))));
        }

        if self.match_token(&TokenType::NIL) {
            return Ok(self.make_expr(ExprKind::Literal(LiteralValue::Nil)));
        }

        if self.match_token(&TokenType::NUMBER(0.0)) {
            let value: f64 = match self.previous().token_type {
                TokenType::NUMBER(n) => n,
                _ => unreachable!("matched NUMBER"),
            };
            return Ok(self.make_expr(ExprKind::Literal(LiteralValue::Number(value))));
        }

        if self.match_token(&TokenType::STRING(String::new())) {
            let value: String = match &self.previous().token_type {
                TokenType::STRING(s) => s.clone(),
                _ => unreachable!("matched STRING"),
            };
            return Ok(self.make_expr(ExprKind::Literal(LiteralValue::Str(value))));
        }

        if self.match_token(&TokenType::IDENTIFIER) {
            let name: Token = self.previous().clone();
            return Ok(self.make_expr(ExprKind::Variable(name)));
        }

        if self.match_token(&TokenType::LEFT_PAREN) {
            let expr: Expr = self.expression()?;
            self.consume(&TokenType::RIGHT_PAREN, "Expect ')' after expression.")?;
            return Ok(self.make_expr(ExprKind::Grouping(Box::new(expr))));
        }

        let token: Token = self.peek().clone();
        Err(self.error(&token, "Expect expression."))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Error handling
    // ─────────────────────────────────────────────────────────────────────

    /// Binary-operator error production: a binary operator with no left
    /// operand reports a diagnostic naming the operator and substitutes a
    /// `nil` literal so parsing (and later passes) can continue.
    fn missing_operand(&mut self, operators: &[TokenType]) -> Option<Expr> {
        if operators.iter().any(|t| self.check(t)) {
            let token: Token = self.peek().clone();
            self.diagnostics.report_token(
                &token,
                &format!("Missing left-hand operand before '{}'.", token.lexeme),
            );
            return Some(self.make_expr(ExprKind::Literal(LiteralValue::Nil)));
        }

        None
    }

    /// Reports a parse error and returns it for unwinding.
    fn error(&mut self, token: &Token, message: &str) -> LoxError {
        self.diagnostics.report_token(token, message);
        LoxError::parse(token, message)
    }

    /// Discards tokens until a likely statement boundary: just past a `;`
    /// or right before a statement-starting keyword.
    fn synchronize(&mut self) {
        debug!("Synchronizing parser at line {}", self.peek().line);

        self.advance();

        while !self.is_at_end() {
            if self.previous().token_type == TokenType::SEMICOLON {
                return;
            }

            match self.peek().token_type {
                TokenType::CLASS
                | TokenType::FUN
                | TokenType::VAR
                | TokenType::FOR
                | TokenType::IF
                | TokenType::WHILE
                | TokenType::PRINT
                | TokenType::RETURN => return,

                _ => {}
            }

            self.advance();
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Token cursor helpers
    // ─────────────────────────────────────────────────────────────────────

    fn make_expr(&mut self, kind: ExprKind) -> Expr {
        let id: ExprId = ExprId(self.next_id);
        self.next_id += 1;
        Expr::new(id, kind)
    }

    fn match_token(&mut self, token_type: &TokenType) -> bool {
        if self.check(token_type) {
            self.advance();
            return true;
        }
        false
    }

    fn match_any(&mut self, types: &[TokenType]) -> bool {
        for token_type in types {
            if self.check(token_type) {
                self.advance();
                return true;
            }
        }
        false
    }

    fn check(&self, token_type: &TokenType) -> bool {
        self.peek().token_type == *token_type
    }

    fn consume(&mut self, token_type: &TokenType, message: &str) -> ParseResult<Token> {
        if self.check(token_type) {
            return Ok(self.advance().clone());
        }

        let token: Token = self.peek().clone();
        Err(self.error(&token, message))
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    #[inline]
    fn is_at_end(&self) -> bool {
        self.peek().is_eof()
    }

    #[inline]
    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    #[inline]
    fn previous(&self) -> &Token {
        &self.tokens[self.current - 1]
    }
}
