//! Recursive-descent parser with precedence climbing.
//!
//! Consumes the lexer's token vector and produces a [`Program`]. Errors are
//! recovered at the next top-level `;` or `}`, so a file with several
//! mistakes yields several diagnostics; `parse` fails with all of them
//! joined.

use crate::ast::{
    BinaryOp, Block, ChainLink, Expr, ExprKind, FuncDecl, LoopKind, LoopStmt, Program, Stmt,
    StmtKind, TypeAnnotation, TypeName, UnaryOp,
};
use crate::lexer::{Token, TokenKind};
use crate::source_map::SourceLocation;

pub struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    errors: Vec<String>,
    next_anon_id: usize,
}

fn token_loc(token: &Token) -> SourceLocation {
    SourceLocation {
        orig_line: token.orig_line,
        orig_column: token.orig_column,
        orig_length: token.orig_length,
        is_synthetic: token.orig_line == 0,
    }
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Parser {
            tokens,
            pos: 0,
            errors: Vec::new(),
            next_anon_id: 0,
        }
    }

    pub fn parse(&mut self) -> Result<Program, String> {
        let mut statements = Vec::new();

        while !self.at_end() {
            while self.match_kind(TokenKind::Semi) {}
            if self.at_end() {
                break;
            }
            if self.check(TokenKind::RBrace) {
                self.error_here("Unexpected '}' at top level");
                self.advance();
                continue;
            }

            let old_pos = self.pos;
            match self.parse_statement() {
                Ok(Some(stmt)) => statements.push(stmt),
                Ok(None) => {}
                Err(()) => self.synchronize(),
            }
            if self.pos == old_pos {
                // Defensive: never loop on an unconsumed token.
                self.advance();
            }
        }

        if self.errors.is_empty() {
            Ok(Program { statements })
        } else {
            Err(self.errors.join("\n"))
        }
    }

    // ------------------------------------------------------------------
    // Token helpers
    // ------------------------------------------------------------------

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn current(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn peek(&self, offset: usize) -> Option<&'a Token> {
        self.tokens.get(self.pos + offset)
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().map(|t| t.kind == kind).unwrap_or(false)
    }

    fn peek_kind(&self, offset: usize) -> Option<TokenKind> {
        self.peek(offset).map(|t| t.kind)
    }

    fn match_kind(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn advance(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn here_loc(&self) -> SourceLocation {
        self.current()
            .or_else(|| self.tokens.last())
            .map(token_loc)
            .unwrap_or_else(SourceLocation::synthetic)
    }

    fn error_here(&mut self, message: &str) {
        let (line, column) = self
            .current()
            .or_else(|| self.tokens.last())
            .map(|t| (t.line, t.column))
            .unwrap_or((0, 0));
        self.errors
            .push(format!("Error at line {line}, column {column}: {message}"));
    }

    fn expect(&mut self, kind: TokenKind, message: &str) -> Result<&'a Token, ()> {
        if self.check(kind) {
            Ok(self.advance().expect("checked token"))
        } else {
            self.error_here(message);
            Err(())
        }
    }

    /// Recover at the next `;` or `}` (consumed).
    fn synchronize(&mut self) {
        while let Some(token) = self.advance() {
            if matches!(token.kind, TokenKind::Semi | TokenKind::RBrace) {
                return;
            }
        }
    }

    fn fresh_anon_name(&mut self) -> String {
        let name = format!("_anon_{}", self.next_anon_id);
        self.next_anon_id += 1;
        name
    }

    // ------------------------------------------------------------------
    // Lookahead
    // ------------------------------------------------------------------

    /// Position of the `)` matching the `(` at `open` (token index), if any.
    fn matching_paren(&self, open: usize) -> Option<usize> {
        let mut depth = 0i32;
        for (k, token) in self.tokens.iter().enumerate().skip(open) {
            match token.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(k);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// At a `(`: is this a function literal `(params) [:<T>=] { ... }`?
    fn lambda_ahead(&self) -> bool {
        if !self.check(TokenKind::LParen) {
            return false;
        }
        let Some(close) = self.matching_paren(self.pos) else {
            return false;
        };
        matches!(
            self.tokens.get(close + 1).map(|t| t.kind),
            Some(TokenKind::LBrace) | Some(TokenKind::FuncTypeStart)
        )
    }

    /// Does an `=` appear at bracket depth 0 before the statement ends?
    fn has_toplevel_assign(&self) -> bool {
        let mut depth = 0i32;
        for token in &self.tokens[self.pos..] {
            match token.kind {
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    depth -= 1;
                    if depth < 0 {
                        return false;
                    }
                }
                TokenKind::Semi if depth == 0 => return false,
                TokenKind::Assign if depth == 0 => return true,
                _ => {}
            }
        }
        false
    }

    /// Shape of a `L> ( ... )` header: (has_semi, has_colon) at paren-level 1.
    fn loop_header_shape(&self) -> (bool, bool) {
        let mut depth = 0i32;
        let mut has_semi = false;
        let mut has_colon = false;
        for token in &self.tokens[self.pos..] {
            match token.kind {
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    depth -= 1;
                    if depth <= 0 {
                        break;
                    }
                }
                TokenKind::Semi if depth == 1 => has_semi = true,
                TokenKind::Colon if depth == 1 => has_colon = true,
                _ => {}
            }
        }
        (has_semi, has_colon)
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_statement(&mut self) -> Result<Option<Stmt>, ()> {
        while self.match_kind(TokenKind::Semi) {}
        let Some(token) = self.current() else {
            return Ok(None);
        };

        match token.kind {
            TokenKind::RBrace => Ok(None),
            TokenKind::KwReturn => self.parse_return().map(Some),
            TokenKind::KwLoop => self.parse_loop().map(Some),
            TokenKind::KwIf => self.parse_if().map(Some),
            TokenKind::KwTry => self.parse_try().map(Some),
            TokenKind::KwBreak => {
                let loc = token_loc(token);
                self.advance();
                let label = self.take_jump_label();
                Ok(Some(Stmt::new(StmtKind::Break { label }, loc)))
            }
            TokenKind::KwNext => {
                let loc = token_loc(token);
                self.advance();
                let label = self.take_jump_label();
                Ok(Some(Stmt::new(StmtKind::Next { label }, loc)))
            }
            TokenKind::LBrace => {
                let block = self.parse_block()?;
                let loc = block.loc;
                Ok(Some(Stmt::new(StmtKind::Block(block), loc)))
            }
            TokenKind::Ident | TokenKind::BuiltinFunc => {
                match self.peek_kind(1) {
                    Some(TokenKind::Define) => self.parse_var_declaration().map(Some),
                    Some(TokenKind::FuncTypeStart) => self.parse_typed_func_or_var().map(Some),
                    Some(TokenKind::Colon) => self.parse_typed_var_declaration().map(Some),
                    _ => {
                        if self.has_toplevel_assign() {
                            self.parse_assignment().map(Some)
                        } else {
                            self.parse_expr_statement().map(Some)
                        }
                    }
                }
            }
            // Anything else: `self.x = 1`-style assignments or a bare
            // expression statement.
            _ => {
                if self.has_toplevel_assign() {
                    self.parse_assignment().map(Some)
                } else {
                    self.parse_expr_statement().map(Some)
                }
            }
        }
    }

    fn take_jump_label(&mut self) -> Option<String> {
        if self.check(TokenKind::Ident) {
            self.advance().map(|t| t.lexeme.clone())
        } else {
            None
        }
    }

    fn parse_expr_statement(&mut self) -> Result<Stmt, ()> {
        let expr = self.parse_expression()?;
        let loc = expr.loc;
        Ok(Stmt::new(StmtKind::ExprStmt(expr), loc))
    }

    fn parse_return(&mut self) -> Result<Stmt, ()> {
        let loc = self.here_loc();
        self.expect(TokenKind::KwReturn, "Expected 'R>'")?;
        let value = if self.at_end() || self.check(TokenKind::Semi) || self.check(TokenKind::RBrace)
        {
            None
        } else {
            Some(self.parse_expression()?)
        };
        Ok(Stmt::new(StmtKind::Return(value), loc))
    }

    /// `name := expr`, turning `name := (params) { ... }` into a function
    /// declaration.
    fn parse_var_declaration(&mut self) -> Result<Stmt, ()> {
        let name_token = self.expect(TokenKind::Ident, "Expected identifier")?;
        let name = name_token.lexeme.clone();
        let loc = token_loc(name_token);
        self.expect(TokenKind::Define, "Expected ':=' in variable declaration")?;

        let init = self.parse_expression()?;
        if let ExprKind::Func(mut func) = init.kind {
            func.name = name;
            return Ok(Stmt::new(StmtKind::FuncDecl(func), loc));
        }
        Ok(Stmt::new(
            StmtKind::VarDecl {
                name,
                type_annotation: None,
                is_const: false,
                init: Some(init),
            },
            loc,
        ))
    }

    /// `name :[T]= expr` (variable) or `name :(T)= expr` (constant).
    fn parse_typed_var_declaration(&mut self) -> Result<Stmt, ()> {
        let name_token = self.expect(TokenKind::Ident, "Expected identifier")?;
        let name = name_token.lexeme.clone();
        let loc = token_loc(name_token);
        self.expect(TokenKind::Colon, "Expected ':' in type annotation")?;

        let is_const = if self.match_kind(TokenKind::LBracket) {
            false
        } else if self.match_kind(TokenKind::LParen) {
            true
        } else {
            self.error_here("Expected '[' or '(' in type annotation");
            return Err(());
        };

        let type_name = self.parse_type_name()?;
        let close = if is_const {
            TokenKind::RParen
        } else {
            TokenKind::RBracket
        };
        self.expect(close, "Expected closing bracket in type annotation")?;
        self.expect(TokenKind::Assign, "Expected '=' after type annotation")?;

        let annotation = TypeAnnotation {
            type_name,
            is_const,
        };
        let init = self.parse_expression()?;
        if let ExprKind::Func(mut func) = init.kind {
            func.name = name;
            func.return_type = Some(annotation);
            return Ok(Stmt::new(StmtKind::FuncDecl(func), loc));
        }
        Ok(Stmt::new(
            StmtKind::VarDecl {
                name,
                type_annotation: Some(annotation),
                is_const,
                init: Some(init),
            },
            loc,
        ))
    }

    /// `name :<T>= (params) { ... }` (function declaration) or
    /// `name :<T>= expr` (variable with a function-type annotation).
    fn parse_typed_func_or_var(&mut self) -> Result<Stmt, ()> {
        let name_token = self.expect(TokenKind::Ident, "Expected identifier")?;
        let name = name_token.lexeme.clone();
        let loc = token_loc(name_token);
        let annotation = self.parse_func_type_annotation()?;

        let init = self.parse_expression()?;
        if let ExprKind::Func(mut func) = init.kind {
            func.name = name;
            func.return_type = annotation;
            return Ok(Stmt::new(StmtKind::FuncDecl(func), loc));
        }
        Ok(Stmt::new(
            StmtKind::VarDecl {
                name,
                type_annotation: annotation,
                is_const: false,
                init: Some(init),
            },
            loc,
        ))
    }

    fn parse_type_name(&mut self) -> Result<TypeName, ()> {
        let Some(token) = self.current() else {
            self.error_here("Expected type name");
            return Err(());
        };
        let type_name = match token.kind {
            TokenKind::TypeNum => TypeName::Num,
            TokenKind::TypeStr => TypeName::Str,
            TokenKind::TypeBl => TypeName::Bl,
            TokenKind::TypeObj => TypeName::Obj,
            TokenKind::TypeFunc => TypeName::Func,
            _ => {
                self.error_here("Expected type name");
                return Err(());
            }
        };
        self.advance();
        Ok(type_name)
    }

    /// Consume `:<T>=` (the lexer folds the closing `>` and `=` into one `>=`
    /// token) plus the optional `>` of the `=>` arrow form. Returns the
    /// annotation when the type name is recognized.
    fn parse_func_type_annotation(&mut self) -> Result<Option<TypeAnnotation>, ()> {
        self.expect(TokenKind::FuncTypeStart, "Expected ':<'")?;

        let mut annotation = None;
        if let Some(token) = self.current() {
            let type_name = match token.kind {
                TokenKind::TypeNum => Some(TypeName::Num),
                TokenKind::TypeStr => Some(TypeName::Str),
                TokenKind::TypeBl => Some(TypeName::Bl),
                TokenKind::TypeObj => Some(TypeName::Obj),
                TokenKind::TypeFunc => Some(TypeName::Func),
                _ => None,
            };
            if let Some(type_name) = type_name {
                annotation = Some(TypeAnnotation {
                    type_name,
                    is_const: false,
                });
            }
        }

        // Skip to the annotation's closing '>': either `>=` (close + assign)
        // or `>` followed by an explicit `=`.
        loop {
            match self.current().map(|t| t.kind) {
                Some(TokenKind::Ge) => {
                    self.advance();
                    break;
                }
                Some(TokenKind::Gt) => {
                    self.advance();
                    self.expect(TokenKind::Assign, "Expected '=' after function type")?;
                    break;
                }
                Some(TokenKind::Semi) | Some(TokenKind::LBrace) | None => {
                    self.error_here("Unterminated ':<...>' type annotation");
                    return Err(());
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
        // `=>` arrow form leaves a stray '>' before the body.
        if self.check(TokenKind::Gt)
            && matches!(self.peek_kind(1), Some(TokenKind::LBrace) | Some(TokenKind::LParen))
        {
            self.advance();
        }
        Ok(annotation)
    }

    fn parse_assignment(&mut self) -> Result<Stmt, ()> {
        let target = self.parse_postfix()?;
        let loc = target.loc;
        self.expect(TokenKind::Assign, "Expected '=' in assignment")?;
        let value = self.parse_expression()?;
        Ok(Stmt::new(StmtKind::Assign { target, value }, loc))
    }

    fn parse_block(&mut self) -> Result<Block, ()> {
        let loc = self.here_loc();
        self.expect(TokenKind::LBrace, "Expected '{'")?;

        let mut statements = Vec::new();
        while !self.at_end() && !self.check(TokenKind::RBrace) {
            while self.match_kind(TokenKind::Semi) {}
            if self.check(TokenKind::RBrace) || self.at_end() {
                break;
            }
            let old_pos = self.pos;
            match self.parse_statement() {
                Ok(Some(stmt)) => statements.push(stmt),
                Ok(None) => {}
                Err(()) => self.synchronize(),
            }
            if self.pos == old_pos {
                self.advance();
            }
        }

        self.expect(TokenKind::RBrace, "Expected '}'")?;
        Ok(Block { statements, loc })
    }

    /// `if (cond) { ... } (cond2) { ... } ... { else }`.
    fn parse_if(&mut self) -> Result<Stmt, ()> {
        let loc = self.here_loc();
        self.expect(TokenKind::KwIf, "Expected 'if'")?;

        let mut conditions = Vec::new();
        let mut then_blocks = Vec::new();

        self.expect(TokenKind::LParen, "Expected '(' after 'if'")?;
        conditions.push(self.parse_expression()?);
        self.expect(TokenKind::RParen, "Expected ')' after condition")?;
        then_blocks.push(self.parse_block()?);

        // Further `(cond) { ... }` pairs extend the else-if chain; a bare
        // block is the else. Statement separators keep this unambiguous.
        while self.check(TokenKind::LParen) {
            self.advance();
            conditions.push(self.parse_expression()?);
            self.expect(TokenKind::RParen, "Expected ')' after condition")?;
            then_blocks.push(self.parse_block()?);
        }

        let else_block = if self.check(TokenKind::LBrace) {
            Some(self.parse_block()?)
        } else {
            None
        };

        Ok(Stmt::new(
            StmtKind::If {
                conditions,
                then_blocks,
                else_block,
            },
            loc,
        ))
    }

    fn parse_try(&mut self) -> Result<Stmt, ()> {
        let loc = self.here_loc();
        self.expect(TokenKind::KwTry, "Expected 'T>'")?;
        let try_block = self.parse_block()?;

        let mut catch_param = None;
        let mut catch_block = None;
        if self.check(TokenKind::LParen) {
            self.advance();
            let param = self.expect(TokenKind::Ident, "Expected catch parameter name")?;
            catch_param = Some(param.lexeme.clone());
            self.expect(TokenKind::RParen, "Expected ')' after catch parameter")?;
            catch_block = Some(self.parse_block()?);
        }

        let finally_block = if self.check(TokenKind::LBrace) {
            Some(self.parse_block()?)
        } else {
            None
        };

        Ok(Stmt::new(
            StmtKind::Try {
                try_block,
                catch_param,
                catch_block,
                finally_block,
            },
            loc,
        ))
    }

    fn parse_loop(&mut self) -> Result<Stmt, ()> {
        let loc = self.here_loc();
        self.expect(TokenKind::KwLoop, "Expected 'L>'")?;

        // Optional loop name: `L>outer (...) { ... }`.
        let label = if self.check(TokenKind::Ident)
            && matches!(
                self.peek_kind(1),
                Some(TokenKind::LParen) | Some(TokenKind::LBracket)
            ) {
            self.advance().map(|t| t.lexeme.clone())
        } else {
            None
        };

        if self.match_kind(TokenKind::LBracket) {
            let count = self.parse_expression()?;
            self.expect(TokenKind::RBracket, "Expected ']' after repeat count")?;
            let body = self.parse_block()?;
            return Ok(Stmt::new(
                StmtKind::Loop(LoopStmt {
                    kind: LoopKind::Repeat(count),
                    label,
                    body,
                }),
                loc,
            ));
        }

        if !self.check(TokenKind::LParen) {
            self.error_here("Expected '(' or '[' after 'L>'");
            return Err(());
        }
        let (has_semi, has_colon) = self.loop_header_shape();
        self.advance(); // '('

        if has_semi {
            // C-style: init; cond; update.
            let init = if self.check(TokenKind::Semi) {
                None
            } else {
                Some(Box::new(self.parse_loop_clause()?))
            };
            self.expect(TokenKind::Semi, "Expected ';' after loop init")?;

            let condition = if self.check(TokenKind::Semi) {
                None
            } else {
                Some(self.parse_expression()?)
            };
            self.expect(TokenKind::Semi, "Expected ';' after loop condition")?;

            let update = if self.check(TokenKind::RParen) {
                None
            } else {
                Some(Box::new(self.parse_loop_clause()?))
            };
            self.expect(TokenKind::RParen, "Expected ')' after loop header")?;

            let body = self.parse_block()?;
            return Ok(Stmt::new(
                StmtKind::Loop(LoopStmt {
                    kind: LoopKind::For {
                        init,
                        condition,
                        update,
                    },
                    label,
                    body,
                }),
                loc,
            ));
        }

        if has_colon {
            let iterable = self.parse_expression()?;
            self.expect(TokenKind::Colon, "Expected ':' in foreach header")?;
            let binding = self
                .expect(TokenKind::Ident, "Expected binding name in foreach header")?
                .lexeme
                .clone();
            self.expect(TokenKind::RParen, "Expected ')' after foreach header")?;
            let body = self.parse_block()?;
            return Ok(Stmt::new(
                StmtKind::Loop(LoopStmt {
                    kind: LoopKind::Foreach { iterable, binding },
                    label,
                    body,
                }),
                loc,
            ));
        }

        // `L>(cond) { ... }`: while-style loop, condition only.
        let condition = self.parse_expression()?;
        self.expect(TokenKind::RParen, "Expected ')' after loop condition")?;
        let body = self.parse_block()?;
        Ok(Stmt::new(
            StmtKind::Loop(LoopStmt {
                kind: LoopKind::For {
                    init: None,
                    condition: Some(condition),
                    update: None,
                },
                label,
                body,
            }),
            loc,
        ))
    }

    /// Init/update clause of a C-style loop header: a declaration, an
    /// assignment, or a bare expression.
    fn parse_loop_clause(&mut self) -> Result<Stmt, ()> {
        if self.check(TokenKind::Ident) {
            match self.peek_kind(1) {
                Some(TokenKind::Define) => return self.parse_var_declaration(),
                Some(TokenKind::Assign) => {
                    let name_token = self.advance().expect("checked ident");
                    let target =
                        Expr::new(ExprKind::Identifier(name_token.lexeme.clone()), token_loc(name_token));
                    self.advance(); // '='
                    let value = self.parse_expression()?;
                    let loc = target.loc;
                    return Ok(Stmt::new(StmtKind::Assign { target, value }, loc));
                }
                _ => {}
            }
        }
        self.parse_expr_statement()
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    pub fn parse_expression(&mut self) -> Result<Expr, ()> {
        self.parse_ternary()
    }

    fn parse_ternary(&mut self) -> Result<Expr, ()> {
        let condition = self.parse_logical_or()?;
        if !self.match_kind(TokenKind::Question) {
            return Ok(condition);
        }
        let then_expr = self.parse_expression()?;
        self.expect(TokenKind::Colon, "Expected ':' in ternary expression")?;
        let else_expr = self.parse_expression()?;
        let loc = condition.loc;
        Ok(Expr::new(
            ExprKind::Ternary {
                condition: Box::new(condition),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            },
            loc,
        ))
    }

    fn binary_level(
        &mut self,
        ops: &[(TokenKind, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr, ()>,
    ) -> Result<Expr, ()> {
        let mut left = next(self)?;
        'outer: loop {
            for &(kind, op) in ops {
                if self.check(kind) {
                    let op_token = self.advance().expect("checked operator");
                    let loc = token_loc(op_token);
                    let right = next(self)?;
                    left = Expr::new(
                        ExprKind::Binary {
                            op,
                            left: Box::new(left),
                            right: Box::new(right),
                        },
                        loc,
                    );
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn parse_logical_or(&mut self) -> Result<Expr, ()> {
        self.binary_level(&[(TokenKind::OrOr, BinaryOp::Or)], Self::parse_logical_and)
    }

    fn parse_logical_and(&mut self) -> Result<Expr, ()> {
        self.binary_level(&[(TokenKind::AndAnd, BinaryOp::And)], Self::parse_bit_or)
    }

    fn parse_bit_or(&mut self) -> Result<Expr, ()> {
        self.binary_level(&[(TokenKind::BitOr, BinaryOp::BitOr)], Self::parse_bit_xor)
    }

    fn parse_bit_xor(&mut self) -> Result<Expr, ()> {
        self.binary_level(&[(TokenKind::BitXor, BinaryOp::BitXor)], Self::parse_bit_and)
    }

    fn parse_bit_and(&mut self) -> Result<Expr, ()> {
        self.binary_level(&[(TokenKind::BitAnd, BinaryOp::BitAnd)], Self::parse_equality)
    }

    fn parse_equality(&mut self) -> Result<Expr, ()> {
        self.binary_level(
            &[
                (TokenKind::EqEq, BinaryOp::Eq),
                (TokenKind::BangEq, BinaryOp::Ne),
            ],
            Self::parse_comparison,
        )
    }

    fn parse_comparison(&mut self) -> Result<Expr, ()> {
        self.binary_level(
            &[
                (TokenKind::Lt, BinaryOp::Lt),
                (TokenKind::Gt, BinaryOp::Gt),
                (TokenKind::Le, BinaryOp::Le),
                (TokenKind::Ge, BinaryOp::Ge),
            ],
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> Result<Expr, ()> {
        self.binary_level(
            &[
                (TokenKind::Plus, BinaryOp::Add),
                (TokenKind::Minus, BinaryOp::Sub),
            ],
            Self::parse_multiplicative,
        )
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ()> {
        self.binary_level(
            &[
                (TokenKind::Star, BinaryOp::Mul),
                (TokenKind::Slash, BinaryOp::Div),
                (TokenKind::Percent, BinaryOp::Mod),
            ],
            Self::parse_power,
        )
    }

    /// `**` is right-associative.
    fn parse_power(&mut self) -> Result<Expr, ()> {
        let base = self.parse_unary()?;
        if self.check(TokenKind::Power) {
            let op_token = self.advance().expect("checked operator");
            let loc = token_loc(op_token);
            let exponent = self.parse_power()?;
            return Ok(Expr::new(
                ExprKind::Binary {
                    op: BinaryOp::Pow,
                    left: Box::new(base),
                    right: Box::new(exponent),
                },
                loc,
            ));
        }
        Ok(base)
    }

    fn parse_unary(&mut self) -> Result<Expr, ()> {
        let Some(token) = self.current() else {
            self.error_here("Expected expression");
            return Err(());
        };
        let op = match token.kind {
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Plus => Some(UnaryOp::Pos),
            TokenKind::PlusPlus => Some(UnaryOp::Inc),
            TokenKind::MinusMinus => Some(UnaryOp::Dec),
            _ => None,
        };
        if let Some(op) = op {
            let loc = token_loc(token);
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::new(
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                    is_postfix: false,
                },
                loc,
            ));
        }
        self.parse_postfix()
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expr>, ()> {
        let mut args = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                args.push(self.parse_expression()?);
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "Expected ')' after arguments")?;
        Ok(args)
    }

    fn parse_postfix(&mut self) -> Result<Expr, ()> {
        let mut expr = self.parse_primary()?;

        loop {
            let Some(token) = self.current() else {
                return Ok(expr);
            };
            match token.kind {
                TokenKind::LParen => {
                    let loc = expr.loc;
                    self.advance();
                    let args = self.parse_call_args()?;
                    let throw_on_error = self.match_kind(TokenKind::Bang);
                    expr = Expr::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                            throw_on_error,
                        },
                        loc,
                    );
                }
                // `name!(args)`: the throwing-call bang between callee and
                // argument list.
                TokenKind::Bang if self.peek_kind(1) == Some(TokenKind::LParen) => {
                    let loc = expr.loc;
                    self.advance(); // '!'
                    self.advance(); // '('
                    let args = self.parse_call_args()?;
                    self.match_kind(TokenKind::Bang);
                    expr = Expr::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                            throw_on_error: true,
                        },
                        loc,
                    );
                }
                TokenKind::LBracket => {
                    let loc = expr.loc;
                    self.advance();
                    let index = self.parse_expression()?;
                    self.expect(TokenKind::RBracket, "Expected ']' after index")?;
                    expr = Expr::new(
                        ExprKind::Index {
                            object: Box::new(expr),
                            index: Box::new(index),
                        },
                        loc,
                    );
                }
                TokenKind::Dot | TokenKind::QuestionDot => {
                    let is_optional = token.kind == TokenKind::QuestionDot;
                    let loc = expr.loc;
                    self.advance();
                    let property = self.expect_property_name()?;
                    expr = Expr::new(
                        ExprKind::Member {
                            object: Box::new(expr),
                            property,
                            is_optional,
                            is_unbound: true,
                        },
                        loc,
                    );
                }
                TokenKind::DotChain => {
                    let loc = expr.loc;
                    self.advance();
                    let name = self.expect_property_name()?;
                    let (args, throw_on_error) = if self.match_kind(TokenKind::LParen) {
                        let args = self.parse_call_args()?;
                        let bang = self.match_kind(TokenKind::Bang);
                        (Some(args), bang)
                    } else {
                        (None, false)
                    };
                    let link = ChainLink {
                        name,
                        args,
                        throw_on_error,
                    };
                    expr = match expr.kind {
                        ExprKind::Chain { object, mut links } => {
                            links.push(link);
                            Expr::new(ExprKind::Chain { object, links }, loc)
                        }
                        _ => Expr::new(
                            ExprKind::Chain {
                                object: Box::new(expr),
                                links: vec![link],
                            },
                            loc,
                        ),
                    };
                }
                TokenKind::PlusPlus | TokenKind::MinusMinus => {
                    let op = if token.kind == TokenKind::PlusPlus {
                        UnaryOp::Inc
                    } else {
                        UnaryOp::Dec
                    };
                    let loc = expr.loc;
                    self.advance();
                    expr = Expr::new(
                        ExprKind::Unary {
                            op,
                            operand: Box::new(expr),
                            is_postfix: true,
                        },
                        loc,
                    );
                }
                _ => return Ok(expr),
            }
        }
    }

    fn expect_property_name(&mut self) -> Result<String, ()> {
        let Some(token) = self.current() else {
            self.error_here("Expected property name");
            return Err(());
        };
        match token.kind {
            TokenKind::Ident | TokenKind::BuiltinFunc => {
                let name = token.lexeme.clone();
                self.advance();
                Ok(name)
            }
            _ => {
                self.error_here("Expected property name");
                Err(())
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ()> {
        let Some(token) = self.current() else {
            self.error_here("Expected expression");
            return Err(());
        };
        let loc = token_loc(token);

        match token.kind {
            TokenKind::Num => {
                let raw = token.lexeme.clone();
                self.advance();
                let value = raw.parse::<f64>().unwrap_or_else(|_| {
                    self.error_here("Invalid numeric literal");
                    0.0
                });
                Ok(Expr::new(ExprKind::Num { value, raw }, loc))
            }
            TokenKind::Str => {
                let bytes = token.text_bytes().to_vec();
                self.advance();
                Ok(Expr::new(ExprKind::Str(bytes), loc))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::new(ExprKind::Bool(true), loc))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::new(ExprKind::Bool(false), loc))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expr::new(ExprKind::Null, loc))
            }
            TokenKind::Undef => {
                self.advance();
                Ok(Expr::new(ExprKind::Undef, loc))
            }
            TokenKind::KwSelf => {
                self.advance();
                Ok(Expr::new(ExprKind::SelfRef, loc))
            }
            TokenKind::Ident | TokenKind::BuiltinFunc => {
                let name = token.lexeme.clone();
                self.advance();
                Ok(Expr::new(ExprKind::Identifier(name), loc))
            }
            TokenKind::LParen => {
                if self.lambda_ahead() {
                    return self.parse_function_literal();
                }
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RParen, "Expected ')' after expression")?;
                Ok(expr)
            }
            TokenKind::LBracket => self.parse_array_literal(),
            TokenKind::LBrace => self.parse_object_literal(),
            _ => {
                self.error_here("Expected expression");
                Err(())
            }
        }
    }

    /// `(params) [:<T>=[>]] { body }`.
    fn parse_function_literal(&mut self) -> Result<Expr, ()> {
        let loc = self.here_loc();
        self.expect(TokenKind::LParen, "Expected '('")?;

        let mut params = Vec::new();
        while !self.check(TokenKind::RParen) && !self.at_end() {
            let param = self.expect(TokenKind::Ident, "Expected parameter name")?;
            params.push(param.lexeme.clone());
            if !self.match_kind(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "Expected ')' after parameters")?;

        let return_type = if self.check(TokenKind::FuncTypeStart) {
            self.parse_func_type_annotation()?
        } else {
            None
        };

        let body = self.parse_block()?;
        let name = self.fresh_anon_name();
        Ok(Expr::new(
            ExprKind::Func(FuncDecl {
                name,
                params,
                return_type,
                body,
                uses_self: false,
            }),
            loc,
        ))
    }

    fn parse_array_literal(&mut self) -> Result<Expr, ()> {
        let loc = self.here_loc();
        self.expect(TokenKind::LBracket, "Expected '['")?;

        let mut elements = Vec::new();
        let mut spread = Vec::new();
        if !self.check(TokenKind::RBracket) {
            loop {
                let is_spread = self.match_kind(TokenKind::Ellipsis);
                elements.push(self.parse_expression()?);
                spread.push(is_spread);
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RBracket, "Expected ']' after array elements")?;
        Ok(Expr::new(ExprKind::Array { elements, spread }, loc))
    }

    fn parse_object_literal(&mut self) -> Result<Expr, ()> {
        let loc = self.here_loc();
        self.expect(TokenKind::LBrace, "Expected '{'")?;

        let mut properties = Vec::new();
        if !self.check(TokenKind::RBrace) {
            loop {
                let Some(key_token) = self.current() else {
                    self.error_here("Expected property key");
                    return Err(());
                };
                let key = match key_token.kind {
                    TokenKind::Ident | TokenKind::BuiltinFunc => key_token.lexeme.clone(),
                    TokenKind::Str => {
                        String::from_utf8_lossy(key_token.text_bytes()).into_owned()
                    }
                    _ => {
                        self.error_here("Expected property key");
                        return Err(());
                    }
                };
                self.advance();
                self.expect(TokenKind::Colon, "Expected ':' after property key")?;
                let value = self.parse_expression()?;
                properties.push((key, value));
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RBrace, "Expected '}' after object properties")?;
        Ok(Expr::new(ExprKind::Object { properties }, loc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer;
    use crate::source_map::{Prov, SourceMap};

    fn parse_src(src: &str) -> Program {
        try_parse(src).expect("parse failed")
    }

    fn try_parse(src: &str) -> Result<Program, String> {
        let prov: Vec<Prov> = (0..src.len()).map(|i| Prov::Orig(i as u32)).collect();
        let map = SourceMap::from_provenance(src, &prov);
        let offsets: Vec<usize> = (0..src.len()).collect();
        let tokens = lexer::tokenize(src, &map, &offsets).expect("lex failed");
        Parser::new(&tokens).parse()
    }

    #[test]
    fn test_var_declaration() {
        let program = parse_src("x:=41+1;");
        assert_eq!(program.statements.len(), 1);
        match &program.statements[0].kind {
            StmtKind::VarDecl { name, init, .. } => {
                assert_eq!(name, "x");
                assert!(matches!(
                    init.as_ref().unwrap().kind,
                    ExprKind::Binary {
                        op: BinaryOp::Add,
                        ..
                    }
                ));
            }
            other => panic!("expected VarDecl, got {other:?}"),
        }
    }

    #[test]
    fn test_const_annotation() {
        let program = parse_src("X:(num)=5;");
        match &program.statements[0].kind {
            StmtKind::VarDecl {
                is_const,
                type_annotation,
                ..
            } => {
                assert!(*is_const);
                assert_eq!(type_annotation.unwrap().type_name, TypeName::Num);
            }
            other => panic!("expected VarDecl, got {other:?}"),
        }
    }

    #[test]
    fn test_function_declaration_sugar() {
        let program = parse_src("f:=(a,b){R>a;};");
        match &program.statements[0].kind {
            StmtKind::FuncDecl(func) => {
                assert_eq!(func.name, "f");
                assert_eq!(func.params, vec!["a", "b"]);
            }
            other => panic!("expected FuncDecl, got {other:?}"),
        }
    }

    #[test]
    fn test_function_with_return_type() {
        let program = parse_src("f:<num>=(x){R>x;};");
        match &program.statements[0].kind {
            StmtKind::FuncDecl(func) => {
                assert_eq!(func.return_type.unwrap().type_name, TypeName::Num);
            }
            other => panic!("expected FuncDecl, got {other:?}"),
        }
    }

    #[test]
    fn test_nested_lambda_arrow_form() {
        // make := (k):<func>={ (x):<num>=>{ R> k + x } }
        let program = parse_src("make:=(k):<func>={(x):<num>=>{R>k+x;};};");
        match &program.statements[0].kind {
            StmtKind::FuncDecl(make) => {
                assert_eq!(make.name, "make");
                assert_eq!(make.params, vec!["k"]);
                // The body holds one expression statement: the inner lambda.
                assert_eq!(make.body.statements.len(), 1);
                match &make.body.statements[0].kind {
                    StmtKind::ExprStmt(expr) => {
                        assert!(matches!(expr.kind, ExprKind::Func(_)));
                    }
                    other => panic!("expected inner lambda, got {other:?}"),
                }
            }
            other => panic!("expected FuncDecl, got {other:?}"),
        }
    }

    #[test]
    fn test_precedence() {
        let program = parse_src("x:=1+2*3;");
        match &program.statements[0].kind {
            StmtKind::VarDecl { init, .. } => match &init.as_ref().unwrap().kind {
                ExprKind::Binary { op, right, .. } => {
                    assert_eq!(*op, BinaryOp::Add);
                    assert!(matches!(
                        right.kind,
                        ExprKind::Binary {
                            op: BinaryOp::Mul,
                            ..
                        }
                    ));
                }
                other => panic!("expected Binary, got {other:?}"),
            },
            other => panic!("expected VarDecl, got {other:?}"),
        }
    }

    #[test]
    fn test_power_right_associative() {
        let program = parse_src("x:=2**3**2;");
        match &program.statements[0].kind {
            StmtKind::VarDecl { init, .. } => match &init.as_ref().unwrap().kind {
                ExprKind::Binary { op, right, .. } => {
                    assert_eq!(*op, BinaryOp::Pow);
                    assert!(matches!(
                        right.kind,
                        ExprKind::Binary {
                            op: BinaryOp::Pow,
                            ..
                        }
                    ));
                }
                other => panic!("expected Binary, got {other:?}"),
            },
            other => panic!("expected VarDecl, got {other:?}"),
        }
    }

    #[test]
    fn test_xor_between_or_and_and() {
        // a | b ^ c & d parses as a | (b ^ (c & d))
        let program = parse_src("x:=a|b^c&d;");
        match &program.statements[0].kind {
            StmtKind::VarDecl { init, .. } => match &init.as_ref().unwrap().kind {
                ExprKind::Binary { op, right, .. } => {
                    assert_eq!(*op, BinaryOp::BitOr);
                    match &right.kind {
                        ExprKind::Binary { op, right, .. } => {
                            assert_eq!(*op, BinaryOp::BitXor);
                            assert!(matches!(
                                right.kind,
                                ExprKind::Binary {
                                    op: BinaryOp::BitAnd,
                                    ..
                                }
                            ));
                        }
                        other => panic!("expected xor, got {other:?}"),
                    }
                }
                other => panic!("expected Binary, got {other:?}"),
            },
            other => panic!("expected VarDecl, got {other:?}"),
        }
    }

    #[test]
    fn test_ternary() {
        let program = parse_src("x:=a?1:2;");
        match &program.statements[0].kind {
            StmtKind::VarDecl { init, .. } => {
                assert!(matches!(
                    init.as_ref().unwrap().kind,
                    ExprKind::Ternary { .. }
                ));
            }
            other => panic!("expected VarDecl, got {other:?}"),
        }
    }

    #[test]
    fn test_call_with_trailing_bang() {
        let program = parse_src("n:=toNum(\"abc\")!;");
        match &program.statements[0].kind {
            StmtKind::VarDecl { init, .. } => match &init.as_ref().unwrap().kind {
                ExprKind::Call { throw_on_error, .. } => assert!(*throw_on_error),
                other => panic!("expected Call, got {other:?}"),
            },
            other => panic!("expected VarDecl, got {other:?}"),
        }
    }

    #[test]
    fn test_call_with_leading_bang() {
        let program = parse_src("n:=toNum!(\"abc\");");
        match &program.statements[0].kind {
            StmtKind::VarDecl { init, .. } => match &init.as_ref().unwrap().kind {
                ExprKind::Call { throw_on_error, .. } => assert!(*throw_on_error),
                other => panic!("expected Call, got {other:?}"),
            },
            other => panic!("expected VarDecl, got {other:?}"),
        }
    }

    #[test]
    fn test_chain_desugars_to_links() {
        let program = parse_src("y:=a.>trim().>upper();");
        match &program.statements[0].kind {
            StmtKind::VarDecl { init, .. } => match &init.as_ref().unwrap().kind {
                ExprKind::Chain { links, .. } => {
                    assert_eq!(links.len(), 2);
                    assert_eq!(links[0].name, "trim");
                    assert!(links[0].args.is_some());
                    assert_eq!(links[1].name, "upper");
                }
                other => panic!("expected Chain, got {other:?}"),
            },
            other => panic!("expected VarDecl, got {other:?}"),
        }
    }

    #[test]
    fn test_chain_property_form() {
        let program = parse_src("y:=a.>length;");
        match &program.statements[0].kind {
            StmtKind::VarDecl { init, .. } => match &init.as_ref().unwrap().kind {
                ExprKind::Chain { links, .. } => {
                    assert_eq!(links.len(), 1);
                    assert!(links[0].args.is_none());
                }
                other => panic!("expected Chain, got {other:?}"),
            },
            other => panic!("expected VarDecl, got {other:?}"),
        }
    }

    #[test]
    fn test_member_and_optional_member() {
        let program = parse_src("y:=o.a?.b;");
        match &program.statements[0].kind {
            StmtKind::VarDecl { init, .. } => match &init.as_ref().unwrap().kind {
                ExprKind::Member {
                    object,
                    property,
                    is_optional,
                    ..
                } => {
                    assert_eq!(property, "b");
                    assert!(*is_optional);
                    assert!(matches!(
                        object.kind,
                        ExprKind::Member {
                            is_optional: false,
                            ..
                        }
                    ));
                }
                other => panic!("expected Member, got {other:?}"),
            },
            other => panic!("expected VarDecl, got {other:?}"),
        }
    }

    #[test]
    fn test_if_else_chain() {
        let program = parse_src("if(a){x:=1;}(b){x:=2;}{x:=3;};");
        match &program.statements[0].kind {
            StmtKind::If {
                conditions,
                then_blocks,
                else_block,
            } => {
                assert_eq!(conditions.len(), 2);
                assert_eq!(then_blocks.len(), 2);
                assert!(else_block.is_some());
            }
            other => panic!("expected If, got {other:?}"),
        }
    }

    #[test]
    fn test_for_loop() {
        let program = parse_src("L>(i:=0;i<5;i=i+1){print(i);};");
        match &program.statements[0].kind {
            StmtKind::Loop(loop_stmt) => match &loop_stmt.kind {
                LoopKind::For {
                    init,
                    condition,
                    update,
                } => {
                    assert!(init.is_some());
                    assert!(condition.is_some());
                    assert!(update.is_some());
                }
                other => panic!("expected For, got {other:?}"),
            },
            other => panic!("expected Loop, got {other:?}"),
        }
    }

    #[test]
    fn test_repeat_loop() {
        let program = parse_src("L>[10]{print(1);};");
        match &program.statements[0].kind {
            StmtKind::Loop(loop_stmt) => {
                assert!(matches!(loop_stmt.kind, LoopKind::Repeat(_)));
            }
            other => panic!("expected Loop, got {other:?}"),
        }
    }

    #[test]
    fn test_foreach_loop() {
        let program = parse_src("L>(xs:v){sum=sum+v;};");
        match &program.statements[0].kind {
            StmtKind::Loop(loop_stmt) => match &loop_stmt.kind {
                LoopKind::Foreach { binding, .. } => assert_eq!(binding, "v"),
                other => panic!("expected Foreach, got {other:?}"),
            },
            other => panic!("expected Loop, got {other:?}"),
        }
    }

    #[test]
    fn test_labeled_loop_and_break() {
        let program = parse_src("L>outer(i:=0;i<5;i=i+1){L>(j:=0;j<5;j=j+1){B>outer;};};");
        match &program.statements[0].kind {
            StmtKind::Loop(outer) => {
                assert_eq!(outer.label.as_deref(), Some("outer"));
                match &outer.body.statements[0].kind {
                    StmtKind::Loop(inner) => match &inner.body.statements[0].kind {
                        StmtKind::Break { label } => {
                            assert_eq!(label.as_deref(), Some("outer"));
                        }
                        other => panic!("expected Break, got {other:?}"),
                    },
                    other => panic!("expected inner Loop, got {other:?}"),
                }
            }
            other => panic!("expected Loop, got {other:?}"),
        }
    }

    #[test]
    fn test_try_catch_finally() {
        let program = parse_src("T>{n:=toNum(\"x\")!;}(e){println(e);}{println(1);};");
        match &program.statements[0].kind {
            StmtKind::Try {
                catch_param,
                catch_block,
                finally_block,
                ..
            } => {
                assert_eq!(catch_param.as_deref(), Some("e"));
                assert!(catch_block.is_some());
                assert!(finally_block.is_some());
            }
            other => panic!("expected Try, got {other:?}"),
        }
    }

    #[test]
    fn test_array_with_spread() {
        let program = parse_src("xs:=[1,...ys,3];");
        match &program.statements[0].kind {
            StmtKind::VarDecl { init, .. } => match &init.as_ref().unwrap().kind {
                ExprKind::Array { elements, spread } => {
                    assert_eq!(elements.len(), 3);
                    assert_eq!(spread, &vec![false, true, false]);
                }
                other => panic!("expected Array, got {other:?}"),
            },
            other => panic!("expected VarDecl, got {other:?}"),
        }
    }

    #[test]
    fn test_object_literal_keys() {
        let program = parse_src("o:={a:1,\"b c\":2};");
        match &program.statements[0].kind {
            StmtKind::VarDecl { init, .. } => match &init.as_ref().unwrap().kind {
                ExprKind::Object { properties } => {
                    assert_eq!(properties[0].0, "a");
                    assert_eq!(properties[1].0, "b c");
                }
                other => panic!("expected Object, got {other:?}"),
            },
            other => panic!("expected VarDecl, got {other:?}"),
        }
    }

    #[test]
    fn test_index_assignment() {
        let program = parse_src("arr[0]=5;");
        match &program.statements[0].kind {
            StmtKind::Assign { target, .. } => {
                assert!(matches!(target.kind, ExprKind::Index { .. }));
            }
            other => panic!("expected Assign, got {other:?}"),
        }
    }

    #[test]
    fn test_member_assignment() {
        let program = parse_src("obj.k=5;");
        match &program.statements[0].kind {
            StmtKind::Assign { target, .. } => {
                assert!(matches!(target.kind, ExprKind::Member { .. }));
            }
            other => panic!("expected Assign, got {other:?}"),
        }
    }

    #[test]
    fn test_postfix_increment() {
        let program = parse_src("x:=i++;");
        match &program.statements[0].kind {
            StmtKind::VarDecl { init, .. } => match &init.as_ref().unwrap().kind {
                ExprKind::Unary {
                    op, is_postfix, ..
                } => {
                    assert_eq!(*op, UnaryOp::Inc);
                    assert!(*is_postfix);
                }
                other => panic!("expected Unary, got {other:?}"),
            },
            other => panic!("expected VarDecl, got {other:?}"),
        }
    }

    #[test]
    fn test_error_recovery_reports_multiple() {
        let err = try_parse("x:=;y:=;z:=1;").unwrap_err();
        let lines: Vec<&str> = err.lines().collect();
        assert!(lines.len() >= 2, "expected several diagnostics: {err}");
    }

    #[test]
    fn test_self_reference() {
        let program = parse_src("f:=(x){R>self.count+x;};");
        match &program.statements[0].kind {
            StmtKind::FuncDecl(func) => match &func.body.statements[0].kind {
                StmtKind::Return(Some(expr)) => {
                    assert!(matches!(
                        expr.kind,
                        ExprKind::Binary {
                            op: BinaryOp::Add,
                            ..
                        }
                    ));
                }
                other => panic!("expected Return, got {other:?}"),
            },
            other => panic!("expected FuncDecl, got {other:?}"),
        }
    }
}
