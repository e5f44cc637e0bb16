//! Recursive descent parser for the host language.
//!
//! Parses the layout-annotated token stream from the lexer into the
//! [`Module`] tree. The parser handles:
//! - Imports, function definitions and control flow statements
//! - Simple statements separated by `;` or newlines
//! - Expressions with host-language operator precedence

use super::lexer::{tokenize, SpannedToken, Token};
use super::node::*;
use crate::error::ParseError;

/// Parser state
pub struct Parser<'source> {
    source: &'source str,
    tokens: Vec<SpannedToken>,
    pos: usize,
    /// End offset of the last consumed non-layout token
    last_end: usize,
}

impl<'source> Parser<'source> {
    /// Create a new parser from source code
    pub fn new(source: &'source str) -> Result<Self, ParseError> {
        Ok(Self {
            source,
            tokens: tokenize(source)?,
            pos: 0,
            last_end: 0,
        })
    }

    // -------------------------------------------------------------------------
    // Token navigation
    // -------------------------------------------------------------------------

    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .map(|t| &t.token)
            .unwrap_or(&Token::Eof)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens
            .get(self.pos + offset)
            .map(|t| &t.token)
            .unwrap_or(&Token::Eof)
    }

    fn peek_start(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|t| t.span.start)
            .unwrap_or(self.source.len())
    }

    fn advance(&mut self) -> Token {
        let Some(spanned) = self.tokens.get(self.pos) else {
            return Token::Eof;
        };
        let token = spanned.token.clone();
        if !matches!(
            token,
            Token::Newline | Token::Indent | Token::Dedent | Token::Eof
        ) {
            self.last_end = spanned.span.end;
        }
        self.pos += 1;
        token
    }

    fn at_end(&self) -> bool {
        matches!(self.peek(), Token::Eof)
    }

    fn check(&self, token: &Token) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(token)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ParseError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected {}, found {}", expected, self.peek())))
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match self.peek().clone() {
            Token::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(self.error(format!("expected identifier, found {}", other))),
        }
    }

    fn error(&self, message: String) -> ParseError {
        ParseError::at(self.source, self.peek_start(), message)
    }

    // -------------------------------------------------------------------------
    // Top-level parsing
    // -------------------------------------------------------------------------

    /// Parse a complete module
    pub fn parse_module(&mut self) -> Result<Module, ParseError> {
        let mut body = Vec::new();
        while !self.at_end() {
            if self.eat(&Token::Newline) {
                continue;
            }
            if self.check(&Token::Indent) {
                return Err(self.error("unexpected indent".to_string()));
            }
            body.extend(self.parse_statement()?);
        }
        Ok(Module { body })
    }

    /// Parse a single expression spanning the whole input
    pub fn parse_standalone_expr(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_exprlist()?;
        while self.eat(&Token::Newline) {}
        if !self.at_end() {
            return Err(self.error(format!("unexpected {} after expression", self.peek())));
        }
        Ok(expr)
    }

    /// Parse an indented block or a same-line simple statement list after `:`
    fn parse_suite(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect(&Token::Colon)?;
        if !self.eat(&Token::Newline) {
            return self.parse_simple_line();
        }
        self.expect(&Token::Indent)?;
        let mut body = Vec::new();
        while !self.check(&Token::Dedent) && !self.at_end() {
            if self.eat(&Token::Newline) {
                continue;
            }
            body.extend(self.parse_statement()?);
        }
        self.expect(&Token::Dedent)?;
        Ok(body)
    }

    // -------------------------------------------------------------------------
    // Statement parsing
    // -------------------------------------------------------------------------

    fn parse_statement(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let start = self.peek_start();
        let kind = match self.peek() {
            Token::Def => self.parse_def()?,
            Token::For => self.parse_for()?,
            Token::While => {
                self.advance();
                let test = self.parse_test()?;
                let body = self.parse_suite()?;
                StmtKind::While { test, body }
            }
            Token::If => self.parse_if()?,
            _ => return self.parse_simple_line(),
        };
        Ok(vec![Stmt {
            kind,
            span: Span::new(start, self.last_end),
        }])
    }

    /// `simple (';' simple)* [';'] NEWLINE`
    fn parse_simple_line(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        loop {
            let start = self.peek_start();
            let kind = self.parse_simple()?;
            stmts.push(Stmt {
                kind,
                span: Span::new(start, self.last_end),
            });
            if !self.eat(&Token::Semi) {
                break;
            }
            if self.check(&Token::Newline) || self.at_end() {
                break;
            }
        }
        if !self.eat(&Token::Newline) && !self.at_end() {
            return Err(self.error(format!("expected end of line, found {}", self.peek())));
        }
        Ok(stmts)
    }

    fn parse_simple(&mut self) -> Result<StmtKind, ParseError> {
        match self.peek() {
            Token::Pass => {
                self.advance();
                Ok(StmtKind::Pass)
            }
            Token::Break => {
                self.advance();
                Ok(StmtKind::Break)
            }
            Token::Continue => {
                self.advance();
                Ok(StmtKind::Continue)
            }
            Token::Return => {
                self.advance();
                if self.check(&Token::Newline) || self.check(&Token::Semi) || self.at_end() {
                    Ok(StmtKind::Return(None))
                } else {
                    Ok(StmtKind::Return(Some(self.parse_exprlist()?)))
                }
            }
            Token::Import => self.parse_import(),
            Token::From => self.parse_from_import(),
            _ => self.parse_expr_statement(),
        }
    }

    fn parse_dotted_name(&mut self) -> Result<String, ParseError> {
        let mut name = self.expect_ident()?;
        while self.eat(&Token::Dot) {
            name.push('.');
            name.push_str(&self.expect_ident()?);
        }
        Ok(name)
    }

    fn parse_alias(&mut self, dotted: bool) -> Result<Alias, ParseError> {
        let name = if dotted {
            self.parse_dotted_name()?
        } else {
            self.expect_ident()?
        };
        let asname = if self.eat(&Token::As) {
            Some(self.expect_ident()?)
        } else {
            None
        };
        Ok(Alias { name, asname })
    }

    fn parse_import(&mut self) -> Result<StmtKind, ParseError> {
        self.expect(&Token::Import)?;
        let mut names = vec![self.parse_alias(true)?];
        while self.eat(&Token::Comma) {
            names.push(self.parse_alias(true)?);
        }
        Ok(StmtKind::Import(names))
    }

    fn parse_from_import(&mut self) -> Result<StmtKind, ParseError> {
        self.expect(&Token::From)?;
        let module = self.parse_dotted_name()?;
        self.expect(&Token::Import)?;
        if self.eat(&Token::Star) {
            return Ok(StmtKind::ImportFrom {
                module,
                names: Vec::new(),
                star: true,
            });
        }
        let parenthesized = self.eat(&Token::LParen);
        let mut names = vec![self.parse_alias(false)?];
        while self.eat(&Token::Comma) {
            if parenthesized && self.check(&Token::RParen) {
                break;
            }
            names.push(self.parse_alias(false)?);
        }
        if parenthesized {
            self.expect(&Token::RParen)?;
        }
        Ok(StmtKind::ImportFrom {
            module,
            names,
            star: false,
        })
    }

    fn parse_expr_statement(&mut self) -> Result<StmtKind, ParseError> {
        let first = self.parse_exprlist()?;

        if let Some(op) = self.augmented_op() {
            self.advance();
            check_target(&first).map_err(|m| self.error(m))?;
            let value = self.parse_exprlist()?;
            return Ok(StmtKind::AugAssign {
                target: first,
                op,
                value,
            });
        }

        if !self.check(&Token::Eq) {
            return Ok(StmtKind::Expr(first));
        }

        // Chained assignment: t1 = t2 = value
        let mut exprs = vec![first];
        while self.eat(&Token::Eq) {
            exprs.push(self.parse_exprlist()?);
        }
        let value = exprs.pop().unwrap_or(Expr::Constant(Constant::None));
        for target in &exprs {
            check_target(target).map_err(|m| self.error(m))?;
        }
        Ok(StmtKind::Assign {
            targets: exprs,
            value,
        })
    }

    fn augmented_op(&self) -> Option<BinOp> {
        match self.peek() {
            Token::PlusEq => Some(BinOp::Add),
            Token::MinusEq => Some(BinOp::Sub),
            Token::StarEq => Some(BinOp::Mul),
            Token::SlashEq => Some(BinOp::Div),
            Token::DoubleSlashEq => Some(BinOp::FloorDiv),
            Token::PercentEq => Some(BinOp::Mod),
            Token::DoubleStarEq => Some(BinOp::Pow),
            _ => None,
        }
    }

    fn parse_def(&mut self) -> Result<StmtKind, ParseError> {
        self.expect(&Token::Def)?;
        let name = self.expect_ident()?;
        self.expect(&Token::LParen)?;
        let args = self.parse_parameters()?;
        self.expect(&Token::RParen)?;
        let body = self.parse_suite()?;
        Ok(StmtKind::FunctionDef(FunctionDef { name, args, body }))
    }

    fn parse_parameters(&mut self) -> Result<Arguments, ParseError> {
        let mut args = Arguments::default();
        while !self.check(&Token::RParen) {
            if self.eat(&Token::DoubleStar) {
                args.kwarg = Some(self.expect_ident()?);
            } else if self.eat(&Token::Star) {
                args.vararg = Some(self.expect_ident()?);
            } else {
                if args.vararg.is_some() || args.kwarg.is_some() {
                    return Err(self.error("parameter after *args or **kwargs".to_string()));
                }
                let target = self.parse_param_target()?;
                let default = if self.eat(&Token::Eq) {
                    Some(self.parse_test()?)
                } else {
                    None
                };
                if default.is_none() && args.params.iter().any(|p| p.default.is_some()) {
                    return Err(
                        self.error("non-default parameter follows default parameter".to_string())
                    );
                }
                args.params.push(Param { target, default });
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(args)
    }

    fn parse_param_target(&mut self) -> Result<ParamTarget, ParseError> {
        if self.eat(&Token::LParen) {
            let mut items = vec![self.parse_param_target()?];
            while self.eat(&Token::Comma) {
                if self.check(&Token::RParen) {
                    break;
                }
                items.push(self.parse_param_target()?);
            }
            self.expect(&Token::RParen)?;
            Ok(ParamTarget::Tuple(items))
        } else {
            Ok(ParamTarget::Name(self.expect_ident()?))
        }
    }

    fn parse_for(&mut self) -> Result<StmtKind, ParseError> {
        self.expect(&Token::For)?;
        let target = self.parse_target_list()?;
        check_target(&target).map_err(|m| self.error(m))?;
        self.expect(&Token::In)?;
        let iter = self.parse_exprlist()?;
        let body = self.parse_suite()?;
        Ok(StmtKind::For { target, iter, body })
    }

    /// Loop targets stop before `in`, so comparisons are not parsed here.
    fn parse_target_list(&mut self) -> Result<Expr, ParseError> {
        let first = self.parse_arith()?;
        if !self.check(&Token::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&Token::Comma) {
            if self.check(&Token::In) {
                break;
            }
            items.push(self.parse_arith()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn parse_if(&mut self) -> Result<StmtKind, ParseError> {
        // Consumes `if` or `elif`
        self.advance();
        let test = self.parse_test()?;
        let body = self.parse_suite()?;
        let orelse = match self.peek() {
            Token::Elif => {
                let start = self.peek_start();
                let kind = self.parse_if()?;
                vec![Stmt {
                    kind,
                    span: Span::new(start, self.last_end),
                }]
            }
            Token::Else => {
                self.advance();
                self.parse_suite()?
            }
            _ => Vec::new(),
        };
        Ok(StmtKind::If { test, body, orelse })
    }

    // -------------------------------------------------------------------------
    // Expression parsing
    // -------------------------------------------------------------------------

    /// `test (',' test)* [',']` - a bare comma makes a tuple
    fn parse_exprlist(&mut self) -> Result<Expr, ParseError> {
        let first = self.parse_test()?;
        if !self.check(&Token::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&Token::Comma) {
            if !self.starts_expression() {
                break;
            }
            items.push(self.parse_test()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn starts_expression(&self) -> bool {
        matches!(
            self.peek(),
            Token::Ident(_)
                | Token::Int(_)
                | Token::Float(_)
                | Token::Str(_)
                | Token::True
                | Token::False
                | Token::None_
                | Token::LParen
                | Token::LBracket
                | Token::LBrace
                | Token::Minus
                | Token::Plus
                | Token::Not
        )
    }

    /// `or_test ['if' or_test 'else' test]`
    fn parse_test(&mut self) -> Result<Expr, ParseError> {
        let body = self.parse_or()?;
        if !self.check(&Token::If) {
            return Ok(body);
        }
        self.advance();
        let test = self.parse_or()?;
        self.expect(&Token::Else)?;
        let orelse = self.parse_test()?;
        Ok(Expr::IfExp {
            test: Box::new(test),
            body: Box::new(body),
            orelse: Box::new(orelse),
        })
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let first = self.parse_and()?;
        if !self.check(&Token::Or) {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat(&Token::Or) {
            values.push(self.parse_and()?);
        }
        Ok(Expr::BoolOp {
            op: BoolOp::Or,
            values,
        })
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let first = self.parse_not()?;
        if !self.check(&Token::And) {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat(&Token::And) {
            values.push(self.parse_not()?);
        }
        Ok(Expr::BoolOp {
            op: BoolOp::And,
            values,
        })
    }

    fn parse_not(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&Token::Not) {
            let operand = self.parse_not()?;
            return Ok(Expr::UnaryOp {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn comparison_op(&mut self) -> Option<CmpOp> {
        let op = match self.peek() {
            Token::EqEq => CmpOp::Eq,
            Token::NotEq => CmpOp::NotEq,
            Token::Lt => CmpOp::Lt,
            Token::Le => CmpOp::LtE,
            Token::Gt => CmpOp::Gt,
            Token::Ge => CmpOp::GtE,
            Token::In => CmpOp::In,
            Token::Not if matches!(self.peek_at(1), Token::In) => {
                self.advance();
                CmpOp::NotIn
            }
            Token::Is if matches!(self.peek_at(1), Token::Not) => {
                self.advance();
                CmpOp::IsNot
            }
            Token::Is => CmpOp::Is,
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_arith()?;
        let mut ops = Vec::new();
        let mut comparators = Vec::new();
        while let Some(op) = self.comparison_op() {
            ops.push(op);
            comparators.push(self.parse_arith()?);
        }
        if ops.is_empty() {
            return Ok(left);
        }
        Ok(Expr::Compare {
            left: Box::new(left),
            ops,
            comparators,
        })
    }

    fn parse_arith(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_term()?;
            left = Expr::BinOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
    }

    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::DoubleSlash => BinOp::FloorDiv,
                Token::Percent => BinOp::Mod,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_factor()?;
            left = Expr::BinOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
    }

    fn parse_factor(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek() {
            Token::Minus => UnaryOp::Neg,
            Token::Plus => UnaryOp::Pos,
            _ => return self.parse_power(),
        };
        self.advance();
        let operand = self.parse_factor()?;
        Ok(Expr::UnaryOp {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_power(&mut self) -> Result<Expr, ParseError> {
        let base = self.parse_postfix()?;
        if !self.eat(&Token::DoubleStar) {
            return Ok(base);
        }
        let exponent = self.parse_factor()?;
        Ok(Expr::BinOp {
            left: Box::new(base),
            op: BinOp::Pow,
            right: Box::new(exponent),
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_atom()?;
        loop {
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    let attr = self.expect_ident()?;
                    expr = Expr::Attribute {
                        value: Box::new(expr),
                        attr,
                    };
                }
                Token::LParen => {
                    self.advance();
                    let (args, keywords) = self.parse_call_args()?;
                    self.expect(&Token::RParen)?;
                    expr = Expr::Call {
                        func: Box::new(expr),
                        args,
                        keywords,
                    };
                }
                Token::LBracket => {
                    self.advance();
                    let index = self.parse_subscript()?;
                    self.expect(&Token::RBracket)?;
                    expr = Expr::Subscript {
                        value: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_call_args(&mut self) -> Result<(Vec<Expr>, Vec<Keyword>), ParseError> {
        let mut args = Vec::new();
        let mut keywords: Vec<Keyword> = Vec::new();
        while !self.check(&Token::RParen) {
            let is_keyword =
                matches!(self.peek(), Token::Ident(_)) && matches!(self.peek_at(1), Token::Eq);
            if is_keyword {
                let arg = self.expect_ident()?;
                self.expect(&Token::Eq)?;
                if keywords.iter().any(|k| k.arg == arg) {
                    return Err(self.error(format!("keyword argument repeated: {}", arg)));
                }
                let value = self.parse_test()?;
                keywords.push(Keyword { arg, value });
            } else {
                if !keywords.is_empty() {
                    return Err(
                        self.error("positional argument follows keyword argument".to_string())
                    );
                }
                args.push(self.parse_test()?);
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok((args, keywords))
    }

    fn parse_subscript(&mut self) -> Result<Expr, ParseError> {
        let first = self.parse_slice_item()?;
        if !self.check(&Token::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&Token::Comma) {
            if self.check(&Token::RBracket) {
                break;
            }
            items.push(self.parse_slice_item()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn parse_slice_item(&mut self) -> Result<Expr, ParseError> {
        let lower = if self.check(&Token::Colon) {
            None
        } else {
            let expr = self.parse_test()?;
            if !self.check(&Token::Colon) {
                return Ok(expr);
            }
            Some(Box::new(expr))
        };
        self.expect(&Token::Colon)?;
        let upper = if self.check(&Token::Colon)
            || self.check(&Token::RBracket)
            || self.check(&Token::Comma)
        {
            None
        } else {
            Some(Box::new(self.parse_test()?))
        };
        let step = if self.eat(&Token::Colon)
            && !self.check(&Token::RBracket)
            && !self.check(&Token::Comma)
        {
            Some(Box::new(self.parse_test()?))
        } else {
            None
        };
        Ok(Expr::Slice { lower, upper, step })
    }

    fn parse_atom(&mut self) -> Result<Expr, ParseError> {
        match self.peek().clone() {
            Token::Ident(name) => {
                self.advance();
                Ok(Expr::Name(name))
            }
            Token::Int(n) => {
                self.advance();
                Ok(Expr::Constant(Constant::Int(n)))
            }
            Token::Float(n) => {
                self.advance();
                Ok(Expr::Constant(Constant::Float(n)))
            }
            Token::Str(s) => {
                self.advance();
                // Adjacent literals concatenate
                let mut text = s;
                while let Token::Str(more) = self.peek().clone() {
                    self.advance();
                    text.push_str(&more);
                }
                Ok(Expr::Constant(Constant::Str(text)))
            }
            Token::True => {
                self.advance();
                Ok(Expr::Constant(Constant::Bool(true)))
            }
            Token::False => {
                self.advance();
                Ok(Expr::Constant(Constant::Bool(false)))
            }
            Token::None_ => {
                self.advance();
                Ok(Expr::Constant(Constant::None))
            }
            Token::LParen => self.parse_paren(),
            Token::LBracket => self.parse_list(),
            Token::LBrace => self.parse_dict(),
            other => Err(self.error(format!("unexpected {} in expression", other))),
        }
    }

    fn parse_paren(&mut self) -> Result<Expr, ParseError> {
        self.expect(&Token::LParen)?;
        if self.eat(&Token::RParen) {
            return Ok(Expr::Tuple(Vec::new()));
        }
        let first = self.parse_test()?;
        if self.eat(&Token::RParen) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&Token::Comma) {
            if self.check(&Token::RParen) {
                break;
            }
            items.push(self.parse_test()?);
        }
        self.expect(&Token::RParen)?;
        Ok(Expr::Tuple(items))
    }

    fn parse_list(&mut self) -> Result<Expr, ParseError> {
        self.expect(&Token::LBracket)?;
        if self.eat(&Token::RBracket) {
            return Ok(Expr::List(Vec::new()));
        }
        let first = self.parse_test()?;
        if self.eat(&Token::For) {
            let target = self.parse_target_list()?;
            check_target(&target).map_err(|m| self.error(m))?;
            self.expect(&Token::In)?;
            let iter = self.parse_or()?;
            let mut conds = Vec::new();
            while self.eat(&Token::If) {
                conds.push(self.parse_or()?);
            }
            self.expect(&Token::RBracket)?;
            return Ok(Expr::ListComp {
                elt: Box::new(first),
                target: Box::new(target),
                iter: Box::new(iter),
                conds,
            });
        }
        let mut items = vec![first];
        while self.eat(&Token::Comma) {
            if self.check(&Token::RBracket) {
                break;
            }
            items.push(self.parse_test()?);
        }
        self.expect(&Token::RBracket)?;
        Ok(Expr::List(items))
    }

    fn parse_dict(&mut self) -> Result<Expr, ParseError> {
        self.expect(&Token::LBrace)?;
        let mut entries = Vec::new();
        while !self.check(&Token::RBrace) {
            let key = self.parse_test()?;
            self.expect(&Token::Colon)?;
            let value = self.parse_test()?;
            entries.push((key, value));
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RBrace)?;
        Ok(Expr::Dict(entries))
    }
}

/// Reject expressions that cannot be assigned to.
fn check_target(target: &Expr) -> Result<(), String> {
    match target {
        Expr::Name(_) | Expr::Attribute { .. } | Expr::Subscript { .. } => Ok(()),
        Expr::Tuple(items) | Expr::List(items) if !items.is_empty() => {
            items.iter().try_for_each(check_target)
        }
        _ => Err("cannot assign to expression".to_string()),
    }
}

/// Parse source text into a module.
pub fn parse(source: &str) -> Result<Module, ParseError> {
    Parser::new(source)?.parse_module()
}

/// Parse source text holding a single expression.
pub fn parse_expression(source: &str) -> Result<Expr, ParseError> {
    Parser::new(source)?.parse_standalone_expr()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first(src: &str) -> StmtKind {
        parse(src).unwrap().body.remove(0).kind
    }

    #[test]
    fn test_assignment_of_call() {
        match first("c = add(a, b)") {
            StmtKind::Assign { targets, value } => {
                assert_eq!(targets, vec![Expr::name("c")]);
                assert!(matches!(value, Expr::Call { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_semicolon_separated_statements() {
        let module = parse("a = 1; b = 2\nc = 3").unwrap();
        assert_eq!(module.body.len(), 3);
    }

    #[test]
    fn test_statement_spans_cover_text() {
        let src = "x = 1\nfor i in xs:\n    y = i\nz = 2\n";
        let module = parse(src).unwrap();
        assert_eq!(module.body[0].span.text(src), "x = 1");
        assert_eq!(module.body[1].span.text(src), "for i in xs:\n    y = i");
        assert_eq!(module.body[2].span.text(src), "z = 2");
    }

    #[test]
    fn test_def_with_defaults_and_star_args() {
        match first("def f(a, (b, c), d=1, *rest, **kw):\n    return a\n") {
            StmtKind::FunctionDef(def) => {
                assert_eq!(def.name, "f");
                assert_eq!(def.args.params.len(), 3);
                assert_eq!(def.args.vararg.as_deref(), Some("rest"));
                assert_eq!(def.args.kwarg.as_deref(), Some("kw"));
                assert_eq!(
                    def.args.params[1].target.names(),
                    vec!["b".to_string(), "c".to_string()]
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_elif_nests_in_orelse() {
        match first("if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\n") {
            StmtKind::If { orelse, .. } => {
                assert_eq!(orelse.len(), 1);
                assert!(matches!(orelse[0].kind, StmtKind::If { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_power_binds_tighter_than_unary() {
        let expr = parse_expression("-2 ** 2").unwrap();
        assert!(matches!(
            expr,
            Expr::UnaryOp {
                op: UnaryOp::Neg,
                ..
            }
        ));
    }

    #[test]
    fn test_not_in_and_is_not() {
        match parse_expression("a not in b is not c").unwrap() {
            Expr::Compare { ops, .. } => assert_eq!(ops, vec![CmpOp::NotIn, CmpOp::IsNot]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_star_import() {
        assert!(matches!(
            first("from m import *"),
            StmtKind::ImportFrom { star: true, .. }
        ));
    }

    #[test]
    fn test_list_comprehension() {
        assert!(matches!(
            parse_expression("[x * 2 for x in xs if x > 1]").unwrap(),
            Expr::ListComp { .. }
        ));
    }

    #[test]
    fn test_slices() {
        match parse_expression("a[1:]").unwrap() {
            Expr::Subscript { index, .. } => assert!(matches!(
                *index,
                Expr::Slice {
                    lower: Some(_),
                    upper: None,
                    step: None
                }
            )),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_errors_carry_location() {
        let err = parse("a = 1\nb = (2\n").unwrap_err();
        assert_eq!(err.line, 3);
        let err = parse("1 = a").unwrap_err();
        assert!(err.message.contains("cannot assign"));
    }

    #[test]
    fn test_single_line_suite() {
        match first("for x in xs: y = x; z = y") {
            StmtKind::For { body, .. } => assert_eq!(body.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unexpected_indent() {
        assert!(parse("  a = 1").is_err());
    }
}
