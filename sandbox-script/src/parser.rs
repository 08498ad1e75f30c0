use crate::ast::*;
use crate::error::{Result, ScriptError, Span};
use crate::lexer::{unescape_str, SpannedToken, Token};
use logos::Logos;
use std::sync::Arc;

/// Default bound on syntactic nesting (brackets, operators, blocks, tags)
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Recursive-descent parser for component scripts
///
/// Tokens are pulled from the lexer on demand. JSX text cannot be tokenized
/// ahead of time, so the JSX routines scan raw source and then restart the
/// lexer at the first byte after the construct they consumed.
pub struct Parser<'src> {
    pub(crate) source: &'src str,
    lexer: logos::Lexer<'src, Token>,
    base: usize,
    peeked: Option<SpannedToken>,
    /// End offset of the last consumed token
    pub(crate) last_end: usize,
    function_depth: usize,
    allow_top_level_return: bool,
    /// Current syntactic nesting
    depth: usize,
    max_depth: usize,
}

struct Snapshot<'src> {
    lexer: logos::Lexer<'src, Token>,
    base: usize,
    peeked: Option<SpannedToken>,
    last_end: usize,
}

#[derive(Clone, Copy)]
enum InfixOp {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

fn infix_op(token: &Token) -> Option<(u8, InfixOp)> {
    let op = match token {
        Token::Nullish => (1, InfixOp::Logical(LogicalOp::Nullish)),
        Token::OrOr => (1, InfixOp::Logical(LogicalOp::Or)),
        Token::AndAnd => (2, InfixOp::Logical(LogicalOp::And)),
        Token::EqEq => (3, InfixOp::Binary(BinaryOp::Eq)),
        Token::NotEq => (3, InfixOp::Binary(BinaryOp::Ne)),
        Token::EqEqEq => (3, InfixOp::Binary(BinaryOp::StrictEq)),
        Token::NotEqEq => (3, InfixOp::Binary(BinaryOp::StrictNe)),
        Token::Lt => (4, InfixOp::Binary(BinaryOp::Lt)),
        Token::Le => (4, InfixOp::Binary(BinaryOp::Le)),
        Token::Gt => (4, InfixOp::Binary(BinaryOp::Gt)),
        Token::Ge => (4, InfixOp::Binary(BinaryOp::Ge)),
        Token::Plus => (5, InfixOp::Binary(BinaryOp::Add)),
        Token::Minus => (5, InfixOp::Binary(BinaryOp::Sub)),
        Token::Star => (6, InfixOp::Binary(BinaryOp::Mul)),
        Token::Slash => (6, InfixOp::Binary(BinaryOp::Div)),
        Token::Percent => (6, InfixOp::Binary(BinaryOp::Rem)),
        _ => return None,
    };
    Some(op)
}

/// Format a numeric object key the way JavaScript stringifies it
fn number_key(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str) -> Self {
        Self::at(source, 0)
    }

    /// Parser positioned at `offset` within `source`; spans stay absolute
    pub(crate) fn at(source: &'src str, offset: usize) -> Self {
        Self {
            source,
            lexer: Token::lexer(&source[offset..]),
            base: offset,
            peeked: None,
            last_end: offset,
            function_depth: 0,
            allow_top_level_return: false,
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Accept `return` at the top level (the program is a function body)
    pub fn allow_return(mut self) -> Self {
        self.allow_top_level_return = true;
        self
    }

    /// Reject input nested deeper than `max_depth`
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Run `parse` one nesting level deeper
    pub(crate) fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.enter(1)?;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn enter(&mut self, levels: usize) -> Result<()> {
        if self.depth + levels > self.max_depth {
            let span = self.peek()?.span;
            return Err(ScriptError::parser(span, "Maximum nesting depth exceeded"));
        }
        self.depth += levels;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Token plumbing
    // ------------------------------------------------------------------

    /// Restart lexing at an absolute offset
    pub(crate) fn reset_to(&mut self, offset: usize) {
        self.lexer = Token::lexer(&self.source[offset..]);
        self.base = offset;
        self.peeked = None;
        self.last_end = offset;
    }

    fn snapshot(&self) -> Snapshot<'src> {
        Snapshot {
            lexer: self.lexer.clone(),
            base: self.base,
            peeked: self.peeked.clone(),
            last_end: self.last_end,
        }
    }

    fn restore(&mut self, snapshot: Snapshot<'src>) {
        self.lexer = snapshot.lexer;
        self.base = snapshot.base;
        self.peeked = snapshot.peeked;
        self.last_end = snapshot.last_end;
    }

    fn lex_next(&mut self) -> Result<SpannedToken> {
        match self.lexer.next() {
            Some(Ok(token)) => {
                let range = self.lexer.span();
                let span = Span::new(self.base + range.start, self.base + range.end);
                let gap_start = self.last_end.min(span.start);
                let newline_before = self.source[gap_start..span.start].contains('\n');
                Ok(SpannedToken {
                    token,
                    span,
                    newline_before,
                })
            }
            Some(Err(_)) => {
                let range = self.lexer.span();
                Err(ScriptError::lexer(
                    Span::new(self.base + range.start, self.base + range.end),
                    "Invalid or unexpected token",
                ))
            }
            None => {
                let end = self.source.len();
                let gap_start = self.last_end.min(end);
                Ok(SpannedToken {
                    token: Token::Eof,
                    span: Span::new(end, end),
                    newline_before: self.source[gap_start..].contains('\n'),
                })
            }
        }
    }

    pub(crate) fn peek(&mut self) -> Result<&SpannedToken> {
        let token = match self.peeked.take() {
            Some(token) => token,
            None => self.lex_next()?,
        };
        Ok(self.peeked.insert(token))
    }

    pub(crate) fn advance(&mut self) -> Result<SpannedToken> {
        let token = match self.peeked.take() {
            Some(token) => token,
            None => self.lex_next()?,
        };
        if token.token != Token::Eof {
            self.last_end = token.span.end;
        }
        Ok(token)
    }

    /// Check if current token matches expected
    pub(crate) fn check(&mut self, expected: &Token) -> Result<bool> {
        let token = self.peek()?;
        Ok(std::mem::discriminant(&token.token) == std::mem::discriminant(expected))
    }

    /// Consume token if it matches
    pub(crate) fn eat(&mut self, expected: &Token) -> Result<bool> {
        if self.check(expected)? {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Expect a token, error if not found
    pub(crate) fn expect(&mut self, expected: Token) -> Result<SpannedToken> {
        if self.check(&expected)? {
            self.advance()
        } else {
            Err(self.error_here())
        }
    }

    fn eat_contextual(&mut self, word: &str) -> Result<bool> {
        let matches = matches!(&self.peek()?.token, Token::Identifier(name) if name == word);
        if matches {
            self.advance()?;
        }
        Ok(matches)
    }

    fn expect_contextual(&mut self, word: &str) -> Result<()> {
        if self.eat_contextual(word)? {
            Ok(())
        } else {
            Err(self.error_here())
        }
    }

    fn expect_identifier(&mut self) -> Result<(String, Span)> {
        let token = self.advance()?;
        match token.token {
            Token::Identifier(name) => Ok((name, token.span)),
            _ => Err(self.unexpected(&token)),
        }
    }

    /// Identifier or keyword used as a property name (`props.default`)
    fn expect_property_name(&mut self) -> Result<(String, Span)> {
        let token = self.advance()?;
        match token.token {
            Token::Identifier(name) => Ok((name, token.span)),
            ref t if t.is_keyword() => Ok((
                self.source[token.span.start..token.span.end].to_string(),
                token.span,
            )),
            _ => Err(self.unexpected(&token)),
        }
    }

    pub(crate) fn unexpected(&self, token: &SpannedToken) -> ScriptError {
        let message = match &token.token {
            Token::Eof => "Unexpected end of input".to_string(),
            Token::Identifier(name) => format!("Unexpected identifier '{}'", name),
            Token::Number(_) => "Unexpected number".to_string(),
            Token::String(_) => "Unexpected string".to_string(),
            Token::Template(_) => "Unexpected template string".to_string(),
            _ => format!(
                "Unexpected token '{}'",
                &self.source[token.span.start..token.span.end]
            ),
        };
        ScriptError::parser(token.span, message)
    }

    pub(crate) fn error_here(&mut self) -> ScriptError {
        match self.peek() {
            Ok(token) => {
                let token = token.clone();
                self.unexpected(&token)
            }
            Err(err) => err,
        }
    }

    pub(crate) fn span_from(&self, start: usize) -> Span {
        Span::new(start, self.last_end.max(start))
    }

    fn consume_semicolon(&mut self) -> Result<()> {
        let token = self.peek()?.clone();
        match token.token {
            Token::Semicolon => {
                self.advance()?;
                Ok(())
            }
            Token::RBrace | Token::Eof => Ok(()),
            _ if token.newline_before => Ok(()),
            _ => Err(self.unexpected(&token)),
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    /// Parse the entire input as a program
    pub fn parse_program(&mut self) -> Result<Program> {
        let mut body = Vec::new();
        while !self.check(&Token::Eof)? {
            body.push(self.parse_statement()?);
        }
        Ok(Program { body })
    }

    fn parse_statement(&mut self) -> Result<Stmt> {
        self.nested(Self::parse_statement_inner)
    }

    fn parse_statement_inner(&mut self) -> Result<Stmt> {
        let token = self.peek()?.clone();
        match token.token {
            Token::Semicolon => {
                self.advance()?;
                Ok(Stmt::Empty)
            }
            Token::LBrace => {
                self.advance()?;
                Ok(Stmt::Block(self.parse_block_body()?))
            }
            Token::Const | Token::Let | Token::Var => {
                let stmt = self.parse_var_decl()?;
                self.consume_semicolon()?;
                Ok(stmt)
            }
            Token::Function => Ok(Stmt::Function(self.parse_function(true)?)),
            Token::Return => self.parse_return(),
            Token::If => self.parse_if(),
            Token::For => self.parse_for_of(),
            Token::Throw => self.parse_throw(),
            Token::Import | Token::Export if self.function_depth > 0 => Err(ScriptError::parser(
                token.span,
                "'import' and 'export' may only appear at the top level",
            )),
            Token::Import => self.parse_import(),
            Token::Export => self.parse_export(),
            _ => {
                let expr = self.parse_expression()?;
                self.consume_semicolon()?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    /// Statements up to and including the closing brace
    fn parse_block_body(&mut self) -> Result<Vec<Stmt>> {
        let mut body = Vec::new();
        loop {
            if self.eat(&Token::RBrace)? {
                return Ok(body);
            }
            if self.check(&Token::Eof)? {
                return Err(self.error_here());
            }
            body.push(self.parse_statement()?);
        }
    }

    fn parse_var_decl(&mut self) -> Result<Stmt> {
        let start = self.advance()?;
        let kind = match start.token {
            Token::Const => VarKind::Const,
            Token::Let => VarKind::Let,
            _ => VarKind::Var,
        };

        let mut decls = Vec::new();
        loop {
            let pattern = self.parse_binding_pattern()?;
            let init = if self.eat(&Token::Eq)? {
                Some(self.parse_assignment()?)
            } else {
                None
            };

            if init.is_none() {
                let missing = match (&pattern, kind) {
                    (Pattern::Ident(..), VarKind::Const) => {
                        Some("Missing initializer in const declaration")
                    }
                    (Pattern::Ident(..), _) => None,
                    _ => Some("Missing initializer in destructuring declaration"),
                };
                if let Some(message) = missing {
                    return Err(ScriptError::parser(self.span_from(start.span.start), message));
                }
            }

            decls.push(VarDeclarator { pattern, init });
            if !self.eat(&Token::Comma)? {
                break;
            }
        }

        Ok(Stmt::Var {
            kind,
            decls,
            span: self.span_from(start.span.start),
        })
    }

    fn parse_binding_pattern(&mut self) -> Result<Pattern> {
        let token = self.advance()?;
        match token.token {
            Token::Identifier(name) => Ok(Pattern::Ident(name, token.span)),
            Token::LBracket => self.parse_array_pattern(),
            Token::LBrace => self.parse_object_pattern(),
            _ => Err(self.unexpected(&token)),
        }
    }

    fn parse_array_pattern(&mut self) -> Result<Pattern> {
        let mut elements = Vec::new();
        let mut rest = None;
        loop {
            if self.eat(&Token::RBracket)? {
                break;
            }
            if self.eat(&Token::Comma)? {
                elements.push(None);
                continue;
            }
            if self.eat(&Token::Ellipsis)? {
                rest = Some(Box::new(self.parse_binding_pattern()?));
                self.expect(Token::RBracket)?;
                break;
            }

            let pattern = self.parse_binding_pattern()?;
            let default = if self.eat(&Token::Eq)? {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            elements.push(Some(PatternElem { pattern, default }));

            if !self.eat(&Token::Comma)? {
                self.expect(Token::RBracket)?;
                break;
            }
        }
        Ok(Pattern::Array { elements, rest })
    }

    fn parse_object_pattern(&mut self) -> Result<Pattern> {
        let mut props = Vec::new();
        let mut rest = None;
        loop {
            if self.eat(&Token::RBrace)? {
                break;
            }
            if self.eat(&Token::Ellipsis)? {
                rest = Some(self.expect_identifier()?.0);
                self.expect(Token::RBrace)?;
                break;
            }

            let key_token = self.advance()?;
            let (key, key_span) = match key_token.token {
                Token::Identifier(name) => (name, key_token.span),
                Token::String(s) => (s, key_token.span),
                ref t if t.is_keyword() => (
                    self.source[key_token.span.start..key_token.span.end].to_string(),
                    key_token.span,
                ),
                _ => return Err(self.unexpected(&key_token)),
            };

            let value = if self.eat(&Token::Colon)? {
                self.parse_binding_pattern()?
            } else {
                Pattern::Ident(key.clone(), key_span)
            };
            let default = if self.eat(&Token::Eq)? {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            props.push(PropPattern {
                key,
                value,
                default,
            });

            if !self.eat(&Token::Comma)? {
                self.expect(Token::RBrace)?;
                break;
            }
        }
        Ok(Pattern::Object { props, rest })
    }

    fn parse_function(&mut self, require_name: bool) -> Result<Arc<FunctionDef>> {
        let start = self.expect(Token::Function)?.span;
        let name = if matches!(self.peek()?.token, Token::Identifier(_)) {
            Some(self.expect_identifier()?.0)
        } else if require_name {
            return Err(ScriptError::parser(
                self.peek()?.span,
                "Function statements require a function name",
            ));
        } else {
            None
        };

        self.expect(Token::LParen)?;
        let params = self.parse_params()?;
        self.expect(Token::LBrace)?;

        self.function_depth += 1;
        let body = self.parse_block_body();
        self.function_depth -= 1;

        Ok(Arc::new(FunctionDef {
            name,
            params,
            body: FunctionBody::Block(body?),
            is_arrow: false,
            span: self.span_from(start.start),
        }))
    }

    /// Parameter list after the opening parenthesis, through the closing one
    fn parse_params(&mut self) -> Result<Vec<Param>> {
        let mut params = Vec::new();
        loop {
            if self.eat(&Token::RParen)? {
                break;
            }
            let rest = self.eat(&Token::Ellipsis)?;
            let pattern = self.parse_binding_pattern()?;
            let default = if !rest && self.eat(&Token::Eq)? {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            params.push(Param {
                pattern,
                default,
                rest,
            });

            if rest || !self.eat(&Token::Comma)? {
                self.expect(Token::RParen)?;
                break;
            }
        }
        Ok(params)
    }

    fn parse_return(&mut self) -> Result<Stmt> {
        let start = self.advance()?;
        if self.function_depth == 0 && !self.allow_top_level_return {
            return Err(ScriptError::parser(start.span, "Illegal return statement"));
        }

        let next = self.peek()?.clone();
        let value = match next.token {
            Token::Semicolon | Token::RBrace | Token::Eof => None,
            _ if next.newline_before => None,
            _ => Some(self.parse_expression()?),
        };
        self.consume_semicolon()?;

        Ok(Stmt::Return {
            value,
            span: self.span_from(start.span.start),
        })
    }

    fn parse_if(&mut self) -> Result<Stmt> {
        self.advance()?;
        self.expect(Token::LParen)?;
        let test = self.parse_expression()?;
        self.expect(Token::RParen)?;
        let consequent = Box::new(self.parse_statement()?);
        let alternate = if self.eat(&Token::Else)? {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            test,
            consequent,
            alternate,
        })
    }

    /// Only the `for (const x of xs)` form is supported
    fn parse_for_of(&mut self) -> Result<Stmt> {
        let start = self.advance()?;
        self.expect(Token::LParen)?;

        let kind_token = self.advance()?;
        let kind = match kind_token.token {
            Token::Const => VarKind::Const,
            Token::Let => VarKind::Let,
            Token::Var => VarKind::Var,
            _ => return Err(self.unexpected(&kind_token)),
        };
        let pattern = self.parse_binding_pattern()?;
        self.expect_contextual("of")?;
        let iterable = self.parse_expression()?;
        self.expect(Token::RParen)?;
        let body = Box::new(self.parse_statement()?);

        Ok(Stmt::ForOf {
            kind,
            pattern,
            iterable,
            body,
            span: self.span_from(start.span.start),
        })
    }

    fn parse_throw(&mut self) -> Result<Stmt> {
        let start = self.advance()?;
        let next = self.peek()?.clone();
        if next.newline_before {
            return Err(ScriptError::parser(next.span, "Illegal newline after throw"));
        }
        let value = self.parse_expression()?;
        self.consume_semicolon()?;
        Ok(Stmt::Throw {
            value,
            span: self.span_from(start.span.start),
        })
    }

    fn parse_import(&mut self) -> Result<Stmt> {
        let start = self.advance()?;
        let mut specifiers = Vec::new();

        let token = self.peek()?.clone();
        match token.token {
            Token::String(source) => {
                // Side-effect import such as a stylesheet
                self.advance()?;
                self.consume_semicolon()?;
                return Ok(Stmt::Import(ImportDecl {
                    specifiers,
                    source,
                    span: self.span_from(start.span.start),
                }));
            }
            Token::Identifier(local) => {
                self.advance()?;
                specifiers.push(ImportSpecifier::Default { local });
                if self.eat(&Token::Comma)? {
                    self.parse_import_clause(&mut specifiers)?;
                }
            }
            Token::Star | Token::LBrace => self.parse_import_clause(&mut specifiers)?,
            _ => return Err(self.unexpected(&token)),
        }

        self.expect_contextual("from")?;
        let source_token = self.advance()?;
        let source = match source_token.token {
            Token::String(s) => s,
            _ => return Err(self.unexpected(&source_token)),
        };
        self.consume_semicolon()?;

        Ok(Stmt::Import(ImportDecl {
            specifiers,
            source,
            span: self.span_from(start.span.start),
        }))
    }

    fn parse_import_clause(&mut self, specifiers: &mut Vec<ImportSpecifier>) -> Result<()> {
        if self.eat(&Token::Star)? {
            self.expect_contextual("as")?;
            let local = self.expect_identifier()?.0;
            specifiers.push(ImportSpecifier::Namespace { local });
            return Ok(());
        }

        self.expect(Token::LBrace)?;
        loop {
            if self.eat(&Token::RBrace)? {
                break;
            }
            let imported = self.expect_property_name()?.0;
            let local = if self.eat_contextual("as")? {
                self.expect_identifier()?.0
            } else {
                imported.clone()
            };
            specifiers.push(ImportSpecifier::Named { imported, local });

            if !self.eat(&Token::Comma)? {
                self.expect(Token::RBrace)?;
                break;
            }
        }
        Ok(())
    }

    fn parse_export(&mut self) -> Result<Stmt> {
        self.advance()?;

        if self.eat(&Token::Default)? {
            if self.check(&Token::Function)? {
                let func = self.parse_function(false)?;
                if func.name.is_some() {
                    return Ok(Stmt::Export {
                        default: true,
                        decl: Box::new(Stmt::Function(func)),
                    });
                }
                let span = func.span;
                self.eat(&Token::Semicolon)?;
                return Ok(Stmt::ExportDefault(Expr::new(ExprKind::Function(func), span)));
            }
            let expr = self.parse_assignment()?;
            self.consume_semicolon()?;
            return Ok(Stmt::ExportDefault(expr));
        }

        let decl = match self.peek()?.token {
            Token::Function => Stmt::Function(self.parse_function(true)?),
            Token::Const | Token::Let | Token::Var => {
                let stmt = self.parse_var_decl()?;
                self.consume_semicolon()?;
                stmt
            }
            _ => return Err(self.error_here()),
        };
        Ok(Stmt::Export {
            default: false,
            decl: Box::new(decl),
        })
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    pub fn parse_expression(&mut self) -> Result<Expr> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr> {
        self.nested(Self::parse_assignment_inner)
    }

    fn parse_assignment_inner(&mut self) -> Result<Expr> {
        if let Some(arrow) = self.try_parse_arrow()? {
            return Ok(arrow);
        }

        let target = self.parse_conditional()?;
        let op = match self.peek()?.token {
            Token::Eq => AssignOp::Assign,
            Token::PlusEq => AssignOp::AddAssign,
            Token::MinusEq => AssignOp::SubAssign,
            _ => return Ok(target),
        };
        if !matches!(
            target.kind,
            ExprKind::Ident(_) | ExprKind::Member { .. } | ExprKind::Index { .. }
        ) {
            return Err(ScriptError::parser(
                target.span,
                "Invalid left-hand side in assignment",
            ));
        }
        self.advance()?;

        let value = self.parse_assignment()?;
        let span = target.span.to(value.span);
        Ok(Expr::new(
            ExprKind::Assign {
                op,
                target: Box::new(target),
                value: Box::new(value),
            },
            span,
        ))
    }

    fn try_parse_arrow(&mut self) -> Result<Option<Expr>> {
        let token = self.peek()?.clone();
        match token.token {
            Token::Identifier(name) => {
                let snapshot = self.snapshot();
                self.advance()?;
                let is_arrow = {
                    let next = self.peek()?;
                    next.token == Token::Arrow && !next.newline_before
                };
                if !is_arrow {
                    self.restore(snapshot);
                    return Ok(None);
                }
                self.advance()?;
                let params = vec![Param {
                    pattern: Pattern::Ident(name, token.span),
                    default: None,
                    rest: false,
                }];
                self.parse_arrow_body(params, token.span.start).map(Some)
            }
            Token::LParen => {
                if !self.scan_arrow_params() {
                    return Ok(None);
                }
                self.advance()?;
                let params = self.parse_params()?;
                self.expect(Token::Arrow)?;
                self.parse_arrow_body(params, token.span.start).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Look ahead from `(` to its matching `)` and report whether `=>` follows
    fn scan_arrow_params(&mut self) -> bool {
        let snapshot = self.snapshot();
        let result = self.scan_to_matching_paren();
        self.restore(snapshot);
        result
    }

    fn scan_to_matching_paren(&mut self) -> bool {
        let mut depth = 0usize;
        loop {
            let token = match self.advance() {
                Ok(token) => token,
                Err(_) => return false,
            };
            match token.token {
                Token::LParen | Token::LBracket | Token::LBrace => depth += 1,
                Token::RParen | Token::RBracket | Token::RBrace => {
                    depth = depth.saturating_sub(1);
                }
                Token::Lt if depth == 1 => return false,
                Token::Eof => return false,
                _ => {}
            }
            if depth == 0 {
                break;
            }
        }
        matches!(self.peek(), Ok(token) if token.token == Token::Arrow)
    }

    fn parse_arrow_body(&mut self, params: Vec<Param>, start: usize) -> Result<Expr> {
        self.function_depth += 1;
        let body = if self.eat(&Token::LBrace)? {
            self.parse_block_body().map(FunctionBody::Block)
        } else {
            self.parse_assignment()
                .map(|expr| FunctionBody::Expr(Box::new(expr)))
        };
        self.function_depth -= 1;

        let span = self.span_from(start);
        Ok(Expr::new(
            ExprKind::Function(Arc::new(FunctionDef {
                name: None,
                params,
                body: body?,
                is_arrow: true,
                span,
            })),
            span,
        ))
    }

    fn parse_conditional(&mut self) -> Result<Expr> {
        let test = self.parse_binary(1)?;
        if !self.eat(&Token::Question)? {
            return Ok(test);
        }
        let consequent = self.parse_assignment()?;
        self.expect(Token::Colon)?;
        let alternate = self.parse_assignment()?;

        let span = test.span.to(alternate.span);
        Ok(Expr::new(
            ExprKind::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            },
            span,
        ))
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let Some((prec, op)) = infix_op(&self.peek()?.token) else {
                break;
            };
            if prec < min_prec {
                break;
            }
            self.advance()?;
            let right = self.parse_binary(prec + 1)?;
            let span = left.span.to(right.span);
            let kind = match op {
                InfixOp::Binary(op) => ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                InfixOp::Logical(op) => ExprKind::Logical {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            };
            left = Expr::new(kind, span);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let token = self.peek()?.clone();
        let op = match token.token {
            Token::Bang => UnaryOp::Not,
            Token::Minus => UnaryOp::Neg,
            Token::Plus => UnaryOp::Plus,
            Token::Typeof => UnaryOp::Typeof,
            _ => return self.parse_postfix(),
        };
        self.advance()?;
        let operand = self.nested(Self::parse_unary)?;
        let span = token.span.to(operand.span);
        Ok(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span,
        ))
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let expr = if self.check(&Token::New)? {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };

        let mut links = 0;
        let result = self.parse_postfix_links(expr, &mut links);
        self.depth -= links;
        result
    }

    /// Member, index and call suffixes; every link deepens the tree by one
    fn parse_postfix_links(&mut self, mut expr: Expr, links: &mut usize) -> Result<Expr> {
        loop {
            let token = self.peek()?.clone();
            if matches!(
                token.token,
                Token::Dot | Token::QuestionDot | Token::LBracket | Token::LParen
            ) {
                self.enter(1)?;
                *links += 1;
            }
            match token.token {
                Token::Dot => {
                    self.advance()?;
                    let (property, _) = self.expect_property_name()?;
                    expr = self.member(expr, property, false);
                }
                Token::QuestionDot => {
                    self.advance()?;
                    if self.eat(&Token::LParen)? {
                        let args = self.parse_arguments()?;
                        expr = self.call(expr, args, true);
                    } else if self.eat(&Token::LBracket)? {
                        let index = self.parse_expression()?;
                        self.expect(Token::RBracket)?;
                        expr = self.index(expr, index, true);
                    } else {
                        let (property, _) = self.expect_property_name()?;
                        expr = self.member(expr, property, true);
                    }
                }
                Token::LBracket => {
                    self.advance()?;
                    let index = self.parse_expression()?;
                    self.expect(Token::RBracket)?;
                    expr = self.index(expr, index, false);
                }
                Token::LParen => {
                    self.advance()?;
                    let args = self.parse_arguments()?;
                    expr = self.call(expr, args, false);
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn member(&self, object: Expr, property: String, optional: bool) -> Expr {
        let span = self.span_from(object.span.start);
        Expr::new(
            ExprKind::Member {
                object: Box::new(object),
                property,
                optional,
            },
            span,
        )
    }

    fn index(&self, object: Expr, index: Expr, optional: bool) -> Expr {
        let span = self.span_from(object.span.start);
        Expr::new(
            ExprKind::Index {
                object: Box::new(object),
                index: Box::new(index),
                optional,
            },
            span,
        )
    }

    fn call(&self, callee: Expr, args: Vec<ArrayItem>, optional: bool) -> Expr {
        let span = self.span_from(callee.span.start);
        Expr::new(
            ExprKind::Call {
                callee: Box::new(callee),
                args,
                optional,
            },
            span,
        )
    }

    fn parse_new(&mut self) -> Result<Expr> {
        let start = self.advance()?.span;
        let mut callee = self.parse_primary()?;
        while self.eat(&Token::Dot)? {
            let (property, _) = self.expect_property_name()?;
            callee = self.member(callee, property, false);
        }
        let args = if self.eat(&Token::LParen)? {
            self.parse_arguments()?
        } else {
            Vec::new()
        };
        Ok(Expr::new(
            ExprKind::New {
                callee: Box::new(callee),
                args,
            },
            self.span_from(start.start),
        ))
    }

    /// Argument list after the opening parenthesis, through the closing one
    fn parse_arguments(&mut self) -> Result<Vec<ArrayItem>> {
        let mut args = Vec::new();
        loop {
            if self.eat(&Token::RParen)? {
                break;
            }
            if self.eat(&Token::Ellipsis)? {
                args.push(ArrayItem::Spread(self.parse_assignment()?));
            } else {
                args.push(ArrayItem::Expr(self.parse_assignment()?));
            }
            if !self.eat(&Token::Comma)? {
                self.expect(Token::RParen)?;
                break;
            }
        }
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let token = self.peek()?.clone();
        let span = token.span;
        let kind = match token.token {
            Token::Number(n) => {
                self.advance()?;
                ExprKind::Number(n)
            }
            Token::String(s) => {
                self.advance()?;
                ExprKind::String(s)
            }
            Token::Template(raw) => {
                self.advance()?;
                return self.parse_template(&raw, span);
            }
            Token::True => {
                self.advance()?;
                ExprKind::Bool(true)
            }
            Token::False => {
                self.advance()?;
                ExprKind::Bool(false)
            }
            Token::Null => {
                self.advance()?;
                ExprKind::Null
            }
            Token::Identifier(name) => {
                self.advance()?;
                if name == "undefined" {
                    ExprKind::Undefined
                } else {
                    ExprKind::Ident(name)
                }
            }
            Token::LParen => {
                self.advance()?;
                let inner = self.parse_expression()?;
                self.expect(Token::RParen)?;
                return Ok(inner);
            }
            Token::LBracket => {
                self.advance()?;
                return self.parse_array_literal(span.start);
            }
            Token::LBrace => {
                self.advance()?;
                return self.parse_object_literal(span.start);
            }
            Token::Function => {
                let func = self.parse_function(false)?;
                let span = func.span;
                return Ok(Expr::new(ExprKind::Function(func), span));
            }
            Token::Lt => {
                let element = self.parse_jsx_element()?;
                let span = element.span;
                return Ok(Expr::new(ExprKind::Jsx(element), span));
            }
            _ => return Err(self.unexpected(&token)),
        };
        Ok(Expr::new(kind, span))
    }

    fn parse_array_literal(&mut self, start: usize) -> Result<Expr> {
        let mut items = Vec::new();
        loop {
            if self.eat(&Token::RBracket)? {
                break;
            }
            if self.check(&Token::Comma)? {
                let hole = self.advance()?.span;
                items.push(ArrayItem::Expr(Expr::new(ExprKind::Undefined, hole)));
                continue;
            }
            if self.eat(&Token::Ellipsis)? {
                items.push(ArrayItem::Spread(self.parse_assignment()?));
            } else {
                items.push(ArrayItem::Expr(self.parse_assignment()?));
            }
            if !self.eat(&Token::Comma)? {
                self.expect(Token::RBracket)?;
                break;
            }
        }
        Ok(Expr::new(ExprKind::Array(items), self.span_from(start)))
    }

    fn parse_object_literal(&mut self, start: usize) -> Result<Expr> {
        let mut props = Vec::new();
        loop {
            if self.eat(&Token::RBrace)? {
                break;
            }
            if self.eat(&Token::Ellipsis)? {
                props.push(ObjectProp::Spread(self.parse_assignment()?));
            } else {
                let key_token = self.advance()?;
                let (key, shorthand_ok) = match key_token.token {
                    Token::Identifier(ref name) => (PropKey::Named(name.clone()), true),
                    Token::String(ref s) => (PropKey::Named(s.clone()), false),
                    Token::Number(n) => (PropKey::Named(number_key(n)), false),
                    Token::LBracket => {
                        let expr = self.parse_assignment()?;
                        self.expect(Token::RBracket)?;
                        (PropKey::Computed(expr), false)
                    }
                    ref t if t.is_keyword() => (
                        PropKey::Named(
                            self.source[key_token.span.start..key_token.span.end].to_string(),
                        ),
                        false,
                    ),
                    _ => return Err(self.unexpected(&key_token)),
                };

                if self.eat(&Token::Colon)? {
                    props.push(ObjectProp::KeyValue(key, self.parse_assignment()?));
                } else if self.check(&Token::LParen)? {
                    // Method shorthand: `label() { ... }`
                    self.advance()?;
                    let params = self.parse_params()?;
                    self.expect(Token::LBrace)?;
                    self.function_depth += 1;
                    let body = self.parse_block_body();
                    self.function_depth -= 1;
                    let name = match &key {
                        PropKey::Named(name) => Some(name.clone()),
                        PropKey::Computed(_) => None,
                    };
                    let span = self.span_from(key_token.span.start);
                    let func = Arc::new(FunctionDef {
                        name,
                        params,
                        body: FunctionBody::Block(body?),
                        is_arrow: false,
                        span,
                    });
                    props.push(ObjectProp::KeyValue(
                        key,
                        Expr::new(ExprKind::Function(func), span),
                    ));
                } else {
                    match key {
                        PropKey::Named(name) if shorthand_ok => {
                            props.push(ObjectProp::Shorthand(name, key_token.span))
                        }
                        _ => return Err(self.error_here()),
                    }
                }
            }

            if !self.eat(&Token::Comma)? {
                self.expect(Token::RBrace)?;
                break;
            }
        }
        Ok(Expr::new(ExprKind::Object(props), self.span_from(start)))
    }

    /// Split a template body into literal segments and `${}` expressions
    fn parse_template(&mut self, raw: &str, span: Span) -> Result<Expr> {
        let content_start = span.start + 1;
        let bytes = raw.as_bytes();
        let mut quasis = Vec::new();
        let mut exprs = Vec::new();
        let mut i = 0;
        let mut segment_start = 0;

        while i < bytes.len() {
            match bytes[i] {
                b'\\' => i += 2,
                b'$' if bytes.get(i + 1) == Some(&b'{') => {
                    quasis.push(unescape_str(&raw[segment_start..i]));
                    let expr_start = i + 2;
                    let close = find_closing_brace(bytes, expr_start).ok_or_else(|| {
                        ScriptError::parser(span, "Unterminated template literal")
                    })?;

                    let mut inner = Parser::at(self.source, content_start + expr_start);
                    inner.function_depth = self.function_depth;
                    inner.depth = self.depth;
                    inner.max_depth = self.max_depth;
                    let expr = inner.parse_expression()?;
                    let next = inner.peek()?.clone();
                    if next.token != Token::RBrace || next.span.start != content_start + close {
                        return Err(inner.unexpected(&next));
                    }
                    exprs.push(expr);

                    i = close + 1;
                    segment_start = i;
                }
                _ => i += 1,
            }
        }
        quasis.push(unescape_str(&raw[segment_start.min(raw.len())..]));

        Ok(Expr::new(ExprKind::Template { quasis, exprs }, span))
    }
}

fn find_closing_brace(bytes: &[u8], from: usize) -> Option<usize> {
    let mut depth = 1usize;
    for (offset, byte) in bytes[from..].iter().enumerate() {
        match byte {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(from + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse a module-style program (top-level `return` is rejected)
pub fn parse(source: &str) -> Result<Program> {
    Parser::new(source).parse_program()
}

/// Parse a program that forms the body of a function
pub fn parse_function_body(source: &str) -> Result<Program> {
    Parser::new(source).allow_return().parse_program()
}

/// [`parse_function_body`] with a custom nesting bound
pub fn parse_function_body_with_depth(source: &str, max_depth: usize) -> Result<Program> {
    Parser::new(source)
        .allow_return()
        .max_depth(max_depth)
        .parse_program()
}

/// Parse a single expression that must span the whole input
pub fn parse_expression(source: &str) -> Result<Expr> {
    let mut parser = Parser::new(source);
    let expr = parser.parse_expression()?;
    if !parser.check(&Token::Eof)? {
        return Err(parser.error_here());
    }
    Ok(expr)
}
