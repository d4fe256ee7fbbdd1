use std::iter::Peekable;
use std::rc::Rc;
use std::slice;

use smallvec::{SmallVec, smallvec};

use super::error::ParseError;
use super::node::{Args, BinaryOp, Expr, Ident, Literal, MatchArm, Node, Params, Pattern, Program, UnaryOp};
use crate::TokenArena;
use crate::eval::module::ModuleId;
use crate::lexer::token::{Token, TokenId, TokenKind};
use crate::number::Number;

/// Binary operator precedence, lowest first. `^` is right-associative,
/// everything else associates left:
///
/// `||` < `&&` < `==` `!=` < `<` `<=` `>` `>=` < `..` `..=` < `+` `-`
/// < `*` `/` `%` < `^`
fn binary_op_info(kind: &TokenKind) -> Option<(u8, bool, BinaryOp)> {
    match kind {
        TokenKind::OrOr => Some((1, false, BinaryOp::Or)),
        TokenKind::AndAnd => Some((2, false, BinaryOp::And)),
        TokenKind::EqEq => Some((3, false, BinaryOp::Eq)),
        TokenKind::NotEq => Some((3, false, BinaryOp::Ne)),
        TokenKind::Lt => Some((4, false, BinaryOp::Lt)),
        TokenKind::LtEq => Some((4, false, BinaryOp::Le)),
        TokenKind::Gt => Some((4, false, BinaryOp::Gt)),
        TokenKind::GtEq => Some((4, false, BinaryOp::Ge)),
        TokenKind::RangeExclusive => Some((5, false, BinaryOp::RangeExclusive)),
        TokenKind::RangeInclusive => Some((5, false, BinaryOp::RangeInclusive)),
        TokenKind::Plus => Some((6, false, BinaryOp::Add)),
        TokenKind::Minus => Some((6, false, BinaryOp::Sub)),
        TokenKind::Asterisk => Some((7, false, BinaryOp::Mul)),
        TokenKind::Slash => Some((7, false, BinaryOp::Div)),
        TokenKind::Percent => Some((7, false, BinaryOp::Mod)),
        TokenKind::Caret => Some((8, true, BinaryOp::Pow)),
        _ => None,
    }
}

pub struct Parser<'a> {
    tokens: Peekable<slice::Iter<'a, Rc<Token>>>,
    token_arena: TokenArena,
    module_id: ModuleId,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Rc<Token>], token_arena: TokenArena, module_id: ModuleId) -> Self {
        Self {
            tokens: tokens.iter().peekable(),
            token_arena,
            module_id,
        }
    }

    pub fn parse(&mut self) -> Result<Program, ParseError> {
        let mut program = Vec::new();
        self.skip_separators();

        while !self.at_eof() {
            program.push(Rc::new(self.parse_stmt()?));
            self.expect_statement_end()?;
            self.skip_separators();
        }

        Ok(program)
    }

    fn alloc(&mut self, token: &Rc<Token>) -> TokenId {
        self.token_arena.borrow_mut().alloc(Rc::clone(token))
    }

    fn peek(&mut self) -> Option<&&'a Rc<Token>> {
        self.tokens.peek()
    }

    fn next_token(&mut self) -> Result<&'a Rc<Token>, ParseError> {
        match self.tokens.next() {
            Some(token) if !matches!(token.kind, TokenKind::Eof) => Ok(token),
            _ => Err(ParseError::UnexpectedEOFDetected(self.module_id)),
        }
    }

    fn at_eof(&mut self) -> bool {
        matches!(self.peek().map(|t| &t.kind), None | Some(TokenKind::Eof))
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek().map(|t| &t.kind), Some(TokenKind::NewLine)) {
            self.tokens.next();
        }
    }

    fn skip_separators(&mut self) {
        while matches!(
            self.peek().map(|t| &t.kind),
            Some(TokenKind::NewLine) | Some(TokenKind::SemiColon)
        ) {
            self.tokens.next();
        }
    }

    /// Peeks past newlines without consuming anything.
    fn peek_skipping_newlines(&mut self) -> Option<&'a Rc<Token>> {
        let mut lookahead = self.tokens.clone();
        lookahead.find(|t| !matches!(t.kind, TokenKind::NewLine))
    }

    fn expect_statement_end(&mut self) -> Result<(), ParseError> {
        match self.peek() {
            None => Ok(()),
            Some(token) => match token.kind {
                TokenKind::NewLine
                | TokenKind::SemiColon
                | TokenKind::RBrace
                | TokenKind::Eof => Ok(()),
                _ => Err(ParseError::UnexpectedToken((***token).clone())),
            },
        }
    }

    fn expect_ident(&mut self, expected: &str) -> Result<(Ident, &'a Rc<Token>), ParseError> {
        let token = self.next_token()?;
        match &token.kind {
            TokenKind::Ident(name) => Ok((name.clone(), token)),
            _ => Err(ParseError::ExpectedToken((**token).clone(), expected.to_string())),
        }
    }

    fn expect_kind(&mut self, kind: TokenKind, expected: &str) -> Result<&'a Rc<Token>, ParseError> {
        let token = self.next_token()?;
        if token.kind == kind {
            Ok(token)
        } else {
            Err(ParseError::ExpectedToken((**token).clone(), expected.to_string()))
        }
    }

    fn parse_stmt(&mut self) -> Result<Node, ParseError> {
        match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Def) => self.parse_def(),
            Some(TokenKind::Use) => self.parse_use(),
            Some(TokenKind::Return) => self.parse_return(),
            _ => {
                if self.lookahead_is_assignment() {
                    self.parse_assign()
                } else {
                    self.parse_expr()
                }
            }
        }
    }

    /// `x = ...` / `x, y = ...` requires unbounded lookahead over the
    /// name list, done on a cloned iterator.
    fn lookahead_is_assignment(&mut self) -> bool {
        let mut lookahead = self.tokens.clone();
        if !matches!(lookahead.next().map(|t| &t.kind), Some(TokenKind::Ident(_))) {
            return false;
        }
        loop {
            match lookahead.next().map(|t| &t.kind) {
                Some(TokenKind::Equal) => return true,
                Some(TokenKind::Comma) => {
                    if !matches!(lookahead.next().map(|t| &t.kind), Some(TokenKind::Ident(_))) {
                        return false;
                    }
                }
                _ => return false,
            }
        }
    }

    fn parse_assign(&mut self) -> Result<Node, ParseError> {
        let mut names: SmallVec<[Ident; 2]> = smallvec![];
        let (name, first_token) = self.expect_ident("an identifier")?;
        let token_id = self.alloc(first_token);
        names.push(name);

        while matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Comma)) {
            self.tokens.next();
            let (name, _) = self.expect_ident("an identifier")?;
            names.push(name);
        }

        self.expect_kind(TokenKind::Equal, "\"=\"")?;
        self.skip_newlines();

        let mut values: SmallVec<[Rc<Node>; 2]> = smallvec![Rc::new(self.parse_expr()?)];
        while matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Comma)) {
            self.tokens.next();
            self.skip_newlines();
            values.push(Rc::new(self.parse_expr()?));
        }

        Ok(Node {
            token_id,
            expr: Rc::new(Expr::Assign(names, values)),
        })
    }

    fn parse_def(&mut self) -> Result<Node, ParseError> {
        let def_token = self.next_token()?;
        let token_id = self.alloc(def_token);
        let (name, _) = self.expect_ident("a function name")?;
        self.expect_kind(TokenKind::LParen, "\"(\"")?;
        let params = self.parse_params()?;
        let body = Rc::new(self.parse_block()?);

        Ok(Node {
            token_id,
            expr: Rc::new(Expr::Def(name, params, body)),
        })
    }

    fn parse_params(&mut self) -> Result<Params, ParseError> {
        let mut params: Params = smallvec![];
        self.skip_newlines();

        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::RParen)) {
            self.tokens.next();
            return Ok(params);
        }

        loop {
            let (name, _) = self.expect_ident("a parameter name")?;
            params.push(name);
            self.skip_newlines();

            let token = self.next_token()?;
            match token.kind {
                TokenKind::Comma => self.skip_newlines(),
                TokenKind::RParen => return Ok(params),
                _ => return Err(ParseError::ExpectedClosingParen((**token).clone())),
            }
        }
    }

    fn parse_use(&mut self) -> Result<Node, ParseError> {
        let use_token = self.next_token()?;
        let token_id = self.alloc(use_token);
        let (root, token) = self.expect_ident("a module path")?;
        if root != "std" {
            return Err(ParseError::ExpectedToken(
                (**token).clone(),
                "\"std\"".to_string(),
            ));
        }
        self.expect_kind(TokenKind::Slash, "\"/\"")?;
        let (name, _) = self.expect_ident("a module name")?;

        Ok(Node {
            token_id,
            expr: Rc::new(Expr::Use(name)),
        })
    }

    fn parse_return(&mut self) -> Result<Node, ParseError> {
        let return_token = self.next_token()?;
        let token_id = self.alloc(return_token);
        let value = match self.peek().map(|t| &t.kind) {
            None
            | Some(TokenKind::NewLine)
            | Some(TokenKind::SemiColon)
            | Some(TokenKind::RBrace)
            | Some(TokenKind::Eof) => None,
            _ => Some(Rc::new(self.parse_expr()?)),
        };

        Ok(Node {
            token_id,
            expr: Rc::new(Expr::Return(value)),
        })
    }

    fn parse_expr(&mut self) -> Result<Node, ParseError> {
        self.parse_binary_op_expr(0)
    }

    fn parse_binary_op_expr(&mut self, min_precedence: u8) -> Result<Node, ParseError> {
        let mut lhs = self.parse_unary_expr()?;

        // a newline ends the expression, so operators continuing one must
        // stay on the same line
        loop {
            let info = self.peek().and_then(|token| binary_op_info(&token.kind));
            let Some((precedence, right_assoc, op)) = info else {
                break;
            };
            if precedence < min_precedence {
                break;
            }
            let op_token = self.next_token()?;
            let token_id = self.alloc(op_token);
            self.skip_newlines();
            let next_min = if right_assoc { precedence } else { precedence + 1 };
            let rhs = self.parse_binary_op_expr(next_min)?;
            lhs = Node {
                token_id,
                expr: Rc::new(Expr::BinaryOp(op, Rc::new(lhs), Rc::new(rhs))),
            };
        }

        Ok(lhs)
    }

    fn parse_unary_expr(&mut self) -> Result<Node, ParseError> {
        let op = match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Minus) => Some(UnaryOp::Neg),
            Some(TokenKind::Not) => Some(UnaryOp::Not),
            _ => None,
        };

        match op {
            Some(op) => {
                let op_token = self.next_token()?;
                let token_id = self.alloc(op_token);
                let operand = self.parse_unary_expr()?;
                Ok(Node {
                    token_id,
                    expr: Rc::new(Expr::UnaryOp(op, Rc::new(operand))),
                })
            }
            None => self.parse_postfix_expr(),
        }
    }

    fn parse_postfix_expr(&mut self) -> Result<Node, ParseError> {
        let mut node = self.parse_primary_expr()?;

        loop {
            match self.peek().map(|t| &t.kind) {
                Some(TokenKind::LParen) => {
                    let paren_token = self.next_token()?;
                    let token_id = self.alloc(paren_token);
                    let args = self.parse_args()?;
                    node = Node {
                        token_id,
                        expr: Rc::new(Expr::Call(Rc::new(node), args)),
                    };
                }
                Some(TokenKind::LBracket) => {
                    let bracket_token = self.next_token()?;
                    let token_id = self.alloc(bracket_token);
                    self.skip_newlines();
                    let index = self.parse_expr()?;
                    self.skip_newlines();
                    let close = self.next_token()?;
                    if close.kind != TokenKind::RBracket {
                        return Err(ParseError::ExpectedClosingBracket((**close).clone()));
                    }
                    node = Node {
                        token_id,
                        expr: Rc::new(Expr::Index(Rc::new(node), Rc::new(index))),
                    };
                }
                Some(TokenKind::Dot) => {
                    let dot_token = self.next_token()?;
                    let token_id = self.alloc(dot_token);
                    let (name, _) = self.expect_ident("a member name")?;
                    node = Node {
                        token_id,
                        expr: Rc::new(Expr::Access(Rc::new(node), name)),
                    };
                }
                Some(TokenKind::Superscript(exp)) => {
                    let exp = *exp;
                    let sup_token = self.next_token()?;
                    let token_id = self.alloc(sup_token);
                    node = Node {
                        token_id,
                        expr: Rc::new(Expr::Pow(Rc::new(node), exp)),
                    };
                }
                _ => return Ok(node),
            }
        }
    }

    fn parse_args(&mut self) -> Result<Args, ParseError> {
        let mut args: Args = smallvec![];
        self.skip_newlines();

        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::RParen)) {
            self.tokens.next();
            return Ok(args);
        }

        loop {
            args.push(Rc::new(self.parse_expr()?));
            self.skip_newlines();

            let token = self.next_token()?;
            match token.kind {
                TokenKind::Comma => self.skip_newlines(),
                TokenKind::RParen => return Ok(args),
                _ => return Err(ParseError::ExpectedClosingParen((**token).clone())),
            }
        }
    }

    fn parse_primary_expr(&mut self) -> Result<Node, ParseError> {
        match self.peek().map(|t| &t.kind) {
            Some(TokenKind::NumberLiteral(_))
            | Some(TokenKind::StringLiteral(_))
            | Some(TokenKind::BoolLiteral(_))
            | Some(TokenKind::NilLiteral)
            | Some(TokenKind::NoneLiteral) => {
                let token = self.next_token()?;
                let token_id = self.alloc(token);
                let literal = match &token.kind {
                    TokenKind::NumberLiteral(n) => Literal::Number(*n),
                    TokenKind::StringLiteral(s) => Literal::String(s.clone()),
                    TokenKind::BoolLiteral(b) => Literal::Bool(*b),
                    TokenKind::NilLiteral => Literal::Nil,
                    _ => Literal::None,
                };
                Ok(Node {
                    token_id,
                    expr: Rc::new(Expr::Literal(literal)),
                })
            }
            Some(TokenKind::Ident(_)) => {
                let token = self.next_token()?;
                let token_id = self.alloc(token);
                let TokenKind::Ident(name) = &token.kind else {
                    unreachable!()
                };
                Ok(Node {
                    token_id,
                    expr: Rc::new(Expr::Ident(name.clone())),
                })
            }
            Some(TokenKind::LParen) => {
                self.tokens.next();
                self.skip_newlines();
                let inner = self.parse_expr()?;
                self.skip_newlines();
                let close = self.next_token()?;
                if close.kind != TokenKind::RParen {
                    return Err(ParseError::ExpectedClosingParen((**close).clone()));
                }
                Ok(inner)
            }
            Some(TokenKind::LBracket) => self.parse_list(),
            Some(TokenKind::LBrace) => self.parse_block(),
            Some(TokenKind::If) => self.parse_if(),
            Some(TokenKind::Match) => self.parse_match(),
            Some(TokenKind::For) => self.parse_for(),
            Some(TokenKind::Fn) => self.parse_fn(),
            Some(TokenKind::Try) => self.parse_try(),
            Some(TokenKind::Throw) => self.parse_throw(),
            None | Some(TokenKind::Eof) => Err(ParseError::UnexpectedEOFDetected(self.module_id)),
            Some(_) => {
                let token = self.next_token()?;
                Err(ParseError::UnexpectedToken((**token).clone()))
            }
        }
    }

    fn parse_list(&mut self) -> Result<Node, ParseError> {
        let bracket_token = self.next_token()?;
        let token_id = self.alloc(bracket_token);
        let mut items = Vec::new();
        self.skip_newlines();

        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::RBracket)) {
            self.tokens.next();
            return Ok(Node {
                token_id,
                expr: Rc::new(Expr::List(items)),
            });
        }

        loop {
            items.push(Rc::new(self.parse_expr()?));
            self.skip_newlines();

            let token = self.next_token()?;
            match token.kind {
                TokenKind::Comma => self.skip_newlines(),
                TokenKind::RBracket => {
                    return Ok(Node {
                        token_id,
                        expr: Rc::new(Expr::List(items)),
                    });
                }
                _ => return Err(ParseError::ExpectedClosingBracket((**token).clone())),
            }
        }
    }

    fn parse_block(&mut self) -> Result<Node, ParseError> {
        let brace_token = self.expect_kind(TokenKind::LBrace, "\"{\"")?;
        let token_id = self.alloc(brace_token);
        let mut stmts = Vec::new();

        loop {
            self.skip_separators();
            match self.peek().map(|t| &t.kind) {
                Some(TokenKind::RBrace) => {
                    self.tokens.next();
                    return Ok(Node {
                        token_id,
                        expr: Rc::new(Expr::Block(stmts)),
                    });
                }
                None | Some(TokenKind::Eof) => {
                    return Err(ParseError::ExpectedClosingBrace(Token {
                        range: Default::default(),
                        kind: TokenKind::Eof,
                        module_id: self.module_id,
                    }));
                }
                _ => {
                    stmts.push(Rc::new(self.parse_stmt()?));
                    self.expect_statement_end()?;
                }
            }
        }
    }

    fn parse_if(&mut self) -> Result<Node, ParseError> {
        let if_token = self.next_token()?;
        let token_id = self.alloc(if_token);
        let mut branches = Vec::new();

        let cond = Rc::new(self.parse_expr()?);
        let body = Rc::new(self.parse_block()?);
        branches.push((Some(cond), body));

        while let Some(token) = self.peek_skipping_newlines()
            && matches!(token.kind, TokenKind::Else)
        {
            self.skip_newlines();
            self.tokens.next();

            if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::If)) {
                self.tokens.next();
                let cond = Rc::new(self.parse_expr()?);
                let body = Rc::new(self.parse_block()?);
                branches.push((Some(cond), body));
            } else {
                let body = Rc::new(self.parse_block()?);
                branches.push((None, body));
                break;
            }
        }

        Ok(Node {
            token_id,
            expr: Rc::new(Expr::If(branches)),
        })
    }

    fn parse_match(&mut self) -> Result<Node, ParseError> {
        let match_token = self.next_token()?;
        let token_id = self.alloc(match_token);
        let value = Rc::new(self.parse_expr()?);
        self.skip_newlines();
        self.expect_kind(TokenKind::LBrace, "\"{\"")?;
        let mut arms = Vec::new();

        loop {
            self.skip_separators();
            match self.peek().map(|t| &t.kind) {
                Some(TokenKind::RBrace) => {
                    self.tokens.next();
                    return Ok(Node {
                        token_id,
                        expr: Rc::new(Expr::Match(value, arms)),
                    });
                }
                None | Some(TokenKind::Eof) => {
                    return Err(ParseError::ExpectedClosingBrace(Token {
                        range: Default::default(),
                        kind: TokenKind::Eof,
                        module_id: self.module_id,
                    }));
                }
                _ => {
                    let pattern = self.parse_pattern()?;
                    self.expect_kind(TokenKind::Arrow, "\"=>\"")?;
                    self.skip_newlines();
                    let body = Rc::new(self.parse_expr()?);
                    arms.push(MatchArm { pattern, body });

                    if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Comma)) {
                        self.tokens.next();
                    }
                }
            }
        }
    }

    fn parse_pattern(&mut self) -> Result<Pattern, ParseError> {
        let token = self.next_token()?;
        match &token.kind {
            TokenKind::Ident(name) if name == "_" => Ok(Pattern::Wildcard),
            TokenKind::NoneLiteral => Ok(Pattern::None),
            TokenKind::Ident(name) if name == "Some" || name == "Ok" || name == "Err" => {
                let variant = name.clone();
                self.expect_kind(TokenKind::LParen, "\"(\"")?;
                let (binding, _) = self.expect_ident("a binding name")?;
                self.expect_kind(TokenKind::RParen, "\")\"")?;
                Ok(match variant.as_str() {
                    "Some" => Pattern::Some(binding),
                    "Ok" => Pattern::Ok(binding),
                    _ => Pattern::Err(binding),
                })
            }
            TokenKind::StringLiteral(s) => Ok(Pattern::Literal(Literal::String(s.clone()))),
            TokenKind::BoolLiteral(b) => Ok(Pattern::Literal(Literal::Bool(*b))),
            TokenKind::NilLiteral => Ok(Pattern::Literal(Literal::Nil)),
            TokenKind::NumberLiteral(_) | TokenKind::Minus => {
                let start = self.parse_pattern_number(token)?;
                match self.peek().map(|t| &t.kind) {
                    Some(TokenKind::RangeExclusive) | Some(TokenKind::RangeInclusive) => {
                        let inclusive = matches!(
                            self.next_token()?.kind,
                            TokenKind::RangeInclusive
                        );
                        let end_token = self.next_token()?;
                        let end = self.parse_pattern_number(end_token)?;
                        Ok(Pattern::Range {
                            start,
                            end,
                            inclusive,
                        })
                    }
                    _ => Ok(Pattern::Literal(Literal::Number(start))),
                }
            }
            _ => Err(ParseError::ExpectedToken(
                (**token).clone(),
                "a pattern".to_string(),
            )),
        }
    }

    fn parse_pattern_number(&mut self, token: &Rc<Token>) -> Result<Number, ParseError> {
        match &token.kind {
            TokenKind::NumberLiteral(n) => Ok(*n),
            TokenKind::Minus => {
                let number_token = self.next_token()?;
                match &number_token.kind {
                    TokenKind::NumberLiteral(n) => Ok(-*n),
                    _ => Err(ParseError::ExpectedToken(
                        (**number_token).clone(),
                        "a number".to_string(),
                    )),
                }
            }
            _ => Err(ParseError::ExpectedToken(
                (**token).clone(),
                "a number".to_string(),
            )),
        }
    }

    fn parse_for(&mut self) -> Result<Node, ParseError> {
        let for_token = self.next_token()?;
        let token_id = self.alloc(for_token);
        let (var, _) = self.expect_ident("a loop variable")?;
        self.expect_kind(TokenKind::In, "\"in\"")?;
        let iterable = Rc::new(self.parse_expr()?);
        let body = Rc::new(self.parse_block()?);

        Ok(Node {
            token_id,
            expr: Rc::new(Expr::For(var, iterable, body)),
        })
    }

    fn parse_fn(&mut self) -> Result<Node, ParseError> {
        let fn_token = self.next_token()?;
        let token_id = self.alloc(fn_token);
        self.expect_kind(TokenKind::LParen, "\"(\"")?;
        let params = self.parse_params()?;
        // `fn(x) => expr` is shorthand for a single-expression body
        let body = match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Arrow) => {
                self.tokens.next();
                self.skip_newlines();
                Rc::new(self.parse_expr()?)
            }
            _ => Rc::new(self.parse_block()?),
        };

        Ok(Node {
            token_id,
            expr: Rc::new(Expr::Fn(params, body)),
        })
    }

    fn parse_try(&mut self) -> Result<Node, ParseError> {
        let try_token = self.next_token()?;
        let token_id = self.alloc(try_token);
        let body = Rc::new(self.parse_block()?);

        self.skip_newlines();
        self.expect_kind(TokenKind::Catch, "\"catch\"")?;

        // `catch Kind as e { }` with filter and binding both optional; a
        // bare identifier after `catch` is always the kind filter
        let kind = match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Ident(_)) => {
                let (name, _) = self.expect_ident("an error kind")?;
                Some(name)
            }
            _ => None,
        };
        let binding = match self.peek().map(|t| &t.kind) {
            Some(TokenKind::As) => {
                self.tokens.next();
                let (name, _) = self.expect_ident("a binding name")?;
                Some(name)
            }
            _ => None,
        };
        let catch = Rc::new(self.parse_block()?);

        Ok(Node {
            token_id,
            expr: Rc::new(Expr::Try {
                body,
                kind,
                binding,
                catch,
            }),
        })
    }

    fn parse_throw(&mut self) -> Result<Node, ParseError> {
        let throw_token = self.next_token()?;
        let token_id = self.alloc(throw_token);
        let (kind, _) = self.expect_ident("an error kind")?;
        self.expect_kind(TokenKind::LParen, "\"(\"")?;
        let args = self.parse_args()?;

        Ok(Node {
            token_id,
            expr: Rc::new(Expr::Throw(kind, args)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use rstest::rstest;
    use std::cell::RefCell;

    fn parse(input: &str) -> Result<Program, ParseError> {
        let module_id = ModuleId::new(0);
        let tokens = crate::lexer::Lexer::new()
            .tokenize(input, module_id)
            .expect("tokenize failed");
        let tokens: Vec<Rc<Token>> = tokens
            .into_iter()
            .filter(|t| !matches!(t.kind, TokenKind::Comment(_)))
            .map(Rc::new)
            .collect();
        let token_arena = Rc::new(RefCell::new(Arena::new(tokens.len())));
        Parser::new(&tokens, token_arena, module_id).parse()
    }

    fn exprs(input: &str) -> Vec<Rc<Expr>> {
        parse(input)
            .expect("parse failed")
            .into_iter()
            .map(|node| Rc::clone(&node.expr))
            .collect()
    }

    #[test]
    fn test_precedence_mul_over_add() {
        let program = exprs("1 + 2 * 3");
        let Expr::BinaryOp(BinaryOp::Add, _, rhs) = &*program[0] else {
            panic!("expected Add at the root, got {:?}", program[0]);
        };
        assert!(matches!(&*rhs.expr, Expr::BinaryOp(BinaryOp::Mul, _, _)));
    }

    #[test]
    fn test_precedence_comparison_over_and() {
        let program = exprs("a < b && c > d");
        let Expr::BinaryOp(BinaryOp::And, lhs, rhs) = &*program[0] else {
            panic!("expected And at the root, got {:?}", program[0]);
        };
        assert!(matches!(&*lhs.expr, Expr::BinaryOp(BinaryOp::Lt, _, _)));
        assert!(matches!(&*rhs.expr, Expr::BinaryOp(BinaryOp::Gt, _, _)));
    }

    #[test]
    fn test_pow_right_associative() {
        let program = exprs("2 ^ 3 ^ 2");
        let Expr::BinaryOp(BinaryOp::Pow, _, rhs) = &*program[0] else {
            panic!("expected Pow at the root, got {:?}", program[0]);
        };
        assert!(matches!(&*rhs.expr, Expr::BinaryOp(BinaryOp::Pow, _, _)));
    }

    #[test]
    fn test_superscript_normalizes_to_pow() {
        let program = exprs("x²");
        assert!(matches!(&*program[0], Expr::Pow(_, 2)));

        let program = exprs("(x + 1)³");
        assert!(matches!(&*program[0], Expr::Pow(_, 3)));
    }

    #[test]
    fn test_multi_assign_is_single_node() {
        let program = exprs("x, y = 10, 20");
        let Expr::Assign(names, values) = &*program[0] else {
            panic!("expected Assign, got {:?}", program[0]);
        };
        assert_eq!(names.as_slice(), &[Ident::new("x"), Ident::new("y")]);
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn test_assignment_vs_equality() {
        let program = exprs("x == 1");
        assert!(matches!(&*program[0], Expr::BinaryOp(BinaryOp::Eq, _, _)));

        let program = exprs("x = 1");
        assert!(matches!(&*program[0], Expr::Assign(_, _)));
    }

    #[test]
    fn test_match_arms_in_source_order() {
        let program = exprs("match x {\n  2..5 => \"range\",\n  3 => \"three\",\n  _ => \"other\"\n}");
        let Expr::Match(_, arms) = &*program[0] else {
            panic!("expected Match, got {:?}", program[0]);
        };
        assert_eq!(arms.len(), 3);
        assert!(matches!(
            arms[0].pattern,
            Pattern::Range { inclusive: false, .. }
        ));
        assert!(matches!(arms[1].pattern, Pattern::Literal(Literal::Number(_))));
        assert!(matches!(arms[2].pattern, Pattern::Wildcard));
    }

    #[rstest]
    #[case("match x { Some(v) => v, None => 0 }", 2)]
    #[case("match x { Ok(v) => v, Err(e) => e }", 2)]
    #[case("match x { 1..=9 => 1, \"s\" => 2, true => 3, nil => 4, _ => 5 }", 5)]
    fn test_match_patterns(#[case] input: &str, #[case] arm_count: usize) {
        let program = exprs(input);
        let Expr::Match(_, arms) = &*program[0] else {
            panic!("expected Match, got {:?}", program[0]);
        };
        assert_eq!(arms.len(), arm_count);
    }

    #[test]
    fn test_if_else_chain() {
        let program = exprs("if a { 1 } else if b { 2 } else { 3 }");
        let Expr::If(branches) = &*program[0] else {
            panic!("expected If, got {:?}", program[0]);
        };
        assert_eq!(branches.len(), 3);
        assert!(branches[0].0.is_some());
        assert!(branches[1].0.is_some());
        assert!(branches[2].0.is_none());
    }

    #[test]
    fn test_def_and_lambda() {
        let program = exprs("def add(a, b) { a + b }");
        let Expr::Def(name, params, _) = &*program[0] else {
            panic!("expected Def, got {:?}", program[0]);
        };
        assert_eq!(name, "add");
        assert_eq!(params.len(), 2);

        let program = exprs("f = fn(x) { x * 2 }");
        let Expr::Assign(_, values) = &*program[0] else {
            panic!("expected Assign, got {:?}", program[0]);
        };
        assert!(matches!(&*values[0].expr, Expr::Fn(params, _) if params.len() == 1));
    }

    #[test]
    fn test_try_catch_forms() {
        let program = exprs("try { f() } catch ValueError as e { e }");
        let Expr::Try { kind, binding, .. } = &*program[0] else {
            panic!("expected Try, got {:?}", program[0]);
        };
        assert_eq!(kind.as_deref(), Some("ValueError"));
        assert_eq!(binding.as_deref(), Some("e"));

        let program = exprs("try { f() } catch TypeError { 0 }");
        let Expr::Try { kind, binding, .. } = &*program[0] else {
            panic!("expected Try, got {:?}", program[0]);
        };
        assert_eq!(kind.as_deref(), Some("TypeError"));
        assert!(binding.is_none());

        let program = exprs("try { f() } catch { 0 }");
        let Expr::Try { kind, binding, .. } = &*program[0] else {
            panic!("expected Try, got {:?}", program[0]);
        };
        assert!(kind.is_none());
        assert!(binding.is_none());
    }

    #[test]
    fn test_method_call_sugar() {
        let program = exprs("funcs.push(fn() { 1 })");
        let Expr::Call(callee, args) = &*program[0] else {
            panic!("expected Call, got {:?}", program[0]);
        };
        assert!(matches!(&*callee.expr, Expr::Access(_, name) if name == "push"));
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn test_block_last_statement_is_value() {
        let program = exprs("{\n x = 1\n x + 1\n}");
        let Expr::Block(stmts) = &*program[0] else {
            panic!("expected Block, got {:?}", program[0]);
        };
        assert_eq!(stmts.len(), 2);
        assert!(matches!(&*stmts[1].expr, Expr::BinaryOp(BinaryOp::Add, _, _)));
    }

    #[test]
    fn test_newline_terminates_expression() {
        let program = exprs("a\n-b");
        assert_eq!(program.len(), 2);
        assert!(matches!(&*program[0], Expr::Ident(_)));
        assert!(matches!(&*program[1], Expr::UnaryOp(UnaryOp::Neg, _)));
    }

    #[rstest]
    #[case::unclosed_paren("f(1", true)]
    #[case::unclosed_brace("if a { 1", true)]
    #[case::bad_use_path("use foo/bar", true)]
    #[case::stray_operator("1 + * 2", true)]
    #[case::ok_trailing_newline("1 + 2\n", false)]
    fn test_parse_errors(#[case] input: &str, #[case] is_err: bool) {
        assert_eq!(parse(input).is_err(), is_err);
    }

    #[test]
    fn test_reparse_is_deterministic() {
        let input = "def f(x) { match x { 1..3 => \"a\", _ => \"b\" } }\nf(2)";
        assert_eq!(parse(input).unwrap(), parse(input).unwrap());
    }
}
