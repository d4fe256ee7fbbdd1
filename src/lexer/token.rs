use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::arena::ArenaId;
use crate::eval::module::ModuleId;
use crate::number::Number;
use crate::range::Range;

pub type TokenId = ArenaId<Rc<Token>>;

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct Token {
    pub range: Range,
    pub kind: TokenKind,
    pub module_id: ModuleId,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub enum TokenKind {
    Ident(SmolStr),
    NumberLiteral(Number),
    StringLiteral(String),
    BoolLiteral(bool),
    NilLiteral,
    NoneLiteral,
    // keywords
    If,
    Else,
    Match,
    For,
    In,
    Def,
    Fn,
    Try,
    Catch,
    As,
    Throw,
    Use,
    Return,
    // punctuation
    Comma,
    Dot,
    SemiColon,
    Colon,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Arrow,
    // operators
    Equal,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Asterisk,
    Slash,
    Percent,
    Caret,
    /// `²` or `³`, normalized to the exponent it denotes.
    Superscript(u8),
    Not,
    AndAnd,
    OrOr,
    RangeExclusive,
    RangeInclusive,
    Comment(String),
    NewLine,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident(name) => write!(f, "{}", name),
            TokenKind::NumberLiteral(n) => write!(f, "{}", n),
            TokenKind::StringLiteral(s) => write!(f, "\"{}\"", s),
            TokenKind::BoolLiteral(b) => write!(f, "{}", b),
            TokenKind::NilLiteral => write!(f, "nil"),
            TokenKind::NoneLiteral => write!(f, "None"),
            TokenKind::If => write!(f, "if"),
            TokenKind::Else => write!(f, "else"),
            TokenKind::Match => write!(f, "match"),
            TokenKind::For => write!(f, "for"),
            TokenKind::In => write!(f, "in"),
            TokenKind::Def => write!(f, "def"),
            TokenKind::Fn => write!(f, "fn"),
            TokenKind::Try => write!(f, "try"),
            TokenKind::Catch => write!(f, "catch"),
            TokenKind::As => write!(f, "as"),
            TokenKind::Throw => write!(f, "throw"),
            TokenKind::Use => write!(f, "use"),
            TokenKind::Return => write!(f, "return"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Dot => write!(f, "."),
            TokenKind::SemiColon => write!(f, ";"),
            TokenKind::Colon => write!(f, ":"),
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::LBrace => write!(f, "{{"),
            TokenKind::RBrace => write!(f, "}}"),
            TokenKind::LBracket => write!(f, "["),
            TokenKind::RBracket => write!(f, "]"),
            TokenKind::Arrow => write!(f, "=>"),
            TokenKind::Equal => write!(f, "="),
            TokenKind::EqEq => write!(f, "=="),
            TokenKind::NotEq => write!(f, "!="),
            TokenKind::Lt => write!(f, "<"),
            TokenKind::LtEq => write!(f, "<="),
            TokenKind::Gt => write!(f, ">"),
            TokenKind::GtEq => write!(f, ">="),
            TokenKind::Plus => write!(f, "+"),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::Asterisk => write!(f, "*"),
            TokenKind::Slash => write!(f, "/"),
            TokenKind::Percent => write!(f, "%"),
            TokenKind::Caret => write!(f, "^"),
            TokenKind::Superscript(2) => write!(f, "²"),
            TokenKind::Superscript(_) => write!(f, "³"),
            TokenKind::Not => write!(f, "!"),
            TokenKind::AndAnd => write!(f, "&&"),
            TokenKind::OrOr => write!(f, "||"),
            TokenKind::RangeExclusive => write!(f, ".."),
            TokenKind::RangeInclusive => write!(f, "..="),
            TokenKind::Comment(s) => write!(f, "#{}", s),
            TokenKind::NewLine => write!(f, "\\n"),
            TokenKind::Eof => write!(f, "<eof>"),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}
