use std::rc::Rc;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use smol_str::SmolStr;

use crate::lexer::token::TokenId;
use crate::number::Number;

pub type Ident = SmolStr;
pub type Params = SmallVec<[Ident; 4]>;
pub type Args = SmallVec<[Rc<Node>; 4]>;
pub type Program = Vec<Rc<Node>>;

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct Node {
    pub token_id: TokenId,
    pub expr: Rc<Expr>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub enum Literal {
    Nil,
    None,
    Bool(bool),
    Number(Number),
    String(String),
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    RangeExclusive,
    RangeInclusive,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub enum Pattern {
    Wildcard,
    Literal(Literal),
    Range {
        start: Number,
        end: Number,
        inclusive: bool,
    },
    Some(Ident),
    None,
    Ok(Ident),
    Err(Ident),
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct MatchArm {
    pub pattern: Pattern,
    pub body: Rc<Node>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub enum Expr {
    Literal(Literal),
    Ident(Ident),
    List(Vec<Rc<Node>>),
    BinaryOp(BinaryOp, Rc<Node>, Rc<Node>),
    UnaryOp(UnaryOp, Rc<Node>),
    /// `base²` / `base³`, normalized from the superscript operators.
    Pow(Rc<Node>, u8),
    Call(Rc<Node>, Args),
    Access(Rc<Node>, Ident),
    Index(Rc<Node>, Rc<Node>),
    /// Condition/body pairs in source order; a final pair with no
    /// condition is the `else` branch.
    If(Vec<(Option<Rc<Node>>, Rc<Node>)>),
    Match(Rc<Node>, Vec<MatchArm>),
    For(Ident, Rc<Node>, Rc<Node>),
    Def(Ident, Params, Rc<Node>),
    Fn(Params, Rc<Node>),
    /// Single- and multi-assignment; `x, y = 10, 20` is one node.
    Assign(SmallVec<[Ident; 2]>, SmallVec<[Rc<Node>; 2]>),
    Try {
        body: Rc<Node>,
        kind: Option<Ident>,
        binding: Option<Ident>,
        catch: Rc<Node>,
    },
    Throw(Ident, Args),
    Use(Ident),
    Return(Option<Rc<Node>>),
    /// The value of a block is the value of its last statement.
    Block(Vec<Rc<Node>>),
}

impl Node {
    pub fn is_def(&self) -> bool {
        matches!(&*self.expr, Expr::Def(..))
    }
}
