//! The template language.
//!
//! ```text
//! {bar}                 substitution
//! {bar|foo}             apply filter "foo" to "bar" before substituting
//! {bar|foo:arg1:arg2}   apply filter "foo" with two arguments
//! {?bar}                "if" block
//! {*bar}                "loop" block
//! {-}                   "else" branch of the enclosing block
//! {.}                   end of a block
//! ```
//!
//! A template compiles into a flat list of [`Token`]s. Blocks are not nested in a
//! tree: `If`/`Loop` tokens carry the indices of their `Else` and `End` tokens, which
//! lets the interpreter jump in constant time.

pub(crate) mod compiler;
pub mod engine;
pub mod filters;
pub(crate) mod interpreter;
pub(crate) mod operand;
pub mod scope;

/// 块关闭时才回填的链接占位值
pub(crate) const UNRESOLVED: usize = usize::MAX;

/// 路径的起点：根数据，或外层循环的当前项
/// （`%` 为最内层，`%N` 为向外第 N 层）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathRoot {
    Dict,
    Loop(usize),
}

/// A pre-parsed value expression: `path[|filter[:arg]*]*`.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub root: PathRoot,
    pub path: Vec<String>,
    pub filters: Vec<FilterCall>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterCall {
    pub name: String,
    pub args: Vec<Arg>,
}

/// 过滤器参数。`text` 原样保留，供自行解释参数的过滤器使用（如 `sub`）
#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub text: String,
    pub operand: Operand,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(crate::value::Value),
    Path(Expr),
    /// 以数字开头但不是合法数字的参数（如 `0.name`、`3px`）。
    /// 作为值求解时才报 `LiteralParse`。
    Raw { reason: String },
}

/// `If` / `Loop` 的跳转链接
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub expr: Expr,
    pub else_index: Option<usize>,
    pub end_index: usize,
}

/// 一条编译后的指令
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Copy(String),
    Var(Expr),
    If(Block),
    Loop(Block),
    Else {
        parent_index: usize,
        end_index: usize,
    },
    End {
        parent_index: usize,
        else_index: Option<usize>,
        end_index: usize,
    },
}
