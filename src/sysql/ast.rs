//! SysQL abstract syntax tree (C4): the parser's output, consumed by the
//! analyzer and planner. Mirrors the node/operator taxonomy of the original
//! query language one-for-one — this module only *names* the grammar, it
//! carries no evaluation logic.

use crate::datum::Datum;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    Host,
    Service,
    Metric,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Host,
    Service,
    Metric,
    HostAttribute,
    ServiceAttribute,
    MetricAttribute,
}

impl ObjectKind {
    /// The expression context a FILTER/matcher clause on this kind analyzes
    /// and plans under: attribute kinds share their owning collection's
    /// context, since an attribute's siblings are its parent's fields.
    pub fn context(self) -> ContextKind {
        match self {
            ObjectKind::Host | ObjectKind::HostAttribute => ContextKind::Host,
            ObjectKind::Service | ObjectKind::ServiceAttribute => ContextKind::Service,
            ObjectKind::Metric | ObjectKind::MetricAttribute => ContextKind::Metric,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    And,
    Or,
    Not,
    Lt,
    Le,
    Eq,
    Ne,
    Ge,
    Gt,
    Regex,
    Nregex,
    IsNull,
    In,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
}

impl OpKind {
    pub fn is_logical(self) -> bool {
        matches!(
            self,
            OpKind::And
                | OpKind::Or
                | OpKind::Not
                | OpKind::Lt
                | OpKind::Le
                | OpKind::Eq
                | OpKind::Ne
                | OpKind::Ge
                | OpKind::Gt
                | OpKind::Regex
                | OpKind::Nregex
                | OpKind::IsNull
                | OpKind::In
        )
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            OpKind::Add | OpKind::Sub | OpKind::Mul | OpKind::Div | OpKind::Mod | OpKind::Concat
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterKind {
    All,
    Any,
}

/// Extra boolean tests that sit next to comparisons in the grammar but are
/// unary: `expr IS NULL`, `expr IS TRUE`, `expr IS FALSE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryTest {
    IsNull,
    IsTrue,
    IsFalse,
}

/// A queryable name: either one of the fixed fields (`name`, `last_update`,
/// `age`, `interval`, `backend`, `value`, `timeseries`) or an attribute
/// lookup by key (`attribute['key']` / the bare-name shorthand).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueRef {
    Field(String),
    Attribute(String),
}

#[derive(Debug, Clone)]
pub enum Node {
    Fetch { kind: ObjectKind, name: String, filter: Option<Box<Node>> },
    List { kind: ObjectKind, filter: Option<Box<Node>> },
    Lookup { kind: ObjectKind, matcher: Box<Node>, filter: Option<Box<Node>> },
    Store { kind: ObjectKind, name: String, timestamp: Option<i64> },
    Timeseries { host: String, metric: String, start: Option<i64>, end: Option<i64> },

    Operator { kind: OpKind, left: Option<Box<Node>>, right: Option<Box<Node>> },
    UnaryTest { test: UnaryTest, expr: Box<Node> },
    Iterator { kind: IterKind, iterable: Box<Node>, matcher: Box<Node> },
    /// The unbound left slot of an `ANY`/`ALL` inner comparator.
    IterSlot,

    /// A reference scoped to a named sibling collection, e.g. `service.name`
    /// evaluated inside a Host context.
    Typed { context: ContextKind, expr: Box<Node> },

    Const(Datum),
    Value(ValueRef),
}
