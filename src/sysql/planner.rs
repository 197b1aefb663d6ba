//! Planner (C7): lowers an analyzed AST into `Expr`/`Matcher`/`Query` trees
//! ready for the evaluator.
//!
//! One promotion happens here that has no direct AST node: a comparison with
//! a `Typed` operand (`service.name = 'ssh'`, written inside a Host
//! context) is existential — "some service has this name" — so it lowers to
//! an implicit `ANY` over the named sibling collection rather than a direct
//! field comparison. Planning a `Fetch`/`List`/`Lookup` node never fails
//! once analysis has succeeded (§4.6); `plan` only returns an error for a
//! node `analyze_statement` should already have rejected first (`Store`,
//! `Timeseries`, or anything else that isn't a top-level statement).

use crate::datum::{CompareResult, Datum};
use crate::error::QueryError;
use crate::store::object::CollectionKind;
use crate::store::store::{Matcher, ObjectRef};
use crate::sysql::ast::{ContextKind, IterKind, Node, ObjectKind as AstObjectKind, OpKind, UnaryTest, ValueRef};

#[derive(Debug, Clone)]
pub enum Expr {
    Const(Datum),
    Field(String),
    Attribute(String),
    Typed(ContextKind, Box<Expr>),
    Arith(OpKind, Box<Expr>, Box<Expr>),
    IterSlot,
}

impl Expr {
    pub fn eval(&self, obj: ObjectRef, now: i64, slot: Option<&Datum>) -> Datum {
        match self {
            Expr::Const(d) => d.clone(),
            Expr::IterSlot => slot.cloned().unwrap_or(Datum::Null),
            Expr::Field(name) => eval_field(obj, name, now),
            Expr::Attribute(key) => obj.attr(key).and_then(|a| a.value()).cloned().unwrap_or(Datum::Null),
            Expr::Typed(ctx, inner) => {
                // Only reachable for non-boolean, non-comparison positions
                // (arithmetic/value context); evaluated against the first
                // matching sibling, or Null if none exists.
                match first_sibling(obj, *ctx) {
                    Some(sib) => inner.eval(sib, now, slot),
                    None => Datum::Null,
                }
            }
            Expr::Arith(op, l, r) => {
                let lv = l.eval(obj, now, slot);
                let rv = r.eval(obj, now, slot);
                Datum::eval(op_to_arith(*op), &lv, &rv).unwrap_or(Datum::Null)
            }
        }
    }
}

fn op_to_arith(op: OpKind) -> crate::datum::ArithOp {
    use crate::datum::ArithOp::*;
    match op {
        OpKind::Sub => Sub,
        OpKind::Mul => Mul,
        OpKind::Div => Div,
        OpKind::Mod => Mod,
        OpKind::Concat => Concat,
        _ => Add,
    }
}

fn first_sibling<'a>(obj: ObjectRef<'a>, ctx: ContextKind) -> Option<ObjectRef<'a>> {
    let host = obj.host();
    match ctx {
        ContextKind::Service => host.services.iter().next().map(|(_, s)| ObjectRef::Service(host, s)),
        ContextKind::Metric => host.metrics.iter().next().map(|(_, m)| ObjectRef::Metric(host, m)),
        ContextKind::Host => Some(ObjectRef::Host(host)),
    }
}

fn eval_field(obj: ObjectRef, name: &str, now: i64) -> Datum {
    match name {
        "name" => Datum::String(obj.name().to_string()),
        "last_update" => Datum::Datetime(obj.meta().last_update),
        "age" => Datum::Datetime(now - obj.meta().last_update),
        "interval" => Datum::Datetime(obj.meta().interval),
        "backend" => {
            let elements = obj.meta().backends.as_slice().iter().map(|b| Datum::String(b.clone())).collect();
            Datum::array(crate::datum::ScalarTag::String, elements).unwrap_or(Datum::Null)
        }
        "value" => obj.value().cloned().unwrap_or(Datum::Null),
        "timeseries" => Datum::Integer(if obj.timeseries().is_some() { 1 } else { 0 }),
        _ => Datum::Null,
    }
}

pub enum CompiledMatcher {
    And(Box<CompiledMatcher>, Box<CompiledMatcher>),
    Or(Box<CompiledMatcher>, Box<CompiledMatcher>),
    Not(Box<CompiledMatcher>),
    Cmp(CmpOp, Expr, Expr),
    Regex { left: Expr, right: Expr, negate: bool },
    In(Expr, Expr),
    IsNull(Expr),
    IsTrue(Expr),
    IsFalse(Expr),
    AnyArray(Expr, Box<CompiledMatcher>),
    AllArray(Expr, Box<CompiledMatcher>),
    AnySibling(ContextKind, Box<CompiledMatcher>),
    True,
}

#[derive(Debug, Clone, Copy)]
pub enum CmpOp {
    Lt,
    Le,
    Eq,
    Ne,
    Ge,
    Gt,
}

impl Matcher for CompiledMatcher {
    fn matches(&self, obj: ObjectRef, filter: Option<&dyn Matcher>) -> bool {
        if let Some(f) = filter {
            if !f.matches(obj, None) {
                return false;
            }
        }
        match self {
            CompiledMatcher::True => true,
            CompiledMatcher::And(a, b) => a.matches(obj, filter) && b.matches(obj, filter),
            CompiledMatcher::Or(a, b) => a.matches(obj, filter) || b.matches(obj, filter),
            CompiledMatcher::Not(m) => !m.matches(obj, filter),
            CompiledMatcher::Cmp(op, l, r) => {
                let now = current_time_ns();
                let lv = l.eval(obj, now, None);
                let rv = r.eval(obj, now, None);
                cmp_matches(*op, lv.compare(&rv))
            }
            CompiledMatcher::Regex { left, right, negate } => {
                let now = current_time_ns();
                let lv = left.eval(obj, now, None);
                let rv = right.eval(obj, now, None);
                let matched = regex_matches(&lv, &rv);
                matched != *negate
            }
            CompiledMatcher::In(l, r) => {
                let now = current_time_ns();
                let lv = l.eval(obj, now, None);
                let rv = r.eval(obj, now, None);
                lv.in_array(&rv)
            }
            CompiledMatcher::IsNull(e) => e.eval(obj, current_time_ns(), None).is_null(),
            CompiledMatcher::IsTrue(e) => is_truthy(&e.eval(obj, current_time_ns(), None)) == Some(true),
            CompiledMatcher::IsFalse(e) => is_truthy(&e.eval(obj, current_time_ns(), None)) == Some(false),
            CompiledMatcher::AnyArray(iter_expr, inner) => {
                let arr = iter_expr.eval(obj, current_time_ns(), None);
                array_elements(&arr).iter().any(|el| inner.matches_with_slot(obj, filter, el))
            }
            CompiledMatcher::AllArray(iter_expr, inner) => {
                let arr = iter_expr.eval(obj, current_time_ns(), None);
                array_elements(&arr).iter().all(|el| inner.matches_with_slot(obj, filter, el))
            }
            CompiledMatcher::AnySibling(ctx, inner) => {
                let host = obj.host();
                match ctx {
                    ContextKind::Service => host.services.iter().any(|(_, s)| inner.matches(ObjectRef::Service(host, s), filter)),
                    ContextKind::Metric => host.metrics.iter().any(|(_, m)| inner.matches(ObjectRef::Metric(host, m), filter)),
                    ContextKind::Host => inner.matches(ObjectRef::Host(host), filter),
                }
            }
        }
    }
}

impl CompiledMatcher {
    /// Evaluate with `slot` temporarily bound into any `Expr::IterSlot`
    /// leaves reached by this matcher — used by `AnyArray`/`AllArray`.
    fn matches_with_slot(&self, obj: ObjectRef, filter: Option<&dyn Matcher>, slot: &Datum) -> bool {
        match self {
            CompiledMatcher::Cmp(op, l, r) => {
                let now = current_time_ns();
                let lv = l.eval(obj, now, Some(slot));
                let rv = r.eval(obj, now, Some(slot));
                cmp_matches(*op, lv.compare(&rv))
            }
            CompiledMatcher::Regex { left, right, negate } => {
                let now = current_time_ns();
                let lv = left.eval(obj, now, Some(slot));
                let rv = right.eval(obj, now, Some(slot));
                regex_matches(&lv, &rv) != *negate
            }
            CompiledMatcher::And(a, b) => a.matches_with_slot(obj, filter, slot) && b.matches_with_slot(obj, filter, slot),
            CompiledMatcher::Or(a, b) => a.matches_with_slot(obj, filter, slot) || b.matches_with_slot(obj, filter, slot),
            CompiledMatcher::Not(m) => !m.matches_with_slot(obj, filter, slot),
            other => other.matches(obj, filter),
        }
    }
}

fn current_time_ns() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

fn cmp_matches(op: CmpOp, result: CompareResult) -> bool {
    use CompareResult::*;
    match (op, result) {
        (_, Incomparable) => false,
        (CmpOp::Lt, Less) | (CmpOp::Le, Less) | (CmpOp::Le, Equal) => true,
        (CmpOp::Eq, Equal) => true,
        (CmpOp::Ne, Less) | (CmpOp::Ne, Greater) => true,
        (CmpOp::Ge, Greater) | (CmpOp::Ge, Equal) => true,
        (CmpOp::Gt, Greater) => true,
        _ => false,
    }
}

fn regex_matches(left: &Datum, right: &Datum) -> bool {
    let text = match left {
        Datum::String(s) => s.clone(),
        _ => return false,
    };
    let pattern = match right {
        Datum::Regex(r) => r.source.clone(),
        Datum::String(s) => s.clone(),
        _ => return false,
    };
    match regex::Regex::new(&pattern) {
        Ok(re) => re.is_match(&text),
        Err(_) => false,
    }
}

fn is_truthy(d: &Datum) -> Option<bool> {
    match d {
        Datum::Integer(0) => Some(false),
        Datum::Integer(_) => Some(true),
        _ => None,
    }
}

fn array_elements(d: &Datum) -> Vec<Datum> {
    match d {
        Datum::Array(a) => a.elements.clone(),
        _ => Vec::new(),
    }
}

pub struct Query {
    pub kind: QueryKind,
    pub object_kind: AstObjectKind,
    pub matcher: Option<CompiledMatcher>,
    pub filter: Option<CompiledMatcher>,
    pub name: Option<String>,
}

pub enum QueryKind {
    Fetch,
    List,
    Lookup,
}

pub fn compile_expr(node: &Node) -> Expr {
    match node {
        Node::Const(d) => Expr::Const(d.clone()),
        Node::Value(ValueRef::Field(f)) => Expr::Field(f.clone()),
        Node::Value(ValueRef::Attribute(a)) => Expr::Attribute(a.clone()),
        Node::Typed { context, expr } => Expr::Typed(*context, Box::new(compile_expr(expr))),
        Node::IterSlot => Expr::IterSlot,
        Node::Operator { kind, left, right } if kind.is_arithmetic() => Expr::Arith(
            *kind,
            Box::new(compile_expr(left.as_ref().unwrap())),
            Box::new(compile_expr(right.as_ref().unwrap())),
        ),
        _ => Expr::Const(Datum::Null),
    }
}

/// Detects a `Typed`-wrapped operand and, if present, returns the sibling
/// context and the operand with the wrapper stripped.
fn strip_typed(node: &Node) -> (Option<ContextKind>, &Node) {
    match node {
        Node::Typed { context, expr } => (Some(*context), expr),
        other => (None, other),
    }
}

pub fn compile_matcher(node: &Node) -> CompiledMatcher {
    match node {
        Node::Operator { kind: OpKind::And, left, right } => CompiledMatcher::And(
            Box::new(compile_matcher(left.as_ref().unwrap())),
            Box::new(compile_matcher(right.as_ref().unwrap())),
        ),
        Node::Operator { kind: OpKind::Or, left, right } => CompiledMatcher::Or(
            Box::new(compile_matcher(left.as_ref().unwrap())),
            Box::new(compile_matcher(right.as_ref().unwrap())),
        ),
        Node::Operator { kind: OpKind::Not, right, .. } => {
            CompiledMatcher::Not(Box::new(compile_matcher(right.as_ref().unwrap())))
        }
        Node::Operator { kind, left, right } if matches!(kind, OpKind::Lt | OpKind::Le | OpKind::Eq | OpKind::Ne | OpKind::Ge | OpKind::Gt) =>
        {
            let (l_ctx, l_node) = strip_typed(left.as_ref().unwrap());
            let (r_ctx, r_node) = strip_typed(right.as_ref().unwrap());
            let cmp = CmpOp::from(*kind);
            let inner = CompiledMatcher::Cmp(cmp, compile_expr(l_node), compile_expr(r_node));
            match l_ctx.or(r_ctx) {
                Some(ctx) => CompiledMatcher::AnySibling(ctx, Box::new(inner)),
                None => inner,
            }
        }
        Node::Operator { kind: kind @ (OpKind::Regex | OpKind::Nregex), left, right } => {
            let (l_ctx, l_node) = strip_typed(left.as_ref().unwrap());
            let (r_ctx, r_node) = strip_typed(right.as_ref().unwrap());
            let inner = CompiledMatcher::Regex {
                left: compile_expr(l_node),
                right: compile_expr(r_node),
                negate: *kind == OpKind::Nregex,
            };
            match l_ctx.or(r_ctx) {
                Some(ctx) => CompiledMatcher::AnySibling(ctx, Box::new(inner)),
                None => inner,
            }
        }
        Node::Operator { kind: OpKind::In, left, right } => {
            CompiledMatcher::In(compile_expr(left.as_ref().unwrap()), compile_expr(right.as_ref().unwrap()))
        }
        Node::UnaryTest { test, expr } => {
            let e = compile_expr(expr);
            match test {
                UnaryTest::IsNull => CompiledMatcher::IsNull(e),
                UnaryTest::IsTrue => CompiledMatcher::IsTrue(e),
                UnaryTest::IsFalse => CompiledMatcher::IsFalse(e),
            }
        }
        Node::Iterator { kind, iterable, matcher } => {
            let iter_expr = compile_expr(iterable);
            let inner = compile_matcher(matcher);
            match kind {
                IterKind::Any => CompiledMatcher::AnyArray(iter_expr, Box::new(inner)),
                IterKind::All => CompiledMatcher::AllArray(iter_expr, Box::new(inner)),
            }
        }
        _ => CompiledMatcher::True,
    }
}

impl From<OpKind> for CmpOp {
    fn from(op: OpKind) -> Self {
        match op {
            OpKind::Lt => CmpOp::Lt,
            OpKind::Le => CmpOp::Le,
            OpKind::Eq => CmpOp::Eq,
            OpKind::Ne => CmpOp::Ne,
            OpKind::Ge => CmpOp::Ge,
            OpKind::Gt => CmpOp::Gt,
            _ => CmpOp::Eq,
        }
    }
}

pub fn plan(node: &Node) -> Result<Query, QueryError> {
    match node {
        Node::Fetch { kind, name, filter } => Ok(Query {
            kind: QueryKind::Fetch,
            object_kind: *kind,
            matcher: None,
            filter: filter.as_deref().map(compile_matcher),
            name: Some(name.clone()),
        }),
        Node::List { kind, filter } => Ok(Query {
            kind: QueryKind::List,
            object_kind: *kind,
            matcher: None,
            filter: filter.as_deref().map(compile_matcher),
            name: None,
        }),
        Node::Lookup { kind, matcher, filter } => Ok(Query {
            kind: QueryKind::Lookup,
            object_kind: *kind,
            matcher: Some(compile_matcher(matcher)),
            filter: filter.as_deref().map(compile_matcher),
            name: None,
        }),
        Node::Store { .. } => {
            Err(QueryError::Unsupported("STORE is not executable via SysQL text; use the STORE_* wire commands".to_string()))
        }
        Node::Timeseries { .. } => Err(QueryError::Unsupported("time-series retrieval is not implemented".to_string())),
        _ => Err(QueryError::Unsupported("not a top-level statement".to_string())),
    }
}

pub fn ast_kind_to_collection(kind: AstObjectKind) -> CollectionKind {
    match kind {
        AstObjectKind::Host | AstObjectKind::HostAttribute => CollectionKind::Host,
        AstObjectKind::Service | AstObjectKind::ServiceAttribute => CollectionKind::Service,
        AstObjectKind::Metric | AstObjectKind::MetricAttribute => CollectionKind::Metric,
    }
}
