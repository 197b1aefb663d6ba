//! Semantic analysis (C6): type inference and operand-compatibility checks
//! over a parsed AST, per the Datum arithmetic rules in §4.1.

use crate::error::AnalyzeError;
use crate::sysql::ast::{ContextKind, IterKind, Node, OpKind, UnaryTest, ValueRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ty {
    Integer,
    Decimal,
    String,
    Datetime,
    Boolean,
    Binary,
    Array,
    Unknown,
}

fn field_type(name: &str) -> Option<Ty> {
    match name {
        "name" => Some(Ty::String),
        "last_update" | "age" | "interval" => Some(Ty::Datetime),
        "backend" => Some(Ty::Array),
        "value" => Some(Ty::Unknown),
        "timeseries" => Some(Ty::Boolean),
        _ => None,
    }
}

/// Fields that only make sense on a subset of object kinds; analysis rejects
/// the rest even though the field's *type* would otherwise be known.
fn field_valid_in(name: &str, ctx: ContextKind) -> bool {
    match name {
        "timeseries" => ctx == ContextKind::Metric,
        _ => true,
    }
}

pub fn analyze(node: &Node, ctx: ContextKind) -> Result<Ty, AnalyzeError> {
    match node {
        Node::Const(d) => Ok(const_ty(d)),
        Node::Value(ValueRef::Field(name)) => {
            if !field_valid_in(name, ctx) {
                return Err(AnalyzeError(format!("field '{}' is not valid in a {:?} context", name, ctx)));
            }
            field_type(name).ok_or_else(|| AnalyzeError(format!("unknown field '{}'", name)))
        }
        Node::Value(ValueRef::Attribute(_)) => Ok(Ty::Unknown),
        Node::Typed { context, expr } => {
            if *context == ctx {
                return Err(AnalyzeError(format!(
                    "'{:?}.field' is redundant inside a {:?} context; use the bare field name",
                    context, ctx
                )));
            }
            analyze(expr, *context)
        }
        Node::UnaryTest { test, expr } => {
            let ty = analyze(expr, ctx)?;
            match test {
                UnaryTest::IsNull => Ok(Ty::Boolean),
                UnaryTest::IsTrue | UnaryTest::IsFalse => {
                    if ty != Ty::Boolean && ty != Ty::Unknown {
                        return Err(AnalyzeError("IS TRUE/FALSE requires a boolean-typed expression".to_string()));
                    }
                    Ok(Ty::Boolean)
                }
            }
        }
        Node::Iterator { iterable, matcher, .. } => {
            let iter_ty = analyze(iterable, ctx)?;
            if iter_ty != Ty::Array && iter_ty != Ty::Unknown {
                return Err(AnalyzeError("ANY/ALL requires an iterable (array-typed) left operand".to_string()));
            }
            analyze_matcher_with_slot(matcher, ctx)?;
            Ok(Ty::Boolean)
        }
        Node::IterSlot => Ok(Ty::Unknown),
        Node::Operator { kind, left, right } => analyze_operator(*kind, left.as_deref(), right.as_deref(), ctx),
        Node::Fetch { .. } | Node::List { .. } | Node::Lookup { .. } | Node::Store { .. } | Node::Timeseries { .. } => {
            Err(AnalyzeError("top-level commands cannot appear inside an expression".to_string()))
        }
    }
}

fn analyze_matcher_with_slot(node: &Node, ctx: ContextKind) -> Result<Ty, AnalyzeError> {
    // IterSlot stands in for the bound element; treat it as Unknown so
    // comparisons against it are always accepted by operand-compatibility
    // checks (the slot's real type depends on the element bound at runtime).
    analyze(node, ctx)
}

fn const_ty(d: &crate::datum::Datum) -> Ty {
    use crate::datum::Datum::*;
    match d {
        Null => Ty::Unknown,
        Integer(_) => Ty::Integer,
        Decimal(_) => Ty::Decimal,
        String(_) => Ty::String,
        Datetime(_) => Ty::Datetime,
        Binary(_) => Ty::Binary,
        Regex(_) => Ty::String,
        Array(_) => Ty::Array,
    }
}

fn analyze_operator(kind: OpKind, left: Option<&Node>, right: Option<&Node>, ctx: ContextKind) -> Result<Ty, AnalyzeError> {
    match kind {
        OpKind::And | OpKind::Or => {
            check_bool(left.unwrap(), ctx)?;
            check_bool(right.unwrap(), ctx)?;
            Ok(Ty::Boolean)
        }
        OpKind::Not => {
            check_bool(right.unwrap(), ctx)?;
            Ok(Ty::Boolean)
        }
        OpKind::Lt | OpKind::Le | OpKind::Eq | OpKind::Ne | OpKind::Ge | OpKind::Gt => {
            let lt = analyze(left.unwrap(), ctx)?;
            let rt = analyze(right.unwrap(), ctx)?;
            if lt != Ty::Unknown && rt != Ty::Unknown && lt != rt {
                return Err(AnalyzeError(format!("cannot compare {:?} with {:?}", lt, rt)));
            }
            Ok(Ty::Boolean)
        }
        OpKind::Regex | OpKind::Nregex => {
            let lt = analyze(left.unwrap(), ctx)?;
            if lt != Ty::String && lt != Ty::Unknown {
                return Err(AnalyzeError("REGEX requires a string-typed left operand".to_string()));
            }
            let rt = analyze(right.unwrap(), ctx)?;
            if rt != Ty::String && rt != Ty::Unknown {
                return Err(AnalyzeError("REGEX requires a string- or regex-typed right operand".to_string()));
            }
            Ok(Ty::Boolean)
        }
        OpKind::IsNull => {
            analyze(left.or(right).unwrap(), ctx)?;
            Ok(Ty::Boolean)
        }
        OpKind::In => {
            let lt = analyze(left.unwrap(), ctx)?;
            let rt = analyze(right.unwrap(), ctx)?;
            if rt != Ty::Array && rt != Ty::Unknown {
                return Err(AnalyzeError("IN requires an array-typed right operand".to_string()));
            }
            let _ = lt;
            Ok(Ty::Boolean)
        }
        OpKind::Add | OpKind::Sub | OpKind::Mul | OpKind::Div | OpKind::Mod => {
            let lt = analyze(left.unwrap(), ctx)?;
            let rt = analyze(right.unwrap(), ctx)?;
            arithmetic_result(kind, lt, rt)
        }
        OpKind::Concat => {
            let lt = analyze(left.unwrap(), ctx)?;
            let rt = analyze(right.unwrap(), ctx)?;
            match (lt, rt) {
                (Ty::String, Ty::String) | (Ty::Binary, Ty::Binary) => Ok(lt),
                (Ty::Unknown, _) | (_, Ty::Unknown) => Ok(Ty::Unknown),
                _ => Err(AnalyzeError("CONCAT requires two strings or two binaries".to_string())),
            }
        }
    }
}

fn check_bool(node: &Node, ctx: ContextKind) -> Result<(), AnalyzeError> {
    let ty = analyze(node, ctx)?;
    if ty != Ty::Boolean && ty != Ty::Unknown {
        return Err(AnalyzeError(format!("expected a boolean expression, got {:?}", ty)));
    }
    Ok(())
}

fn arithmetic_result(op: OpKind, lt: Ty, rt: Ty) -> Result<Ty, AnalyzeError> {
    use Ty::*;
    match (lt, rt) {
        (Unknown, _) | (_, Unknown) => Ok(Unknown),
        (Integer, Integer) => Ok(Integer),
        (Decimal, Decimal) if op != OpKind::Mod => Ok(Decimal),
        (Integer, Decimal) | (Decimal, Integer) if op != OpKind::Mod => Ok(Decimal),
        (Datetime, Datetime) if matches!(op, OpKind::Add | OpKind::Sub) => Ok(Datetime),
        (Datetime, Integer) if matches!(op, OpKind::Mul | OpKind::Div) => Ok(Datetime),
        _ => Err(AnalyzeError(format!("incompatible operand types {:?}, {:?} for {:?}", lt, rt, op))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sysql::parser::parse_conditional;

    #[test]
    fn rejects_type_mismatched_comparison() {
        let node = parse_conditional("name = 5", ContextKind::Host).unwrap();
        assert!(analyze(&node, ContextKind::Host).is_err());
    }

    #[test]
    fn allows_comparison_against_unknown_attribute() {
        let node = parse_conditional("somekey = 5", ContextKind::Host).unwrap();
        assert!(analyze(&node, ContextKind::Host).is_ok());
    }

    #[test]
    fn rejects_timeseries_field_outside_metric_context() {
        let node = parse_conditional("timeseries IS TRUE", ContextKind::Host).unwrap();
        assert!(analyze(&node, ContextKind::Host).is_err());
    }

    #[test]
    fn negative_decimal_literal_analyzes_as_decimal() {
        let node = parse_conditional("somekey = -5.5", ContextKind::Host).unwrap();
        assert!(analyze(&node, ContextKind::Host).is_ok());
    }

    #[test]
    fn mixed_integer_and_decimal_arithmetic_promotes_to_decimal() {
        assert_eq!(arithmetic_result(OpKind::Add, Ty::Integer, Ty::Decimal), Ok(Ty::Decimal));
        assert_eq!(arithmetic_result(OpKind::Sub, Ty::Decimal, Ty::Integer), Ok(Ty::Decimal));
        assert!(arithmetic_result(OpKind::Mod, Ty::Integer, Ty::Decimal).is_err());
    }
}
