//! The SysQL query language pipeline: lexer → parser → AST → analyzer →
//! planner → evaluator (C4-C8).

pub mod analyzer;
pub mod ast;
pub mod evaluator;
pub mod lexer;
pub mod parser;
pub mod planner;

pub use analyzer::{analyze, Ty};
pub use ast::Node;
pub use parser::{parse_arithmetic, parse_conditional, parse_statements};
pub use planner::{compile_matcher, plan, Query, QueryKind};

use crate::error::AnalyzeError;

/// Runs the analyzer over a parsed top-level command's FILTER/matcher
/// sub-expressions, under the context its object kind implies.
///
/// `STORE` and `TIMESERIES` parse (§6's SysQL surface names both), but
/// neither is an executable operation yet: ingestion only happens through
/// the typed `STORE_*` wire commands, and no time-series backend exists to
/// serve `TIMESERIES` against. Both are rejected here with an explicit
/// error rather than silently accepted and left for `plan` to paper over.
pub fn analyze_statement(node: &Node) -> Result<(), AnalyzeError> {
    match node {
        Node::Fetch { kind, filter, .. } | Node::List { kind, filter, .. } => {
            if let Some(f) = filter {
                analyze(f, kind.context())?;
            }
            Ok(())
        }
        Node::Lookup { kind, matcher, filter } => {
            analyze(matcher, kind.context())?;
            if let Some(f) = filter {
                analyze(f, kind.context())?;
            }
            Ok(())
        }
        Node::Store { .. } => Err(AnalyzeError(
            "STORE is not executable via SysQL text; use the STORE_* wire commands".to_string(),
        )),
        Node::Timeseries { .. } => Err(AnalyzeError("time-series retrieval is not implemented".to_string())),
        _ => Err(AnalyzeError("only FETCH/LIST/LOOKUP/STORE/TIMESERIES are valid top-level statements".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_store_statement() {
        let stmts = parse_statements("STORE host 'h1'").unwrap();
        assert!(analyze_statement(&stmts[0]).is_err());
        assert!(plan(&stmts[0]).is_err());
    }

    #[test]
    fn rejects_timeseries_statement() {
        let stmts = parse_statements("TIMESERIES h1.cpu").unwrap();
        assert!(analyze_statement(&stmts[0]).is_err());
        assert!(plan(&stmts[0]).is_err());
    }
}
