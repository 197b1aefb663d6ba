//! Recursive-descent SysQL parser (C5). Three public entry points mirror the
//! spec's parser modes: [`parse_statements`] (Statement), [`parse_conditional`]
//! (Conditional), and [`parse_arithmetic`] (Arithmetic). All three share the
//! same expression grammar; only the entry differs.
//!
//! Precedence, low to high: OR, AND, NOT, comparison, concat, additive,
//! multiplicative, unary, primary.

use crate::error::ParseError;
use crate::sysql::ast::{ContextKind, IterKind, Node, ObjectKind, OpKind, UnaryTest, ValueRef};
use crate::sysql::lexer::{lex, Token, TokenKind};
use crate::datum::Datum;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

type PResult<T> = Result<T, ParseError>;

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn peek_pos(&self) -> usize {
        self.tokens[self.pos].pos
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn err(&self, msg: impl Into<String>) -> ParseError {
        ParseError::new(msg, self.peek_pos())
    }

    fn eat_symbol(&mut self, sym: &'static str) -> PResult<()> {
        if self.peek() == &TokenKind::Symbol(sym) {
            self.advance();
            Ok(())
        } else {
            Err(self.err(format!("expected '{}'", sym)))
        }
    }

    fn eat_keyword(&mut self, word: &str) -> PResult<()> {
        if let TokenKind::Ident(s) = self.peek() {
            if s.eq_ignore_ascii_case(word) {
                self.advance();
                return Ok(());
            }
        }
        Err(self.err(format!("expected '{}'", word)))
    }

    fn at_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), TokenKind::Ident(s) if s.eq_ignore_ascii_case(word))
    }

    // -- statement mode ------------------------------------------------

    /// Parses an object kind per §6: `host`/`hosts`, `service`/`services`,
    /// `metric`/`metrics`, the bare `attribute`/`attributes` (a host
    /// attribute), or one of those collection words followed by a trailing
    /// `attribute`/`attributes` (`service attribute`, `metric attribute`).
    fn parse_object_kind(&mut self) -> PResult<ObjectKind> {
        let name = match self.advance().kind {
            TokenKind::Ident(s) => s,
            _ => return Err(self.err("expected an object kind")),
        };
        let collection = match name.to_ascii_lowercase().as_str() {
            "host" | "hosts" => ObjectKind::Host,
            "service" | "services" => ObjectKind::Service,
            "metric" | "metrics" => ObjectKind::Metric,
            "attribute" | "attributes" => return Ok(ObjectKind::HostAttribute),
            other => return Err(ParseError::new(format!("unknown object kind '{}'", other), self.peek_pos())),
        };
        if self.at_keyword("attribute") || self.at_keyword("attributes") {
            self.advance();
            return Ok(match collection {
                ObjectKind::Host => ObjectKind::HostAttribute,
                ObjectKind::Service => ObjectKind::ServiceAttribute,
                ObjectKind::Metric => ObjectKind::MetricAttribute,
                already_attr => already_attr,
            });
        }
        Ok(collection)
    }

    fn parse_identifier(&mut self) -> PResult<String> {
        match self.advance().kind {
            TokenKind::Ident(s) => Ok(s),
            _ => Err(self.err("expected an identifier")),
        }
    }

    /// A `LAST UPDATE`/`START`/`END` timestamp: a datetime or integer
    /// literal (nanoseconds since the epoch).
    fn parse_timestamp_literal(&mut self) -> PResult<i64> {
        match self.parse_const()? {
            Node::Const(Datum::Datetime(ns)) => Ok(ns),
            Node::Const(Datum::Integer(ns)) => Ok(ns),
            _ => Err(self.err("expected a datetime or integer timestamp literal")),
        }
    }

    fn context_of(kind: ObjectKind) -> ContextKind {
        kind.context()
    }

    fn parse_filter_clause(&mut self, context: ContextKind) -> PResult<Option<Box<Node>>> {
        if self.at_keyword("filter") {
            self.advance();
            Ok(Some(Box::new(self.parse_or(context)?)))
        } else {
            Ok(None)
        }
    }

    fn parse_command(&mut self) -> PResult<Node> {
        if self.at_keyword("fetch") {
            self.advance();
            let kind = self.parse_object_kind()?;
            let name = self.parse_string_literal()?;
            let filter = self.parse_filter_clause(Self::context_of(kind))?;
            return Ok(Node::Fetch { kind, name, filter });
        }
        if self.at_keyword("list") {
            self.advance();
            let kind = if matches!(self.peek(), TokenKind::Ident(_)) && !self.at_keyword("filter") {
                self.parse_object_kind()?
            } else {
                ObjectKind::Host
            };
            let filter = self.parse_filter_clause(Self::context_of(kind))?;
            return Ok(Node::List { kind, filter });
        }
        if self.at_keyword("lookup") {
            self.advance();
            let kind = self.parse_object_kind()?;
            let context = Self::context_of(kind);
            let matcher = Box::new(self.parse_or(context)?);
            let filter = self.parse_filter_clause(context)?;
            return Ok(Node::Lookup { kind, matcher, filter });
        }
        if self.at_keyword("store") {
            self.advance();
            let kind = self.parse_object_kind()?;
            let name = self.parse_string_literal()?;
            let timestamp = if self.at_keyword("last") {
                self.advance();
                self.eat_keyword("update")?;
                Some(self.parse_timestamp_literal()?)
            } else {
                None
            };
            return Ok(Node::Store { kind, name, timestamp });
        }
        if self.at_keyword("timeseries") {
            self.advance();
            let host = self.parse_identifier()?;
            self.eat_symbol(".")?;
            let metric = self.parse_identifier()?;
            let mut start = None;
            let mut end = None;
            loop {
                if self.at_keyword("start") {
                    self.advance();
                    start = Some(self.parse_timestamp_literal()?);
                } else if self.at_keyword("end") {
                    self.advance();
                    end = Some(self.parse_timestamp_literal()?);
                } else {
                    break;
                }
            }
            return Ok(Node::Timeseries { host, metric, start, end });
        }
        Err(self.err("expected FETCH, LIST, LOOKUP, STORE, or TIMESERIES"))
    }

    fn parse_string_literal(&mut self) -> PResult<String> {
        match self.advance().kind {
            TokenKind::Str(s) => Ok(s),
            _ => Err(self.err("expected a string literal")),
        }
    }

    // -- shared expression grammar ---------------------------------------

    fn parse_or(&mut self, ctx: ContextKind) -> PResult<Node> {
        let mut left = self.parse_and(ctx)?;
        while self.at_keyword("or") {
            self.advance();
            let right = self.parse_and(ctx)?;
            left = Node::Operator { kind: OpKind::Or, left: Some(Box::new(left)), right: Some(Box::new(right)) };
        }
        Ok(left)
    }

    fn parse_and(&mut self, ctx: ContextKind) -> PResult<Node> {
        let mut left = self.parse_not(ctx)?;
        while self.at_keyword("and") {
            self.advance();
            let right = self.parse_not(ctx)?;
            left = Node::Operator { kind: OpKind::And, left: Some(Box::new(left)), right: Some(Box::new(right)) };
        }
        Ok(left)
    }

    fn parse_not(&mut self, ctx: ContextKind) -> PResult<Node> {
        if self.at_keyword("not") {
            self.advance();
            let inner = self.parse_not(ctx)?;
            return Ok(Node::Operator { kind: OpKind::Not, left: None, right: Some(Box::new(inner)) });
        }
        self.parse_iterator_or_comparison(ctx)
    }

    fn parse_iterator_or_comparison(&mut self, ctx: ContextKind) -> PResult<Node> {
        if self.at_keyword("any") || self.at_keyword("all") {
            let is_any = self.at_keyword("any");
            self.advance();
            let (iterable, inner_ctx) = self.parse_iterable(ctx)?;
            let op = self.parse_comparator_op()?;
            let rhs = self.parse_concat(inner_ctx)?;
            let matcher = Node::Operator { kind: op, left: Some(Box::new(Node::IterSlot)), right: Some(Box::new(rhs)) };
            return Ok(Node::Iterator {
                kind: if is_any { IterKind::Any } else { IterKind::All },
                iterable: Box::new(iterable),
                matcher: Box::new(matcher),
            });
        }
        if self.peek() == &TokenKind::Symbol("(") {
            self.advance();
            let inner = self.parse_or(ctx)?;
            self.eat_symbol(")")?;
            return self.parse_comparison_tail(inner, ctx);
        }
        let left = self.parse_concat(ctx)?;
        self.parse_comparison_tail(left, ctx)
    }

    /// The iterable operand of `ANY`/`ALL`: an Array-typed field expression
    /// (e.g. `backend`, or an attribute holding an array value).
    fn parse_iterable(&mut self, ctx: ContextKind) -> PResult<(Node, ContextKind)> {
        Ok((self.parse_concat(ctx)?, ctx))
    }

    fn parse_comparator_op(&mut self) -> PResult<OpKind> {
        let op = match self.peek() {
            TokenKind::Symbol("<") => OpKind::Lt,
            TokenKind::Symbol("<=") => OpKind::Le,
            TokenKind::Symbol("=") => OpKind::Eq,
            TokenKind::Symbol("!=") => OpKind::Ne,
            TokenKind::Symbol(">=") => OpKind::Ge,
            TokenKind::Symbol(">") => OpKind::Gt,
            TokenKind::Symbol("=~") => OpKind::Regex,
            TokenKind::Symbol("!~") => OpKind::Nregex,
            _ => return Err(self.err("expected a comparison operator")),
        };
        self.advance();
        Ok(op)
    }

    fn parse_comparison_tail(&mut self, left: Node, ctx: ContextKind) -> PResult<Node> {
        if self.at_keyword("is") {
            self.advance();
            let negate = if self.at_keyword("not") {
                self.advance();
                true
            } else {
                false
            };
            let test = if self.at_keyword("null") {
                self.advance();
                UnaryTest::IsNull
            } else if self.at_keyword("true") {
                self.advance();
                UnaryTest::IsTrue
            } else if self.at_keyword("false") {
                self.advance();
                UnaryTest::IsFalse
            } else {
                return Err(self.err("expected NULL, TRUE, or FALSE after IS"));
            };
            let node = Node::UnaryTest { test, expr: Box::new(left) };
            return Ok(if negate {
                Node::Operator { kind: OpKind::Not, left: None, right: Some(Box::new(node)) }
            } else {
                node
            });
        }
        if self.at_keyword("in") {
            self.advance();
            let rhs = self.parse_concat(ctx)?;
            return Ok(Node::Operator { kind: OpKind::In, left: Some(Box::new(left)), right: Some(Box::new(rhs)) });
        }
        if let Ok(op) = self.try_comparator_op() {
            let rhs = self.parse_concat(ctx)?;
            return Ok(Node::Operator { kind: op, left: Some(Box::new(left)), right: Some(Box::new(rhs)) });
        }
        Ok(left)
    }

    fn try_comparator_op(&mut self) -> PResult<OpKind> {
        match self.peek() {
            TokenKind::Symbol("<") | TokenKind::Symbol("<=") | TokenKind::Symbol("=") | TokenKind::Symbol("!=")
            | TokenKind::Symbol(">=") | TokenKind::Symbol(">") | TokenKind::Symbol("=~") | TokenKind::Symbol("!~") => {
                self.parse_comparator_op()
            }
            _ => Err(self.err("not a comparator")),
        }
    }

    fn parse_concat(&mut self, ctx: ContextKind) -> PResult<Node> {
        let mut left = self.parse_additive(ctx)?;
        while self.peek() == &TokenKind::Symbol("||") {
            self.advance();
            let right = self.parse_additive(ctx)?;
            left = Node::Operator { kind: OpKind::Concat, left: Some(Box::new(left)), right: Some(Box::new(right)) };
        }
        Ok(left)
    }

    fn parse_additive(&mut self, ctx: ContextKind) -> PResult<Node> {
        let mut left = self.parse_multiplicative(ctx)?;
        loop {
            let op = match self.peek() {
                TokenKind::Symbol("+") => OpKind::Add,
                TokenKind::Symbol("-") => OpKind::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative(ctx)?;
            left = Node::Operator { kind: op, left: Some(Box::new(left)), right: Some(Box::new(right)) };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self, ctx: ContextKind) -> PResult<Node> {
        let mut left = self.parse_unary(ctx)?;
        loop {
            let op = match self.peek() {
                TokenKind::Symbol("*") => OpKind::Mul,
                TokenKind::Symbol("/") => OpKind::Div,
                TokenKind::Symbol("%") => OpKind::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary(ctx)?;
            left = Node::Operator { kind: op, left: Some(Box::new(left)), right: Some(Box::new(right)) };
        }
        Ok(left)
    }

    fn parse_unary(&mut self, ctx: ContextKind) -> PResult<Node> {
        if self.peek() == &TokenKind::Symbol("-") {
            self.advance();
            let inner = self.parse_unary(ctx)?;
            return Ok(Node::Operator {
                kind: OpKind::Sub,
                left: Some(Box::new(Node::Const(Datum::Integer(0)))),
                right: Some(Box::new(inner)),
            });
        }
        self.parse_primary(ctx)
    }

    fn parse_primary(&mut self, ctx: ContextKind) -> PResult<Node> {
        match self.peek().clone() {
            TokenKind::Symbol("(") => {
                self.advance();
                let inner = self.parse_or(ctx)?;
                self.eat_symbol(")")?;
                Ok(inner)
            }
            TokenKind::Symbol("[") => self.parse_array_literal(),
            TokenKind::Number(_) | TokenKind::Duration(_) | TokenKind::Str(_) => self.parse_const(),
            TokenKind::Ident(name) => {
                if name.eq_ignore_ascii_case("true") {
                    self.advance();
                    return Ok(Node::Const(Datum::Integer(1)));
                }
                if name.eq_ignore_ascii_case("false") {
                    self.advance();
                    return Ok(Node::Const(Datum::Integer(0)));
                }
                self.parse_value_ref(ctx)
            }
            _ => Err(self.err("expected an expression")),
        }
    }

    fn parse_const(&mut self) -> PResult<Node> {
        match self.advance().kind {
            TokenKind::Number(text) => {
                if text.contains('.') || text.contains('e') || text.contains('E') {
                    Ok(Node::Const(Datum::Decimal(text.parse().map_err(|_| {
                        ParseError::new(format!("invalid decimal literal '{}'", text), self.peek_pos())
                    })?)))
                } else {
                    Ok(Node::Const(Datum::Integer(text.parse().map_err(|_| {
                        ParseError::new(format!("invalid integer literal '{}'", text), self.peek_pos())
                    })?)))
                }
            }
            TokenKind::Duration(ns) => Ok(Node::Const(Datum::Datetime(ns))),
            TokenKind::Str(s) => Ok(Node::Const(Datum::String(s))),
            _ => unreachable!(),
        }
    }

    fn parse_array_literal(&mut self) -> PResult<Node> {
        self.eat_symbol("[")?;
        let mut elements = Vec::new();
        if self.peek() != &TokenKind::Symbol("]") {
            loop {
                match self.parse_const()? {
                    Node::Const(d) => elements.push(d),
                    _ => unreachable!(),
                }
                if self.peek() == &TokenKind::Symbol(",") {
                    self.advance();
                    continue;
                }
                break;
            }
        }
        self.eat_symbol("]")?;
        let scalar = elements
            .first()
            .and_then(|d| match d.tag() {
                crate::datum::DatumTag::Integer => Some(crate::datum::ScalarTag::Integer),
                crate::datum::DatumTag::Decimal => Some(crate::datum::ScalarTag::Decimal),
                crate::datum::DatumTag::String => Some(crate::datum::ScalarTag::String),
                crate::datum::DatumTag::Datetime => Some(crate::datum::ScalarTag::Datetime),
                crate::datum::DatumTag::Binary => Some(crate::datum::ScalarTag::Binary),
                crate::datum::DatumTag::Regex => Some(crate::datum::ScalarTag::Regex),
                crate::datum::DatumTag::Null | crate::datum::DatumTag::Array(_) => None,
            })
            .unwrap_or(crate::datum::ScalarTag::String);
        let array = Datum::array(scalar, elements).map_err(|_| self.err("inconsistent array element types"))?;
        Ok(Node::Const(array))
    }

    fn parse_value_ref(&mut self, ctx: ContextKind) -> PResult<Node> {
        let first = match self.advance().kind {
            TokenKind::Ident(s) => s,
            _ => unreachable!(),
        };
        if self.peek() == &TokenKind::Symbol(".") {
            let sibling_ctx = match first.to_ascii_lowercase().as_str() {
                "host" => Some(ContextKind::Host),
                "service" => Some(ContextKind::Service),
                "metric" => Some(ContextKind::Metric),
                _ => None,
            };
            if let Some(sib) = sibling_ctx {
                self.advance(); // '.'
                let field = match self.advance().kind {
                    TokenKind::Ident(s) => s,
                    _ => return Err(self.err("expected a field name after '.'")),
                };
                let inner = Node::Value(ValueRef::Field(field));
                return Ok(if sib == ctx { inner } else { Node::Typed { context: sib, expr: Box::new(inner) } });
            }
        }
        if self.peek() == &TokenKind::Symbol("[") {
            // attribute['key'] form
            self.advance();
            let key = self.parse_string_literal()?;
            self.eat_symbol("]")?;
            return Ok(Node::Value(ValueRef::Attribute(key)));
        }
        match first.to_ascii_lowercase().as_str() {
            "name" | "last_update" | "age" | "interval" | "backend" | "value" | "timeseries" => {
                Ok(Node::Value(ValueRef::Field(first.to_ascii_lowercase())))
            }
            _ => Ok(Node::Value(ValueRef::Attribute(first))),
        }
    }
}

pub fn parse_statements(input: &str) -> Result<Vec<Node>, ParseError> {
    let tokens = lex(input).map_err(|(msg, pos)| ParseError::new(msg, pos))?;
    let mut parser = Parser::new(tokens);
    let mut commands = Vec::new();
    loop {
        if parser.peek() == &TokenKind::Eof {
            break;
        }
        commands.push(parser.parse_command()?);
        if parser.peek() == &TokenKind::Symbol(";") {
            parser.advance();
        } else if parser.peek() != &TokenKind::Eof {
            return Err(parser.err("expected ';' between statements"));
        }
    }
    Ok(commands)
}

pub fn parse_conditional(input: &str, ctx: ContextKind) -> Result<Node, ParseError> {
    let tokens = lex(input).map_err(|(msg, pos)| ParseError::new(msg, pos))?;
    let mut parser = Parser::new(tokens);
    let node = parser.parse_or(ctx)?;
    if parser.peek() != &TokenKind::Eof {
        return Err(parser.err("unexpected trailing input"));
    }
    Ok(node)
}

pub fn parse_arithmetic(input: &str, ctx: ContextKind) -> Result<Node, ParseError> {
    let tokens = lex(input).map_err(|(msg, pos)| ParseError::new(msg, pos))?;
    let mut parser = Parser::new(tokens);
    let node = parser.parse_concat(ctx)?;
    if parser.peek() != &TokenKind::Eof {
        return Err(parser.err("unexpected trailing input"));
    }
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fetch_with_filter() {
        let cmds = parse_statements("FETCH host 'h1' FILTER name =~ 'web.*'").unwrap();
        assert_eq!(cmds.len(), 1);
        match &cmds[0] {
            Node::Fetch { kind: ObjectKind::Host, name, filter } => {
                assert_eq!(name, "h1");
                assert!(filter.is_some());
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn parses_lookup_with_and_or_precedence() {
        let node = parse_conditional("name = 'a' OR name = 'b' AND age < 5m", ContextKind::Host).unwrap();
        match node {
            Node::Operator { kind: OpKind::Or, .. } => {}
            other => panic!("expected OR at top level, got {:?}", other),
        }
    }

    #[test]
    fn parses_any_over_backend_array() {
        let node = parse_conditional("ANY backend = 'collectd'", ContextKind::Host).unwrap();
        match node {
            Node::Iterator { kind: IterKind::Any, .. } => {}
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn rejects_missing_semicolon() {
        let err = parse_statements("LIST host LIST service").unwrap_err();
        assert!(err.message.contains(';') || err.message.contains("semicolon"));
    }

    #[test]
    fn parses_two_word_attribute_object_kinds() {
        let cmds = parse_statements("LIST service attribute").unwrap();
        assert!(matches!(cmds[0], Node::List { kind: ObjectKind::ServiceAttribute, .. }));

        let cmds = parse_statements("LIST metric attributes").unwrap();
        assert!(matches!(cmds[0], Node::List { kind: ObjectKind::MetricAttribute, .. }));
    }

    #[test]
    fn parses_store_statement_with_last_update() {
        let cmds = parse_statements("STORE host 'h1' LAST UPDATE 1000").unwrap();
        match &cmds[0] {
            Node::Store { kind: ObjectKind::Host, name, timestamp: Some(1000) } => assert_eq!(name, "h1"),
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn parses_store_statement_without_last_update() {
        let cmds = parse_statements("STORE host 'h1'").unwrap();
        assert!(matches!(&cmds[0], Node::Store { kind: ObjectKind::Host, timestamp: None, .. }));
    }

    #[test]
    fn parses_timeseries_statement_with_start_and_end() {
        let cmds = parse_statements("TIMESERIES h1.cpu START 100 END 200").unwrap();
        match &cmds[0] {
            Node::Timeseries { host, metric, start: Some(100), end: Some(200) } => {
                assert_eq!(host, "h1");
                assert_eq!(metric, "cpu");
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }
}
