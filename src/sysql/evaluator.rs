//! Evaluator (C8): executes a planned [`Query`] against the store by
//! driving `Scan`/`Emit`/`EmitFull`, per the FETCH/LIST/LOOKUP dispatch in
//! §4.7. `Query.execute` only ever drives an infallible writer (the JSON
//! writer that backs network replies, §4.12) — IO failures belong to the
//! connection layer, not the query engine, so there is no writer error to
//! propagate here.

use std::convert::Infallible;

use crate::error::QueryError;
use crate::store::store::{Matcher, ObjectRef, Store};
use crate::store::writer::Writer;
use crate::sysql::ast::ObjectKind as AstObjectKind;
use crate::sysql::planner::{ast_kind_to_collection, Query};

impl Query {
    pub fn execute<W: Writer<Error = Infallible>>(&self, store: &Store, writer: &mut W) -> Result<(), QueryError> {
        match self.kind {
            crate::sysql::planner::QueryKind::Fetch => self.execute_fetch(store, writer),
            crate::sysql::planner::QueryKind::List => self.execute_list(store, writer),
            crate::sysql::planner::QueryKind::Lookup => self.execute_lookup(store, writer),
        }
    }

    fn execute_fetch<W: Writer<Error = Infallible>>(&self, store: &Store, writer: &mut W) -> Result<(), QueryError> {
        let name = self.name.as_deref().unwrap_or("");
        let filter = self.filter.as_ref().map(|f| f as &dyn Matcher);
        if is_attribute_kind(self.object_kind) {
            return self.fetch_attribute(store, name, filter, writer);
        }
        match self.object_kind {
            AstObjectKind::Host => store.with_host(name, |h| {
                let host = h.ok_or(QueryError::NotFound)?;
                let obj = ObjectRef::Host(host);
                if !filter.map_or(true, |f| f.matches(obj, None)) {
                    return Err(QueryError::NotFound);
                }
                store.emit_full(obj, filter, writer).unwrap();
                Ok(())
            }),
            AstObjectKind::Service | AstObjectKind::Metric => {
                let mut parts = name.splitn(2, '/');
                let host = parts.next().unwrap_or("");
                let child = parts.next().ok_or(QueryError::NotFound)?;
                let kind = ast_kind_to_collection(self.object_kind);
                store.with_child(host, kind, child, |obj| {
                    let obj = obj.ok_or(QueryError::NotFound)?;
                    if !filter.map_or(true, |f| f.matches(obj, None)) {
                        return Err(QueryError::NotFound);
                    }
                    store.emit_full(obj, filter, writer).unwrap();
                    Ok(())
                })
            }
            AstObjectKind::HostAttribute | AstObjectKind::ServiceAttribute | AstObjectKind::MetricAttribute => {
                unreachable!("handled above")
            }
        }
    }

    fn fetch_attribute<W: Writer<Error = Infallible>>(
        &self,
        store: &Store,
        name: &str,
        filter: Option<&dyn Matcher>,
        writer: &mut W,
    ) -> Result<(), QueryError> {
        let parts: Vec<&str> = name.split('/').collect();
        match self.object_kind {
            AstObjectKind::HostAttribute => {
                let [host, key] = parts[..] else { return Err(QueryError::NotFound) };
                store.with_host(host, |h| {
                    let host = h.ok_or(QueryError::NotFound)?;
                    let attr = ObjectRef::Host(host).attr(key).ok_or(QueryError::NotFound)?;
                    if !filter.map_or(true, |f| f.matches(attr, None)) {
                        return Err(QueryError::NotFound);
                    }
                    store.emit(attr, writer).unwrap();
                    Ok(())
                })
            }
            AstObjectKind::ServiceAttribute | AstObjectKind::MetricAttribute => {
                let [host, parent, key] = parts[..] else { return Err(QueryError::NotFound) };
                let kind = ast_kind_to_collection(self.object_kind);
                store.with_child(host, kind, parent, |obj| {
                    let obj = obj.ok_or(QueryError::NotFound)?;
                    let attr = obj.attr(key).ok_or(QueryError::NotFound)?;
                    if !filter.map_or(true, |f| f.matches(attr, None)) {
                        return Err(QueryError::NotFound);
                    }
                    store.emit(attr, writer).unwrap();
                    Ok(())
                })
            }
            _ => unreachable!("only attribute kinds reach here"),
        }
    }

    fn execute_list<W: Writer<Error = Infallible>>(&self, store: &Store, writer: &mut W) -> Result<(), QueryError> {
        let filter = self.filter.as_ref().map(|f| f as &dyn Matcher);
        let collection = ast_kind_to_collection(self.object_kind);
        if is_attribute_kind(self.object_kind) {
            store
                .scan(collection, None, None, |obj| {
                    for_each_attribute(obj, |attr| {
                        if filter.map_or(true, |f| f.matches(attr, None)) {
                            store.emit(attr, writer).unwrap();
                        }
                    });
                    Ok::<(), Infallible>(())
                })
                .unwrap();
        } else {
            // LIST passes no matcher: the scan applies only `filter`, per
            // §4.7 ("LIST ... applying only the filter").
            store.scan(collection, None, filter, |obj| store.emit(obj, writer)).unwrap();
        }
        Ok(())
    }

    fn execute_lookup<W: Writer<Error = Infallible>>(&self, store: &Store, writer: &mut W) -> Result<(), QueryError> {
        let filter = self.filter.as_ref().map(|f| f as &dyn Matcher);
        let matcher = self.matcher.as_ref().map(|m| m as &dyn Matcher);
        let collection = ast_kind_to_collection(self.object_kind);
        if is_attribute_kind(self.object_kind) {
            store
                .scan(collection, None, None, |obj| {
                    for_each_attribute(obj, |attr| {
                        let matched = match matcher {
                            Some(m) => m.matches(attr, filter),
                            None => filter.map_or(true, |f| f.matches(attr, None)),
                        };
                        if matched {
                            store.emit_full(attr, filter, writer).unwrap();
                        }
                    });
                    Ok::<(), Infallible>(())
                })
                .unwrap();
        } else {
            store.scan(collection, matcher, filter, |obj| store.emit_full(obj, filter, writer)).unwrap();
        }
        Ok(())
    }
}

fn is_attribute_kind(kind: AstObjectKind) -> bool {
    matches!(
        kind,
        AstObjectKind::HostAttribute | AstObjectKind::ServiceAttribute | AstObjectKind::MetricAttribute
    )
}

fn for_each_attribute<'a>(obj: ObjectRef<'a>, mut f: impl FnMut(ObjectRef<'a>)) {
    match obj {
        ObjectRef::Host(h) => {
            for (_, a) in h.attributes.iter() {
                f(ObjectRef::HostAttribute(h, a));
            }
        }
        ObjectRef::Service(h, s) => {
            for (_, a) in s.attributes.iter() {
                f(ObjectRef::ServiceAttribute(h, s, a));
            }
        }
        ObjectRef::Metric(h, m) => {
            for (_, a) in m.attributes.iter() {
                f(ObjectRef::MetricAttribute(h, m, a));
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::object::CollectionKind;
    use crate::sysql::parser::parse_statements;
    use crate::sysql::planner::plan;

    #[derive(Default)]
    struct RecordingWriter {
        calls: Vec<String>,
    }

    impl Writer for RecordingWriter {
        type Error = Infallible;

        fn store_host(&mut self, name: &str, _last_update: i64, _backends: &[String]) -> Result<(), Infallible> {
            self.calls.push(format!("host:{name}"));
            Ok(())
        }

        fn store_service(
            &mut self,
            host: &str,
            name: &str,
            _last_update: i64,
            _backends: &[String],
        ) -> Result<(), Infallible> {
            self.calls.push(format!("service:{host}/{name}"));
            Ok(())
        }

        fn store_metric(
            &mut self,
            host: &str,
            name: &str,
            _store: Option<&crate::store::object::TimeseriesStore>,
            _last_update: i64,
            _backends: &[String],
        ) -> Result<(), Infallible> {
            self.calls.push(format!("metric:{host}/{name}"));
            Ok(())
        }

        fn store_attribute(
            &mut self,
            host: &str,
            parent_kind: &str,
            parent_name: &str,
            key: &str,
            _value: &crate::datum::Datum,
            _last_update: i64,
            _backends: &[String],
        ) -> Result<(), Infallible> {
            self.calls.push(format!("attr:{host}/{parent_kind}/{parent_name}/{key}"));
            Ok(())
        }
    }

    fn seeded_store() -> Store {
        let store = Store::new();
        store.store_host("h1", 1, &[]).unwrap();
        store.store_host("h2", 1, &[]).unwrap();
        store.store_service("h1", "ssh", 1, &[]).unwrap();
        store.store_service("h2", "ssh", 1, &[]).unwrap();
        store
            .store_attribute("h1", CollectionKind::Host, "h1", "role", &crate::datum::Datum::String("web".into()), 1, &[])
            .unwrap();
        store
    }

    fn plan_one(sysql: &str) -> Query {
        let stmts = parse_statements(sysql).unwrap();
        plan(&stmts[0]).unwrap()
    }

    #[test]
    fn fetch_existing_host_emits_subtree() {
        let store = seeded_store();
        let query = plan_one("FETCH host 'h1'");
        let mut w = RecordingWriter::default();
        query.execute(&store, &mut w).unwrap();
        assert!(w.calls.contains(&"host:h1".to_string()));
        assert!(w.calls.iter().any(|c| c.starts_with("service:h1/ssh")));
        assert!(w.calls.iter().any(|c| c.starts_with("attr:h1/host/h1/role")));
    }

    #[test]
    fn fetch_missing_host_is_not_found() {
        let store = seeded_store();
        let query = plan_one("FETCH host 'nope'");
        let mut w = RecordingWriter::default();
        let err = query.execute(&store, &mut w).unwrap_err();
        assert!(matches!(err, QueryError::NotFound));
    }

    #[test]
    fn list_services_applies_filter_but_no_matcher() {
        let store = seeded_store();
        let stmts = parse_statements("LIST service FILTER host.name = 'h1'").unwrap();
        let query = plan(&stmts[0]).unwrap();
        let mut w = RecordingWriter::default();
        query.execute(&store, &mut w).unwrap();
        assert_eq!(w.calls, vec!["service:h1/ssh".to_string()]);
    }

    #[test]
    fn lookup_matches_services_by_name() {
        let store = seeded_store();
        let stmts = parse_statements("LOOKUP service name = 'ssh'").unwrap();
        let query = plan(&stmts[0]).unwrap();
        let mut w = RecordingWriter::default();
        query.execute(&store, &mut w).unwrap();
        assert_eq!(w.calls.iter().filter(|c| c.starts_with("service:")).count(), 2);
    }

    #[test]
    fn lookup_with_no_matches_emits_nothing() {
        let store = seeded_store();
        let stmts = parse_statements("LOOKUP service name = 'nope'").unwrap();
        let query = plan(&stmts[0]).unwrap();
        let mut w = RecordingWriter::default();
        query.execute(&store, &mut w).unwrap();
        assert!(w.calls.is_empty());
    }

    #[test]
    fn list_host_attributes_emits_each_attribute() {
        let store = seeded_store();
        let stmts = parse_statements("LIST attribute").unwrap();
        let query = plan(&stmts[0]).unwrap();
        assert_eq!(query.object_kind, AstObjectKind::HostAttribute);
        let mut w = RecordingWriter::default();
        query.execute(&store, &mut w).unwrap();
        assert_eq!(w.calls, vec!["attr:h1/host/h1/role".to_string()]);
    }
}
