//! A `Writer` (§4.12) that replays store objects into `serde_json::Value`
//! trees for `DATA` replies. The ingestion side of the same trait lives on
//! `Store` itself (`src/store/store.rs`) — this is the other direction: the
//! same four calls, driven by `Scan`/`Emit`/`EmitFull`, building output
//! instead of mutating the store.
//!
//! Nesting relies on the call order `Store::emit_full` guarantees: a
//! host/service/metric is always followed immediately by its own attributes
//! (and, for a host, its metrics and services) before any sibling is
//! touched. `JsonWriter` tracks only "the currently open host" and "the
//! currently open service/metric", updated as those calls arrive, rather
//! than a full stack — the guarantee makes that enough.

use std::convert::Infallible;

use serde_json::{json, Map, Value};

use crate::datum::{Datum, QuoteStyle};
use crate::store::object::TimeseriesStore;
use crate::store::writer::Writer;

enum ChildLoc {
    /// A service/metric nested under the currently open host, at this index
    /// of `results[host_idx][array]`.
    HostChild { host_idx: usize, array: &'static str, idx: usize },
    /// A service/metric emitted at the top level (a `LIST`/`LOOKUP` over
    /// services/metrics visits no host at all).
    Root(usize),
}

pub struct JsonWriter {
    pub results: Vec<Value>,
    current_host: Option<(usize, String)>,
    current_child: Option<ChildLoc>,
}

impl JsonWriter {
    pub fn new() -> Self {
        JsonWriter { results: Vec::new(), current_host: None, current_child: None }
    }

    fn child_object_mut(&mut self) -> Option<&mut Map<String, Value>> {
        match self.current_child.as_ref()? {
            ChildLoc::Root(idx) => self.results.get_mut(*idx)?.as_object_mut(),
            ChildLoc::HostChild { host_idx, array, idx } => self.results.get_mut(*host_idx)?.get_mut(*array)?.as_array_mut()?.get_mut(*idx)?.as_object_mut(),
        }
    }

    fn host_object_mut(&mut self, host: &str) -> Option<&mut Map<String, Value>> {
        let (idx, name) = self.current_host.as_ref()?;
        if name != host {
            return None;
        }
        self.results.get_mut(*idx)?.as_object_mut()
    }
}

impl Default for JsonWriter {
    fn default() -> Self {
        JsonWriter::new()
    }
}

impl Writer for JsonWriter {
    type Error = Infallible;

    fn store_host(&mut self, name: &str, last_update: i64, backends: &[String]) -> Result<(), Infallible> {
        self.results.push(json!({
            "kind": "host",
            "name": name,
            "last_update": format_timestamp(last_update),
            "backend": backends,
            "attributes": {},
            "services": [],
            "metrics": [],
        }));
        self.current_host = Some((self.results.len() - 1, name.to_string()));
        self.current_child = None;
        Ok(())
    }

    fn store_service(&mut self, host: &str, name: &str, last_update: i64, backends: &[String]) -> Result<(), Infallible> {
        let obj = json!({
            "kind": "service",
            "host": host,
            "name": name,
            "last_update": format_timestamp(last_update),
            "backend": backends,
            "attributes": {},
        });
        if let Some(parent) = self.host_object_mut(host) {
            let arr = parent.get_mut("services").and_then(Value::as_array_mut).expect("services is an array");
            arr.push(obj);
            let idx = arr.len() - 1;
            let host_idx = self.current_host.as_ref().unwrap().0;
            self.current_child = Some(ChildLoc::HostChild { host_idx, array: "services", idx });
        } else {
            self.results.push(obj);
            self.current_child = Some(ChildLoc::Root(self.results.len() - 1));
        }
        Ok(())
    }

    fn store_metric(
        &mut self,
        host: &str,
        name: &str,
        store: Option<&TimeseriesStore>,
        last_update: i64,
        backends: &[String],
    ) -> Result<(), Infallible> {
        let store_json = match store {
            Some(ts) => json!({"kind": ts.kind, "id": ts.id}),
            None => Value::Null,
        };
        let obj = json!({
            "kind": "metric",
            "host": host,
            "name": name,
            "last_update": format_timestamp(last_update),
            "backend": backends,
            "store": store_json,
            "attributes": {},
        });
        if let Some(parent) = self.host_object_mut(host) {
            let arr = parent.get_mut("metrics").and_then(Value::as_array_mut).expect("metrics is an array");
            arr.push(obj);
            let idx = arr.len() - 1;
            let host_idx = self.current_host.as_ref().unwrap().0;
            self.current_child = Some(ChildLoc::HostChild { host_idx, array: "metrics", idx });
        } else {
            self.results.push(obj);
            self.current_child = Some(ChildLoc::Root(self.results.len() - 1));
        }
        Ok(())
    }

    fn store_attribute(
        &mut self,
        host: &str,
        parent_kind: &str,
        parent_name: &str,
        key: &str,
        value: &Datum,
        last_update: i64,
        backends: &[String],
    ) -> Result<(), Infallible> {
        let attr = json!({"value": datum_to_json(value), "last_update": format_timestamp(last_update), "backend": backends});
        let parent_obj = match parent_kind {
            "host" => self.host_object_mut(host),
            _ => self.child_object_mut(),
        };
        let attached = parent_obj
            .and_then(|o| o.get_mut("attributes"))
            .and_then(Value::as_object_mut)
            .map(|m| {
                m.insert(key.to_string(), attr);
            });
        if attached.is_none() {
            // A root-level attribute query (`LIST attribute`/`LOOKUP attribute`):
            // no enclosing host/service/metric object was opened.
            self.results.push(json!({
                "kind": "attribute",
                "host": host,
                "parent_kind": parent_kind,
                "parent_name": parent_name,
                "key": key,
                "value": datum_to_json(value),
                "last_update": format_timestamp(last_update),
                "backend": backends,
            }));
        }
        Ok(())
    }
}

pub fn datum_to_json(d: &Datum) -> Value {
    match d {
        Datum::Null => Value::Null,
        Datum::Integer(i) => json!(i),
        Datum::Decimal(f) => json!(f),
        Datum::String(s) => json!(s),
        Datum::Datetime(ns) => json!(format_timestamp(*ns)),
        Datum::Binary(b) => json!(b),
        Datum::Regex(r) => json!(r.source),
        Datum::Array(a) => Value::Array(a.elements.iter().map(datum_to_json).collect()),
    }
}

/// Renders a nanosecond epoch timestamp the same human-readable way a
/// `Datum::Datetime` formats for SysQL output, so a `DATA` reply's
/// `last_update`/attribute-value fields read the same whichever path
/// produced them.
fn format_timestamp(ns: i64) -> String {
    Datum::Datetime(ns).format(QuoteStyle::None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_with_service_nests_in_services_array() {
        let mut w = JsonWriter::new();
        w.store_host("h1", 1, &[]).unwrap();
        w.store_service("h1", "ssh", 1, &[]).unwrap();
        w.store_attribute("h1", "service", "ssh", "port", &Datum::Integer(22), 1, &[]).unwrap();
        assert_eq!(w.results.len(), 1);
        let services = w.results[0]["services"].as_array().unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0]["attributes"]["port"]["value"], json!(22));
    }

    #[test]
    fn list_of_services_emits_flat_top_level_entries() {
        let mut w = JsonWriter::new();
        w.store_service("h1", "ssh", 1, &[]).unwrap();
        w.store_service("h2", "ssh", 1, &[]).unwrap();
        assert_eq!(w.results.len(), 2);
        assert_eq!(w.results[0]["host"], json!("h1"));
    }

    #[test]
    fn root_level_attribute_query_has_no_parent_object() {
        let mut w = JsonWriter::new();
        w.store_attribute("h1", "host", "h1", "role", &Datum::String("web".into()), 1, &[]).unwrap();
        assert_eq!(w.results.len(), 1);
        assert_eq!(w.results[0]["key"], json!("role"));
    }
}
