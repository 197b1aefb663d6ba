//! The in-memory store (C3): a `Host` collection behind a single read-write
//! lock, plus the writer (ingestion) and reader (`Scan`/`Emit`/`EmitFull`/
//! `GetField`/`GetAttr`) contracts built on top of it.
//!
//! A plain `std::sync::RwLock` rather than `tokio::sync::RwLock`: every
//! reader here is synchronous (matcher evaluation walks references, never
//! awaits), so a guard is never held across an `.await` point and the
//! cheaper std lock is the right tool.

use std::sync::RwLock;

use crate::datum::Datum;
use crate::ordered_map::OrderedMap;
use crate::store::object::{
    Attribute, CollectionKind, Host, Metric, ObjectKind, ObjectMeta, Service, TimeseriesStore,
};
use crate::store::writer::Writer;
use crate::error::StoreError;

/// A borrowed handle to one object in the store, with enough context
/// (enclosing host, and service/metric for attributes) to evaluate fields
/// and attributes without re-walking the tree.
#[derive(Clone, Copy)]
pub enum ObjectRef<'a> {
    Host(&'a Host),
    Service(&'a Host, &'a Service),
    Metric(&'a Host, &'a Metric),
    HostAttribute(&'a Host, &'a Attribute),
    ServiceAttribute(&'a Host, &'a Service, &'a Attribute),
    MetricAttribute(&'a Host, &'a Metric, &'a Attribute),
}

impl<'a> ObjectRef<'a> {
    pub fn kind(&self) -> ObjectKind {
        match self {
            ObjectRef::Host(_) => ObjectKind::Host,
            ObjectRef::Service(..) => ObjectKind::Service,
            ObjectRef::Metric(..) => ObjectKind::Metric,
            ObjectRef::HostAttribute(..) => ObjectKind::HostAttribute,
            ObjectRef::ServiceAttribute(..) => ObjectKind::ServiceAttribute,
            ObjectRef::MetricAttribute(..) => ObjectKind::MetricAttribute,
        }
    }

    pub fn name(&self) -> &'a str {
        match self {
            ObjectRef::Host(h) => &h.name,
            ObjectRef::Service(_, s) => &s.name,
            ObjectRef::Metric(_, m) => &m.name,
            ObjectRef::HostAttribute(_, a) => &a.name,
            ObjectRef::ServiceAttribute(_, _, a) => &a.name,
            ObjectRef::MetricAttribute(_, _, a) => &a.name,
        }
    }

    pub fn meta(&self) -> &'a ObjectMeta {
        match self {
            ObjectRef::Host(h) => &h.meta,
            ObjectRef::Service(_, s) => &s.meta,
            ObjectRef::Metric(_, m) => &m.meta,
            ObjectRef::HostAttribute(_, a) => &a.meta,
            ObjectRef::ServiceAttribute(_, _, a) => &a.meta,
            ObjectRef::MetricAttribute(_, _, a) => &a.meta,
        }
    }

    pub fn host(&self) -> &'a Host {
        match self {
            ObjectRef::Host(h) => h,
            ObjectRef::Service(h, _) => h,
            ObjectRef::Metric(h, _) => h,
            ObjectRef::HostAttribute(h, _) => h,
            ObjectRef::ServiceAttribute(h, _, _) => h,
            ObjectRef::MetricAttribute(h, _, _) => h,
        }
    }

    /// The attribute value, for the three attribute variants; `None` for
    /// host/service/metric objects themselves.
    pub fn value(&self) -> Option<&'a Datum> {
        match self {
            ObjectRef::HostAttribute(_, a)
            | ObjectRef::ServiceAttribute(_, _, a)
            | ObjectRef::MetricAttribute(_, _, a) => Some(&a.value),
            _ => None,
        }
    }

    pub fn timeseries(&self) -> Option<&'a TimeseriesStore> {
        match self {
            ObjectRef::Metric(_, m) => m.store.as_ref(),
            _ => None,
        }
    }

    /// Look up `key` among this object's own attributes (host/service/metric
    /// only; attributes have no attributes of their own).
    pub fn attr(&self, key: &str) -> Option<ObjectRef<'a>> {
        match self {
            ObjectRef::Host(h) => h.attributes.lookup(key).map(|a| ObjectRef::HostAttribute(h, a)),
            ObjectRef::Service(h, s) => {
                s.attributes.lookup(key).map(|a| ObjectRef::ServiceAttribute(h, s, a))
            }
            ObjectRef::Metric(h, m) => {
                m.attributes.lookup(key).map(|a| ObjectRef::MetricAttribute(h, m, a))
            }
            _ => None,
        }
    }
}

/// A compiled predicate over store objects (C7's planner output, C8's
/// evaluator input). `filter` carries the query's `FILTER` clause context
/// through to nested (ANY/ALL) evaluation exactly as `sdb_memstore_matcher_matches`
/// threads its own `filter` argument.
pub trait Matcher {
    fn matches(&self, obj: ObjectRef, filter: Option<&dyn Matcher>) -> bool;
}

/// Matches everything; used where a query has no explicit `WHERE`/`FILTER`.
pub struct MatchAll;
impl Matcher for MatchAll {
    fn matches(&self, _obj: ObjectRef, _filter: Option<&dyn Matcher>) -> bool {
        true
    }
}

pub struct Store {
    hosts: RwLock<OrderedMap<Host>>,
}

impl Store {
    pub fn new() -> Self {
        Store { hosts: RwLock::new(OrderedMap::new()) }
    }

    // -- writer contract (§4.3) -------------------------------------------

    pub fn store_host(&self, name: &str, last_update: i64, backends: &[String]) -> Result<(), StoreError> {
        let mut hosts = self.hosts.write().unwrap();
        match hosts.lookup_mut(name) {
            Some(existing) => {
                upsert_meta(&mut existing.meta, last_update, backends);
                Ok(())
            }
            None => {
                let host = Host {
                    name: name.to_string(),
                    meta: ObjectMeta::new(last_update, backends),
                    services: OrderedMap::new(),
                    metrics: OrderedMap::new(),
                    attributes: OrderedMap::new(),
                };
                hosts.insert(name, host);
                Ok(())
            }
        }
    }

    pub fn store_service(
        &self,
        host: &str,
        name: &str,
        last_update: i64,
        backends: &[String],
    ) -> Result<(), StoreError> {
        let mut hosts = self.hosts.write().unwrap();
        let host = hosts.lookup_mut(host).ok_or(StoreError::ParentMissing)?;
        match host.services.lookup_mut(name) {
            Some(existing) => {
                upsert_meta(&mut existing.meta, last_update, backends);
            }
            None => {
                host.services.insert(
                    name,
                    Service {
                        name: name.to_string(),
                        host: host.name.clone(),
                        meta: ObjectMeta::new(last_update, backends),
                        attributes: OrderedMap::new(),
                    },
                );
            }
        }
        Ok(())
    }

    pub fn store_metric(
        &self,
        host: &str,
        name: &str,
        store: Option<TimeseriesStore>,
        last_update: i64,
        backends: &[String],
    ) -> Result<(), StoreError> {
        let mut hosts = self.hosts.write().unwrap();
        let host = hosts.lookup_mut(host).ok_or(StoreError::ParentMissing)?;
        match host.metrics.lookup_mut(name) {
            Some(existing) => {
                if upsert_meta(&mut existing.meta, last_update, backends) && store.is_some() {
                    existing.store = store;
                }
            }
            None => {
                host.metrics.insert(
                    name,
                    Metric {
                        name: name.to_string(),
                        host: host.name.clone(),
                        meta: ObjectMeta::new(last_update, backends),
                        store,
                        attributes: OrderedMap::new(),
                    },
                );
            }
        }
        Ok(())
    }

    pub fn store_attribute(
        &self,
        host: &str,
        parent_kind: CollectionKind,
        parent_name: &str,
        key: &str,
        value: &Datum,
        last_update: i64,
        backends: &[String],
    ) -> Result<(), StoreError> {
        let mut hosts = self.hosts.write().unwrap();
        let host = hosts.lookup_mut(host).ok_or(StoreError::ParentMissing)?;
        let attrs = match parent_kind {
            CollectionKind::Host => &mut host.attributes,
            CollectionKind::Service => {
                &mut host.services.lookup_mut(parent_name).ok_or(StoreError::ParentMissing)?.attributes
            }
            CollectionKind::Metric => {
                &mut host.metrics.lookup_mut(parent_name).ok_or(StoreError::ParentMissing)?.attributes
            }
        };
        match attrs.lookup_mut(key) {
            Some(existing) => {
                if upsert_meta(&mut existing.meta, last_update, backends) {
                    existing.value = value.clone();
                }
            }
            None => {
                attrs.insert(
                    key,
                    Attribute {
                        name: key.to_string(),
                        meta: ObjectMeta::new(last_update, backends),
                        value: value.clone(),
                    },
                );
            }
        }
        Ok(())
    }

    // -- reader contract ----------------------------------------------------

    pub fn with_host<R>(&self, name: &str, f: impl FnOnce(Option<&Host>) -> R) -> R {
        let hosts = self.hosts.read().unwrap();
        f(hosts.lookup(name))
    }

    /// Number of hosts currently tracked; used by the collector's periodic
    /// maintenance tick for logging, not for any correctness decision.
    pub fn host_count(&self) -> usize {
        self.hosts.read().unwrap().len()
    }

    pub fn with_child<R>(
        &self,
        host: &str,
        kind: CollectionKind,
        name: &str,
        f: impl FnOnce(Option<ObjectRef>) -> R,
    ) -> R {
        let hosts = self.hosts.read().unwrap();
        let host = match hosts.lookup(host) {
            Some(h) => h,
            None => return f(None),
        };
        let obj = match kind {
            CollectionKind::Host => None, // a host has no "child" of kind host
            CollectionKind::Service => host.services.lookup(name).map(|s| ObjectRef::Service(host, s)),
            CollectionKind::Metric => host.metrics.lookup(name).map(|m| ObjectRef::Metric(host, m)),
        };
        f(obj)
    }

    /// `sdb_memstore_scan`: full scan of all hosts restricted to `kind`.
    /// `filter` gates which hosts are visited at all; `matcher` selects the
    /// emitted objects within a visited host, itself evaluated with `filter`
    /// as matching context (so `ANY`/`ALL` sub-expressions see it too).
    pub fn scan<E>(
        &self,
        kind: CollectionKind,
        matcher: Option<&dyn Matcher>,
        filter: Option<&dyn Matcher>,
        mut callback: impl FnMut(ObjectRef) -> Result<(), E>,
    ) -> Result<(), E> {
        let hosts = self.hosts.read().unwrap();
        for (_, host) in hosts.iter() {
            if let Some(f) = filter {
                if !f.matches(ObjectRef::Host(host), None) {
                    continue;
                }
            }
            match kind {
                CollectionKind::Service => {
                    for (_, svc) in host.services.iter() {
                        let r = ObjectRef::Service(host, svc);
                        if matches_or_filter(matcher, filter, r) {
                            callback(r)?;
                        }
                    }
                }
                CollectionKind::Metric => {
                    for (_, metric) in host.metrics.iter() {
                        let r = ObjectRef::Metric(host, metric);
                        if matches_or_filter(matcher, filter, r) {
                            callback(r)?;
                        }
                    }
                }
                CollectionKind::Host => {
                    let r = ObjectRef::Host(host);
                    if matches_or_filter(matcher, filter, r) {
                        callback(r)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// `sdb_memstore_emit`: a single object, no attributes or children.
    pub fn emit<W: Writer>(&self, obj: ObjectRef, w: &mut W) -> Result<(), W::Error> {
        emit_one(obj, w)
    }

    /// `sdb_memstore_emit_full`: the object plus its attributes and (for
    /// hosts) its services and metrics, each gated by `filter` (evaluated
    /// with no further context, matching the original's `NULL` argument).
    pub fn emit_full<W: Writer>(
        &self,
        obj: ObjectRef,
        filter: Option<&dyn Matcher>,
        w: &mut W,
    ) -> Result<(), W::Error> {
        emit_one(obj, w)?;
        match obj {
            ObjectRef::Host(host) => {
                for (_, attr) in host.attributes.iter() {
                    let r = ObjectRef::HostAttribute(host, attr);
                    if filter.map_or(true, |f| f.matches(r, None)) {
                        self.emit_full(r, filter, w)?;
                    }
                }
                for (_, metric) in host.metrics.iter() {
                    let r = ObjectRef::Metric(host, metric);
                    if filter.map_or(true, |f| f.matches(r, None)) {
                        self.emit_full(r, filter, w)?;
                    }
                }
                for (_, svc) in host.services.iter() {
                    let r = ObjectRef::Service(host, svc);
                    if filter.map_or(true, |f| f.matches(r, None)) {
                        self.emit_full(r, filter, w)?;
                    }
                }
            }
            ObjectRef::Service(host, svc) => {
                for (_, attr) in svc.attributes.iter() {
                    let r = ObjectRef::ServiceAttribute(host, svc, attr);
                    if filter.map_or(true, |f| f.matches(r, None)) {
                        self.emit_full(r, filter, w)?;
                    }
                }
            }
            ObjectRef::Metric(host, metric) => {
                for (_, attr) in metric.attributes.iter() {
                    let r = ObjectRef::MetricAttribute(host, metric, attr);
                    if filter.map_or(true, |f| f.matches(r, None)) {
                        self.emit_full(r, filter, w)?;
                    }
                }
            }
            // attributes have no children
            ObjectRef::HostAttribute(..) | ObjectRef::ServiceAttribute(..) | ObjectRef::MetricAttribute(..) => {}
        }
        Ok(())
    }

    pub fn get_attr(&self, obj: ObjectRef, key: &str, filter: Option<&dyn Matcher>) -> Option<Datum> {
        let attr = obj.attr(key)?;
        if let Some(f) = filter {
            if !f.matches(attr, None) {
                return None;
            }
        }
        attr.value().cloned()
    }
}

impl Default for Store {
    fn default() -> Self {
        Store::new()
    }
}

/// `sdb_memstore_matcher_matches(m, obj, filter)`: filter always gates first
/// (with no further context); a `None` matcher matches everything that
/// passes the filter, matching the original's "NULL always matches" rule.
fn matches_or_filter(matcher: Option<&dyn Matcher>, filter: Option<&dyn Matcher>, obj: ObjectRef) -> bool {
    match matcher {
        Some(m) => m.matches(obj, filter),
        None => filter.map_or(true, |f| f.matches(obj, None)),
    }
}

fn emit_one<W: Writer>(obj: ObjectRef, w: &mut W) -> Result<(), W::Error> {
    match obj {
        ObjectRef::Host(h) => w.store_host(&h.name, h.meta.last_update, h.meta.backends.as_slice()),
        ObjectRef::Service(h, s) => {
            w.store_service(&h.name, &s.name, s.meta.last_update, s.meta.backends.as_slice())
        }
        ObjectRef::Metric(h, m) => w.store_metric(
            &h.name,
            &m.name,
            m.store.as_ref(),
            m.meta.last_update,
            m.meta.backends.as_slice(),
        ),
        ObjectRef::HostAttribute(h, a) => {
            w.store_attribute(&h.name, "host", &h.name, &a.name, &a.value, a.meta.last_update, a.meta.backends.as_slice())
        }
        ObjectRef::ServiceAttribute(h, s, a) => {
            w.store_attribute(&h.name, "service", &s.name, &a.name, &a.value, a.meta.last_update, a.meta.backends.as_slice())
        }
        ObjectRef::MetricAttribute(h, m, a) => {
            w.store_attribute(&h.name, "metric", &m.name, &a.name, &a.value, a.meta.last_update, a.meta.backends.as_slice())
        }
    }
}

/// The upsert algorithm from `store_obj()` in the original store: stale
/// writes (older `last_update`) are dropped, equal timestamps are a no-op,
/// and a newer write re-estimates `interval` as a 90/10 exponential blend of
/// the previous estimate and the observed delta.
/// Merges `backends` unconditionally, then advances `last_update`/`interval`
/// only for a strictly newer write. Returns whether it advanced, so callers
/// know whether to also replace the fields that must track the newest write
/// (an attribute's `value`, a metric's time-series store descriptor) rather
/// than a stale or equal-timestamp one (§4.3 step 5: "leave unchanged").
fn upsert_meta(meta: &mut ObjectMeta, last_update: i64, backends: &[String]) -> bool {
    meta.backends.extend(backends);
    if last_update <= meta.last_update {
        return false;
    }
    let delta = last_update - meta.last_update;
    meta.last_update = last_update;
    meta.interval = if meta.interval != 0 {
        ((0.9 * meta.interval as f64) + (0.1 * delta as f64)) as i64
    } else {
        delta
    };
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_write_is_ignored() {
        let store = Store::new();
        store.store_host("h1", 100, &[]).unwrap();
        store.store_host("h1", 50, &[]).unwrap();
        store.with_host("h1", |h| assert_eq!(h.unwrap().meta.last_update, 100));
    }

    #[test]
    fn interval_uses_first_delta_then_smooths() {
        let store = Store::new();
        store.store_host("h1", 0, &[]).unwrap();
        store.store_host("h1", 10, &[]).unwrap();
        store.with_host("h1", |h| assert_eq!(h.unwrap().meta.interval, 10));
        store.store_host("h1", 20, &[]).unwrap();
        store.with_host("h1", |h| assert_eq!(h.unwrap().meta.interval, 10));
    }

    #[test]
    fn service_requires_existing_host() {
        let store = Store::new();
        let err = store.store_service("missing", "svc", 1, &[]).unwrap_err();
        assert_eq!(err, StoreError::ParentMissing);
    }

    #[test]
    fn scan_services_gates_host_with_filter() {
        let store = Store::new();
        store.store_host("h1", 1, &[]).unwrap();
        store.store_host("h2", 1, &[]).unwrap();
        store.store_service("h1", "ssh", 1, &[]).unwrap();
        store.store_service("h2", "ssh", 1, &[]).unwrap();

        struct OnlyH1;
        impl Matcher for OnlyH1 {
            fn matches(&self, obj: ObjectRef, _filter: Option<&dyn Matcher>) -> bool {
                obj.host().name == "h1"
            }
        }

        let mut seen = Vec::new();
        store
            .scan::<()>(CollectionKind::Service, None, Some(&OnlyH1), |r| {
                seen.push(r.host().name.to_string());
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, vec!["h1"]);
    }

    #[test]
    fn backends_merge_case_insensitively_across_writes() {
        let store = Store::new();
        store.store_host("h1", 1, &["collectd".to_string()]).unwrap();
        store.store_host("h1", 2, &["Collectd".to_string(), "puppet".to_string()]).unwrap();
        store.with_host("h1", |h| {
            assert_eq!(h.unwrap().meta.backends.as_slice(), &["collectd".to_string(), "puppet".to_string()]);
        });
    }
}
