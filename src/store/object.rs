//! Store object kinds: Host, Service, Metric, Attribute (§3).
//!
//! Parent back-edges are encoded as plain owning-path data (host/service
//! names) rather than pointers, per the design note in spec.md §9: since a
//! host is always addressable by name at the top of the store, "parent" for
//! a service/metric/attribute is just the name(s) needed to look it back up
//! through the store's own collections — a non-owning index, not a
//! reference, so there is no cycle to avoid and no `Weak` bookkeeping.

use crate::datum::Datum;
use crate::ordered_map::OrderedMap;

/// Fields common to every store object kind.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    /// Nanoseconds since the Unix epoch.
    pub last_update: i64,
    /// Exponentially smoothed estimate of the update period, in nanoseconds.
    /// Zero until a second write establishes a first delta.
    pub interval: i64,
    pub backends: BackendSet,
}

impl ObjectMeta {
    pub fn new(last_update: i64, backends: &[String]) -> Self {
        let mut set = BackendSet::new();
        set.extend(backends);
        ObjectMeta { last_update, interval: 0, backends: set }
    }
}

/// A case-insensitive set of backend names that preserves insertion casing
/// and order, matching `record_backends`'s linear case-insensitive scan in
/// the original store.
#[derive(Debug, Clone, Default)]
pub struct BackendSet(Vec<String>);

impl BackendSet {
    pub fn new() -> Self {
        BackendSet(Vec::new())
    }

    pub fn extend(&mut self, names: &[String]) {
        for name in names {
            if !self.0.iter().any(|existing| existing.eq_ignore_ascii_case(name)) {
                self.0.push(name.clone());
            }
        }
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

/// Identifies a time-series backing store attached to a metric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeseriesStore {
    pub kind: String,
    pub id: String,
}

#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: String,
    pub meta: ObjectMeta,
    pub value: Datum,
}

#[derive(Debug, Clone)]
pub struct Service {
    pub name: String,
    pub host: String,
    pub meta: ObjectMeta,
    pub attributes: OrderedMap<Attribute>,
}

#[derive(Debug, Clone)]
pub struct Metric {
    pub name: String,
    pub host: String,
    pub meta: ObjectMeta,
    pub store: Option<TimeseriesStore>,
    pub attributes: OrderedMap<Attribute>,
}

#[derive(Debug, Clone)]
pub struct Host {
    pub name: String,
    pub meta: ObjectMeta,
    pub services: OrderedMap<Service>,
    pub metrics: OrderedMap<Metric>,
    pub attributes: OrderedMap<Attribute>,
}

/// The four object kinds, used wherever code needs to dispatch on kind
/// without holding a concrete object (e.g. `Scan`, wire `FETCH`/`LIST`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Host,
    Service,
    Metric,
    HostAttribute,
    ServiceAttribute,
    MetricAttribute,
}

impl ObjectKind {
    /// The collection a `Scan` over this kind descends into at the host
    /// level: `Host` itself, or one of its child collections.
    pub fn collection(self) -> CollectionKind {
        match self {
            ObjectKind::Host | ObjectKind::HostAttribute => CollectionKind::Host,
            ObjectKind::Service | ObjectKind::ServiceAttribute => CollectionKind::Service,
            ObjectKind::Metric | ObjectKind::MetricAttribute => CollectionKind::Metric,
        }
    }

    pub fn is_attribute(self) -> bool {
        matches!(
            self,
            ObjectKind::HostAttribute | ObjectKind::ServiceAttribute | ObjectKind::MetricAttribute
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    Host,
    Service,
    Metric,
}
