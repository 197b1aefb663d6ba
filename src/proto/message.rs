//! Wire message types (C9), values taken verbatim from the original
//! protocol header so any hand-written client against the real SysDB wire
//! format still talks to this daemon.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Ok,
    Error,
    Log,
    Idle,
    Ping,
    Startup,
    Query,
    Fetch,
    List,
    Lookup,
    Timeseries,
    Store,
    StoreHost,
    StoreService,
    StoreMetric,
    StoreAttribute,
    Data,
}

impl MessageType {
    pub fn as_u32(self) -> u32 {
        match self {
            MessageType::Ok | MessageType::Idle => 0,
            MessageType::Error | MessageType::Ping => 1,
            MessageType::Log | MessageType::Startup => 2,
            MessageType::Query => 3,
            MessageType::Fetch => 4,
            MessageType::List => 5,
            MessageType::Lookup => 6,
            MessageType::Timeseries => 7,
            MessageType::Store => 50,
            MessageType::StoreHost => 51,
            MessageType::StoreService => 52,
            MessageType::StoreMetric => 53,
            MessageType::StoreAttribute => 54,
            MessageType::Data => 100,
        }
    }
}

/// Reply message kinds (the set a server may send); client-only request
/// kinds share numeric values with these in the connection's idle state
/// (`IDLE == OK == 0`) per §4.8, so request decoding is handled separately
/// in [`crate::proto::codec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyType {
    Ok,
    Error,
    Log,
    Data,
}

impl ReplyType {
    pub fn as_u32(self) -> u32 {
        match self {
            ReplyType::Ok => 0,
            ReplyType::Error => 1,
            ReplyType::Log => 2,
            ReplyType::Data => 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    Startup,
    Ping,
    Query,
    Fetch,
    List,
    Lookup,
    Timeseries,
    StoreHost,
    StoreService,
    StoreMetric,
    StoreAttribute,
}

impl RequestType {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            2 => Some(RequestType::Startup),
            1 => Some(RequestType::Ping),
            3 => Some(RequestType::Query),
            4 => Some(RequestType::Fetch),
            5 => Some(RequestType::List),
            6 => Some(RequestType::Lookup),
            7 => Some(RequestType::Timeseries),
            51 => Some(RequestType::StoreHost),
            52 => Some(RequestType::StoreService),
            53 => Some(RequestType::StoreMetric),
            54 => Some(RequestType::StoreAttribute),
            _ => None,
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            RequestType::Startup => 2,
            RequestType::Ping => 1,
            RequestType::Query => 3,
            RequestType::Fetch => 4,
            RequestType::List => 5,
            RequestType::Lookup => 6,
            RequestType::Timeseries => 7,
            RequestType::StoreHost => 51,
            RequestType::StoreService => 52,
            RequestType::StoreMetric => 53,
            RequestType::StoreAttribute => 54,
        }
    }
}

/// Wire object-kind tags used in `LIST`/`FETCH`/`LOOKUP` bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireObjectKind {
    Host,
    Service,
    Metric,
    HostAttribute,
    ServiceAttribute,
    MetricAttribute,
}

impl WireObjectKind {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            1 => Some(WireObjectKind::Host),
            2 => Some(WireObjectKind::Service),
            3 => Some(WireObjectKind::Metric),
            4 => Some(WireObjectKind::HostAttribute),
            5 => Some(WireObjectKind::ServiceAttribute),
            6 => Some(WireObjectKind::MetricAttribute),
            _ => None,
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            WireObjectKind::Host => 1,
            WireObjectKind::Service => 2,
            WireObjectKind::Metric => 3,
            WireObjectKind::HostAttribute => 4,
            WireObjectKind::ServiceAttribute => 5,
            WireObjectKind::MetricAttribute => 6,
        }
    }

    pub fn to_ast(self) -> crate::sysql::ast::ObjectKind {
        use crate::sysql::ast::ObjectKind as A;
        match self {
            WireObjectKind::Host => A::Host,
            WireObjectKind::Service => A::Service,
            WireObjectKind::Metric => A::Metric,
            WireObjectKind::HostAttribute => A::HostAttribute,
            WireObjectKind::ServiceAttribute => A::ServiceAttribute,
            WireObjectKind::MetricAttribute => A::MetricAttribute,
        }
    }
}
