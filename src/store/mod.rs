pub mod object;
pub mod store;
pub mod writer;

pub use object::{
    Attribute, BackendSet, CollectionKind, Host, Metric, ObjectKind, ObjectMeta, Service,
    TimeseriesStore,
};
pub use store::{MatchAll, Matcher, ObjectRef, Store};
pub use writer::Writer;
