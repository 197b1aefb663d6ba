//! The writer contract (C13): four `store_*` calls that both the in-memory
//! store (ingestion) and the JSON reply encoder (serialization via `Emit`)
//! implement. Grounded directly on `sdb_store_writer_t` in the original
//! store: a single interface drives both directions, so `Emit`/`EmitFull`
//! need nothing beyond replaying an object through the same calls a backend
//! would have used to store it.

use crate::datum::Datum;
use crate::store::object::TimeseriesStore;

pub trait Writer {
    type Error;

    fn store_host(
        &mut self,
        name: &str,
        last_update: i64,
        backends: &[String],
    ) -> Result<(), Self::Error>;

    fn store_service(
        &mut self,
        host: &str,
        name: &str,
        last_update: i64,
        backends: &[String],
    ) -> Result<(), Self::Error>;

    fn store_metric(
        &mut self,
        host: &str,
        name: &str,
        store: Option<&TimeseriesStore>,
        last_update: i64,
        backends: &[String],
    ) -> Result<(), Self::Error>;

    /// `parent_kind` is `"host"`, `"service"`, or `"metric"`; `parent_name`
    /// identifies the attribute's direct parent within `host`.
    fn store_attribute(
        &mut self,
        host: &str,
        parent_kind: &str,
        parent_name: &str,
        key: &str,
        value: &Datum,
        last_update: i64,
        backends: &[String],
    ) -> Result<(), Self::Error>;
}
