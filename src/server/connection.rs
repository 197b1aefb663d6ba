//! Per-connection state and dispatch (C10). Each accepted socket is driven
//! to completion by exactly one worker (§4.10); this module owns the
//! read-frame/dispatch/reply-frame cycle for a single connection.
//!
//! The original read loop buffers bytes non-blocking and tracks a partial
//! command's type/length across poll iterations by hand. Under async Rust
//! that bookkeeping is exactly what `AsyncReadExt::read_exact` already does
//! against a buffered stream — the suspension point is the same one named
//! in §5 ("network reads/writes"), just expressed as an `.await` instead of
//! a `would-block` return. There is nothing left for a connection to track
//! between frames beyond the authentication state itself.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use crate::error::{ConnError, ProtoError, QueryError};
use crate::proto::codec::{decode_header, encode_frame, BodyReader, BodyWriter, HEADER_LEN};
use crate::proto::json_writer::JsonWriter;
use crate::proto::message::{ReplyType, RequestType, WireObjectKind};
use crate::store::object::CollectionKind;
use crate::store::store::Store;
use crate::sysql::ast::{Node, ObjectKind};
use crate::sysql::{analyze_statement, parse_conditional, parse_statements, plan};

/// Drives one connection until EOF or a fatal IO/protocol error. Per §4.9,
/// a fatal error just closes this connection — it never propagates to the
/// rest of the server.
pub async fn handle(mut stream: UnixStream, store: Arc<Store>) {
    let mut ready = false;
    loop {
        let frame = match read_frame(&mut stream).await {
            Ok(Some(frame)) => frame,
            Ok(None) => return,
            Err(e) => {
                tracing::debug!("connection closed on protocol error: {e}");
                return;
            }
        };
        let (msg_type, body) = frame;

        let reply = match RequestType::from_u32(msg_type) {
            None => error_reply(&format!("Invalid command {msg_type}")),
            Some(RequestType::Startup) => dispatch_startup(&mut ready, &body),
            Some(_) if !ready => error_reply("Authentication required"),
            Some(RequestType::Ping) => ok_reply(None),
            Some(RequestType::Query) => dispatch_query(&store, &body),
            Some(RequestType::Fetch) => dispatch_fetch(&store, &body),
            Some(RequestType::List) => dispatch_list(&store, &body),
            Some(RequestType::Lookup) => dispatch_lookup(&store, &body),
            Some(RequestType::Timeseries) => error_reply("time-series retrieval is not implemented"),
            Some(RequestType::StoreHost) => dispatch_store_host(&store, &body),
            Some(RequestType::StoreService) => dispatch_store_service(&store, &body),
            Some(RequestType::StoreMetric) => dispatch_store_metric(&store, &body),
            Some(RequestType::StoreAttribute) => dispatch_store_attribute(&store, &body),
        };

        if write_frame(&mut stream, reply).await.is_err() {
            return;
        }
    }
}

async fn read_frame(stream: &mut UnixStream) -> Result<Option<(u32, Vec<u8>)>, ConnError> {
    let mut header = [0u8; HEADER_LEN];
    match stream.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(ConnError::Io(e)),
    }
    let (msg_type, len) = decode_header(&header)?;
    let mut body = vec![0u8; len as usize];
    stream.read_exact(&mut body).await?;
    Ok(Some((msg_type, body)))
}

async fn write_frame(stream: &mut UnixStream, (reply_type, body): (u32, Vec<u8>)) -> std::io::Result<()> {
    stream.write_all(&encode_frame(reply_type, &body)).await
}

fn ok_reply(message: Option<&str>) -> (u32, Vec<u8>) {
    (ReplyType::Ok.as_u32(), message.map(|m| m.as_bytes().to_vec()).unwrap_or_default())
}

fn error_reply(message: &str) -> (u32, Vec<u8>) {
    (ReplyType::Error.as_u32(), message.as_bytes().to_vec())
}

fn data_reply(sub_type: u32, json: &serde_json::Value) -> (u32, Vec<u8>) {
    let mut w = BodyWriter::new();
    w.u32(sub_type).raw(json.to_string().as_bytes());
    (ReplyType::Data.as_u32(), w.into_bytes())
}

fn dispatch_startup(ready: &mut bool, body: &[u8]) -> (u32, Vec<u8>) {
    match std::str::from_utf8(body) {
        Ok(username) if !username.is_empty() => {
            *ready = true;
            ok_reply(None)
        }
        Ok(_) => error_reply("STARTUP requires a non-empty username"),
        Err(_) => error_reply("STARTUP username is not valid UTF-8"),
    }
}

fn dispatch_query(store: &Store, body: &[u8]) -> (u32, Vec<u8>) {
    let text = match std::str::from_utf8(body) {
        Ok(t) => t,
        Err(_) => return error_reply("QUERY body is not valid UTF-8"),
    };
    match run_query_text(store, text) {
        Ok(json) => data_reply(RequestType::Query.as_u32(), &json),
        Err(e) => error_reply(&e.to_string()),
    }
}

fn run_query_text(store: &Store, text: &str) -> Result<serde_json::Value, QueryError> {
    let statements = parse_statements(text)?;
    let node = statements.first().ok_or_else(|| QueryError::Analyze(crate::error::AnalyzeError("empty statement".to_string())))?;
    analyze_statement(node).map_err(QueryError::Analyze)?;
    let query = plan(node)?;
    let mut writer = JsonWriter::new();
    query.execute(store, &mut writer)?;
    Ok(serde_json::Value::Array(writer.results))
}

fn dispatch_fetch(store: &Store, body: &[u8]) -> (u32, Vec<u8>) {
    let mut r = BodyReader::new(body);
    let kind = match r.u32().ok().and_then(WireObjectKind::from_u32) {
        Some(k) => k.to_ast(),
        None => return error_reply("FETCH: unknown object kind"),
    };
    let name = match r.string() {
        Ok(s) => s,
        Err(e) => return error_reply(&e.to_string()),
    };
    let node = Node::Fetch { kind, name, filter: None };
    match run_structured(store, &node, RequestType::Fetch.as_u32()) {
        Ok(reply) => reply,
        Err(e) => error_reply(&e.to_string()),
    }
}

fn dispatch_list(store: &Store, body: &[u8]) -> (u32, Vec<u8>) {
    let mut r = BodyReader::new(body);
    let kind = if r.has_remaining() {
        match r.u32().ok().and_then(WireObjectKind::from_u32) {
            Some(k) => k.to_ast(),
            None => return error_reply("LIST: unknown object kind"),
        }
    } else {
        ObjectKind::Host
    };
    let node = Node::List { kind, filter: None };
    match run_structured(store, &node, RequestType::List.as_u32()) {
        Ok(reply) => reply,
        Err(e) => error_reply(&e.to_string()),
    }
}

fn dispatch_lookup(store: &Store, body: &[u8]) -> (u32, Vec<u8>) {
    let mut r = BodyReader::new(body);
    let kind = match r.u32().ok().and_then(WireObjectKind::from_u32) {
        Some(k) => k.to_ast(),
        None => return error_reply("LOOKUP: unknown object kind"),
    };
    let match_text = match r.string() {
        Ok(s) => s,
        Err(e) => return error_reply(&e.to_string()),
    };
    let matcher = match parse_conditional(&match_text, kind.context()) {
        Ok(m) => m,
        Err(e) => return error_reply(&e.to_string()),
    };
    let node = Node::Lookup { kind, matcher: Box::new(matcher), filter: None };
    match run_structured(store, &node, RequestType::Lookup.as_u32()) {
        Ok(reply) => reply,
        Err(e) => error_reply(&e.to_string()),
    }
}

fn run_structured(store: &Store, node: &Node, sub_type: u32) -> Result<(u32, Vec<u8>), QueryError> {
    analyze_statement(node).map_err(QueryError::Analyze)?;
    let query = plan(node)?;
    let mut writer = JsonWriter::new();
    query.execute(store, &mut writer)?;
    Ok(data_reply(sub_type, &serde_json::Value::Array(writer.results)))
}

fn dispatch_store_host(store: &Store, body: &[u8]) -> (u32, Vec<u8>) {
    let mut r = BodyReader::new(body);
    let decoded = (|| -> Result<_, ProtoError> {
        let name = r.string()?;
        let last_update = r.i64()?;
        let backends = r.string_list()?;
        Ok((name, last_update, backends))
    })();
    let (name, last_update, backends) = match decoded {
        Ok(v) => v,
        Err(e) => return error_reply(&e.to_string()),
    };
    match store.store_host(&name, last_update, &backends) {
        Ok(()) => ok_reply(Some("host stored")),
        Err(e) => error_reply(&e.to_string()),
    }
}

fn dispatch_store_service(store: &Store, body: &[u8]) -> (u32, Vec<u8>) {
    let mut r = BodyReader::new(body);
    let decoded = (|| -> Result<_, ProtoError> {
        let host = r.string()?;
        let name = r.string()?;
        let last_update = r.i64()?;
        let backends = r.string_list()?;
        Ok((host, name, last_update, backends))
    })();
    let (host, name, last_update, backends) = match decoded {
        Ok(v) => v,
        Err(e) => return error_reply(&e.to_string()),
    };
    match store.store_service(&host, &name, last_update, &backends) {
        Ok(()) => ok_reply(Some("service stored")),
        Err(e) => error_reply(&e.to_string()),
    }
}

fn dispatch_store_metric(store: &Store, body: &[u8]) -> (u32, Vec<u8>) {
    let mut r = BodyReader::new(body);
    let decoded = (|| -> Result<_, ProtoError> {
        let host = r.string()?;
        let name = r.string()?;
        let has_store = r.u8()? != 0;
        let ts = if has_store {
            let kind = r.string()?;
            let id = r.string()?;
            Some(crate::store::object::TimeseriesStore { kind, id })
        } else {
            None
        };
        let last_update = r.i64()?;
        let backends = r.string_list()?;
        Ok((host, name, ts, last_update, backends))
    })();
    let (host, name, ts, last_update, backends) = match decoded {
        Ok(v) => v,
        Err(e) => return error_reply(&e.to_string()),
    };
    match store.store_metric(&host, &name, ts, last_update, &backends) {
        Ok(()) => ok_reply(Some("metric stored")),
        Err(e) => error_reply(&e.to_string()),
    }
}

fn dispatch_store_attribute(store: &Store, body: &[u8]) -> (u32, Vec<u8>) {
    let mut r = BodyReader::new(body);
    let decoded = (|| -> Result<_, ProtoError> {
        let host = r.string()?;
        let parent_kind_tag = r.u32()?;
        let parent_name = r.string()?;
        let key = r.string()?;
        let value = r.datum()?;
        let last_update = r.i64()?;
        let backends = r.string_list()?;
        Ok((host, parent_kind_tag, parent_name, key, value, last_update, backends))
    })();
    let (host, parent_kind_tag, parent_name, key, value, last_update, backends) = match decoded {
        Ok(v) => v,
        Err(e) => return error_reply(&e.to_string()),
    };
    let parent_kind = match parent_kind_tag {
        1 => CollectionKind::Host,
        2 => CollectionKind::Service,
        3 => CollectionKind::Metric,
        t => return error_reply(&format!("unknown parent kind {t}")),
    };
    match store.store_attribute(&host, parent_kind, &parent_name, &key, &value, last_update, &backends) {
        Ok(()) => ok_reply(Some("attribute stored")),
        Err(e) => error_reply(&e.to_string()),
    }
}
