//! Connection-level seed scenarios: the auth gate and frame-resumption
//! behavior described for the per-connection dispatch loop, driven over a
//! real `UnixStream` pair so the read-frame/dispatch/reply cycle runs
//! exactly as it would for a network peer.

use std::sync::Arc;

use sysdb::proto::{decode_header, encode_frame, MessageType};
use sysdb::store::Store;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

async fn read_reply(stream: &mut UnixStream) -> (u32, Vec<u8>) {
    let mut header = [0u8; 8];
    stream.read_exact(&mut header).await.unwrap();
    let (msg_type, len) = decode_header(&header).unwrap();
    let mut body = vec![0u8; len as usize];
    stream.read_exact(&mut body).await.unwrap();
    (msg_type, body)
}

#[tokio::test]
async fn auth_gate_rejects_commands_before_startup() {
    let (client, server) = UnixStream::pair().unwrap();
    let store = Arc::new(Store::new());
    tokio::spawn(sysdb::server::connection::handle(server, store));

    let mut client = client;
    client.write_all(&encode_frame(MessageType::Ping.as_u32(), b"")).await.unwrap();
    let (msg_type, body) = read_reply(&mut client).await;
    assert_eq!(msg_type, MessageType::Error.as_u32());
    assert_eq!(String::from_utf8(body).unwrap(), "Authentication required");

    client.write_all(&encode_frame(MessageType::Startup.as_u32(), b"alice")).await.unwrap();
    let (msg_type, _) = read_reply(&mut client).await;
    assert_eq!(msg_type, MessageType::Ok.as_u32());

    client.write_all(&encode_frame(MessageType::Ping.as_u32(), b"")).await.unwrap();
    let (msg_type, _) = read_reply(&mut client).await;
    assert_eq!(msg_type, MessageType::Ok.as_u32());
}

#[tokio::test]
async fn split_frame_still_produces_exactly_one_reply() {
    let (client, server) = UnixStream::pair().unwrap();
    let store = Arc::new(Store::new());
    tokio::spawn(sysdb::server::connection::handle(server, store));

    let mut client = client;
    client.write_all(&encode_frame(MessageType::Startup.as_u32(), b"alice")).await.unwrap();
    let _ = read_reply(&mut client).await;

    let frame = encode_frame(MessageType::Query.as_u32(), b"LIST host");
    // Header split across two writes, then the (empty) body in a third.
    client.write_all(&frame[0..4]).await.unwrap();
    tokio::task::yield_now().await;
    client.write_all(&frame[4..8]).await.unwrap();
    tokio::task::yield_now().await;
    client.write_all(&frame[8..]).await.unwrap();

    let (msg_type, body) = read_reply(&mut client).await;
    assert_eq!(msg_type, MessageType::Data.as_u32());
    assert!(!body.is_empty());

    // No further bytes should be pending: exactly one reply for one logical command.
    client.write_all(&encode_frame(MessageType::Ping.as_u32(), b"")).await.unwrap();
    let (msg_type, _) = read_reply(&mut client).await;
    assert_eq!(msg_type, MessageType::Ok.as_u32());
}
