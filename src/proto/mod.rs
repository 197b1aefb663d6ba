//! The wire protocol (C9): frame codec, message-type tags, and the JSON
//! writer that turns query results into `DATA` bodies.

pub mod codec;
pub mod json_writer;
pub mod message;

pub use codec::{decode_header, encode_frame, BodyReader, BodyWriter, MAX_BODY_LEN};
pub use json_writer::JsonWriter;
pub use message::{MessageType, ReplyType, RequestType, WireObjectKind};
