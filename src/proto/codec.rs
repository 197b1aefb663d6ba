//! Wire codec (C9): frame header encode/decode plus the typed body readers
//! used to decode `STORE_*` request payloads. All multi-byte integers are
//! big-endian, matching the original wire format.

use crate::datum::{Datum, DatumRegex};
use crate::error::ProtoError;

/// Frame bodies above this size are rejected outright rather than buffered;
/// a single malformed length field should not let a peer force an unbounded
/// allocation.
pub const MAX_BODY_LEN: u32 = 16 * 1024 * 1024;

pub const HEADER_LEN: usize = 8;

pub fn encode_frame(msg_type: u32, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(&msg_type.to_be_bytes());
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(body);
    out
}

/// Decodes the 8-byte frame header: `(message type, body length)`.
pub fn decode_header(bytes: &[u8]) -> Result<(u32, u32), ProtoError> {
    if bytes.len() != HEADER_LEN {
        return Err(ProtoError::MalformedHeader);
    }
    let msg_type = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
    let len = u32::from_be_bytes(bytes[4..8].try_into().unwrap());
    if len > MAX_BODY_LEN {
        return Err(ProtoError::OversizeBody(len as usize));
    }
    Ok((msg_type, len))
}

/// A cursor over a decoded frame body.
pub struct BodyReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BodyReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        BodyReader { buf, pos: 0 }
    }

    pub fn has_remaining(&self) -> bool {
        self.pos < self.buf.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtoError> {
        if self.pos + n > self.buf.len() {
            return Err(ProtoError::Truncated);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn u8(&mut self) -> Result<u8, ProtoError> {
        Ok(self.take(1)?[0])
    }

    pub fn u32(&mut self) -> Result<u32, ProtoError> {
        Ok(u32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn i64(&mut self) -> Result<i64, ProtoError> {
        Ok(i64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn f64(&mut self) -> Result<f64, ProtoError> {
        Ok(f64::from_bits(u64::from_be_bytes(self.take(8)?.try_into().unwrap())))
    }

    pub fn bytes(&mut self) -> Result<Vec<u8>, ProtoError> {
        let n = self.u32()? as usize;
        Ok(self.take(n)?.to_vec())
    }

    pub fn string(&mut self) -> Result<String, ProtoError> {
        let raw = self.bytes()?;
        String::from_utf8(raw).map_err(|_| ProtoError::InvalidUtf8)
    }

    pub fn string_list(&mut self) -> Result<Vec<String>, ProtoError> {
        let n = self.u32()? as usize;
        (0..n).map(|_| self.string()).collect()
    }

    pub fn datum(&mut self) -> Result<Datum, ProtoError> {
        match self.u8()? {
            0 => Ok(Datum::Null),
            1 => Ok(Datum::Integer(self.i64()?)),
            2 => Ok(Datum::Decimal(self.f64()?)),
            3 => Ok(Datum::String(self.string()?)),
            4 => Ok(Datum::Datetime(self.i64()?)),
            5 => Ok(Datum::Binary(self.bytes()?)),
            6 => Ok(Datum::Regex(DatumRegex::new(self.string()?))),
            7 => {
                let tag = self.u8()?;
                let scalar = scalar_tag_from_u8(tag)?;
                let n = self.u32()? as usize;
                let mut elements = Vec::with_capacity(n);
                for _ in 0..n {
                    elements.push(self.datum()?);
                }
                Datum::array(scalar, elements).map_err(|_| ProtoError::MalformedHeader)
            }
            t => Err(ProtoError::UnknownDatumTag(t as u32)),
        }
    }
}

fn scalar_tag_from_u8(tag: u8) -> Result<crate::datum::ScalarTag, ProtoError> {
    use crate::datum::ScalarTag::*;
    match tag {
        1 => Ok(Integer),
        2 => Ok(Decimal),
        3 => Ok(String),
        4 => Ok(Datetime),
        5 => Ok(Binary),
        6 => Ok(Regex),
        _ => Err(ProtoError::UnknownDatumTag(tag as u32)),
    }
}

/// Encodes a body buffer symmetrically to [`BodyReader`]; used by tests and
/// by any future client-side encoder sharing this codec.
#[derive(Default)]
pub struct BodyWriter(Vec<u8>);

impl BodyWriter {
    pub fn new() -> Self {
        BodyWriter(Vec::new())
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.0.push(v);
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.0.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn i64(&mut self, v: i64) -> &mut Self {
        self.0.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn f64(&mut self, v: f64) -> &mut Self {
        self.0.extend_from_slice(&v.to_bits().to_be_bytes());
        self
    }

    pub fn bytes(&mut self, b: &[u8]) -> &mut Self {
        self.u32(b.len() as u32);
        self.0.extend_from_slice(b);
        self
    }

    /// Appends `b` with no length prefix; used for reply bodies where the
    /// frame's own length already delimits the payload (e.g. the JSON tail
    /// of a `DATA` reply).
    pub fn raw(&mut self, b: &[u8]) -> &mut Self {
        self.0.extend_from_slice(b);
        self
    }

    pub fn string(&mut self, s: &str) -> &mut Self {
        self.bytes(s.as_bytes())
    }

    pub fn string_list(&mut self, items: &[String]) -> &mut Self {
        self.u32(items.len() as u32);
        for item in items {
            self.string(item);
        }
        self
    }

    pub fn datum(&mut self, d: &Datum) -> &mut Self {
        match d {
            Datum::Null => {
                self.u8(0);
            }
            Datum::Integer(v) => {
                self.u8(1).i64(*v);
            }
            Datum::Decimal(v) => {
                self.u8(2).f64(*v);
            }
            Datum::String(s) => {
                self.u8(3).string(s);
            }
            Datum::Datetime(v) => {
                self.u8(4).i64(*v);
            }
            Datum::Binary(b) => {
                self.u8(5).bytes(b);
            }
            Datum::Regex(r) => {
                self.u8(6).string(&r.source);
            }
            Datum::Array(a) => {
                self.u8(7).u8(scalar_tag_to_u8(a.elem_tag)).u32(a.elements.len() as u32);
                for el in &a.elements {
                    self.datum(el);
                }
            }
        }
        self
    }
}

fn scalar_tag_to_u8(tag: crate::datum::ScalarTag) -> u8 {
    use crate::datum::ScalarTag::*;
    match tag {
        Integer => 1,
        Decimal => 2,
        String => 3,
        Datetime => 4,
        Binary => 5,
        Regex => 6,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trips_through_header_and_body() {
        let frame = encode_frame(3, b"hello");
        let (msg_type, len) = decode_header(&frame[0..HEADER_LEN]).unwrap();
        assert_eq!(msg_type, 3);
        assert_eq!(len, 5);
        assert_eq!(&frame[HEADER_LEN..], b"hello");
    }

    #[test]
    fn oversize_length_is_rejected_before_any_allocation() {
        let mut header = (1u32).to_be_bytes().to_vec();
        header.extend_from_slice(&(MAX_BODY_LEN + 1).to_be_bytes());
        assert!(matches!(decode_header(&header), Err(ProtoError::OversizeBody(_))));
    }

    #[test]
    fn datum_round_trips_through_body_writer_and_reader() {
        let d = Datum::array(crate::datum::ScalarTag::Integer, vec![Datum::Integer(1), Datum::Integer(2)]).unwrap();
        let mut w = BodyWriter::new();
        w.datum(&d);
        let bytes = w.into_bytes();
        let mut r = BodyReader::new(&bytes);
        assert_eq!(r.datum().unwrap(), d);
    }

    #[test]
    fn truncated_body_is_an_error_not_a_panic() {
        let mut r = BodyReader::new(&[0, 0, 0, 1]);
        assert!(matches!(r.string(), Err(ProtoError::Truncated)));
    }
}
