// https://redis.io/docs/reference/protocol-spec

use std::fmt;

use bytes::Bytes;

use crate::Error;

pub(crate) static CRLF: &[u8; 2] = b"\r\n";

/// A fully decoded reply.
///
/// Error replies are values too: `-ERR ...` decodes to `Frame::Error` and is only turned into an
/// [`Error::Reply`] when it reaches the callback of the command that triggered it.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    Null,
    Array(Vec<Frame>),
}

impl Frame {
    /// RESP2 representation of the frame. Both null flavours are written as a null bulk string.
    pub fn serialize(&self) -> Vec<u8> {
        match self {
            Frame::Simple(s) => {
                let mut bytes = Vec::with_capacity(1 + s.len() + CRLF.len());
                bytes.push(b'+');
                bytes.extend_from_slice(s.as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes
            }
            Frame::Error(s) => {
                let mut bytes = Vec::with_capacity(1 + s.len() + CRLF.len());
                bytes.push(b'-');
                bytes.extend_from_slice(s.as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes
            }
            Frame::Integer(i) => {
                let digits = i.to_string();
                let mut bytes = Vec::with_capacity(1 + digits.len() + CRLF.len());
                bytes.push(b':');
                bytes.extend_from_slice(digits.as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes
            }
            Frame::Bulk(data) => {
                let length_str = data.len().to_string();
                let mut bytes = Vec::with_capacity(
                    1 + length_str.len() + CRLF.len() + data.len() + CRLF.len(),
                );
                bytes.push(b'$');
                bytes.extend_from_slice(length_str.as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes.extend_from_slice(data);
                bytes.extend_from_slice(CRLF);
                bytes
            }
            Frame::Null => b"$-1\r\n".to_vec(),
            Frame::Array(arr) => {
                let length_str = arr.len().to_string();
                let mut bytes = Vec::with_capacity(1 + length_str.len() + CRLF.len());
                bytes.push(b'*');
                bytes.extend_from_slice(length_str.as_bytes());
                bytes.extend_from_slice(CRLF);
                for frame in arr {
                    bytes.extend(frame.serialize());
                }
                bytes
            }
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Frame::Null)
    }

    /// Raw payload of a bulk or simple string.
    pub fn into_bytes(self) -> Result<Bytes, Error> {
        match self {
            Frame::Bulk(bytes) => Ok(bytes),
            Frame::Simple(s) => Ok(Bytes::from(s)),
            frame => Err(unexpected("bulk or simple string", &frame)),
        }
    }

    /// UTF-8 payload of a bulk or simple string.
    pub fn into_string(self) -> Result<String, Error> {
        match self {
            Frame::Simple(s) => Ok(s),
            Frame::Bulk(bytes) => String::from_utf8(bytes.to_vec())
                .map_err(|_| Error::Transform("invalid UTF-8 string".to_string())),
            frame => Err(unexpected("bulk or simple string", &frame)),
        }
    }

    pub fn into_integer(self) -> Result<i64, Error> {
        match self {
            Frame::Integer(i) => Ok(i),
            frame => Err(unexpected("integer", &frame)),
        }
    }

    pub fn into_array(self) -> Result<Vec<Frame>, Error> {
        match self {
            Frame::Array(frames) => Ok(frames),
            frame => Err(unexpected("array", &frame)),
        }
    }
}

fn unexpected(expected: &str, actual: &Frame) -> Error {
    Error::Transform(format!("expected {}, got {:?}", expected, actual))
}

impl From<Frame> for Vec<u8> {
    fn from(frame: Frame) -> Self {
        frame.serialize()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Simple(s) => write!(f, "{}", s),
            Frame::Error(s) => write!(f, "(error) {}", s),
            Frame::Integer(i) => write!(f, "(integer) {}", i),
            Frame::Bulk(bytes) => write!(f, "\"{}\"", String::from_utf8_lossy(bytes)),
            Frame::Null => write!(f, "(nil)"),
            Frame::Array(arr) if arr.is_empty() => write!(f, "(empty array)"),
            Frame::Array(arr) => {
                for (i, frame) in arr.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}) {}", i + 1, frame)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_scalars() {
        assert_eq!(Frame::Simple("OK".to_string()).serialize(), b"+OK\r\n");
        assert_eq!(Frame::Error("ERR foo".to_string()).serialize(), b"-ERR foo\r\n");
        assert_eq!(Frame::Integer(-42).serialize(), b":-42\r\n");
        assert_eq!(Frame::Bulk(Bytes::from("bar")).serialize(), b"$3\r\nbar\r\n");
        assert_eq!(Frame::Null.serialize(), b"$-1\r\n");
    }

    #[test]
    fn serialize_nested_array() {
        let frame = Frame::Array(vec![
            Frame::Bulk(Bytes::from("foo")),
            Frame::Array(vec![]),
            Frame::Null,
        ]);

        assert_eq!(frame.serialize(), b"*3\r\n$3\r\nfoo\r\n*0\r\n$-1\r\n");
    }

    #[test]
    fn conversions() {
        assert_eq!(
            Frame::Bulk(Bytes::from("bar")).into_string(),
            Ok("bar".to_string())
        );
        assert_eq!(Frame::Integer(7).into_integer(), Ok(7));
        assert_eq!(Frame::Array(vec![]).into_array(), Ok(vec![]));
        assert!(matches!(
            Frame::Null.into_integer(),
            Err(Error::Transform(_))
        ));
        assert!(matches!(
            Frame::Bulk(Bytes::from_static(&[0xff, 0xfe])).into_string(),
            Err(Error::Transform(_))
        ));
    }

    #[test]
    fn display() {
        let frame = Frame::Array(vec![Frame::Bulk(Bytes::from("a")), Frame::Integer(1)]);
        assert_eq!(frame.to_string(), "1) \"a\"\n2) (integer) 1");
        assert_eq!(Frame::Null.to_string(), "(nil)");
    }
}
