// Protocol specification: https://redis.io/docs/reference/protocol-spec/

use std::io;
use std::mem;
use std::str;

use bytes::{Buf, BytesMut};
use thiserror::Error as ThisError;
use tokio_util::codec::Decoder;

use crate::frame::{Frame, CRLF};

/// Largest bulk string the decoder accepts, matching the server's default `proto-max-bulk-len`.
pub const MAX_BULK_LENGTH: usize = 512 * 1024 * 1024;

/// Largest simple string, error or header line, matching the server's inline request limit.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

// Upper bound for the up-front allocation of an array, the announced count is not trusted.
const MAX_ARRAY_PREALLOC: usize = 1024;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("invalid frame data type: {0:#04x}")]
    InvalidDataType(u8),
    #[error("invalid length: {0:?}")]
    InvalidLength(String),
    #[error("invalid integer: {0:?}")]
    InvalidInteger(String),
    #[error("invalid UTF-8 string")]
    InvalidUtf8,
    #[error("line is not terminated by CRLF")]
    MissingTerminator,
    #[error("line exceeds the 64 KiB limit")]
    LineTooLong,
    #[error("bulk string of {0} bytes exceeds the limit")]
    BulkTooLarge(usize),
    #[error("{0}")]
    Io(#[from] io::Error),
}

/// Decodes a single reply from a byte stream that may be split at any position.
///
/// Every call consumes all the bytes it can from the source buffer and never reads past the end
/// of the reply it is decoding, so whatever is left in the buffer after a completed reply belongs
/// to the next one. Partial state survives between calls: a reply decodes to the same frame
/// whether it arrives in one chunk or one byte at a time.
///
/// Nested arrays are tracked with an explicit stack of partially filled arrays, the value being
/// decoded at any time is always a leaf of the innermost open array.
#[derive(Debug, Default)]
pub struct ReplyDecoder {
    state: State,
    // Bytes of the current CRLF-terminated line seen so far.
    line: Vec<u8>,
    // Payload of the current bulk string, including its trailing CRLF once it arrives.
    bulk: BytesMut,
    arrays: Vec<PartialArray>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
enum State {
    /// Waiting for the byte that identifies the type of the next value.
    #[default]
    Type,
    /// Accumulating a CRLF-terminated line: a simple value or the header of a bulk or array.
    Line(DataType),
    /// Copying `len` payload bytes followed by CRLF.
    Bulk { len: usize },
}

#[derive(Debug)]
struct PartialArray {
    remaining: usize,
    items: Vec<Frame>,
}

impl ReplyDecoder {
    pub fn new() -> ReplyDecoder {
        ReplyDecoder::default()
    }

    /// True when no byte of a reply has been consumed yet.
    pub fn is_idle(&self) -> bool {
        self.state == State::Type && self.arrays.is_empty()
    }

    /// Nesting depth of the arrays currently being filled.
    pub fn depth(&self) -> usize {
        self.arrays.len()
    }

    // The limit applies to the line without its CRLF, whatever the chunking. A partial line may
    // already hold the CR.
    fn read_line(&mut self, src: &mut BytesMut) -> Result<Option<Vec<u8>>, Error> {
        let Some(end) = src.iter().position(|b| *b == b'\n') else {
            if self.line.len() + src.len() > MAX_LINE_LENGTH + 1 {
                return Err(Error::LineTooLong);
            }
            self.line.extend_from_slice(&src[..]);
            src.advance(src.len());
            return Ok(None);
        };

        if self.line.len() + end + 1 > MAX_LINE_LENGTH + CRLF.len() {
            return Err(Error::LineTooLong);
        }
        self.line.extend_from_slice(&src[..=end]);
        src.advance(end + 1);

        let mut line = mem::take(&mut self.line);
        if !line.ends_with(CRLF) {
            return Err(Error::MissingTerminator);
        }
        line.truncate(line.len() - CRLF.len());

        Ok(Some(line))
    }

    /// Handles a complete line, returns a frame when the line is a whole value on its own.
    fn finish_line(&mut self, data_type: DataType, line: Vec<u8>) -> Result<Option<Frame>, Error> {
        self.state = State::Type;

        match data_type {
            DataType::SimpleString => {
                let string = String::from_utf8(line).map_err(|_| Error::InvalidUtf8)?;
                Ok(Some(Frame::Simple(string)))
            }
            DataType::SimpleError => {
                let string = String::from_utf8(line).map_err(|_| Error::InvalidUtf8)?;
                Ok(Some(Frame::Error(string)))
            }
            DataType::Integer => {
                let integer = parse_integer(&line).ok_or_else(|| {
                    Error::InvalidInteger(String::from_utf8_lossy(&line).into_owned())
                })?;
                Ok(Some(Frame::Integer(integer)))
            }
            // $<length>\r\n<data>\r\n
            DataType::BulkString => match parse_length(&line)? {
                None => Ok(Some(Frame::Null)),
                Some(len) if len > MAX_BULK_LENGTH => Err(Error::BulkTooLarge(len)),
                Some(len) => {
                    self.bulk = BytesMut::with_capacity(len + CRLF.len());
                    self.state = State::Bulk { len };
                    Ok(None)
                }
            },
            // *<number-of-elements>\r\n<element-1>...<element-n>
            DataType::Array => match parse_length(&line)? {
                None => Ok(Some(Frame::Null)),
                Some(0) => Ok(Some(Frame::Array(Vec::new()))),
                Some(len) => {
                    self.arrays.push(PartialArray {
                        remaining: len,
                        items: Vec::with_capacity(len.min(MAX_ARRAY_PREALLOC)),
                    });
                    Ok(None)
                }
            },
        }
    }

    fn read_bulk(&mut self, len: usize, src: &mut BytesMut) -> Result<Option<Frame>, Error> {
        let missing = len + CRLF.len() - self.bulk.len();
        let available = missing.min(src.len());
        self.bulk.extend_from_slice(&src[..available]);
        src.advance(available);

        if available < missing {
            return Ok(None);
        }
        if &self.bulk[len..] != CRLF {
            return Err(Error::MissingTerminator);
        }

        let mut data = mem::take(&mut self.bulk);
        data.truncate(len);
        self.state = State::Type;

        Ok(Some(Frame::Bulk(data.freeze())))
    }

    /// Appends a finished value to the innermost open array, closing every array it completes.
    /// Returns the reply once the outermost value is done.
    fn push(&mut self, mut frame: Frame) -> Option<Frame> {
        loop {
            let Some(array) = self.arrays.last_mut() else {
                return Some(frame);
            };

            array.items.push(frame);
            array.remaining -= 1;
            if array.remaining > 0 {
                return None;
            }

            let items = mem::take(&mut array.items);
            self.arrays.pop();
            frame = Frame::Array(items);
        }
    }
}

impl Decoder for ReplyDecoder {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        while src.has_remaining() {
            let frame = match self.state {
                // The first byte of every value identifies its type.
                State::Type => {
                    let data_type = DataType::try_from(src.get_u8())?;
                    self.state = State::Line(data_type);
                    continue;
                }
                State::Line(data_type) => match self.read_line(src)? {
                    Some(line) => self.finish_line(data_type, line)?,
                    None => return Ok(None),
                },
                State::Bulk { len } => match self.read_bulk(len, src)? {
                    Some(frame) => Some(frame),
                    None => return Ok(None),
                },
            };

            if let Some(frame) = frame.and_then(|frame| self.push(frame)) {
                return Ok(Some(frame));
            }
        }

        Ok(None)
    }
}

// `str::parse` takes a leading `+`, the protocol does not.
fn parse_integer(line: &[u8]) -> Option<i64> {
    if line.first() == Some(&b'+') {
        return None;
    }
    str::from_utf8(line).ok()?.parse::<i64>().ok()
}

/// Parses the header of a bulk string or array, `-1` stands for null.
fn parse_length(line: &[u8]) -> Result<Option<usize>, Error> {
    let invalid = || Error::InvalidLength(String::from_utf8_lossy(line).into_owned());

    match parse_integer(line).ok_or_else(invalid)? {
        -1 => Ok(None),
        len if len < 0 => Err(invalid()),
        len => usize::try_from(len).map(Some).map_err(|_| invalid()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DataType {
    SimpleString, // '+'
    SimpleError,  // '-'
    Integer,      // ':'
    BulkString,   // '$'
    Array,        // '*'
}

impl TryFrom<u8> for DataType {
    type Error = Error;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            b'+' => Ok(Self::SimpleString),
            b'-' => Ok(Self::SimpleError),
            b':' => Ok(Self::Integer),
            b'$' => Ok(Self::BulkString),
            b'*' => Ok(Self::Array),
            _ => Err(Error::InvalidDataType(byte)),
        }
    }
}
