use std::io;
use thiserror::Error as ThisError;

use crate::decoder;

/// Every failure a command callback can observe.
///
/// Connection and protocol faults invalidate the whole connection and are delivered to every
/// affected command. Reply and transform errors belong to exactly one command.
#[derive(Clone, Debug, PartialEq, ThisError)]
pub enum Error {
    #[error("connection error; {0}")]
    Connection(String),
    #[error("protocol error; {0}")]
    Protocol(String),
    /// An error reply sent by the server, e.g. `-ERR unknown command`.
    #[error("{0}")]
    Reply(String),
    #[error("failed to convert reply; {0}")]
    Transform(String),
    #[error("dispatcher is shut down")]
    Shutdown,
    #[error("invalid configuration; {0}")]
    Config(String),
}

impl Error {
    /// Whether the connection was torn down because of this error. Callers may retry these.
    pub fn is_connection_fault(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Protocol(_))
    }

    /// Whether the server answered the command with an error reply.
    pub fn is_reply(&self) -> bool {
        matches!(self, Error::Reply(_))
    }

    pub fn closed() -> Error {
        Error::Connection("it seems like server has closed the connection".to_string())
    }
}

impl From<io::Error> for Error {
    fn from(src: io::Error) -> Error {
        Error::Connection(src.to_string())
    }
}

impl From<decoder::Error> for Error {
    fn from(src: decoder::Error) -> Error {
        Error::Protocol(src.to_string())
    }
}
