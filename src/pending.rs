use std::fmt;

use bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder;
use tracing::debug;

use crate::decoder::{self, ReplyDecoder};
use crate::frame::Frame;
use crate::Error;

/// Receives the outcome of a command, either the (transformed) reply or an error, never both.
pub type Callback = Box<dyn FnOnce(Result<Frame, Error>) + Send + 'static>;

/// Converts a successfully decoded reply before it reaches the callback.
pub type Transform = Box<dyn FnOnce(Frame) -> Result<Frame, Error> + Send + 'static>;

/// One in-flight request/response pair.
///
/// The callback is consumed by [`PendingCommand::complete`] or [`PendingCommand::fail`], both take
/// the command by value, so it can fire at most once, and every path out of the pipeline goes
/// through one of them.
pub struct PendingCommand {
    request: Bytes,
    written: usize,
    // Created on the first read attempt.
    decoder: Option<ReplyDecoder>,
    transform: Option<Transform>,
    callback: Callback,
    // Issued by the dispatcher itself, left out of the stats.
    internal: bool,
}

impl PendingCommand {
    pub fn new<F>(request: Bytes, callback: F) -> PendingCommand
    where
        F: FnOnce(Result<Frame, Error>) + Send + 'static,
    {
        PendingCommand {
            request,
            written: 0,
            decoder: None,
            transform: None,
            callback: Box::new(callback),
            internal: false,
        }
    }

    pub fn with_transform<T>(mut self, transform: T) -> PendingCommand
    where
        T: FnOnce(Frame) -> Result<Frame, Error> + Send + 'static,
    {
        self.transform = Some(Box::new(transform));
        self
    }

    pub(crate) fn from_parts(
        request: Bytes,
        transform: Option<Transform>,
        callback: Callback,
    ) -> PendingCommand {
        PendingCommand {
            request,
            written: 0,
            decoder: None,
            transform,
            callback,
            internal: false,
        }
    }

    /// Marks a command the caller never submitted, such as the AUTH sent on connect.
    pub(crate) fn internal(mut self) -> PendingCommand {
        self.internal = true;
        self
    }

    pub fn is_internal(&self) -> bool {
        self.internal
    }

    pub fn request(&self) -> &Bytes {
        &self.request
    }

    /// Bytes of the request not yet accepted by the socket.
    pub fn remaining(&self) -> &[u8] {
        &self.request[self.written..]
    }

    pub fn advance(&mut self, n: usize) {
        self.written = (self.written + n).min(self.request.len());
    }

    pub fn is_written(&self) -> bool {
        self.written == self.request.len()
    }

    /// Restarts the write from the first byte, a new connection never saw the earlier prefix.
    pub fn rewind(&mut self) {
        self.written = 0;
    }

    /// Feeds bytes to the reply decoder, returns the reply once it is complete.
    pub fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, decoder::Error> {
        self.decoder.get_or_insert_with(ReplyDecoder::new).decode(src)
    }

    /// Delivers a decoded reply. Error replies skip the transform.
    pub fn complete(self, frame: Frame) {
        let result = match frame {
            Frame::Error(message) => Err(Error::Reply(message)),
            frame => match self.transform {
                Some(transform) => transform(frame),
                None => Ok(frame),
            },
        };

        (self.callback)(result);
    }

    pub fn fail(self, error: Error) {
        debug!(error = %error, "failing command");
        (self.callback)(Err(error));
    }
}

impl fmt::Debug for PendingCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCommand")
            .field("request", &self.request)
            .field("written", &self.written)
            .field("decoding", &self.decoder.is_some())
            .field("transform", &self.transform.is_some())
            .field("internal", &self.internal)
            .finish()
    }
}
