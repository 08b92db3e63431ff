use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::channel::oneshot;

use crate::codec;
use crate::config::Config;
use crate::dispatcher::{Dispatcher, DispatcherHandle};
use crate::frame::Frame;
use crate::pending::{PendingCommand, Transform};
use crate::pipeline::Stats;
use crate::{Error, Result};

/// An asynchronous client multiplexing every command over one pipelined connection.
///
/// Cloning is cheap and every clone submits to the same dispatcher. Replies are delivered in the
/// order commands were written, which is the order they were submitted from a single thread.
#[derive(Clone)]
pub struct Client {
    dispatcher: Arc<DispatcherHandle>,
}

impl Client {
    pub async fn connect(config: Config) -> Result<Client> {
        let dispatcher = Dispatcher::spawn(config).await?;
        Ok(Client {
            dispatcher: Arc::new(dispatcher),
        })
    }

    /// Submits an encoded request. The callback runs on the dispatcher thread, exactly once,
    /// with the transformed reply or an error.
    pub fn submit<F>(&self, request: Bytes, transform: Option<Transform>, callback: F)
    where
        F: FnOnce(Result<Frame>) + Send + 'static,
    {
        self.dispatcher
            .submit(PendingCommand::from_parts(request, transform, Box::new(callback)));
    }

    /// Submits an encoded request and returns a future of its reply.
    ///
    /// The request is queued right away; the future does not need to be polled for the command
    /// to be sent.
    pub fn send(&self, request: Bytes) -> ReplyFuture {
        self.send_with(request, None)
    }

    pub fn send_with(&self, request: Bytes, transform: Option<Transform>) -> ReplyFuture {
        let (tx, rx) = oneshot::channel();
        self.submit(request, transform, move |result| {
            let _ = tx.send(result);
        });
        ReplyFuture { rx }
    }

    /// Encodes and sends an arbitrary command.
    pub fn query<C, A>(&self, command: C, args: &[A]) -> ReplyFuture
    where
        C: AsRef<[u8]>,
        A: AsRef<[u8]>,
    {
        self.send(codec::encode(command, args))
    }

    pub async fn ping(&self) -> Result<String> {
        self.typed("PING", &[] as &[&[u8]], |frame| {
            frame.into_string().map(Frame::Simple)
        })
        .await?
        .into_string()
    }

    pub async fn echo(&self, message: impl AsRef<[u8]>) -> Result<Bytes> {
        self.typed("ECHO", &[message.as_ref()], |frame| {
            frame.into_bytes().map(Frame::Bulk)
        })
        .await?
        .into_bytes()
    }

    /// Value of `key`, `None` when the key does not exist.
    pub async fn get(&self, key: impl AsRef<[u8]>) -> Result<Option<Bytes>> {
        let frame = self
            .typed("GET", &[key.as_ref()], |frame| {
                if frame.is_null() {
                    return Ok(frame);
                }
                frame.into_bytes().map(Frame::Bulk)
            })
            .await?;

        if frame.is_null() {
            return Ok(None);
        }
        frame.into_bytes().map(Some)
    }

    pub async fn set(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        self.typed("SET", &[key.as_ref(), value.as_ref()], expect_ok)
            .await
            .map(|_| ())
    }

    /// Removes the given keys, returns how many existed.
    pub async fn del<K: AsRef<[u8]>>(&self, keys: &[K]) -> Result<i64> {
        self.typed("DEL", keys, integer).await?.into_integer()
    }

    pub async fn incr(&self, key: impl AsRef<[u8]>) -> Result<i64> {
        self.typed("INCR", &[key.as_ref()], integer)
            .await?
            .into_integer()
    }

    pub async fn exists(&self, key: impl AsRef<[u8]>) -> Result<bool> {
        let count = self
            .typed("EXISTS", &[key.as_ref()], integer)
            .await?
            .into_integer()?;
        Ok(count > 0)
    }

    pub fn stats(&self) -> Stats {
        self.dispatcher.stats()
    }

    /// True once shutdown has begun, from any clone. Commands submitted from then on fail with
    /// [`Error::Shutdown`].
    pub fn is_shutdown(&self) -> bool {
        self.dispatcher.is_shutdown()
    }

    /// Stops the dispatcher once every submitted command has been answered or failed.
    pub async fn shutdown(&self) {
        self.dispatcher.shutdown().await
    }

    fn typed<C, A, T>(&self, command: C, args: &[A], transform: T) -> ReplyFuture
    where
        C: AsRef<[u8]>,
        A: AsRef<[u8]>,
        T: FnOnce(Frame) -> Result<Frame> + Send + 'static,
    {
        self.send_with(codec::encode(command, args), Some(Box::new(transform)))
    }
}

fn integer(frame: Frame) -> Result<Frame> {
    frame.into_integer().map(Frame::Integer)
}

fn expect_ok(frame: Frame) -> Result<Frame> {
    match frame {
        Frame::Simple(s) if s == "OK" => Ok(Frame::Simple(s)),
        frame => Err(Error::Transform(format!("expected OK, got {:?}", frame))),
    }
}

/// Resolves to the reply of a submitted command.
///
/// Resolves to [`Error::Shutdown`] if the dispatcher went away without answering, which only
/// happens when its thread dies.
pub struct ReplyFuture {
    rx: oneshot::Receiver<Result<Frame>>,
}

impl Future for ReplyFuture {
    type Output = Result<Frame>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(Error::Shutdown)),
            Poll::Pending => Poll::Pending,
        }
    }
}
