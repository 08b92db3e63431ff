use bytes::{Bytes, BytesMut};
use tokio::net::TcpStream;
use tracing::debug;

use crate::codec;
use crate::config::Config;
use crate::Error;

/// The socket behind a dispatcher, together with what is needed to re-establish it.
pub struct Connection {
    addr: String,
    password: Option<String>,
    stream: Option<TcpStream>,
    // Data is read from the socket into the read buffer and handed to the pipeline right away,
    // the buffer never holds more than one read.
    buffer: BytesMut,
    buffer_size: usize,
}

impl Connection {
    pub fn new(config: &Config) -> Connection {
        Connection {
            addr: config.addr.clone(),
            password: config.password.clone(),
            stream: None,
            buffer: BytesMut::with_capacity(config.read_buffer_size),
            buffer_size: config.read_buffer_size,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub async fn connect(&mut self) -> Result<(), Error> {
        let stream = TcpStream::connect(&self.addr).await?;
        stream.set_nodelay(true)?;
        debug!(addr = %self.addr, "connected");

        self.buffer.clear();
        self.stream = Some(stream);
        Ok(())
    }

    /// Drops the socket. Whatever was left in the read buffer belonged to the old stream.
    pub fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            debug!(addr = %self.addr, "disconnected");
        }
        self.buffer.clear();
    }

    pub fn stream(&self) -> Option<&TcpStream> {
        self.stream.as_ref()
    }

    /// Reads whatever the socket has available without waiting.
    ///
    /// Returns `Ok(None)` when nothing is available, a read of zero bytes is reported as a closed
    /// connection.
    pub fn try_read(&mut self) -> Result<Option<&mut BytesMut>, Error> {
        let Some(stream) = &self.stream else {
            return Err(Error::Connection("not connected".to_string()));
        };

        self.buffer.clear();
        self.buffer.reserve(self.buffer_size);

        match stream.try_read_buf(&mut self.buffer) {
            Ok(0) => Err(Error::closed()),
            Ok(_) => Ok(Some(&mut self.buffer)),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// The request that authenticates a fresh connection, if a password is configured.
    pub fn auth_request(&self) -> Option<Bytes> {
        self.password
            .as_ref()
            .map(|password| codec::encode("AUTH", &[password]))
    }
}
