use std::collections::VecDeque;
use std::io;

use bytes::BytesMut;
use tracing::{debug, trace};

use crate::pending::PendingCommand;
use crate::Error;

/// Totals since the pipeline was created. Commands issued by the dispatcher itself are not
/// counted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    /// Commands queued for writing.
    pub submitted: u64,
    /// Commands whose request was fully written to a socket.
    pub written: u64,
    /// Commands that received a reply, error replies included.
    pub completed: u64,
}

/// The write and read queues of a single connection.
///
/// Commands leave the write queue in submission order and enter the read queue the moment their
/// last byte is written, so the read queue always mirrors the order requests went out on the
/// wire. Replies are matched to its head, one at a time.
#[derive(Debug, Default)]
pub struct Pipeline {
    writes: VecDeque<PendingCommand>,
    reads: VecDeque<PendingCommand>,
    stats: Stats,
}

impl Pipeline {
    pub fn new() -> Pipeline {
        Pipeline::default()
    }

    pub fn push_back(&mut self, cmd: PendingCommand) {
        self.stats.submitted += counted(&cmd);
        self.writes.push_back(cmd);
    }

    /// Queues a command ahead of everything else still waiting to be written.
    ///
    /// Must only be called while the head of the write queue has not been partially written.
    pub fn push_front(&mut self, cmd: PendingCommand) {
        self.stats.submitted += counted(&cmd);
        self.writes.push_front(cmd);
    }

    pub fn wants_write(&self) -> bool {
        !self.writes.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.reads.is_empty()
    }

    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    pub fn pending_reads(&self) -> usize {
        self.reads.len()
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Writes queued requests, in order, for as long as `write` accepts bytes.
    ///
    /// Stops at the first short write or `WouldBlock`; the partially written command stays at the
    /// head of the write queue and resumes from its cursor next time. A write of zero bytes means
    /// the peer is gone. Returns the number of bytes written.
    pub fn flush<W>(&mut self, mut write: W) -> Result<usize, Error>
    where
        W: FnMut(&[u8]) -> io::Result<usize>,
    {
        let mut total = 0;

        while let Some(cmd) = self.writes.front_mut() {
            let remaining = cmd.remaining().len();

            let n = match write(cmd.remaining()) {
                Ok(0) => return Err(Error::closed()),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            cmd.advance(n);
            total += n;

            if !cmd.is_written() {
                trace!(written = n, remaining = remaining - n, "partial write");
                break;
            }

            if let Some(cmd) = self.writes.pop_front() {
                self.stats.written += counted(&cmd);
                self.reads.push_back(cmd);
            }
        }

        Ok(total)
    }

    /// Hands received bytes to the commands awaiting replies, in order, until `src` is drained.
    ///
    /// Every completed reply retires the head of the read queue before the next byte is looked
    /// at. Bytes arriving while no command awaits a reply mean the stream can no longer be
    /// trusted. Returns the number of completed commands.
    pub fn feed(&mut self, src: &mut BytesMut) -> Result<usize, Error> {
        let mut completed = 0;

        while !src.is_empty() {
            let Some(cmd) = self.reads.front_mut() else {
                return Err(Error::Protocol(
                    "remaining received data but no remaining request".to_string(),
                ));
            };

            let Some(frame) = cmd.decode(src)? else {
                break;
            };

            if let Some(cmd) = self.reads.pop_front() {
                self.stats.completed += counted(&cmd);
                completed += 1;
                cmd.complete(frame);
            }
        }

        Ok(completed)
    }

    /// Fails every command awaiting a reply, in order.
    pub fn fail_reads(&mut self, error: &Error) -> usize {
        let count = self.reads.len();
        if count > 0 {
            debug!(count, error = %error, "failing commands awaiting a reply");
        }
        for cmd in self.reads.drain(..) {
            cmd.fail(error.clone());
        }
        count
    }

    /// Fails every command still waiting to be written, in order.
    pub fn fail_writes(&mut self, error: &Error) -> usize {
        let count = self.writes.len();
        if count > 0 {
            debug!(count, error = %error, "failing commands waiting to be written");
        }
        for cmd in self.writes.drain(..) {
            cmd.fail(error.clone());
        }
        count
    }

    /// Restarts every queued write from its first byte, used after reconnecting.
    pub fn rewind_writes(&mut self) {
        for cmd in self.writes.iter_mut() {
            cmd.rewind();
        }
    }
}

fn counted(cmd: &PendingCommand) -> u64 {
    u64::from(!cmd.is_internal())
}
