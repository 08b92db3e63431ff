use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use tokio::io::Interest;
use tokio::runtime;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, trace, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::connection::Connection;
use crate::pending::PendingCommand;
use crate::pipeline::{Pipeline, Stats};
use crate::Error;

const THREAD_NAME: &str = "respline-dispatcher";

/// State shared between the dispatcher thread and its handles. The submission channel is the
/// only other thing both sides touch.
#[derive(Default)]
struct Shared {
    shutdown: AtomicBool,
    stopped: AtomicBool,
    // Wakes the loop out of a readiness wait or a reconnect delay.
    wake: Notify,
    // Signalled once the loop has exited.
    exit: Notify,
    submitted: AtomicU64,
    written: AtomicU64,
    completed: AtomicU64,
}

impl Shared {
    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn publish(&self, stats: Stats) {
        self.submitted.store(stats.submitted, Ordering::Relaxed);
        self.written.store(stats.written, Ordering::Relaxed);
        self.completed.store(stats.completed, Ordering::Relaxed);
    }

    fn stats(&self) -> Stats {
        Stats {
            submitted: self.submitted.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
        }
    }
}

struct ExitGuard(Arc<Shared>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.0.stopped.store(true, Ordering::Release);
        self.0.exit.notify_waiters();
    }
}

/// The event loop of a single connection.
///
/// Runs on its own thread, inside a current-thread runtime, and is the only owner of the socket,
/// the read buffer, the decoders and both queues. Other threads reach it exclusively through a
/// [`DispatcherHandle`].
pub struct Dispatcher {
    id: Uuid,
    config: Config,
    connection: Connection,
    pipeline: Pipeline,
    receiver: mpsc::UnboundedReceiver<PendingCommand>,
    shared: Arc<Shared>,
}

impl Dispatcher {
    /// Connects to the server and starts the dispatcher thread.
    ///
    /// Fails if the configuration is invalid or the first connection attempt fails; later
    /// connection failures are retried by the loop itself.
    pub async fn spawn(config: Config) -> Result<DispatcherHandle, Error> {
        config.validate()?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());
        let dispatcher = Dispatcher {
            id: Uuid::new_v4(),
            connection: Connection::new(&config),
            config,
            pipeline: Pipeline::new(),
            receiver,
            shared: shared.clone(),
        };

        let (ready_tx, ready_rx) = oneshot::channel();
        thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || dispatcher.run(ready_tx))?;

        match ready_rx.await {
            Ok(Ok(())) => Ok(DispatcherHandle { sender, shared }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::Connection(
                "dispatcher thread exited before connecting".to_string(),
            )),
        }
    }

    fn run(mut self, ready: oneshot::Sender<Result<(), Error>>) {
        // Marks the loop as stopped even if a callback panics on this thread.
        let _exit = ExitGuard(self.shared.clone());

        let runtime = match runtime::Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime,
            Err(e) => {
                let _ = ready.send(Err(e.into()));
                return;
            }
        };

        runtime.block_on(self.serve(ready));
    }

    #[instrument(name = "dispatcher", skip(self, ready), fields(connection_id, addr))]
    async fn serve(&mut self, ready: oneshot::Sender<Result<(), Error>>) {
        tracing::Span::current()
            .record("connection_id", self.id.to_string())
            .record("addr", self.connection.addr());

        if let Err(e) = self.connection.connect().await {
            error!(error = %e, "failed to connect");
            let _ = ready.send(Err(e));
            return;
        }
        self.authenticate();
        if ready.send(Ok(())).is_err() {
            debug!("spawner went away before the dispatcher started");
            self.shared.shutdown.store(true, Ordering::Release);
        }

        info!("dispatcher started");

        loop {
            self.drain_submissions();
            self.shared.publish(self.pipeline.stats());

            if self.shared.is_shutdown() && self.pipeline.is_empty() {
                break;
            }

            if let Err(e) = self.poll_once().await {
                self.handle_fault(e).await;
            }
        }

        // Anything that raced with the shutdown flag never reached the queues.
        self.receiver.close();
        while let Ok(cmd) = self.receiver.try_recv() {
            cmd.fail(Error::Shutdown);
        }
        self.connection.disconnect();
        self.shared.publish(self.pipeline.stats());

        info!(stats = ?self.pipeline.stats(), "dispatcher stopped");
    }

    fn drain_submissions(&mut self) {
        while let Ok(cmd) = self.receiver.try_recv() {
            self.pipeline.push_back(cmd);
        }
    }

    /// One iteration: wait for readiness, a submission, a wake-up or the poll timeout, then move
    /// as many bytes as the socket allows in each direction.
    async fn poll_once(&mut self) -> Result<(), Error> {
        let interest = if self.pipeline.wants_write() {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        };

        let Some(stream) = self.connection.stream() else {
            return Err(Error::Connection("not connected".to_string()));
        };

        let ready = tokio::select! {
            ready = stream.ready(interest) => ready?,
            Some(cmd) = self.receiver.recv() => {
                self.pipeline.push_back(cmd);
                return Ok(());
            }
            _ = self.shared.wake.notified() => return Ok(()),
            _ = sleep(self.config.poll_timeout()) => return Ok(()),
        };

        if ready.is_writable() && self.pipeline.wants_write() {
            let written = self.pipeline.flush(|buf| stream.try_write(buf))?;
            trace!(written, "flushed");
        }

        if ready.is_readable() || ready.is_read_closed() {
            self.read_available()?;
        }

        Ok(())
    }

    /// Reads until the socket has nothing more to give, feeding every chunk to the pipeline.
    fn read_available(&mut self) -> Result<(), Error> {
        while let Some(buf) = self.connection.try_read()? {
            let read = buf.len();
            let completed = self.pipeline.feed(buf)?;
            trace!(read, completed, "received");
        }
        Ok(())
    }

    /// Fails what can no longer be answered and brings the connection back, unless shutting down.
    async fn handle_fault(&mut self, error: Error) {
        warn!(error = %error, "connection fault");

        self.pipeline.fail_reads(&error);
        self.connection.disconnect();

        while !self.shared.is_shutdown() && !self.connection.is_connected() {
            match self.connection.connect().await {
                Ok(()) => {
                    info!("reconnected");
                    self.pipeline.rewind_writes();
                    self.authenticate();
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        delay_ms = self.config.reconnect_delay_ms,
                        "connection failed, sleeping and retrying"
                    );
                    tokio::select! {
                        _ = sleep(self.config.reconnect_delay()) => {}
                        _ = self.shared.wake.notified() => {}
                    }
                }
            }
        }

        if self.shared.is_shutdown() {
            self.drain_submissions();
            self.pipeline.fail_writes(&error);
        }
    }

    /// Queues AUTH ahead of every other write when a password is configured.
    fn authenticate(&mut self) {
        let Some(request) = self.connection.auth_request() else {
            return;
        };

        let auth = PendingCommand::new(request, |result| match result {
            Ok(_) => debug!("authenticated"),
            Err(e) => warn!(error = %e, "authentication failed"),
        });
        self.pipeline.push_front(auth.internal());
    }
}

/// Submits commands to a running [`Dispatcher`]. Dropping it shuts the dispatcher down once the
/// commands already submitted are answered.
pub struct DispatcherHandle {
    sender: mpsc::UnboundedSender<PendingCommand>,
    shared: Arc<Shared>,
}

impl DispatcherHandle {
    /// Queues a command and wakes the loop. Safe to call from any thread; never blocks.
    ///
    /// A command submitted after shutdown began fails right away with [`Error::Shutdown`].
    pub fn submit(&self, cmd: PendingCommand) {
        if self.shared.is_shutdown() {
            cmd.fail(Error::Shutdown);
            return;
        }

        if let Err(mpsc::error::SendError(cmd)) = self.sender.send(cmd) {
            cmd.fail(Error::Shutdown);
        }
    }

    pub fn stats(&self) -> Stats {
        self.shared.stats()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.is_shutdown()
    }

    /// Asks the loop to stop once both queues are drained, without waiting for it.
    pub fn begin_shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.wake.notify_one();
    }

    /// Stops the loop and waits until it has exited. Every submitted command has had its callback
    /// invoked by the time this returns.
    pub async fn shutdown(&self) {
        self.begin_shutdown();

        loop {
            let exit = self.shared.exit.notified();
            if self.shared.stopped.load(Ordering::Acquire) {
                return;
            }
            exit.await;
        }
    }
}

impl Drop for DispatcherHandle {
    fn drop(&mut self) {
        self.begin_shutdown();
    }
}
