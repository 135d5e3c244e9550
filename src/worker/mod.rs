//! Background connection worker.
//!
//! A [`ConnectionWorker`] owns one TCP connection and services it from a
//! dedicated tokio task. Application code never touches the socket: it
//! pushes payloads onto the outbound [`MessageQueue`] with
//! [`send`](ConnectionWorker::send) and pulls payloads from the inbound queue
//! with [`receive`](ConnectionWorker::receive).
//!
//! Submodules:
//! - `service`: the drain-and-write / timed-read loop run by the task.
//! - `state`: [`WorkerState`] lifecycle and the published [`WorkerStatus`].
//!
//! Errors raised inside the loop never reach the caller directly. They move
//! the worker to [`WorkerState::Failed`] and are kept as
//! [`WorkerStatus::last_error`]; watch them with
//! [`subscribe`](ConnectionWorker::subscribe).

mod service;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::codec::FrameCodec;
use crate::config::WorkerConfig;
use crate::filter::{MessageFilter, Passthrough};
use crate::queue::MessageQueue;
use crate::{AppError, Result};

use self::service::ServiceLoop;
pub use self::state::{WorkerState, WorkerStatus};
use self::state::transition;

/// One logical connection and the task that services it.
pub struct ConnectionWorker {
    id: String,
    config: WorkerConfig,
    send_queue: Arc<MessageQueue>,
    receive_queue: Arc<MessageQueue>,
    filter: Arc<dyn MessageFilter>,
    status: Arc<watch::Sender<WorkerStatus>>,
    cancel: CancellationToken,
    /// Loop task; taken by the first `stop`.
    join_handle: Option<JoinHandle<()>>,
    started: bool,
}

impl ConnectionWorker {
    /// Construct a worker in [`WorkerState::Created`]. Nothing is opened
    /// until [`start`](Self::start).
    #[must_use]
    pub fn new(
        config: WorkerConfig,
        send_queue: Arc<MessageQueue>,
        receive_queue: Arc<MessageQueue>,
    ) -> Self {
        let (status, _) = watch::channel(WorkerStatus::created());
        Self {
            id: Uuid::new_v4().to_string(),
            config,
            send_queue,
            receive_queue,
            filter: Arc::new(Passthrough),
            status: Arc::new(status),
            cancel: CancellationToken::new(),
            join_handle: None,
            started: false,
        }
    }

    /// Replace the default pass-through filter.
    #[must_use]
    pub fn with_filter(mut self, filter: impl MessageFilter + 'static) -> Self {
        self.filter = Arc::new(filter);
        self
    }

    /// Connect to the configured address and spawn the service loop.
    ///
    /// # Errors
    ///
    /// - `AppError::AlreadyStarted` if `start` or `attach` already ran.
    /// - `AppError::Config` if the configuration is invalid.
    /// - `AppError::Connection` if the connect fails; the worker is then
    ///   [`WorkerState::Failed`].
    pub async fn start(&mut self) -> Result<()> {
        let codec = self.begin()?;
        let addr = self.config.address();

        let stream = match TcpStream::connect(addr.as_str()).await {
            Ok(stream) => stream,
            Err(err) => {
                let err = AppError::Connection(format!("failed to connect to {addr}: {err}"));
                warn!(worker_id = %self.id, %addr, error = %err, "connection worker: connect failed");
                transition(&self.status, WorkerState::Failed, Some(err.to_string()));
                return Err(err);
            }
        };

        info!(worker_id = %self.id, %addr, "connection worker: connected");
        self.spawn(stream, codec);
        Ok(())
    }

    /// Adopt an already-connected stream instead of connecting.
    ///
    /// # Errors
    ///
    /// - `AppError::AlreadyStarted` if `start` or `attach` already ran.
    /// - `AppError::Config` if the configuration is invalid.
    pub fn attach(&mut self, stream: TcpStream) -> Result<()> {
        let codec = self.begin()?;
        info!(worker_id = %self.id, peer = ?stream.peer_addr().ok(), "connection worker: attached");
        self.spawn(stream, codec);
        Ok(())
    }

    /// Stop the service loop and close the connection.
    ///
    /// Waits for the loop task to exit, so no queue activity happens after
    /// this returns. Messages still in the outbound queue may be left unsent;
    /// messages already in the inbound queue stay there. Calling `stop` on a
    /// worker that never started, or calling it twice, does nothing.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the loop task panicked.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.join_handle.take() else {
            debug!(worker_id = %self.id, "connection worker: stop with no running loop");
            return Ok(());
        };

        // A loop that already failed only needs joining.
        if self.state() == WorkerState::Running {
            transition(&self.status, WorkerState::Stopping, None);
        }
        self.cancel.cancel();

        handle
            .await
            .map_err(|err| AppError::Io(format!("worker task panicked: {err}")))?;

        info!(worker_id = %self.id, state = ?self.state(), "connection worker: stopped");
        Ok(())
    }

    /// Queue `message` for transmission. Never blocks.
    ///
    /// After the worker has stopped or failed the message is still accepted
    /// but never reaches the wire.
    pub fn send(&self, message: impl Into<Bytes>) {
        self.send_queue.push(message);
    }

    /// Wait up to `timeout` for the oldest unread inbound message.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ReceiveTimeout` if nothing arrives in time.
    pub async fn receive(&self, timeout: Duration) -> Result<Bytes> {
        self.receive_queue.pop(timeout).await
    }

    /// Current status snapshot.
    #[must_use]
    pub fn status(&self) -> WorkerStatus {
        self.status.borrow().clone()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        self.status.borrow().state
    }

    /// Error that failed the worker, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.status.borrow().last_error.clone()
    }

    /// Receiver notified on every status change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<WorkerStatus> {
        self.status.subscribe()
    }

    /// Resolve once the worker is [`Closed`](WorkerState::Closed) or
    /// [`Failed`](WorkerState::Failed), returning that status.
    ///
    /// Resolves immediately if the worker is already there. Never resolves
    /// for a worker that was never started.
    pub async fn terminated(&self) -> WorkerStatus {
        let mut status = self.status.subscribe();
        let terminal = match status.wait_for(|s| s.state.is_terminal()).await {
            Ok(terminal) => terminal.clone(),
            // The sender is owned by `self`, so the channel cannot close here.
            Err(_) => self.status(),
        };
        terminal
    }

    /// Identifier used in this worker's log fields.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Configuration the worker was built with.
    #[must_use]
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Guard against a second start and enter `Connecting`.
    fn begin(&mut self) -> Result<FrameCodec> {
        if self.started {
            return Err(AppError::AlreadyStarted(format!(
                "worker {} was already started",
                self.id
            )));
        }
        self.config.validate()?;
        let codec = FrameCodec::new(self.config.framing, self.config.max_frame_bytes)?;

        self.started = true;
        transition(&self.status, WorkerState::Connecting, None);
        Ok(codec)
    }

    fn spawn(&mut self, stream: TcpStream, codec: FrameCodec) {
        let service = ServiceLoop {
            send_queue: Arc::clone(&self.send_queue),
            receive_queue: Arc::clone(&self.receive_queue),
            filter: Arc::clone(&self.filter),
            poll_timeout: self.config.poll_timeout(),
            status: Arc::clone(&self.status),
            cancel: self.cancel.clone(),
        };

        transition(&self.status, WorkerState::Running, None);

        let span = info_span!("connection_worker", worker_id = %self.id, addr = %self.config.address());
        self.join_handle = Some(tokio::spawn(service.run(stream, codec).instrument(span)));
    }
}

impl Drop for ConnectionWorker {
    /// Cancel the loop task if the worker is dropped without `stop`.
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
