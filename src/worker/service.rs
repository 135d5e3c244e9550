//! Service loop driving one connection.
//!
//! Each iteration drains the outbound queue onto the socket, then waits up
//! to the poll timeout for one inbound frame. The loop owns both socket
//! halves; they are shut down and dropped when it returns.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::codec::FrameCodec;
use crate::filter::MessageFilter;
use crate::queue::MessageQueue;
use crate::worker::state::{transition, WorkerState, WorkerStatus};
use crate::AppError;

/// Everything the loop task needs, moved into it at spawn time.
pub(crate) struct ServiceLoop {
    pub(crate) send_queue: Arc<MessageQueue>,
    pub(crate) receive_queue: Arc<MessageQueue>,
    pub(crate) filter: Arc<dyn MessageFilter>,
    pub(crate) poll_timeout: Duration,
    pub(crate) status: Arc<watch::Sender<WorkerStatus>>,
    pub(crate) cancel: CancellationToken,
}

/// Outcome of a single loop iteration.
enum Step {
    Continue,
    Cancelled,
    Failed(AppError),
}

impl ServiceLoop {
    /// Run until cancelled or until an I/O error, then close the connection.
    pub(crate) async fn run(self, stream: TcpStream, codec: FrameCodec) {
        let (read_half, mut writer) = stream.into_split();
        let mut reader = FramedRead::new(read_half, codec);

        let step = loop {
            match self.iterate(&mut reader, &mut writer).await {
                Step::Continue => {}
                other => break other,
            }
        };

        // Best effort: the peer may already be gone.
        if let Err(err) = writer.shutdown().await {
            debug!(error = %err, "connection worker: shutdown after loop exit failed");
        }
        drop(reader);
        drop(writer);

        match step {
            Step::Failed(err) => {
                warn!(error = %err, "connection worker: loop failed, connection closed");
                transition(&self.status, WorkerState::Failed, Some(err.to_string()));
            }
            Step::Cancelled | Step::Continue => {
                debug!("connection worker: loop stopped, connection closed");
                // Dropping the worker cancels without passing through `stop`.
                transition(&self.status, WorkerState::Stopping, None);
                transition(&self.status, WorkerState::Closed, None);
            }
        }
    }

    async fn iterate(
        &self,
        reader: &mut FramedRead<OwnedReadHalf, FrameCodec>,
        writer: &mut OwnedWriteHalf,
    ) -> Step {
        if self.cancel.is_cancelled() {
            return Step::Cancelled;
        }

        while let Some(message) = self.send_queue.try_pop().await {
            let message = self.filter.outbound(message);
            if let Err(err) = writer.write_all(&message).await {
                return Step::Failed(AppError::Write(format!(
                    "failed to write {} bytes: {err}",
                    message.len()
                )));
            }
            debug!(bytes = message.len(), "connection worker: message written");
        }

        tokio::select! {
            biased;

            () = self.cancel.cancelled() => Step::Cancelled,

            read = tokio::time::timeout(self.poll_timeout, reader.next()) => match read {
                // Idle: nothing arrived within the poll timeout.
                Err(_) => Step::Continue,
                Ok(None) => Step::Failed(AppError::Read("connection closed by peer".into())),
                Ok(Some(Err(err))) => Step::Failed(into_read_error(err)),
                Ok(Some(Ok(frame))) => {
                    debug!(bytes = frame.len(), "connection worker: message received");
                    if let Some(message) = self.filter.inbound(frame) {
                        self.receive_queue.push(message);
                    }
                    Step::Continue
                }
            },
        }
    }
}

/// Socket errors surface from the codec as `AppError::Io`; report them as reads.
fn into_read_error(err: AppError) -> AppError {
    match err {
        AppError::Io(msg) => AppError::Read(msg),
        other => other,
    }
}
