//! Single-writer outbound frame queue.
//!
//! Frames from any number of producers funnel through two bounded lanes into
//! one writer task, so bytes from different senders never interleave on the
//! wire. Control frames (pong, close) use the high-priority lane and overtake
//! queued data frames.

use tokio::sync::mpsc;
use tracing::debug;

use super::TransportError;
use crate::frame::Frame;

/// Queue lane a frame travels on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Priority {
    /// Pong and close replies.
    Control,
    /// Text and binary messages.
    Data,
}

/// Receiving half owned by the writer task.
#[derive(Debug)]
pub struct Outbox {
    control_rx: mpsc::Receiver<Frame>,
    data_rx: mpsc::Receiver<Frame>,
}

/// Cloneable producer handle.
#[derive(Clone, Debug)]
pub struct OutboxHandle {
    control_tx: mpsc::Sender<Frame>,
    data_tx: mpsc::Sender<Frame>,
}

impl Outbox {
    /// Create an outbox whose lanes each hold up to `capacity` frames.
    ///
    /// A zero capacity is raised to one.
    ///
    /// # Examples
    ///
    /// ```
    /// use ddpwire::{
    ///     frame::{Frame, Opcode},
    ///     transport::{Outbox, Priority},
    /// };
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let (mut outbox, handle) = Outbox::with_capacity(4);
    /// handle.push(Frame::text("data"), Priority::Data).await.expect("push");
    /// handle.push(Frame::pong("p"), Priority::Control).await.expect("push");
    /// let (priority, frame) = outbox.recv().await.expect("frame");
    /// assert_eq!(priority, Priority::Control);
    /// assert_eq!(frame.opcode(), Opcode::Pong);
    /// # }
    /// ```
    #[must_use]
    pub fn with_capacity(capacity: usize) -> (Self, OutboxHandle) {
        let capacity = capacity.max(1);
        let (control_tx, control_rx) = mpsc::channel(capacity);
        let (data_tx, data_rx) = mpsc::channel(capacity);
        (
            Self {
                control_rx,
                data_rx,
            },
            OutboxHandle {
                control_tx,
                data_tx,
            },
        )
    }

    /// Receive the next frame, preferring the control lane.
    ///
    /// Returns `None` once every handle has been dropped and both lanes are
    /// drained.
    pub async fn recv(&mut self) -> Option<(Priority, Frame)> {
        tokio::select! {
            biased;
            Some(frame) = self.control_rx.recv() => Some((Priority::Control, frame)),
            Some(frame) = self.data_rx.recv() => Some((Priority::Data, frame)),
            else => None,
        }
    }

    /// Stop accepting new frames while leaving queued frames readable.
    pub fn close(&mut self) {
        self.control_rx.close();
        self.data_rx.close();
    }
}

impl OutboxHandle {
    /// Queue `frame`, waiting for capacity on its lane.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::WriterClosed`] if the writer task has gone.
    pub async fn push(&self, frame: Frame, priority: Priority) -> Result<(), TransportError> {
        let tx = self.lane(priority);
        tx.send(frame)
            .await
            .map_err(|_| TransportError::WriterClosed)?;
        debug!(?priority, "frame queued");
        Ok(())
    }

    /// Queue `frame` without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::WriterClosed`] if the writer task has gone or
    /// the lane is full.
    pub fn try_push(&self, frame: Frame, priority: Priority) -> Result<(), TransportError> {
        self.lane(priority)
            .try_send(frame)
            .map_err(|_| TransportError::WriterClosed)
    }

    /// Whether the writer task has stopped receiving.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.data_tx.is_closed() }

    fn lane(&self, priority: Priority) -> &mpsc::Sender<Frame> {
        match priority {
            Priority::Control => &self.control_tx,
            Priority::Data => &self.data_tx,
        }
    }
}
