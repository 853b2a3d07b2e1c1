//! Readback tickets for async tile retrieval.
//!
//! A readback snapshots the composed tiles at request time and resolves on
//! a later frame. The requester keeps a [`ReadbackTicket`] and polls it;
//! the backend completes the matching [`ReadbackSender`] once the copy has
//! finished or failed. Tickets are single-shot: the first terminal poll
//! transfers the image out.

use std::{
    sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError},
    time::Duration,
};

use crate::tile::TileImage;

/// Readback failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadbackError {
    /// Buffer mapping failed
    MapFailed(String),
    /// Texture copy failed
    CopyFailed(String),
    /// The readback did not complete
    Incomplete,
    /// The backend went away without resolving the ticket
    Disconnected,
}

impl std::fmt::Display for ReadbackError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MapFailed(msg) => write!(f, "buffer mapping failed: {}", msg),
            Self::CopyFailed(msg) => write!(f, "texture copy failed: {}", msg),
            Self::Incomplete => write!(f, "readback did not complete"),
            Self::Disconnected => write!(f, "readback source disconnected"),
        }
    }
}

impl std::error::Error for ReadbackError {}

/// Observed state of a ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readback {
    /// The copy has not resolved yet.
    Pending,
    /// The copy finished; the composed tiles at request time.
    Ready(TileImage),
    /// The copy failed and will never produce an image.
    Failed(ReadbackError),
}

/// Completion side handed to the backend when a readback is requested.
pub type ReadbackSender = Sender<Result<TileImage, ReadbackError>>;

/// Requester side of an in-flight readback.
pub struct ReadbackTicket {
    rx: Receiver<Result<TileImage, ReadbackError>>,
}

/// Create an unresolved ticket and its completion sender.
pub fn channel() -> (ReadbackSender, ReadbackTicket) {
    let (tx, rx) = mpsc::channel();
    (tx, ReadbackTicket { rx })
}

impl ReadbackTicket {
    /// A ticket that is already resolved. Used by backends that can copy
    /// synchronously at request time.
    pub fn completed(image: TileImage) -> Self {
        let (tx, ticket) = channel();
        let _ = tx.send(Ok(image));
        ticket
    }

    /// A ticket that is already failed.
    pub fn failed(error: ReadbackError) -> Self {
        let (tx, ticket) = channel();
        let _ = tx.send(Err(error));
        ticket
    }

    /// Check the ticket without blocking. Returns [`Readback::Pending`]
    /// until the backend resolves it; the first terminal poll moves the
    /// image out, so callers stop polling once they see one.
    pub fn poll(&mut self) -> Readback {
        match self.rx.try_recv() {
            Ok(Ok(image)) => Readback::Ready(image),
            Ok(Err(error)) => Readback::Failed(error),
            Err(TryRecvError::Empty) => Readback::Pending,
            Err(TryRecvError::Disconnected) => Readback::Failed(ReadbackError::Disconnected),
        }
    }

    /// Block until the ticket resolves or `timeout` passes.
    pub fn wait(self, timeout: Duration) -> Result<TileImage, ReadbackError> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(ReadbackError::Incomplete),
            Err(RecvTimeoutError::Disconnected) => Err(ReadbackError::Disconnected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_ticket_is_ready() {
        let mut ticket = ReadbackTicket::completed(TileImage::black(2, 2));
        match ticket.poll() {
            Readback::Ready(image) => {
                assert_eq!(image.width(), 2);
                assert_eq!(image.pixels().len(), 12);
            }
            other => panic!("expected ready, got {:?}", other),
        }
    }

    #[test]
    fn test_failed_ticket() {
        let mut ticket = ReadbackTicket::failed(ReadbackError::CopyFailed("boom".to_string()));
        assert_eq!(
            ticket.poll(),
            Readback::Failed(ReadbackError::CopyFailed("boom".to_string()))
        );
    }

    #[test]
    fn test_pending_until_sender_resolves() {
        let (tx, mut ticket) = channel();
        assert_eq!(ticket.poll(), Readback::Pending);
        tx.send(Ok(TileImage::black(1, 1))).unwrap();
        assert!(matches!(ticket.poll(), Readback::Ready(_)));
    }

    #[test]
    fn test_dropped_sender_fails_the_ticket() {
        let (tx, mut ticket) = channel();
        drop(tx);
        assert_eq!(ticket.poll(), Readback::Failed(ReadbackError::Disconnected));
    }

    #[test]
    fn test_wait_times_out() {
        let (_tx, ticket) = channel();
        let result = ticket.wait(Duration::from_millis(5));
        assert_eq!(result, Err(ReadbackError::Incomplete));
    }

    #[test]
    fn test_error_display() {
        let err = ReadbackError::MapFailed("test".to_string());
        assert!(format!("{}", err).contains("mapping failed"));
        assert!(format!("{}", ReadbackError::Incomplete).contains("did not complete"));
    }
}
