//! Error types for buffer operations.

use thiserror::Error;

/// Errors returned by buffer operations.
///
/// End-of-stream is not an error: `get` reports it as `Ok(None)` and
/// `get_batch` as an empty batch. Cancellation and timeouts are kept distinct
/// from it so a consumer never mistakes an aborted wait for a drained buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BufferError {
    /// Capacity must be greater than zero.
    #[error("capacity must be greater than 0")]
    InvalidCapacity,

    /// Batch size passed to `get_batch` must be greater than zero.
    #[error("batch size must be greater than 0")]
    InvalidBatchSize,

    /// Copy count passed to `put_copies` must be greater than zero.
    #[error("copy count must be greater than 0")]
    InvalidCopies,

    /// More producers registered than were configured as expected.
    #[error("too many producers registered (max: {max})")]
    TooManyProducers {
        /// The configured number of expected producers.
        max: usize,
    },

    /// The buffer is closed; no new items are admitted.
    #[error("buffer is closed")]
    Closed,

    /// The blocking call was aborted through its [`CancelToken`](crate::CancelToken).
    #[error("blocking call was cancelled")]
    Cancelled,

    /// No item arrived before the deadline while the buffer was still open.
    #[error("timed out waiting for an item")]
    Timeout,
}

impl BufferError {
    /// Returns `true` if the call was aborted by cancellation.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns `true` for arguments rejected synchronously at call time.
    #[inline]
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::InvalidCapacity | Self::InvalidBatchSize | Self::InvalidCopies
        )
    }

    /// Returns `true` if retrying the same call can never succeed.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::TooManyProducers { .. }) || self.is_config()
    }
}

/// Failure of [`Buffer::get_batch`](crate::Buffer::get_batch).
///
/// A batch can be aborted after it already took items off the buffer. Those
/// items are handed back in `items` so they are not lost, while `cause`
/// still reports why the call stopped. `items` is empty when the call failed
/// before taking anything.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{cause} ({} items taken before the batch stopped)", .items.len())]
pub struct BatchError<T> {
    /// Items removed from the buffer before the call was aborted, FIFO ordered.
    pub items: Vec<T>,
    /// Why the batch stopped.
    pub cause: BufferError,
}

impl<T> BatchError<T> {
    pub(crate) fn new(cause: BufferError) -> Self {
        Self {
            items: Vec::new(),
            cause,
        }
    }

    /// Returns the underlying error, dropping any salvaged items.
    #[inline]
    pub fn into_cause(self) -> BufferError {
        self.cause
    }
}

impl<T> From<BatchError<T>> for BufferError {
    fn from(err: BatchError<T>) -> Self {
        err.cause
    }
}
