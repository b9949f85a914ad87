use crate::{BufferError, CancelToken, FanoutBuffer, Message, ProdCons, ProducerId};
use std::marker::PhantomData;

/// Producer handle that reports completion exactly once.
///
/// Dropping the guard calls [`ProdCons::producer_finished`], so a producer
/// that returns early, fails, or is cancelled still counts toward closing
/// the buffer.
///
/// Note: the guard intentionally does NOT implement `Clone`; two clones would
/// report the same producer finished twice.
pub struct ProducerGuard<T, B: ProdCons<T>> {
    buffer: B,
    id: ProducerId,
    cancel: CancelToken,
    finished: bool,
    _item: PhantomData<fn(T)>,
}

impl<T, B: ProdCons<T>> ProducerGuard<T, B> {
    pub(crate) fn new(buffer: B, id: ProducerId, cancel: CancelToken) -> Self {
        Self {
            buffer,
            id,
            cancel,
            finished: false,
            _item: PhantomData,
        }
    }

    #[inline]
    pub fn id(&self) -> ProducerId {
        self.id
    }

    #[inline]
    pub fn buffer(&self) -> &B {
        &self.buffer
    }

    /// Token every blocking call through this guard is made with.
    #[inline]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Inserts `item`, blocking while the buffer is full.
    pub fn put(&self, item: T) -> Result<(), BufferError> {
        self.buffer.put(item, &self.cancel)
    }

    /// Reports this producer finished now instead of at drop.
    pub fn finish(mut self) {
        self.finish_once();
    }

    fn finish_once(&mut self) {
        if !self.finished {
            self.finished = true;
            self.buffer.producer_finished();
        }
    }
}

impl<P, B: ProdCons<Message<P>>> ProducerGuard<Message<P>, B> {
    /// Wraps `payload` with a fresh id and this producer's identity.
    pub fn message(&self, payload: P) -> Message<P> {
        Message::new(self.buffer.next_message_id(), self.id, payload)
    }
}

impl<T: Clone + Send + 'static> ProducerGuard<T, FanoutBuffer<T>> {
    /// Deposits `item` as a group of `copies` and waits until all are claimed.
    pub fn put_copies(&self, item: T, copies: usize) -> Result<(), BufferError> {
        self.buffer.put_copies(item, copies, &self.cancel)
    }
}

impl<T, B: ProdCons<T>> Drop for ProducerGuard<T, B> {
    fn drop(&mut self) {
        self.finish_once();
    }
}
