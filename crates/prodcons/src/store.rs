use crate::invariants::debug_assert_bounded_count;

/// Fixed-capacity circular array of slots.
///
/// Not synchronized: the engine only touches it while holding its lock.
/// `head` is the next slot to read, `tail` the next slot to write, both
/// advanced modulo capacity.
#[derive(Debug)]
pub(crate) struct Store<S> {
    /// Fixed at construction, never grows or shrinks.
    slots: Box<[Option<S>]>,
    head: usize,
    tail: usize,
    len: usize,
}

impl<S> Store<S> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots: slots.into_boxed_slice(),
            head: 0,
            tail: 0,
            len: 0,
        }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub(crate) fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    /// Writes `slot` at `tail`. The caller has already waited for space.
    pub(crate) fn push_back(&mut self, slot: S) {
        debug_assert_bounded_count!(self.len + 1, self.capacity());
        self.slots[self.tail] = Some(slot);
        self.tail = (self.tail + 1) % self.slots.len();
        self.len += 1;
    }

    /// Clears and returns the slot at `head`.
    pub(crate) fn pop_front(&mut self) -> Option<S> {
        if self.is_empty() {
            return None;
        }
        let slot = self.slots[self.head].take();
        self.head = (self.head + 1) % self.slots.len();
        self.len -= 1;
        slot
    }

    /// The oldest slot, left in place.
    pub(crate) fn front_mut(&mut self) -> Option<&mut S> {
        if self.is_empty() {
            return None;
        }
        self.slots[self.head].as_mut()
    }
}
