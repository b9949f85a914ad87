use std::fmt;

/// Identity of a registered producer, starting at 1 per buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProducerId(u64);

impl ProducerId {
    /// Wraps a raw producer number.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw producer number.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProducerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// An immutable item: payload plus its identifier and producer.
///
/// Identifiers come from the buffer's own monotonic counter
/// ([`ProdCons::next_message_id`](crate::ProdCons::next_message_id)), so two
/// messages minted for the same buffer never share an id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Message<T> {
    id: u64,
    producer: ProducerId,
    payload: T,
}

impl<T> Message<T> {
    pub fn new(id: u64, producer: ProducerId, payload: T) -> Self {
        Self {
            id,
            producer,
            payload,
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn producer(&self) -> ProducerId {
        self.producer
    }

    #[inline]
    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn into_payload(self) -> T {
        self.payload
    }
}

impl<T> fmt::Display for Message<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "M#{}({})", self.id, self.producer)
    }
}
