//! prodcons - Bounded, Closable Producer/Consumer Buffer
//!
//! A fixed-capacity FIFO shared by any number of producer and consumer
//! threads, guarded by one mutex and three condition variables.
//!
//! # Key Features
//!
//! - Blocking `put`/`get` with FIFO order and a hard capacity bound
//! - Closing protocol: the last of the expected producers closes the buffer;
//!   consumers drain what is left and then see an end-of-stream sentinel
//! - Batch retrieval (`get_batch(k)`): up to `k` items per call, FIFO ordered
//! - Fan-out barrier groups (`put_copies(item, n)`): every copy claimed by a
//!   distinct consumer, all parties released together
//! - Cooperative cancellation of any blocking call via [`CancelToken`]
//! - An elastic [`TaskExecutor`] built on the plain buffer
//!
//! # Example
//!
//! ```
//! use prodcons_rs::{Buffer, CancelToken, ProdCons};
//! use std::thread;
//!
//! let buffer = Buffer::<u64>::with_capacity(4).unwrap();
//! buffer.configure_expected_producers(1);
//! let cancel = CancelToken::new();
//!
//! let producer = buffer.register_producer(&cancel).unwrap();
//! let handle = thread::spawn(move || {
//!     for i in 0..10 {
//!         producer.put(i).unwrap();
//!     }
//!     // dropping the guard closes the buffer
//! });
//!
//! let mut received = Vec::new();
//! while let Some(item) = buffer.get(&cancel).unwrap() {
//!     received.push(item);
//! }
//! handle.join().unwrap();
//! assert_eq!(received, (0..10).collect::<Vec<_>>());
//! ```

mod buffer;
mod cancel;
mod config;
mod engine;
mod error;
#[cfg(not(feature = "loom"))]
mod executor;
mod fanout;
mod invariants;
mod message;
mod metrics;
mod producer;
mod store;
mod sync;
mod traits;

pub use buffer::Buffer;
pub use cancel::CancelToken;
pub use config::{Config, HIGH_THROUGHPUT_CONFIG, RENDEZVOUS_CONFIG};
pub use error::{BatchError, BufferError};
#[cfg(not(feature = "loom"))]
pub use executor::{ExecutorError, Task, TaskExecutor, DEFAULT_IDLE_TIMEOUT};
pub use fanout::FanoutBuffer;
pub use message::{Message, ProducerId};
pub use metrics::MetricsSnapshot;
pub use producer::ProducerGuard;
pub use traits::ProdCons;
