//! # adm-queue: In-Process Event Queue
//!
//! Decouples request handling from side-effect work (audit logging). A
//! [`BrokerBuilder`] collects handlers per topic; [`BrokerBuilder::start`]
//! freezes that table and spawns the single consumer loop, returning a
//! cloneable [`Publisher`] and a [`ConsumerHandle`].
//!
//! ## Delivery
//!
//! - At-most-once. Nothing is persisted, retried or acknowledged.
//! - FIFO across the whole queue, hence in publish order per topic.
//! - Every handler registered for a topic runs, in registration order, one
//!   after the other. A handler that errors or panics is logged and the loop
//!   moves on.
//! - The channel is bounded. When it is full the configured
//!   [`OverflowPolicy`] decides: wait for capacity, or drop the message and
//!   report [`QueueError::Full`] to the caller.
//!
//! Suitable for best-effort audit trails, not for state anything else relies on.

pub mod broker;
pub mod error;
pub mod message;

pub use broker::{BrokerBuilder, ConsumerHandle, OverflowPolicy, Publisher, QueueConfig, QueueStats};
pub use error::{HandlerError, QueueError};
pub use message::{Message, Payload};
