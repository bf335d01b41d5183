//! # subpub
//!
//! In-process publish/subscribe bus keyed by subject.
//!
//! Publishers push messages tagged with a subject string. Every subscriber of
//! that subject gets its own bounded queue and a dedicated delivery task that
//! invokes its handler one message at a time, in the order the queue accepted
//! them.
//!
//! This crate provides:
//!
//! - [`bus`] — The [`Bus`]: subscribe, publish, and deadline-bounded close.
//! - [`subscription`] — [`Subscription`] handles and their identifiers.
//! - [`handler`] — The [`MessageHandler`] sink trait.
//! - [`config`] — [`BusConfig`] and the default queue capacity.
//! - [`error`] — Bus error types.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use subpub::Bus;
//!
//! #[tokio::main]
//! async fn main() {
//!     let bus: Bus<String> = Bus::new();
//!
//!     let sub = bus
//!         .subscribe("orders", |msg: String| println!("order: {msg}"))
//!         .unwrap();
//!     bus.publish("orders", "42".to_string()).unwrap();
//!
//!     sub.unsubscribe();
//!     bus.close(Duration::from_secs(5)).await.unwrap();
//! }
//! ```

pub mod bus;
pub mod config;
pub mod error;
pub mod handler;
mod registry;
pub mod subscription;

pub use bus::Bus;
pub use config::{BusConfig, DEFAULT_QUEUE_CAPACITY};
pub use error::BusError;
pub use handler::MessageHandler;
pub use subscription::{Subscription, SubscriptionId};
