//! A pipelined RESP client engine.
//!
//! A single [`dispatcher::Dispatcher`] thread owns one socket and multiplexes every submitted
//! command over it: requests are written in submission order, replies are decoded incrementally
//! as bytes arrive and handed to the commands in that same order.

pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod decoder;
pub mod dispatcher;
pub mod error;
pub mod frame;
pub mod pending;
pub mod pipeline;

pub use client::{Client, ReplyFuture};
pub use config::Config;
pub use error::Error;
pub use frame::Frame;

pub type Result<T> = std::result::Result<T, Error>;
