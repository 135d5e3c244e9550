#![forbid(unsafe_code)]

//! `wirequeue` — a background worker that owns one TCP connection and
//! exposes it through an outbound and an inbound [`MessageQueue`].

pub mod codec;
pub mod config;
pub mod errors;
pub mod filter;
pub mod queue;
pub mod worker;

pub use config::WorkerConfig;
pub use errors::{AppError, Result};
pub use queue::MessageQueue;
pub use worker::{ConnectionWorker, WorkerState, WorkerStatus};
