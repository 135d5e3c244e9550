//! Message filters applied by the service loop.
//!
//! A filter sees every outbound message just before it is written and every
//! inbound message just before it is queued. Inbound filters may drop a
//! message by returning `None`.

use bytes::Bytes;

/// Hook for rewriting or dropping messages at the queue boundary.
pub trait MessageFilter: Send + Sync {
    /// Transform an outbound message before it is written to the connection.
    fn outbound(&self, message: Bytes) -> Bytes {
        message
    }

    /// Transform an inbound message before it is pushed onto the inbound
    /// queue. Returning `None` discards it.
    fn inbound(&self, message: Bytes) -> Option<Bytes> {
        Some(message)
    }
}

/// Filter that leaves every message untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl MessageFilter for Passthrough {}
