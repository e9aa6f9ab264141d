//! Server-sent event stream and wire protocol

pub mod handler;
pub mod protocol;
