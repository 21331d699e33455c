//! Client protocol and the WebSocket transport

pub mod codec;
pub mod connection;
pub mod handler;
pub mod protocol;
