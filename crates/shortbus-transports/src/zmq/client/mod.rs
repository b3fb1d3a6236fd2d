//! ZMQ sending sockets

pub mod dealer;

pub use dealer::{ConnectionState, ZmqDealer};
