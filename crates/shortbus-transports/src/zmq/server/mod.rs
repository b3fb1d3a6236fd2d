// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! ZMQ receiving sockets

pub mod router;

pub use router::{InboundState, ZmqRouter};
