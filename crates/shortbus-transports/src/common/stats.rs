//! Traffic and drop counters
//!
//! Dropping is silent on the wire path; these counters are the only place a
//! lost frame leaves a trace.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of an inbound transport's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InboundStats {
    pub frames_received: u64,
    pub bytes_received: u64,
    pub undersized_frames: u64,
    pub corrupt_envelopes: u64,
    pub unrouted_messages: u64,
    pub dispatched_messages: u64,
}

impl InboundStats {
    pub fn dropped(&self) -> u64 {
        self.undersized_frames + self.corrupt_envelopes + self.unrouted_messages
    }
}

/// Point-in-time view of an outbound transport's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutboundStats {
    pub messages_queued: u64,
    pub messages_sent: u64,
    pub bytes_sent: u64,
    pub messages_dropped: u64,
    pub send_errors: u64,
}

#[derive(Debug, Default)]
pub(crate) struct InboundCounters {
    pub frames_received: AtomicU64,
    pub bytes_received: AtomicU64,
    pub undersized_frames: AtomicU64,
    pub corrupt_envelopes: AtomicU64,
    pub unrouted_messages: AtomicU64,
    pub dispatched_messages: AtomicU64,
}

impl InboundCounters {
    pub fn snapshot(&self) -> InboundStats {
        InboundStats {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            undersized_frames: self.undersized_frames.load(Ordering::Relaxed),
            corrupt_envelopes: self.corrupt_envelopes.load(Ordering::Relaxed),
            unrouted_messages: self.unrouted_messages.load(Ordering::Relaxed),
            dispatched_messages: self.dispatched_messages.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct OutboundCounters {
    pub messages_queued: AtomicU64,
    pub messages_sent: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub messages_dropped: AtomicU64,
    pub send_errors: AtomicU64,
}

impl OutboundCounters {
    pub fn snapshot(&self) -> OutboundStats {
        OutboundStats {
            messages_queued: self.messages_queued.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
        }
    }
}

pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn add(counter: &AtomicU64, amount: usize) {
    counter.fetch_add(amount as u64, Ordering::Relaxed);
}
