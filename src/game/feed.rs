//! Round-Entropy Feeds
//!
//! The engine consumes rounds from any [`RoundFeed`]: a precomputed list
//! for replay and tests, or a channel fed by a live block monitor.

use std::collections::VecDeque;
use std::future::Future;

use tokio::sync::mpsc;

use crate::game::events::RoundEvent;

/// Ordered source of round events. `None` means the feed is exhausted.
pub trait RoundFeed: Send {
    /// Next event in round order.
    fn next_event(&mut self) -> impl Future<Output = Option<RoundEvent>> + Send;
}

/// Precomputed event list.
#[derive(Debug, Clone, Default)]
pub struct VecFeed {
    events: VecDeque<RoundEvent>,
}

impl VecFeed {
    /// Feed that yields `events` in order.
    pub fn new(events: impl IntoIterator<Item = RoundEvent>) -> Self {
        Self {
            events: events.into_iter().collect(),
        }
    }

    /// Events not yet consumed.
    pub fn remaining(&self) -> usize {
        self.events.len()
    }
}

impl RoundFeed for VecFeed {
    async fn next_event(&mut self) -> Option<RoundEvent> {
        self.events.pop_front()
    }
}

/// Live feed backed by a channel.
#[derive(Debug)]
pub struct ChannelFeed {
    rx: mpsc::Receiver<RoundEvent>,
}

impl ChannelFeed {
    /// Create a feed and the sender a monitor pushes into.
    pub fn new(buffer: usize) -> (mpsc::Sender<RoundEvent>, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (tx, Self { rx })
    }
}

impl RoundFeed for ChannelFeed {
    async fn next_event(&mut self) -> Option<RoundEvent> {
        self.rx.recv().await
    }
}
