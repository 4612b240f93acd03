//! Fan-out of signals to subscribers.
//!
//! A feed keeps an ordered history for polling and pushes every emitted
//! signal to each live subscriber. Subscribers whose receiver was dropped
//! are pruned on the next emit.

use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

enum Subscriber<T> {
    Blocking(Sender<T>),
    Async(UnboundedSender<T>),
}

impl<T> Subscriber<T> {
    fn send(&self, value: T) -> bool {
        match self {
            Subscriber::Blocking(tx) => tx.send(value).is_ok(),
            Subscriber::Async(tx) => tx.send(value).is_ok(),
        }
    }
}

/// An ordered signal feed with history.
pub struct EventFeed<T> {
    subscribers: RwLock<Vec<Subscriber<T>>>,
    history: RwLock<VecDeque<T>>,
    max_history: usize,
}

impl<T: Clone> EventFeed<T> {
    /// Creates a feed keeping the last 1024 signals.
    pub fn new() -> Self {
        Self::with_max_history(1024)
    }

    /// Creates a feed with a specific history limit.
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            history: RwLock::new(VecDeque::new()),
            max_history,
        }
    }

    /// Subscribes with a blocking receiver.
    pub fn subscribe(&self) -> Receiver<T> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(Subscriber::Blocking(tx));
        rx
    }

    /// Subscribes with a receiver usable from async code.
    pub fn subscribe_async(&self) -> UnboundedReceiver<T> {
        let (tx, rx) = unbounded_channel();
        self.subscribers.write().push(Subscriber::Async(tx));
        rx
    }

    /// Records a signal and sends it to every live subscriber.
    pub fn emit(&self, value: T) {
        {
            let mut history = self.history.write();
            history.push_back(value.clone());
            while history.len() > self.max_history {
                history.pop_front();
            }
        }

        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(value.clone()));
    }

    /// Returns the recorded history, oldest first.
    pub fn history(&self) -> Vec<T> {
        self.history.read().iter().cloned().collect()
    }

    /// Number of signals in history.
    pub fn history_len(&self) -> usize {
        self.history.read().len()
    }

    /// Number of subscribers that were live at the last emit.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Drops every subscriber, closing their receivers.
    pub fn close(&self) {
        self.subscribers.write().clear();
    }
}

impl<T: Clone> Default for EventFeed<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for EventFeed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventFeed")
            .field("subscribers", &self.subscribers.read().len())
            .field("history", &self.history.read().len())
            .field("max_history", &self.max_history)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn emit_and_receive() {
        let feed = EventFeed::new();
        let rx = feed.subscribe();
        feed.emit(7u32);
        assert_eq!(rx.recv_timeout(Duration::from_millis(100)).unwrap(), 7);
    }

    #[test]
    fn multiple_subscribers() {
        let feed = EventFeed::new();
        let rx1 = feed.subscribe();
        let mut rx2 = feed.subscribe_async();
        feed.emit("a");
        assert_eq!(rx1.recv().unwrap(), "a");
        assert_eq!(rx2.try_recv().unwrap(), "a");
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let feed = EventFeed::new();
        let rx = feed.subscribe();
        let _keep = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 2);
        drop(rx);
        feed.emit(1u8);
        assert_eq!(feed.subscriber_count(), 1);
    }

    #[test]
    fn history_is_bounded() {
        let feed = EventFeed::with_max_history(3);
        for i in 0..5u32 {
            feed.emit(i);
        }
        assert_eq!(feed.history(), vec![2, 3, 4]);
        assert_eq!(feed.history_len(), 3);
    }

    #[test]
    fn close_ends_receivers() {
        let feed = EventFeed::new();
        let rx = feed.subscribe();
        feed.emit(1u8);
        feed.close();
        assert_eq!(rx.recv().unwrap(), 1);
        assert!(rx.recv().is_err());
    }
}
