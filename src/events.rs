//! Human-readable log messages sent from a running job to whoever is watching.
//!
//! The job pushes messages as fast as it likes, and the observer drains them
//! whenever it gets around to it. Neither side ever waits on the other.

use tokio::sync::mpsc::{
    UnboundedReceiver, UnboundedSender, error::TryRecvError, unbounded_channel,
};

use crate::prelude::*;

/// Create a connected sender and receiver.
pub fn event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = unbounded_channel();
    (EventSender { tx }, EventReceiver { rx })
}

/// The job's end of the channel.
#[derive(Clone, Debug)]
pub struct EventSender {
    tx: UnboundedSender<String>,
}

impl EventSender {
    /// Queue a message. Never blocks.
    ///
    /// If the observer has gone away, the message is dropped. The job keeps
    /// running either way.
    pub fn push(&self, message: impl Into<String>) {
        let message = message.into();
        trace!(%message, "queueing job event");
        if self.tx.send(message).is_err() {
            debug!("event receiver is gone, dropping message");
        }
    }
}

/// The observer's end of the channel.
#[derive(Debug)]
pub struct EventReceiver {
    rx: UnboundedReceiver<String>,
}

impl EventReceiver {
    /// Remove and return every message queued so far, oldest first. Never
    /// blocks.
    pub fn drain(&mut self) -> Vec<String> {
        let mut messages = vec![];
        loop {
            match self.rx.try_recv() {
                Ok(message) => messages.push(message),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        messages
    }

    /// Wait for the next message. Returns `None` once every sender is gone and
    /// the queue is empty.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_is_fifo_and_delivers_once() {
        let (tx, mut rx) = event_channel();
        tx.push("one");
        tx.push("two");
        tx.push(String::from("three"));
        assert_eq!(rx.drain(), ["one", "two", "three"]);
        assert!(rx.drain().is_empty());

        tx.push("four");
        assert_eq!(rx.drain(), ["four"]);
    }

    #[test]
    fn push_after_receiver_is_dropped_is_harmless() {
        let (tx, rx) = event_channel();
        drop(rx);
        tx.push("nobody is listening");
    }

    #[tokio::test]
    async fn messages_survive_the_sender() {
        let (tx, mut rx) = event_channel();
        let producer = tokio::spawn(async move {
            for i in 0..100 {
                tx.push(format!("message {i}"));
            }
        });
        producer.await.unwrap();

        let mut received = vec![];
        while let Some(message) = rx.recv().await {
            received.push(message);
        }
        let expected = (0..100).map(|i| format!("message {i}")).collect::<Vec<_>>();
        assert_eq!(received, expected);
    }
}
