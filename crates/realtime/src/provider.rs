//! # Provider
//!
//! Provider defines external data interfaces for the crate.

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::model::{ChangeEvent, Scope, VehicleRecord};

/// The `ChangeFeed` trait defines the upstream service holding trip state.
///
/// Both the point-in-time query and the subscription must apply the scope's
/// route filter identically.
pub trait ChangeFeed: Send + Sync + 'static {
    /// Fetch every active trip in scope, with joined relations.
    fn fetch_active(&self, scope: &Scope) -> impl Future<Output = Result<Vec<VehicleRecord>>> + Send;

    /// Fetch a single trip, with joined relations.
    fn fetch_trip(&self, trip_id: &str) -> impl Future<Output = Result<Option<VehicleRecord>>> + Send;

    /// Open a change stream for the scope. Events and channel status updates
    /// are delivered through `sink` until the returned subscription is closed.
    fn subscribe(
        &self, scope: &Scope, sink: FeedSink,
    ) -> impl Future<Output = Result<Box<dyn Subscription>>> + Send;
}

/// Handle to an open change stream.
pub trait Subscription: Send + Sync {
    /// Close the stream. Must be safe to call more than once.
    fn unsubscribe(&self);
}

/// Channel status reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelStatus {
    Subscribed,
    ChannelError,
    TimedOut,
    Closed,
}

impl ChannelStatus {
    /// Whether the status should trigger a reconnect.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::ChannelError | Self::TimedOut)
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Subscribed => "SUBSCRIBED",
            Self::ChannelError => "CHANNEL_ERROR",
            Self::TimedOut => "TIMED_OUT",
            Self::Closed => "CLOSED",
        };
        f.write_str(s)
    }
}

impl FromStr for ChannelStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SUBSCRIBED" => Ok(Self::Subscribed),
            "CHANNEL_ERROR" => Ok(Self::ChannelError),
            "TIMED_OUT" => Ok(Self::TimedOut),
            "CLOSED" => Ok(Self::Closed),
            other => Err(anyhow!("unknown channel status: {other}")),
        }
    }
}

/// Message pushed by the transport into a subscription sink.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    Change(ChangeEvent),
    Status(ChannelStatus),
}

/// A feed message tagged with the subscription it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub generation: u64,
    pub message: FeedMessage,
}

/// Sending half handed to the transport for one subscription.
///
/// Every message is tagged with the subscription's generation so the
/// receiver can drop anything a superseded subscription still delivers.
/// Sending never blocks, so transport callbacks can push from any thread.
#[derive(Debug, Clone)]
pub struct FeedSink {
    channel: String,
    generation: u64,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl FeedSink {
    #[must_use]
    pub const fn new(channel: String, generation: u64, tx: mpsc::UnboundedSender<Envelope>) -> Self {
        Self { channel, generation, tx }
    }

    /// Channel name for transports that need one.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Deliver a change event. Returns `false` once the receiver is gone.
    pub fn change(&self, event: ChangeEvent) -> bool {
        self.send(FeedMessage::Change(event))
    }

    /// Deliver a channel status update. Returns `false` once the receiver is gone.
    pub fn status(&self, status: ChannelStatus) -> bool {
        self.send(FeedMessage::Status(status))
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, message: FeedMessage) -> bool {
        self.tx.send(Envelope { generation: self.generation, message }).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings() {
        assert_eq!("CHANNEL_ERROR".parse::<ChannelStatus>().unwrap(), ChannelStatus::ChannelError);
        assert_eq!("timed_out".parse::<ChannelStatus>().unwrap(), ChannelStatus::TimedOut);
        let err = "JOINING".parse::<ChannelStatus>().expect_err("should reject");
        assert_eq!(err.to_string(), "unknown channel status: JOINING");
        assert_eq!(ChannelStatus::Subscribed.to_string(), "SUBSCRIBED");
        assert!(ChannelStatus::TimedOut.is_failure());
        assert!(!ChannelStatus::Closed.is_failure());
    }

    #[test]
    fn sink_tags_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = FeedSink::new("active-trips".to_string(), 7, tx);

        assert!(sink.status(ChannelStatus::Subscribed));
        let envelope = rx.try_recv().expect("should receive");
        assert_eq!(envelope.generation, 7);
        assert_eq!(envelope.message, FeedMessage::Status(ChannelStatus::Subscribed));

        drop(rx);
        assert!(sink.is_closed());
        assert!(!sink.status(ChannelStatus::Closed));
    }
}
