//! Topic filter of one WebSocket connection.

use std::collections::BTreeSet;

use crate::domain::EventTopic;

/// Which event topics a connection receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicFilter {
    /// Every topic (`"*"`).
    All,
    /// Only the listed topics; empty until the client subscribes.
    Topics(BTreeSet<EventTopic>),
}

impl Default for TopicFilter {
    fn default() -> Self {
        Self::Topics(BTreeSet::new())
    }
}

impl TopicFilter {
    /// Filter that forwards nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `topics`; `wildcard` switches to [`TopicFilter::All`].
    pub fn subscribe(&mut self, topics: &[EventTopic], wildcard: bool) {
        match self {
            _ if wildcard => *self = Self::All,
            Self::All => {}
            Self::Topics(set) => set.extend(topics.iter().copied()),
        }
    }

    /// Drops `topics`; `wildcard` drops everything.
    ///
    /// Dropping a single topic from [`TopicFilter::All`] leaves every other
    /// topic subscribed.
    pub fn unsubscribe(&mut self, topics: &[EventTopic], wildcard: bool) {
        if wildcard {
            *self = Self::default();
            return;
        }
        if topics.is_empty() {
            return;
        }
        let mut set: BTreeSet<EventTopic> = self.topics().into_iter().collect();
        for topic in topics {
            set.remove(topic);
        }
        *self = Self::Topics(set);
    }

    /// Returns `true` if events of `topic` are forwarded.
    #[must_use]
    pub fn matches(&self, topic: EventTopic) -> bool {
        match self {
            Self::All => true,
            Self::Topics(set) => set.contains(&topic),
        }
    }

    /// Forwarded topics, sorted.
    #[must_use]
    pub fn topics(&self) -> Vec<EventTopic> {
        match self {
            Self::All => EventTopic::ALL.to_vec(),
            Self::Topics(set) => set.iter().copied().collect(),
        }
    }

    /// Returns `true` for the wildcard subscription.
    #[must_use]
    pub const fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }
}
