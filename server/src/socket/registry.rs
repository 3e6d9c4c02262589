use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::socket::rooms::ChannelName;

/// Delivery edge for one connection. The production impl wraps a
/// socketioxide socket; tests substitute recording or failing mocks.
pub trait ConnectionSink: Send + Sync {
    fn deliver(&self, event: &str, payload: &JsonValue) -> anyhow::Result<()>;
}

struct ConnectionEntry {
    user_id: String,
    sink: Arc<dyn ConnectionSink>,
    // Inverse of `channels`, so disconnect cleanup is O(channels joined).
    joined: HashSet<String>,
}

/// All shared mutable state of the real-time layer. Membership is keyed by
/// connection id, not user id: one user may hold several live connections
/// and each joins or leaves rooms independently.
#[derive(Default)]
pub struct RoomRegistry {
    connections: DashMap<String, ConnectionEntry>,
    channels: DashMap<String, HashSet<String>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a connection and joins it to the owner's personal channel.
    pub fn register(&self, conn_id: &str, user_id: &str, sink: Arc<dyn ConnectionSink>) {
        self.connections.insert(
            conn_id.to_string(),
            ConnectionEntry {
                user_id: user_id.to_string(),
                sink,
                joined: HashSet::new(),
            },
        );
        self.join(conn_id, &ChannelName::user(user_id));
        debug!(conn_id, user_id, "connection registered");
    }

    /// Idempotent. Joins from unknown connection ids are dropped; only
    /// authenticated connections ever reach the registry.
    pub fn join(&self, conn_id: &str, channel: &ChannelName) {
        let name = channel.render();

        let Some(mut entry) = self.connections.get_mut(conn_id) else {
            return;
        };
        if !entry.joined.insert(name.clone()) {
            return;
        }
        drop(entry);

        self.channels
            .entry(name)
            .or_default()
            .insert(conn_id.to_string());
    }

    /// Idempotent; leaving a channel the connection never joined is a no-op.
    /// A connection stays in its own personal channel for as long as it is
    /// open, so a leave targeting it is refused: dropping out of
    /// `user:<id>` would silently cut the connection off from every
    /// subsequent notification push.
    pub fn leave(&self, conn_id: &str, channel: &ChannelName) {
        let name = channel.render();

        let Some(mut entry) = self.connections.get_mut(conn_id) else {
            return;
        };
        if channel.is_personal_for(&entry.user_id) {
            debug!(conn_id, channel = %name, "refused leave of personal channel");
            return;
        }
        if !entry.joined.remove(&name) {
            return;
        }
        drop(entry);

        self.remove_member(&name, conn_id);
    }

    pub fn is_member(&self, conn_id: &str, channel: &ChannelName) -> bool {
        self.connections
            .get(conn_id)
            .map(|entry| entry.joined.contains(&channel.render()))
            .unwrap_or(false)
    }

    /// Delivers an event to every member of a channel, returning the number
    /// of successful deliveries. Membership is snapshotted before delivery
    /// so no map guard is held across a sink call; a failed or vanished
    /// sink is skipped, never aborts the loop.
    pub fn multicast(&self, channel: &ChannelName, event: &str, payload: &JsonValue) -> usize {
        self.multicast_filtered(channel, None, event, payload)
    }

    /// Same as `multicast`, skipping one connection (the sender's echo).
    pub fn multicast_except(
        &self,
        channel: &ChannelName,
        excluded_conn_id: &str,
        event: &str,
        payload: &JsonValue,
    ) -> usize {
        self.multicast_filtered(channel, Some(excluded_conn_id), event, payload)
    }

    fn multicast_filtered(
        &self,
        channel: &ChannelName,
        excluded_conn_id: Option<&str>,
        event: &str,
        payload: &JsonValue,
    ) -> usize {
        let name = channel.render();
        let members: Vec<String> = match self.channels.get(&name) {
            Some(set) => set
                .iter()
                .filter(|id| excluded_conn_id != Some(id.as_str()))
                .cloned()
                .collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for conn_id in members {
            // A member may unregister between the snapshot and here.
            let sink = match self.connections.get(&conn_id) {
                Some(entry) => entry.sink.clone(),
                None => continue,
            };

            match sink.deliver(event, payload) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    warn!(%conn_id, event, error = %err, "failed to deliver to connection");
                }
            }
        }

        delivered
    }

    /// Removes a connection and its membership in every joined channel.
    pub fn unregister(&self, conn_id: &str) {
        let Some((_, entry)) = self.connections.remove(conn_id) else {
            return;
        };

        for name in &entry.joined {
            self.remove_member(name, conn_id);
        }
        debug!(conn_id, user_id = %entry.user_id, "connection unregistered");
    }

    /// Live connections held by a user, across all their sockets.
    pub fn connection_count_for_user(&self, user_id: &str) -> usize {
        self.connections
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .count()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    #[cfg(test)]
    pub(crate) fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn remove_member(&self, channel: &str, conn_id: &str) {
        let emptied = if let Some(mut members) = self.channels.get_mut(channel) {
            members.remove(conn_id);
            members.is_empty()
        } else {
            false
        };

        if emptied {
            self.channels.remove(channel);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub(crate) events: Mutex<Vec<(String, JsonValue)>>,
    }

    impl ConnectionSink for RecordingSink {
        fn deliver(&self, event: &str, payload: &JsonValue) -> anyhow::Result<()> {
            self.events
                .lock()
                .unwrap()
                .push((event.to_string(), payload.clone()));
            Ok(())
        }
    }

    impl RecordingSink {
        pub(crate) fn received(&self) -> Vec<(String, JsonValue)> {
            self.events.lock().unwrap().clone()
        }
    }

    struct FailingSink;

    impl ConnectionSink for FailingSink {
        fn deliver(&self, _event: &str, _payload: &JsonValue) -> anyhow::Result<()> {
            anyhow::bail!("connection gone")
        }
    }

    fn registry_with(conns: &[(&str, &str)]) -> (RoomRegistry, Vec<Arc<RecordingSink>>) {
        let registry = RoomRegistry::new();
        let mut sinks = Vec::new();
        for (conn_id, user_id) in conns {
            let sink = Arc::new(RecordingSink::default());
            registry.register(conn_id, user_id, sink.clone());
            sinks.push(sink);
        }
        (registry, sinks)
    }

    #[test]
    fn register_joins_personal_channel() {
        let (registry, sinks) = registry_with(&[("c1", "alice")]);

        let delivered = registry.multicast(&ChannelName::user("alice"), "notification", &json!({}));
        assert_eq!(delivered, 1);
        assert_eq!(sinks[0].received().len(), 1);
    }

    #[test]
    fn multiple_connections_per_user_each_receive() {
        let (registry, sinks) = registry_with(&[("c1", "alice"), ("c2", "alice")]);

        let payload = json!({ "title": "Nouveau document partagé" });
        let delivered = registry.multicast(&ChannelName::user("alice"), "notification", &payload);

        assert_eq!(delivered, 2);
        for sink in &sinks {
            let events = sink.received();
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].0, "notification");
            assert_eq!(events[0].1, payload);
        }
    }

    #[test]
    fn multicast_to_empty_channel_is_silent_noop() {
        let registry = RoomRegistry::new();
        let delivered = registry.multicast(&ChannelName::user("ghost"), "notification", &json!({}));
        assert_eq!(delivered, 0);
    }

    #[test]
    fn join_is_idempotent() {
        let (registry, sinks) = registry_with(&[("c1", "alice")]);
        let room = ChannelName::classroom("math");

        registry.join("c1", &room);
        registry.join("c1", &room);

        let delivered = registry.multicast(&room, "message:new", &json!({ "content": "hi" }));
        assert_eq!(delivered, 1);
        assert_eq!(sinks[0].received().len(), 1);
    }

    #[test]
    fn leave_non_joined_channel_is_noop() {
        let (registry, _sinks) = registry_with(&[("c1", "alice")]);
        let room = ChannelName::classroom("math");

        registry.leave("c1", &room);
        assert!(!registry.is_member("c1", &room));

        registry.join("c1", &room);
        registry.leave("c1", &room);
        registry.leave("c1", &room);
        assert!(!registry.is_member("c1", &room));
    }

    #[test]
    fn leave_of_own_personal_channel_is_refused() {
        let (registry, sinks) = registry_with(&[("c1", "alice")]);
        let personal = ChannelName::parse("user:alice").expect("parse channel");

        registry.leave("c1", &personal);

        assert!(registry.is_member("c1", &personal));
        assert_eq!(
            registry.multicast(&personal, "notification", &json!({ "title": "t" })),
            1
        );
        assert_eq!(sinks[0].received().len(), 1);
    }

    #[test]
    fn join_with_unknown_connection_is_dropped() {
        let registry = RoomRegistry::new();
        registry.join("phantom", &ChannelName::classroom("math"));

        assert_eq!(registry.channel_count(), 0);
        assert_eq!(
            registry.multicast(&ChannelName::classroom("math"), "message:new", &json!({})),
            0
        );
    }

    #[test]
    fn failed_sink_is_skipped_and_others_still_receive() {
        let registry = RoomRegistry::new();
        let good = Arc::new(RecordingSink::default());
        registry.register("c1", "alice", good.clone());
        registry.register("c2", "bob", Arc::new(FailingSink));
        let room = ChannelName::classroom("math");
        registry.join("c1", &room);
        registry.join("c2", &room);

        let delivered = registry.multicast(&room, "message:new", &json!({ "content": "hi" }));

        assert_eq!(delivered, 1);
        assert_eq!(good.received().len(), 1);
    }

    #[test]
    fn multicast_except_skips_the_sender() {
        let (registry, sinks) = registry_with(&[("c1", "alice"), ("c2", "bob"), ("c3", "carol")]);
        let room = ChannelName::classroom("math");
        for conn in ["c1", "c2", "c3"] {
            registry.join(conn, &room);
        }

        let payload = json!({ "userId": "alice", "isTyping": true });
        let delivered = registry.multicast_except(&room, "c1", "typing:user", &payload);

        assert_eq!(delivered, 2);
        assert!(sinks[0].received().is_empty());
        assert_eq!(sinks[1].received().len(), 1);
        assert_eq!(sinks[2].received().len(), 1);
    }

    #[test]
    fn unregister_removes_membership_everywhere() {
        let (registry, sinks) = registry_with(&[("c1", "alice"), ("c2", "bob")]);
        let math = ChannelName::classroom("math");
        let doc = ChannelName::document("doc-1");
        registry.join("c1", &math);
        registry.join("c1", &doc);
        registry.join("c2", &math);

        registry.unregister("c1");

        assert_eq!(registry.connection_count(), 1);
        assert_eq!(registry.multicast(&math, "message:new", &json!({})), 1);
        assert_eq!(registry.multicast(&doc, "document:comment", &json!({})), 0);
        assert_eq!(
            registry.multicast(&ChannelName::user("alice"), "notification", &json!({})),
            0
        );
        assert!(sinks[0].received().is_empty());
    }

    #[test]
    fn unregister_drops_emptied_channels() {
        let (registry, _sinks) = registry_with(&[("c1", "alice")]);
        registry.join("c1", &ChannelName::classroom("math"));

        // user:alice + classroom:math
        assert_eq!(registry.channel_count(), 2);
        registry.unregister("c1");
        assert_eq!(registry.channel_count(), 0);
    }

    #[test]
    fn unregister_unknown_connection_is_noop() {
        let (registry, _sinks) = registry_with(&[("c1", "alice")]);
        registry.unregister("phantom");
        assert_eq!(registry.connection_count(), 1);
    }

    #[test]
    fn chat_reaches_only_remaining_members_after_disconnect() {
        let (registry, sinks) =
            registry_with(&[("c1", "alice"), ("c2", "bob"), ("c3", "carol")]);
        let room = ChannelName::classroom("history");
        for conn in ["c1", "c2", "c3"] {
            registry.join(conn, &room);
        }

        registry.unregister("c2");

        let delivered = registry.multicast(&room, "message:new", &json!({ "content": "salut" }));
        assert_eq!(delivered, 2);
        assert_eq!(sinks[0].received().len(), 1);
        assert!(sinks[1].received().is_empty());
        assert_eq!(sinks[2].received().len(), 1);
    }

    #[test]
    fn connection_count_for_user_tracks_all_sockets() {
        let (registry, _sinks) = registry_with(&[("c1", "alice"), ("c2", "alice"), ("c3", "bob")]);

        assert_eq!(registry.connection_count_for_user("alice"), 2);
        registry.unregister("c1");
        assert_eq!(registry.connection_count_for_user("alice"), 1);
        assert_eq!(registry.connection_count_for_user("bob"), 1);
    }
}
