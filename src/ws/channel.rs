//! Named broadcast groups
//!
//! Every connected session registers its outbound queue once. Channels
//! ("lobby", "room<id>") hold member ids and fan encoded frames out to
//! them with `try_send`: a slow or gone receiver loses the frame and the
//! failure is logged, the sender never waits.

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::protocol::RoomId;

/// Connection identifier
pub type SessionId = Uuid;

/// Outbound frame queue of one connection
pub type SessionSender = mpsc::Sender<Bytes>;

pub const LOBBY_CHANNEL: &str = "lobby";

pub fn room_channel_name(room_id: RoomId) -> String {
    format!("room{room_id}")
}

/// One broadcast group
pub struct Channel {
    name: String,
    members: RwLock<HashSet<SessionId>>,
}

impl Channel {
    fn new(name: String) -> Self {
        Self {
            name,
            members: RwLock::new(HashSet::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contains(&self, session: &SessionId) -> bool {
        self.members.read().contains(session)
    }

    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.read().is_empty()
    }

    fn members(&self) -> Vec<SessionId> {
        self.members.read().iter().copied().collect()
    }
}

/// Session queues plus the channels they belong to
#[derive(Default)]
pub struct ChannelManager {
    sessions: DashMap<SessionId, SessionSender>,
    channels: DashMap<String, Arc<Channel>>,
}

impl ChannelManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a connection reachable by id
    pub fn register_session(&self, session: SessionId, tx: SessionSender) {
        self.sessions.insert(session, tx);
    }

    /// Forget a connection and drop it from every channel
    pub fn unregister_session(&self, session: &SessionId) {
        self.sessions.remove(session);
        for channel in self.channels.iter() {
            channel.value().members.write().remove(session);
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Get a channel, creating it on first use
    pub fn channel(&self, name: &str) -> Arc<Channel> {
        self.channels
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Channel::new(name.to_string())))
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Channel>> {
        self.channels.get(name).map(|c| c.value().clone())
    }

    /// Add a session to a channel. Returns false if it was already a member
    /// or the session is not registered.
    pub fn join(&self, name: &str, session: SessionId) -> bool {
        if !self.sessions.contains_key(&session) {
            debug!(channel = name, session_id = %session, "Join for unknown session ignored");
            return false;
        }
        self.channel(name).members.write().insert(session)
    }

    pub fn leave(&self, name: &str, session: &SessionId) -> bool {
        self.get(name)
            .map(|channel| channel.members.write().remove(session))
            .unwrap_or(false)
    }

    /// Remove a channel and all its memberships
    pub fn remove_channel(&self, name: &str) {
        if let Some((_, channel)) = self.channels.remove(name) {
            channel.members.write().clear();
        }
    }

    /// Send a frame to one session.
    ///
    /// A session whose queue is full has missed a state change and can no
    /// longer follow the match, so it is unregistered. Dropping its sender
    /// closes the queue, which ends the connection.
    pub fn send_to(&self, session: &SessionId, frame: Bytes) -> bool {
        let Some(tx) = self.sessions.get(session).map(|tx| tx.value().clone()) else {
            debug!(session_id = %session, "Send to unknown session dropped");
            return false;
        };
        match tx.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(session_id = %session, "Outbound queue full, evicting session");
                drop(tx);
                self.unregister_session(session);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(session_id = %session, "Outbound queue closed, frame dropped");
                false
            }
        }
    }

    /// Send a frame to every member of a channel, optionally skipping one.
    /// Returns how many members accepted it.
    pub fn broadcast(&self, name: &str, frame: Bytes, skip: Option<SessionId>) -> usize {
        let Some(channel) = self.get(name) else {
            return 0;
        };
        channel
            .members()
            .into_iter()
            .filter(|member| Some(*member) != skip)
            .filter(|member| self.send_to(member, frame.clone()))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(manager: &ChannelManager, capacity: usize) -> (SessionId, mpsc::Receiver<Bytes>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(capacity);
        manager.register_session(id, tx);
        (id, rx)
    }

    #[test]
    fn broadcast_reaches_members_only() {
        let manager = ChannelManager::new();
        let (a, mut rx_a) = session(&manager, 8);
        let (b, mut rx_b) = session(&manager, 8);
        let (_c, mut rx_c) = session(&manager, 8);

        assert!(manager.join(LOBBY_CHANNEL, a));
        assert!(manager.join(LOBBY_CHANNEL, b));
        assert!(!manager.join(LOBBY_CHANNEL, b));

        let sent = manager.broadcast(LOBBY_CHANNEL, Bytes::from_static(b"hi"), None);
        assert_eq!(sent, 2);
        assert_eq!(rx_a.try_recv().ok(), Some(Bytes::from_static(b"hi")));
        assert_eq!(rx_b.try_recv().ok(), Some(Bytes::from_static(b"hi")));
        assert!(rx_c.try_recv().is_err());
    }

    #[test]
    fn broadcast_can_skip_one_member() {
        let manager = ChannelManager::new();
        let (a, mut rx_a) = session(&manager, 8);
        let (b, mut rx_b) = session(&manager, 8);
        manager.join("room0", a);
        manager.join("room0", b);

        assert_eq!(manager.broadcast("room0", Bytes::from_static(b"x"), Some(a)), 1);
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn full_queue_evicts_the_session() {
        let manager = ChannelManager::new();
        let (a, mut rx_a) = session(&manager, 1);
        let (b, mut rx_b) = session(&manager, 8);
        manager.join(LOBBY_CHANNEL, a);
        manager.join(LOBBY_CHANNEL, b);

        assert_eq!(manager.broadcast(LOBBY_CHANNEL, Bytes::from_static(b"1"), None), 2);
        assert_eq!(manager.broadcast(LOBBY_CHANNEL, Bytes::from_static(b"2"), None), 1);
        assert_eq!(manager.session_count(), 1);
        assert!(!manager.channel(LOBBY_CHANNEL).contains(&a));

        // later frames never reach the evicted session
        assert_eq!(manager.broadcast(LOBBY_CHANNEL, Bytes::from_static(b"3"), None), 1);
        assert_eq!(rx_a.try_recv().ok(), Some(Bytes::from_static(b"1")));
        assert_eq!(
            rx_a.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        );
        let mut delivered = 0;
        while rx_b.try_recv().is_ok() {
            delivered += 1;
        }
        assert_eq!(delivered, 3);
    }

    #[test]
    fn unregister_leaves_every_channel() {
        let manager = ChannelManager::new();
        let (a, _rx) = session(&manager, 8);
        manager.join(LOBBY_CHANNEL, a);
        manager.join(&room_channel_name(3), a);

        manager.unregister_session(&a);
        assert!(manager.channel(LOBBY_CHANNEL).is_empty());
        assert!(manager.channel("room3").is_empty());
        assert!(!manager.send_to(&a, Bytes::new()));
        // unknown sessions cannot join
        assert!(!manager.join(LOBBY_CHANNEL, a));
    }

    #[test]
    fn removed_channel_forgets_members() {
        let manager = ChannelManager::new();
        let (a, _rx) = session(&manager, 8);
        manager.join("room1", a);
        manager.remove_channel("room1");
        assert!(manager.get("room1").is_none());
        assert_eq!(manager.broadcast("room1", Bytes::new(), None), 0);
    }
}
