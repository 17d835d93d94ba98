use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::connection::ConnectionHandle;
use crate::error::DeliveryError;
use crate::models::message::PresenceEntry;
use crate::models::{MessageType, OutboundMessage, Role};

/// One authenticated user bound to one live connection.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub role: Role,
    pub stand_id: Option<String>,
    pub handle: ConnectionHandle,
    pub connected_at: DateTime<Utc>,
}

impl Session {
    fn presence(&self) -> PresenceEntry {
        PresenceEntry {
            user_id: self.user_id.clone(),
            role: self.role,
            stand_id: self.stand_id.clone(),
        }
    }
}

/// Fan-out filter. Every supplied criterion must match; an absent one
/// matches everybody.
#[derive(Debug, Clone, Default)]
pub struct BroadcastFilter {
    pub target_roles: Option<HashSet<Role>>,
    pub target_user_ids: Option<HashSet<String>>,
    pub exclude_user_id: Option<String>,
}

impl BroadcastFilter {
    pub fn everyone() -> Self {
        Self::default()
    }

    pub fn roles<I: IntoIterator<Item = Role>>(mut self, roles: I) -> Self {
        self.target_roles = Some(roles.into_iter().collect());
        self
    }

    pub fn users<I, S>(mut self, user_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target_user_ids = Some(user_ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn excluding(mut self, user_id: impl Into<String>) -> Self {
        self.exclude_user_id = Some(user_id.into());
        self
    }

    pub fn matches(&self, session: &Session) -> bool {
        if self.exclude_user_id.as_deref() == Some(session.user_id.as_str()) {
            return false;
        }
        if let Some(roles) = &self.target_roles {
            if !roles.contains(&session.role) {
                return false;
            }
        }
        if let Some(user_ids) = &self.target_user_ids {
            if !user_ids.contains(&session.user_id) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LivenessReport {
    pub probed: usize,
    pub dropped: Vec<String>,
}

/// Consecutive unanswered heartbeats after which a connection is dropped.
pub const MAX_MISSED_PROBES: u8 = 2;

/// Presence hub: at most one live connection per user, plus predicate-based
/// fan-out.
///
/// Cloning shares the same registry. All operations are safe to call from any
/// task; fan-out snapshots the matching handles before pushing, so no shard
/// lock is held while enqueueing.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    sessions: Arc<DashMap<String, Session>>,
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("session_count", &self.sessions.len())
            .finish()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handle` to `user_id`. A previous connection for the same user is
    /// closed before the new one becomes visible. Returns the online list for
    /// the `auth_success` reply.
    pub fn authenticate(
        &self,
        handle: ConnectionHandle,
        user_id: &str,
        role: Role,
        stand_id: Option<String>,
    ) -> Vec<PresenceEntry> {
        let session = Session {
            user_id: user_id.to_string(),
            role,
            stand_id,
            handle,
            connected_at: Utc::now(),
        };

        match self.sessions.entry(user_id.to_string()) {
            Entry::Occupied(mut existing) => {
                if existing.get().handle.id() != session.handle.id() {
                    info!(
                        "User {} re-authenticated, closing connection {}",
                        user_id,
                        existing.get().handle.id()
                    );
                    existing.get().handle.close();
                }
                existing.insert(session);
            }
            Entry::Vacant(slot) => {
                slot.insert(session);
            }
        }

        info!("User {} connected as {}", user_id, role);
        self.broadcast_presence(Some(user_id));
        self.online_users()
    }

    /// Move a user to a new stand without re-authenticating. Only the
    /// connection that currently holds the binding may do this.
    pub fn update_presence(
        &self,
        user_id: &str,
        connection_id: Uuid,
        stand_id: Option<String>,
    ) -> bool {
        match self.sessions.get_mut(user_id) {
            Some(mut session) if session.handle.id() == connection_id => {
                session.stand_id = stand_id
            }
            _ => {
                debug!("Presence update for {} from a connection it does not hold", user_id);
                return false;
            }
        }
        self.broadcast_presence(None);
        true
    }

    /// Whether `connection_id` is the live binding for `user_id`.
    pub fn owns(&self, user_id: &str, connection_id: Uuid) -> bool {
        self.sessions
            .get(user_id)
            .is_some_and(|s| s.handle.id() == connection_id)
    }

    /// Drop whatever connection `user_id` holds (logout, admin kick).
    pub fn disconnect(&self, user_id: &str) -> bool {
        match self.sessions.remove(user_id) {
            Some((_, session)) => {
                session.handle.close();
                info!("User {} disconnected", user_id);
                self.broadcast_presence(None);
                true
            }
            None => false,
        }
    }

    /// Drop the binding only if it still belongs to `connection_id`. Called
    /// when a socket ends, so a superseded socket cannot evict its successor.
    pub fn release(&self, user_id: &str, connection_id: Uuid) -> bool {
        if self.remove_connection(user_id, connection_id).is_none() {
            return false;
        }
        info!("User {} disconnected", user_id);
        self.broadcast_presence(None);
        true
    }

    /// Best-effort push to one user.
    pub fn send(&self, user_id: &str, message: OutboundMessage) -> Result<(), DeliveryError> {
        let handle = self
            .sessions
            .get(user_id)
            .map(|s| s.handle.clone())
            .ok_or_else(|| DeliveryError::NotConnected(user_id.to_string()))?;
        handle.push(message)
    }

    /// Push to every session matching `filter`. A failing connection is
    /// counted and skipped; it never stops delivery to the rest.
    pub fn broadcast(&self, message: &OutboundMessage, filter: &BroadcastFilter) -> BroadcastReport {
        let targets: Vec<(String, ConnectionHandle)> = self
            .sessions
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| (entry.key().clone(), entry.handle.clone()))
            .collect();

        let mut report = BroadcastReport::default();
        for (user_id, handle) in targets {
            match handle.push(message.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    debug!("Push to {} failed: {}", user_id, e);
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// One liveness sweep: drop every connection that left the last
    /// `MAX_MISSED_PROBES` heartbeats unanswered, then ping the survivors.
    pub fn liveness_check(&self) -> LivenessReport {
        let snapshot: Vec<(String, ConnectionHandle)> = self
            .sessions
            .iter()
            .map(|entry| (entry.key().clone(), entry.handle.clone()))
            .collect();

        let mut report = LivenessReport::default();
        for (user_id, handle) in snapshot {
            let responsive = handle.missed_probes() < MAX_MISSED_PROBES;
            if responsive && handle.probe() != Err(DeliveryError::ChannelClosed) {
                report.probed += 1;
                continue;
            }

            if self.remove_connection(&user_id, handle.id()).is_some() {
                warn!("User {} missed liveness heartbeats, dropping connection", user_id);
                handle.close();
                report.dropped.push(user_id);
            }
        }

        if !report.dropped.is_empty() {
            self.broadcast_presence(None);
        }
        report
    }

    pub fn online_users(&self) -> Vec<PresenceEntry> {
        let mut users: Vec<PresenceEntry> = self.sessions.iter().map(|s| s.presence()).collect();
        users.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        users
    }

    pub fn users_with_roles(&self, roles: &[Role]) -> Vec<String> {
        self.sessions
            .iter()
            .filter(|s| roles.contains(&s.role))
            .map(|s| s.user_id.clone())
            .collect()
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.sessions.contains_key(user_id)
    }

    pub fn connection_count(&self) -> usize {
        self.sessions.len()
    }

    /// Close every connection and empty the registry.
    pub fn shutdown(&self) {
        for session in self.sessions.iter() {
            session.handle.close();
        }
        self.sessions.clear();
        info!("Connection registry shut down");
    }

    fn remove_connection(&self, user_id: &str, connection_id: Uuid) -> Option<Session> {
        self.sessions
            .remove_if(user_id, |_, s| s.handle.id() == connection_id)
            .map(|(_, session)| session)
    }

    fn broadcast_presence(&self, exclude_user_id: Option<&str>) {
        let message = OutboundMessage::new(
            MessageType::PresenceUpdate,
            json!({ "onlineUsers": self.online_users() }),
        );
        let mut filter = BroadcastFilter::everyone();
        filter.exclude_user_id = exclude_user_id.map(str::to_string);
        self.broadcast(&message, &filter);
    }
}
