// ============================
// crates/backend-lib/src/storage.rs
// ============================
//! Storage collaborator surface with an in-memory implementation.
//!
//! User/event CRUD and durable persistence live outside this engine; the
//! trait below is the slice the coordination core consumes. Only the
//! last-known position is retained per participant, never a history.

use crate::error::AppError;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rendezvous_common::{EventContext, Participant, UserSummary};
use std::sync::Arc;
use uuid::Uuid;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Read-only event context.
    async fn get_event(&self, event_id: &str) -> Result<EventContext, AppError>;

    /// Event context plus the full roster. `user_id` must be a participant
    /// or the creator; viewing does not join (joining is an explicit call).
    async fn get_event_with_participants(
        &self,
        event_id: &str,
        user_id: &str,
    ) -> Result<(EventContext, Vec<Participant>), AppError>;

    /// Idempotent join: at most one row per (event, user); returns the
    /// existing row when already joined.
    async fn join_event(&self, event_id: &str, user_id: &str) -> Result<Participant, AppError>;

    /// Remove the membership row. Missing rows are not an error.
    async fn leave_event(&self, event_id: &str, user_id: &str) -> Result<(), AppError>;

    /// Persist a new position sample and the state derived from it. The
    /// estimated arrival is advanced only when `eta_minutes > 0`; an
    /// unknown ETA keeps the prior estimate.
    #[allow(clippy::too_many_arguments)]
    async fn update_participant_location(
        &self,
        event_id: &str,
        user_id: &str,
        lat: f64,
        lng: f64,
        is_moving: bool,
        eta_minutes: f64,
        distance_km: Option<f64>,
    ) -> Result<Participant, AppError>;

    async fn get_user(&self, user_id: &str) -> Result<UserSummary, AppError>;
}

#[derive(Default)]
struct MemoryInner {
    users: DashMap<String, UserSummary>,
    events: DashMap<String, EventContext>,
    participants: DashMap<(String, String), Participant>,
}

/// In-memory storage over concurrent maps. The production deployment plugs
/// a database-backed implementation in through the same trait.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<MemoryInner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_user(&self, user: UserSummary) {
        self.inner.users.insert(user.id.clone(), user);
    }

    pub fn put_event(&self, event: EventContext) {
        self.inner.events.insert(event.id.clone(), event);
    }

    pub fn remove_event(&self, event_id: &str) {
        self.inner.events.remove(event_id);
        self.inner
            .participants
            .retain(|(eid, _), _| eid != event_id);
    }
}

fn key(event_id: &str, user_id: &str) -> (String, String) {
    (event_id.to_string(), user_id.to_string())
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get_event(&self, event_id: &str) -> Result<EventContext, AppError> {
        self.inner
            .events
            .get(event_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| AppError::EventNotFound(event_id.to_string()))
    }

    async fn get_event_with_participants(
        &self,
        event_id: &str,
        user_id: &str,
    ) -> Result<(EventContext, Vec<Participant>), AppError> {
        let event = self.get_event(event_id).await?;
        let roster: Vec<Participant> = self
            .inner
            .participants
            .iter()
            .filter(|entry| entry.key().0 == event_id)
            .map(|entry| entry.value().clone())
            .collect();

        let is_member = roster.iter().any(|p| p.user_id == user_id);
        if !is_member && event.creator_id != user_id {
            return Err(AppError::ParticipantNotFound(event_id.to_string()));
        }
        Ok((event, roster))
    }

    async fn join_event(&self, event_id: &str, user_id: &str) -> Result<Participant, AppError> {
        // Event must exist; joining never creates one.
        let _ = self.get_event(event_id).await?;
        if !self.inner.users.contains_key(user_id) {
            return Err(AppError::UserNotFound(user_id.to_string()));
        }

        let entry = self
            .inner
            .participants
            .entry(key(event_id, user_id))
            .or_insert_with(|| Participant {
                id: Uuid::new_v4().to_string(),
                event_id: event_id.to_string(),
                user_id: user_id.to_string(),
                last_lat: None,
                last_lng: None,
                last_location_at: None,
                is_moving: false,
                distance_to_event_km: None,
                estimated_arrival: None,
            });
        Ok(entry.value().clone())
    }

    async fn leave_event(&self, event_id: &str, user_id: &str) -> Result<(), AppError> {
        self.inner.participants.remove(&key(event_id, user_id));
        Ok(())
    }

    async fn update_participant_location(
        &self,
        event_id: &str,
        user_id: &str,
        lat: f64,
        lng: f64,
        is_moving: bool,
        eta_minutes: f64,
        distance_km: Option<f64>,
    ) -> Result<Participant, AppError> {
        let mut entry = self
            .inner
            .participants
            .get_mut(&key(event_id, user_id))
            .ok_or_else(|| AppError::ParticipantNotFound(event_id.to_string()))?;

        let now = Utc::now();
        let participant = entry.value_mut();
        participant.last_lat = Some(lat);
        participant.last_lng = Some(lng);
        participant.last_location_at = Some(now);
        participant.is_moving = is_moving;
        participant.distance_to_event_km = distance_km;
        if eta_minutes > 0.0 {
            participant.estimated_arrival =
                Some(now + chrono::Duration::seconds((eta_minutes * 60.0).round() as i64));
        }
        Ok(participant.clone())
    }

    async fn get_user(&self, user_id: &str) -> Result<UserSummary, AppError> {
        self.inner
            .users
            .get(user_id)
            .map(|u| u.value().clone())
            .ok_or_else(|| AppError::UserNotFound(user_id.to_string()))
    }
}
