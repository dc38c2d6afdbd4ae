//! Completion tracking: per-day idempotent set completion with live fan-out.
//!
//! State machine per `(user, exercise)`: NoSession -> Active -> Complete,
//! terminal for the calendar day. The rollover needs no timer: every read
//! is day-scoped, so yesterday's records simply stop matching and the
//! apparent state reverts to NoSession on its own.

mod record;

pub use record::{
    CompletionRecord, CompletionRequest, SessionAggregate, SessionState, COMPLETIONS_COLLECTION,
};

use crate::error::SyncError;
use crate::hub::{CompletionKey, CompletionUpdate, ObserverHub};
use crate::remote::{bounded, RemoteSource, StoredDocument};
use chrono::{Local, NaiveDate, Utc};
use dashmap::DashMap;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Records set completions against the remote store and keeps the live
/// session projection that observers watch.
pub struct CompletionTracker {
    remote: Arc<dyn RemoteSource>,
    hub: Arc<ObserverHub>,
    sessions: DashMap<CompletionKey, SessionAggregate>,
}

impl CompletionTracker {
    pub fn new(remote: Arc<dyn RemoteSource>, hub: Arc<ObserverHub>) -> Self {
        Self {
            remote,
            hub,
            sessions: DashMap::new(),
        }
    }

    /// Record one completed set.
    ///
    /// Repeat calls for the same set on the same day collapse onto the
    /// existing record and still succeed: a double tap or a retried
    /// network call must never duplicate a record or report failure. The
    /// session aggregate is upserted and republished on every successful
    /// call, so a retry after a failure between record write and aggregate
    /// update converges instead of sticking half-done.
    pub async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionUpdate, SyncError> {
        request.validate()?;
        let today = Local::now().date_naive();

        // Two racing calls can both pass this read before either insert
        // lands; without a unique index on the backend the loser writes a
        // duplicate. Readers collapse duplicates by set number.
        let existing = self.fetch_records(&request.user_id).await?;
        let already_done = existing.iter().any(|(_, r)| {
            r.exercise_id == request.exercise_id
                && r.set_number == request.set_number
                && r.completed_on() == today
        });

        if already_done {
            debug!(
                user = %request.user_id,
                exercise = %request.exercise_id,
                set = request.set_number,
                "set already completed today, reusing existing record"
            );
        } else {
            let record = request.clone().into_record(Utc::now());
            let document = record.to_document()?;
            let id = bounded(
                "insert completion",
                self.remote.insert(COMPLETIONS_COLLECTION, document),
            )
            .await?;
            debug!(
                user = %record.user_id,
                exercise = %record.exercise_id,
                set = record.set_number,
                id = %id,
                "completion recorded"
            );
        }

        let update = self.upsert_session(&request, today);
        self.hub.publish(
            &CompletionKey::new(&request.user_id, &request.exercise_id),
            &update,
        );
        Ok(update)
    }

    /// Delete today's record(s) for one set and take it out of the active
    /// session. Historical days are left untouched; an emptied session
    /// reverts to NoSession.
    pub async fn remove_completion(
        &self,
        user_id: &str,
        exercise_id: &str,
        set_number: u32,
    ) -> Result<CompletionUpdate, SyncError> {
        let today = Local::now().date_naive();
        let records = self.fetch_records(user_id).await?;
        let doomed: Vec<String> = records
            .into_iter()
            .filter(|(_, r)| {
                r.exercise_id == exercise_id
                    && r.set_number == set_number
                    && r.completed_on() == today
            })
            .map(|(id, _)| id)
            .collect();

        for id in &doomed {
            bounded(
                "delete completion",
                self.remote.delete(COMPLETIONS_COLLECTION, id),
            )
            .await?;
        }
        debug!(
            user = user_id,
            exercise = exercise_id,
            set = set_number,
            deleted = doomed.len(),
            "completion removed"
        );

        let key = CompletionKey::new(user_id, exercise_id);
        let update = if let Some(mut session) = self.sessions.get_mut(&key) {
            session.completed_sets.remove(&set_number);
            if session.completed_sets.is_empty() {
                let update = Self::update_from(session.value());
                drop(session);
                self.sessions.remove(&key);
                update
            } else {
                session.is_active = true;
                session.ended_at = None;
                Self::update_from(session.value())
            }
        } else {
            // No live aggregate (fresh process); publish the emptied state.
            CompletionUpdate {
                user_id: user_id.to_string(),
                exercise_id: exercise_id.to_string(),
                session_id: None,
                completed_sets: BTreeSet::new(),
                total_sets: 0,
                is_complete: false,
            }
        };

        self.hub.publish(&key, &update);
        Ok(update)
    }

    /// Set numbers completed today for `(user, exercise)`: the day-scoped
    /// truth screens use to seed observer state after (re)start.
    pub async fn completed_today(
        &self,
        user_id: &str,
        exercise_id: &str,
    ) -> Result<BTreeSet<u32>, SyncError> {
        let today = Local::now().date_naive();
        let records = self.fetch_records(user_id).await?;
        Ok(records
            .into_iter()
            .filter(|(_, r)| r.exercise_id == exercise_id && r.completed_on() == today)
            .map(|(_, r)| r.set_number)
            .collect())
    }

    /// Live aggregate, if any, regardless of day.
    pub fn session(&self, user_id: &str, exercise_id: &str) -> Option<SessionAggregate> {
        self.sessions
            .get(&CompletionKey::new(user_id, exercise_id))
            .map(|s| s.value().clone())
    }

    /// Apparent state for today.
    pub fn session_state(&self, user_id: &str, exercise_id: &str) -> SessionState {
        let today = Local::now().date_naive();
        match self.session(user_id, exercise_id) {
            Some(session) if session.started_on() == today => {
                if session.is_complete() {
                    SessionState::Complete(session)
                } else {
                    SessionState::Active(session)
                }
            }
            _ => SessionState::NoSession,
        }
    }

    /// All completion records for `user_id`, with their remote ids.
    ///
    /// The remote only filters on a single field; exercise, set, and day
    /// narrowing always happen here, so the per-day guarantee holds even
    /// against a simplified backend query. Malformed documents are skipped
    /// with a warning rather than failing the whole read.
    async fn fetch_records(
        &self,
        user_id: &str,
    ) -> Result<Vec<(String, CompletionRecord)>, SyncError> {
        let documents = bounded(
            "query completions",
            self.remote.query_equal(
                COMPLETIONS_COLLECTION,
                "user_id",
                &Value::String(user_id.to_string()),
            ),
        )
        .await?;

        let mut records = Vec::with_capacity(documents.len());
        for StoredDocument { id, fields } in documents {
            match serde_json::from_value::<CompletionRecord>(Value::Object(fields)) {
                Ok(record) => records.push((id, record)),
                Err(e) => warn!(id = %id, error = %e, "skipping malformed completion record"),
            }
        }
        Ok(records)
    }

    /// Create or extend the live session for this request's key. Holding
    /// the DashMap entry makes the read-modify-write atomic per key.
    fn upsert_session(&self, request: &CompletionRequest, today: NaiveDate) -> CompletionUpdate {
        let key = CompletionKey::new(&request.user_id, &request.exercise_id);
        let now = Utc::now();
        let mut session = self
            .sessions
            .entry(key)
            .or_insert_with(|| SessionAggregate::start(request, now));

        if session.started_on() != today {
            // Leftover from a previous day; the day-scoped reads already
            // treat it as gone, so start over.
            *session = SessionAggregate::start(request, now);
        }

        session.completed_sets.insert(request.set_number);
        session.total_sets = request.total_sets;
        if session.is_complete() {
            session.is_active = false;
            if session.ended_at.is_none() {
                session.ended_at = Some(now);
            }
        } else {
            session.is_active = true;
            session.ended_at = None;
        }
        Self::update_from(session.value())
    }

    fn update_from(session: &SessionAggregate) -> CompletionUpdate {
        CompletionUpdate {
            user_id: session.user_id.clone(),
            exercise_id: session.exercise_id.clone(),
            session_id: Some(session.session_id.clone()),
            completed_sets: session.completed_sets.clone(),
            total_sets: session.total_sets,
            is_complete: session.is_complete(),
        }
    }
}
