//! Completion events and the session projection built from them.

use crate::error::SyncError;
use crate::remote::Document;
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use uuid::Uuid;

/// Remote collection holding one document per completed set.
pub const COMPLETIONS_COLLECTION: &str = "workout_completions";

/// One completed set of one exercise. Immutable once written; removal is
/// the only mutation and it deletes the whole document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub user_id: String,
    pub exercise_id: String,
    pub exercise_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// 1-based set number within the exercise.
    pub set_number: u32,
    pub total_sets: u32,
    pub reps: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_kg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest_label: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl CompletionRecord {
    /// Calendar day of completion as the device sees it.
    pub fn completed_on(&self) -> NaiveDate {
        self.completed_at.with_timezone(&Local).date_naive()
    }

    /// Serialize for the remote store. Unset optional fields disappear
    /// entirely; the backend never sees a null placeholder.
    pub fn to_document(&self) -> Result<Document, SyncError> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(SyncError::decode(
                COMPLETIONS_COLLECTION,
                "record did not serialize to an object",
            )),
            Err(e) => Err(SyncError::decode(COMPLETIONS_COLLECTION, e.to_string())),
        }
    }
}

/// Builder-style input to `CompletionTracker::complete`.
///
/// Optional fields can only be set to real values, so the produced record
/// is well-formed by construction; there is no strip pass at the call
/// boundary.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub user_id: String,
    pub exercise_id: String,
    pub exercise_name: String,
    pub set_number: u32,
    pub total_sets: u32,
    pub reps: u32,
    pub weight_kg: Option<f64>,
    pub duration_secs: Option<u32>,
    pub rest_label: Option<String>,
    pub session_id: Option<String>,
}

impl CompletionRequest {
    pub fn new(
        user_id: impl Into<String>,
        exercise_id: impl Into<String>,
        exercise_name: impl Into<String>,
        set_number: u32,
        total_sets: u32,
        reps: u32,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            exercise_id: exercise_id.into(),
            exercise_name: exercise_name.into(),
            set_number,
            total_sets,
            reps,
            weight_kg: None,
            duration_secs: None,
            rest_label: None,
            session_id: None,
        }
    }

    pub fn with_weight_kg(mut self, weight_kg: f64) -> Self {
        self.weight_kg = Some(weight_kg);
        self
    }

    pub fn with_duration_secs(mut self, duration_secs: u32) -> Self {
        self.duration_secs = Some(duration_secs);
        self
    }

    pub fn with_rest_label(mut self, rest_label: impl Into<String>) -> Self {
        self.rest_label = Some(rest_label.into());
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Reject malformed input before any remote round trip.
    pub(crate) fn validate(&self) -> Result<(), SyncError> {
        if self.user_id.trim().is_empty() {
            return Err(SyncError::validation("user_id must not be empty"));
        }
        if self.exercise_id.trim().is_empty() {
            return Err(SyncError::validation("exercise_id must not be empty"));
        }
        if self.total_sets == 0 {
            return Err(SyncError::validation("total_sets must be at least 1"));
        }
        if self.set_number == 0 || self.set_number > self.total_sets {
            return Err(SyncError::validation(format!(
                "set_number {} outside 1..={}",
                self.set_number, self.total_sets
            )));
        }
        Ok(())
    }

    pub(crate) fn into_record(self, completed_at: DateTime<Utc>) -> CompletionRecord {
        CompletionRecord {
            user_id: self.user_id,
            exercise_id: self.exercise_id,
            exercise_name: self.exercise_name,
            session_id: self.session_id,
            set_number: self.set_number,
            total_sets: self.total_sets,
            reps: self.reps,
            weight_kg: self.weight_kg,
            duration_secs: self.duration_secs,
            rest_label: self.rest_label,
            completed_at,
        }
    }
}

/// Materialized view of today's completions for one exercise.
///
/// Recomputable from the records at any time; the tracker keeps one live
/// instance per `(user, exercise)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionAggregate {
    pub user_id: String,
    pub exercise_id: String,
    pub session_id: String,
    pub completed_sets: BTreeSet<u32>,
    pub total_sets: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl SessionAggregate {
    pub(crate) fn start(request: &CompletionRequest, now: DateTime<Utc>) -> Self {
        Self {
            user_id: request.user_id.clone(),
            exercise_id: request.exercise_id.clone(),
            session_id: request
                .session_id
                .clone()
                .unwrap_or_else(|| Uuid::now_v7().to_string()),
            completed_sets: BTreeSet::new(),
            total_sets: request.total_sets,
            started_at: now,
            ended_at: None,
            is_active: true,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed_sets.len() as u32 >= self.total_sets
    }

    /// Day the session was started, device-local.
    pub(crate) fn started_on(&self) -> NaiveDate {
        self.started_at.with_timezone(&Local).date_naive()
    }
}

/// Apparent state of one `(user, exercise)` pair for the current day.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// No set completed today.
    NoSession,
    /// At least one set completed, more remaining.
    Active(SessionAggregate),
    /// Every set completed; terminal until the day rolls over.
    Complete(SessionAggregate),
}
