// models/submissionmodel.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::reviewmodel::ReviewStatus;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SubmissionValue {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub field_id: Uuid,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Submission {
    pub id: Uuid,
    pub user_id: Uuid,
    pub project_id: Uuid,
    pub status: ReviewStatus,
    pub admin_note: Option<String>,
    pub processed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    #[sqlx(skip)]
    pub values: Vec<SubmissionValue>,
}

#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub user_id: Uuid,
    pub project_id: Uuid,
    /// `(field_id, value)` pairs, already checked against the project schema.
    pub values: Vec<(Uuid, String)>,
}
