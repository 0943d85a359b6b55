// models/projectmodel.rs
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "field_type", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldType {
    Text,
    Number,
    Url,
    /// Value is the location of an already-uploaded file.
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProjectField {
    pub id: Uuid,
    pub project_id: Uuid,
    pub label: String,
    pub field_type: FieldType,
    pub required: bool,
    pub position: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Payout for one approved submission.
    pub value: BigDecimal,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub fields: Vec<ProjectField>,
}

impl Project {
    pub fn field(&self, field_id: Uuid) -> Option<&ProjectField> {
        self.fields.iter().find(|f| f.id == field_id)
    }
}

#[derive(Debug, Clone)]
pub struct NewProjectField {
    pub label: String,
    pub field_type: FieldType,
    pub required: bool,
}

#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
    pub value: BigDecimal,
    pub created_by: Uuid,
    pub fields: Vec<NewProjectField>,
}
