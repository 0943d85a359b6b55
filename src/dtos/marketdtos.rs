// dtos/marketdtos.rs
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::projectmodel::{FieldType, NewProjectField};

fn default_required() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProjectFieldDto {
    #[validate(length(min = 1, max = 200, message = "Field label is required"))]
    pub label: String,
    pub field_type: FieldType,
    #[serde(default = "default_required")]
    pub required: bool,
}

impl From<ProjectFieldDto> for NewProjectField {
    fn from(dto: ProjectFieldDto) -> Self {
        NewProjectField {
            label: dto.label,
            field_type: dto.field_type,
            required: dto.required,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateProjectDto {
    #[validate(length(min = 1, max = 200, message = "Project name is required"))]
    pub name: String,
    pub description: Option<String>,
    pub value: BigDecimal,
    #[validate(length(min = 1, message = "At least one field is required"))]
    pub fields: Vec<ProjectFieldDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FieldValueDto {
    pub field_id: Uuid,
    #[validate(length(min = 1, max = 2000, message = "Value is required"))]
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmitWorkDto {
    #[validate(length(min = 1, message = "At least one value is required"))]
    pub values: Vec<FieldValueDto>,
}

impl SubmitWorkDto {
    pub fn into_pairs(self) -> Vec<(Uuid, String)> {
        self.values
            .into_iter()
            .map(|v| (v.field_id, v.value))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRequestDto {
    pub amount: BigDecimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ReviewNoteDto {
    #[validate(length(max = 1000, message = "Note must not be more than 1000 characters"))]
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub status: &'static str,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        ApiResponse {
            status: "success",
            data,
        }
    }
}
