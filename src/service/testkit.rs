// service/testkit.rs
//! Fixtures shared by the service tests.
use std::str::FromStr;

use bigdecimal::BigDecimal;
use uuid::Uuid;

use crate::{
    db::{ledger::LedgerStore, memory::MemoryLedger},
    models::{
        projectmodel::{FieldType, NewProject, NewProjectField, Project},
        submissionmodel::{NewSubmission, Submission},
        usermodel::{NewUser, RegistrationStatus, User, UserRole},
        withdrawalmodel::Withdrawal,
    },
    utils::referral_code::generate_referral_code,
};

pub fn dec(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

pub async fn seed_user(store: &MemoryLedger, name: &str, upline_id: Option<Uuid>) -> User {
    seed_user_with_code(store, name, upline_id, &generate_referral_code()).await
}

pub async fn seed_user_with_code(
    store: &MemoryLedger,
    name: &str,
    upline_id: Option<Uuid>,
    referral_code: &str,
) -> User {
    let mut unit = store.begin().await.unwrap();
    let user = unit
        .insert_user(NewUser {
            name: name.to_string(),
            email: format!("{}-{}@example.com", name, Uuid::new_v4().simple()),
            password_hash: "not-a-real-hash".to_string(),
            role: UserRole::Worker,
            upline_id,
            referral_code: referral_code.to_string(),
            registration_status: RegistrationStatus::Approved,
        })
        .await
        .unwrap();
    unit.commit().await.unwrap();
    user
}

pub async fn credit(store: &MemoryLedger, user_id: Uuid, amount: &str) {
    let mut unit = store.begin().await.unwrap();
    unit.adjust_balance(user_id, &dec(amount)).await.unwrap();
    unit.commit().await.unwrap();
}

pub async fn seed_project(store: &MemoryLedger, value: &str) -> Project {
    let mut unit = store.begin().await.unwrap();
    let project = unit
        .insert_project(NewProject {
            name: "Label product photos".to_string(),
            description: None,
            value: dec(value),
            created_by: Uuid::new_v4(),
            fields: vec![
                NewProjectField {
                    label: "Proof link".to_string(),
                    field_type: FieldType::Url,
                    required: true,
                },
                NewProjectField {
                    label: "Items labelled".to_string(),
                    field_type: FieldType::Number,
                    required: false,
                },
            ],
        })
        .await
        .unwrap();
    unit.commit().await.unwrap();
    project
}

pub async fn seed_submission(store: &MemoryLedger, user_id: Uuid, project: &Project) -> Submission {
    let mut unit = store.begin().await.unwrap();
    let submission = unit
        .insert_submission(NewSubmission {
            user_id,
            project_id: project.id,
            values: vec![(project.fields[0].id, "https://example.com/proof".to_string())],
        })
        .await
        .unwrap();
    unit.commit().await.unwrap();
    submission
}

pub async fn seed_withdrawal(store: &MemoryLedger, user_id: Uuid, amount: &str) -> Withdrawal {
    let mut unit = store.begin().await.unwrap();
    let withdrawal = unit.insert_withdrawal(user_id, &dec(amount)).await.unwrap();
    unit.commit().await.unwrap();
    withdrawal
}
