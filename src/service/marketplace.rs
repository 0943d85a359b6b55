// service/marketplace.rs
//! Project catalogue, work intake, withdrawal requests and the account view.
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use bigdecimal::BigDecimal;
use num_traits::Zero;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    db::ledger::{LedgerStore, LedgerUnit},
    models::{
        projectmodel::{FieldType, NewProject, NewProjectField, Project},
        submissionmodel::{NewSubmission, Submission},
        transactionmodel::LedgerTransaction,
        usermodel::{RegistrationStatus, User},
        withdrawalmodel::Withdrawal,
    },
    service::{commission::is_whole_minor_units, error::ServiceError, unit_of_work::bounded},
};

/// Public view of a user in someone else's referral tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferralContact {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

impl From<&User> for ReferralContact {
    fn from(user: &User) -> Self {
        ReferralContact {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountOverview {
    pub user: User,
    pub upline: Option<ReferralContact>,
    pub downlines: Vec<ReferralContact>,
    pub transactions: Vec<LedgerTransaction>,
}

#[derive(Debug, Clone)]
pub struct MarketplaceService {
    store: Arc<dyn LedgerStore>,
    timeout: Duration,
}

impl MarketplaceService {
    pub fn new(store: Arc<dyn LedgerStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub async fn create_project(
        &self,
        admin_id: Uuid,
        name: String,
        description: Option<String>,
        value: BigDecimal,
        fields: Vec<NewProjectField>,
    ) -> Result<Project, ServiceError> {
        validate_project(&name, &value, &fields)?;

        bounded(self.timeout, "create_project", async {
            let mut unit = self.store.begin().await?;
            let project = unit
                .insert_project(NewProject {
                    name: name.trim().to_string(),
                    description,
                    value,
                    created_by: admin_id,
                    fields,
                })
                .await?;
            unit.commit().await?;

            tracing::info!(project_id = %project.id, %admin_id, value = %project.value, "Project created");
            Ok(project)
        })
        .await
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>, ServiceError> {
        let mut unit = self.store.begin().await?;
        let projects = unit.list_projects().await?;
        Ok(projects)
    }

    /// Stores a PENDING submission once every value checks out against the
    /// project's fields.
    pub async fn submit_work(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        values: Vec<(Uuid, String)>,
    ) -> Result<Submission, ServiceError> {
        bounded(self.timeout, "submit_work", async {
            let mut unit = self.store.begin().await?;
            approved_user(unit.as_mut(), user_id).await?;

            let project = unit
                .get_project(project_id)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("project {}", project_id)))?;
            let values = validate_submission_values(&project, values)?;

            let submission = unit
                .insert_submission(NewSubmission {
                    user_id,
                    project_id,
                    values,
                })
                .await?;
            unit.commit().await?;

            tracing::info!(submission_id = %submission.id, %user_id, %project_id, "Work submitted");
            Ok(submission)
        })
        .await
    }

    /// Files a PENDING withdrawal. The balance check here is advisory;
    /// approval checks again against the balance at that moment.
    pub async fn request_withdrawal(&self, user_id: Uuid, amount: BigDecimal) -> Result<Withdrawal, ServiceError> {
        if amount <= BigDecimal::zero() {
            return Err(ServiceError::Validation("Amount must be greater than zero".to_string()));
        }
        if !is_whole_minor_units(&amount) {
            return Err(ServiceError::Validation(
                "Amount must not have more than two decimal places".to_string(),
            ));
        }

        bounded(self.timeout, "request_withdrawal", async {
            let mut unit = self.store.begin().await?;
            let user = approved_user(unit.as_mut(), user_id).await?;

            if user.balance < amount {
                return Err(ServiceError::InsufficientFunds {
                    user_id,
                    required: amount.clone(),
                    available: user.balance,
                });
            }

            let withdrawal = unit.insert_withdrawal(user_id, &amount).await?;
            unit.commit().await?;

            tracing::info!(withdrawal_id = %withdrawal.id, %user_id, amount = %withdrawal.amount, "Withdrawal requested");
            Ok(withdrawal)
        })
        .await
    }

    pub async fn account_overview(&self, user_id: Uuid) -> Result<AccountOverview, ServiceError> {
        let mut unit = self.store.begin().await?;

        let user = unit
            .get_user(user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("user {}", user_id)))?;
        let upline = match user.upline_id {
            Some(upline_id) => unit.get_user(upline_id).await?.as_ref().map(ReferralContact::from),
            None => None,
        };
        let downlines = unit
            .downlines_of(user_id)
            .await?
            .iter()
            .map(ReferralContact::from)
            .collect();
        let transactions = unit.transactions_for_user(user_id).await?;

        Ok(AccountOverview {
            user,
            upline,
            downlines,
            transactions,
        })
    }
}

async fn approved_user(unit: &mut dyn LedgerUnit, user_id: Uuid) -> Result<User, ServiceError> {
    let user = unit
        .get_user(user_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("user {}", user_id)))?;

    if user.registration_status != RegistrationStatus::Approved {
        return Err(ServiceError::Forbidden(
            "Registration has not been approved".to_string(),
        ));
    }

    Ok(user)
}

fn validate_project(name: &str, value: &BigDecimal, fields: &[NewProjectField]) -> Result<(), ServiceError> {
    if name.trim().is_empty() {
        return Err(ServiceError::Validation("Project name is required".to_string()));
    }
    if *value <= BigDecimal::zero() {
        return Err(ServiceError::Validation("Project value must be greater than zero".to_string()));
    }
    if !is_whole_minor_units(value) {
        return Err(ServiceError::Validation(
            "Project value must not have more than two decimal places".to_string(),
        ));
    }
    if fields.is_empty() {
        return Err(ServiceError::Validation("A project needs at least one field".to_string()));
    }

    let mut labels = HashSet::new();
    for field in fields {
        let label = field.label.trim().to_lowercase();
        if label.is_empty() {
            return Err(ServiceError::Validation("Field label is required".to_string()));
        }
        if !labels.insert(label) {
            return Err(ServiceError::Validation(format!(
                "Duplicate field label '{}'",
                field.label
            )));
        }
    }

    Ok(())
}

/// Checks `(field_id, value)` pairs against the project's fields and returns
/// them trimmed, in field order.
pub fn validate_submission_values(
    project: &Project,
    values: Vec<(Uuid, String)>,
) -> Result<Vec<(Uuid, String)>, ServiceError> {
    let mut seen = HashSet::new();
    let mut accepted = Vec::with_capacity(values.len());

    for (field_id, raw) in values {
        let field = project
            .field(field_id)
            .ok_or_else(|| ServiceError::Validation(format!("Unknown field {}", field_id)))?;

        if !seen.insert(field_id) {
            return Err(ServiceError::Validation(format!(
                "Field '{}' was given more than once",
                field.label
            )));
        }

        let value = raw.trim().to_string();
        if value.is_empty() {
            return Err(ServiceError::Validation(format!("Field '{}' is empty", field.label)));
        }

        match field.field_type {
            FieldType::Number if BigDecimal::from_str(&value).is_err() => {
                return Err(ServiceError::Validation(format!(
                    "Field '{}' must be a number",
                    field.label
                )));
            }
            FieldType::Url if !(value.starts_with("http://") || value.starts_with("https://")) => {
                return Err(ServiceError::Validation(format!(
                    "Field '{}' must be an http(s) URL",
                    field.label
                )));
            }
            _ => {}
        }

        accepted.push((field.position, field_id, value));
    }

    if let Some(missing) = project
        .fields
        .iter()
        .find(|f| f.required && !seen.contains(&f.id))
    {
        return Err(ServiceError::Validation(format!(
            "Required field '{}' is missing",
            missing.label
        )));
    }

    accepted.sort_by_key(|(position, _, _)| *position);
    Ok(accepted
        .into_iter()
        .map(|(_, field_id, value)| (field_id, value))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryLedger;
    use crate::models::reviewmodel::ReviewStatus;
    use crate::service::testkit::{credit, dec, seed_project, seed_user};

    fn service(store: &MemoryLedger) -> MarketplaceService {
        MarketplaceService::new(Arc::new(store.clone()), Duration::from_secs(5))
    }

    fn field(label: &str, field_type: FieldType, required: bool) -> NewProjectField {
        NewProjectField {
            label: label.to_string(),
            field_type,
            required,
        }
    }

    #[tokio::test]
    async fn create_project_keeps_field_order() {
        let store = MemoryLedger::new();
        let project = service(&store)
            .create_project(
                Uuid::new_v4(),
                "Survey".to_string(),
                Some("Fill in the survey".to_string()),
                dec("1500"),
                vec![
                    field("Screenshot", FieldType::File, true),
                    field("Answers", FieldType::Number, true),
                ],
            )
            .await
            .unwrap();

        assert_eq!(project.fields.len(), 2);
        assert_eq!(project.fields[0].label, "Screenshot");
        assert_eq!(project.fields[1].position, 1);
    }

    #[tokio::test]
    async fn create_project_rejects_bad_input() {
        let store = MemoryLedger::new();
        let service = service(&store);

        let err = service
            .create_project(Uuid::new_v4(), "Zero".to_string(), None, dec("0"), vec![field("A", FieldType::Text, true)])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let err = service
            .create_project(Uuid::new_v4(), "Empty".to_string(), None, dec("10"), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let err = service
            .create_project(
                Uuid::new_v4(),
                "Dupes".to_string(),
                None,
                dec("10"),
                vec![field("Link", FieldType::Url, true), field("link", FieldType::Text, false)],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn submit_work_validates_against_schema() {
        let store = MemoryLedger::new();
        let worker = seed_user(&store, "worker", None).await;
        let project = seed_project(&store, "100").await;
        let proof = project.fields[0].id;
        let count = project.fields[1].id;
        let service = service(&store);

        let cases = vec![
            vec![(Uuid::new_v4(), "x".to_string())],
            vec![(proof, "https://a".to_string()), (proof, "https://b".to_string())],
            vec![(proof, "   ".to_string())],
            vec![(count, "12".to_string())],
            vec![(proof, "https://a".to_string()), (count, "twelve".to_string())],
            vec![(proof, "ftp://a".to_string())],
        ];
        for values in cases {
            let err = service.submit_work(worker.id, project.id, values).await.unwrap_err();
            assert!(matches!(err, ServiceError::Validation(_)), "got {:?}", err);
        }

        let submission = service
            .submit_work(
                worker.id,
                project.id,
                vec![(count, " 12 ".to_string()), (proof, "https://example.com/p".to_string())],
            )
            .await
            .unwrap();
        assert_eq!(submission.status, ReviewStatus::Pending);
        assert_eq!(submission.values.len(), 2);
        assert_eq!(submission.values[0].field_id, proof);
        assert_eq!(submission.values[1].value, "12");
    }

    #[tokio::test]
    async fn submit_work_for_unknown_project_is_not_found() {
        let store = MemoryLedger::new();
        let worker = seed_user(&store, "worker", None).await;

        let err = service(&store)
            .submit_work(worker.id, Uuid::new_v4(), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn withdrawal_request_checks_amount_and_balance() {
        let store = MemoryLedger::new();
        let user = seed_user(&store, "saver", None).await;
        credit(&store, user.id, "5000").await;
        let service = service(&store);

        for bad in ["0", "-5", "10.001"] {
            let err = service.request_withdrawal(user.id, dec(bad)).await.unwrap_err();
            assert!(matches!(err, ServiceError::Validation(_)));
        }

        let err = service.request_withdrawal(user.id, dec("5000.01")).await.unwrap_err();
        assert!(matches!(err, ServiceError::InsufficientFunds { .. }));

        let withdrawal = service.request_withdrawal(user.id, dec("3000")).await.unwrap();
        assert_eq!(withdrawal.status, ReviewStatus::Pending);
        // Requesting does not touch the balance.
        assert_eq!(store.user(user.id).await.unwrap().balance, dec("5000"));
    }

    #[tokio::test]
    async fn account_overview_lists_newest_first() {
        let store = MemoryLedger::new();
        let user = seed_user(&store, "saver", None).await;
        let service = service(&store);

        let mut unit = store.begin().await.unwrap();
        for amount in ["1", "2", "3"] {
            crate::service::balance::post_entry(
                unit.as_mut(),
                user.id,
                &dec(amount),
                crate::models::transactionmodel::TransactionKind::TaskPayout,
                crate::models::transactionmodel::LedgerSource::Submission(Uuid::new_v4()),
            )
            .await
            .unwrap();
        }
        unit.commit().await.unwrap();

        let overview = service.account_overview(user.id).await.unwrap();
        assert_eq!(overview.user.balance, dec("6"));
        let amounts: Vec<_> = overview.transactions.iter().map(|t| t.amount.clone()).collect();
        assert_eq!(amounts, vec![dec("3"), dec("2"), dec("1")]);
    }

    #[tokio::test]
    async fn account_overview_shows_referral_tree() {
        let store = MemoryLedger::new();
        let top = seed_user(&store, "top", None).await;
        let middle = seed_user(&store, "middle", Some(top.id)).await;
        let first = seed_user(&store, "first", Some(middle.id)).await;
        let second = seed_user(&store, "second", Some(middle.id)).await;
        seed_user(&store, "grandchild", Some(first.id)).await;
        let service = service(&store);

        let overview = service.account_overview(middle.id).await.unwrap();
        assert_eq!(overview.upline, Some(ReferralContact::from(&top)));
        let mut downline_ids: Vec<Uuid> = overview.downlines.iter().map(|d| d.id).collect();
        downline_ids.sort();
        let mut expected = vec![first.id, second.id];
        expected.sort();
        assert_eq!(downline_ids, expected);

        let overview = service.account_overview(top.id).await.unwrap();
        assert!(overview.upline.is_none());
        assert_eq!(overview.downlines.len(), 1);
        assert_eq!(overview.downlines[0].email, middle.email);
    }
}
