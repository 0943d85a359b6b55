// db/pgledger.rs
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use sqlx::{Postgres, Row, Transaction};
use uuid::Uuid;

use super::ledger::{LedgerUnit, StoreError};
use crate::models::{
    projectmodel::{NewProject, Project, ProjectField},
    reviewmodel::ReviewStatus,
    submissionmodel::{NewSubmission, Submission, SubmissionValue},
    transactionmodel::{LedgerTransaction, NewLedgerEntry},
    usermodel::{NewUser, RegistrationStatus, User},
    withdrawalmodel::Withdrawal,
};

macro_rules! user_columns {
    () => {
        "id, name, email, password, role, balance, upline_id, referral_code, \
         registration_status, created_at, updated_at"
    };
}

macro_rules! submission_columns {
    () => {
        "id, user_id, project_id, status, admin_note, processed_by, created_at, processed_at"
    };
}

macro_rules! withdrawal_columns {
    () => {
        "id, user_id, amount, status, admin_note, processed_by, created_at, processed_at"
    };
}

macro_rules! transaction_columns {
    () => {
        "id, user_id, kind, amount, balance_after, submission_id, withdrawal_id, created_at"
    };
}

/// A PostgreSQL transaction. Rolled back by sqlx when dropped uncommitted.
pub struct PgLedgerUnit {
    tx: Transaction<'static, Postgres>,
}

impl PgLedgerUnit {
    pub fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self { tx }
    }

    async fn load_fields(&mut self, project_id: Uuid) -> Result<Vec<ProjectField>, StoreError> {
        let fields = sqlx::query_as::<_, ProjectField>(
            r#"
            SELECT id, project_id, label, field_type, required, position
            FROM project_fields
            WHERE project_id = $1
            ORDER BY position
            "#,
        )
        .bind(project_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(fields)
    }

    async fn load_values(&mut self, submission_id: Uuid) -> Result<Vec<SubmissionValue>, StoreError> {
        let values = sqlx::query_as::<_, SubmissionValue>(
            "SELECT id, submission_id, field_id, value FROM submission_values WHERE submission_id = $1",
        )
        .bind(submission_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(values)
    }
}

#[async_trait]
impl LedgerUnit for PgLedgerUnit {
    async fn get_user(&mut self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM users WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(user)
    }

    async fn get_user_by_email(&mut self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM users WHERE LOWER(email) = LOWER($1)"
        ))
        .bind(email)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(user)
    }

    async fn get_user_by_referral_code(
        &mut self,
        referral_code: &str,
    ) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM users WHERE referral_code = $1"
        ))
        .bind(referral_code)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(user)
    }

    async fn lock_user(&mut self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM users WHERE id = $1 FOR UPDATE"
        ))
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(user)
    }

    async fn downlines_of(&mut self, user_id: Uuid) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as::<_, User>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM users WHERE upline_id = $1 ORDER BY created_at, id"
        ))
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(users)
    }

    async fn insert_user(&mut self, user: NewUser) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(concat!(
            r#"
            INSERT INTO users (name, email, password, role, upline_id, referral_code, registration_status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING "#,
            user_columns!()
        ))
        .bind(user.name)
        .bind(user.email)
        .bind(user.password_hash)
        .bind(user.role)
        .bind(user.upline_id)
        .bind(user.referral_code)
        .bind(user.registration_status)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(user)
    }

    async fn set_registration_status(
        &mut self,
        user_id: Uuid,
        status: RegistrationStatus,
    ) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(concat!(
            r#"
            UPDATE users
            SET registration_status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING "#,
            user_columns!()
        ))
        .bind(user_id)
        .bind(status)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or(StoreError::NotFound { entity: "user", id: user_id })
    }

    async fn lock_users(&mut self, user_ids: &[Uuid]) -> Result<(), StoreError> {
        if user_ids.is_empty() {
            return Ok(());
        }

        let locked = sqlx::query("SELECT id FROM users WHERE id = ANY($1) ORDER BY id FOR UPDATE")
            .bind(user_ids.to_vec())
            .fetch_all(&mut *self.tx)
            .await?;

        if locked.len() < user_ids.len() {
            let found: Vec<Uuid> = locked.iter().map(|row| row.get::<Uuid, _>("id")).collect();
            if let Some(missing) = user_ids.iter().find(|id| !found.contains(*id)) {
                return Err(StoreError::NotFound { entity: "user", id: *missing });
            }
        }

        Ok(())
    }

    async fn adjust_balance(
        &mut self,
        user_id: Uuid,
        delta: &BigDecimal,
    ) -> Result<BigDecimal, StoreError> {
        // Check and mutation in one statement: the row never goes negative.
        let updated = sqlx::query(
            r#"
            UPDATE users
            SET balance = balance + $2, updated_at = NOW()
            WHERE id = $1 AND balance + $2 >= 0
            RETURNING balance
            "#,
        )
        .bind(user_id)
        .bind(delta.clone())
        .fetch_optional(&mut *self.tx)
        .await?;

        if let Some(row) = updated {
            return Ok(row.get::<BigDecimal, _>("balance"));
        }

        let current = sqlx::query("SELECT balance FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        match current {
            Some(row) => Err(StoreError::InsufficientFunds {
                user_id,
                available: row.get::<BigDecimal, _>("balance"),
                requested: -delta.clone(),
            }),
            None => Err(StoreError::NotFound { entity: "user", id: user_id }),
        }
    }

    async fn get_project(&mut self, project_id: Uuid) -> Result<Option<Project>, StoreError> {
        let project = sqlx::query_as::<_, Project>(
            "SELECT id, name, description, value, created_by, created_at FROM projects WHERE id = $1",
        )
        .bind(project_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        match project {
            Some(mut project) => {
                project.fields = self.load_fields(project.id).await?;
                Ok(Some(project))
            }
            None => Ok(None),
        }
    }

    async fn list_projects(&mut self) -> Result<Vec<Project>, StoreError> {
        let mut projects = sqlx::query_as::<_, Project>(
            "SELECT id, name, description, value, created_by, created_at FROM projects ORDER BY created_at DESC",
        )
        .fetch_all(&mut *self.tx)
        .await?;

        for project in projects.iter_mut() {
            project.fields = self.load_fields(project.id).await?;
        }

        Ok(projects)
    }

    async fn insert_project(&mut self, project: NewProject) -> Result<Project, StoreError> {
        let mut created = sqlx::query_as::<_, Project>(
            r#"
            INSERT INTO projects (name, description, value, created_by)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, description, value, created_by, created_at
            "#,
        )
        .bind(project.name)
        .bind(project.description)
        .bind(project.value)
        .bind(project.created_by)
        .fetch_one(&mut *self.tx)
        .await?;

        for (position, field) in project.fields.into_iter().enumerate() {
            let field = sqlx::query_as::<_, ProjectField>(
                r#"
                INSERT INTO project_fields (project_id, label, field_type, required, position)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, project_id, label, field_type, required, position
                "#,
            )
            .bind(created.id)
            .bind(field.label)
            .bind(field.field_type)
            .bind(field.required)
            .bind(position as i32)
            .fetch_one(&mut *self.tx)
            .await?;
            created.fields.push(field);
        }

        Ok(created)
    }

    async fn lock_submission(
        &mut self,
        submission_id: Uuid,
    ) -> Result<Option<Submission>, StoreError> {
        let submission = sqlx::query_as::<_, Submission>(concat!(
            "SELECT ",
            submission_columns!(),
            " FROM submissions WHERE id = $1 FOR UPDATE"
        ))
        .bind(submission_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        match submission {
            Some(mut submission) => {
                submission.values = self.load_values(submission.id).await?;
                Ok(Some(submission))
            }
            None => Ok(None),
        }
    }

    async fn insert_submission(
        &mut self,
        submission: NewSubmission,
    ) -> Result<Submission, StoreError> {
        let mut created = sqlx::query_as::<_, Submission>(concat!(
            r#"
            INSERT INTO submissions (user_id, project_id, status)
            VALUES ($1, $2, 'pending'::review_status)
            RETURNING "#,
            submission_columns!()
        ))
        .bind(submission.user_id)
        .bind(submission.project_id)
        .fetch_one(&mut *self.tx)
        .await?;

        for (field_id, value) in submission.values {
            let value = sqlx::query_as::<_, SubmissionValue>(
                r#"
                INSERT INTO submission_values (submission_id, field_id, value)
                VALUES ($1, $2, $3)
                RETURNING id, submission_id, field_id, value
                "#,
            )
            .bind(created.id)
            .bind(field_id)
            .bind(value)
            .fetch_one(&mut *self.tx)
            .await?;
            created.values.push(value);
        }

        Ok(created)
    }

    async fn finalize_submission(
        &mut self,
        submission_id: Uuid,
        status: ReviewStatus,
        processed_by: Uuid,
        admin_note: Option<String>,
    ) -> Result<Submission, StoreError> {
        let submission = sqlx::query_as::<_, Submission>(concat!(
            r#"
            UPDATE submissions
            SET status = $2,
                processed_by = $3,
                admin_note = COALESCE($4, admin_note),
                processed_at = NOW()
            WHERE id = $1
            RETURNING "#,
            submission_columns!()
        ))
        .bind(submission_id)
        .bind(status)
        .bind(processed_by)
        .bind(admin_note)
        .fetch_optional(&mut *self.tx)
        .await?;

        match submission {
            Some(mut submission) => {
                submission.values = self.load_values(submission.id).await?;
                Ok(submission)
            }
            None => Err(StoreError::NotFound { entity: "submission", id: submission_id }),
        }
    }

    async fn lock_withdrawal(
        &mut self,
        withdrawal_id: Uuid,
    ) -> Result<Option<Withdrawal>, StoreError> {
        let withdrawal = sqlx::query_as::<_, Withdrawal>(concat!(
            "SELECT ",
            withdrawal_columns!(),
            " FROM withdrawals WHERE id = $1 FOR UPDATE"
        ))
        .bind(withdrawal_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(withdrawal)
    }

    async fn insert_withdrawal(
        &mut self,
        user_id: Uuid,
        amount: &BigDecimal,
    ) -> Result<Withdrawal, StoreError> {
        let withdrawal = sqlx::query_as::<_, Withdrawal>(concat!(
            r#"
            INSERT INTO withdrawals (user_id, amount, status)
            VALUES ($1, $2, 'pending'::review_status)
            RETURNING "#,
            withdrawal_columns!()
        ))
        .bind(user_id)
        .bind(amount.clone())
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(withdrawal)
    }

    async fn finalize_withdrawal(
        &mut self,
        withdrawal_id: Uuid,
        status: ReviewStatus,
        processed_by: Uuid,
        admin_note: Option<String>,
    ) -> Result<Withdrawal, StoreError> {
        sqlx::query_as::<_, Withdrawal>(concat!(
            r#"
            UPDATE withdrawals
            SET status = $2,
                processed_by = $3,
                admin_note = COALESCE($4, admin_note),
                processed_at = NOW()
            WHERE id = $1
            RETURNING "#,
            withdrawal_columns!()
        ))
        .bind(withdrawal_id)
        .bind(status)
        .bind(processed_by)
        .bind(admin_note)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or(StoreError::NotFound { entity: "withdrawal", id: withdrawal_id })
    }

    async fn append_transaction(
        &mut self,
        entry: NewLedgerEntry,
    ) -> Result<LedgerTransaction, StoreError> {
        let transaction = sqlx::query_as::<_, LedgerTransaction>(concat!(
            r#"
            INSERT INTO ledger_transactions
            (user_id, kind, amount, balance_after, submission_id, withdrawal_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING "#,
            transaction_columns!()
        ))
        .bind(entry.user_id)
        .bind(entry.kind)
        .bind(entry.amount)
        .bind(entry.balance_after)
        .bind(entry.source.submission_id())
        .bind(entry.source.withdrawal_id())
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(transaction)
    }

    async fn transactions_for_user(
        &mut self,
        user_id: Uuid,
    ) -> Result<Vec<LedgerTransaction>, StoreError> {
        let transactions = sqlx::query_as::<_, LedgerTransaction>(concat!(
            "SELECT ",
            transaction_columns!(),
            " FROM ledger_transactions WHERE user_id = $1 ORDER BY created_at DESC, id"
        ))
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(transactions)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
