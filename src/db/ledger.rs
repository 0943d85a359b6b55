// db/ledger.rs
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    projectmodel::{NewProject, Project},
    reviewmodel::ReviewStatus,
    submissionmodel::{NewSubmission, Submission},
    transactionmodel::{LedgerTransaction, NewLedgerEntry},
    usermodel::{NewUser, RegistrationStatus, User},
    withdrawalmodel::Withdrawal,
};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Insufficient funds for user {user_id}: balance {available}, requested {requested}")]
    InsufficientFunds {
        user_id: Uuid,
        available: BigDecimal,
        requested: BigDecimal,
    },

    #[error("Duplicate value violates {0}")]
    Duplicate(String),

    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Store timed out: {0}")]
    Timeout(String),

    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let classified = match &err {
            sqlx::Error::PoolTimedOut => {
                Some(StoreError::Timeout("connection pool exhausted".to_string()))
            }
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.into_owned());
                match code.as_deref() {
                    // serialization_failure, deadlock_detected, lock_not_available
                    Some("40001") | Some("40P01") | Some("55P03") => {
                        Some(StoreError::Conflict(db_err.message().to_string()))
                    }
                    // query_canceled, raised by statement_timeout
                    Some("57014") => Some(StoreError::Timeout(db_err.message().to_string())),
                    Some("23505") => Some(StoreError::Duplicate(
                        db_err.constraint().unwrap_or("unique constraint").to_string(),
                    )),
                    _ => None,
                }
            }
            _ => None,
        };

        classified.unwrap_or(StoreError::Database(err))
    }
}

/// One all-or-nothing unit of work against the ledger store.
///
/// Nothing written through a unit is visible to other units until
/// [`LedgerUnit::commit`] succeeds. Dropping a unit without committing
/// discards every write made through it.
#[async_trait]
pub trait LedgerUnit: Send {
    // Users
    async fn get_user(&mut self, user_id: Uuid) -> Result<Option<User>, StoreError>;

    async fn get_user_by_email(&mut self, email: &str) -> Result<Option<User>, StoreError>;

    async fn get_user_by_referral_code(
        &mut self,
        referral_code: &str,
    ) -> Result<Option<User>, StoreError>;

    /// Reads a user and holds its row lock until the unit ends.
    async fn lock_user(&mut self, user_id: Uuid) -> Result<Option<User>, StoreError>;

    /// Users whose upline is `user_id`, oldest registration first.
    async fn downlines_of(&mut self, user_id: Uuid) -> Result<Vec<User>, StoreError>;

    async fn insert_user(&mut self, user: NewUser) -> Result<User, StoreError>;

    async fn set_registration_status(
        &mut self,
        user_id: Uuid,
        status: RegistrationStatus,
    ) -> Result<User, StoreError>;

    /// Locks the given user rows for the rest of the unit, in ascending id
    /// order regardless of the order given.
    async fn lock_users(&mut self, user_ids: &[Uuid]) -> Result<(), StoreError>;

    /// Adds `delta` to the user's balance and returns the new balance.
    /// Refuses with `InsufficientFunds` when the result would be negative.
    async fn adjust_balance(
        &mut self,
        user_id: Uuid,
        delta: &BigDecimal,
    ) -> Result<BigDecimal, StoreError>;

    // Projects
    async fn get_project(&mut self, project_id: Uuid) -> Result<Option<Project>, StoreError>;

    async fn list_projects(&mut self) -> Result<Vec<Project>, StoreError>;

    async fn insert_project(&mut self, project: NewProject) -> Result<Project, StoreError>;

    // Submissions
    async fn lock_submission(
        &mut self,
        submission_id: Uuid,
    ) -> Result<Option<Submission>, StoreError>;

    async fn insert_submission(
        &mut self,
        submission: NewSubmission,
    ) -> Result<Submission, StoreError>;

    async fn finalize_submission(
        &mut self,
        submission_id: Uuid,
        status: ReviewStatus,
        processed_by: Uuid,
        admin_note: Option<String>,
    ) -> Result<Submission, StoreError>;

    // Withdrawals
    async fn lock_withdrawal(
        &mut self,
        withdrawal_id: Uuid,
    ) -> Result<Option<Withdrawal>, StoreError>;

    async fn insert_withdrawal(
        &mut self,
        user_id: Uuid,
        amount: &BigDecimal,
    ) -> Result<Withdrawal, StoreError>;

    async fn finalize_withdrawal(
        &mut self,
        withdrawal_id: Uuid,
        status: ReviewStatus,
        processed_by: Uuid,
        admin_note: Option<String>,
    ) -> Result<Withdrawal, StoreError>;

    // Ledger
    async fn append_transaction(
        &mut self,
        entry: NewLedgerEntry,
    ) -> Result<LedgerTransaction, StoreError>;

    /// Ledger entries of one user, newest first.
    async fn transactions_for_user(
        &mut self,
        user_id: Uuid,
    ) -> Result<Vec<LedgerTransaction>, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Handle to a ledger backend. Constructed once by the process entry point
/// and shared by every service.
#[async_trait]
pub trait LedgerStore: Send + Sync + std::fmt::Debug {
    async fn begin(&self) -> Result<Box<dyn LedgerUnit>, StoreError>;

    fn backend_name(&self) -> &'static str;
}
