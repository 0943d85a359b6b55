// db/memory.rs
//! In-process ledger store with the same unit-of-work semantics as the
//! PostgreSQL backend. Units run one at a time; each one works on a staged
//! copy of the state that replaces the committed state only on commit.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::ledger::{LedgerStore, LedgerUnit, StoreError};
use crate::models::{
    projectmodel::{NewProject, Project, ProjectField},
    reviewmodel::ReviewStatus,
    submissionmodel::{NewSubmission, Submission, SubmissionValue},
    transactionmodel::{LedgerTransaction, NewLedgerEntry},
    usermodel::{NewUser, RegistrationStatus, User},
    withdrawalmodel::Withdrawal,
};

const NO_FAULT: usize = usize::MAX;

#[derive(Debug, Clone, Default)]
struct LedgerState {
    users: HashMap<Uuid, User>,
    projects: HashMap<Uuid, Project>,
    submissions: HashMap<Uuid, Submission>,
    withdrawals: HashMap<Uuid, Withdrawal>,
    transactions: Vec<LedgerTransaction>,
}

#[derive(Debug)]
struct FaultPlan {
    fail_after_writes: AtomicUsize,
    commit_delay_ms: AtomicU64,
}

#[derive(Debug, Clone)]
pub struct MemoryLedger {
    state: Arc<Mutex<LedgerState>>,
    faults: Arc<FaultPlan>,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(LedgerState::default())),
            faults: Arc::new(FaultPlan {
                fail_after_writes: AtomicUsize::new(NO_FAULT),
                commit_delay_ms: AtomicU64::new(0),
            }),
        }
    }

    /// Units begun after this call fail their write number `writes + 1`.
    pub fn fail_writes_after(&self, writes: usize) {
        self.faults.fail_after_writes.store(writes, Ordering::SeqCst);
    }

    /// Units begun after this call sleep for `delay` before committing.
    pub fn delay_commits(&self, delay: Duration) {
        self.faults
            .commit_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn clear_faults(&self) {
        self.faults.fail_after_writes.store(NO_FAULT, Ordering::SeqCst);
        self.faults.commit_delay_ms.store(0, Ordering::SeqCst);
    }
}

#[cfg(test)]
impl MemoryLedger {
    pub async fn user(&self, user_id: Uuid) -> Option<User> {
        self.state.lock().await.users.get(&user_id).cloned()
    }

    pub async fn submission(&self, submission_id: Uuid) -> Option<Submission> {
        self.state.lock().await.submissions.get(&submission_id).cloned()
    }

    pub async fn withdrawal(&self, withdrawal_id: Uuid) -> Option<Withdrawal> {
        self.state.lock().await.withdrawals.get(&withdrawal_id).cloned()
    }

    pub async fn transactions(&self) -> Vec<LedgerTransaction> {
        self.state.lock().await.transactions.clone()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn begin(&self) -> Result<Box<dyn LedgerUnit>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        let fail_after = self.faults.fail_after_writes.load(Ordering::SeqCst);
        let commit_delay = self.faults.commit_delay_ms.load(Ordering::SeqCst);

        Ok(Box::new(MemoryUnit {
            guard,
            staged,
            writes: 0,
            fail_after,
            commit_delay: Duration::from_millis(commit_delay),
        }))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

struct MemoryUnit {
    guard: OwnedMutexGuard<LedgerState>,
    staged: LedgerState,
    writes: usize,
    fail_after: usize,
    commit_delay: Duration,
}

impl MemoryUnit {
    fn record_write(&mut self) -> Result<(), StoreError> {
        if self.writes >= self.fail_after {
            return Err(StoreError::Unavailable(format!(
                "injected fault after {} writes",
                self.writes
            )));
        }
        self.writes += 1;
        Ok(())
    }

    fn user_mut(&mut self, user_id: Uuid) -> Result<&mut User, StoreError> {
        self.staged
            .users
            .get_mut(&user_id)
            .ok_or(StoreError::NotFound { entity: "user", id: user_id })
    }
}

#[async_trait]
impl LedgerUnit for MemoryUnit {
    async fn get_user(&mut self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.staged.users.get(&user_id).cloned())
    }

    async fn get_user_by_email(&mut self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .staged
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn get_user_by_referral_code(
        &mut self,
        referral_code: &str,
    ) -> Result<Option<User>, StoreError> {
        Ok(self
            .staged
            .users
            .values()
            .find(|u| u.referral_code == referral_code)
            .cloned())
    }

    async fn lock_user(&mut self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.staged.users.get(&user_id).cloned())
    }

    async fn downlines_of(&mut self, user_id: Uuid) -> Result<Vec<User>, StoreError> {
        let mut downlines: Vec<User> = self
            .staged
            .users
            .values()
            .filter(|u| u.upline_id == Some(user_id))
            .cloned()
            .collect();
        downlines.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(downlines)
    }

    async fn insert_user(&mut self, user: NewUser) -> Result<User, StoreError> {
        self.record_write()?;

        if self.staged.users.values().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(StoreError::Duplicate("users_email_key".to_string()));
        }
        if self.staged.users.values().any(|u| u.referral_code == user.referral_code) {
            return Err(StoreError::Duplicate("users_referral_code_key".to_string()));
        }
        if let Some(upline_id) = user.upline_id {
            if !self.staged.users.contains_key(&upline_id) {
                return Err(StoreError::NotFound { entity: "user", id: upline_id });
            }
        }

        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            password: user.password_hash,
            role: user.role,
            balance: BigDecimal::from(0),
            upline_id: user.upline_id,
            referral_code: user.referral_code,
            registration_status: user.registration_status,
            created_at: now,
            updated_at: now,
        };
        self.staged.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn set_registration_status(
        &mut self,
        user_id: Uuid,
        status: RegistrationStatus,
    ) -> Result<User, StoreError> {
        self.record_write()?;
        let user = self.user_mut(user_id)?;
        user.registration_status = status;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn lock_users(&mut self, user_ids: &[Uuid]) -> Result<(), StoreError> {
        // The unit already holds the whole store; only existence is checked.
        match user_ids.iter().find(|id| !self.staged.users.contains_key(*id)) {
            Some(missing) => Err(StoreError::NotFound { entity: "user", id: *missing }),
            None => Ok(()),
        }
    }

    async fn adjust_balance(
        &mut self,
        user_id: Uuid,
        delta: &BigDecimal,
    ) -> Result<BigDecimal, StoreError> {
        self.record_write()?;
        let user = self.user_mut(user_id)?;

        let next = &user.balance + delta;
        if next < BigDecimal::from(0) {
            return Err(StoreError::InsufficientFunds {
                user_id,
                available: user.balance.clone(),
                requested: -delta.clone(),
            });
        }

        user.balance = next.clone();
        user.updated_at = Utc::now();
        Ok(next)
    }

    async fn get_project(&mut self, project_id: Uuid) -> Result<Option<Project>, StoreError> {
        Ok(self.staged.projects.get(&project_id).cloned())
    }

    async fn list_projects(&mut self) -> Result<Vec<Project>, StoreError> {
        let mut projects: Vec<Project> = self.staged.projects.values().cloned().collect();
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects)
    }

    async fn insert_project(&mut self, project: NewProject) -> Result<Project, StoreError> {
        self.record_write()?;

        let id = Uuid::new_v4();
        let fields = project
            .fields
            .into_iter()
            .enumerate()
            .map(|(position, field)| ProjectField {
                id: Uuid::new_v4(),
                project_id: id,
                label: field.label,
                field_type: field.field_type,
                required: field.required,
                position: position as i32,
            })
            .collect();

        let created = Project {
            id,
            name: project.name,
            description: project.description,
            value: project.value,
            created_by: Some(project.created_by),
            created_at: Utc::now(),
            fields,
        };
        self.staged.projects.insert(id, created.clone());
        Ok(created)
    }

    async fn lock_submission(
        &mut self,
        submission_id: Uuid,
    ) -> Result<Option<Submission>, StoreError> {
        Ok(self.staged.submissions.get(&submission_id).cloned())
    }

    async fn insert_submission(
        &mut self,
        submission: NewSubmission,
    ) -> Result<Submission, StoreError> {
        self.record_write()?;

        if !self.staged.users.contains_key(&submission.user_id) {
            return Err(StoreError::NotFound { entity: "user", id: submission.user_id });
        }
        if !self.staged.projects.contains_key(&submission.project_id) {
            return Err(StoreError::NotFound { entity: "project", id: submission.project_id });
        }

        let id = Uuid::new_v4();
        let values = submission
            .values
            .into_iter()
            .map(|(field_id, value)| SubmissionValue {
                id: Uuid::new_v4(),
                submission_id: id,
                field_id,
                value,
            })
            .collect();

        let created = Submission {
            id,
            user_id: submission.user_id,
            project_id: submission.project_id,
            status: ReviewStatus::Pending,
            admin_note: None,
            processed_by: None,
            created_at: Utc::now(),
            processed_at: None,
            values,
        };
        self.staged.submissions.insert(id, created.clone());
        Ok(created)
    }

    async fn finalize_submission(
        &mut self,
        submission_id: Uuid,
        status: ReviewStatus,
        processed_by: Uuid,
        admin_note: Option<String>,
    ) -> Result<Submission, StoreError> {
        self.record_write()?;

        let submission = self
            .staged
            .submissions
            .get_mut(&submission_id)
            .ok_or(StoreError::NotFound { entity: "submission", id: submission_id })?;
        submission.status = status;
        submission.processed_by = Some(processed_by);
        if admin_note.is_some() {
            submission.admin_note = admin_note;
        }
        submission.processed_at = Some(Utc::now());
        Ok(submission.clone())
    }

    async fn lock_withdrawal(
        &mut self,
        withdrawal_id: Uuid,
    ) -> Result<Option<Withdrawal>, StoreError> {
        Ok(self.staged.withdrawals.get(&withdrawal_id).cloned())
    }

    async fn insert_withdrawal(
        &mut self,
        user_id: Uuid,
        amount: &BigDecimal,
    ) -> Result<Withdrawal, StoreError> {
        self.record_write()?;

        if !self.staged.users.contains_key(&user_id) {
            return Err(StoreError::NotFound { entity: "user", id: user_id });
        }

        let created = Withdrawal {
            id: Uuid::new_v4(),
            user_id,
            amount: amount.clone(),
            status: ReviewStatus::Pending,
            admin_note: None,
            processed_by: None,
            created_at: Utc::now(),
            processed_at: None,
        };
        self.staged.withdrawals.insert(created.id, created.clone());
        Ok(created)
    }

    async fn finalize_withdrawal(
        &mut self,
        withdrawal_id: Uuid,
        status: ReviewStatus,
        processed_by: Uuid,
        admin_note: Option<String>,
    ) -> Result<Withdrawal, StoreError> {
        self.record_write()?;

        let withdrawal = self
            .staged
            .withdrawals
            .get_mut(&withdrawal_id)
            .ok_or(StoreError::NotFound { entity: "withdrawal", id: withdrawal_id })?;
        withdrawal.status = status;
        withdrawal.processed_by = Some(processed_by);
        if admin_note.is_some() {
            withdrawal.admin_note = admin_note;
        }
        withdrawal.processed_at = Some(Utc::now());
        Ok(withdrawal.clone())
    }

    async fn append_transaction(
        &mut self,
        entry: NewLedgerEntry,
    ) -> Result<LedgerTransaction, StoreError> {
        self.record_write()?;

        let transaction = LedgerTransaction {
            id: Uuid::new_v4(),
            user_id: entry.user_id,
            kind: entry.kind,
            amount: entry.amount,
            balance_after: entry.balance_after,
            submission_id: entry.source.submission_id(),
            withdrawal_id: entry.source.withdrawal_id(),
            created_at: Utc::now(),
        };
        self.staged.transactions.push(transaction.clone());
        Ok(transaction)
    }

    async fn transactions_for_user(
        &mut self,
        user_id: Uuid,
    ) -> Result<Vec<LedgerTransaction>, StoreError> {
        Ok(self
            .staged
            .transactions
            .iter()
            .rev()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryUnit {
            mut guard,
            staged,
            commit_delay,
            ..
        } = *self;

        if !commit_delay.is_zero() {
            tokio::time::sleep(commit_delay).await;
        }

        *guard = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::usermodel::UserRole;

    fn new_user(email: &str, code: &str) -> NewUser {
        NewUser {
            name: "Test".to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            role: UserRole::Worker,
            upline_id: None,
            referral_code: code.to_string(),
            registration_status: RegistrationStatus::Approved,
        }
    }

    #[tokio::test]
    async fn dropped_unit_leaves_no_trace() {
        let store = MemoryLedger::new();

        let mut unit = store.begin().await.unwrap();
        let user = unit.insert_user(new_user("a@example.com", "AAAA1111")).await.unwrap();
        drop(unit);

        assert!(store.user(user.id).await.is_none());
    }

    #[tokio::test]
    async fn committed_unit_is_visible_to_the_next() {
        let store = MemoryLedger::new();

        let mut unit = store.begin().await.unwrap();
        let user = unit.insert_user(new_user("a@example.com", "AAAA1111")).await.unwrap();
        unit.adjust_balance(user.id, &BigDecimal::from(250)).await.unwrap();
        unit.commit().await.unwrap();

        let mut unit = store.begin().await.unwrap();
        let reloaded = unit.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(reloaded.balance, BigDecimal::from(250));
    }

    #[tokio::test]
    async fn balance_never_goes_negative() {
        let store = MemoryLedger::new();

        let mut unit = store.begin().await.unwrap();
        let user = unit.insert_user(new_user("a@example.com", "AAAA1111")).await.unwrap();
        unit.adjust_balance(user.id, &BigDecimal::from(100)).await.unwrap();

        let err = unit
            .adjust_balance(user.id, &BigDecimal::from(-101))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InsufficientFunds { .. }));

        let balance = unit.adjust_balance(user.id, &BigDecimal::from(-100)).await.unwrap();
        assert_eq!(balance, BigDecimal::from(0));
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = MemoryLedger::new();

        let mut unit = store.begin().await.unwrap();
        unit.insert_user(new_user("a@example.com", "AAAA1111")).await.unwrap();
        let err = unit
            .insert_user(new_user("A@example.com", "BBBB2222"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn downlines_are_direct_referrals_only() {
        let store = MemoryLedger::new();

        let mut unit = store.begin().await.unwrap();
        let root = unit.insert_user(new_user("root@example.com", "ROOT0001")).await.unwrap();
        let mut child = new_user("child@example.com", "CHLD0001");
        child.upline_id = Some(root.id);
        let child = unit.insert_user(child).await.unwrap();
        let mut grandchild = new_user("grand@example.com", "GRND0001");
        grandchild.upline_id = Some(child.id);
        unit.insert_user(grandchild).await.unwrap();

        let downlines = unit.downlines_of(root.id).await.unwrap();
        assert_eq!(downlines.len(), 1);
        assert_eq!(downlines[0].id, child.id);
        assert!(unit.downlines_of(Uuid::new_v4()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn injected_fault_fires_on_the_configured_write() {
        let store = MemoryLedger::new();
        store.fail_writes_after(1);

        let mut unit = store.begin().await.unwrap();
        unit.insert_user(new_user("a@example.com", "AAAA1111")).await.unwrap();
        let err = unit
            .insert_user(new_user("b@example.com", "BBBB2222"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
