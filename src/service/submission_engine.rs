// service/submission_engine.rs
use std::sync::Arc;
use std::time::Duration;

use bigdecimal::BigDecimal;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    db::ledger::{LedgerStore, LedgerUnit},
    models::{
        reviewmodel::ReviewStatus,
        submissionmodel::Submission,
        transactionmodel::{LedgerSource, LedgerTransaction},
    },
    service::{
        balance::post_entry,
        commission::{compute_payouts, plan_payouts, CommissionQuote, CommissionSchedule},
        error::ServiceError,
        referral_graph::{resolve_upline_chain, MAX_UPLINE_DEPTH},
        unit_of_work::bounded,
    },
};

#[derive(Debug, Clone, Serialize)]
pub struct ApprovalReceipt {
    pub submission: Submission,
    pub transactions: Vec<LedgerTransaction>,
}

/// Approves or rejects work submissions. An approval pays the worker, the
/// two nearest uplines and the configured operator accounts in one unit of
/// work, so either every credit lands together with the status change or
/// none of them do.
#[derive(Debug, Clone)]
pub struct SubmissionApprovalEngine {
    store: Arc<dyn LedgerStore>,
    schedule: Arc<CommissionSchedule>,
    timeout: Duration,
}

impl SubmissionApprovalEngine {
    pub fn new(store: Arc<dyn LedgerStore>, schedule: Arc<CommissionSchedule>, timeout: Duration) -> Self {
        Self {
            store,
            schedule,
            timeout,
        }
    }

    pub async fn approve_submission(
        &self,
        submission_id: Uuid,
        approver_id: Uuid,
    ) -> Result<ApprovalReceipt, ServiceError> {
        bounded(
            self.timeout,
            "approve_submission",
            self.run_approval(submission_id, approver_id),
        )
        .await
    }

    pub async fn reject_submission(
        &self,
        submission_id: Uuid,
        approver_id: Uuid,
        note: Option<String>,
    ) -> Result<Submission, ServiceError> {
        bounded(self.timeout, "reject_submission", async {
            let mut unit = self.store.begin().await?;
            lock_pending(unit.as_mut(), submission_id).await?;

            let submission = unit
                .finalize_submission(submission_id, ReviewStatus::Rejected, approver_id, note)
                .await?;
            unit.commit().await?;

            tracing::info!(%submission_id, %approver_id, "Submission rejected");
            Ok(submission)
        })
        .await
    }

    async fn run_approval(
        &self,
        submission_id: Uuid,
        approver_id: Uuid,
    ) -> Result<ApprovalReceipt, ServiceError> {
        let mut unit = self.store.begin().await?;
        let submission = lock_pending(unit.as_mut(), submission_id).await?;

        let project = unit
            .get_project(submission.project_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("project {}", submission.project_id)))?;
        let worker = unit
            .get_user(submission.user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("user {}", submission.user_id)))?;

        let chain = resolve_upline_chain(unit.as_mut(), &worker, MAX_UPLINE_DEPTH).await?;
        let chain_ids: Vec<Uuid> = chain.iter().map(|u| u.id).collect();

        let quote = compute_payouts(&project.value, &self.schedule);
        let operators = resolve_operators(unit.as_mut(), &quote).await?;
        let lines = plan_payouts(&quote, worker.id, &chain_ids, &operators);

        let mut recipients: Vec<Uuid> = lines.iter().map(|line| line.recipient_id).collect();
        recipients.sort();
        recipients.dedup();
        unit.lock_users(&recipients).await?;

        let source = LedgerSource::Submission(submission.id);
        let mut transactions = Vec::with_capacity(lines.len());
        for line in &lines {
            let entry = post_entry(unit.as_mut(), line.recipient_id, &line.amount, line.kind, source).await?;
            transactions.push(entry);
        }

        let submission = unit
            .finalize_submission(submission.id, ReviewStatus::Approved, approver_id, None)
            .await?;
        unit.commit().await?;

        tracing::info!(
            %submission_id,
            %approver_id,
            worker_id = %worker.id,
            project_value = %project.value,
            payouts = transactions.len(),
            "Submission approved"
        );

        Ok(ApprovalReceipt {
            submission,
            transactions,
        })
    }
}

async fn lock_pending(unit: &mut dyn LedgerUnit, submission_id: Uuid) -> Result<Submission, ServiceError> {
    let submission = unit
        .lock_submission(submission_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("submission {}", submission_id)))?;

    if submission.status.is_terminal() {
        return Err(ServiceError::AlreadyProcessed {
            entity: "submission",
            id: submission_id,
        });
    }

    Ok(submission)
}

/// Maps each operator referral code to its account. Codes with no account
/// are skipped.
async fn resolve_operators(
    unit: &mut dyn LedgerUnit,
    quote: &CommissionQuote,
) -> Result<Vec<(Uuid, BigDecimal)>, ServiceError> {
    let mut operators = Vec::with_capacity(quote.operational_bonuses.len());

    for bonus in &quote.operational_bonuses {
        match unit.get_user_by_referral_code(&bonus.referral_code).await? {
            Some(operator) => operators.push((operator.id, bonus.amount.clone())),
            None => {
                tracing::warn!(
                    referral_code = %bonus.referral_code,
                    "Operational bonus recipient not found, skipping"
                );
            }
        }
    }

    Ok(operators)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryLedger;
    use crate::models::transactionmodel::TransactionKind;
    use crate::service::commission::OperationalBonus;
    use crate::service::testkit::{credit, dec, seed_project, seed_submission, seed_user, seed_user_with_code};

    fn engine(store: &MemoryLedger, bonuses: Vec<OperationalBonus>) -> SubmissionApprovalEngine {
        SubmissionApprovalEngine::new(
            Arc::new(store.clone()),
            Arc::new(CommissionSchedule::with_operational_bonuses(bonuses)),
            Duration::from_secs(5),
        )
    }

    async fn balance(store: &MemoryLedger, user_id: Uuid) -> BigDecimal {
        store.user(user_id).await.unwrap().balance
    }

    #[tokio::test]
    async fn approval_pays_worker_and_two_uplines() {
        let store = MemoryLedger::new();
        let u2 = seed_user(&store, "u2", None).await;
        let u1 = seed_user(&store, "u1", Some(u2.id)).await;
        let worker = seed_user(&store, "worker", Some(u1.id)).await;
        credit(&store, u1.id, "500").await;
        credit(&store, u2.id, "200").await;
        let project = seed_project(&store, "100000").await;
        let submission = seed_submission(&store, worker.id, &project).await;
        let admin = Uuid::new_v4();

        let engine = engine(&store, vec![]);
        let receipt = engine.approve_submission(submission.id, admin).await.unwrap();

        assert_eq!(receipt.submission.status, ReviewStatus::Approved);
        assert_eq!(receipt.submission.processed_by, Some(admin));
        assert!(receipt.submission.processed_at.is_some());
        assert_eq!(balance(&store, worker.id).await, dec("100000"));
        assert_eq!(balance(&store, u1.id).await, dec("10500"));
        assert_eq!(balance(&store, u2.id).await, dec("1200"));

        let kinds: Vec<TransactionKind> = receipt.transactions.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TransactionKind::TaskPayout,
                TransactionKind::UplineCommissionL1,
                TransactionKind::UplineCommissionL2,
            ]
        );
        assert!(receipt
            .transactions
            .iter()
            .all(|t| t.submission_id == Some(submission.id) && t.withdrawal_id.is_none()));

        // Second approval is refused and moves no money.
        let err = engine.approve_submission(submission.id, admin).await.unwrap_err();
        assert!(matches!(err, ServiceError::AlreadyProcessed { .. }));
        assert_eq!(balance(&store, worker.id).await, dec("100000"));
        assert_eq!(balance(&store, u1.id).await, dec("10500"));
        assert_eq!(balance(&store, u2.id).await, dec("1200"));
        assert_eq!(store.transactions().await.len(), 3);
    }

    #[tokio::test]
    async fn worker_without_upline_gets_only_the_payout() {
        let store = MemoryLedger::new();
        let worker = seed_user(&store, "solo", None).await;
        let project = seed_project(&store, "250.75").await;
        let submission = seed_submission(&store, worker.id, &project).await;

        let receipt = engine(&store, vec![])
            .approve_submission(submission.id, Uuid::new_v4())
            .await
            .unwrap();

        assert_eq!(receipt.transactions.len(), 1);
        assert_eq!(receipt.transactions[0].kind, TransactionKind::TaskPayout);
        assert_eq!(balance(&store, worker.id).await, dec("250.75"));
    }

    #[tokio::test]
    async fn operational_bonuses_go_to_resolved_operators_only() {
        let store = MemoryLedger::new();
        let ops = seed_user_with_code(&store, "ops", None, "OPSADMIN").await;
        let worker = seed_user(&store, "worker", None).await;
        let project = seed_project(&store, "1000").await;
        let submission = seed_submission(&store, worker.id, &project).await;

        let bonuses = vec![
            OperationalBonus {
                referral_code: "OPSADMIN".to_string(),
                amount: dec("2500"),
            },
            OperationalBonus {
                referral_code: "NOBODY00".to_string(),
                amount: dec("1000"),
            },
        ];
        let receipt = engine(&store, bonuses)
            .approve_submission(submission.id, Uuid::new_v4())
            .await
            .unwrap();

        assert_eq!(receipt.transactions.len(), 2);
        assert_eq!(receipt.transactions[1].kind, TransactionKind::OperationalBonus);
        assert_eq!(balance(&store, ops.id).await, dec("2500"));
    }

    #[tokio::test]
    async fn operator_who_is_also_worker_or_upline_is_paid_each_line() {
        let store = MemoryLedger::new();
        let upline = seed_user_with_code(&store, "upline", None, "OPSADMIN").await;
        let worker = seed_user_with_code(&store, "worker", Some(upline.id), "OPSFUND1").await;
        let project = seed_project(&store, "1000").await;
        let submission = seed_submission(&store, worker.id, &project).await;

        let bonuses = vec![
            OperationalBonus {
                referral_code: "OPSADMIN".to_string(),
                amount: dec("2500"),
            },
            OperationalBonus {
                referral_code: "OPSFUND1".to_string(),
                amount: dec("50"),
            },
        ];
        let receipt = engine(&store, bonuses)
            .approve_submission(submission.id, Uuid::new_v4())
            .await
            .unwrap();

        let kinds: Vec<_> = receipt.transactions.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TransactionKind::TaskPayout,
                TransactionKind::UplineCommissionL1,
                TransactionKind::OperationalBonus,
                TransactionKind::OperationalBonus,
            ]
        );
        assert_eq!(store.transactions().await.len(), 4);
        assert_eq!(balance(&store, worker.id).await, dec("1050"));
        assert_eq!(balance(&store, upline.id).await, dec("2600"));

        // balance_after tracks the running balance of each recipient.
        assert_eq!(receipt.transactions[3].balance_after, dec("1050"));
        assert_eq!(receipt.transactions[2].balance_after, dec("2600"));
    }

    #[tokio::test]
    async fn conservation_holds_across_the_receipt() {
        let store = MemoryLedger::new();
        let ops = seed_user_with_code(&store, "ops", None, "OPSFUND1").await;
        let u1 = seed_user(&store, "u1", None).await;
        let worker = seed_user(&store, "worker", Some(u1.id)).await;
        let project = seed_project(&store, "333.33").await;
        let submission = seed_submission(&store, worker.id, &project).await;

        let bonuses = vec![OperationalBonus {
            referral_code: "OPSFUND1".to_string(),
            amount: dec("10"),
        }];
        let receipt = engine(&store, bonuses)
            .approve_submission(submission.id, Uuid::new_v4())
            .await
            .unwrap();

        let credited: BigDecimal = receipt.transactions.iter().map(|t| t.amount.clone()).sum();
        let balances = balance(&store, worker.id).await
            + balance(&store, u1.id).await
            + balance(&store, ops.id).await;
        assert_eq!(credited, balances);
        // 333.33 * 0.10 = 33.333 -> 33.33
        assert_eq!(balance(&store, u1.id).await, dec("33.33"));
    }

    #[tokio::test]
    async fn failure_mid_cascade_rolls_everything_back() {
        let store = MemoryLedger::new();
        let u2 = seed_user(&store, "u2", None).await;
        let u1 = seed_user(&store, "u1", Some(u2.id)).await;
        let worker = seed_user(&store, "worker", Some(u1.id)).await;
        let project = seed_project(&store, "1000").await;
        let submission = seed_submission(&store, worker.id, &project).await;
        let engine = engine(&store, vec![]);

        // Worker credit and its ledger row succeed, the L1 credit fails.
        store.fail_writes_after(2);
        let err = engine
            .approve_submission(submission.id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Storage(_)));

        assert_eq!(balance(&store, worker.id).await, dec("0"));
        assert_eq!(balance(&store, u1.id).await, dec("0"));
        assert_eq!(balance(&store, u2.id).await, dec("0"));
        assert!(store.transactions().await.is_empty());
        assert_eq!(
            store.submission(submission.id).await.unwrap().status,
            ReviewStatus::Pending
        );

        store.clear_faults();
        engine
            .approve_submission(submission.id, Uuid::new_v4())
            .await
            .unwrap();
        assert_eq!(balance(&store, worker.id).await, dec("1000"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_approvals_pay_exactly_once() {
        let store = MemoryLedger::new();
        let u1 = seed_user(&store, "u1", None).await;
        let worker = seed_user(&store, "worker", Some(u1.id)).await;
        let project = seed_project(&store, "500").await;
        let submission_id = seed_submission(&store, worker.id, &project).await.id;
        let engine = engine(&store, vec![]);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.approve_submission(submission_id, Uuid::new_v4()).await })
            })
            .collect();

        let mut approved = 0;
        let mut already_processed = 0;
        for outcome in futures::future::join_all(handles).await {
            match outcome.unwrap() {
                Ok(_) => approved += 1,
                Err(ServiceError::AlreadyProcessed { .. }) => already_processed += 1,
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }

        assert_eq!(approved, 1);
        assert_eq!(already_processed, 7);
        assert_eq!(balance(&store, worker.id).await, dec("500"));
        assert_eq!(balance(&store, u1.id).await, dec("50"));
        assert_eq!(store.transactions().await.len(), 2);
    }

    #[tokio::test]
    async fn slow_commit_times_out_and_rolls_back() {
        let store = MemoryLedger::new();
        let worker = seed_user(&store, "worker", None).await;
        let project = seed_project(&store, "100").await;
        let submission = seed_submission(&store, worker.id, &project).await;

        let engine = SubmissionApprovalEngine::new(
            Arc::new(store.clone()),
            Arc::new(CommissionSchedule::with_operational_bonuses(vec![])),
            Duration::from_millis(50),
        );

        store.delay_commits(Duration::from_millis(500));
        let err = engine
            .approve_submission(submission.id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Timeout(_)));

        store.clear_faults();
        assert_eq!(balance(&store, worker.id).await, dec("0"));
        assert_eq!(
            store.submission(submission.id).await.unwrap().status,
            ReviewStatus::Pending
        );
    }

    #[tokio::test]
    async fn rejection_stores_note_and_moves_no_money() {
        let store = MemoryLedger::new();
        let worker = seed_user(&store, "worker", None).await;
        let project = seed_project(&store, "100").await;
        let submission = seed_submission(&store, worker.id, &project).await;
        let engine = engine(&store, vec![]);

        let rejected = engine
            .reject_submission(submission.id, Uuid::new_v4(), Some("blurry screenshot".to_string()))
            .await
            .unwrap();

        assert_eq!(rejected.status, ReviewStatus::Rejected);
        assert_eq!(rejected.admin_note.as_deref(), Some("blurry screenshot"));
        assert!(store.transactions().await.is_empty());

        let err = engine
            .approve_submission(submission.id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::AlreadyProcessed { .. }));
        assert_eq!(balance(&store, worker.id).await, dec("0"));
    }

    #[tokio::test]
    async fn unknown_submission_is_not_found() {
        let store = MemoryLedger::new();
        let engine = engine(&store, vec![]);

        let err = engine
            .approve_submission(Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let err = engine
            .reject_submission(Uuid::new_v4(), Uuid::new_v4(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}
