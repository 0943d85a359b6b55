// service/withdrawal_engine.rs
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::{
    db::ledger::{LedgerStore, LedgerUnit},
    models::{
        reviewmodel::ReviewStatus,
        transactionmodel::{LedgerSource, LedgerTransaction, TransactionKind},
        withdrawalmodel::Withdrawal,
    },
    service::{balance::post_entry, error::ServiceError, unit_of_work::bounded},
};

#[derive(Debug, Clone, Serialize)]
pub struct WithdrawalReceipt {
    pub withdrawal: Withdrawal,
    pub transaction: LedgerTransaction,
}

#[derive(Debug, Clone)]
pub struct WithdrawalApprovalEngine {
    store: Arc<dyn LedgerStore>,
    timeout: Duration,
}

impl WithdrawalApprovalEngine {
    pub fn new(store: Arc<dyn LedgerStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Debits the owner's balance and marks the withdrawal approved. The
    /// balance is read again under the row lock, so funds spent since the
    /// request was made are taken into account.
    pub async fn approve_withdrawal(
        &self,
        withdrawal_id: Uuid,
        approver_id: Uuid,
    ) -> Result<WithdrawalReceipt, ServiceError> {
        bounded(self.timeout, "approve_withdrawal", async {
            let mut unit = self.store.begin().await?;
            let withdrawal = lock_pending(unit.as_mut(), withdrawal_id).await?;

            unit.lock_users(&[withdrawal.user_id]).await?;
            let owner = unit
                .get_user(withdrawal.user_id)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("user {}", withdrawal.user_id)))?;

            if owner.balance < withdrawal.amount {
                tracing::warn!(
                    %withdrawal_id,
                    user_id = %owner.id,
                    balance = %owner.balance,
                    amount = %withdrawal.amount,
                    "Withdrawal exceeds current balance"
                );
                return Err(ServiceError::InsufficientFunds {
                    user_id: owner.id,
                    required: withdrawal.amount.clone(),
                    available: owner.balance,
                });
            }

            let transaction = post_entry(
                unit.as_mut(),
                owner.id,
                &-withdrawal.amount.clone(),
                TransactionKind::WithdrawalDebit,
                LedgerSource::Withdrawal(withdrawal.id),
            )
            .await?;

            let withdrawal = unit
                .finalize_withdrawal(withdrawal.id, ReviewStatus::Approved, approver_id, None)
                .await?;
            unit.commit().await?;

            tracing::info!(
                %withdrawal_id,
                %approver_id,
                amount = %withdrawal.amount,
                balance_after = %transaction.balance_after,
                "Withdrawal approved"
            );

            Ok(WithdrawalReceipt {
                withdrawal,
                transaction,
            })
        })
        .await
    }

    pub async fn reject_withdrawal(
        &self,
        withdrawal_id: Uuid,
        approver_id: Uuid,
        note: Option<String>,
    ) -> Result<Withdrawal, ServiceError> {
        bounded(self.timeout, "reject_withdrawal", async {
            let mut unit = self.store.begin().await?;
            lock_pending(unit.as_mut(), withdrawal_id).await?;

            let withdrawal = unit
                .finalize_withdrawal(withdrawal_id, ReviewStatus::Rejected, approver_id, note)
                .await?;
            unit.commit().await?;

            tracing::info!(%withdrawal_id, %approver_id, "Withdrawal rejected");
            Ok(withdrawal)
        })
        .await
    }
}

async fn lock_pending(unit: &mut dyn LedgerUnit, withdrawal_id: Uuid) -> Result<Withdrawal, ServiceError> {
    let withdrawal = unit
        .lock_withdrawal(withdrawal_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("withdrawal {}", withdrawal_id)))?;

    if withdrawal.status.is_terminal() {
        return Err(ServiceError::AlreadyProcessed {
            entity: "withdrawal",
            id: withdrawal_id,
        });
    }

    Ok(withdrawal)
}
