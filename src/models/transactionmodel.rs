// models/transactionmodel.rs
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "transaction_kind", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    TaskPayout,
    UplineCommissionL1,
    UplineCommissionL2,
    OperationalBonus,
    WithdrawalDebit,
}

impl TransactionKind {
    pub fn to_str(&self) -> &str {
        match self {
            TransactionKind::TaskPayout => "task_payout",
            TransactionKind::UplineCommissionL1 => "upline_commission_l1",
            TransactionKind::UplineCommissionL2 => "upline_commission_l2",
            TransactionKind::OperationalBonus => "operational_bonus",
            TransactionKind::WithdrawalDebit => "withdrawal_debit",
        }
    }
}

/// Immutable ledger entry. Exactly one of `submission_id` and
/// `withdrawal_id` is set.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LedgerTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: TransactionKind,
    pub amount: BigDecimal,
    pub balance_after: BigDecimal,
    pub submission_id: Option<Uuid>,
    pub withdrawal_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerSource {
    Submission(Uuid),
    Withdrawal(Uuid),
}

impl LedgerSource {
    pub fn submission_id(&self) -> Option<Uuid> {
        match self {
            LedgerSource::Submission(id) => Some(*id),
            LedgerSource::Withdrawal(_) => None,
        }
    }

    pub fn withdrawal_id(&self) -> Option<Uuid> {
        match self {
            LedgerSource::Withdrawal(id) => Some(*id),
            LedgerSource::Submission(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub user_id: Uuid,
    pub kind: TransactionKind,
    pub amount: BigDecimal,
    pub balance_after: BigDecimal,
    pub source: LedgerSource,
}
