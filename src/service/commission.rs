// service/commission.rs
//! Commission schedule and payout planning.
//!
//! Every amount produced here is rounded half-to-even at two decimal places
//! ([`MONEY_SCALE`]). The same rounding applies to the worker payout and to
//! both upline tiers.
use bigdecimal::{BigDecimal, RoundingMode};
use num_traits::Zero;
use serde::Serialize;
use uuid::Uuid;

use crate::models::transactionmodel::TransactionKind;

pub const MONEY_SCALE: i64 = 2;

/// Fixed bonus paid to a platform-operator account on every approval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationalBonus {
    pub referral_code: String,
    pub amount: BigDecimal,
}

/// Roster used when `OPERATIONAL_BONUSES` is not set.
pub const DEFAULT_OPERATIONAL_BONUSES: &[(&str, i64)] = &[("OPSADMIN", 2_500), ("OPSFUND", 1_000)];

pub fn default_operational_bonuses() -> Vec<OperationalBonus> {
    DEFAULT_OPERATIONAL_BONUSES
        .iter()
        .map(|(code, amount)| OperationalBonus {
            referral_code: code.to_string(),
            amount: BigDecimal::from(*amount),
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct CommissionSchedule {
    pub l1_rate: BigDecimal,
    pub l2_rate: BigDecimal,
    pub operational_bonuses: Vec<OperationalBonus>,
}

impl Default for CommissionSchedule {
    fn default() -> Self {
        Self::with_operational_bonuses(default_operational_bonuses())
    }
}

impl CommissionSchedule {
    /// 10% to the direct upline, 1% to the upline's upline.
    pub fn with_operational_bonuses(operational_bonuses: Vec<OperationalBonus>) -> Self {
        Self {
            l1_rate: BigDecimal::new(10.into(), 2),
            l2_rate: BigDecimal::new(1.into(), 2),
            operational_bonuses,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommissionQuote {
    pub worker_amount: BigDecimal,
    pub l1_commission: BigDecimal,
    pub l2_commission: BigDecimal,
    pub operational_bonuses: Vec<OperationalBonus>,
}

/// One credit the approval engine applies, in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayoutLine {
    pub recipient_id: Uuid,
    pub amount: BigDecimal,
    pub kind: TransactionKind,
}

pub fn round_money(amount: &BigDecimal) -> BigDecimal {
    amount.with_scale_round(MONEY_SCALE, RoundingMode::HalfEven)
}

/// True when `amount` has no digits below the minor unit.
pub fn is_whole_minor_units(amount: &BigDecimal) -> bool {
    round_money(amount) == *amount
}

pub fn compute_payouts(project_value: &BigDecimal, schedule: &CommissionSchedule) -> CommissionQuote {
    CommissionQuote {
        worker_amount: round_money(project_value),
        l1_commission: round_money(&(project_value * &schedule.l1_rate)),
        l2_commission: round_money(&(project_value * &schedule.l2_rate)),
        operational_bonuses: schedule
            .operational_bonuses
            .iter()
            .map(|bonus| OperationalBonus {
                referral_code: bonus.referral_code.clone(),
                amount: round_money(&bonus.amount),
            })
            .collect(),
    }
}

/// Turns a quote into the ordered credits for one approval: worker, direct
/// upline, second upline, then operators in roster order.
///
/// `upline_chain` is nearest-first; entries past the second are ignored.
/// `operators` holds the operator accounts that resolved, with their amounts.
/// Lines whose amount rounds to zero are left out.
pub fn plan_payouts(
    quote: &CommissionQuote,
    worker_id: Uuid,
    upline_chain: &[Uuid],
    operators: &[(Uuid, BigDecimal)],
) -> Vec<PayoutLine> {
    let mut lines = Vec::with_capacity(3 + operators.len());

    lines.push(PayoutLine {
        recipient_id: worker_id,
        amount: quote.worker_amount.clone(),
        kind: TransactionKind::TaskPayout,
    });

    if let Some(l1) = upline_chain.first() {
        lines.push(PayoutLine {
            recipient_id: *l1,
            amount: quote.l1_commission.clone(),
            kind: TransactionKind::UplineCommissionL1,
        });
    }

    if let Some(l2) = upline_chain.get(1) {
        lines.push(PayoutLine {
            recipient_id: *l2,
            amount: quote.l2_commission.clone(),
            kind: TransactionKind::UplineCommissionL2,
        });
    }

    for (operator_id, amount) in operators {
        lines.push(PayoutLine {
            recipient_id: *operator_id,
            amount: amount.clone(),
            kind: TransactionKind::OperationalBonus,
        });
    }

    lines.retain(|line| line.amount > BigDecimal::zero());
    lines
}
