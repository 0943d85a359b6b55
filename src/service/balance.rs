// service/balance.rs
use bigdecimal::BigDecimal;
use uuid::Uuid;

use crate::{
    db::ledger::LedgerUnit,
    models::transactionmodel::{LedgerSource, LedgerTransaction, NewLedgerEntry, TransactionKind},
    service::{commission::is_whole_minor_units, error::ServiceError},
};

/// Adds `delta` to the user's balance inside `unit`. A negative delta that
/// would take the balance below zero fails with `InsufficientFunds`.
pub async fn adjust_balance(
    unit: &mut dyn LedgerUnit,
    user_id: Uuid,
    delta: &BigDecimal,
) -> Result<BigDecimal, ServiceError> {
    if !is_whole_minor_units(delta) {
        return Err(ServiceError::Validation(format!(
            "Amount {} has more than two decimal places",
            delta
        )));
    }

    let balance = unit.adjust_balance(user_id, delta).await?;
    tracing::debug!(%user_id, %delta, %balance, "Balance adjusted");
    Ok(balance)
}

/// Moves `amount` into (or, when negative, out of) the user's balance and
/// records the matching ledger entry with the resulting balance.
pub async fn post_entry(
    unit: &mut dyn LedgerUnit,
    user_id: Uuid,
    amount: &BigDecimal,
    kind: TransactionKind,
    source: LedgerSource,
) -> Result<LedgerTransaction, ServiceError> {
    let balance_after = adjust_balance(unit, user_id, amount).await?;

    let entry = unit
        .append_transaction(NewLedgerEntry {
            user_id,
            kind,
            amount: amount.clone(),
            balance_after,
            source,
        })
        .await?;

    Ok(entry)
}
