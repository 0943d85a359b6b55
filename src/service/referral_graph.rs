// service/referral_graph.rs
use std::collections::HashSet;

use crate::{db::ledger::LedgerUnit, models::usermodel::User, service::error::ServiceError};

/// Commission tiers paid above a worker.
pub const MAX_UPLINE_DEPTH: usize = 2;

/// Upper bound on any walk, whatever depth is asked for.
const HARD_DEPTH_CAP: usize = 16;

/// Walks the upline pointers starting above `user`, nearest first.
///
/// Stops at the first user without an upline, after `max_depth` hops, or if
/// a user would be visited twice.
pub async fn resolve_upline_chain(
    unit: &mut dyn LedgerUnit,
    user: &User,
    max_depth: usize,
) -> Result<Vec<User>, ServiceError> {
    let depth = max_depth.min(HARD_DEPTH_CAP);
    let mut chain: Vec<User> = Vec::with_capacity(depth);
    let mut visited = HashSet::from([user.id]);
    let mut next = user.upline_id;

    while chain.len() < depth {
        let Some(upline_id) = next else {
            break;
        };

        if !visited.insert(upline_id) {
            tracing::warn!(user_id = %user.id, %upline_id, "Cycle in upline chain, stopping walk");
            break;
        }

        match unit.get_user(upline_id).await? {
            Some(upline) => {
                next = upline.upline_id;
                chain.push(upline);
            }
            None => {
                tracing::warn!(user_id = %user.id, %upline_id, "Upline referent missing, stopping walk");
                break;
            }
        }
    }

    Ok(chain)
}
