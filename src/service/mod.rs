pub mod balance;
pub mod commission;
pub mod error;
pub mod marketplace;
pub mod referral_graph;
pub mod registration;
pub mod submission_engine;
pub mod unit_of_work;
pub mod withdrawal_engine;

#[cfg(test)]
pub(crate) mod testkit;
