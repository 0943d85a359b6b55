pub mod db;
pub mod ledger;
pub mod memory;
pub mod pgledger;
