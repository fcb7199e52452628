pub mod fetch;
pub mod ledger;
pub mod merge;
