pub mod engine;
pub mod interest;
pub mod market;

pub use engine::LendingEngine;
pub use interest::InterestModel;
pub use market::{DeveloperFeeConfig, FeeAccrual, Market, OracleCache, UserAccount};
