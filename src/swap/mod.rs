pub mod engine;
pub mod stable;
pub mod voucher;

pub use engine::{MintRequest, SwapEngine};
pub use stable::{CashOutIntent, CashOutStatus, DepositVoucher, EscrowLock, PayoutReceipt, StableEngine, TreasurySoftInventory};
pub use voucher::{BurnLedger, BurnReceipt, VoucherLedger, VoucherRecord, VoucherStatus};
