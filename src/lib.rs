//! `nhb-core`: deterministic lending and fiat-backed stable-swap engines
//! for the NHB chain core. Every engine (`lending`, `swap`, `risk`,
//! `oracle`) is a pure state machine over the `storage::StateStore` /
//! `storage::SwapStore` capability traits; a host wires a concrete backing
//! store (`persistence::RocksStateStore` in production, `storage::MemStateStore`
//! / `storage::MemSwapStore` in tests) and calls engine methods directly —
//! there is no network or consensus layer in this crate.

pub mod address;
pub mod clock;
pub mod config;
pub mod error;
pub mod lending;
pub mod math;
pub mod model;
pub mod oracle;
pub mod persistence;
pub mod risk;
pub mod storage;
pub mod swap;

pub use address::Address;
pub use clock::{Clock, FixedClock, SharedClock, SystemClock};
pub use error::{BorrowCapKind, EngineError, Result};
pub use math::{Ray, Rational, Wei};
pub use model::{Account, Asset, SystemAddresses};
