use thiserror::Error;

/// Closed set of engine error kinds (spec §7). Each variant carries the
/// structured context a caller needs instead of a formatted string, so a
/// dashboard or RPC boundary can match on `code()` without parsing prose.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("state adapter not configured")]
    NilState,

    #[error("market not configured for pool {pool_id}")]
    NilMarket { pool_id: String },

    #[error("invalid amount: {reason}")]
    InvalidAmount { reason: String },

    #[error("insufficient balance: need {need}, have {have}")]
    InsufficientBalance { need: String, have: String },

    #[error("insufficient liquidity: need {need}, available {available}")]
    InsufficientLiquidity { need: String, available: String },

    #[error("health check failed: collateral {collateral} debt {debt} threshold_bps {threshold_bps}")]
    HealthCheckFailed {
        collateral: String,
        debt: String,
        threshold_bps: u32,
    },

    #[error("no outstanding debt for account")]
    NoDebt,

    #[error("position is not liquidatable (healthy)")]
    NotLiquidatable,

    #[error("developer fee recipient missing for non-zero fee bps")]
    DeveloperFeeRecipientMissing,

    #[error("developer fee bps {requested} exceeds cap {cap}")]
    DeveloperFeeCapExceeded { requested: u32, cap: u32 },

    #[error("pool {pool_id} is not configured")]
    PoolNotConfigured { pool_id: String },

    #[error("collateral routing invalid: liquidator_bps+developer_bps+protocol_bps={total} > 10000")]
    CollateralRoutingInvalid { total: u32 },

    #[error("collateral recipient missing for non-zero share")]
    CollateralRecipientMissing,

    #[error("borrow cap exceeded: {kind}, limit {limit}, projected {projected}")]
    BorrowCapExceeded {
        kind: BorrowCapKind,
        limit: String,
        projected: String,
    },

    #[error("oracle price stale: observed {observed}s ago, max_age {max_age}s")]
    OracleStale { observed: i64, max_age: i64 },

    #[error("oracle deviation {current_bps} bps exceeds limit {limit_bps} bps")]
    OracleDeviation { current_bps: u32, limit_bps: u32 },

    #[error("slippage {current_bps} bps exceeds limit {limit_bps} bps")]
    Slippage { current_bps: u32, limit_bps: u32 },

    #[error("module {module} is paused")]
    ModulePaused { module: String },

    #[error("amount {amount} below per-tx minimum {min}")]
    PerTxMin { amount: String, min: String },

    #[error("amount {amount} above per-tx maximum {max}")]
    PerTxMax { amount: String, max: String },

    #[error("daily cap exceeded: limit {limit}, current {current}")]
    DailyCap { limit: String, current: String },

    #[error("monthly cap exceeded: limit {limit}, current {current}")]
    MonthlyCap { limit: String, current: String },

    #[error("velocity guard tripped: {count} events in {window_seconds}s window (max {max})")]
    Velocity {
        count: u32,
        max: u32,
        window_seconds: u64,
    },

    #[error("cash-out asset cap exceeded: limit {limit}, projected {projected}")]
    CashOutAssetCap { limit: String, projected: String },

    #[error("cash-out tier cap exceeded: limit {limit}, projected {projected}")]
    CashOutTierCap { limit: String, projected: String },

    #[error("price proof domain mismatch: expected {expected}")]
    PriceProofDomain { expected: String },

    #[error("price proof pair unsupported: {base}/{quote}")]
    PriceProofPair { base: String, quote: String },

    #[error("price proof provider mismatch: expected {expected}, got {got}")]
    PriceProofProviderMismatch { expected: String, got: String },

    #[error("price proof signer unknown for provider {provider}")]
    PriceProofSignerUnknown { provider: String },

    #[error("price proof signature invalid")]
    PriceProofSignatureInvalid,

    #[error("price proof stale: timestamp {timestamp}, now {now}, max_age {max_age}s")]
    PriceProofStale {
        timestamp: i64,
        now: i64,
        max_age: i64,
    },

    #[error("price proof deviation {current_bps} bps exceeds limit {limit_bps} bps")]
    PriceProofDeviation { current_bps: u32, limit_bps: u32 },

    #[error("idempotency conflict for key {key}")]
    IdempotencyConflict { key: String },

    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("supply underflow for {symbol}: have {have}, requested decrement {requested}")]
    SupplyUnderflow {
        symbol: String,
        have: String,
        requested: String,
    },

    #[error("corrupt state: {reason}")]
    Corrupt { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorrowCapKind {
    PerBlock,
    Utilisation,
    Global,
}

impl std::fmt::Display for BorrowCapKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BorrowCapKind::PerBlock => "per_block",
            BorrowCapKind::Utilisation => "utilisation",
            BorrowCapKind::Global => "global",
        };
        write!(f, "{s}")
    }
}

impl EngineError {
    /// Stable snake_case code usable by dashboards and RPC clients (spec §7).
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::NilState => "nil_state",
            EngineError::NilMarket { .. } => "nil_market",
            EngineError::InvalidAmount { .. } => "invalid_amount",
            EngineError::InsufficientBalance { .. } => "insufficient_balance",
            EngineError::InsufficientLiquidity { .. } => "insufficient_liquidity",
            EngineError::HealthCheckFailed { .. } => "health_check_failed",
            EngineError::NoDebt => "no_debt",
            EngineError::NotLiquidatable => "not_liquidatable",
            EngineError::DeveloperFeeRecipientMissing => "developer_fee_recipient_missing",
            EngineError::DeveloperFeeCapExceeded { .. } => "developer_fee_cap_exceeded",
            EngineError::PoolNotConfigured { .. } => "pool_not_configured",
            EngineError::CollateralRoutingInvalid { .. } => "collateral_routing_invalid",
            EngineError::CollateralRecipientMissing => "collateral_recipient_missing",
            EngineError::BorrowCapExceeded { kind, .. } => match kind {
                BorrowCapKind::PerBlock => "borrow_cap_per_block",
                BorrowCapKind::Utilisation => "borrow_cap_utilisation",
                BorrowCapKind::Global => "borrow_cap_global",
            },
            EngineError::OracleStale { .. } => "oracle_stale",
            EngineError::OracleDeviation { .. } => "oracle_deviation",
            EngineError::Slippage { .. } => "slippage",
            EngineError::ModulePaused { .. } => "module_paused",
            EngineError::PerTxMin { .. } => "per_tx_min",
            EngineError::PerTxMax { .. } => "per_tx_max",
            EngineError::DailyCap { .. } => "daily_cap",
            EngineError::MonthlyCap { .. } => "monthly_cap",
            EngineError::Velocity { .. } => "velocity",
            EngineError::CashOutAssetCap { .. } => "cashout_asset_cap",
            EngineError::CashOutTierCap { .. } => "cashout_tier_cap",
            EngineError::PriceProofDomain { .. } => "price_proof_domain",
            EngineError::PriceProofPair { .. } => "price_proof_pair",
            EngineError::PriceProofProviderMismatch { .. } => "price_proof_provider_mismatch",
            EngineError::PriceProofSignerUnknown { .. } => "price_proof_signer_unknown",
            EngineError::PriceProofSignatureInvalid => "price_proof_signature_invalid",
            EngineError::PriceProofStale { .. } => "price_proof_stale",
            EngineError::PriceProofDeviation { .. } => "price_proof_deviation",
            EngineError::IdempotencyConflict { .. } => "idempotency_conflict",
            EngineError::NotFound { .. } => "not_found",
            EngineError::SupplyUnderflow { .. } => "supply_underflow",
            EngineError::Corrupt { .. } => "corrupt",
        }
    }
}

impl From<rocksdb::Error> for EngineError {
    fn from(e: rocksdb::Error) -> Self {
        EngineError::Corrupt {
            reason: e.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
