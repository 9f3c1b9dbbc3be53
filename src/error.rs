use crate::nodes::NodeId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("No rule or seeded value for account: {account}")]
    MissingRule { account: String },

    #[error("Unknown account: {account}")]
    UnknownAccount { account: String },

    #[error("Unknown period: {period}")]
    UnknownPeriod { period: String },

    #[error("Period offset {offset} from {period} leaves the period table")]
    PeriodOutOfRange { period: String, offset: i32 },

    #[error("Circular dependency: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("Division by zero at node {node} ({label})")]
    DivisionByZero { node: NodeId, label: String },

    #[error("Engine not configured: {reason}")]
    NotConfigured { reason: String },

    #[error("No unique account is flagged as the cash flow base profit")]
    MissingBaseProfit,

    #[error("Balance violation on {period}: assets ({assets}) != liabilities + equity ({liabilities_and_equity}), difference {difference}")]
    BalanceViolation {
        period: String,
        assets: f64,
        liabilities_and_equity: f64,
        difference: f64,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ModelError>;
