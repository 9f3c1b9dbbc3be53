//! # Financial Model Engine
//!
//! A deterministic calculator for financial account models: given accounts,
//! an ordered set of periods, seeded values, and per-account rules, it
//! forecasts every account one period forward per compute. Before each
//! compute it synthesizes indirect-method cash flow accounts and rules from
//! the base model, so cash is derived without hand-written cash flow rules.
//!
//! ## Core Concepts
//!
//! - **Account**: a line item (revenue, cash) identified by an opaque id
//! - **Period**: a time bucket; ordering is positional, offsets are index-based
//! - **Rule**: the recipe for an account at any period without a seeded value
//! - **Formula**: the expression tree inside a `Calculation` rule
//! - **Compute**: builds a node graph on demand, evaluates it in topological
//!   order, rounds, and stores the results as seeds for the next compute
//!
//! ## Example
//!
//! ```rust
//! use financial_model_engine::*;
//! use std::collections::BTreeMap;
//!
//! let mut engine = ModelEngine::new();
//! engine.set_accounts(vec![Account::new("revenue", "Revenue")]);
//! engine.set_periods(vec![Period::annual(2024, 12)]);
//!
//! let mut rules = BTreeMap::new();
//! rules.insert("revenue".to_string(), Rule::GrowthRate { rate: 0.10 });
//! engine.set_rules(rules);
//!
//! engine
//!     .load_input_data(vec![InputValue::new("2024-12-ANNUAL", "revenue", 1000.0)])
//!     .unwrap();
//!
//! let results = engine.compute().unwrap();
//! assert_eq!(results["2025-12-ANNUAL"]["revenue"], 1100.0);
//! ```

pub mod builder;
pub mod cashflow;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod nodes;
pub mod periods;
pub mod schema;
pub mod values;

pub use builder::NodeBuilder;
pub use cashflow::{
    cf_adjustment_id, synthesize_cash_flow_rules, working_capital_id, BASE_PROFIT_CF,
    CASH_CHANGE_CF, CF_ADJUSTMENT_SUFFIX, WORKING_CAPITAL_SUFFIX,
};
pub use engine::{ModelEngine, PeriodResults, ASSETS_TOTAL, EQUITY_AND_LIABILITIES_TOTAL};
pub use error::{ModelError, Result};
pub use evaluator::evaluate;
pub use nodes::{Node, NodeId, NodeStore};
pub use periods::PeriodTable;
pub use schema::*;
pub use values::ValueStore;

use std::collections::BTreeMap;

/// Builds an engine from a config bundle and runs a single compute.
pub fn compute_model(config: ModelConfig) -> Result<BTreeMap<PeriodId, PeriodResults>> {
    let mut engine = ModelEngine::from_config(config)?;
    engine.compute()
}
