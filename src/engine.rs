use crate::builder::NodeBuilder;
use crate::cashflow::synthesize_cash_flow_rules;
use crate::error::{ModelError, Result};
use crate::evaluator::evaluate;
use crate::nodes::NodeId;
use crate::periods::PeriodTable;
use crate::schema::{Account, AccountId, InputValue, ModelConfig, Period, PeriodId, Rule};
use crate::values::ValueStore;
use log::debug;
use std::collections::BTreeMap;

/// Balance sheet total rounded to whole units.
pub const ASSETS_TOTAL: &str = "assets_total";
/// Its counterpart on the financing side, also rounded to whole units.
pub const EQUITY_AND_LIABILITIES_TOTAL: &str = "equity_and_liabilities_total";

const INTEGER_ROUNDED_ACCOUNTS: [&str; 2] = [ASSETS_TOTAL, EQUITY_AND_LIABILITIES_TOTAL];

pub type PeriodResults = BTreeMap<AccountId, f64>;

/// The model engine: holds accounts, periods, seeded values, and rules, and
/// materializes one forecast period per `compute` call.
///
/// Not safe for concurrent use; readers may observe intermediate state while
/// a compute is in flight.
#[derive(Debug, Default)]
pub struct ModelEngine {
    accounts: Vec<Account>,
    periods: PeriodTable,
    values: ValueStore,
    rules: BTreeMap<AccountId, Rule>,
}

impl ModelEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: ModelConfig) -> Result<Self> {
        let mut engine = Self::new();
        engine.set_accounts(config.accounts);
        engine.set_periods(config.periods);
        engine.set_rules(config.rules);
        engine.load_input_data(config.inputs)?;
        Ok(engine)
    }

    pub fn set_accounts(&mut self, accounts: Vec<Account>) {
        self.accounts = accounts;
    }

    pub fn set_periods(&mut self, periods: Vec<Period>) {
        self.periods.set_periods(periods);
    }

    pub fn set_rules(&mut self, rules: BTreeMap<AccountId, Rule>) {
        self.rules = rules;
    }

    pub fn load_input_data(&mut self, inputs: Vec<InputValue>) -> Result<()> {
        for input in inputs {
            if !self.accounts.iter().any(|a| a.id == input.account) {
                return Err(ModelError::UnknownAccount {
                    account: input.account,
                });
            }
            if !self.periods.contains(&input.period) {
                return Err(ModelError::UnknownPeriod {
                    period: input.period,
                });
            }
            self.values.set(&input.period, &input.account, input.value);
        }
        Ok(())
    }

    pub fn value(&self, period: &str, account: &str) -> Option<f64> {
        self.values.get(period, account)
    }

    pub fn all_accounts(&self) -> &[Account] {
        &self.accounts
    }

    pub fn all_periods(&self) -> &[Period] {
        self.periods.all()
    }

    /// Appends the next forecast period, synthesizes cash flow rules, and
    /// computes every ruled account for the new period. Returns the results
    /// keyed by the new period id.
    pub fn compute(&mut self) -> Result<BTreeMap<PeriodId, PeriodResults>> {
        if self.periods.is_empty() {
            return Err(ModelError::NotConfigured {
                reason: "no periods loaded".to_string(),
            });
        }
        if self.rules.is_empty() {
            return Err(ModelError::NotConfigured {
                reason: "no rules loaded".to_string(),
            });
        }

        let next = self.periods.derive_next()?;
        let new_period = next.id.clone();
        debug!("appending forecast period {new_period}");
        self.periods.append(next);

        synthesize_cash_flow_rules(&mut self.accounts, &mut self.rules)?;

        // Builder state lives exactly as long as this compute call.
        let mut builder = NodeBuilder::new(&self.periods, &self.values, &self.rules);
        let mut roots: Vec<(AccountId, NodeId)> = Vec::with_capacity(self.rules.len());
        for account in self.rules.keys() {
            let node = builder.build_for_account(&new_period, account)?;
            roots.push((account.clone(), node));
        }

        let nodes = builder.finish();
        let root_ids: Vec<NodeId> = roots.iter().map(|(_, node)| *node).collect();
        let evaluated = evaluate(&nodes, &root_ids)?;

        let mut period_results = PeriodResults::new();
        for (account, node) in roots {
            let value = rounded_for_account(&account, evaluated[&node]);
            self.values.set(&new_period, &account, value);
            period_results.insert(account, value);
        }
        debug!(
            "computed {} accounts for {new_period}",
            period_results.len()
        );

        let mut results = BTreeMap::new();
        results.insert(new_period, period_results);
        Ok(results)
    }

    /// Runs `compute` once per requested period and merges the results.
    pub fn compute_horizon(&mut self, periods: usize) -> Result<BTreeMap<PeriodId, PeriodResults>> {
        let mut merged = BTreeMap::new();
        for _ in 0..periods {
            merged.extend(self.compute()?);
        }
        Ok(merged)
    }

    /// Checks the accounting equation at a period against the stored totals.
    pub fn verify_balance(&self, period: &str, tolerance: f64) -> Result<()> {
        let assets = self
            .value(period, ASSETS_TOTAL)
            .ok_or_else(|| ModelError::UnknownAccount {
                account: ASSETS_TOTAL.to_string(),
            })?;
        let liabilities_and_equity = self
            .value(period, EQUITY_AND_LIABILITIES_TOTAL)
            .ok_or_else(|| ModelError::UnknownAccount {
                account: EQUITY_AND_LIABILITIES_TOTAL.to_string(),
            })?;

        let difference = (assets - liabilities_and_equity).abs();
        if difference > tolerance {
            return Err(ModelError::BalanceViolation {
                period: period.to_string(),
                assets,
                liabilities_and_equity,
                difference,
            });
        }
        Ok(())
    }
}

fn rounded_for_account(account: &str, value: f64) -> f64 {
    if INTEGER_ROUNDED_ACCOUNTS.contains(&account) {
        value.round()
    } else {
        round2(value)
    }
}

/// Half away from zero at two decimal places.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
