use crate::error::{ModelError, Result};
use crate::nodes::{NodeId, NodeStore};
use crate::periods::PeriodTable;
use crate::schema::{AccountId, Flow, FlowSign, Formula, PeriodId, Rule};
use crate::values::ValueStore;
use log::trace;
use std::collections::{BTreeMap, BTreeSet};

type Key = (PeriodId, AccountId);

/// Demand-driven node constructor for one compute cycle.
///
/// Builds the subgraph for a (period, account) by recursing through rules and
/// formulas, memoizing one node per key and detecting cycles through the
/// visiting set. The builder owns the node store for the cycle; seeds and
/// rules are borrowed from the engine.
pub struct NodeBuilder<'a> {
    periods: &'a PeriodTable,
    values: &'a ValueStore,
    rules: &'a BTreeMap<AccountId, Rule>,
    nodes: NodeStore,
    memo: BTreeMap<Key, NodeId>,
    visiting: BTreeSet<Key>,
    stack: Vec<Key>,
}

impl<'a> NodeBuilder<'a> {
    pub fn new(
        periods: &'a PeriodTable,
        values: &'a ValueStore,
        rules: &'a BTreeMap<AccountId, Rule>,
    ) -> Self {
        Self {
            periods,
            values,
            rules,
            nodes: NodeStore::new(),
            memo: BTreeMap::new(),
            visiting: BTreeSet::new(),
            stack: Vec::new(),
        }
    }

    pub fn nodes(&self) -> &NodeStore {
        &self.nodes
    }

    /// Consumes the builder, releasing the node store for evaluation.
    pub fn finish(self) -> NodeStore {
        self.nodes
    }

    pub fn build_for_account(&mut self, period: &str, account: &str) -> Result<NodeId> {
        let key = (period.to_string(), account.to_string());
        if let Some(&node) = self.memo.get(&key) {
            return Ok(node);
        }
        if self.visiting.contains(&key) {
            return Err(self.cycle_error(&key));
        }

        self.visiting.insert(key.clone());
        self.stack.push(key.clone());
        let built = self.build_unmemoized(period, account);
        self.stack.pop();
        self.visiting.remove(&key);

        let node = built?;
        self.memo.insert(key, node);
        Ok(node)
    }

    fn build_unmemoized(&mut self, period: &str, account: &str) -> Result<NodeId> {
        // A stored value, seeded or previously computed, wins over any rule.
        if let Some(value) = self.values.get(period, account) {
            trace!("leaf from stored value: {account}@{period} = {value}");
            return Ok(self.nodes.add_leaf(value, leaf_label(account, period)));
        }

        let rules = self.rules;
        let rule = rules
            .get(account)
            .ok_or_else(|| ModelError::MissingRule {
                account: account.to_string(),
            })?;

        match rule {
            Rule::Input { value } => Ok(self.nodes.add_leaf(*value, leaf_label(account, period))),
            Rule::Calculation { formula } => self.build_formula(formula, period, account),
            Rule::Reference { source } => self.build_for_account(period, source),
            Rule::FixedValue => {
                let previous = self.periods.resolve(period, -1)?;
                self.build_for_account(&previous, account)
            }
            Rule::GrowthRate { rate } => {
                let formula =
                    Formula::account_at(account, -1).mul(Formula::number(1.0 + *rate));
                self.build_formula(&formula, period, account)
            }
            Rule::Percentage { rate, of } => {
                let formula = Formula::account(of).mul(Formula::number(*rate));
                self.build_formula(&formula, period, account)
            }
            Rule::Proportionate { driver } => {
                let ratio = Formula::account(driver).div(Formula::account_at(driver, -1));
                let formula = Formula::account_at(account, -1).mul(ratio);
                self.build_formula(&formula, period, account)
            }
            Rule::BalanceChange { flows } => {
                let formula = balance_change_formula(account, flows);
                self.build_formula(&formula, period, account)
            }
        }
    }

    pub fn build_formula(
        &mut self,
        formula: &Formula,
        period: &str,
        account: &str,
    ) -> Result<NodeId> {
        match formula {
            Formula::Number { value } => {
                Ok(self.nodes.add_leaf(*value, leaf_label(account, period)))
            }
            Formula::AccountRef {
                account: target,
                offset,
            } => {
                let resolved = self.periods.resolve(period, *offset)?;
                self.build_for_account(&resolved, target)
            }
            Formula::BinaryOp { op, left, right } => {
                let left = self.build_formula(left, period, account)?;
                let right = self.build_formula(right, period, account)?;
                let label = format!("{account}@{period}:{}", op.symbol());
                Ok(self.nodes.add_op(left, right, *op, label))
            }
        }
    }

    fn cycle_error(&self, key: &Key) -> ModelError {
        let start = self.stack.iter().position(|k| k == key).unwrap_or(0);
        let mut path: Vec<String> = self.stack[start..]
            .iter()
            .map(|(period, account)| format!("{account}@{period}"))
            .collect();
        path.push(format!("{}@{}", key.1, key.0));
        ModelError::Cycle { path }
    }
}

fn leaf_label(account: &str, period: &str) -> String {
    format!("{account}@{period}")
}

/// `previous balance + signed flow sum`, MINUS flows negated, summed with
/// left-associative ADD. An empty flow list contributes zero.
fn balance_change_formula(account: &str, flows: &[Flow]) -> Formula {
    let mut change: Option<Formula> = None;
    for flow in flows {
        let term = match flow.sign {
            FlowSign::Plus => Formula::account(&flow.account),
            FlowSign::Minus => Formula::account(&flow.account).mul(Formula::number(-1.0)),
        };
        change = Some(match change {
            Some(sum) => sum.add(term),
            None => term,
        });
    }
    let change = change.unwrap_or_else(|| Formula::number(0.0));
    Formula::account_at(account, -1).add(change)
}
