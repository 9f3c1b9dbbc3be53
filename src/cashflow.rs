//! Derives indirect-method cash flow accounts and rules from the base model.
//!
//! Runs at the start of every compute, after the forecast period is appended.
//! Starting from the flagged base profit account it mirrors profit into the
//! cash flow statement, adds back non-cash charges, books investment
//! outflows, converts balance sheet movements into working capital deltas,
//! aggregates everything into a net-change account, and rewires the cash
//! balance onto that aggregate. Re-running the pass on an already-derived
//! rule set reproduces the same state.

use crate::error::{ModelError, Result};
use crate::schema::{Account, AccountId, Flow, FlowSign, Formula, Rule, SheetType};
use log::debug;
use std::collections::BTreeMap;

/// Cash flow mirror of the base profit account.
pub const BASE_PROFIT_CF: &str = "baseProfit_cf";
/// Aggregate net change in cash for a period.
pub const CASH_CHANGE_CF: &str = "cash_change_cf";
/// Suffix of add-back/outflow accounts derived from balance change flows.
pub const CF_ADJUSTMENT_SUFFIX: &str = "_cf_adj";
/// Suffix of working capital delta accounts derived from balance sheet accounts.
pub const WORKING_CAPITAL_SUFFIX: &str = "_cf_wc";

const DEFAULT_CASH_ID: &str = "cash";

pub fn cf_adjustment_id(account: &str) -> String {
    format!("{account}{CF_ADJUSTMENT_SUFFIX}")
}

pub fn working_capital_id(account: &str) -> String {
    format!("{account}{WORKING_CAPITAL_SUFFIX}")
}

pub fn synthesize_cash_flow_rules(
    accounts: &mut Vec<Account>,
    rules: &mut BTreeMap<AccountId, Rule>,
) -> Result<()> {
    let base_profit = match find_base_profit(accounts)? {
        Some(id) => id,
        None => {
            debug!("no base profit account and no balance sheet content; skipping cash flow synthesis");
            return Ok(());
        }
    };

    // Base profit mirror on the cash flow statement.
    ensure_cf_account(accounts, BASE_PROFIT_CF, "Base profit (CF)");
    rules.insert(
        BASE_PROFIT_CF.to_string(),
        Rule::Reference {
            source: base_profit.clone(),
        },
    );

    // Non-cash add-backs (MINUS flows) and investment outflows (PLUS flows)
    // derived from balance change movements.
    let mut noncash_ids: Vec<AccountId> = Vec::new();
    let mut investment_ids: Vec<AccountId> = Vec::new();
    let mut adjustments: Vec<(AccountId, String, Rule)> = Vec::new();

    for (holder_id, rule) in rules.iter() {
        let flows = match rule {
            Rule::BalanceChange { flows } => flows,
            _ => continue,
        };
        let holder_sign = match find_account(accounts, holder_id) {
            Some(holder) if holder.is_credit => 1.0,
            _ => -1.0,
        };

        for flow in flows {
            let source = match find_account(accounts, &flow.account) {
                Some(source) => source,
                None => continue,
            };
            if source.is_cf_base_profit {
                continue;
            }
            match source.sheet_type {
                Some(SheetType::Bs) | Some(SheetType::Cf) | None => continue,
                Some(_) => {}
            }

            let (flow_sign, bucket) = match flow.sign {
                FlowSign::Minus => (-1.0, &mut noncash_ids),
                FlowSign::Plus => (1.0, &mut investment_ids),
            };
            let cf_sign = holder_sign * flow_sign;
            let adjustment = cf_adjustment_id(&flow.account);
            if !bucket.contains(&adjustment) {
                bucket.push(adjustment.clone());
            }
            adjustments.push((
                adjustment,
                format!("{} (CF adjustment)", source.display_name),
                Rule::Calculation {
                    formula: Formula::account(&flow.account).mul(Formula::number(cf_sign)),
                },
            ));
        }
    }

    for (id, display_name, rule) in adjustments {
        ensure_cf_account(accounts, &id, &display_name);
        rules.insert(id, rule);
    }

    // Working capital deltas for balance sheet accounts that are not cash,
    // not excluded, and not already driven by explicit movements.
    let cash_id = accounts
        .iter()
        .find(|a| a.is_cash_account)
        .map(|a| a.id.clone())
        .unwrap_or_else(|| DEFAULT_CASH_ID.to_string());

    let mut working_capital_ids: Vec<AccountId> = Vec::new();
    let mut deltas: Vec<(AccountId, String, Rule)> = Vec::new();
    for account in accounts.iter() {
        if account.sheet_type != Some(SheetType::Bs) {
            continue;
        }
        if account.is_cash_account || account.id == cash_id || account.ignored_for_cf {
            continue;
        }
        if matches!(rules.get(&account.id), Some(Rule::BalanceChange { .. })) {
            continue;
        }

        let sign = if account.is_credit { 1.0 } else { -1.0 };
        let delta = Formula::account(&account.id).sub(Formula::account_at(&account.id, -1));
        let wc_id = working_capital_id(&account.id);
        working_capital_ids.push(wc_id.clone());
        deltas.push((
            wc_id,
            format!("{} (working capital)", account.display_name),
            Rule::Calculation {
                formula: delta.mul(Formula::number(sign)),
            },
        ));
    }

    for (id, display_name, rule) in deltas {
        ensure_cf_account(accounts, &id, &display_name);
        rules.insert(id, rule);
    }

    // Aggregate: base profit, then add-backs, then working capital, then
    // investment, summed left to right.
    let mut terms: Vec<AccountId> = Vec::with_capacity(
        1 + noncash_ids.len() + working_capital_ids.len() + investment_ids.len(),
    );
    terms.push(BASE_PROFIT_CF.to_string());
    terms.extend(noncash_ids);
    terms.extend(working_capital_ids);
    terms.extend(investment_ids);

    let mut sum = Formula::account(&terms[0]);
    for term in &terms[1..] {
        sum = sum.add(Formula::account(term));
    }
    ensure_cf_account(accounts, CASH_CHANGE_CF, "Net change in cash");
    rules.insert(
        CASH_CHANGE_CF.to_string(),
        Rule::Calculation { formula: sum },
    );

    // Cash itself becomes last balance plus the aggregate change.
    rules.insert(
        cash_id.clone(),
        Rule::BalanceChange {
            flows: vec![Flow::plus(CASH_CHANGE_CF)],
        },
    );

    debug!(
        "cash flow synthesis complete: {} terms feed {CASH_CHANGE_CF}, cash account is {cash_id}",
        terms.len()
    );
    Ok(())
}

/// The unique flagged base profit account, `None` when synthesis does not
/// apply (no flag and no balance sheet or cash flow content to derive from).
fn find_base_profit(accounts: &[Account]) -> Result<Option<AccountId>> {
    let mut flagged = accounts.iter().filter(|a| a.is_cf_base_profit);
    match (flagged.next(), flagged.next()) {
        (Some(account), None) => Ok(Some(account.id.clone())),
        (Some(_), Some(_)) => Err(ModelError::MissingBaseProfit),
        (None, _) => {
            let has_cf_content = accounts.iter().any(|a| {
                matches!(a.sheet_type, Some(SheetType::Bs) | Some(SheetType::Cf))
            });
            if has_cf_content {
                Err(ModelError::MissingBaseProfit)
            } else {
                Ok(None)
            }
        }
    }
}

fn find_account<'a>(accounts: &'a [Account], id: &str) -> Option<&'a Account> {
    accounts.iter().find(|a| a.id == id)
}

fn ensure_cf_account(accounts: &mut Vec<Account>, id: &str, display_name: &str) {
    if accounts.iter().any(|a| a.id == id) {
        return;
    }
    accounts.push(Account {
        sheet_type: Some(SheetType::Cf),
        ignored_for_cf: true,
        ..Account::new(id, display_name)
    });
}
