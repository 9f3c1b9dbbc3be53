use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::Result;

pub type AccountId = String;
pub type PeriodId = String;

/// Statement a line item belongs to. Drives cash flow classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SheetType {
    #[serde(rename = "PL")]
    Pl,
    #[serde(rename = "BS")]
    Bs,
    #[serde(rename = "CF")]
    Cf,
    #[serde(rename = "PP&E")]
    Ppe,
    #[serde(rename = "OTHER")]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub display_name: String,
    #[serde(default)]
    pub sheet_type: Option<SheetType>,
    #[serde(default)]
    pub parent_id: Option<AccountId>,
    #[serde(default)]
    pub is_credit: bool,
    #[serde(default)]
    pub ignored_for_cf: bool,
    #[serde(default)]
    pub is_cf_base_profit: bool,
    #[serde(default)]
    pub is_cash_account: bool,
}

impl Account {
    pub fn new(id: impl Into<AccountId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            sheet_type: None,
            parent_id: None,
            is_credit: false,
            ignored_for_cf: false,
            is_cf_base_profit: false,
            is_cash_account: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodType {
    Annual,
    Monthly,
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriodType::Annual => write!(f, "ANNUAL"),
            PeriodType::Monthly => write!(f, "MONTHLY"),
        }
    }
}

/// A time bucket. Ordering is positional within the period table, never
/// derived from the year/month fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Period {
    pub id: PeriodId,
    pub year: i32,
    pub month: u32,
    pub fiscal_year: i32,
    pub is_fiscal_year_end: bool,
    pub period_type: PeriodType,
    #[serde(default)]
    pub label: Option<String>,
}

impl Period {
    /// A fiscal-year-end annual period with the conventional `{year}-{month}-ANNUAL` id.
    pub fn annual(year: i32, month: u32) -> Self {
        Self {
            id: format!("{year}-{month}-{}", PeriodType::Annual),
            year,
            month,
            fiscal_year: year,
            is_fiscal_year_end: true,
            period_type: PeriodType::Annual,
            label: None,
        }
    }

    pub fn monthly(year: i32, month: u32, fiscal_year: i32) -> Self {
        Self {
            id: format!("{year}-{month}-{}", PeriodType::Monthly),
            year,
            month,
            fiscal_year,
            is_fiscal_year_end: false,
            period_type: PeriodType::Monthly,
            label: None,
        }
    }

    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }
}

/// The tree inside a `Calculation` rule; also the intermediate form the other
/// rule variants expand to before node construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Formula {
    Number {
        value: f64,
    },
    AccountRef {
        account: AccountId,
        /// 0 = current period, -1 = previous, +k = future.
        #[serde(default)]
        offset: i32,
    },
    BinaryOp {
        op: BinaryOp,
        left: Box<Formula>,
        right: Box<Formula>,
    },
}

impl Formula {
    pub fn number(value: f64) -> Self {
        Formula::Number { value }
    }

    pub fn account(account: impl Into<AccountId>) -> Self {
        Formula::AccountRef {
            account: account.into(),
            offset: 0,
        }
    }

    pub fn account_at(account: impl Into<AccountId>, offset: i32) -> Self {
        Formula::AccountRef {
            account: account.into(),
            offset,
        }
    }

    pub fn add(self, rhs: Formula) -> Self {
        Self::binary(BinaryOp::Add, self, rhs)
    }

    pub fn sub(self, rhs: Formula) -> Self {
        Self::binary(BinaryOp::Sub, self, rhs)
    }

    pub fn mul(self, rhs: Formula) -> Self {
        Self::binary(BinaryOp::Mul, self, rhs)
    }

    pub fn div(self, rhs: Formula) -> Self {
        Self::binary(BinaryOp::Div, self, rhs)
    }

    fn binary(op: BinaryOp, left: Formula, right: Formula) -> Self {
        Formula::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowSign {
    Plus,
    Minus,
}

/// One movement feeding a `BalanceChange` account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub account: AccountId,
    pub sign: FlowSign,
}

impl Flow {
    pub fn plus(account: impl Into<AccountId>) -> Self {
        Self {
            account: account.into(),
            sign: FlowSign::Plus,
        }
    }

    pub fn minus(account: impl Into<AccountId>) -> Self {
        Self {
            account: account.into(),
            sign: FlowSign::Minus,
        }
    }
}

/// The recipe for computing an account at any period it has no seeded value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rule {
    /// A constant injected at every period.
    Input { value: f64 },
    /// An explicit formula.
    Calculation { formula: Formula },
    /// Previous period's value times `1 + rate`.
    GrowthRate { rate: f64 },
    /// A share of another account in the same period.
    Percentage { rate: f64, of: AccountId },
    /// Mirrors another account in the same period.
    Reference { source: AccountId },
    /// Carries the previous period's value forward unchanged.
    FixedValue,
    /// Scales the previous value by the driver's period-over-period ratio.
    Proportionate { driver: AccountId },
    /// Previous balance plus the signed sum of the listed flows.
    BalanceChange { flows: Vec<Flow> },
}

/// One seeded value, keyed by (period, account).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputValue {
    pub account: AccountId,
    pub period: PeriodId,
    pub value: f64,
    #[serde(default = "default_is_input")]
    pub is_input: bool,
}

fn default_is_input() -> bool {
    true
}

impl InputValue {
    pub fn new(period: impl Into<PeriodId>, account: impl Into<AccountId>, value: f64) -> Self {
        Self {
            account: account.into(),
            period: period.into(),
            value,
            is_input: true,
        }
    }
}

/// A whole model in one serializable bundle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    pub accounts: Vec<Account>,
    pub periods: Vec<Period>,
    #[serde(default)]
    pub rules: BTreeMap<AccountId, Rule>,
    #[serde(default)]
    pub inputs: Vec<InputValue>,
}

impl ModelConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
