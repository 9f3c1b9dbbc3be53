use crate::error::{ModelError, Result};
use crate::schema::{Period, PeriodId, PeriodType};
use std::collections::BTreeMap;

/// Ordered list of periods with an id lookup. Relative references are
/// resolved by table index, never by calendar arithmetic.
#[derive(Debug, Default, Clone)]
pub struct PeriodTable {
    periods: Vec<Period>,
    index: BTreeMap<PeriodId, usize>,
}

impl PeriodTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_periods(&mut self, periods: Vec<Period>) {
        self.periods = periods;
        self.index = self
            .periods
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id.clone(), i))
            .collect();
    }

    pub fn append(&mut self, period: Period) {
        self.index.insert(period.id.clone(), self.periods.len());
        self.periods.push(period);
    }

    pub fn index_of(&self, id: &str) -> Result<usize> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| ModelError::UnknownPeriod {
                period: id.to_string(),
            })
    }

    /// Resolves `base` shifted by `offset` table slots.
    pub fn resolve(&self, base: &str, offset: i32) -> Result<PeriodId> {
        let target = self.index_of(base)? as i64 + offset as i64;
        if target < 0 || target >= self.periods.len() as i64 {
            return Err(ModelError::PeriodOutOfRange {
                period: base.to_string(),
                offset,
            });
        }
        Ok(self.periods[target as usize].id.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn latest(&self) -> Option<&Period> {
        self.periods.last()
    }

    pub fn all(&self) -> &[Period] {
        &self.periods
    }

    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    /// Derives the next forecast period from the latest one.
    ///
    /// Annual periods advance both the calendar and fiscal year and stay
    /// fiscal-year ends. Monthly periods advance one month, wrapping the
    /// calendar year after December; the fiscal year advances once the
    /// previous fiscal year has closed, and the fiscal-year-end flag is set
    /// when the new month matches the last known fiscal-year-end month.
    pub fn derive_next(&self) -> Result<Period> {
        let latest = self.latest().ok_or_else(|| ModelError::NotConfigured {
            reason: "no periods loaded".to_string(),
        })?;

        match latest.period_type {
            PeriodType::Annual => {
                let year = latest.year + 1;
                let month = latest.month;
                Ok(Period {
                    id: format!("{year}-{month}-{}", PeriodType::Annual),
                    year,
                    month,
                    fiscal_year: latest.fiscal_year + 1,
                    is_fiscal_year_end: true,
                    period_type: PeriodType::Annual,
                    label: None,
                })
            }
            PeriodType::Monthly => {
                let (year, month) = if latest.month >= 12 {
                    (latest.year + 1, 1)
                } else {
                    (latest.year, latest.month + 1)
                };
                let fiscal_year = if latest.is_fiscal_year_end {
                    latest.fiscal_year + 1
                } else {
                    latest.fiscal_year
                };
                let fiscal_year_end_month = self
                    .periods
                    .iter()
                    .rev()
                    .find(|p| p.is_fiscal_year_end)
                    .map(|p| p.month);
                Ok(Period {
                    id: format!("{year}-{month}-{}", PeriodType::Monthly),
                    year,
                    month,
                    fiscal_year,
                    is_fiscal_year_end: fiscal_year_end_month == Some(month),
                    period_type: PeriodType::Monthly,
                    label: None,
                })
            }
        }
    }
}
