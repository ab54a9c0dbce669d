use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TallyError};

// ---------------------------------------------------------------------------
// Closed string enums: stored as lowercase text, parsed strictly
// ---------------------------------------------------------------------------

macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = TallyError;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(TallyError::InvalidInput(format!(
                        "unknown {} '{other}'",
                        stringify!($name)
                    ))),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let text = value.as_str()?;
                text.parse().map_err(|e: TallyError| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Contains,
    Exact,
}

text_enum!(MatchType { Contains => "contains", Exact => "exact" });

/// Where a transaction's category came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategorySource {
    Manual,
    Rule,
    Merchant,
    Learned,
    None,
}

text_enum!(CategorySource {
    Manual => "manual",
    Rule => "rule",
    Merchant => "merchant",
    Learned => "learned",
    None => "none",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReimbursementStatus {
    Pending,
    Cleared,
}

text_enum!(ReimbursementStatus { Pending => "pending", Cleared => "cleared" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReimbursementKind {
    Work,
    Personal,
}

text_enum!(ReimbursementKind { Work => "work", Personal => "personal" });

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub color: String,
    pub icon: String,
    pub order: i64,
    pub is_system: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub pattern: String,
    pub match_type: MatchType,
    pub category_id: String,
    /// Higher wins.
    pub priority: i64,
    pub is_learned: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reimbursement {
    pub status: ReimbursementStatus,
    pub kind: ReimbursementKind,
    pub note: Option<String>,
    pub cleared_at: Option<String>,
}

/// One line item of a split (lump-sum) transaction. Amounts carry the same
/// sign convention as the parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Split {
    pub category_id: Option<String>,
    pub amount: f64,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: String,
    pub date: NaiveDate,
    /// Expenses are negative, income positive.
    pub amount: f64,
    pub description: String,
    pub counterparty: Option<String>,
    pub category_id: Option<String>,
    pub category_source: CategorySource,
    pub category_confidence: f64,
    pub is_split: bool,
    pub splits: Vec<Split>,
    pub reimbursement: Option<Reimbursement>,
    pub currency: String,
}

impl Transaction {
    pub fn is_expense(&self) -> bool {
        self.amount < 0.0
    }

    /// Reimbursement data only counts on expenses.
    pub fn reimbursable(&self) -> Option<&Reimbursement> {
        if self.is_expense() {
            self.reimbursement.as_ref()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub id: String,
    pub category_id: String,
    pub monthly_limit: f64,
    /// Percentage of the limit at which the budget turns to `warning`.
    pub alert_threshold: f64,
    pub is_active: bool,
}

pub const DEFAULT_ALERT_THRESHOLD: f64 = 80.0;

/// Inclusive calendar-day range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(TallyError::InvalidInput(format!(
                "date range start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_date(start)?, parse_date(end)?)
    }

    /// The calendar month `YYYY-MM`.
    pub fn month(month: &str) -> Result<Self> {
        let start = NaiveDate::parse_from_str(&format!("{month}-01"), "%Y-%m-%d")
            .map_err(|_| TallyError::InvalidInput(format!("bad month '{month}' (expected YYYY-MM)")))?;
        let end = next_month(start)
            .pred_opt()
            .ok_or_else(|| TallyError::InvalidInput(format!("month out of range: {month}")))?;
        Self::new(start, end)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| TallyError::InvalidInput(format!("bad date '{raw}' (expected YYYY-MM-DD)")))
}

/// First day of the month after `date`'s month.
pub fn next_month(date: NaiveDate) -> NaiveDate {
    use chrono::Datelike;
    let (y, m) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1).unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_strings_roundtrip_and_reject_unknown() {
        assert_eq!("learned".parse::<CategorySource>().unwrap(), CategorySource::Learned);
        assert_eq!(MatchType::Exact.as_str(), "exact");
        let err = "regex".parse::<MatchType>().unwrap_err();
        assert!(err.to_string().contains("unknown MatchType 'regex'"), "got: {err}");
    }

    #[test]
    fn test_date_range_rejects_inverted() {
        assert!(DateRange::parse("2025-02-01", "2025-01-31").is_err());
        let r = DateRange::parse("2025-01-01", "2025-01-31").unwrap();
        assert_eq!(r.days(), 31);
    }

    #[test]
    fn test_month_range_handles_december_and_leap_years() {
        let dec = DateRange::month("2024-12").unwrap();
        assert_eq!(dec.end, NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
        let feb = DateRange::month("2024-02").unwrap();
        assert_eq!(feb.days(), 29);
        assert!(DateRange::month("2024-13").is_err());
    }

    #[test]
    fn test_reimbursable_only_on_expenses() {
        let mut txn = Transaction {
            id: "t".into(),
            date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            amount: 25.0,
            description: "refund".into(),
            counterparty: None,
            category_id: None,
            category_source: CategorySource::None,
            category_confidence: 0.0,
            is_split: false,
            splits: vec![],
            reimbursement: Some(Reimbursement {
                status: ReimbursementStatus::Pending,
                kind: ReimbursementKind::Work,
                note: None,
                cleared_at: None,
            }),
            currency: "EUR".into(),
        };
        assert!(txn.reimbursable().is_none());
        txn.amount = -25.0;
        assert!(txn.reimbursable().is_some());
    }
}
