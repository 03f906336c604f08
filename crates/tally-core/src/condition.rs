//! Condition evaluator: a single filter predicate over one ledger row.
//!
//! Conditions compose by logical AND only; there is no OR and no nesting.
//! The `since_last_settle_up` flag is not evaluated per row — the query
//! engine applies it once to the whole row set before conditions run.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TallyError};
use crate::storage::{ExpenseRow, Party};

/// Ledger column referenced by a condition or group key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Column {
    Date,
    Name,
    Amount,
    #[serde(rename = "v_paid")]
    VPaid,
    #[serde(rename = "y_paid")]
    YPaid,
    Labels,
    Notes,
}

impl Column {
    pub fn as_str(self) -> &'static str {
        match self {
            Column::Date => "Date",
            Column::Name => "Name",
            Column::Amount => "Amount",
            Column::VPaid => "v_paid",
            Column::YPaid => "y_paid",
            Column::Labels => "Labels",
            Column::Notes => "Notes",
        }
    }

    pub fn parse(name: &str) -> Result<Column> {
        match name {
            "Date" => Ok(Column::Date),
            "Name" => Ok(Column::Name),
            "Amount" => Ok(Column::Amount),
            "v_paid" => Ok(Column::VPaid),
            "y_paid" => Ok(Column::YPaid),
            "Labels" => Ok(Column::Labels),
            "Notes" => Ok(Column::Notes),
            other => Err(TallyError::Validation(format!(
                "Unknown column: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "substr")]
    Substr,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
            CompareOp::Ge => ">=",
            CompareOp::Le => "<=",
            CompareOp::In => "in",
            CompareOp::Contains => "contains",
            CompareOp::Substr => "substr",
        };
        f.write_str(s)
    }
}

/// Transform applied to a Date column value before comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateTransform {
    Month,
    Year,
    Weekday,
}

impl DateTransform {
    pub fn parse(name: &str) -> Result<DateTransform> {
        match name {
            "month" => Ok(DateTransform::Month),
            "year" => Ok(DateTransform::Year),
            "weekday" => Ok(DateTransform::Weekday),
            other => Err(TallyError::Validation(format!(
                "Unknown date transform: {}",
                other
            ))),
        }
    }
}

/// Comparand: the classifier supplies strings, numbers, or string lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CondValue {
    Number(f64),
    Text(String),
    List(Vec<String>),
}

impl CondValue {
    fn as_text(&self) -> String {
        self.to_string()
    }

    fn as_number(&self) -> Result<f64> {
        match self {
            CondValue::Number(n) => Ok(*n),
            CondValue::Text(s) => coerce_number(s),
            CondValue::List(_) => Err(TallyError::Validation(
                "Cannot compare a list numerically".to_string(),
            )),
        }
    }
}

impl fmt::Display for CondValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CondValue::Number(n) => write!(f, "{}", n),
            CondValue::Text(s) => f.write_str(s),
            CondValue::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

impl From<&str> for CondValue {
    fn from(value: &str) -> Self {
        CondValue::Text(value.to_string())
    }
}

impl From<String> for CondValue {
    fn from(value: String) -> Self {
        CondValue::Text(value)
    }
}

impl From<f64> for CondValue {
    fn from(value: f64) -> Self {
        CondValue::Number(value)
    }
}

/// A single filter predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub column: Column,
    pub value: CondValue,
    pub operation: CompareOp,
    #[serde(default)]
    pub is_inverse: bool,
    #[serde(default)]
    pub since_last_settle_up: bool,
    #[serde(default)]
    pub transform: Option<DateTransform>,
}

impl Condition {
    pub fn new(column: Column, operation: CompareOp, value: impl Into<CondValue>) -> Self {
        Self {
            column,
            value: value.into(),
            operation,
            is_inverse: false,
            since_last_settle_up: false,
            transform: None,
        }
    }

    pub fn inverse(mut self) -> Self {
        self.is_inverse = true;
        self
    }

    pub fn since_last_settle_up(mut self) -> Self {
        self.since_last_settle_up = true;
        self
    }

    pub fn with_transform(mut self, transform: DateTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Evaluate this condition against one row.
    ///
    /// Equality compares numerically when both sides coerce, falling back
    /// to string comparison; ordering operators coerce both sides to
    /// numbers treating missing values as 0; substring matching is
    /// case-insensitive.
    ///
    /// # Errors
    ///
    /// Returns `TallyError::Validation` when an ordering operator meets a
    /// value that cannot be coerced to a number, or `in` meets a non-list.
    pub fn matches(&self, row: &ExpenseRow) -> Result<bool> {
        let field = column_text(row, self.column, self.transform);

        let result = match self.operation {
            CompareOp::Eq => loose_eq(&field, &self.value.as_text()),
            CompareOp::Ne => !loose_eq(&field, &self.value.as_text()),
            CompareOp::Gt => coerce_number(&field)? > self.value.as_number()?,
            CompareOp::Lt => coerce_number(&field)? < self.value.as_number()?,
            CompareOp::Ge => coerce_number(&field)? >= self.value.as_number()?,
            CompareOp::Le => coerce_number(&field)? <= self.value.as_number()?,
            CompareOp::In => match &self.value {
                CondValue::List(items) => items.iter().any(|item| loose_eq(&field, item)),
                _ => {
                    return Err(TallyError::Validation(
                        "The in operator requires a list value".to_string(),
                    ))
                }
            },
            CompareOp::Contains | CompareOp::Substr => field
                .to_lowercase()
                .contains(&self.value.as_text().to_lowercase()),
        };

        Ok(if self.is_inverse { !result } else { result })
    }

    /// Human-readable trace entry for query diagnostics.
    pub fn describe(&self) -> String {
        let prefix = if self.is_inverse { "NOT " } else { "" };
        format!("{}{} {} {}", prefix, self.column, self.operation, self.value)
    }
}

/// String form of a row's column value, with the optional Date transform
/// applied. Transforms are ignored on non-Date columns.
pub(crate) fn column_text(
    row: &ExpenseRow,
    column: Column,
    transform: Option<DateTransform>,
) -> String {
    match column {
        Column::Date => match transform {
            Some(DateTransform::Month) => row.date.format("%B").to_string(),
            Some(DateTransform::Year) => row.date.format("%Y").to_string(),
            Some(DateTransform::Weekday) => row.date.format("%A").to_string(),
            None => row.date.to_rfc3339(),
        },
        Column::Name => row.name.clone(),
        Column::Amount => format_number(row.amount()),
        Column::VPaid => format_number(row.v_paid),
        Column::YPaid => format_number(row.y_paid),
        Column::Labels => row.labels_joined(),
        Column::Notes => row.notes.clone().unwrap_or_default(),
    }
}

/// Paid column belonging to a party, for actor-scoped filtering.
pub fn paid_column(party: Party) -> Column {
    match party {
        Party::V => Column::VPaid,
        Party::Y => Column::YPaid,
    }
}

fn format_number(value: f64) -> String {
    value.to_string()
}

fn coerce_number(text: &str) -> Result<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(0.0);
    }
    trimmed.parse::<f64>().map_err(|_| {
        TallyError::Validation(format!("Cannot compare \"{}\" numerically", text))
    })
}

fn loose_eq(a: &str, b: &str) -> bool {
    if let (Ok(x), Ok(y)) = (a.trim().parse::<f64>(), b.trim().parse::<f64>()) {
        return x == y;
    }
    a == b
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn row(name: &str, v_paid: f64, y_paid: f64, labels: &[&str]) -> ExpenseRow {
        ExpenseRow {
            row_index: 1,
            date: Utc.with_ymd_and_hms(2026, 1, 10, 12, 0, 0).unwrap(),
            name: name.to_string(),
            v_paid,
            y_paid,
            v_owes: (v_paid + y_paid) / 2.0,
            y_owes: (v_paid + y_paid) / 2.0,
            labels: labels.iter().map(|l| l.to_string()).collect(),
            notes: None,
            source_message_id: None,
        }
    }

    #[test]
    fn test_eq_tolerates_numeric_string_mismatch() {
        let cond = Condition::new(Column::Amount, CompareOp::Eq, "50");
        assert!(cond.matches(&row("Costco", 25.0, 25.0, &[])).unwrap());

        let cond = Condition::new(Column::Amount, CompareOp::Eq, 50.0);
        assert!(cond.matches(&row("Costco", 25.0, 25.0, &[])).unwrap());
    }

    #[test]
    fn test_ordering_coerces_numbers() {
        let expense = row("Costco", 30.0, 0.0, &[]);
        assert!(Condition::new(Column::VPaid, CompareOp::Gt, 20.0)
            .matches(&expense)
            .unwrap());
        assert!(!Condition::new(Column::VPaid, CompareOp::Le, 20.0)
            .matches(&expense)
            .unwrap());
    }

    #[test]
    fn test_ordering_on_text_is_validation_error() {
        let cond = Condition::new(Column::Name, CompareOp::Gt, 5.0);
        let err = cond.matches(&row("Costco", 1.0, 1.0, &[])).unwrap_err();
        assert!(matches!(err, TallyError::Validation(_)));
    }

    #[test]
    fn test_contains_is_case_insensitive() {
        let cond = Condition::new(Column::Name, CompareOp::Contains, "costco");
        assert!(cond.matches(&row("Costco Wholesale", 1.0, 1.0, &[])).unwrap());
    }

    #[test]
    fn test_missing_notes_match_as_empty() {
        let cond = Condition::new(Column::Notes, CompareOp::Contains, "x");
        assert!(!cond.matches(&row("Costco", 1.0, 1.0, &[])).unwrap());
    }

    #[test]
    fn test_inverse_negates() {
        let cond = Condition::new(Column::Name, CompareOp::Contains, "target").inverse();
        assert!(cond.matches(&row("Costco", 1.0, 1.0, &[])).unwrap());
    }

    #[test]
    fn test_in_membership() {
        let cond = Condition::new(
            Column::Name,
            CompareOp::In,
            CondValue::List(vec!["Costco".to_string(), "Target".to_string()]),
        );
        assert!(cond.matches(&row("Costco", 1.0, 1.0, &[])).unwrap());
        assert!(!cond.matches(&row("Walmart", 1.0, 1.0, &[])).unwrap());
    }

    #[test]
    fn test_in_requires_list() {
        let cond = Condition::new(Column::Name, CompareOp::In, "Costco");
        assert!(cond.matches(&row("Costco", 1.0, 1.0, &[])).is_err());
    }

    #[test]
    fn test_date_transforms() {
        let expense = row("Coffee", 5.0, 5.0, &[]);
        let month = Condition::new(Column::Date, CompareOp::Eq, "January")
            .with_transform(DateTransform::Month);
        assert!(month.matches(&expense).unwrap());

        let year =
            Condition::new(Column::Date, CompareOp::Eq, "2026").with_transform(DateTransform::Year);
        assert!(year.matches(&expense).unwrap());

        let weekday = Condition::new(Column::Date, CompareOp::Eq, "Saturday")
            .with_transform(DateTransform::Weekday);
        assert!(weekday.matches(&expense).unwrap());
    }

    #[test]
    fn test_date_contains_day_prefix() {
        // Delete-by-date matches on the YYYY-MM-DD prefix of the stored date.
        let cond = Condition::new(Column::Date, CompareOp::Contains, "2026-01-10");
        assert!(cond.matches(&row("Coffee", 5.0, 5.0, &[])).unwrap());
    }

    #[test]
    fn test_describe_trace() {
        let cond = Condition::new(Column::Labels, CompareOp::Contains, "groceries").inverse();
        assert_eq!(cond.describe(), "NOT Labels contains groceries");
    }

    #[test]
    fn test_condition_deserializes_classifier_shape() {
        let json = r#"{
            "column": "Date",
            "value": "January",
            "operation": "==",
            "transform": "month"
        }"#;
        let cond: Condition = serde_json::from_str(json).unwrap();
        assert_eq!(cond.column, Column::Date);
        assert_eq!(cond.operation, CompareOp::Eq);
        assert_eq!(cond.transform, Some(DateTransform::Month));
        assert!(!cond.is_inverse);
        assert!(!cond.since_last_settle_up);
    }
}
