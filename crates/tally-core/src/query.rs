//! Query engine: scoping, AND-composed filtering, row listing, and
//! grouped aggregation.
//!
//! Both query shapes start from the full ordered row set. If any
//! condition scopes to "since last settle-up", the set is truncated to
//! rows strictly after the last settlement marker before conditions run.

use std::collections::HashMap;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::condition::{column_text, Column, Condition, DateTransform};
use crate::error::{Result, TallyError};
use crate::storage::{ExpenseRow, LedgerStore};

/// Column an aggregation operates on. `Amount` is always derived from
/// the paid columns per row, never read from a stored field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggColumn {
    Amount,
    #[serde(rename = "v_paid")]
    VPaid,
    #[serde(rename = "y_paid")]
    YPaid,
    #[serde(rename = "v_owes")]
    VOwes,
    #[serde(rename = "y_owes")]
    YOwes,
}

impl AggColumn {
    fn as_str(self) -> &'static str {
        match self {
            AggColumn::Amount => "Amount",
            AggColumn::VPaid => "v_paid",
            AggColumn::YPaid => "y_paid",
            AggColumn::VOwes => "v_owes",
            AggColumn::YOwes => "y_owes",
        }
    }

    fn value_of(self, row: &ExpenseRow) -> f64 {
        match self {
            AggColumn::Amount => row.amount(),
            AggColumn::VPaid => row.v_paid,
            AggColumn::YPaid => row.y_paid,
            AggColumn::VOwes => row.v_owes,
            AggColumn::YOwes => row.y_owes,
        }
    }
}

/// Aggregation function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggFunc {
    Count,
    Sum,
    Avg,
    Median,
}

impl AggFunc {
    fn as_str(self) -> &'static str {
        match self {
            AggFunc::Count => "count",
            AggFunc::Sum => "sum",
            AggFunc::Avg => "avg",
            AggFunc::Median => "median",
        }
    }
}

/// One requested aggregation: column × function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregation {
    pub column: AggColumn,
    pub function: AggFunc,
}

impl Aggregation {
    pub fn new(column: AggColumn, function: AggFunc) -> Self {
        Self { column, function }
    }

    /// Name of the output column, e.g. `sum_Amount`.
    pub fn output_name(&self) -> String {
        format!("{}_{}", self.function.as_str(), self.column.as_str())
    }

    fn compute(&self, rows: &[&ExpenseRow]) -> f64 {
        if self.function == AggFunc::Count {
            return rows.len() as f64;
        }

        let values: Vec<f64> = rows.iter().map(|row| self.column.value_of(row)).collect();
        match self.function {
            AggFunc::Count => unreachable!(),
            AggFunc::Sum => values.iter().sum(),
            AggFunc::Avg => {
                if values.is_empty() {
                    0.0
                } else {
                    values.iter().sum::<f64>() / values.len() as f64
                }
            }
            AggFunc::Median => median(values),
        }
    }
}

fn median(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        (values[mid - 1] + values[mid]) / 2.0
    }
}

/// A grouping key: a plain column name, or `Column.transform` dot
/// notation (the transform part is only meaningful for Date).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupKey {
    text: String,
    column: Column,
    transform: Option<DateTransform>,
}

impl GroupKey {
    pub fn parse(text: &str) -> Result<GroupKey> {
        let (column, transform) = match text.split_once('.') {
            Some((col, transform)) => {
                (Column::parse(col)?, Some(DateTransform::parse(transform)?))
            }
            None => (Column::parse(text)?, None),
        };
        Ok(GroupKey {
            text: text.to_string(),
            column,
            transform,
        })
    }

    pub fn name(&self) -> &str {
        &self.text
    }

    fn value_for(&self, row: &ExpenseRow) -> String {
        column_text(row, self.column, self.transform)
    }
}

/// Parameters for a row-listing query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowsQuery {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Parameters for a grouped aggregation query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupedAggQuery {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub group_by: Vec<String>,
    #[serde(default)]
    pub aggregations: Vec<Aggregation>,
    #[serde(default)]
    pub order_by_agg_index: Option<usize>,
    #[serde(default = "default_order_desc")]
    pub order_desc: bool,
    #[serde(default)]
    pub limit: Option<usize>,
}

fn default_order_desc() -> bool {
    true
}

impl Default for GroupedAggQuery {
    fn default() -> Self {
        Self {
            conditions: Vec::new(),
            group_by: Vec::new(),
            aggregations: Vec::new(),
            order_by_agg_index: None,
            order_desc: true,
            limit: None,
        }
    }
}

/// Result of a row-listing query: most recent rows first.
#[derive(Debug, Clone, Serialize)]
pub struct RowsResult {
    pub rows: Vec<ExpenseRow>,
    pub filters_applied: Vec<String>,
    pub record_count: usize,
}

/// One output row of a grouped aggregation. Serializes as a flat map of
/// group-key values followed by named aggregates.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRow {
    pub keys: Vec<(String, String)>,
    pub aggregates: Vec<(String, f64)>,
}

impl GroupRow {
    pub fn aggregate(&self, name: &str) -> Option<f64> {
        self.aggregates
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    pub fn key(&self, name: &str) -> Option<&str> {
        self.keys
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

impl Serialize for GroupRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.keys.len() + self.aggregates.len()))?;
        for (name, value) in &self.keys {
            map.serialize_entry(name, value)?;
        }
        for (name, value) in &self.aggregates {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Result of a grouped aggregation query.
#[derive(Debug, Clone, Serialize)]
pub struct GroupedAggResult {
    pub results: Vec<GroupRow>,
    pub filters_applied: Vec<String>,
    pub group_by: Vec<String>,
    pub record_count: usize,
}

/// Truncate to rows strictly after the last settlement marker. With no
/// marker present the full set is returned.
pub(crate) fn after_last_settlement(mut rows: Vec<ExpenseRow>) -> Vec<ExpenseRow> {
    match rows.iter().rposition(|row| row.is_settle_marker()) {
        Some(pos) => rows.split_off(pos + 1),
        None => rows,
    }
}

fn scoped_and_filtered<S: LedgerStore + ?Sized>(
    store: &S,
    conditions: &[Condition],
) -> Result<(Vec<ExpenseRow>, Vec<String>)> {
    let mut rows = store.list_expenses()?;

    if conditions.iter().any(|c| c.since_last_settle_up) {
        rows = after_last_settlement(rows);
    }

    let mut filters_applied = Vec::with_capacity(conditions.len());
    for condition in conditions {
        let mut kept = Vec::with_capacity(rows.len());
        for row in rows {
            if condition.matches(&row)? {
                kept.push(row);
            }
        }
        rows = kept;
        filters_applied.push(condition.describe());
    }

    Ok((rows, filters_applied))
}

/// List rows matching all conditions, most recent first.
///
/// The result order is deterministic for a fixed ledger state:
/// descending row index.
pub fn query_rows<S: LedgerStore + ?Sized>(store: &S, query: &RowsQuery) -> Result<RowsResult> {
    let (mut rows, filters_applied) = scoped_and_filtered(store, &query.conditions)?;

    rows.reverse();
    if let Some(limit) = query.limit {
        rows.truncate(limit);
    }

    Ok(RowsResult {
        record_count: rows.len(),
        rows,
        filters_applied,
    })
}

/// Grouped aggregation over the scoped, filtered row set.
///
/// Groups preserve encounter order; `order_by_agg_index` applies a
/// stable sort on the chosen aggregate; `record_count` reports the
/// filtered set size before grouping.
pub fn query_grouped_agg<S: LedgerStore + ?Sized>(
    store: &S,
    query: &GroupedAggQuery,
) -> Result<GroupedAggResult> {
    let (rows, filters_applied) = scoped_and_filtered(store, &query.conditions)?;
    let record_count = rows.len();

    let keys: Vec<GroupKey> = query
        .group_by
        .iter()
        .map(|name| GroupKey::parse(name))
        .collect::<Result<_>>()?;

    let mut results: Vec<GroupRow> = Vec::new();

    if keys.is_empty() {
        if !rows.is_empty() {
            let refs: Vec<&ExpenseRow> = rows.iter().collect();
            results.push(GroupRow {
                keys: Vec::new(),
                aggregates: query
                    .aggregations
                    .iter()
                    .map(|agg| (agg.output_name(), agg.compute(&refs)))
                    .collect(),
            });
        }
    } else {
        let mut seen: HashMap<Vec<String>, usize> = HashMap::new();
        let mut groups: Vec<(Vec<String>, Vec<&ExpenseRow>)> = Vec::new();
        for row in &rows {
            let key: Vec<String> = keys.iter().map(|k| k.value_for(row)).collect();
            match seen.get(&key) {
                Some(&idx) => groups[idx].1.push(row),
                None => {
                    seen.insert(key.clone(), groups.len());
                    groups.push((key, vec![row]));
                }
            }
        }

        for (key_values, members) in groups {
            results.push(GroupRow {
                keys: keys
                    .iter()
                    .map(|k| k.name().to_string())
                    .zip(key_values)
                    .collect(),
                aggregates: query
                    .aggregations
                    .iter()
                    .map(|agg| (agg.output_name(), agg.compute(&members)))
                    .collect(),
            });
        }
    }

    if let Some(order_index) = query.order_by_agg_index {
        if !query.aggregations.is_empty() {
            if order_index >= query.aggregations.len() {
                return Err(TallyError::Validation(format!(
                    "order_by_agg_index {} is out of range ({} aggregations)",
                    order_index,
                    query.aggregations.len()
                )));
            }
            let name = query.aggregations[order_index].output_name();
            results.sort_by(|a, b| {
                let left = a.aggregate(&name).unwrap_or(0.0);
                let right = b.aggregate(&name).unwrap_or(0.0);
                let ordering = left.partial_cmp(&right).unwrap_or(std::cmp::Ordering::Equal);
                if query.order_desc {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }
    }

    if let Some(limit) = query.limit {
        results.truncate(limit);
    }

    Ok(GroupedAggResult {
        results,
        filters_applied,
        group_by: query.group_by.clone(),
        record_count,
    })
}
