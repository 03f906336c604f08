use comfy_table::{presets::UTF8_FULL_CONDENSED, Table};

use tally_core::balance::Balance;
use tally_core::query::{GroupedAggResult, RowsResult};
use tally_core::storage::ExpenseRow;

pub fn rows_table(rows: &[ExpenseRow]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec![
        "ROW", "DATE", "NAME", "AMOUNT", "V_PAID", "Y_PAID", "LABELS", "NOTES",
    ]);
    for row in rows {
        table.add_row(vec![
            row.row_index.to_string(),
            row.date.format("%Y-%m-%d").to_string(),
            row.name.clone(),
            format!("{:.2}", row.amount()),
            format!("{:.2}", row.v_paid),
            format!("{:.2}", row.y_paid),
            row.labels_joined(),
            row.notes.clone().unwrap_or_default(),
        ]);
    }
    table
}

pub fn groups_table(result: &GroupedAggResult) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);

    if let Some(first) = result.results.first() {
        let mut header: Vec<String> = first.keys.iter().map(|(name, _)| name.clone()).collect();
        header.extend(first.aggregates.iter().map(|(name, _)| name.clone()));
        table.set_header(header);
    }

    for row in &result.results {
        let mut cells: Vec<String> = row.keys.iter().map(|(_, value)| value.clone()).collect();
        cells.extend(row.aggregates.iter().map(|(_, value)| format!("{:.2}", value)));
        table.add_row(cells);
    }
    table
}

pub fn rows_json(result: &RowsResult) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(result)?)
}

pub fn groups_json(result: &GroupedAggResult) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(result)?)
}

pub fn balance_lines(balance: &Balance) -> Vec<String> {
    let mut lines = vec![
        format!("V paid: ${:.2}", balance.v_paid_total),
        format!("Y paid: ${:.2}", balance.y_paid_total),
        format!("Total:  ${:.2}", balance.total),
    ];
    match balance.who_owes {
        Some(party) => lines.push(format!(
            "{} owes {} ${:.2}",
            party,
            party.other(),
            balance.amount_owed
        )),
        None => lines.push("All settled up.".to_string()),
    }
    lines
}
