use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::json;
use uuid::Uuid;

use tally_core::balance::{get_balance, settle_balance};
use tally_core::condition::{Column, CompareOp, Condition, DateTransform};
use tally_core::dispatch::{Confirmed, RequestContext};
use tally_core::error::TallyError;
use tally_core::intent::{DeleteExpenseArgs, DeleteMode, EditExpenseArgs, Intent, LogExpenseArgs};
use tally_core::query::{
    query_grouped_agg, query_rows, AggColumn, AggFunc, Aggregation, GroupedAggQuery, RowsQuery,
};
use tally_core::storage::{Party, SqliteStore};

use crate::app::open_dispatcher;
use crate::cli::{
    BalanceArgs, Cli, ConfirmArgs, DeleteArgs, EditArgs, InitArgs, ListArgs, LogArgs, SettleArgs,
    StatsArgs,
};
use crate::config::default_ledger_path;
use crate::output::{balance_lines, groups_json, groups_table, rows_json, rows_table};

pub fn handle_init(cli: &Cli, args: &InitArgs) -> anyhow::Result<()> {
    let target = match args.path.clone().or(cli.ledger.clone()) {
        Some(path) => path,
        None => default_ledger_path()?.to_string_lossy().to_string(),
    };

    if let Some(parent) = Path::new(&target).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    SqliteStore::open(Path::new(&target))?;

    if !cli.quiet {
        println!("Initialized ledger at {}", target);
    }
    Ok(())
}

pub fn handle_log(cli: &Cli, args: &LogArgs) -> anyhow::Result<()> {
    let (v_paid, y_paid) = match (args.v_paid, args.y_paid) {
        (Some(v), Some(y)) => (v, y),
        (Some(v), None) => (v, args.amount - v),
        (None, Some(y)) => (args.amount - y, y),
        (None, None) => (args.amount / 2.0, args.amount / 2.0),
    };

    let date = match &args.date {
        Some(value) => Some(parse_datetime(value)?),
        None => None,
    };

    let intent = Intent::LogExpense(LogExpenseArgs {
        date,
        name: args.name.clone(),
        amount: args.amount,
        v_paid,
        y_paid,
        share: args.share,
        labels: args.label.clone(),
        notes: args.notes.clone(),
        source_message_id: None,
    });

    let mut dispatcher = open_dispatcher(cli)?;
    let outcome = dispatcher.execute(Some(intent), &RequestContext::default());
    if !outcome.success {
        return Err(anyhow::anyhow!(outcome_error(&outcome.result)));
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome.result)?);
    } else if !cli.quiet {
        println!(
            "Logged ${:.2} at {} (row {})",
            args.amount, args.name, outcome.result["row_index"]
        );
    }
    Ok(())
}

pub fn handle_list(cli: &Cli, args: &ListArgs) -> anyhow::Result<()> {
    let query = RowsQuery {
        conditions: build_conditions(
            &args.merchant,
            &args.label,
            &args.month,
            &args.year,
            args.since_settle,
        ),
        limit: args.limit,
    };

    let dispatcher = open_dispatcher(cli)?;
    let result = query_rows(dispatcher.store(), &query).map_err(core_err)?;

    if args.json {
        println!("{}", rows_json(&result)?);
    } else {
        if !cli.quiet && !result.filters_applied.is_empty() {
            println!("Filters: {}", result.filters_applied.join(" AND "));
        }
        println!("{}", rows_table(&result.rows));
    }
    Ok(())
}

pub fn handle_stats(cli: &Cli, args: &StatsArgs) -> anyhow::Result<()> {
    let aggregations = args
        .agg
        .iter()
        .map(|raw| parse_aggregation(raw))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let query = GroupedAggQuery {
        conditions: build_conditions(
            &args.merchant,
            &args.label,
            &args.month,
            &None,
            args.since_settle,
        ),
        group_by: args.group_by.clone(),
        aggregations,
        order_by_agg_index: args.order_by,
        order_desc: !args.asc,
        limit: args.limit,
    };

    let dispatcher = open_dispatcher(cli)?;
    let result = query_grouped_agg(dispatcher.store(), &query).map_err(core_err)?;

    if args.json {
        println!("{}", groups_json(&result)?);
    } else if result.results.is_empty() {
        println!("No matching expenses.");
    } else {
        if !cli.quiet && !result.filters_applied.is_empty() {
            println!("Filters: {}", result.filters_applied.join(" AND "));
        }
        println!("{}", groups_table(&result));
        if !cli.quiet {
            println!("({} records)", result.record_count);
        }
    }
    Ok(())
}

pub fn handle_balance(cli: &Cli, args: &BalanceArgs) -> anyhow::Result<()> {
    let dispatcher = open_dispatcher(cli)?;
    let balance = get_balance(dispatcher.store()).map_err(core_err)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&balance)?);
    } else {
        for line in balance_lines(&balance) {
            println!("{}", line);
        }
    }
    Ok(())
}

pub fn handle_settle(cli: &Cli, args: &SettleArgs) -> anyhow::Result<()> {
    let mut dispatcher = open_dispatcher(cli)?;
    let outcome = settle_balance(dispatcher.store_mut()).map_err(core_err)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else if outcome.settled {
        let payer = outcome.payer.expect("settled outcome has a payer");
        println!(
            "Recorded settlement: {} paid {} ${:.2}",
            payer,
            payer.other(),
            outcome.amount
        );
    } else {
        println!("{}", outcome.message.unwrap_or_default());
    }
    Ok(())
}

pub fn handle_delete(cli: &Cli, args: &DeleteArgs) -> anyhow::Result<()> {
    let (delete_mode, date, merchant) = if args.last {
        (DeleteMode::Last, None, None)
    } else if let Some(value) = &args.date {
        (DeleteMode::ByDate, Some(parse_datetime(value)?), None)
    } else if let Some(merchant) = &args.merchant {
        (DeleteMode::ByMerchant, None, Some(merchant.clone()))
    } else {
        return Err(anyhow::anyhow!(
            "Choose a delete mode: --last, --date, or --merchant"
        ));
    };

    let actor = args.actor.as_deref().map(parse_party).transpose()?;

    let mut dispatcher = open_dispatcher(cli)?;
    let proposal = dispatcher
        .propose_delete(
            &DeleteExpenseArgs {
                delete_mode,
                date,
                merchant,
            },
            actor,
        )
        .map_err(core_err)?;

    let token = Uuid::new_v4().to_string();
    dispatcher
        .register_pending_delete(&token, &proposal)
        .map_err(core_err)?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "token": token,
                "proposal": proposal,
            }))?
        );
    } else {
        if proposal.candidates.len() == 1 {
            println!("Delete this expense?");
        } else {
            println!("Which expense to delete?");
        }
        for candidate in &proposal.candidates {
            println!(
                "  ${:.2} at {} ({}) → code '{}'",
                candidate.row.amount(),
                candidate.row.name,
                candidate.row.date.format("%Y-%m-%d"),
                candidate.code
            );
        }
        println!("Confirm with: tally confirm {} <code>", token);
    }
    Ok(())
}

pub fn handle_edit(cli: &Cli, args: &EditArgs) -> anyhow::Result<()> {
    let edit = EditExpenseArgs {
        new_amount: args.amount,
        new_v_paid: args.v_paid,
        new_y_paid: args.y_paid,
        new_merchant: args.merchant.clone(),
    };

    let mut dispatcher = open_dispatcher(cli)?;
    let staging = dispatcher
        .stage_edit_for_row(args.row_index, &edit)
        .map_err(core_err)?;

    let token = Uuid::new_v4().to_string();
    dispatcher
        .register_pending_edit(&token, &staging)
        .map_err(core_err)?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "token": token,
                "staging": staging,
            }))?
        );
    } else {
        let new_v = staging.updates.v_paid.unwrap_or(staging.original.v_paid);
        let new_y = staging.updates.y_paid.unwrap_or(staging.original.y_paid);
        let new_name = staging
            .updates
            .name
            .clone()
            .unwrap_or_else(|| staging.original.name.clone());
        println!(
            "Edit row {}: ${:.2} at {} → ${:.2} at {}",
            staging.row_index,
            staging.original.amount(),
            staging.original.name,
            new_v + new_y,
            new_name
        );
        println!(
            "Confirm with: tally confirm {} {}",
            token, staging.code
        );
    }
    Ok(())
}

pub fn handle_confirm(cli: &Cli, args: &ConfirmArgs) -> anyhow::Result<()> {
    let mut dispatcher = open_dispatcher(cli)?;
    let confirmed = dispatcher
        .confirm(&args.token, &args.code.to_lowercase())
        .map_err(core_err)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&confirmed)?);
        return Ok(());
    }

    match confirmed {
        Confirmed::Deleted(row) => {
            if !cli.quiet {
                println!("Deleted ${:.2} at {}", row.amount(), row.name);
            }
        }
        Confirmed::Edited(row) => {
            if !cli.quiet {
                println!("Updated {}: now ${:.2}", row.name, row.amount());
            }
        }
    }
    Ok(())
}

fn build_conditions(
    merchant: &Option<String>,
    label: &Option<String>,
    month: &Option<String>,
    year: &Option<String>,
    since_settle: bool,
) -> Vec<Condition> {
    let mut conditions = Vec::new();
    if let Some(merchant) = merchant {
        conditions.push(Condition::new(
            Column::Name,
            CompareOp::Contains,
            merchant.clone(),
        ));
    }
    if let Some(label) = label {
        conditions.push(Condition::new(
            Column::Labels,
            CompareOp::Contains,
            label.clone(),
        ));
    }
    if let Some(month) = month {
        conditions.push(
            Condition::new(Column::Date, CompareOp::Eq, month.clone())
                .with_transform(DateTransform::Month),
        );
    }
    if let Some(year) = year {
        conditions.push(
            Condition::new(Column::Date, CompareOp::Eq, year.clone())
                .with_transform(DateTransform::Year),
        );
    }
    if since_settle {
        // Row-set scope flag; the always-true predicate carries it.
        conditions.push(Condition::new(Column::Amount, CompareOp::Ge, 0.0).since_last_settle_up());
    }
    conditions
}

fn parse_aggregation(raw: &str) -> anyhow::Result<Aggregation> {
    let (function, column) = raw
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("Invalid aggregation \"{}\" (use function:column)", raw))?;

    let function = match function {
        "count" => AggFunc::Count,
        "sum" => AggFunc::Sum,
        "avg" => AggFunc::Avg,
        "median" => AggFunc::Median,
        other => {
            return Err(anyhow::anyhow!(
                "Invalid aggregation function: {} (use count/sum/avg/median)",
                other
            ))
        }
    };
    let column = match column {
        "Amount" => AggColumn::Amount,
        "v_paid" => AggColumn::VPaid,
        "y_paid" => AggColumn::YPaid,
        "v_owes" => AggColumn::VOwes,
        "y_owes" => AggColumn::YOwes,
        other => return Err(anyhow::anyhow!("Invalid aggregation column: {}", other)),
    };
    Ok(Aggregation::new(column, function))
}

fn parse_party(value: &str) -> anyhow::Result<Party> {
    match value.to_lowercase().as_str() {
        "v" => Ok(Party::V),
        "y" => Ok(Party::Y),
        other => Err(anyhow::anyhow!("Unknown party: {} (use v or y)", other)),
    }
}

fn parse_datetime(value: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        let naive = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| anyhow::anyhow!("Invalid date value: {}", value))?;
        return Ok(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc));
    }

    Err(anyhow::anyhow!(
        "Invalid date/time (expected ISO-8601 or YYYY-MM-DD): {}",
        value
    ))
}

fn outcome_error(result: &serde_json::Value) -> String {
    result
        .get("error")
        .and_then(|v| v.as_str())
        .unwrap_or("Intent execution failed")
        .to_string()
}

fn core_err(err: TallyError) -> anyhow::Error {
    anyhow::anyhow!("{}", err)
}
