//! Rendering and staging files for CLI commands.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::api::{TransactionFilters, SORT_BY_TIMESTAMP, SORT_DESC};
use crate::models::{Account, Transaction, TransactionCount};

use super::args::{OutputFormat, TransactionArgs};

/// Parse `YYYY-MM-DD` (midnight UTC) or an RFC 3339 timestamp.
pub fn parse_date(value: &str, field: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Some(ts) = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Ok(ts.and_utc());
    }
    bail!("invalid {field} date format (use YYYY-MM-DD or RFC3339): {value}")
}

/// Resolve `--from`/`--to`/`--days` into a concrete range.
pub fn resolve_date_range(
    from: Option<&str>,
    to: Option<&str>,
    days: u32,
    now: DateTime<Utc>,
) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let back = |end: DateTime<Utc>| {
        Duration::try_days(i64::from(days))
            .and_then(|span| end.checked_sub_signed(span))
            .with_context(|| format!("--days {days} reaches before the earliest supported date"))
    };
    let (start, end) = match (from, to) {
        (Some(from), Some(to)) => (parse_date(from, "from")?, parse_date(to, "to")?),
        (Some(from), None) => (parse_date(from, "from")?, now),
        (None, Some(to)) => {
            let end = parse_date(to, "to")?;
            (back(end)?, end)
        }
        (None, None) => (back(now)?, now),
    };

    if start > end {
        bail!(
            "from date ({}) cannot be after to date ({})",
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d")
        );
    }
    Ok((start, end))
}

/// Filters for a `transactions` invocation.
///
/// `--detailed` starts from the preset and ignores the sort and include
/// switches; every other flag applies on top.
pub fn build_filters(args: &TransactionArgs, start: DateTime<Utc>, end: DateTime<Utc>) -> TransactionFilters {
    let mut filters = if args.detailed {
        TransactionFilters::detailed(
            start,
            end,
            args.category_id.as_deref(),
            args.subcategory_id.as_deref(),
        )
    } else {
        let mut filters = TransactionFilters::new()
            .sort(&args.sort_by, &args.sort_order)
            .date_range(Some(start), Some(end))
            .include_count_by(args.include_totals)
            .include_detailed(args.include_detailed)
            .or_category(args.or_category);
        if let Some(category) = &args.category_id {
            filters = filters.category_id(category);
        }
        if let Some(subcategory) = &args.subcategory_id {
            filters = filters.subcategory_id(subcategory);
        }
        filters
    };

    filters = filters.limit(args.limit);
    if let Some(period) = &args.count_by {
        filters = filters.count_by(period);
    }
    if let Some(time_filter) = &args.time_filter {
        filters = filters.time_filter(time_filter);
    }
    if let Some(include) = &args.include {
        filters = filters.include(include);
    }
    for account in &args.account_ids {
        filters = filters.account_id(account);
    }
    filters
}

fn is_advanced(args: &TransactionArgs) -> bool {
    args.time_filter.is_some()
        || args.category_id.is_some()
        || args.subcategory_id.is_some()
        || args.sort_by != SORT_BY_TIMESTAMP
        || args.sort_order != SORT_DESC
        || args.include_detailed
        || args.or_category
        || args.detailed
}

/// Name of the staging file for a fetch.
pub fn staging_file_name(
    args: &TransactionArgs,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> String {
    if !is_advanced(args) {
        let mut name = format!(
            "transactions_{}_to_{}",
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d")
        );
        if !args.account_ids.is_empty() {
            let _ = write!(name, "_account_{}", args.account_ids.join("-"));
        }
        return format!("{name}.json");
    }

    let mut parts = vec!["blend_transactions".to_string()];
    let label = match (&args.time_filter, args.detailed) {
        (Some(time_filter), _) => time_filter.clone(),
        (None, true) => "detailed".to_string(),
        (None, false) => "advanced".to_string(),
    };
    parts.push(label);
    if !args.account_ids.is_empty() {
        parts.push(format!("account-{}", args.account_ids.join("-")));
    }
    if let Some(category) = &args.category_id {
        parts.push(format!("cat-{category}"));
    }
    if let Some(subcategory) = &args.subcategory_id {
        parts.push(format!("subcat-{subcategory}"));
    }
    if args.sort_by != SORT_BY_TIMESTAMP {
        parts.push(format!("sort-{}", args.sort_by));
    }
    if args.sort_order != SORT_DESC {
        parts.push(args.sort_order.clone());
    }
    parts.push(now.format("%Y%m%d_%H%M%S").to_string());
    format!("{}.json", parts.join("_"))
}

#[derive(Debug, Serialize)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// Layout of a file written to the staging directory.
#[derive(Debug, Serialize)]
pub struct StagingFile<'a> {
    pub transactions: &'a [Transaction],
    pub counts: &'a [TransactionCount],
    pub fetched_at: DateTime<Utc>,
    pub date_range: DateRange,
    pub total_count: usize,
}

/// Write `file` as pretty JSON into `dir`, creating it if needed.
pub fn write_staging_file(dir: &Path, name: &str, file: &StagingFile<'_>) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create staging directory {}", dir.display()))?;
    let path = dir.join(name);
    let content = serde_json::to_string_pretty(file).context("Failed to serialize transactions")?;
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

fn clip(text: &str, width: usize) -> String {
    if text.chars().count() > width {
        let head: String = text.chars().take(width.saturating_sub(3)).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

fn csv_field(text: &str) -> String {
    text.replace(',', ";")
}

/// Render accounts in the requested format.
pub fn render_accounts(accounts: &[Account], format: OutputFormat) -> Result<String> {
    let mut out = String::new();
    match format {
        OutputFormat::Table => {
            let _ = writeln!(
                out,
                "{:<36} | {:<33} | {:<19} | {:<7} | {:>14} | {:<16}",
                "ID", "Holder Name", "Bank", "Type", "Balance", "Last Updated"
            );
            let _ = writeln!(out, "{}", "-".repeat(140));
            for account in accounts {
                let updated = account
                    .last_fetched_at
                    .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                let _ = writeln!(
                    out,
                    "{:<36} | {:<33} | {:<19} | {:<7} | {:>10.2} {:<3} | {}",
                    account.uuid,
                    clip(&account.holder_name, 33),
                    clip(account.display_name(), 19),
                    account.kind,
                    account.current_balance,
                    account.currency,
                    updated
                );
            }
        }
        OutputFormat::Json => {
            out = serde_json::to_string_pretty(accounts).context("Failed to serialize accounts")?;
            out.push('\n');
        }
        OutputFormat::Csv => {
            let _ = writeln!(
                out,
                "ID,HolderName,Bank,Type,Balance,Currency,MaskedAccount,IFSC,LastUpdate"
            );
            for account in accounts {
                let updated = account
                    .last_fetched_at
                    .map(|ts| ts.format("%Y-%m-%dT%H:%M:%SZ").to_string())
                    .unwrap_or_default();
                let _ = writeln!(
                    out,
                    "{},{},{},{},{:.2},{},{},{},{}",
                    account.uuid,
                    csv_field(&account.holder_name),
                    csv_field(&account.financial_information_provider.name),
                    account.kind,
                    account.current_balance,
                    account.currency,
                    account.masked_account_number,
                    account.ifsc_code,
                    updated
                );
            }
        }
    }
    Ok(out)
}

/// One line per aggregation period.
pub fn render_counts(counts: &[TransactionCount]) -> String {
    counts
        .iter()
        .map(|c| {
            format!(
                "{}: {:.2} in ({} txns), {:.2} out ({} txns)\n",
                c.date, c.total_incoming, c.incoming_count, c.total_outgoing, c.outgoing_count
            )
        })
        .collect()
}

/// The first `limit` transactions, newest data as returned by the server.
pub fn render_transaction_preview(transactions: &[Transaction], limit: usize) -> String {
    let mut out = String::new();
    for txn in transactions.iter().take(limit) {
        let date = txn
            .txn_timestamp
            .map(|ts| ts.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "{:<10}  {:<40}  {:>12.2} {}",
            date,
            clip(txn.display_name(), 40),
            txn.signed_amount(),
            txn.currency
        );
    }
    if transactions.len() > limit {
        let _ = writeln!(out, "... and {} more", transactions.len() - limit);
    }
    out
}

/// `1h 23m` style rendering of a remaining lifetime.
pub fn format_remaining(remaining: Duration) -> String {
    let minutes = remaining.num_minutes().max(0);
    match (minutes / 60, minutes % 60) {
        (0, m) => format!("{m}m"),
        (h, m) => format!("{h}h {m}m"),
    }
}
