//! Join inventory with funding records on a normalized unit key.
//!
//! ## Field defaults
//!
//! | column          | source                       | when absent |
//! |-----------------|------------------------------|-------------|
//! | unit / status   | inventory `nombreUnidad` / `estatus` | `"N/A"` |
//! | area / price    | inventory `m2` / `precio`    | `0`         |
//! | lock / formal.  | inventory dates, `dd/mm/yyyy` | `0`        |
//! | amount collected| matched funding `cobrado`    | `0`         |

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use reda_core::types::{DisplayDate, FundingRecord, InventoryRecord, MergedRow, ProjectName};

const NOT_AVAILABLE: &str = "N/A";

/// Canonical join key: trimmed and lower-cased. Absent input yields `""`.
pub fn normalize_key(unit: Option<&str>) -> String {
    unit.map(|u| u.trim().to_lowercase()).unwrap_or_default()
}

/// Render a timestamp-like value as `dd/mm/yyyy`, or the `0` sentinel.
///
/// RFC 3339 values keep the calendar date of their own offset, so
/// `2024-03-05T00:00:00Z` renders as `05/03/2024` regardless of host timezone.
pub fn format_date(raw: Option<&str>) -> DisplayDate {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return DisplayDate::Absent;
    };
    match parse_calendar_date(raw) {
        Ok(date) => DisplayDate::Date(date.format("%d/%m/%Y").to_string()),
        Err(err) => {
            tracing::debug!("unparsable date {raw:?}: {err}");
            DisplayDate::Absent
        }
    }
}

fn parse_calendar_date(raw: &str) -> Result<NaiveDate, chrono::ParseError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.date_naive());
    }
    // Offsets written without a colon, e.g. `+0000`.
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Ok(ts.date_naive());
    }
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(ts.date());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y/%m/%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
}

/// Merge one project's collections: exactly one row per inventory record, in
/// inventory order.
///
/// Funding records without a unit are dropped; for duplicate keys the last
/// record wins.
pub fn reconcile(
    project: &ProjectName,
    inventory: &[InventoryRecord],
    funding: &[FundingRecord],
) -> Vec<MergedRow> {
    let mut by_unit: HashMap<String, &FundingRecord> = HashMap::with_capacity(funding.len());
    for record in funding {
        let key = normalize_key(record.unit_name.as_deref());
        if key.is_empty() {
            continue;
        }
        by_unit.insert(key, record);
    }

    inventory
        .iter()
        .map(|inv| {
            let key = normalize_key(inv.unit_name.as_deref());
            let matched = if key.is_empty() { None } else { by_unit.get(&key) };

            MergedRow {
                project: project.0.clone(),
                unit_name: text_or_na(inv.unit_name.as_deref()),
                status: text_or_na(inv.status.as_deref()),
                area: inv.area.unwrap_or(0.0),
                price: inv.price.unwrap_or(0.0),
                lock_date: format_date(inv.lock_date.as_deref()),
                formalized_date: format_date(inv.formalized_date.as_deref()),
                amount_collected: matched
                    .and_then(|record| record.amount_collected)
                    .unwrap_or(0.0),
            }
        })
        .collect()
}

fn text_or_na(value: Option<&str>) -> String {
    match value {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => NOT_AVAILABLE.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
