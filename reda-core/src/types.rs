//! Domain types for project reconciliation.
//!
//! Wire records mirror the REDA integration API payloads. Every wire field is
//! optional: the API omits or nulls fields freely, and numeric fields are
//! sometimes sent as strings.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Display name of a real-estate project. Doubles as the destination tab title.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectName(pub String);

impl fmt::Display for ProjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ProjectName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProjectName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Configuration-level types
// ---------------------------------------------------------------------------

/// A configured project: display name plus the numeric id the source API knows it by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRef {
    pub name: ProjectName,
    pub id: u32,
}

impl ProjectRef {
    pub fn new(name: impl Into<String>, id: u32) -> Self {
        Self {
            name: ProjectName(name.into()),
            id,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire records
// ---------------------------------------------------------------------------

/// One unit from the inventory endpoint.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct InventoryRecord {
    #[serde(rename = "nombreUnidad", default, deserialize_with = "lenient_string")]
    pub unit_name: Option<String>,
    #[serde(rename = "estatus", default, deserialize_with = "lenient_string")]
    pub status: Option<String>,
    #[serde(rename = "m2", default, deserialize_with = "lenient_number")]
    pub area: Option<f64>,
    #[serde(rename = "precio", default, deserialize_with = "lenient_number")]
    pub price: Option<f64>,
    #[serde(rename = "fechaBloqueo", default, deserialize_with = "lenient_string")]
    pub lock_date: Option<String>,
    #[serde(rename = "fechaFormalizado", default, deserialize_with = "lenient_string")]
    pub formalized_date: Option<String>,
}

/// One sale from the funding endpoint.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FundingRecord {
    #[serde(rename = "unidad", default, deserialize_with = "lenient_string")]
    pub unit_name: Option<String>,
    #[serde(rename = "cobrado", default, deserialize_with = "lenient_number")]
    pub amount_collected: Option<f64>,
}

// ---------------------------------------------------------------------------
// Derived rows
// ---------------------------------------------------------------------------

/// A date column value: either `dd/mm/yyyy` or the integer sentinel `0`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DisplayDate {
    Date(String),
    #[default]
    Absent,
}

impl Serialize for DisplayDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DisplayDate::Date(text) => serializer.serialize_str(text),
            DisplayDate::Absent => serializer.serialize_i64(0),
        }
    }
}

impl fmt::Display for DisplayDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayDate::Date(text) => f.write_str(text),
            DisplayDate::Absent => f.write_str("0"),
        }
    }
}

/// One reconciled unit, ready to publish. Lives only for the duration of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedRow {
    pub project: String,
    pub unit_name: String,
    pub status: String,
    pub area: f64,
    pub price: f64,
    pub lock_date: DisplayDate,
    pub formalized_date: DisplayDate,
    pub amount_collected: f64,
}

// ---------------------------------------------------------------------------
// Lenient field decoding
// ---------------------------------------------------------------------------

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
