use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

/// A database row as returned by the workspace API.
///
/// Properties are kept as raw JSON and read through the typed accessors
/// below; a missing or differently typed property reads as empty.
#[derive(Debug, Clone, Deserialize)]
pub struct Page {
    pub id: Uuid,
    pub created_time: DateTime<Utc>,
    pub last_edited_time: DateTime<Utc>,
    #[serde(default)]
    pub properties: HashMap<String, Value>,
}

/// The `date` property value: a start and an optional end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRange {
    pub start: String,
    pub end: Option<String>,
}

impl Page {
    fn prop(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn title(&self, name: &str) -> Option<String> {
        self.prop(name)
            .and_then(|p| p.get("title"))
            .and_then(join_plain_text)
    }

    pub fn select(&self, name: &str) -> Option<String> {
        self.named_option(name, "select")
    }

    pub fn status(&self, name: &str) -> Option<String> {
        self.named_option(name, "status")
    }

    pub fn multi_select(&self, name: &str) -> Vec<String> {
        self.prop(name)
            .and_then(|p| p.get("multi_select"))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// A `number` property, or the numeric result of a `formula`.
    pub fn number(&self, name: &str) -> Option<f64> {
        let prop = self.prop(name)?;
        prop.get("number")
            .and_then(Value::as_f64)
            .or_else(|| prop.get("formula")?.get("number")?.as_f64())
    }

    pub fn url(&self, name: &str) -> Option<String> {
        self.prop(name)
            .and_then(|p| p.get("url"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    pub fn unique_id(&self, name: &str) -> Option<i64> {
        self.prop(name)?.get("unique_id")?.get("number")?.as_i64()
    }

    pub fn relation(&self, name: &str) -> Vec<Uuid> {
        self.prop(name)
            .and_then(|p| p.get("relation"))
            .map(collect_ids)
            .unwrap_or_default()
    }

    pub fn people(&self, name: &str) -> Vec<Uuid> {
        self.prop(name)
            .and_then(|p| p.get("people"))
            .map(collect_ids)
            .unwrap_or_default()
    }

    /// Relation ids gathered from a `rollup` of relations.
    pub fn rollup_relation(&self, name: &str) -> Vec<Uuid> {
        self.rollup_array(name)
            .iter()
            .filter_map(|item| item.get("relation"))
            .flat_map(collect_ids)
            .collect()
    }

    /// First non-empty text in a `rollup` of title or rich-text values.
    pub fn rollup_text(&self, name: &str) -> Option<String> {
        self.rollup_array(name).iter().find_map(|item| {
            item.get("title")
                .or_else(|| item.get("rich_text"))
                .and_then(join_plain_text)
        })
    }

    pub fn date(&self, name: &str) -> Option<DateRange> {
        let date = self.prop(name)?.get("date")?;
        let start = date.get("start")?.as_str()?.to_string();
        let end = date
            .get("end")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        Some(DateRange { start, end })
    }

    fn named_option(&self, name: &str, kind: &str) -> Option<String> {
        self.prop(name)?
            .get(kind)?
            .get("name")?
            .as_str()
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    fn rollup_array(&self, name: &str) -> &[Value] {
        self.prop(name)
            .and_then(|p| p.get("rollup"))
            .and_then(|r| r.get("array"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

fn join_plain_text(fragments: &Value) -> Option<String> {
    let text: String = fragments
        .as_array()?
        .iter()
        .filter_map(|f| f.get("plain_text").and_then(Value::as_str))
        .collect();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn collect_ids(list: &Value) -> Vec<Uuid> {
    list.as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("id").and_then(Value::as_str))
                .filter_map(|id| Uuid::parse_str(id).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Parse a calendar date from either `2024-03-01` or a full timestamp.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let day = raw.get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/// Parse a timestamp; a bare date is read as midnight UTC.
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
}
