use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::projection::{Notifiable, SyncRecord};

/// An edit made later than this after creation is announced as an update.
const UPDATE_GRACE_MINUTES: i64 = 5;

/// Periods at least this long mention their length in the announcement.
const LONG_PERIOD_DAYS: i64 = 5;

const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AbsenceCategory {
    Vacation,
    DayOff,
    ForceMajeure,
    SickLeave,
}

impl AbsenceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vacation => "vacation",
            Self::DayOff => "day_off",
            Self::ForceMajeure => "force_majeure",
            Self::SickLeave => "sick_leave",
        }
    }

    fn human(&self) -> &'static str {
        match self {
            Self::Vacation => "vacation",
            Self::DayOff => "a day off",
            Self::ForceMajeure => "force majeure",
            Self::SickLeave => "sick leave",
        }
    }
}

impl FromStr for AbsenceCategory {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "vacation" => Ok(Self::Vacation),
            "day_off" => Ok(Self::DayOff),
            "force_majeure" => Ok(Self::ForceMajeure),
            "sick_leave" => Ok(Self::SickLeave),
            _ => Err(format!("unknown absence category: {value}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Absence {
    pub id: Uuid,
    pub employee_id: Option<Uuid>,
    pub employee_name: Option<String>,
    pub category: AbsenceCategory,
    pub period_start: NaiveDate,
    /// `None` for a single-day absence.
    pub period_end: Option<NaiveDate>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_edited_at: DateTime<Utc>,
    pub notified: bool,
}

impl Absence {
    pub fn is_single_day(&self) -> bool {
        self.period_end.map_or(true, |end| end == self.period_start)
    }

    /// Calendar days covered, both ends included.
    pub fn total_days(&self) -> i64 {
        match self.period_end {
            Some(end) if end > self.period_start => (end - self.period_start).num_days() + 1,
            _ => 1,
        }
    }

    fn is_update(&self) -> bool {
        self.last_edited_at - self.created_at > Duration::minutes(UPDATE_GRACE_MINUTES)
    }

    fn when(&self) -> String {
        match self.period_end {
            Some(end) if !self.is_single_day() => {
                format!("from {} to {}", format_day(self.period_start), format_day(end))
            }
            _ => format!("on {}", format_day(self.period_start)),
        }
    }

    fn details(&self) -> Option<String> {
        let mut parts = Vec::new();
        if self.total_days() >= LONG_PERIOD_DAYS {
            parts.push(format!("{} days", self.total_days()));
        }
        if let Some(reason) = self.reason.as_deref().map(str::trim) {
            if !reason.is_empty() {
                parts.push(reason.to_string());
            }
        }
        (!parts.is_empty()).then(|| parts.join(", "))
    }
}

/// "3 March" style rendering.
pub fn format_day(date: NaiveDate) -> String {
    format!("{} {}", date.day(), MONTHS[date.month0() as usize])
}

impl SyncRecord for Absence {
    fn record_id(&self) -> Uuid {
        self.id
    }

    fn last_edited_at(&self) -> DateTime<Utc> {
        self.last_edited_at
    }
}

impl Notifiable for Absence {
    fn notification_message(&self) -> String {
        let who = self.employee_name.as_deref().unwrap_or("An employee");
        let when = self.when();

        let mut msg = match (self.category, self.is_update()) {
            (AbsenceCategory::ForceMajeure, false) => {
                format!("{who} has a force majeure and will be absent {when}")
            }
            (AbsenceCategory::ForceMajeure, true) => {
                format!("{who} updates force majeure: will be absent {when}")
            }
            (category, false) => format!("{who} takes {} {when}", category.human()),
            (category, true) => format!("{who} updates {} {when}", category.human()),
        };

        if let Some(details) = self.details() {
            msg.push_str(&format!(" ({details})"));
        }
        msg
    }
}

/// Absences of one employee (optional) overlapping `[from, to]`.
#[derive(Debug, Clone, Default)]
pub struct AbsenceFilter {
    pub employee_id: Option<Uuid>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub notified: Option<bool>,
    pub limit: Option<i64>,
}
