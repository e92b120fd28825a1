use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, de};
use std::collections::BTreeMap;
use uuid::Uuid;

pub const DEFAULT_COLOR: &str = "#999999";

// One reserved stay, read from the calendar feed.
// Local wall-clock time (see Config::timezone)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Booking {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

// Free interval between two stays in which the house must be cleaned.
// Always arrival > departure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapWindow {
    pub departure: NaiveDateTime, // 10:00 on checkout day
    pub arrival: NaiveDateTime,   // 17:00 on next check-in day
}

impl GapWindow {
    pub fn duration(&self) -> Duration {
        self.arrival - self.departure
    }

    pub fn checkout_date(&self) -> NaiveDate {
        self.departure.date()
    }
}

// Persisted cleaning task.
// Field names on disk are kept from the planning files already in use.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(rename = "maison")]
    pub property_name: String,
    pub date: String, // "YYYY-MM-DD"
    #[serde(rename = "time")]
    pub scheduled_time: String, // "HH:MM"
    #[serde(rename = "duration")]
    pub duration_label: String, // "5j 7h"
    #[serde(rename = "color")]
    pub color_tag: String,
    #[serde(rename = "tempsMenage", default)]
    pub cleaning_minutes: u32,

    // user-owned, never overwritten by a sync
    #[serde(default)]
    pub done: bool,
    #[serde(rename = "employe", default)]
    pub assigned_staff: String,
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// A rental house ("maison") and its cleaning configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Property {
    #[serde(default = "new_id")]
    pub id: String,
    #[serde(rename = "nom")]
    pub name: String,
    #[serde(rename = "icsUrl", default, skip_serializing_if = "Option::is_none")]
    pub calendar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(
        rename = "tempsMenage",
        default,
        deserialize_with = "minutes_from_number_or_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub cleaning_minutes: Option<u32>,
}

// The house form saves "90" as often as 90; decimals are rounded.
fn minutes_from_number_or_text<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let minutes = match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => return Ok(None),
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => return Ok(None),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };

    match minutes {
        Some(m) if (0.0..=f64::from(u32::MAX)).contains(&m) => Ok(Some(m.round() as u32)),
        _ => Err(de::Error::custom("tempsMenage must be a non-negative number of minutes")),
    }
}

impl Property {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            calendar_url: None,
            color: None,
            cleaning_minutes: None,
        }
    }

    /// Calendar URL, if one is configured (blank counts as missing).
    pub fn calendar_url(&self) -> Option<&str> {
        self.calendar_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }

    pub fn color_tag(&self) -> String {
        match self.color.as_deref() {
            Some(c) if !c.is_empty() => c.to_string(),
            _ => DEFAULT_COLOR.to_string(),
        }
    }

    pub fn cleaning_minutes(&self) -> u32 {
        self.cleaning_minutes.unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Employee {
    #[serde(default = "new_id")]
    pub id: String,
    #[serde(rename = "nom")]
    pub name: String,
}

// staff name -> ordered task ids, for one day
pub type DayOrder = BTreeMap<String, Vec<String>>;

// date ("YYYY-MM-DD") -> DayOrder
pub type TaskOrders = BTreeMap<String, DayOrder>;
