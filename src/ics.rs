//! Calendar feed adapter
//!
//! Downloads a house's iCalendar feed and turns its `VEVENT`s into bookings.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use icalendar::{Calendar, CalendarComponent, Component, Event, parser};
use thiserror::Error;
use tracing::debug;

use crate::models::{Booking, Property};

/// Calendar fetch errors
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no calendar URL configured for {0}")]
    NoCalendarUrl(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("calendar server answered {0}")]
    Status(u16),

    #[error("invalid calendar data: {0}")]
    Parse(String),
}

/// Source of raw bookings for a house
#[async_trait]
pub trait CalendarSource: Send + Sync {
    async fn fetch_bookings(&self, property: &Property) -> Result<Vec<Booking>, FetchError>;
}

/// Fetches ICS feeds over HTTP.
#[derive(Debug, Clone)]
pub struct HttpCalendarSource {
    client: reqwest::Client,
    timezone: Tz,
}

impl HttpCalendarSource {
    /// Every request is bounded by `timeout`; expiry surfaces as `FetchError::Http`.
    pub fn new(timeout: Duration, timezone: Tz) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, timezone })
    }
}

#[async_trait]
impl CalendarSource for HttpCalendarSource {
    async fn fetch_bookings(&self, property: &Property) -> Result<Vec<Booking>, FetchError> {
        let url = property
            .calendar_url()
            .ok_or_else(|| FetchError::NoCalendarUrl(property.name.clone()))?;

        debug!(property = %property.name, "downloading calendar");
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        parse_bookings(&body, self.timezone)
    }
}

/// Parse an iCalendar document into bookings (local wall-clock in `tz`).
///
/// Only `VEVENT`s are kept. Events without `DTSTART` are ignored; a missing
/// `DTEND` ends one day after an all-day start, or at the start itself.
pub fn parse_bookings(ics: &str, tz: Tz) -> Result<Vec<Booking>, FetchError> {
    // an HTML error page must never be read as "no bookings"
    if !ics.contains("BEGIN:VCALENDAR") {
        return Err(FetchError::Parse("missing BEGIN:VCALENDAR".to_string()));
    }

    let unfolded = parser::unfold(ics);
    let calendar: Calendar = unfolded
        .parse()
        .map_err(|e: String| FetchError::Parse(format!("iCalendar parse error: {e}")))?;

    let mut bookings = Vec::new();

    for component in &calendar.components {
        let CalendarComponent::Event(event) = component else {
            continue;
        };

        let Some((start, all_day)) = event_time(event, "DTSTART", tz) else {
            continue;
        };

        let end = match event_time(event, "DTEND", tz) {
            Some((end, _)) => end,
            None if all_day => start + chrono::Duration::days(1),
            None => start,
        };

        bookings.push(Booking { start, end });
    }

    Ok(bookings)
}

fn event_time(event: &Event, key: &str, tz: Tz) -> Option<(NaiveDateTime, bool)> {
    let property = event.properties().get(key)?;
    let source_tz = property.get_param_as("TZID", |v| v.trim_matches('"').parse::<Tz>().ok());
    parse_ical_time(property.value(), source_tz, tz)
}

// (local time, is date-only)
fn parse_ical_time(value: &str, source_tz: Option<Tz>, tz: Tz) -> Option<(NaiveDateTime, bool)> {
    let value = value.trim();

    if value.len() == 8 {
        let date = NaiveDate::parse_from_str(value, "%Y%m%d").ok()?;
        return Some((date.and_hms_opt(0, 0, 0)?, true));
    }

    if let Some(utc) = value.strip_suffix('Z') {
        let naive = NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S").ok()?;
        return Some((tz.from_utc_datetime(&naive).naive_local(), false));
    }

    let naive = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").ok()?;
    match source_tz {
        Some(source) => {
            let instant = source.from_local_datetime(&naive).earliest()?;
            Some((instant.with_timezone(&tz).naive_local(), false))
        }
        // floating: already wall-clock
        None => Some((naive, false)),
    }
}
