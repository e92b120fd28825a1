/*
Gap extraction and task merge logic.
Module was independently written from HTTP / Axum / ICS for testing
*/

use std::collections::HashMap;

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::models::{Booking, GapWindow, Property, Task};

pub const TASK_TITLE: &str = "🧼 Ménage";
pub const DEPARTURE_HOUR: u32 = 10; // standard checkout
pub const ARRIVAL_HOUR: u32 = 17; // standard check-in
pub const SCHEDULED_TIME: &str = "10:00";

// Bookings of one house, sorted by start.
// Sorting is stable so equal starts keep their feed order.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    bookings: Vec<Booking>,
}

impl Timeline {
    pub fn from_unordered(mut bookings: Vec<Booking>) -> Self {
        bookings.sort_by_key(|b| b.start);
        Self { bookings }
    }

    pub fn bookings(&self) -> &[Booking] {
        &self.bookings
    }

    /// Gap windows between consecutive bookings, in order.
    ///
    /// The iterator is lazy and cheap to clone; calling `gaps()` again
    /// restarts it. Nothing is produced before the first booking or after
    /// the last one.
    pub fn gaps(&self) -> impl Iterator<Item = GapWindow> + Clone + '_ {
        self.bookings
            .windows(2)
            .filter_map(|pair| gap_between(&pair[0], &pair[1]))
    }
}

fn pinned(date: NaiveDate, hour: u32) -> Option<NaiveDateTime> {
    date.and_hms_opt(hour, 0, 0)
}

// Window between a stay and the next one.
// Overlapping or back-to-back stays (next.start <= current.end) get no
// cleaning task, and neither does a non-positive pinned duration.
pub fn gap_between(current: &Booking, next: &Booking) -> Option<GapWindow> {
    if next.start <= current.end {
        return None;
    }

    let departure = pinned(current.end.date(), DEPARTURE_HOUR)?;
    let arrival = pinned(next.start.date(), ARRIVAL_HOUR)?;

    if arrival - departure <= Duration::zero() {
        return None;
    }
    Some(GapWindow { departure, arrival })
}

// "Xj Yh" from whole hours of the gap (minutes are floored away).
pub fn format_duration(d: Duration) -> String {
    let total_hours = d.num_minutes() / 60;
    let days = total_hours / 24;
    let hours = total_hours % 24;
    format!("{days}j {hours}h")
}

// Merge key of a task. Index is the window position within one run.
pub fn task_id(property_name: &str, date: &str, index: usize) -> String {
    format!("{property_name}-{date}-{index}")
}

/// Fresh task for a window, with user fields at their defaults.
pub fn build_task(property: &Property, window: &GapWindow, index: usize) -> Task {
    let date = window.checkout_date().format("%Y-%m-%d").to_string();

    Task {
        id: task_id(&property.name, &date, index),
        title: TASK_TITLE.to_string(),
        property_name: property.name.clone(),
        date,
        scheduled_time: SCHEDULED_TIME.to_string(),
        duration_label: format_duration(window.duration()),
        color_tag: property.color_tag(),
        cleaning_minutes: property.cleaning_minutes(),
        done: false,
        assigned_staff: String::new(),
    }
}

/// Merge freshly computed tasks with the stored ones.
///
/// Rules:
/// - derived fields always come from `fresh`
/// - `done` / `assigned_staff` come from the stored task with the same id
/// - stored tasks whose id is not in `fresh` are dropped (orphans)
/// - output order is `fresh` order
pub fn merge_tasks(fresh: Vec<Task>, existing: &[Task]) -> Vec<Task> {
    let by_id: HashMap<&str, &Task> = existing.iter().map(|t| (t.id.as_str(), t)).collect();

    fresh
        .into_iter()
        .map(|mut task| {
            if let Some(old) = by_id.get(task.id.as_str()) {
                task.done = old.done;
                task.assigned_staff = old.assigned_staff.clone();
            }
            task
        })
        .collect()
}

/// Whole pipeline for one house: bookings -> windows -> merged tasks.
pub fn plan_tasks(property: &Property, bookings: Vec<Booking>, existing: &[Task]) -> Vec<Task> {
    let timeline = Timeline::from_unordered(bookings);
    let fresh: Vec<Task> = timeline
        .gaps()
        .enumerate()
        .map(|(i, w)| build_task(property, &w, i))
        .collect();

    merge_tasks(fresh, existing)
}
