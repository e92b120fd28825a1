//! Cleaning planning for rental houses.
//!
//! Bookings come from each house's iCalendar feed; the gaps between stays
//! become cleaning tasks, merged into the stored planning so that what
//! staff entered (done, assignee) survives every resync.

pub mod app;
pub mod config;
pub mod ics; // Calendar feed -> bookings
pub mod logic; // Gap extraction and task merge
pub mod models; // Data structures (Booking, Task, Property, ...)
pub mod routes_maisons; // HTTP handlers for houses & staff
pub mod routes_planning; // HTTP handlers for plannings & sync
pub mod scheduler; // Recurring sync pass
pub mod store; // Persistent storage (JSON files)
pub mod sync; // Per-house reconciliation
