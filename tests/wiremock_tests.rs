//! Integration tests for the calendar feed and the full sync pipeline,
//! with the upstream ICS server mocked by WireMock.

use std::{sync::Arc, time::Duration};

use maison_planning::{
    ics::{CalendarSource, FetchError, HttpCalendarSource},
    models::Property,
    store::{JsonTaskStore, Plannings, PropertyDirectory},
    sync::{Reconciler, SyncError, SyncOutcome},
};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

// =============================================================================
// Test Helpers
// =============================================================================

fn feed(stays: &[(&str, &str)]) -> String {
    let mut ics = String::from("BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//Airbnb Inc//Hosting Calendar//EN\r\n");
    for (i, (start, end)) in stays.iter().enumerate() {
        ics.push_str(&format!(
            "BEGIN:VEVENT\r\nUID:stay-{i}@example.com\r\nDTSTART;VALUE=DATE:{start}\r\nDTEND;VALUE=DATE:{end}\r\nSUMMARY:Reserved\r\nEND:VEVENT\r\n"
        ));
    }
    ics.push_str("END:VCALENDAR\r\n");
    ics
}

fn house(server: &MockServer, name: &str) -> Property {
    let mut p = Property::new(name);
    p.calendar_url = Some(format!("{}/{name}.ics", server.uri()));
    p.color = Some("#ff8800".to_string());
    p.cleaning_minutes = Some(90);
    p
}

fn source() -> HttpCalendarSource {
    HttpCalendarSource::new(Duration::from_millis(500), chrono_tz::Europe::Paris).unwrap()
}

async fn serve(server: &MockServer, route: &str, body: String) {
    server.reset().await;
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

// =============================================================================
// Feed fetching
// =============================================================================

#[tokio::test]
async fn fetches_and_parses_bookings() {
    let server = MockServer::start().await;
    serve(&server, "/villa.ics", feed(&[("20240301", "20240305"), ("20240310", "20240315")])).await;

    let bookings = source().fetch_bookings(&house(&server, "villa")).await.unwrap();
    assert_eq!(bookings.len(), 2);
}

#[tokio::test]
async fn server_error_is_a_fetch_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = source().fetch_bookings(&house(&server, "villa")).await.unwrap_err();
    assert!(matches!(err, FetchError::Status(500)));
}

#[tokio::test]
async fn slow_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(feed(&[]))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let err = source().fetch_bookings(&house(&server, "villa")).await.unwrap_err();
    match err {
        FetchError::Http(e) => assert!(e.is_timeout()),
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn html_page_is_rejected() {
    let server = MockServer::start().await;
    serve(&server, "/villa.ics", "<html><body>Please log in</body></html>".to_string()).await;

    let err = source().fetch_bookings(&house(&server, "villa")).await.unwrap_err();
    assert!(matches!(err, FetchError::Parse(_)));
}

// =============================================================================
// Full pipeline on disk
// =============================================================================

#[tokio::test]
async fn resync_on_disk_keeps_user_state_and_drops_cancelled_stays() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let plannings = Arc::new(Plannings::new(Arc::new(JsonTaskStore::new(dir.path()))));
    let reconciler = Reconciler::new(Arc::new(source()), Arc::clone(&plannings));
    let villa = house(&server, "villa");

    serve(
        &server,
        "/villa.ics",
        feed(&[("20240310", "20240315"), ("20240301", "20240305"), ("20240320", "20240322")]),
    )
    .await;
    assert_eq!(
        reconciler.reconcile(&villa).await.unwrap(),
        SyncOutcome::Synced { tasks: 2 }
    );

    let tasks = plannings.get("villa").await.unwrap();
    assert_eq!(tasks[0].id, "villa-2024-03-05-0");
    assert_eq!(tasks[0].date, "2024-03-05");
    assert_eq!(tasks[0].scheduled_time, "10:00");
    assert_eq!(tasks[0].duration_label, "5j 7h");
    assert_eq!(tasks[0].color_tag, "#ff8800");
    assert_eq!(tasks[0].cleaning_minutes, 90);
    assert_eq!(tasks[1].id, "villa-2024-03-15-1");

    plannings.set_done("villa", "villa-2024-03-05-0", true).await.unwrap();
    plannings.assign("villa", "villa-2024-03-05-0", "Alice").await.unwrap();

    // last stay cancelled upstream
    serve(&server, "/villa.ics", feed(&[("20240301", "20240305"), ("20240310", "20240315")])).await;
    reconciler.reconcile(&villa).await.unwrap();

    let tasks = plannings.get("villa").await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert!(tasks[0].done);
    assert_eq!(tasks[0].assigned_staff, "Alice");

    // unchanged feed: nothing moves
    reconciler.reconcile(&villa).await.unwrap();
    assert_eq!(plannings.get("villa").await.unwrap(), tasks);
}

#[tokio::test]
async fn one_broken_feed_does_not_stop_the_pass() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/villa.ics"))
        .respond_with(ResponseTemplate::new(200).set_body_string(feed(&[("20240301", "20240305"), ("20240310", "20240315")])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/mas.ics"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let houses = PropertyDirectory::new(dir.path());
    houses
        .save_all(&[house(&server, "mas"), Property::new("chalet"), house(&server, "villa")])
        .await
        .unwrap();

    let plannings = Arc::new(Plannings::new(Arc::new(JsonTaskStore::new(dir.path()))));
    let reconciler = Reconciler::new(Arc::new(source()), Arc::clone(&plannings));
    let report = reconciler.reconcile_all(&houses.list().await.unwrap()).await;

    assert!(matches!(report.get("mas"), Some(Err(SyncError::Fetch { .. }))));
    assert!(matches!(report.get("chalet"), Some(Ok(SyncOutcome::Skipped))));
    assert!(matches!(report.get("villa"), Some(Ok(SyncOutcome::Synced { tasks: 1 }))));

    assert!(dir.path().join("planning-villa.json").exists());
    assert!(!dir.path().join("planning-mas.json").exists());
    assert!(!dir.path().join("planning-chalet.json").exists());
}
