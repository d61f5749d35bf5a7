mod common;

use anyhow::Result;
use axum::http::StatusCode;
use chrono::{Duration, NaiveDateTime, Utc};
use common::{acquire_db_lock, body_to_json, TestApp};
use diesel::prelude::*;
use serde_json::json;
use unioncase::scheduler::{run_deadline_sweep, run_trial_sweep};
use unioncase::subscription::SubscriptionStatus;
use uuid::Uuid;

/// Files a grievance whose single `informal_step_a` deadline lands
/// `incident + 14` days out; back-dating the incident steers the deadline
/// relative to now.
async fn file_with_deadline_days_ago(app: &TestApp, token: &str, days_ago: i64) -> Result<Uuid> {
    let incident = Utc::now().date_naive() - Duration::days(14 + days_ago);
    let response = app
        .post_json(
            "/api/grievances",
            &json!({
                "grievantName": "Jo Carrier",
                "facility": "Main Post Office",
                "craft": "city_carrier",
                "incidentDate": incident.to_string(),
                "contractArticle": "Article 8",
                "violationType": "overtime_bypass",
                "briefDescription": "Mandated off the OTDL",
                "detailedDescription": "Management bypassed the overtime desired list."
            }),
            Some(token),
        )
        .await?;
    anyhow::ensure!(
        response.status() == StatusCode::CREATED,
        "create failed with status {}",
        response.status()
    );
    let body = body_to_json(response.into_body()).await?;
    Ok(body["grievance"]["id"].as_str().unwrap().parse()?)
}

async fn notification_rows(app: &TestApp, kind: &str) -> Result<i64> {
    let kind = kind.to_string();
    app.with_conn(move |conn| {
        use unioncase::schema::notifications::dsl::*;
        Ok(notifications
            .filter(notification_type.eq(&kind))
            .count()
            .get_result(conn)?)
    })
    .await
}

async fn dedup_row(app: &TestApp) -> Result<(i32, Option<NaiveDateTime>)> {
    app.with_conn(|conn| {
        use unioncase::schema::sent_notifications::dsl::*;
        Ok(sent_notifications
            .select((attempts, delivered_at))
            .first(conn)?)
    })
    .await
}

#[tokio::test]
async fn a_deadline_due_today_is_reminded_exactly_once() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    app.insert_user("due@example.com", "password1", "employee")
        .await?;
    let token = app.login_token("due@example.com", "password1").await?;
    file_with_deadline_days_ago(&app, &token, 0).await?;

    let stats = run_deadline_sweep(&app.state).await?;
    assert_eq!(stats.dispatched, 1);
    assert_eq!(app.dispatch().count_of_kind("deadline_reminder").await, 1);
    assert_eq!(notification_rows(&app, "deadline_reminder").await?, 1);

    // second sweep in the same process: the claim holds
    let stats = run_deadline_sweep(&app.state).await?;
    assert_eq!(stats.dispatched, 0);
    assert_eq!(app.dispatch().count_of_kind("deadline_reminder").await, 1);
    assert_eq!(notification_rows(&app, "deadline_reminder").await?, 1);

    Ok(())
}

#[tokio::test]
async fn an_overdue_deadline_alerts_exactly_once() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    app.insert_user("late@example.com", "password1", "employee")
        .await?;
    let token = app.login_token("late@example.com", "password1").await?;
    file_with_deadline_days_ago(&app, &token, 2).await?;

    let stats = run_deadline_sweep(&app.state).await?;
    assert_eq!(stats.dispatched, 1);
    assert_eq!(app.dispatch().count_of_kind("deadline_overdue").await, 1);
    assert_eq!(app.dispatch().count_of_kind("deadline_reminder").await, 0);

    let stats = run_deadline_sweep(&app.state).await?;
    assert_eq!(stats.dispatched, 0);
    assert_eq!(app.dispatch().count_of_kind("deadline_overdue").await, 1);

    Ok(())
}

#[tokio::test]
async fn disabled_preferences_suppress_reminders() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    app.insert_user("quiet@example.com", "password1", "employee")
        .await?;
    let token = app.login_token("quiet@example.com", "password1").await?;
    file_with_deadline_days_ago(&app, &token, 0).await?;

    let response = app
        .put_json(
            "/api/users/me/preferences",
            &json!({ "preferences": { "deadline_reminders": false } }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let stats = run_deadline_sweep(&app.state).await?;
    assert_eq!(stats.dispatched, 0);
    assert!(app.dispatch().sent().await.is_empty());

    Ok(())
}

#[tokio::test]
async fn a_failed_dispatch_is_retried_on_the_next_sweep() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    app.insert_user("flaky@example.com", "password1", "employee")
        .await?;
    let token = app.login_token("flaky@example.com", "password1").await?;
    file_with_deadline_days_ago(&app, &token, 0).await?;

    app.dispatch().set_failing(true);
    let stats = run_deadline_sweep(&app.state).await?;
    assert_eq!(stats.dispatched, 0);
    assert_eq!(stats.failed, 1);

    let (attempts, delivered_at) = dedup_row(&app).await?;
    assert_eq!(attempts, 1);
    assert!(delivered_at.is_none());

    app.dispatch().set_failing(false);
    let stats = run_deadline_sweep(&app.state).await?;
    assert_eq!(stats.dispatched, 1);

    let (attempts, delivered_at) = dedup_row(&app).await?;
    assert_eq!(attempts, 2);
    assert!(delivered_at.is_some());

    Ok(())
}

#[tokio::test]
async fn retries_stop_at_the_attempt_cap() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    app.insert_user("doomed@example.com", "password1", "employee")
        .await?;
    let token = app.login_token("doomed@example.com", "password1").await?;
    file_with_deadline_days_ago(&app, &token, 0).await?;

    app.dispatch().set_failing(true);
    for _ in 0..5 {
        run_deadline_sweep(&app.state).await?;
    }
    let (attempts, delivered_at) = dedup_row(&app).await?;
    assert_eq!(attempts, 5);
    assert!(delivered_at.is_none());

    // even a healthy transport no longer gets the pair
    app.dispatch().set_failing(false);
    let stats = run_deadline_sweep(&app.state).await?;
    assert_eq!(stats.dispatched, 0);
    assert!(app.dispatch().sent().await.is_empty());

    Ok(())
}

#[tokio::test]
async fn trial_warnings_fire_once_at_their_offsets() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    app.insert_user_with_subscription(
        "week@example.com",
        "password1",
        "employee",
        SubscriptionStatus::Trial,
        Some(7),
    )
    .await?;
    app.insert_user_with_subscription(
        "soon@example.com",
        "password1",
        "employee",
        SubscriptionStatus::Trial,
        Some(2),
    )
    .await?;
    app.insert_user_with_subscription(
        "fresh@example.com",
        "password1",
        "employee",
        SubscriptionStatus::Trial,
        Some(20),
    )
    .await?;

    let stats = run_trial_sweep(&app.state).await?;
    assert_eq!(stats.dispatched, 2);
    assert_eq!(app.dispatch().count_of_kind("trial_warning_7").await, 1);
    assert_eq!(app.dispatch().count_of_kind("trial_warning_2").await, 1);
    assert_eq!(app.dispatch().count_of_kind("trial_expired").await, 0);

    let stats = run_trial_sweep(&app.state).await?;
    assert_eq!(stats.dispatched, 0);

    Ok(())
}

#[tokio::test]
async fn a_lapsed_trial_is_expired_and_notified_once() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let user_id = app
        .insert_user_with_subscription(
            "over@example.com",
            "password1",
            "employee",
            SubscriptionStatus::Trial,
            Some(-1),
        )
        .await?;

    let stats = run_trial_sweep(&app.state).await?;
    assert_eq!(stats.dispatched, 1);
    assert_eq!(app.dispatch().count_of_kind("trial_expired").await, 1);

    let stored: String = app
        .with_conn(move |conn| {
            use unioncase::schema::users::dsl::*;
            Ok(users
                .find(user_id)
                .select(subscription_status)
                .first(conn)?)
        })
        .await?;
    assert_eq!(stored, "expired");

    // the user is no longer in trial, so the next sweep skips them entirely
    let stats = run_trial_sweep(&app.state).await?;
    assert_eq!(stats.dispatched, 0);
    assert_eq!(app.dispatch().count_of_kind("trial_expired").await, 1);

    Ok(())
}

#[tokio::test]
async fn completed_deadlines_and_closed_cases_are_skipped() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    app.insert_user("done@example.com", "password1", "employee")
        .await?;
    let token = app.login_token("done@example.com", "password1").await?;
    let completed_case = file_with_deadline_days_ago(&app, &token, 0).await?;
    let settled_case = file_with_deadline_days_ago(&app, &token, 0).await?;

    app.with_conn(move |conn| {
        use unioncase::schema::{deadlines, grievances};
        diesel::update(
            deadlines::table.filter(deadlines::grievance_id.eq(completed_case)),
        )
        .set(deadlines::is_completed.eq(true))
        .execute(conn)?;
        diesel::update(grievances::table.find(settled_case))
            .set(grievances::status.eq("settled"))
            .execute(conn)?;
        Ok(())
    })
    .await?;

    let stats = run_deadline_sweep(&app.state).await?;
    assert_eq!(stats.dispatched, 0);
    assert!(app.dispatch().sent().await.is_empty());

    Ok(())
}
