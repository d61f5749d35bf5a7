//! Time-driven sweeps over the case store: deadline reminders/overdue alerts
//! and trial warnings/expirations. Runs in-process next to the HTTP server.
//!
//! Every dispatch is deduplicated through the `sent_notifications` table: the
//! first sweep to claim an `(entity, kind)` pair owns it, delivery failures
//! leave the claim undelivered so the next sweep retries, and a per-pair
//! attempt cap stops retry storms against a permanently failing recipient.

use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, NaiveTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use tokio::time::sleep;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::lifecycle::GrievanceStatus;
use crate::models::{Deadline, Grievance, NewNotification, User};
use crate::notify::{
    deadline_overdue_email, deadline_reminder_email, effective_preferences, trial_expired_email,
    trial_warning_email, EmailMessage, KIND_DEADLINE_OVERDUE, KIND_DEADLINE_REMINDER,
    KIND_TRIAL_EXPIRED, KIND_TRIAL_WARNING_2, KIND_TRIAL_WARNING_7,
};
use crate::schema::{deadlines, grievances, notifications, sent_notifications, users};
use crate::state::AppState;
use crate::subscription::SubscriptionStatus;

pub const MAX_DISPATCH_ATTEMPTS: i32 = 5;

const STARTUP_SWEEP_DELAY: StdDuration = StdDuration::from_secs(5);
const FALLBACK_WAIT: StdDuration = StdDuration::from_secs(3600);

/// Whole days until `target`, rounded up. Negative once `target` is more than
/// a day in the past; `0` for anything due within the next 24 hours.
pub fn days_until(target: NaiveDateTime, now: NaiveDateTime) -> i64 {
    let secs = (target - now).num_seconds();
    (secs + 86_399).div_euclid(86_400)
}

#[derive(Debug, Default)]
pub struct SweepStats {
    pub dispatched: usize,
    pub failed: usize,
}

pub struct Scheduler {
    state: AppState,
}

impl Scheduler {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub async fn run(&self) {
        info!("notification scheduler started");
        // first sweep shortly after startup, then on the configured cadence
        sleep(STARTUP_SWEEP_DELAY).await;
        self.sweep_once().await;
        loop {
            sleep(self.next_wait()).await;
            self.sweep_once().await;
        }
    }

    async fn sweep_once(&self) {
        match run_deadline_sweep(&self.state).await {
            Ok(stats) => info!(
                dispatched = stats.dispatched,
                failed = stats.failed,
                "deadline sweep complete"
            ),
            Err(err) => error!(error = %err, "deadline sweep failed"),
        }
        match run_trial_sweep(&self.state).await {
            Ok(stats) => info!(
                dispatched = stats.dispatched,
                failed = stats.failed,
                "trial sweep complete"
            ),
            Err(err) => error!(error = %err, "trial sweep failed"),
        }
    }

    fn next_wait(&self) -> StdDuration {
        if let Some(secs) = self.state.config.sweep_interval_secs {
            return StdDuration::from_secs(secs.max(1));
        }
        next_fire_delay(Utc::now().naive_utc(), &self.state.config.sweep_times)
    }
}

/// Delay until the soonest of the configured wall-clock times, today or
/// tomorrow. Falls back to an hourly tick when no times are configured.
fn next_fire_delay(now: NaiveDateTime, times: &[NaiveTime]) -> StdDuration {
    let mut soonest: Option<NaiveDateTime> = None;
    for time in times {
        let today = now.date().and_time(*time);
        let candidate = if today > now {
            today
        } else {
            match now.date().succ_opt() {
                Some(tomorrow) => tomorrow.and_time(*time),
                None => continue,
            }
        };
        if soonest.map_or(true, |best| candidate < best) {
            soonest = Some(candidate);
        }
    }
    soonest
        .and_then(|at| (at - now).to_std().ok())
        .unwrap_or(FALLBACK_WAIT)
}

/// Sweep all incomplete deadlines on open grievances, dispatching at most one
/// reminder per configured day-offset and one overdue alert per deadline.
pub async fn run_deadline_sweep(state: &AppState) -> Result<SweepStats> {
    let now = Utc::now().naive_utc();
    let mut conn = state
        .pool
        .get()
        .context("failed to get sweep database connection")?;

    let rows: Vec<(Deadline, Grievance, User)> = deadlines::table
        .inner_join(grievances::table.inner_join(users::table))
        .filter(deadlines::is_completed.eq(false))
        .filter(grievances::status.eq(GrievanceStatus::Active.as_str()))
        .order(deadlines::deadline_date.asc())
        .select((
            deadlines::all_columns,
            grievances::all_columns,
            users::all_columns,
        ))
        .load(&mut conn)?;

    info!(count = rows.len(), "checking active deadlines");

    let mut stats = SweepStats::default();
    for (deadline, grievance, user) in rows {
        let prefs = effective_preferences(user.notification_preferences.as_ref());
        if !prefs.email_enabled || !prefs.deadline_reminders {
            continue;
        }

        let days = days_until(deadline.deadline_date, now);

        if days >= 0 && prefs.reminder_days.contains(&days) {
            let message = deadline_reminder_email(
                &state.config,
                &user.first_name,
                &grievance.grievance_number,
                &deadline.deadline_type,
                deadline.deadline_date,
                deadline.description.as_deref(),
                days,
            );
            let notification = NewNotification {
                id: Uuid::new_v4(),
                user_id: user.id,
                grievance_id: Some(grievance.id),
                notification_type: KIND_DEADLINE_REMINDER.to_string(),
                title: format!("Deadline Reminder: {days} {}", day_word(days)),
                message: format!(
                    "Deadline for {} is {}",
                    deadline.deadline_type,
                    due_phrase(days)
                ),
            };
            dispatch_once(
                state,
                &mut conn,
                deadline.id,
                &format!("reminder_{days}"),
                KIND_DEADLINE_REMINDER,
                &user.email,
                &message,
                notification,
                &mut stats,
            )
            .await;
        }

        if days < 0 {
            let message = deadline_overdue_email(
                &state.config,
                &user.first_name,
                &grievance.grievance_number,
                &deadline.deadline_type,
                deadline.deadline_date,
                deadline.description.as_deref(),
            );
            let notification = NewNotification {
                id: Uuid::new_v4(),
                user_id: user.id,
                grievance_id: Some(grievance.id),
                notification_type: KIND_DEADLINE_OVERDUE.to_string(),
                title: "Deadline Overdue".to_string(),
                message: format!("Deadline for {} is overdue", deadline.deadline_type),
            };
            dispatch_once(
                state,
                &mut conn,
                deadline.id,
                "overdue",
                KIND_DEADLINE_OVERDUE,
                &user.email,
                &message,
                notification,
                &mut stats,
            )
            .await;
        }
    }

    Ok(stats)
}

/// Sweep trial users: warnings at exactly 7 and 2 days out, expiry at or past
/// the end of the window.
pub async fn run_trial_sweep(state: &AppState) -> Result<SweepStats> {
    let now = Utc::now().naive_utc();
    let mut conn = state
        .pool
        .get()
        .context("failed to get sweep database connection")?;

    let trial_users: Vec<User> = users::table
        .filter(users::subscription_status.eq(SubscriptionStatus::Trial.as_str()))
        .load(&mut conn)?;

    let mut stats = SweepStats::default();
    for user in trial_users {
        let Some(ends_at) = user.trial_ends_at else {
            warn!(user_id = %user.id, "trial user has no trial_ends_at, skipping");
            continue;
        };

        let days = days_until(ends_at, now);

        if days == 7 || days == 2 {
            let kind = if days == 7 {
                KIND_TRIAL_WARNING_7
            } else {
                KIND_TRIAL_WARNING_2
            };
            let message = trial_warning_email(&state.config, &user.first_name, ends_at, days);
            let notification = NewNotification {
                id: Uuid::new_v4(),
                user_id: user.id,
                grievance_id: None,
                notification_type: kind.to_string(),
                title: format!("Trial ends in {days} days"),
                message: format!("Your trial ends in {days} days. Contact us to keep access."),
            };
            dispatch_once(
                state, &mut conn, user.id, kind, kind, &user.email, &message, notification,
                &mut stats,
            )
            .await;
        } else if days <= 0 {
            diesel::update(users::table.find(user.id))
                .set((
                    users::subscription_status.eq(SubscriptionStatus::Expired.as_str()),
                    users::updated_at.eq(now),
                ))
                .execute(&mut conn)?;
            info!(user_id = %user.id, "trial expired");

            let message = trial_expired_email(&state.config, &user.first_name);
            let notification = NewNotification {
                id: Uuid::new_v4(),
                user_id: user.id,
                grievance_id: None,
                notification_type: KIND_TRIAL_EXPIRED.to_string(),
                title: "Trial expired".to_string(),
                message: "Your trial has ended and your account is suspended.".to_string(),
            };
            dispatch_once(
                state,
                &mut conn,
                user.id,
                KIND_TRIAL_EXPIRED,
                KIND_TRIAL_EXPIRED,
                &user.email,
                &message,
                notification,
                &mut stats,
            )
            .await;
        }
    }

    Ok(stats)
}

/// Claim the `(entity, kind)` pair, dispatch, and record delivery. A failed
/// dispatch is logged and left undelivered so a later sweep retries it.
#[allow(clippy::too_many_arguments)]
async fn dispatch_once(
    state: &AppState,
    conn: &mut PgConnection,
    entity_id: Uuid,
    dedup_kind: &str,
    notification_kind: &str,
    recipient: &str,
    message: &EmailMessage,
    notification: NewNotification,
    stats: &mut SweepStats,
) {
    match claim_notification(conn, entity_id, dedup_kind) {
        Ok(true) => {}
        Ok(false) => return,
        Err(err) => {
            error!(entity_id = %entity_id, kind = dedup_kind, error = %err, "failed to claim notification");
            stats.failed += 1;
            return;
        }
    }

    if let Err(err) = state
        .dispatch
        .send(notification_kind, recipient, message)
        .await
    {
        warn!(entity_id = %entity_id, kind = dedup_kind, error = %err, "notification dispatch failed, will retry next sweep");
        stats.failed += 1;
        return;
    }

    if let Err(err) = mark_delivered(conn, entity_id, dedup_kind, notification) {
        error!(entity_id = %entity_id, kind = dedup_kind, error = %err, "failed to record delivered notification");
        stats.failed += 1;
        return;
    }

    stats.dispatched += 1;
}

/// Returns true if this caller owns the dispatch for `(entity, kind)`.
/// A fresh pair is won by the insert; an undelivered pair below the attempt
/// cap is re-claimed for retry; anything else is skipped.
pub fn claim_notification(
    conn: &mut PgConnection,
    entity_id: Uuid,
    kind: &str,
) -> QueryResult<bool> {
    let now = Utc::now().naive_utc();

    let inserted = diesel::insert_into(sent_notifications::table)
        .values((
            sent_notifications::entity_id.eq(entity_id),
            sent_notifications::kind.eq(kind),
            sent_notifications::attempts.eq(1),
            sent_notifications::updated_at.eq(now),
        ))
        .on_conflict_do_nothing()
        .execute(conn)?;
    if inserted == 1 {
        return Ok(true);
    }

    let reclaimed = diesel::update(
        sent_notifications::table
            .filter(sent_notifications::entity_id.eq(entity_id))
            .filter(sent_notifications::kind.eq(kind))
            .filter(sent_notifications::delivered_at.is_null())
            .filter(sent_notifications::attempts.lt(MAX_DISPATCH_ATTEMPTS)),
    )
    .set((
        sent_notifications::attempts.eq(sent_notifications::attempts + 1),
        sent_notifications::updated_at.eq(now),
    ))
    .execute(conn)?;

    Ok(reclaimed == 1)
}

fn mark_delivered(
    conn: &mut PgConnection,
    entity_id: Uuid,
    kind: &str,
    notification: NewNotification,
) -> QueryResult<()> {
    let now = Utc::now().naive_utc();
    conn.transaction(|conn| {
        diesel::update(
            sent_notifications::table
                .filter(sent_notifications::entity_id.eq(entity_id))
                .filter(sent_notifications::kind.eq(kind)),
        )
        .set((
            sent_notifications::delivered_at.eq(now),
            sent_notifications::updated_at.eq(now),
        ))
        .execute(conn)?;

        diesel::insert_into(notifications::table)
            .values(&notification)
            .execute(conn)?;
        Ok(())
    })
}

fn day_word(days: i64) -> &'static str {
    if days == 1 {
        "day"
    } else {
        "days"
    }
}

fn due_phrase(days: i64) -> String {
    match days {
        0 => "due today".to_string(),
        1 => "due in 1 day".to_string(),
        other => format!("due in {other} days"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn days_until_rounds_up() {
        let now = at(2025, 6, 10, 12, 0);
        assert_eq!(days_until(at(2025, 6, 10, 12, 0), now), 0);
        assert_eq!(days_until(at(2025, 6, 10, 18, 0), now), 1);
        assert_eq!(days_until(at(2025, 6, 13, 12, 0), now), 3);
    }

    #[test]
    fn days_until_goes_negative_one_full_day_late() {
        let now = at(2025, 6, 10, 12, 0);
        // an hour past due still rounds to zero
        assert_eq!(days_until(at(2025, 6, 10, 11, 0), now), 0);
        assert_eq!(days_until(at(2025, 6, 9, 11, 0), now), -1);
        assert_eq!(days_until(at(2025, 6, 7, 12, 0), now), -3);
    }

    #[test]
    fn next_fire_picks_the_soonest_time_today() {
        let now = at(2025, 6, 10, 7, 0);
        let times = [
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
        ];
        assert_eq!(
            next_fire_delay(now, &times),
            StdDuration::from_secs(60 * 60)
        );
    }

    #[test]
    fn next_fire_rolls_over_to_tomorrow() {
        let now = at(2025, 6, 10, 13, 0);
        let times = [
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
        ];
        // next firing is 08:00 tomorrow, 19 hours out
        assert_eq!(
            next_fire_delay(now, &times),
            StdDuration::from_secs(19 * 60 * 60)
        );
    }

    #[test]
    fn next_fire_without_times_uses_the_fallback() {
        let now = at(2025, 6, 10, 13, 0);
        assert_eq!(next_fire_delay(now, &[]), FALLBACK_WAIT);
    }
}
