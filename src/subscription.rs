//! Trial/subscription gate. A user's trial window is fixed at account
//! creation; the only time-driven transition is `trial -> expired`, performed
//! lazily on login/profile reads, eagerly by the scheduler sweep, and by the
//! route gate below.

use std::fmt;
use std::str::FromStr;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts, http::StatusCode};
use chrono::{Duration, NaiveDateTime, Utc};
use diesel::{prelude::*, PgConnection};
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, CODE_SUBSCRIPTION_INACTIVE, CODE_TRIAL_EXPIRED, CODE_USER_NOT_FOUND},
    lifecycle::UnknownValue,
    schema::users,
    state::AppState,
};

pub const TRIAL_PERIOD_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Trial,
    Active,
    Expired,
    Cancelled,
}

impl SubscriptionStatus {
    pub const ALL: [SubscriptionStatus; 4] = [
        SubscriptionStatus::Trial,
        SubscriptionStatus::Active,
        SubscriptionStatus::Expired,
        SubscriptionStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trial => "trial",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = UnknownValue;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "trial" => Ok(SubscriptionStatus::Trial),
            "active" => Ok(SubscriptionStatus::Active),
            "expired" => Ok(SubscriptionStatus::Expired),
            "cancelled" => Ok(SubscriptionStatus::Cancelled),
            other => Err(UnknownValue::new("subscription status", other)),
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trial window assigned at registration.
pub fn trial_window(now: NaiveDateTime) -> (NaiveDateTime, NaiveDateTime) {
    (now, now + Duration::days(TRIAL_PERIOD_DAYS))
}

/// Current subscription state of a user plus whether this call flipped a
/// lapsed trial to `expired`.
pub struct SubscriptionCheck {
    pub status: SubscriptionStatus,
    pub just_expired: bool,
}

/// Loads the user's subscription columns and performs the lazy expiry check:
/// a trial whose `trial_ends_at` is in the past is flipped to `expired`
/// before anything is returned to the caller.
pub fn check_subscription(
    conn: &mut PgConnection,
    user_id: Uuid,
) -> Result<SubscriptionCheck, AppError> {
    let row: Option<(String, Option<NaiveDateTime>)> = users::table
        .find(user_id)
        .select((users::subscription_status, users::trial_ends_at))
        .first(conn)
        .optional()?;

    let Some((raw_status, trial_ends_at)) = row else {
        return Err(AppError::with_code(
            StatusCode::NOT_FOUND,
            "User not found",
            CODE_USER_NOT_FOUND,
        ));
    };

    let status: SubscriptionStatus = raw_status
        .parse()
        .map_err(|err: UnknownValue| AppError::internal(err))?;

    if status == SubscriptionStatus::Trial {
        if let Some(ends_at) = trial_ends_at {
            let now = Utc::now().naive_utc();
            if now > ends_at {
                diesel::update(users::table.find(user_id))
                    .set((
                        users::subscription_status.eq(SubscriptionStatus::Expired.as_str()),
                        users::updated_at.eq(now),
                    ))
                    .execute(conn)?;
                return Ok(SubscriptionCheck {
                    status: SubscriptionStatus::Expired,
                    just_expired: true,
                });
            }
        }
    }

    Ok(SubscriptionCheck {
        status,
        just_expired: false,
    })
}

/// Extractor gating protected routes: authenticates the caller, then rejects
/// expired/cancelled subscriptions with a client-distinguishable error code.
pub struct ActiveSubscriber(pub AuthenticatedUser);

#[async_trait]
impl FromRequestParts<AppState> for ActiveSubscriber {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;

        let mut conn = state.db()?;
        let check = check_subscription(&mut conn, user.user_id)?;

        match check.status {
            SubscriptionStatus::Trial | SubscriptionStatus::Active => Ok(ActiveSubscriber(user)),
            SubscriptionStatus::Expired if check.just_expired => Err(AppError::with_code(
                StatusCode::FORBIDDEN,
                format!(
                    "Your trial has expired. Please contact us at {} to activate your subscription.",
                    state.config.support_email
                ),
                CODE_TRIAL_EXPIRED,
            )),
            SubscriptionStatus::Expired | SubscriptionStatus::Cancelled => {
                Err(AppError::with_code(
                    StatusCode::FORBIDDEN,
                    format!(
                        "Your subscription is not active. Please contact us at {} to reactivate.",
                        state.config.support_email
                    ),
                    CODE_SUBSCRIPTION_INACTIVE,
                ))
            }
        }
    }
}
