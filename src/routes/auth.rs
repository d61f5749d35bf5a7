use axum::{extract::State, http::StatusCode, Json};
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::{
    auth::{password, AuthenticatedUser},
    error::{AppError, AppResult},
    lifecycle::UserRole,
    models::{NewUser, User},
    notify::{trial_welcome_email, KIND_TRIAL_WELCOME},
    schema::users,
    state::AppState,
    subscription::{check_subscription, trial_window, SubscriptionStatus},
    union,
};

const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub employee_id: String,
    pub role: String,
    pub facility: String,
    pub craft: String,
    pub phone: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub employee_id: String,
    pub role: String,
    pub facility: String,
    pub craft: String,
    pub union: Option<&'static str>,
    pub phone: Option<String>,
    pub subscription_status: String,
    pub trial_ends_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

impl UserResponse {
    fn from_user(user: User) -> Self {
        let union = union::union_for_craft(&user.craft).map(|u| union::config_for(u).name);
        Self {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            employee_id: user.employee_id,
            role: user.role,
            facility: user.facility,
            craft: user.craft,
            union,
            phone: user.phone,
            subscription_status: user.subscription_status,
            trial_ends_at: user.trial_ends_at,
            created_at: user.created_at,
        }
    }
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub message: String,
    pub token: String,
    pub user: UserResponse,
}

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    if !payload.email.contains('@') {
        return Err(AppError::bad_request("Please provide a valid email"));
    }
    if payload.password.len() < MIN_PASSWORD_LENGTH {
        return Err(AppError::bad_request(
            "Password must be at least 6 characters",
        ));
    }
    for (value, field) in [
        (&payload.first_name, "firstName"),
        (&payload.last_name, "lastName"),
        (&payload.employee_id, "employeeId"),
        (&payload.facility, "facility"),
    ] {
        if value.trim().is_empty() {
            return Err(AppError::bad_request(format!("{field} is required")));
        }
    }
    let _role: UserRole = payload
        .role
        .parse()
        .map_err(|_| AppError::bad_request("Invalid role"))?;
    if !union::is_known_craft(&payload.craft) {
        return Err(AppError::bad_request("Invalid craft selection"));
    }

    let mut conn = state.db()?;

    let existing: Option<Uuid> = users::table
        .filter(
            users::email
                .eq(&payload.email)
                .or(users::employee_id.eq(&payload.employee_id)),
        )
        .select(users::id)
        .first(&mut conn)
        .optional()?;
    if existing.is_some() {
        return Err(AppError::bad_request(
            "User with this email or employee ID already exists",
        ));
    }

    let password_hash = password::hash_password(&payload.password)?;

    // Trial enrollment is decided once, here, and never revisited.
    let enrolled = state.config.trial_enabled_for_facility(&payload.facility);
    let (subscription_status, trial_starts_at, trial_ends_at) = if enrolled {
        let (starts, ends) = trial_window(Utc::now().naive_utc());
        (SubscriptionStatus::Trial, Some(starts), Some(ends))
    } else {
        (SubscriptionStatus::Active, None, None)
    };

    let new_user = NewUser {
        id: Uuid::new_v4(),
        email: payload.email.trim().to_string(),
        password_hash,
        first_name: payload.first_name.trim().to_string(),
        last_name: payload.last_name.trim().to_string(),
        employee_id: payload.employee_id.trim().to_string(),
        role: payload.role,
        facility: payload.facility.trim().to_string(),
        craft: payload.craft,
        phone: payload.phone,
        subscription_status: subscription_status.as_str().to_string(),
        trial_starts_at,
        trial_ends_at,
    };
    diesel::insert_into(users::table)
        .values(&new_user)
        .execute(&mut conn)?;
    let user: User = users::table.find(new_user.id).first(&mut conn)?;

    let token = state
        .jwt
        .generate_token(user.id, &user.email, &user.role)
        .map_err(AppError::from)?;

    if let Some(ends_at) = user.trial_ends_at {
        let message = trial_welcome_email(&state.config, &user.first_name, ends_at);
        if let Err(err) = state
            .dispatch
            .send(KIND_TRIAL_WELCOME, &user.email, &message)
            .await
        {
            warn!(user_id = %user.id, error = %err, "failed to send trial welcome email");
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "User registered successfully".to_string(),
            token,
            user: UserResponse::from_user(user),
        }),
    ))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let mut conn = state.db()?;

    let user: Option<User> = users::table
        .filter(users::email.eq(&payload.email))
        .first(&mut conn)
        .optional()?;
    let Some(mut user) = user else {
        return Err(AppError::new(
            StatusCode::UNAUTHORIZED,
            "Invalid email or password",
        ));
    };

    let valid = password::verify_password(&payload.password, &user.password_hash)
        .map_err(|_| AppError::unauthorized())?;
    if !valid {
        return Err(AppError::new(
            StatusCode::UNAUTHORIZED,
            "Invalid email or password",
        ));
    }

    // lazy trial expiry: the response must carry the post-check status
    let check = check_subscription(&mut conn, user.id)?;
    user.subscription_status = check.status.as_str().to_string();

    let token = state
        .jwt
        .generate_token(user.id, &user.email, &user.role)
        .map_err(AppError::from)?;

    Ok(Json(AuthResponse {
        message: "Login successful".to_string(),
        token,
        user: UserResponse::from_user(user),
    }))
}

pub async fn profile(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> AppResult<Json<UserResponse>> {
    let mut conn = state.db()?;

    let check = check_subscription(&mut conn, auth.user_id)?;
    let mut user: User = users::table.find(auth.user_id).first(&mut conn)?;
    user.subscription_status = check.status.as_str().to_string();

    Ok(Json(UserResponse::from_user(user)))
}
