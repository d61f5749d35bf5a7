use axum::extract::State;
use axum::Json;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::AppResult;
use crate::lifecycle::UserRole;
use crate::notify::{effective_preferences, NotificationPreferences};
use crate::schema::users;
use crate::state::AppState;

#[derive(Serialize)]
pub struct StewardEntry {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub facility: String,
}

#[derive(Serialize)]
pub struct StewardsResponse {
    pub stewards: Vec<StewardEntry>,
}

/// Directory of stewards and representatives, used for case assignment.
pub async fn list_stewards(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
) -> AppResult<Json<StewardsResponse>> {
    let mut conn = state.db()?;

    let rows: Vec<(Uuid, String, String, String, String)> = users::table
        .filter(users::role.eq_any([
            UserRole::Steward.as_str(),
            UserRole::Representative.as_str(),
        ]))
        .order((users::last_name.asc(), users::first_name.asc()))
        .select((
            users::id,
            users::first_name,
            users::last_name,
            users::email,
            users::facility,
        ))
        .load(&mut conn)?;

    Ok(Json(StewardsResponse {
        stewards: rows
            .into_iter()
            .map(|(id, first_name, last_name, email, facility)| StewardEntry {
                id,
                first_name,
                last_name,
                email,
                facility,
            })
            .collect(),
    }))
}

#[derive(Serialize)]
pub struct PreferencesResponse {
    pub preferences: NotificationPreferences,
}

pub async fn get_preferences(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<PreferencesResponse>> {
    let mut conn = state.db()?;

    let stored: Option<serde_json::Value> = users::table
        .find(user.user_id)
        .select(users::notification_preferences)
        .first(&mut conn)?;

    Ok(Json(PreferencesResponse {
        preferences: effective_preferences(stored.as_ref()),
    }))
}

#[derive(Deserialize)]
pub struct UpdatePreferencesRequest {
    pub preferences: serde_json::Value,
}

#[derive(Serialize)]
pub struct UpdatePreferencesResponse {
    pub message: String,
    pub preferences: NotificationPreferences,
}

/// Stores the submitted preference object. Unknown fields are dropped and
/// missing fields filled from the defaults, so the stored value is always a
/// complete, well-formed preference set.
pub async fn update_preferences(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<UpdatePreferencesRequest>,
) -> AppResult<Json<UpdatePreferencesResponse>> {
    let validated = effective_preferences(Some(&payload.preferences));
    let stored = serde_json::to_value(&validated)?;

    let mut conn = state.db()?;
    diesel::update(users::table.find(user.user_id))
        .set(users::notification_preferences.eq(Some(stored)))
        .execute(&mut conn)?;

    Ok(Json(UpdatePreferencesResponse {
        message: "Notification preferences updated successfully".to_string(),
        preferences: validated,
    }))
}
