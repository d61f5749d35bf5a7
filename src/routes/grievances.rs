use std::collections::{HashMap, HashSet};

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use diesel::dsl::count_star;
use diesel::pg::Pg;
use diesel::{prelude::*, PgConnection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::lifecycle::{GrievanceStatus, GrievanceStep, UserRole};
use crate::models::{
    Deadline, Document, Grievance, NewDeadline, NewGrievance, NewNote, NewTimelineEntry, Note,
    TimelineEntry,
};
use crate::schema::{deadlines, documents, grievance_counters, grievance_timeline, grievances, notes, users};
use crate::state::AppState;
use crate::union;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGrievanceRequest {
    pub grievant_name: String,
    pub grievant_employee_id: Option<String>,
    pub facility: String,
    pub craft: String,
    pub incident_date: NaiveDate,
    pub incident_time: Option<NaiveTime>,
    pub contract_article: String,
    pub violation_type: String,
    pub brief_description: String,
    pub detailed_description: String,
    pub management_representative: Option<String>,
    #[serde(default)]
    pub witnesses: Vec<String>,
    pub steward_assigned: Option<Uuid>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedGrievance {
    pub id: Uuid,
    pub grievance_number: String,
    pub current_step: String,
    pub status: String,
    pub created_at: NaiveDateTime,
}

#[derive(Serialize)]
pub struct CreateGrievanceResponse {
    pub message: String,
    pub grievance: CreatedGrievance,
}

pub async fn create_grievance(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateGrievanceRequest>,
) -> AppResult<(StatusCode, Json<CreateGrievanceResponse>)> {
    for (value, field) in [
        (&payload.grievant_name, "grievantName"),
        (&payload.facility, "facility"),
        (&payload.contract_article, "contractArticle"),
        (&payload.violation_type, "violationType"),
        (&payload.brief_description, "briefDescription"),
        (&payload.detailed_description, "detailedDescription"),
    ] {
        if value.trim().is_empty() {
            return Err(AppError::bad_request(format!("{field} is required")));
        }
    }
    if !union::is_known_craft(&payload.craft) {
        return Err(AppError::bad_request("invalid craft selection"));
    }

    let mut conn = state.db()?;
    let grievance = conn.transaction::<Grievance, AppError, _>(|conn| {
        let year = Utc::now().year();
        let grievance_number = allocate_case_number(conn, year)?;
        let now = Utc::now().naive_utc();

        let new_grievance = NewGrievance {
            id: Uuid::new_v4(),
            grievance_number,
            user_id: user.user_id,
            grievant_name: payload.grievant_name.trim().to_string(),
            grievant_employee_id: payload.grievant_employee_id.clone(),
            facility: payload.facility.trim().to_string(),
            craft: payload.craft.clone(),
            incident_date: payload.incident_date,
            incident_time: payload.incident_time,
            contract_article: payload.contract_article.trim().to_string(),
            violation_type: payload.violation_type.trim().to_string(),
            brief_description: payload.brief_description.clone(),
            detailed_description: payload.detailed_description.clone(),
            management_representative: payload.management_representative.clone(),
            witnesses: payload.witnesses.clone(),
            steward_assigned: payload.steward_assigned,
            current_step: GrievanceStep::Filed.as_str().to_string(),
            status: GrievanceStatus::Active.as_str().to_string(),
        };
        diesel::insert_into(grievances::table)
            .values(&new_grievance)
            .execute(conn)?;

        let entry = NewTimelineEntry {
            id: Uuid::new_v4(),
            grievance_id: new_grievance.id,
            step: GrievanceStep::Filed.as_str().to_string(),
            step_date: now,
            handler_id: Some(user.user_id),
            notes: Some("Grievance filed".to_string()),
        };
        diesel::insert_into(grievance_timeline::table)
            .values(&entry)
            .execute(conn)?;

        let informal_days =
            union::time_limit_for_step(&payload.craft, GrievanceStep::InformalStepA)
                .map(|limit| limit.days)
                .unwrap_or(14);
        let deadline = NewDeadline {
            id: Uuid::new_v4(),
            grievance_id: new_grievance.id,
            deadline_type: GrievanceStep::InformalStepA.as_str().to_string(),
            deadline_date: payload.incident_date.and_time(NaiveTime::MIN)
                + Duration::days(informal_days),
            description: Some("Informal Step A must be scheduled".to_string()),
        };
        diesel::insert_into(deadlines::table)
            .values(&deadline)
            .execute(conn)?;

        let grievance = grievances::table.find(new_grievance.id).first(conn)?;
        Ok(grievance)
    })?;

    Ok((
        StatusCode::CREATED,
        Json(CreateGrievanceResponse {
            message: "Grievance created successfully".to_string(),
            grievance: CreatedGrievance {
                id: grievance.id,
                grievance_number: grievance.grievance_number,
                current_step: grievance.current_step,
                status: grievance.status,
                created_at: grievance.created_at,
            },
        }),
    ))
}

/// Case numbers are `GRVNC-<year>-<seq>`, allocated from a per-year counter
/// row locked inside the caller's transaction so concurrent filings cannot
/// collide.
fn allocate_case_number(conn: &mut PgConnection, year: i32) -> QueryResult<String> {
    diesel::insert_into(grievance_counters::table)
        .values((
            grievance_counters::year.eq(year),
            grievance_counters::next_seq.eq(1),
        ))
        .on_conflict_do_nothing()
        .execute(conn)?;

    let seq: i32 = grievance_counters::table
        .find(year)
        .select(grievance_counters::next_seq)
        .for_update()
        .first(conn)?;

    diesel::update(grievance_counters::table.find(year))
        .set(grievance_counters::next_seq.eq(seq + 1))
        .execute(conn)?;

    Ok(format!("GRVNC-{year}-{seq:04}"))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrievanceListQuery {
    pub status: Option<String>,
    pub current_step: Option<String>,
    pub facility: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrievanceSummary {
    pub id: Uuid,
    pub grievance_number: String,
    pub grievant_name: String,
    pub facility: String,
    pub craft: String,
    pub violation_type: String,
    pub current_step: String,
    pub status: String,
    pub incident_date: NaiveDate,
    pub filed_by_name: Option<String>,
    pub steward_name: Option<String>,
    pub document_count: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Serialize)]
pub struct GrievanceListResponse {
    pub grievances: Vec<GrievanceSummary>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Row visibility: employees see their own filings, stewards additionally see
/// cases assigned to them, representatives see everything.
fn visible_grievances(
    user: &AuthenticatedUser,
    query: &GrievanceListQuery,
) -> AppResult<grievances::BoxedQuery<'static, Pg>> {
    let mut filtered = grievances::table.into_boxed();

    let role: UserRole = user.role.parse().map_err(AppError::internal)?;
    match role {
        UserRole::Employee => {
            filtered = filtered.filter(grievances::user_id.eq(user.user_id));
        }
        UserRole::Steward => {
            filtered = filtered.filter(
                grievances::user_id
                    .eq(user.user_id)
                    .or(grievances::steward_assigned.eq(user.user_id)),
            );
        }
        UserRole::Representative => {}
    }

    if let Some(status) = &query.status {
        let status: GrievanceStatus = status
            .parse()
            .map_err(|err| AppError::bad_request(format!("{err}")))?;
        filtered = filtered.filter(grievances::status.eq(status.as_str()));
    }
    if let Some(step) = &query.current_step {
        let step: GrievanceStep = step
            .parse()
            .map_err(|err| AppError::bad_request(format!("{err}")))?;
        filtered = filtered.filter(grievances::current_step.eq(step.as_str()));
    }
    if let Some(facility) = &query.facility {
        filtered = filtered.filter(grievances::facility.eq(facility.clone()));
    }

    Ok(filtered)
}

pub async fn list_grievances(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<GrievanceListQuery>,
) -> AppResult<Json<GrievanceListResponse>> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0).max(0);

    let mut conn = state.db()?;

    let rows: Vec<Grievance> = visible_grievances(&user, &query)?
        .order(grievances::created_at.desc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)?;

    let total: i64 = visible_grievances(&user, &query)?
        .count()
        .get_result(&mut conn)?;

    let mut user_ids: HashSet<Uuid> = rows.iter().map(|g| g.user_id).collect();
    user_ids.extend(rows.iter().filter_map(|g| g.steward_assigned));
    let names = load_user_names(&mut conn, &user_ids)?;

    let grievance_ids: Vec<Uuid> = rows.iter().map(|g| g.id).collect();
    let count_rows: Vec<(Uuid, i64)> = documents::table
        .filter(documents::grievance_id.eq_any(&grievance_ids))
        .group_by(documents::grievance_id)
        .select((documents::grievance_id, count_star()))
        .load(&mut conn)?;
    let document_counts: HashMap<Uuid, i64> = count_rows.into_iter().collect();

    let grievances = rows
        .into_iter()
        .map(|g| GrievanceSummary {
            filed_by_name: names.get(&g.user_id).cloned(),
            steward_name: g
                .steward_assigned
                .and_then(|id| names.get(&id).cloned()),
            document_count: *document_counts.get(&g.id).unwrap_or(&0),
            id: g.id,
            grievance_number: g.grievance_number,
            grievant_name: g.grievant_name,
            facility: g.facility,
            craft: g.craft,
            violation_type: g.violation_type,
            current_step: g.current_step,
            status: g.status,
            incident_date: g.incident_date,
            created_at: g.created_at,
            updated_at: g.updated_at,
        })
        .collect();

    Ok(Json(GrievanceListResponse {
        grievances,
        total,
        limit,
        offset,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntryResponse {
    pub id: Uuid,
    pub step: String,
    pub step_date: NaiveDateTime,
    pub handler_id: Option<Uuid>,
    pub handler_name: Option<String>,
    pub notes: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadlineResponse {
    pub id: Uuid,
    pub deadline_type: String,
    pub deadline_date: NaiveDateTime,
    pub description: Option<String>,
    pub is_completed: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteResponse {
    pub id: Uuid,
    pub author_id: Uuid,
    pub author_name: Option<String>,
    pub note_text: String,
    pub is_internal: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResponse {
    pub id: Uuid,
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
    pub label: String,
    pub description: Option<String>,
    pub uploaded_by: Uuid,
    pub uploaded_by_name: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrievanceDetailResponse {
    pub id: Uuid,
    pub grievance_number: String,
    pub grievant_name: String,
    pub grievant_employee_id: Option<String>,
    pub facility: String,
    pub craft: String,
    pub craft_label: String,
    pub incident_date: NaiveDate,
    pub incident_time: Option<NaiveTime>,
    pub contract_article: String,
    pub violation_type: String,
    pub brief_description: String,
    pub detailed_description: String,
    pub management_representative: Option<String>,
    pub witnesses: Vec<String>,
    pub steward_assigned: Option<Uuid>,
    pub current_step: String,
    pub current_step_label: String,
    pub status: String,
    pub filed_by_name: Option<String>,
    pub steward_name: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub timeline: Vec<TimelineEntryResponse>,
    pub deadlines: Vec<DeadlineResponse>,
    pub documents: Vec<DocumentResponse>,
    pub notes: Vec<NoteResponse>,
}

pub async fn get_grievance(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<GrievanceDetailResponse>> {
    let mut conn = state.db()?;

    let grievance: Grievance = grievances::table.find(id).first(&mut conn)?;
    ensure_can_view(&user, &grievance)?;

    let timeline: Vec<TimelineEntry> = grievance_timeline::table
        .filter(grievance_timeline::grievance_id.eq(id))
        .order(grievance_timeline::step_date.asc())
        .load(&mut conn)?;

    let deadline_rows: Vec<Deadline> = deadlines::table
        .filter(deadlines::grievance_id.eq(id))
        .order(deadlines::deadline_date.asc())
        .load(&mut conn)?;

    let document_rows: Vec<Document> = documents::table
        .filter(documents::grievance_id.eq(id))
        .order(documents::created_at.desc())
        .load(&mut conn)?;

    let note_rows: Vec<Note> = notes::table
        .filter(notes::grievance_id.eq(id))
        .order(notes::created_at.desc())
        .load(&mut conn)?;

    let mut user_ids: HashSet<Uuid> = HashSet::new();
    user_ids.insert(grievance.user_id);
    user_ids.extend(grievance.steward_assigned);
    user_ids.extend(timeline.iter().filter_map(|entry| entry.handler_id));
    user_ids.extend(document_rows.iter().map(|doc| doc.uploaded_by));
    user_ids.extend(note_rows.iter().map(|note| note.author_id));
    let names = load_user_names(&mut conn, &user_ids)?;

    let step_label = grievance
        .current_step
        .parse::<GrievanceStep>()
        .map(|step| step.label().to_string())
        .unwrap_or_else(|_| grievance.current_step.clone());

    Ok(Json(GrievanceDetailResponse {
        filed_by_name: names.get(&grievance.user_id).cloned(),
        steward_name: grievance
            .steward_assigned
            .and_then(|id| names.get(&id).cloned()),
        timeline: timeline
            .into_iter()
            .map(|entry| TimelineEntryResponse {
                handler_name: entry.handler_id.and_then(|id| names.get(&id).cloned()),
                id: entry.id,
                step: entry.step,
                step_date: entry.step_date,
                handler_id: entry.handler_id,
                notes: entry.notes,
            })
            .collect(),
        deadlines: deadline_rows
            .into_iter()
            .map(|deadline| DeadlineResponse {
                id: deadline.id,
                deadline_type: deadline.deadline_type,
                deadline_date: deadline.deadline_date,
                description: deadline.description,
                is_completed: deadline.is_completed,
            })
            .collect(),
        documents: document_rows
            .into_iter()
            .map(|doc| DocumentResponse {
                uploaded_by_name: names.get(&doc.uploaded_by).cloned(),
                id: doc.id,
                file_name: doc.file_name,
                file_type: doc.file_type,
                file_size: doc.file_size,
                label: doc.label,
                description: doc.description,
                uploaded_by: doc.uploaded_by,
                created_at: doc.created_at,
            })
            .collect(),
        notes: note_rows
            .into_iter()
            .map(|note| NoteResponse {
                author_name: names.get(&note.author_id).cloned(),
                id: note.id,
                author_id: note.author_id,
                note_text: note.note_text,
                is_internal: note.is_internal,
                created_at: note.created_at,
            })
            .collect(),
        id: grievance.id,
        grievance_number: grievance.grievance_number,
        grievant_name: grievance.grievant_name,
        grievant_employee_id: grievance.grievant_employee_id,
        facility: grievance.facility,
        craft_label: union::craft_label(&grievance.craft).to_string(),
        craft: grievance.craft,
        incident_date: grievance.incident_date,
        incident_time: grievance.incident_time,
        contract_article: grievance.contract_article,
        violation_type: grievance.violation_type,
        brief_description: grievance.brief_description,
        detailed_description: grievance.detailed_description,
        management_representative: grievance.management_representative,
        witnesses: grievance.witnesses,
        steward_assigned: grievance.steward_assigned,
        current_step: grievance.current_step,
        current_step_label: step_label,
        status: grievance.status,
        created_at: grievance.created_at,
        updated_at: grievance.updated_at,
    }))
}

fn ensure_can_view(user: &AuthenticatedUser, grievance: &Grievance) -> AppResult<()> {
    let role: UserRole = user.role.parse().map_err(AppError::internal)?;
    if role == UserRole::Employee
        && grievance.user_id != user.user_id
        && grievance.steward_assigned != Some(user.user_id)
    {
        return Err(AppError::forbidden("Access denied"));
    }
    Ok(())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStepRequest {
    pub new_step: String,
    pub notes: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStepResponse {
    pub message: String,
    pub grievance: GrievanceSummaryLite,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrievanceSummaryLite {
    pub id: Uuid,
    pub grievance_number: String,
    pub current_step: String,
    pub status: String,
    pub updated_at: NaiveDateTime,
}

/// Advances (or corrects) the case step. The new step and the timeline entry
/// recording it are committed together: a step change with no matching audit
/// entry must never be observable.
pub async fn update_step(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStepRequest>,
) -> AppResult<Json<UpdateStepResponse>> {
    let step: GrievanceStep = payload
        .new_step
        .parse()
        .map_err(|err| AppError::bad_request(format!("{err}")))?;

    let mut conn = state.db()?;
    let grievance = conn.transaction::<Grievance, AppError, _>(|conn| {
        let now = Utc::now().naive_utc();
        let grievance: Grievance = diesel::update(grievances::table.find(id))
            .set((
                grievances::current_step.eq(step.as_str()),
                grievances::updated_at.eq(now),
            ))
            .get_result(conn)?;

        let entry = NewTimelineEntry {
            id: Uuid::new_v4(),
            grievance_id: grievance.id,
            step: step.as_str().to_string(),
            step_date: now,
            handler_id: Some(user.user_id),
            notes: Some(
                payload
                    .notes
                    .clone()
                    .filter(|notes| !notes.trim().is_empty())
                    .unwrap_or_else(|| format!("Updated to {}", step.as_str())),
            ),
        };
        diesel::insert_into(grievance_timeline::table)
            .values(&entry)
            .execute(conn)?;

        Ok(grievance)
    })?;

    Ok(Json(UpdateStepResponse {
        message: "Grievance step updated successfully".to_string(),
        grievance: GrievanceSummaryLite {
            id: grievance.id,
            grievance_number: grievance.grievance_number,
            current_step: step.as_str().to_string(),
            status: grievance.status,
            updated_at: grievance.updated_at,
        },
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddNoteRequest {
    pub note_text: String,
    #[serde(default)]
    pub is_internal: bool,
}

#[derive(Serialize)]
pub struct AddNoteResponse {
    pub message: String,
    pub note: NoteResponse,
}

pub async fn add_note(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddNoteRequest>,
) -> AppResult<(StatusCode, Json<AddNoteResponse>)> {
    if payload.note_text.trim().is_empty() {
        return Err(AppError::bad_request("noteText is required"));
    }

    let mut conn = state.db()?;
    let grievance: Grievance = grievances::table.find(id).first(&mut conn)?;
    ensure_can_view(&user, &grievance)?;

    let new_note = NewNote {
        id: Uuid::new_v4(),
        grievance_id: id,
        author_id: user.user_id,
        note_text: payload.note_text,
        is_internal: payload.is_internal,
    };
    diesel::insert_into(notes::table)
        .values(&new_note)
        .execute(&mut conn)?;
    let note: Note = notes::table.find(new_note.id).first(&mut conn)?;

    Ok((
        StatusCode::CREATED,
        Json(AddNoteResponse {
            message: "Note added successfully".to_string(),
            note: NoteResponse {
                author_name: None,
                id: note.id,
                author_id: note.author_id,
                note_text: note.note_text,
                is_internal: note.is_internal,
                created_at: note.created_at,
            },
        }),
    ))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsResponse {
    pub active_grievances: i64,
    pub resolved_grievances: i64,
    pub settled_grievances: i64,
    pub total_grievances: i64,
    pub filed_count: i64,
    pub step_b_count: i64,
    pub pending_deadlines: i64,
}

pub async fn statistics(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<StatisticsResponse>> {
    let mut conn = state.db()?;

    let mine = || {
        grievances::user_id
            .eq(user.user_id)
            .or(grievances::steward_assigned.eq(user.user_id))
    };

    let status_rows: Vec<(String, i64)> = grievances::table
        .filter(mine())
        .group_by(grievances::status)
        .select((grievances::status, count_star()))
        .load(&mut conn)?;
    let status_counts: HashMap<String, i64> = status_rows.into_iter().collect();

    let step_rows: Vec<(String, i64)> = grievances::table
        .filter(mine())
        .group_by(grievances::current_step)
        .select((grievances::current_step, count_star()))
        .load(&mut conn)?;
    let step_counts: HashMap<String, i64> = step_rows.into_iter().collect();

    let now = Utc::now().naive_utc();
    let pending_deadlines: i64 = deadlines::table
        .inner_join(grievances::table)
        .filter(mine())
        .filter(deadlines::is_completed.eq(false))
        .filter(deadlines::deadline_date.ge(now.date().and_time(NaiveTime::MIN)))
        .select(count_star())
        .first(&mut conn)?;

    let count_for = |counts: &HashMap<String, i64>, key: &str| *counts.get(key).unwrap_or(&0);

    Ok(Json(StatisticsResponse {
        active_grievances: count_for(&status_counts, GrievanceStatus::Active.as_str()),
        resolved_grievances: count_for(&status_counts, GrievanceStatus::Resolved.as_str()),
        settled_grievances: count_for(&status_counts, GrievanceStatus::Settled.as_str()),
        total_grievances: status_counts.values().sum(),
        filed_count: count_for(&step_counts, GrievanceStep::Filed.as_str()),
        step_b_count: count_for(&step_counts, GrievanceStep::StepB.as_str()),
        pending_deadlines,
    }))
}

fn load_user_names(
    conn: &mut PgConnection,
    ids: &HashSet<Uuid>,
) -> AppResult<HashMap<Uuid, String>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let id_list: Vec<Uuid> = ids.iter().copied().collect();
    let rows: Vec<(Uuid, String, String)> = users::table
        .filter(users::id.eq_any(&id_list))
        .select((users::id, users::first_name, users::last_name))
        .load(conn)?;
    Ok(rows
        .into_iter()
        .map(|(id, first, last)| (id, format!("{first} {last}")))
        .collect())
}
