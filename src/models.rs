use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub employee_id: String,
    pub role: String,
    pub facility: String,
    pub craft: String,
    pub phone: Option<String>,
    pub notification_preferences: Option<serde_json::Value>,
    pub subscription_status: String,
    pub trial_starts_at: Option<NaiveDateTime>,
    pub trial_ends_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub employee_id: String,
    pub role: String,
    pub facility: String,
    pub craft: String,
    pub phone: Option<String>,
    pub subscription_status: String,
    pub trial_starts_at: Option<NaiveDateTime>,
    pub trial_ends_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = grievances)]
#[diesel(belongs_to(User, foreign_key = user_id))]
pub struct Grievance {
    pub id: Uuid,
    pub grievance_number: String,
    pub user_id: Uuid,
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
    pub witnesses: Vec<String>,
    pub steward_assigned: Option<Uuid>,
    pub current_step: String,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = grievances)]
pub struct NewGrievance {
    pub id: Uuid,
    pub grievance_number: String,
    pub user_id: Uuid,
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
    pub witnesses: Vec<String>,
    pub steward_assigned: Option<Uuid>,
    pub current_step: String,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = grievance_timeline)]
#[diesel(belongs_to(Grievance))]
pub struct TimelineEntry {
    pub id: Uuid,
    pub grievance_id: Uuid,
    pub step: String,
    pub step_date: NaiveDateTime,
    pub handler_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = grievance_timeline)]
pub struct NewTimelineEntry {
    pub id: Uuid,
    pub grievance_id: Uuid,
    pub step: String,
    pub step_date: NaiveDateTime,
    pub handler_id: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = deadlines)]
#[diesel(belongs_to(Grievance))]
pub struct Deadline {
    pub id: Uuid,
    pub grievance_id: Uuid,
    pub deadline_type: String,
    pub deadline_date: NaiveDateTime,
    pub description: Option<String>,
    pub is_completed: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = deadlines)]
pub struct NewDeadline {
    pub id: Uuid,
    pub grievance_id: Uuid,
    pub deadline_type: String,
    pub deadline_date: NaiveDateTime,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = notes)]
#[diesel(belongs_to(Grievance))]
pub struct Note {
    pub id: Uuid,
    pub grievance_id: Uuid,
    pub author_id: Uuid,
    pub note_text: String,
    pub is_internal: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = notes)]
pub struct NewNote {
    pub id: Uuid,
    pub grievance_id: Uuid,
    pub author_id: Uuid,
    pub note_text: String,
    pub is_internal: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = documents)]
#[diesel(belongs_to(Grievance))]
pub struct Document {
    pub id: Uuid,
    pub grievance_id: Uuid,
    pub uploaded_by: Uuid,
    pub file_name: String,
    pub file_path: String,
    pub file_type: String,
    pub file_size: i64,
    pub label: String,
    pub description: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = documents)]
pub struct NewDocument {
    pub id: Uuid,
    pub grievance_id: Uuid,
    pub uploaded_by: Uuid,
    pub file_name: String,
    pub file_path: String,
    pub file_type: String,
    pub file_size: i64,
    pub label: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = notifications)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub grievance_id: Option<Uuid>,
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = notifications)]
pub struct NewNotification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub grievance_id: Option<Uuid>,
    pub notification_type: String,
    pub title: String,
    pub message: String,
}
