use std::path::{Path as FsPath, PathBuf};

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{Document, Grievance, NewDocument};
use crate::schema::{documents, grievances, users};
use crate::state::AppState;

const ALLOWED_EXTENSIONS: &[&str] = &["jpeg", "jpg", "png", "pdf", "doc", "docx", "txt"];

const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "text/plain",
];

fn file_extension(file_name: &str) -> Option<String> {
    FsPath::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

fn is_allowed_upload(file_name: &str, content_type: Option<&str>) -> bool {
    let Some(extension) = file_extension(file_name) else {
        return false;
    };
    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return false;
    }
    let mime = match content_type {
        Some(explicit) => explicit.to_string(),
        None => mime_guess::from_ext(&extension)
            .first_or_octet_stream()
            .essence_str()
            .to_string(),
    };
    ALLOWED_MIME_TYPES.contains(&mime.as_str())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInfo {
    pub id: Uuid,
    pub grievance_id: Uuid,
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
    pub label: String,
    pub description: Option<String>,
    pub uploaded_by: Uuid,
    pub uploaded_by_name: Option<String>,
    pub created_at: NaiveDateTime,
}

impl DocumentInfo {
    fn from_document(document: Document, uploaded_by_name: Option<String>) -> Self {
        Self {
            id: document.id,
            grievance_id: document.grievance_id,
            file_name: document.file_name,
            file_type: document.file_type,
            file_size: document.file_size,
            label: document.label,
            description: document.description,
            uploaded_by: document.uploaded_by,
            uploaded_by_name,
            created_at: document.created_at,
        }
    }
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub document: DocumentInfo,
}

pub async fn upload_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(grievance_id): Path<Uuid>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<UploadResponse>)> {
    let mut file_name: Option<String> = None;
    let mut content_type: Option<String> = None;
    let mut bytes: Option<Vec<u8>> = None;
    let mut label: Option<String> = None;
    let mut description: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("invalid multipart payload: {err}")))?
    {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("file") => {
                file_name = field.file_name().map(|name| name.to_string());
                content_type = field.content_type().map(|mime| mime.to_string());
                let data = field
                    .bytes()
                    .await
                    .map_err(|err| AppError::bad_request(format!("failed to read file: {err}")))?;
                bytes = Some(data.to_vec());
            }
            Some("label") => {
                label = Some(field.text().await.map_err(AppError::internal)?);
            }
            Some("description") => {
                description = Some(field.text().await.map_err(AppError::internal)?);
            }
            _ => {}
        }
    }

    let (Some(file_name), Some(bytes)) = (file_name, bytes) else {
        return Err(AppError::bad_request("No file uploaded"));
    };
    if bytes.len() > state.config.max_upload_bytes {
        return Err(AppError::bad_request("file exceeds the upload size limit"));
    }
    if !is_allowed_upload(&file_name, content_type.as_deref()) {
        return Err(AppError::bad_request(
            "Only images, PDFs, and documents are allowed",
        ));
    }

    let mut conn = state.db()?;
    // 404 before writing anything to disk
    let _grievance: Grievance = grievances::table.find(grievance_id).first(&mut conn)?;

    let document_id = Uuid::new_v4();
    let extension = file_extension(&file_name).unwrap_or_else(|| "bin".to_string());
    let stored_path = PathBuf::from(&state.config.uploads_dir)
        .join(format!("{document_id}.{extension}"));

    tokio::fs::create_dir_all(&state.config.uploads_dir).await?;
    tokio::fs::write(&stored_path, &bytes).await?;

    let file_type = content_type.unwrap_or_else(|| {
        mime_guess::from_ext(&extension)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    });

    let new_document = NewDocument {
        id: document_id,
        grievance_id,
        uploaded_by: user.user_id,
        file_name: file_name.clone(),
        file_path: stored_path.to_string_lossy().into_owned(),
        file_type,
        file_size: bytes.len() as i64,
        label: label
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(file_name),
        description,
    };
    diesel::insert_into(documents::table)
        .values(&new_document)
        .execute(&mut conn)?;
    let document: Document = documents::table.find(document_id).first(&mut conn)?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            message: "Document uploaded successfully".to_string(),
            document: DocumentInfo::from_document(document, None),
        }),
    ))
}

#[derive(Serialize)]
pub struct DocumentListResponse {
    pub documents: Vec<DocumentInfo>,
}

pub async fn list_documents(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(grievance_id): Path<Uuid>,
) -> AppResult<Json<DocumentListResponse>> {
    let mut conn = state.db()?;

    let rows: Vec<(Document, (Uuid, String, String))> = documents::table
        .inner_join(users::table.on(users::id.eq(documents::uploaded_by)))
        .filter(documents::grievance_id.eq(grievance_id))
        .order(documents::created_at.desc())
        .select((
            documents::all_columns,
            (users::id, users::first_name, users::last_name),
        ))
        .load(&mut conn)?;

    Ok(Json(DocumentListResponse {
        documents: rows
            .into_iter()
            .map(|(document, (_, first, last))| {
                DocumentInfo::from_document(document, Some(format!("{first} {last}")))
            })
            .collect(),
    }))
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub message: String,
}

/// Only the uploader may remove a document; anyone else gets the same 404 a
/// missing id would produce.
pub async fn delete_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<DeleteResponse>> {
    let mut conn = state.db()?;

    let document: Option<Document> = documents::table
        .find(id)
        .filter(documents::uploaded_by.eq(user.user_id))
        .first(&mut conn)
        .optional()?;

    let Some(document) = document else {
        return Err(AppError::new(
            StatusCode::NOT_FOUND,
            "Document not found or unauthorized",
        ));
    };

    diesel::delete(documents::table.find(document.id)).execute(&mut conn)?;

    if let Err(err) = tokio::fs::remove_file(&document.file_path).await {
        warn!(document_id = %document.id, path = %document.file_path, error = %err, "failed to remove uploaded file");
    }

    Ok(Json(DeleteResponse {
        message: "Document deleted successfully".to_string(),
    }))
}
