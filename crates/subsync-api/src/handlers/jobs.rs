//! Job submission, status and download handlers.

use std::path::Path as FsPath;

use axum::extract::multipart::Field;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use subsync_models::JobId;
use subsync_worker::{StagedUpload, StatusSnapshot, SubmitReceipt, Submission};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const SRT_CONTENT_TYPE: &str = "application/x-subrip";
const ZIP_CONTENT_TYPE: &str = "application/zip";

/// Upload written to the staging area; deleted on drop until handed over.
struct StagedFile {
    original_name: String,
    path: TempPath,
}

impl StagedFile {
    fn into_upload(self) -> ApiResult<StagedUpload> {
        let path = self
            .path
            .keep()
            .map_err(|e| ApiError::internal(format!("Failed to keep staged upload: {}", e)))?;
        Ok(StagedUpload::new(self.original_name, path))
    }
}

/// Stream one multipart file field into the staging directory.
async fn stage_field(
    mut field: Field<'_>,
    incoming: &FsPath,
    limit: u64,
) -> ApiResult<StagedFile> {
    let field_name = field.name().unwrap_or_default().to_string();
    let original_name = field.file_name().unwrap_or_default().to_string();

    let staged = tempfile::Builder::new()
        .prefix("upload-")
        .tempfile_in(incoming)?;
    let (file, path) = staged.into_parts();
    let mut file = tokio::fs::File::from_std(file);

    let mut written: u64 = 0;
    while let Some(chunk) = field.chunk().await? {
        written += chunk.len() as u64;
        if written > limit {
            return Err(ApiError::payload_too_large(format!(
                "{} exceeds the {} byte limit",
                field_name, limit
            )));
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    debug!(field = %field_name, bytes = written, "Staged upload");
    Ok(StagedFile {
        original_name,
        path,
    })
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "on" | "yes"
    )
}

/// Submit a new sync job.
///
/// Multipart fields: `video_file`, `subtitle_file`, optional
/// `encoding_override` and `force_sami`. Responds before any stage runs.
pub async fn submit_job(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<SubmitReceipt>)> {
    let incoming = state.service.config().incoming_dir();
    tokio::fs::create_dir_all(&incoming).await?;

    let mut video: Option<StagedFile> = None;
    let mut subtitle: Option<StagedFile> = None;
    let mut encoding_override: Option<String> = None;
    let mut force_sami = false;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "video_file" => {
                video = Some(stage_field(field, &incoming, state.config.max_video_bytes).await?);
            }
            "subtitle_file" => {
                subtitle =
                    Some(stage_field(field, &incoming, state.config.max_subtitle_bytes).await?);
            }
            "encoding_override" => {
                encoding_override = Some(field.text().await?);
            }
            "force_sami" => {
                force_sami = parse_flag(&field.text().await?);
            }
            other => {
                debug!(field = %other, "Ignoring unknown multipart field");
            }
        }
    }

    let (video, subtitle) = match (video, subtitle) {
        (Some(video), Some(subtitle)) => (video, subtitle),
        (None, _) => return Err(ApiError::bad_request("Missing video_file")),
        (_, None) => return Err(ApiError::bad_request("Missing subtitle_file")),
    };

    let submission = Submission {
        video: video.into_upload()?,
        subtitle: subtitle.into_upload()?,
        encoding_override,
        force_sami,
    };

    let receipt = state.service.submit(submission).await?;
    info!(job_id = %receipt.job_id, status = %receipt.status, "Job submitted");

    Ok((StatusCode::ACCEPTED, Json(receipt)))
}

/// Current status of a job, including its full timeline and logs.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<StatusSnapshot>> {
    let snapshot = state.service.status(&JobId::from_string(job_id))?;
    Ok(Json(snapshot))
}

/// Download the aligned subtitle of a succeeded job.
pub async fn download_result(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Response> {
    let result = state.service.result(&JobId::from_string(job_id))?;
    let bytes = tokio::fs::read(&result.path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ApiError::not_found("Result file no longer exists")
        } else {
            ApiError::from(e)
        }
    })?;

    Ok(attachment(bytes, &result.filename, SRT_CONTENT_TYPE))
}

/// Download the zip of subtitles that existed before the job overwrote them.
pub async fn download_backups(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Response> {
    let archive = state
        .service
        .backup_archive(&JobId::from_string(job_id))
        .await?;

    Ok(attachment(archive.bytes, &archive.filename, ZIP_CONTENT_TYPE))
}

fn attachment(bytes: Vec<u8>, filename: &str, content_type: &'static str) -> Response {
    let mut response = (StatusCode::OK, bytes).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    if let Ok(value) = HeaderValue::from_str(&content_disposition(filename)) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    response
}

/// `attachment` disposition with an ASCII fallback and an RFC 5987 UTF-8 name.
fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if fallback == filename {
        return format!("attachment; filename=\"{}\"", filename);
    }

    let encoded: String = filename
        .bytes()
        .map(|b| {
            if b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b'_') {
                (b as char).to_string()
            } else {
                format!("%{:02X}", b)
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback, encoded
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" ON "));
        assert!(parse_flag("1"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag(""));
    }

    #[test]
    fn test_content_disposition_ascii() {
        assert_eq!(
            content_disposition("My Movie.srt"),
            "attachment; filename=\"My Movie.srt\""
        );
    }

    #[test]
    fn test_content_disposition_utf8() {
        let value = content_disposition("영화.srt");
        assert!(value.starts_with("attachment; filename=\"__.srt\""));
        assert!(value.ends_with("filename*=UTF-8''%EC%98%81%ED%99%94.srt"));
        assert!(HeaderValue::from_str(&value).is_ok());
    }
}
