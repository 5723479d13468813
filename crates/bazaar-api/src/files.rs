use axum::{
    Extension,
    body::Bytes,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};

use bazaar_types::api::Claims;

use crate::error::ApiError;
use crate::extract::{Json, Path};
use crate::state::AppState;
use crate::storage::content_type;

/// POST /storage/{bucket}/{*path}: raw bytes in the body. Callers may only
/// write under paths that start with their own user id.
pub async fn upload_object(
    State(state): State<AppState>,
    Path((bucket, path)): Path<(String, String)>,
    Extension(claims): Extension<Claims>,
    bytes: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    if !path.starts_with(&claims.sub.to_string()) {
        return Err(ApiError::NotAuthorized(
            "object paths must start with your user id".into(),
        ));
    }

    let object = state.storage.upload(&bucket, &path, &bytes).await?;
    Ok((StatusCode::CREATED, Json(object)))
}

/// GET /storage/{bucket}/{*path}: public read.
pub async fn download_object(
    State(state): State<AppState>,
    Path((bucket, path)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let bytes = state.storage.read(&bucket, &path).await?;
    Ok(([(header::CONTENT_TYPE, content_type(&path))], bytes))
}
