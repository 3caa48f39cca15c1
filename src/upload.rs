//! 文件上传处理器：表单 multipart 与 base64 图片。

use axum::extract::{Extension, Json, Multipart};
use axum::http::HeaderMap;
use axum::response::Json as JsonResponse;
use std::io;
use std::sync::Arc;
use tracing::info;

use crate::config::{MULTIPART_FIELD_MULTIPLE, MULTIPART_FIELD_SINGLE, SUB_DIRECTORY_HEADER};
use crate::error::ApiError;
use crate::storage::{
    Storage, StoreError, StoreParams, StoredFile, date_sub_directory, extension_of,
};

/// 上传行为配置。
#[derive(Debug)]
pub struct UploadOptions {
    pub default_sub_dir: String,
}

/// 表单文件上传：`file` 为单文件字段，`files` 为多文件字段。
///
/// 批量语义为遇错即止：任一文件失败立即返回错误，之前的结果不再返回，
/// 已落盘的文件不回滚。
pub async fn upload_multipart(
    headers: HeaderMap,
    Extension(storage): Extension<Arc<Storage>>,
    Extension(options): Extension<Arc<UploadOptions>>,
    mut multipart: Multipart,
) -> Result<JsonResponse<Vec<StoredFile>>, ApiError> {
    let params = request_params(&headers, &options);
    let mut stored = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::BadRequest(err.to_string()))?
    {
        let field_name = field.name().unwrap_or_default();
        if field_name != MULTIPART_FIELD_SINGLE && field_name != MULTIPART_FIELD_MULTIPLE {
            continue;
        }
        let original_name = field.file_name().unwrap_or_default().to_string();
        let extension = extension_of(&original_name);
        let content = field
            .bytes()
            .await
            .map_err(|err| StoreError::SourceRead(io::Error::other(err)))?;
        let record = storage
            .store_bytes(&content, &original_name, &extension, &params)
            .await?;
        info!(name = record.name, size = record.size, "stored multipart file");
        stored.push(record);
    }

    if stored.is_empty() {
        return Err(ApiError::BadRequest("no file field in form".into()));
    }
    Ok(JsonResponse(redact(stored)))
}

/// base64 图片上传：请求体为 data URI 字符串数组。
pub async fn upload_base64(
    headers: HeaderMap,
    Extension(storage): Extension<Arc<Storage>>,
    Extension(options): Extension<Arc<UploadOptions>>,
    Json(payloads): Json<Vec<String>>,
) -> Result<JsonResponse<Vec<StoredFile>>, ApiError> {
    let params = request_params(&headers, &options);
    let stored = storage.store_base64_many(&payloads, &params).await?;
    info!(count = stored.len(), "stored base64 images");
    Ok(JsonResponse(redact(stored)))
}

/// 由请求头组装存储参数：子目录取自 `x-sub-directory`，并附当日日期目录。
fn request_params(headers: &HeaderMap, options: &UploadOptions) -> StoreParams {
    let sub = headers
        .get(SUB_DIRECTORY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(&options.default_sub_dir);
    StoreParams {
        sub_directory: date_sub_directory(sub),
        ..Default::default()
    }
}

fn redact(mut records: Vec<StoredFile>) -> Vec<StoredFile> {
    for record in &mut records {
        record.redact_paths();
    }
    records
}
