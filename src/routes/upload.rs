use anyhow::anyhow;
use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    response::Json,
};
use bytes::Bytes;
use futures::stream;
use tracing::info;
use utoipa::ToSchema;

use super::RouteState;
use crate::{
    http_objects::{IngestAPIError, UploadResponse},
    sample_id,
};

const IMAGE_PREFIX: &str = "images";
const LABEL_PREFIX: &str = "labels";
const LABEL_CONTENT_TYPE: &str = "text/plain";

#[allow(dead_code)]
#[derive(ToSchema)]
pub struct UploadForm {
    /// Image bytes for the sample.
    #[schema(format = "binary")]
    image: String,
    /// Label text stored alongside the image.
    label: String,
    /// Original filename, used only to derive the sample id.
    filename: Option<String>,
}

/// Store one labeled sample as an image/label object pair
#[utoipa::path(
    post,
    path = "/",
    request_body(content_type = "multipart/form-data", content = inline(UploadForm)),
    tag = "ingestion",
    responses(
        (status = 200, description = "sample stored", body = UploadResponse),
        (status = 400, description = "missing image or label field"),
        (status = INTERNAL_SERVER_ERROR, description = "Internal Server Error")
    ),
)]
#[axum::debug_handler]
pub async fn upload_sample(
    State(state): State<RouteState>,
    form: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, IngestAPIError> {
    // A body that is not multipart at all is a parse failure, same class
    // as a malformed multipart stream.
    let mut form = form
        .map_err(|e| IngestAPIError::internal_error(anyhow!("error parsing multipart form: {e}")))?;

    let mut image: Option<(Bytes, Option<String>)> = None;
    let mut label: Option<String> = None;
    let mut original_name: Option<String> = None;

    while let Some(field) = form
        .next_field()
        .await
        .map_err(|e| IngestAPIError::internal_error(anyhow!("error reading multipart form: {e}")))?
    {
        let name = field.name().map(|name| name.to_string());
        match name.as_deref() {
            Some("image") => {
                let content_type = field.content_type().map(|ct| ct.to_string());
                let data = field.bytes().await.map_err(|e| {
                    IngestAPIError::internal_error(anyhow!("error reading image field: {e}"))
                })?;
                image = Some((data, content_type));
            }
            Some("label") => {
                let text = field.text().await.map_err(|e| {
                    IngestAPIError::internal_error(anyhow!("error reading label field: {e}"))
                })?;
                label = Some(text);
            }
            Some("filename") => {
                let text = field.text().await.map_err(|e| {
                    IngestAPIError::internal_error(anyhow!("error reading filename field: {e}"))
                })?;
                original_name = Some(text);
            }
            _ => {}
        }
    }

    let (Some((image_bytes, image_content_type)), Some(label)) = (image, label) else {
        return Err(IngestAPIError::bad_request("Missing image or label"));
    };

    let id = sample_id::generate(original_name.as_deref());

    // The `.jpg` suffix is cosmetic; the object carries whatever content
    // type the client declared, and the bytes are not sniffed.
    let image_key = format!("{}/{}.jpg", IMAGE_PREFIX, id);
    let image_put = state
        .blob_storage
        .put(
            &image_key,
            Box::pin(stream::once(async move { Ok(image_bytes) })),
            image_content_type.as_deref(),
        )
        .await
        .map_err(|e| IngestAPIError::internal_error(e.context("failed to store image object")))?;

    // If this second write fails the image object above is left behind;
    // there is no cross-object transaction and no compensating delete.
    let label_key = format!("{}/{}.txt", LABEL_PREFIX, id);
    let label_bytes = Bytes::from(label);
    state
        .blob_storage
        .put(
            &label_key,
            Box::pin(stream::once(async move { Ok(label_bytes) })),
            Some(LABEL_CONTENT_TYPE),
        )
        .await
        .map_err(|e| IngestAPIError::internal_error(e.context("failed to store label object")))?;

    info!(
        id = %id,
        image_bytes = image_put.size_bytes,
        "stored dataset sample"
    );
    Ok(Json(UploadResponse { success: true, id }))
}
