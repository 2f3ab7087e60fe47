use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{DefaultBodyLimit, MatchedPath, Request},
    http::{header, HeaderValue, Method},
    routing::post,
    Router,
};
use blob_store::BlobStorage;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod upload;
use upload::upload_sample;

use crate::{
    config::ServerConfig,
    http_objects::{IngestAPIError, UploadResponse},
};

// Uploads are single images plus a small label; anything larger is a
// misbehaving client.
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
        paths(
            upload::upload_sample,
        ),
        components(
            schemas(
                IngestAPIError,
                UploadResponse,
            )
        ),
        tags(
            (name = "ingestion", description = "Dataset sample collection API")
        )
    )]
struct ApiDoc;

#[derive(Clone)]
pub struct RouteState {
    pub blob_storage: Arc<BlobStorage>,
}

pub fn create_routes(config: &ServerConfig, route_state: RouteState) -> Result<Router> {
    let cors = cors_layer(config)?;

    // The collector accepts POSTs on any path, so the upload handler is the
    // router fallback rather than a fixed route; non-POST methods get a 405
    // from the method router and OPTIONS is terminated by the CORS layer.
    Ok(Router::new()
        .merge(SwaggerUi::new("/docs/swagger").url("/docs/openapi.json", ApiDoc::openapi()))
        .fallback_service(post(upload_sample).with_state(route_state))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request| {
                    let method = req.method();
                    let uri = req.uri();

                    let matched_path = req
                        .extensions()
                        .get::<MatchedPath>()
                        .map(|matched_path| matched_path.as_str());

                    tracing::debug_span!("request", %method, %uri, matched_path)
                })
                .on_failure(()),
        )
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)))
}

fn cors_layer(config: &ServerConfig) -> Result<CorsLayer> {
    let allow_origin = if config.cors_allow_origins.iter().any(|origin| origin == "*") {
        AllowOrigin::any()
    } else {
        let origins = config
            .cors_allow_origins
            .iter()
            .map(|origin| {
                origin
                    .parse::<HeaderValue>()
                    .map_err(|e| anyhow::anyhow!("invalid cors origin {}: {}", origin, e))
            })
            .collect::<Result<Vec<_>>>()?;
        AllowOrigin::list(origins)
    };

    Ok(CorsLayer::new()
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_origin(allow_origin)
        .allow_headers([header::CONTENT_TYPE]))
}
