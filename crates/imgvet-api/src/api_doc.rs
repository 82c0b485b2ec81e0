//! OpenAPI document, served at `/api/openapi.json`.

use utoipa::OpenApi;

use imgvet_core::models::{Finding, PipelineStatus, QuarantineReason, StatusLinks, StatusRecord};

use crate::error::ErrorResponse;
use crate::handlers;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "imgvet API",
        description = "Asynchronous image integrity pipeline: upload, malware scan, content safety, analysis, status polling."
    ),
    paths(
        handlers::health::health,
        handlers::ingest::ingest,
        handlers::status::get_status,
    ),
    components(schemas(
        StatusRecord,
        PipelineStatus,
        QuarantineReason,
        Finding,
        StatusLinks,
        ErrorResponse,
    )),
    tags(
        (name = "pipeline", description = "Upload ingestion and status polling"),
        (name = "system", description = "Health and service endpoints")
    )
)]
pub struct ApiDoc;
