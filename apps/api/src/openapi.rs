use utoipa::OpenApi;

use crate::routes::jobs::{TranscriptEditRequest, TranscriptEditResponse};
use crate::routes::uploads::{UploadConfirmResponse, UploadInitRequest, UploadInitResponse};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Audio Orchestration API",
        version = "1.0.0",
        description = "Ingress for upload issuance, progress streaming, and transcript edit sync"
    ),
    tags(
        (name = "uploads", description = "Presigned upload issuance and upload-confirm"),
        (name = "jobs", description = "Job snapshot, progress stream, transcript edit sync")
    ),
    components(schemas(
        UploadInitRequest,
        UploadInitResponse,
        UploadConfirmResponse,
        TranscriptEditRequest,
        TranscriptEditResponse,
    ))
)]
pub struct ApiDoc;

pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

pub fn write_openapi_json() -> std::io::Result<std::path::PathBuf> {
    let doc = openapi();
    let json = serde_json::to_string_pretty(&doc)
        .map_err(|e| std::io::Error::other(format!("serialize openapi: {e}")))?;

    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("openapi.gen.json");
    std::fs::write(&path, json)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    #[test]
    fn gen_openapi_json() {
        super::write_openapi_json().unwrap();
    }
}
