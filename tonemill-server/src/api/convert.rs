//! Audio-to-MIDI conversion endpoint

use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::State;
use axum::response::Response;
use axum::routing::post;
use axum::Router;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::error::{error_chain, ConvertResult};
use crate::pipeline::invoker::Conversion;
use crate::pipeline::{classify, read_upload, response, UploadRequest};
use crate::AppState;

/// POST /convert
///
/// Accepts `multipart/form-data` with the recording in a part named `file`.
/// Requests that are not multipart at all are answered as if the file part
/// were missing.
pub async fn convert_audio(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("convert", %request_id);

    async move {
        let upload = match multipart {
            Ok(multipart) => read_upload(multipart, state.config.max_file_size).await,
            Err(rejection) => {
                debug!("Request body is not multipart: {}", rejection);
                Ok(UploadRequest::missing())
            }
        };

        let result = match upload {
            Ok(upload) => {
                info!(
                    filename = upload.filename.as_deref().unwrap_or("<none>"),
                    bytes = upload.content.len(),
                    "Conversion requested"
                );
                state.pipeline.process(upload).await
            }
            Err(e) => Err(e),
        };

        log_outcome(&state, &result).await;
        response::render(result)
    }
    .instrument(span)
    .await
}

async fn log_outcome(state: &AppState, result: &ConvertResult<Conversion>) {
    let err = match result {
        Ok(conversion) => {
            info!(
                notes = conversion.note_count,
                bytes = conversion.midi_bytes.len(),
                "Conversion succeeded"
            );
            return;
        }
        Err(err) => err,
    };

    let report = classify(err);
    if report.category.is_client_error() {
        warn!(category = ?report.category, "Upload rejected: {}", err);
    } else {
        error!(category = ?report.category, "Conversion failed: {}", error_chain(err));
        state.record_error(err.to_string()).await;
    }
}

pub fn convert_routes() -> Router<AppState> {
    Router::new().route("/convert", post(convert_audio))
}
