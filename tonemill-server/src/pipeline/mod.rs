//! Upload-to-MIDI conversion pipeline
//!
//! One request flows through: validate → write temp file → invoke model →
//! release temp file → build response. Validation failures return before
//! anything touches the filesystem.

pub mod classifier;
pub mod invoker;
pub mod response;
pub mod temp_resource;
pub mod upload;
pub mod validator;

pub use classifier::{classify, ErrorCategory, ErrorReport};
pub use invoker::{Conversion, ConversionInvoker};
pub use temp_resource::TempResource;
pub use upload::{read_upload, UploadRequest};
pub use validator::{Accepted, Validator};

use std::path::{Path, PathBuf};
use tonemill_common::ServiceConfig;
use tracing::debug;

use crate::error::{ConvertError, ConvertResult};
use crate::model::ModelHandle;

/// Everything a request needs to run a conversion
#[derive(Debug, Clone)]
pub struct ConversionPipeline {
    validator: Validator,
    invoker: ConversionInvoker,
    model: ModelHandle,
    temp_dir: PathBuf,
}

impl ConversionPipeline {
    pub fn new(config: &ServiceConfig, model: ModelHandle) -> Self {
        Self {
            validator: Validator::from_config(config),
            invoker: ConversionInvoker::new(
                config.max_concurrent_conversions,
                config.conversion_timeout(),
            ),
            model,
            temp_dir: config.temp_dir.clone().unwrap_or_else(std::env::temp_dir),
        }
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn invoker(&self) -> &ConversionInvoker {
        &self.invoker
    }

    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Convert one upload
    ///
    /// The temp file is released on every path out of this function,
    /// including when the caller drops the future mid-conversion.
    pub async fn process(&self, upload: UploadRequest) -> ConvertResult<Conversion> {
        let accepted = self.validator.validate(&upload)?;
        debug!(extension = %accepted.extension, bytes = upload.content.len(), "Upload accepted");

        let mut temp = TempResource::acquire(&self.temp_dir, &accepted.extension, &upload.content)
            .map_err(|e| ConvertError::unhandled("failed to store upload", &e))?;
        drop(upload);

        let outcome = self.invoker.convert(temp.path(), &self.model).await;
        temp.release();
        outcome
    }
}
