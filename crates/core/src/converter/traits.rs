//! Trait definitions for the converter module.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::error::ConverterError;
use super::types::{MediaInfo, ThumbnailRequest};
use crate::options::ConversionSpec;
use crate::session::ConversionSession;

/// A converter that can probe and transcode media files.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Returns the name of this converter implementation.
    fn name(&self) -> &str;

    /// Probes a media file to get its information.
    async fn probe(&self, path: &Path) -> Result<MediaInfo, ConverterError>;

    /// Prepares a conversion of `input` into `output`.
    ///
    /// Validation errors are returned here, before any transcode process is
    /// spawned. The returned session is idle until it is started or polled.
    async fn convert(
        &self,
        spec: &ConversionSpec,
        input: &Path,
        output: &Path,
    ) -> Result<ConversionSession, ConverterError>;

    /// Extracts still frames, returning the written image paths in request order.
    async fn thumbnails(
        &self,
        input: &Path,
        requests: &[ThumbnailRequest],
    ) -> Result<Vec<PathBuf>, ConverterError>;

    /// Extracts a single still frame.
    async fn thumbnail(
        &self,
        input: &Path,
        request: ThumbnailRequest,
    ) -> Result<PathBuf, ConverterError> {
        let mut paths = self.thumbnails(input, std::slice::from_ref(&request)).await?;
        paths.pop().ok_or_else(|| ConverterError::ThumbnailFailed {
            reason: "no thumbnail produced".to_string(),
        })
    }

    /// Validates that the converter is properly configured and ready.
    async fn validate(&self) -> Result<(), ConverterError>;
}
