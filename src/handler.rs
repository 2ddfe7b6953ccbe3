//! The contract a config container implements.
//!
//! The listener decodes each request, builds a defaulted response and hands
//! both to the matching method. Returning an error stops the listener.

use crate::protocol::{
    ConfigureReleaseRequest, ConfigureReleaseResponse, PrepareTerraformRequest,
    PrepareTerraformResponse, SetupRequest, SetupResponse, UploadReleaseRequest,
    UploadReleaseResponse,
};
use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

#[async_trait]
pub trait Handler: Send + Sync {
    /// Validate config and report what the container needs before any release.
    async fn setup(&self, request: &SetupRequest, response: &mut SetupResponse) -> Result<()>;

    /// Called before the release is built. The request is kept as the session
    /// for the following `upload_release`.
    async fn configure_release(
        &self,
        request: &ConfigureReleaseRequest,
        response: &mut ConfigureReleaseResponse,
    ) -> Result<()>;

    /// Store the built release found in `release_dir`.
    ///
    /// `session` is the last accepted `configure_release` request in this
    /// process, if any. Handlers must check it before building an archive.
    async fn upload_release(
        &self,
        request: &UploadReleaseRequest,
        response: &mut UploadReleaseResponse,
        session: Option<&ConfigureReleaseRequest>,
        release_dir: &Path,
    ) -> Result<()>;

    /// Fetch a release into `release_dir` and describe the terraform backend.
    async fn prepare_terraform(
        &self,
        request: &PrepareTerraformRequest,
        response: &mut PrepareTerraformResponse,
        release_dir: &Path,
    ) -> Result<()>;
}
