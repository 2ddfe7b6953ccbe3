//! Request routing.

use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::protocol::{
    decode_request, encode_response, Action, ConfigureReleaseRequest, ConfigureReleaseResponse,
    Envelope, PrepareTerraformRequest, PrepareTerraformResponse, SetupRequest, SetupResponse,
    UploadReleaseRequest, UploadReleaseResponse,
};
use crate::server::session::Session;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Routes raw requests to a [`Handler`] and keeps the release session.
///
/// Requests are handled one at a time, so the session needs no locking.
pub struct Dispatcher<H> {
    handler: H,
    release_dir: PathBuf,
    session: Session,
}

impl<H: Handler> Dispatcher<H> {
    pub fn new(handler: H, release_dir: impl Into<PathBuf>) -> Self {
        Self {
            handler,
            release_dir: release_dir.into(),
            session: Session::new(),
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn release_dir(&self) -> &Path {
        &self.release_dir
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Handle one raw request and return the encoded response.
    pub async fn dispatch(&mut self, raw: &[u8]) -> Result<Vec<u8>> {
        let action = Envelope::decode(raw)?;
        debug!(%action, bytes = raw.len(), "dispatching request");

        let handler_err = |source| Error::Handler { action, source };

        match action {
            Action::Setup => {
                let mut request: SetupRequest = decode_request(action, raw)?;
                request.resolve_required_env();
                let mut response = SetupResponse::default();
                self.handler
                    .setup(&request, &mut response)
                    .await
                    .map_err(handler_err)?;
                encode_response(&response)
            }
            Action::ConfigureRelease => {
                let mut request: ConfigureReleaseRequest = decode_request(action, raw)?;
                request.resolve_required_env();
                let mut response = ConfigureReleaseResponse::default();
                self.handler
                    .configure_release(&request, &mut response)
                    .await
                    .map_err(handler_err)?;
                debug!(
                    component = %request.component,
                    version = %request.version,
                    "release session updated"
                );
                self.session.replace(request);
                encode_response(&response)
            }
            Action::UploadRelease => {
                let request: UploadReleaseRequest = decode_request(action, raw)?;
                let mut response = UploadReleaseResponse::default();
                self.handler
                    .upload_release(
                        &request,
                        &mut response,
                        self.session.current(),
                        &self.release_dir,
                    )
                    .await
                    .map_err(handler_err)?;
                encode_response(&response)
            }
            Action::PrepareTerraform => {
                let request: PrepareTerraformRequest = decode_request(action, raw)?;
                let mut response = PrepareTerraformResponse::default();
                self.handler
                    .prepare_terraform(&request, &mut response, &self.release_dir)
                    .await
                    .map_err(handler_err)?;
                encode_response(&response)
            }
        }
    }
}
