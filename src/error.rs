use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::protocol::Action;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("could not create socket dir {path:?}: {source}")]
    SocketDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not listen on unix domain socket {path:?}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("error accepting connection: {0}")]
    Accept(#[source] io::Error),

    #[error("accept loop for {0:?} stopped unexpectedly")]
    AcceptLoopClosed(PathBuf),

    #[error("error reading request from unix domain socket {path:?}: {source}")]
    ReadRequest {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("error reading request: {0}")]
    MalformedEnvelope(#[source] serde_json::Error),

    #[error("unknown message type: {0:?}")]
    UnknownAction(String),

    #[error("error parsing {action} request: {source}")]
    DecodeRequest {
        action: Action,
        #[source]
        source: serde_json::Error,
    },

    #[error("error in {action}: {source:#}")]
    Handler {
        action: Action,
        #[source]
        source: anyhow::Error,
    },

    #[error("error encoding response: {0}")]
    EncodeResponse(#[source] serde_json::Error),

    #[error("error writing response: {0}")]
    WriteResponse(#[source] io::Error),

    #[error("could not connect to unix domain socket {path:?} after {attempts} attempts: {source}")]
    Connect {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: io::Error,
    },

    #[error("error copying to {path:?}: {source}")]
    ForwardRequest {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("error copying from {path:?}: {source}")]
    ForwardResponse {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no component")]
    MissingComponent,

    #[error("error in release zip, unexpected absolute path {0:?}")]
    AbsolutePath(String),

    #[error("error in release zip, expected prefix {expected:?}, got {actual:?}")]
    PrefixMismatch { expected: String, actual: String },

    #[error("error in release zip, path escapes release directory: {0:?}")]
    UnsafePath(String),

    #[error("did not find terraform-image in zip")]
    MissingTerraformImage,

    #[error("terraform-image in zip is not valid UTF-8: {0}")]
    InvalidTerraformImage(#[source] std::string::FromUtf8Error),

    #[error("wrong checksum for plugin {path:?} - expected {expected:?}, got {actual:?}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("invalid saved plugins manifest: {0}")]
    Manifest(#[source] serde_json::Error),

    #[error("error saving plugin {path:?}: {source:#}")]
    SaveSubResource {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("error loading plugin {path:?}: {source:#}")]
    LoadSubResource {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("error walking release directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl Error {
    /// Contract violations between the host and this process.
    ///
    /// The peer is a co-deployed, trusted component, so these indicate a
    /// version mismatch rather than bad input. Callers terminate on them.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Error::MalformedEnvelope(_)
                | Error::UnknownAction(_)
                | Error::DecodeRequest { .. }
                | Error::AbsolutePath(_)
                | Error::PrefixMismatch { .. }
                | Error::UnsafePath(_)
                | Error::MissingTerraformImage
                | Error::InvalidTerraformImage(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_mismatch_names_both_prefixes() {
        let err = Error::PrefixMismatch {
            expected: "svc-1.0".to_string(),
            actual: "other-2.0".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("\"svc-1.0\""));
        assert!(msg.contains("\"other-2.0\""));
        assert!(err.is_protocol_violation());
    }

    #[test]
    fn test_checksum_mismatch_is_not_protocol_violation() {
        let err = Error::ChecksumMismatch {
            path: ".terraform/plugins/foo".to_string(),
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        };
        assert!(!err.is_protocol_violation());
        assert_eq!(
            err.to_string(),
            "wrong checksum for plugin \".terraform/plugins/foo\" - expected \"aa\", got \"bb\""
        );
    }

    #[test]
    fn test_handler_error_keeps_context_chain() {
        let source = anyhow::anyhow!("bucket missing").context("uploading release");
        let err = Error::Handler {
            action: Action::UploadRelease,
            source,
        };
        assert_eq!(
            err.to_string(),
            "error in upload_release: uploading release: bucket missing"
        );
    }
}
