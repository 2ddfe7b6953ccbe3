//! Wire protocol between the host and a config container.
//!
//! One JSON request per connection, terminated by the client half-closing its
//! write side. One JSON response, terminated by a newline and the server
//! closing the connection. There is no other framing.
//!
//! Requests carry an `Action` discriminator. The envelope is decoded first to
//! pick the action, then the same bytes are decoded into the action's request
//! type.

pub mod messages;

pub use messages::{
    ConfigureReleaseRequest, ConfigureReleaseResponse, PrepareTerraformRequest,
    PrepareTerraformResponse, ReleaseRequiredEnv, ReleaseRequirements, SetupRequest, SetupResponse,
    UploadReleaseRequest, UploadReleaseResponse,
};

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

// =============================================================================
// Action
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Setup,
    ConfigureRelease,
    UploadRelease,
    PrepareTerraform,
}

impl Action {
    pub const ALL: [Action; 4] = [
        Action::Setup,
        Action::ConfigureRelease,
        Action::UploadRelease,
        Action::PrepareTerraform,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Setup => "setup",
            Action::ConfigureRelease => "configure_release",
            Action::UploadRelease => "upload_release",
            Action::PrepareTerraform => "prepare_terraform",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| Error::UnknownAction(s.to_string()))
    }
}

// =============================================================================
// Envelope
// =============================================================================

/// The part of every request needed to route it.
#[derive(Debug, Deserialize, Serialize)]
pub struct Envelope {
    #[serde(rename = "Action", default)]
    pub action: String,
}

impl Envelope {
    /// Decode just the discriminator from a raw request.
    pub fn decode(raw: &[u8]) -> Result<Action> {
        let envelope: Envelope = serde_json::from_slice(raw).map_err(Error::MalformedEnvelope)?;
        envelope.action.parse()
    }
}

/// Decode the action-specific payload from the raw request bytes.
pub fn decode_request<T: DeserializeOwned>(action: Action, raw: &[u8]) -> Result<T> {
    serde_json::from_slice(raw).map_err(|source| Error::DecodeRequest { action, source })
}

/// Encode a response as a single newline-terminated JSON object.
pub fn encode_response<T: Serialize>(response: &T) -> Result<Vec<u8>> {
    let mut encoded = serde_json::to_vec(response).map_err(Error::EncodeResponse)?;
    encoded.push(b'\n');
    Ok(encoded)
}

// =============================================================================
// Request/response I/O
// =============================================================================

/// Read a whole request: everything the peer sends before it half-closes.
pub async fn read_request<R: AsyncRead + Unpin>(r: &mut R) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    r.read_to_end(&mut buf).await?;
    Ok(buf)
}

/// Write a pre-encoded response and close our write side.
pub async fn write_response<W: AsyncWrite + Unpin>(w: &mut W, response: &[u8]) -> Result<()> {
    w.write_all(response).await.map_err(Error::WriteResponse)?;
    w.flush().await.map_err(Error::WriteResponse)?;
    w.shutdown().await.map_err(Error::WriteResponse)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_wire_names() {
        for action in Action::ALL {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
        }
        assert_eq!(Action::ConfigureRelease.to_string(), "configure_release");
    }

    #[test]
    fn test_envelope_ignores_payload_fields() {
        let raw = br#"{"Action":"upload_release","TerraformImage":"img:1"}"#;
        assert_eq!(Envelope::decode(raw).unwrap(), Action::UploadRelease);
    }

    #[test]
    fn test_envelope_unknown_action() {
        let err = Envelope::decode(br#"{"Action":"stop"}"#).unwrap_err();
        assert!(matches!(err, Error::UnknownAction(ref a) if a == "stop"));
        assert!(err.is_protocol_violation());
    }

    #[test]
    fn test_envelope_missing_action_is_unknown() {
        let err = Envelope::decode(b"{}").unwrap_err();
        assert!(matches!(err, Error::UnknownAction(ref a) if a.is_empty()));
    }

    #[test]
    fn test_envelope_malformed_json() {
        let err = Envelope::decode(b"{not json").unwrap_err();
        assert!(matches!(err, Error::MalformedEnvelope(_)));
        assert!(err.is_protocol_violation());
    }

    #[test]
    fn test_decode_request_reports_action() {
        let err = decode_request::<SetupRequest>(Action::Setup, br#"{"Env":[1,2]}"#).unwrap_err();
        match err {
            Error::DecodeRequest { action, .. } => assert_eq!(action, Action::Setup),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_encode_response_is_newline_terminated() {
        let encoded = encode_response(&SetupResponse::default()).unwrap();
        assert_eq!(encoded, b"{\"Success\":true}\n");
    }

    #[tokio::test]
    async fn test_read_request_until_eof() {
        let mut input: &[u8] = br#"{"Action":"setup"}"#;
        let raw = read_request(&mut input).await.unwrap();
        assert_eq!(Envelope::decode(&raw).unwrap(), Action::Setup);
    }

    #[tokio::test]
    async fn test_write_response() {
        let mut out = Vec::new();
        write_response(&mut out, b"{}\n").await.unwrap();
        assert_eq!(out, b"{}\n");
    }
}
