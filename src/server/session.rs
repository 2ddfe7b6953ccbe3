//! Release session carried between requests.

use crate::protocol::ConfigureReleaseRequest;

/// The last accepted `configure_release` request.
///
/// Single slot: a later `configure_release` replaces the earlier one, and
/// nothing ever clears it for the life of the process.
#[derive(Debug, Default)]
pub struct Session {
    current: Option<ConfigureReleaseRequest>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, request: ConfigureReleaseRequest) {
        self.current = Some(request);
    }

    pub fn current(&self) -> Option<&ConfigureReleaseRequest> {
        self.current.as_ref()
    }
}
