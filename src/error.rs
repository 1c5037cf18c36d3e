use thiserror::Error;

pub type Result<T> = std::result::Result<T, OdeError>;

#[derive(Error, Debug)]
pub enum OdeError {
    #[error("{kind} id \"{id}\" is already in use")]
    DuplicateId { kind: &'static str, id: String },

    #[error("no {kind} with id \"{id}\"")]
    UnknownId { kind: &'static str, id: String },

    #[error("invalid {what}: {detail}")]
    InvalidRange { what: &'static str, detail: String },

    #[error("{kind} \"{id}\" is already attached to \"{owner}\"")]
    InUse {
        kind: &'static str,
        id: String,
        owner: String,
    },

    #[error("malformed object #{index} in frame {frame_number}: {reason}")]
    MalformedObject {
        frame_number: u64,
        index: usize,
        reason: String,
    },

    #[error("capture {capture_id} failed: {reason}")]
    CaptureIo { capture_id: u64, reason: String },
}

impl OdeError {
    pub fn duplicate(kind: &'static str, id: &str) -> Self {
        OdeError::DuplicateId {
            kind,
            id: String::from(id),
        }
    }

    pub fn unknown(kind: &'static str, id: &str) -> Self {
        OdeError::UnknownId {
            kind,
            id: String::from(id),
        }
    }

    pub fn invalid<S: Into<String>>(what: &'static str, detail: S) -> Self {
        OdeError::InvalidRange {
            what,
            detail: detail.into(),
        }
    }

    /// Errors reported synchronously while building or wiring the engine;
    /// none of them change existing state.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            OdeError::DuplicateId { .. }
                | OdeError::UnknownId { .. }
                | OdeError::InvalidRange { .. }
                | OdeError::InUse { .. }
        )
    }
}
