use thiserror::Error;

use parley_db::StoreError;
use parley_types::api::AckReason;

/// Connection-level: the handshake is refused and the socket never opens.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing credential")]
    MissingCredential,
    #[error("invalid credential: {0}")]
    InvalidCredential(#[from] jsonwebtoken::errors::Error),
}

/// Request-level problems caught before the pipeline runs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("text message has no content")]
    EmptyContent,
    #[error("unknown message type '{0}'")]
    InvalidType(String),
    #[error(
        "provisional id must be 1..={max} characters",
        max = crate::validate::MAX_PROVISIONAL_ID_LEN
    )]
    InvalidProvisionalId,
}

impl ValidationError {
    pub fn reason(&self) -> AckReason {
        match self {
            Self::EmptyContent => AckReason::EmptyContent,
            Self::InvalidType(_) => AckReason::InvalidType,
            Self::InvalidProvisionalId => AckReason::InvalidProvisionalId,
        }
    }
}

/// Why the message pipeline refused a submission.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("connection is not authenticated")]
    Unauthorized,
    #[error("room reference does not parse")]
    InvalidRoom,
    #[error("sender is not a member of the room")]
    NotInRoom,
    #[error("sender is blocked by a room participant")]
    Blocked,
    #[error("provisional id already used for another room")]
    ProvisionalIdConflict,
    #[error("encryption failed: {0}")]
    Encryption(String),
    #[error("message save failed: {0}")]
    Save(#[source] StoreError),
}

impl SubmitError {
    pub fn reason(&self) -> AckReason {
        match self {
            Self::Unauthorized => AckReason::Unauthorized,
            Self::InvalidRoom => AckReason::InvalidRoom,
            Self::NotInRoom => AckReason::NotInRoom,
            Self::Blocked => AckReason::Blocked,
            Self::ProvisionalIdConflict => AckReason::InvalidProvisionalId,
            Self::Encryption(_) => AckReason::EncryptionFailed,
            Self::Save(_) => AckReason::MessageSaveFailed,
        }
    }
}

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("reader is not a member of the room")]
    NotInRoom,
    #[error("read receipt update failed: {0}")]
    Store(#[from] StoreError),
}

impl ReadError {
    pub fn reason(&self) -> AckReason {
        match self {
            Self::NotInRoom => AckReason::NotInRoom,
            Self::Store(_) => AckReason::MessageSaveFailed,
        }
    }
}

#[derive(Debug, Error)]
pub enum DeleteError {
    #[error("message not found")]
    NotFound,
    #[error("only the author may delete, only the deleter may restore")]
    Forbidden,
    #[error("message is already deleted")]
    AlreadyDeleted,
    #[error("message is not deleted")]
    NotDeleted,
    #[error("message update failed: {0}")]
    Store(#[from] StoreError),
}

impl DeleteError {
    pub fn reason(&self) -> AckReason {
        match self {
            Self::NotFound => AckReason::NotFound,
            Self::Forbidden => AckReason::Forbidden,
            Self::AlreadyDeleted => AckReason::AlreadyDeleted,
            Self::NotDeleted => AckReason::NotDeleted,
            Self::Store(_) => AckReason::MessageSaveFailed,
        }
    }
}
