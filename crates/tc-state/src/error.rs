use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("unknown device {0}")]
    UnknownDevice(String),

    #[error("unknown user {0}")]
    UnknownUser(String),

    #[error("unknown group")]
    UnknownGroup,

    #[error("device already exists")]
    DuplicateDevice,

    #[error("device already revoked")]
    AlreadyRevoked,

    #[error("corrupted or tampered verification key")]
    InvalidVerification,

    #[error(transparent)]
    Wire(#[from] tc_wire::WireError),

    #[error(transparent)]
    Primitive(#[from] tc_primitives::PrimitiveError),
}
