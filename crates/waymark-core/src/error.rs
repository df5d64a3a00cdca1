//! Error taxonomy shared by the core and every gateway implementation.
//!
//! Gateways convert transport, HTTP and decoding failures into a
//! [`MessageError`] before the result reaches the core, so the core only ever
//! matches on these variants.

use crate::location::{LocationKey, RegionId};
use crate::message::{MessageId, TextRejection};

/// Everything that can go wrong with a message operation.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    /// The remote call did not complete (connection, timeout, 5xx, bad body).
    #[error("network failure: {0}")]
    TransientNetworkFailure(String),

    /// No credential yet, or the backend rejected it.
    #[error("not registered yet")]
    AuthenticationMissing,

    /// The tile is already claimed by another message.
    #[error("location {0} is already taken")]
    PlacementConflict(LocationKey),

    /// Stored region disagrees with the one computed from the coordinates.
    #[error("message {id} claims region {stored} but its tile is in region {computed}")]
    DataIntegrityViolation {
        /// Offending record.
        id: MessageId,
        /// Region computed from `(x, y)`.
        computed: RegionId,
        /// Region carried by the record.
        stored: RegionId,
    },

    /// The viewer already voted on this message this session.
    #[error("already voted on {0}")]
    AlreadyVoted(MessageId),

    /// The viewer already reported this message this session.
    #[error("already reported {0}")]
    AlreadyReported(MessageId),

    /// The backend understood the request and refused it.
    #[error("refused: {0}")]
    Refused(String),

    /// Message body failed local validation.
    #[error("invalid message text: {0}")]
    InvalidText(#[from] TextRejection),

    /// No viewer identity is available.
    #[error("not logged in")]
    NotLoggedIn,

    /// The id is not known to the client.
    #[error("unknown message {0}")]
    UnknownMessage(MessageId),
}

impl MessageError {
    /// Whether retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, MessageError::TransientNetworkFailure(_))
    }

    /// Chat-style notice shown to the viewer, or `None` for errors that are
    /// only logged.
    pub fn user_notice(&self) -> Option<String> {
        match self {
            MessageError::TransientNetworkFailure(_) | MessageError::DataIntegrityViolation { .. } => {
                None
            }
            MessageError::AuthenticationMissing => Some(
                "Not registered yet. Please wait for registration to complete.".to_string(),
            ),
            MessageError::PlacementConflict(_) => Some(
                "You cannot place a message here - this spot is already taken!".to_string(),
            ),
            MessageError::AlreadyVoted(_) => {
                Some("You have already voted on this message.".to_string())
            }
            MessageError::AlreadyReported(_) => {
                Some("You have already reported this message.".to_string())
            }
            MessageError::Refused(reason) => Some(reason.clone()),
            MessageError::InvalidText(TextRejection::Empty) => {
                Some("Message cannot be empty.".to_string())
            }
            MessageError::InvalidText(TextRejection::TooLong(_)) => {
                Some("Message too long (max 100 characters).".to_string())
            }
            MessageError::NotLoggedIn => Some("You must be logged in to do that.".to_string()),
            MessageError::UnknownMessage(_) => Some("That message no longer exists.".to_string()),
        }
    }
}
