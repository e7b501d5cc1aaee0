use parley_types::api::SendMessageRequest;
use parley_types::events::ChatMessagePayload;
use parley_types::models::{MediaFields, MessageKind};

use crate::error::ValidationError;

pub const MAX_PROVISIONAL_ID_LEN: usize = 128;

/// A chat submission that passed request validation.
///
/// `room` is still the raw reference; resolving it is the pipeline's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub provisional_id: Option<String>,
    pub room: String,
    pub content: String,
    pub kind: MessageKind,
    pub media: MediaFields,
}

impl Submission {
    /// Validate a gateway `chat_message`. The ack id is handed back either way
    /// so a rejection can still be correlated.
    pub fn from_command(
        payload: ChatMessagePayload,
    ) -> (Option<u64>, Result<Self, ValidationError>) {
        let ChatMessagePayload {
            ack_id,
            provisional_id,
            room,
            content,
            kind,
            media,
        } = payload;
        let result = validate(provisional_id, room, content, kind.as_deref(), media);
        (ack_id, result)
    }

    /// Validate an HTTP send for the room named in the path.
    pub fn from_request(
        room: String,
        request: SendMessageRequest,
    ) -> Result<Self, ValidationError> {
        let media = request.media();
        validate(
            request.provisional_id,
            room,
            request.content,
            request.kind.as_deref(),
            media,
        )
    }
}

pub fn validate(
    provisional_id: Option<String>,
    room: String,
    content: String,
    kind: Option<&str>,
    media: MediaFields,
) -> Result<Submission, ValidationError> {
    let tag = kind.unwrap_or_default();
    let kind =
        MessageKind::from_wire(tag).ok_or_else(|| ValidationError::InvalidType(tag.to_string()))?;

    if kind == MessageKind::Text && content.trim().is_empty() {
        return Err(ValidationError::EmptyContent);
    }

    if let Some(pid) = &provisional_id {
        let len = pid.chars().count();
        if len == 0 || len > MAX_PROVISIONAL_ID_LEN {
            return Err(ValidationError::InvalidProvisionalId);
        }
    }

    // Attachment fields only mean something for media kinds
    let media = if kind.is_media() { media } else { MediaFields::default() };

    Ok(Submission {
        provisional_id,
        room,
        content,
        kind,
        media,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(content: &str) -> Result<Submission, ValidationError> {
        validate(None, "room".into(), content.into(), None, MediaFields::default())
    }

    #[test]
    fn missing_type_means_text() {
        let submission = text("hi").unwrap();
        assert_eq!(submission.kind, MessageKind::Text);
    }

    #[test]
    fn whitespace_text_is_empty() {
        assert_eq!(text("").unwrap_err(), ValidationError::EmptyContent);
        assert_eq!(text(" \n\t").unwrap_err(), ValidationError::EmptyContent);
    }

    #[test]
    fn media_may_have_no_content() {
        let media = MediaFields {
            file_url: Some("https://cdn.example/a.m4a".into()),
            duration: Some(5),
            file_size: Some(1000),
        };
        let submission =
            validate(None, "room".into(), String::new(), Some("voice"), media.clone()).unwrap();
        assert_eq!(submission.kind, MessageKind::Voice);
        assert_eq!(submission.media, media);
    }

    #[test]
    fn text_drops_attachment_fields() {
        let media = MediaFields {
            file_url: Some("https://cdn.example/x".into()),
            ..Default::default()
        };
        let submission = validate(None, "room".into(), "hi".into(), Some("text"), media).unwrap();
        assert!(submission.media.is_empty());
    }

    #[test]
    fn unknown_type_is_rejected() {
        let media = MediaFields::default();
        let err = validate(None, "room".into(), "hi".into(), Some("sticker"), media).unwrap_err();
        assert_eq!(err, ValidationError::InvalidType("sticker".into()));
    }

    #[test]
    fn provisional_id_length_is_bounded() {
        let ok = "p".repeat(MAX_PROVISIONAL_ID_LEN);
        let accepted = validate(Some(ok), "room".into(), "hi".into(), None, MediaFields::default());
        assert!(accepted.is_ok());

        for bad in [String::new(), "p".repeat(MAX_PROVISIONAL_ID_LEN + 1)] {
            let err = validate(Some(bad), "room".into(), "hi".into(), None, MediaFields::default())
                .unwrap_err();
            assert_eq!(err, ValidationError::InvalidProvisionalId);
        }
    }

    #[test]
    fn command_keeps_ack_id_on_rejection() {
        let payload: ChatMessagePayload = serde_json::from_value(serde_json::json!({
            "ack_id": 7,
            "room": "r",
            "content": "   ",
        }))
        .unwrap();
        let (ack_id, result) = Submission::from_command(payload);
        assert_eq!(ack_id, Some(7));
        assert_eq!(result.unwrap_err(), ValidationError::EmptyContent);
    }
}
