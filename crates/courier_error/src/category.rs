//! Failure classification.
//!
//! Status codes from the remote service are coarse: most distinct failures arrive as
//! `400`. The description carries the specific reason, so it is matched first against
//! an ordered phrase table, and the status code table is consulted only when no phrase
//! matches. Finding no category is a valid outcome.

use serde::Serialize;
use std::time::Duration;

/// Stable, comparable failure category.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    strum::Display,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Credential rejected (401)
    Unauthorized,
    /// Access denied (403)
    Forbidden,
    /// Method or resource not found (404)
    NotFound,
    /// Throttled by the service (429)
    TooManyRequests,
    /// Edit would leave the message unchanged
    MessageNotModified,
    /// The recipient blocked the bot
    BotBlocked,
    /// The bot was removed from the chat
    BotKicked,
    /// The recipient's account is deactivated
    UserDeactivated,
    /// Destination chat does not exist or is not visible
    ChatNotFound,
    /// Referenced user does not exist
    UserNotFound,
    /// Message targeted by an edit is gone
    MessageToEditNotFound,
    /// Message targeted by a delete is gone
    MessageToDeleteNotFound,
    /// Message exists but may not be deleted
    MessageCantBeDeleted,
    /// The bot lacks the rights for this action
    NotEnoughRights,
    /// Callback query expired before it was answered
    QueryTooOld,
    /// The user never started a conversation with the bot
    CantInitiateConversation,
    /// Group was upgraded to a supergroup
    ChatMigrated,
    /// Message text exceeds the allowed length
    MessageTooLong,
    /// File identifier is malformed or unknown
    InvalidFileId,
    /// Another consumer is polling with the same credential
    Conflict,
    /// Rate limited with an explicit delay hint
    FloodWait,
    /// A circuit breaker rejected the call
    CircuitOpen,
    /// The caller cancelled the call
    Cancelled,
    /// Every permitted attempt failed
    RetriesExhausted,
}

/// Known description phrases, checked in order. Phrases are lowercase.
const DESCRIPTION_TABLE: &[(&str, ErrorCategory)] = &[
    ("message is not modified", ErrorCategory::MessageNotModified),
    ("bot was blocked by the user", ErrorCategory::BotBlocked),
    ("bot was kicked", ErrorCategory::BotKicked),
    ("user is deactivated", ErrorCategory::UserDeactivated),
    ("chat not found", ErrorCategory::ChatNotFound),
    ("user not found", ErrorCategory::UserNotFound),
    ("message to edit not found", ErrorCategory::MessageToEditNotFound),
    ("message to delete not found", ErrorCategory::MessageToDeleteNotFound),
    ("message can't be deleted", ErrorCategory::MessageCantBeDeleted),
    ("not enough rights", ErrorCategory::NotEnoughRights),
    ("query is too old", ErrorCategory::QueryTooOld),
    (
        "bot can't initiate conversation",
        ErrorCategory::CantInitiateConversation,
    ),
    (
        "group chat was upgraded to a supergroup chat",
        ErrorCategory::ChatMigrated,
    ),
    ("message is too long", ErrorCategory::MessageTooLong),
    ("wrong file identifier", ErrorCategory::InvalidFileId),
    (
        "terminated by other getupdates request",
        ErrorCategory::Conflict,
    ),
    ("retry after", ErrorCategory::FloodWait),
];

/// Map a status code and description onto a category.
///
/// Returns `None` when nothing matches.
///
/// # Examples
///
/// ```
/// use courier_error::{classify, ErrorCategory};
///
/// assert_eq!(
///     classify(403, "Forbidden: bot was blocked by the user"),
///     Some(ErrorCategory::BotBlocked)
/// );
/// assert_eq!(classify(403, "Forbidden"), Some(ErrorCategory::Forbidden));
/// assert_eq!(classify(400, "Bad Request: something new"), None);
/// ```
pub fn classify(code: u16, description: &str) -> Option<ErrorCategory> {
    let description = description.to_lowercase();
    DESCRIPTION_TABLE
        .iter()
        .find(|(phrase, _)| description.contains(phrase))
        .map(|(_, category)| *category)
        .or_else(|| classify_code(code))
}

fn classify_code(code: u16) -> Option<ErrorCategory> {
    match code {
        401 => Some(ErrorCategory::Unauthorized),
        403 => Some(ErrorCategory::Forbidden),
        404 => Some(ErrorCategory::NotFound),
        429 => Some(ErrorCategory::TooManyRequests),
        _ => None,
    }
}

/// Whether a status code denotes a transient failure.
///
/// Independent of category matching: 429 and 500 through 504 are retryable.
pub fn is_retryable_code(code: u16) -> bool {
    code == 429 || (500..=504).contains(&code)
}

/// Everything known about one failed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    /// Status code, absent for transport-level failures
    pub code: Option<u16>,
    /// Description or transport message
    pub description: String,
    /// Matched category, `None` when uncategorized
    pub category: Option<ErrorCategory>,
    /// Delay requested by the remote service
    pub retry_after: Option<Duration>,
    /// Whether another attempt may succeed
    pub retryable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_description_takes_precedence_over_code() {
        assert_eq!(
            classify(403, "Forbidden: bot was blocked by the user"),
            Some(ErrorCategory::BotBlocked)
        );
        assert_eq!(
            classify(400, "Bad Request: chat not found"),
            Some(ErrorCategory::ChatNotFound)
        );
    }

    #[test]
    fn test_case_insensitive_match() {
        assert_eq!(
            classify(
                400,
                "Bad Request: MESSAGE IS NOT MODIFIED: specified new message content"
            ),
            Some(ErrorCategory::MessageNotModified)
        );
        assert_eq!(
            classify(
                400,
                "Bad Request: Query Is Too Old and response timeout expired"
            ),
            Some(ErrorCategory::QueryTooOld)
        );
    }

    #[test]
    fn test_code_fallback() {
        assert_eq!(
            classify(401, "Unauthorized"),
            Some(ErrorCategory::Unauthorized)
        );
        assert_eq!(classify(403, "Forbidden"), Some(ErrorCategory::Forbidden));
        assert_eq!(classify(404, "Not Found"), Some(ErrorCategory::NotFound));
        assert_eq!(
            classify(429, "Too Many Requests"),
            Some(ErrorCategory::TooManyRequests)
        );
    }

    #[test]
    fn test_flood_wait_hint_beats_status() {
        assert_eq!(
            classify(429, "Too Many Requests: retry after 35"),
            Some(ErrorCategory::FloodWait)
        );
    }

    #[test]
    fn test_table_order_is_respected() {
        // "message to edit not found" must not be swallowed by a shorter phrase
        assert_eq!(
            classify(400, "Bad Request: message to edit not found"),
            Some(ErrorCategory::MessageToEditNotFound)
        );
        assert_eq!(
            classify(
                400,
                "Bad Request: not enough rights to send text messages to the chat"
            ),
            Some(ErrorCategory::NotEnoughRights)
        );
    }

    #[test]
    fn test_uncategorized() {
        assert_eq!(classify(400, "Bad Request: can't parse entities"), None);
        assert_eq!(classify(500, "Internal Server Error"), None);
        assert_eq!(classify(418, ""), None);
    }

    #[test]
    fn test_retryable_codes() {
        assert!(is_retryable_code(429));
        for code in 500..=504 {
            assert!(is_retryable_code(code), "{code} should be retryable");
        }
        for code in [400, 401, 403, 404, 409, 499, 505, 200] {
            assert!(!is_retryable_code(code), "{code} should not be retryable");
        }
    }

    #[test]
    fn test_category_names_are_snake_case() {
        assert_eq!(ErrorCategory::BotBlocked.as_ref(), "bot_blocked");
        assert_eq!(
            ErrorCategory::TooManyRequests.to_string(),
            "too_many_requests"
        );
        for category in ErrorCategory::iter() {
            assert!(!category.as_ref().contains(char::is_uppercase));
        }
    }
}
