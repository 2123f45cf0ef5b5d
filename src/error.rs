use serde::Serialize;
use thiserror::Error;

/// Patterns (lowercase) that indicate sensitive data not safe for UI display.
/// Used by `contains_sensitive()` for case-insensitive matching.
pub(crate) const SENSITIVE_PATTERNS: &[&str] = &[
    "bearer ",
    "authorization:",
    "api_key",
    "access_token",
    "xoxb-",
];

/// Returns true if the message contains any sensitive pattern (case-insensitive).
fn contains_sensitive(msg: &str) -> bool {
    let lower = msg.to_ascii_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Sanitizes a message for UI display.
/// If sensitive content is detected, returns the fallback instead.
pub(crate) fn sanitize_message(msg: &str, fallback: &str) -> String {
    if contains_sensitive(msg) {
        fallback.into()
    } else {
        msg.to_string()
    }
}

/// User-friendly error presentation for the frontend.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPresentation {
    pub title: String,
    pub message: String,
    pub action: Option<String>,
}

/// Application-wide error type.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Auth ──────────────────────────────────────────────────────────────────
    #[error("Not authenticated")]
    NotAuthenticated,

    // ── API ───────────────────────────────────────────────────────────────────
    #[error("Backend error: {0}")]
    ApiError(String),

    #[error("Rate limited")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    // ── Network ───────────────────────────────────────────────────────────────
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    // ── Configuration ─────────────────────────────────────────────────────────
    #[error("Configuration error: {0}")]
    Config(String),

    // ── Generic fallback ──────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Describes the failure in one line for a synthetic result row.
    ///
    /// Unlike `Display`, the text is passed through the sensitive-pattern filter.
    pub fn describe(&self) -> String {
        sanitize_message(&self.to_string(), "The request to the server failed.")
    }

    /// Converts the error into a user-friendly presentation suitable for UI display.
    /// Never leaks secrets, tokens, or sensitive URL parameters.
    pub fn to_presentation(&self) -> ErrorPresentation {
        match self {
            // ── Auth ──────────────────────────────────────────────────────────
            AppError::NotAuthenticated => ErrorPresentation {
                title: "Not Logged In".into(),
                message: "Your session is missing or has expired.".into(),
                action: Some("Log in again".into()),
            },

            // ── API ───────────────────────────────────────────────────────────
            AppError::ApiError(msg) => ErrorPresentation {
                title: "Server Error".into(),
                message: sanitize_message(msg, "The server rejected the request."),
                action: None,
            },

            AppError::RateLimited { retry_after_secs } => {
                let wait_msg = match retry_after_secs {
                    Some(secs) => format!("Please wait {} seconds before trying again.", secs),
                    None => "Please wait a moment before trying again.".into(),
                };
                ErrorPresentation {
                    title: "Too Many Requests".into(),
                    message: format!("The server is limiting requests. {}", wait_msg),
                    action: Some("Wait and retry".into()),
                }
            }

            AppError::NotFound(msg) => ErrorPresentation {
                title: "Not Found".into(),
                message: sanitize_message(msg, "The requested item was not found."),
                action: None,
            },

            AppError::InvalidResponse(_) => ErrorPresentation {
                title: "Unexpected Response".into(),
                message: "The server sent a response that could not be understood.".into(),
                action: Some("Try again".into()),
            },

            // ── Network ───────────────────────────────────────────────────────
            AppError::ConnectionFailed(_) => ErrorPresentation {
                title: "Connection Failed".into(),
                message: "Could not reach the server. Please check your internet connection.".into(),
                action: Some("Check network and retry".into()),
            },

            // ── Configuration ─────────────────────────────────────────────────
            AppError::Config(msg) => ErrorPresentation {
                title: "Configuration Problem".into(),
                message: sanitize_message(msg, "The application is not configured correctly."),
                action: Some("Check the application settings".into()),
            },

            // ── Generic ───────────────────────────────────────────────────────
            AppError::Internal(_) => ErrorPresentation {
                title: "Unexpected Error".into(),
                message: "Something went wrong. Please try again.".into(),
                action: Some("Try again".into()),
            },
        }
    }
}

// Allow AppError to be returned from Tauri commands
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_presentation().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_variants() -> Vec<AppError> {
        vec![
            AppError::NotAuthenticated,
            AppError::ApiError("validation failed".into()),
            AppError::RateLimited { retry_after_secs: Some(30) },
            AppError::RateLimited { retry_after_secs: None },
            AppError::NotFound("task t1".into()),
            AppError::InvalidResponse("missing field `status`".into()),
            AppError::ConnectionFailed("timeout".into()),
            AppError::Config("CARETEAM_API_URL missing".into()),
            AppError::Internal("something broke".into()),
        ]
    }

    #[test]
    fn all_variants_have_nonempty_title_and_message() {
        for variant in all_variants() {
            let presentation = variant.to_presentation();
            assert!(
                !presentation.title.trim().is_empty(),
                "Empty title for {:?}",
                variant
            );
            assert!(
                !presentation.message.trim().is_empty(),
                "Empty message for {:?}",
                variant
            );
        }
    }

    #[test]
    fn rate_limited_mentions_wait_time() {
        let presentation = AppError::RateLimited { retry_after_secs: Some(30) }.to_presentation();
        let action = presentation.action.expect("RateLimited should have action");
        assert!(action.to_lowercase().contains("wait"));
        assert!(presentation.message.contains("30"));
    }

    #[test]
    fn serialization_produces_presentation_fields() {
        for variant in all_variants() {
            let json = serde_json::to_value(&variant).unwrap();
            assert!(json.get("title").is_some(), "{:?} missing title", variant);
            assert!(json.get("message").is_some(), "{:?} missing message", variant);
            assert!(json.get("action").is_some(), "{:?} missing action", variant);
        }
    }

    #[test]
    fn describe_includes_cause() {
        let err = AppError::ConnectionFailed("connection refused".into());
        assert_eq!(err.describe(), "Connection failed: connection refused");
    }

    #[test]
    fn no_secret_leakage() {
        let leaky = vec![
            AppError::ApiError("Authorization: Bearer abc123".into()),
            AppError::ConnectionFailed("token xoxb-1234 rejected".into()),
            AppError::Config("api_key=xyz".into()),
            AppError::NotFound("access_token expired".into()),
        ];

        for variant in leaky {
            let presentation = variant.to_presentation();
            let shown = format!(
                "{} {} {} {}",
                presentation.title,
                presentation.message,
                presentation.action.as_deref().unwrap_or(""),
                variant.describe()
            )
            .to_ascii_lowercase();

            for pattern in SENSITIVE_PATTERNS {
                assert!(
                    !shown.contains(pattern),
                    "{:?} leaks sensitive pattern {}",
                    variant,
                    pattern
                );
            }
        }
    }
}
