use thiserror::Error;

/// Failure taxonomy for the relay and poll operations.
///
/// Every internal failure (signature mismatch, backend error, missing
/// configuration) is mapped into one of these variants at the service boundary;
/// raw backend error text never crosses it.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },
    #[error("token missing, invalid, or bound to another session")]
    Unauthorized,
    #[error("chat is not configured")]
    NotConfigured,
    #[error("thread directory unavailable: {detail}")]
    DirectoryUnavailable { detail: String },
    #[error("thread is not yet queryable")]
    ThreadNotReady,
}

impl ChatError {
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput { reason: reason.into() }
    }

    /// True for failures a polling client should retry on its normal schedule.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ThreadNotReady)
    }

    /// Visitor-safe message for the failure. Transient failures are not
    /// surfaced to the visitor at all; the rest direct to the phone fallback.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidInput { reason } => reason.clone(),
            Self::Unauthorized => {
                "This chat session has expired. Send a new message to start over.".to_string()
            }
            Self::NotConfigured | Self::DirectoryUnavailable { .. } => {
                "Chat is temporarily unavailable. Please try again or call us at +1 (555) 010-0199."
                    .to_string()
            }
            Self::ThreadNotReady => "Waiting for the conversation to come online.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ChatError;

    #[test]
    fn invalid_input_is_surfaced_verbatim() {
        let error = ChatError::invalid_input("message must not be empty");
        assert_eq!(error.user_message(), "message must not be empty");
    }

    #[test]
    fn directory_detail_never_reaches_the_user_message() {
        let error =
            ChatError::DirectoryUnavailable { detail: "connect ECONNREFUSED 10.0.0.7".to_string() };
        assert!(!error.user_message().contains("ECONNREFUSED"));
        assert!(error.user_message().contains("call us"));
    }

    #[test]
    fn only_thread_not_ready_is_transient() {
        assert!(ChatError::ThreadNotReady.is_transient());
        assert!(!ChatError::Unauthorized.is_transient());
        assert!(!ChatError::NotConfigured.is_transient());
    }
}
