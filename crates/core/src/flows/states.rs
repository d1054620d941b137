use serde::{Deserialize, Serialize};

/// Widget-side conversation phase. Strictly linear; there is no user-visible
/// way back to an earlier phase.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationState {
    Questionnaire { step: usize },
    CollectingContact,
    FreeChat,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationEvent {
    /// The visitor picked `option` for the question shown at `step`.
    OptionSelected { step: usize, option: usize },
    ContactSubmitted { name: String, email: String },
    /// The visitor declined the optional project-details prompt.
    DetailsSkipped,
    MessageSubmitted { text: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationAction {
    RecordAnswer { step: usize, option: usize },
    PromptQuestion { step: usize },
    PromptForContact,
    RecordContact { name: String, email: String },
    PromptForProjectDetails,
    SendViaRelay { text: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: ConversationState,
    pub to: ConversationState,
    pub event: ConversationEvent,
    pub actions: Vec<ConversationAction>,
}
