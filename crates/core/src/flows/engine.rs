use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::flows::states::{
    ConversationAction, ConversationEvent, ConversationState, TransitionOutcome,
};
use crate::lead::is_valid_email;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeQuestion {
    pub prompt: String,
    pub options: Vec<String>,
}

impl IntakeQuestion {
    pub fn new(prompt: impl Into<String>, options: &[&str]) -> Self {
        Self {
            prompt: prompt.into(),
            options: options.iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactFailure {
    EmptyName,
    InvalidEmail,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConversationError {
    #[error("answer targets step {supplied} but the conversation is at step {expected}")]
    StepMismatch { expected: usize, supplied: usize },
    #[error("question {step} has no option {option}")]
    UnknownOption { step: usize, option: usize },
    #[error("contact details rejected: {failures:?}")]
    ContactRejected { failures: Vec<ContactFailure> },
    #[error("message must not be empty")]
    EmptyMessage,
    #[error("event {event:?} is not valid in state {state:?}")]
    InvalidTransition { state: ConversationState, event: ConversationEvent },
}

/// The fixed intake sequence followed by contact collection and free chat.
#[derive(Clone, Debug)]
pub struct ConversationFlow {
    questions: Vec<IntakeQuestion>,
}

impl Default for ConversationFlow {
    fn default() -> Self {
        Self::new(default_questions())
    }
}

pub fn default_questions() -> Vec<IntakeQuestion> {
    vec![
        IntakeQuestion::new(
            "What kind of project are you planning?",
            &["New website", "Redesign", "Web application", "Something else"],
        ),
        IntakeQuestion::new(
            "When would you like to start?",
            &["As soon as possible", "Within a month", "This quarter", "Just exploring"],
        ),
        IntakeQuestion::new(
            "What budget range are you working with?",
            &["Under $5k", "$5k - $20k", "$20k - $50k", "Over $50k"],
        ),
    ]
}

impl ConversationFlow {
    pub fn new(questions: Vec<IntakeQuestion>) -> Self {
        Self { questions }
    }

    pub fn initial_state(&self) -> ConversationState {
        if self.questions.is_empty() {
            ConversationState::CollectingContact
        } else {
            ConversationState::Questionnaire { step: 0 }
        }
    }

    pub fn question(&self, step: usize) -> Option<&IntakeQuestion> {
        self.questions.get(step)
    }

    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    pub fn transition(
        &self,
        current: &ConversationState,
        event: ConversationEvent,
    ) -> Result<TransitionOutcome, ConversationError> {
        match (current, &event) {
            (
                ConversationState::Questionnaire { step },
                ConversationEvent::OptionSelected { step: supplied, option },
            ) => self.answer(*step, *supplied, *option, event.clone()),
            (
                ConversationState::CollectingContact,
                ConversationEvent::ContactSubmitted { name, email },
            ) => self.accept_contact(name, email, event.clone()),
            (ConversationState::FreeChat, ConversationEvent::MessageSubmitted { text }) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return Err(ConversationError::EmptyMessage);
                }
                let relay_text = trimmed.to_string();
                Ok(TransitionOutcome {
                    from: ConversationState::FreeChat,
                    to: ConversationState::FreeChat,
                    event,
                    actions: vec![ConversationAction::SendViaRelay { text: relay_text }],
                })
            }
            (ConversationState::FreeChat, ConversationEvent::DetailsSkipped) => {
                Ok(TransitionOutcome {
                    from: ConversationState::FreeChat,
                    to: ConversationState::FreeChat,
                    event,
                    actions: Vec::new(),
                })
            }
            (state, _) => {
                Err(ConversationError::InvalidTransition { state: state.clone(), event })
            }
        }
    }

    fn answer(
        &self,
        step: usize,
        supplied: usize,
        option: usize,
        event: ConversationEvent,
    ) -> Result<TransitionOutcome, ConversationError> {
        if supplied != step {
            return Err(ConversationError::StepMismatch { expected: step, supplied });
        }
        let question = self
            .questions
            .get(step)
            .ok_or(ConversationError::StepMismatch { expected: step, supplied })?;
        if option >= question.options.len() {
            return Err(ConversationError::UnknownOption { step, option });
        }

        let next = step + 1;
        let mut actions = vec![ConversationAction::RecordAnswer { step, option }];
        let to = if next < self.questions.len() {
            actions.push(ConversationAction::PromptQuestion { step: next });
            ConversationState::Questionnaire { step: next }
        } else {
            actions.push(ConversationAction::PromptForContact);
            ConversationState::CollectingContact
        };

        Ok(TransitionOutcome { from: ConversationState::Questionnaire { step }, to, event, actions })
    }

    fn accept_contact(
        &self,
        name: &str,
        email: &str,
        event: ConversationEvent,
    ) -> Result<TransitionOutcome, ConversationError> {
        let mut failures = Vec::new();
        if name.trim().is_empty() {
            failures.push(ContactFailure::EmptyName);
        }
        if !is_valid_email(email) {
            failures.push(ContactFailure::InvalidEmail);
        }
        if !failures.is_empty() {
            // Validation happens locally; the state does not change and no
            // server round-trip is made for a bad submission.
            return Err(ConversationError::ContactRejected { failures });
        }

        Ok(TransitionOutcome {
            from: ConversationState::CollectingContact,
            to: ConversationState::FreeChat,
            event,
            actions: vec![
                ConversationAction::RecordContact {
                    name: name.trim().to_string(),
                    email: email.trim().to_string(),
                },
                ConversationAction::PromptForProjectDetails,
            ],
        })
    }
}
