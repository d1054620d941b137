pub mod engine;
pub mod states;

pub use engine::{ConversationError, ConversationFlow, ContactFailure, IntakeQuestion};
pub use states::{ConversationAction, ConversationEvent, ConversationState, TransitionOutcome};
