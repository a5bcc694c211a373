//! Agent module - orchestration and conversation management
//!
//! Contains the agent loop that coordinates oracle turns and tool execution,
//! plus assistant identity resolution and the roles it resolves.

pub mod conversation;
pub mod events;
pub mod identity;
pub mod loop_state;
pub mod orchestrator;
pub mod roles;

pub use conversation::Conversation;
pub use events::AgentEvent;
pub use identity::{
    AssistantIdentity, CasOutcome, FileIdentityStore, IdentityResolver, IdentityStore,
    MemoryIdentityStore,
};
pub use loop_state::{
    AgentLoopState, ConversationOutcome, ConversationPhase, Observation, Termination,
};
pub use orchestrator::Agent;
pub use roles::AgentRole;
