pub mod api;
pub mod conversation;
pub mod session;

pub use conversation::{
    seed_history, ConversationTurn, FileData, History, LatestExchange, Part, Role,
};
pub use session::{Session, SessionDraft, SessionId};
