pub mod conversation;
pub mod dispatcher;
pub mod gemini;
pub mod history;
pub mod ingestion;
pub mod maintenance;
pub mod session_store;

pub use conversation::ConversationEngine;
pub use dispatcher::Dispatcher;
pub use gemini::{GeminiService, GenerativeBackend};
pub use history::HistoryStore;
pub use ingestion::{IngestionOutcome, IngestionPipeline};
pub use maintenance::{purge_storage, PurgeReport};
pub use session_store::SessionStore;
