pub mod normalizer;

pub use normalizer::{ArtifactKind, DocumentNormalizer, CHAT_TRANSCRIPT_ENTRY};
