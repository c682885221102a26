pub mod settings;

pub use settings::{
    DispatcherConfig, GeminiConfig, IngestionConfig, ServerConfig, Settings, StorageConfig,
    UploadConfig,
};
