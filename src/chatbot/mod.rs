pub mod client;
pub mod replica;
pub mod types;

pub use client::{ChatbotClient, ChatbotSettingsApi};
pub use replica::ReplicaStore;
pub use types::CourseSettingsMetadata;
