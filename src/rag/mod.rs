pub mod loader;
pub mod matcher;
pub mod provider;
pub mod similarity;

pub use loader::{load_sources, LoadedDocumentation};
pub use matcher::{describe_endpoint, DocumentationMatcher, EmbeddingCache, MatchSet};
pub use provider::{create_provider, EmbeddingError, EmbeddingProvider, OpenAiEmbeddingProvider};
