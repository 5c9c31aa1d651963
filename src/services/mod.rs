pub mod analyzer;
pub mod fetcher;
pub mod llm;
pub mod normalizer;
pub mod reviews;
