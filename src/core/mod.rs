pub mod config;
pub mod dictionary;
pub mod embedding;
pub mod export;
pub mod pipeline;
pub mod processor;
pub mod ranker;
pub mod scoring;
