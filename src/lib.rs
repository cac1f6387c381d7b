use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Service error: {0}")]
    Service(String),

    #[error("Rate limited by the {service} service")]
    RateLimit { service: String },

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Index corrupt: {0}")]
    IndexCorrupt(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl RagError {
    /// Stable identifier reported to callers alongside the message
    #[inline]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Service(_) => "service_error",
            Self::RateLimit { .. } => "rate_limit_error",
            Self::Retrieval(_) => "retrieval_error",
            Self::Generation(_) => "generation_error",
            Self::IndexCorrupt(_) => "index_corrupt_error",
            Self::Config(_) | Self::Catalog(_) | Self::Io(_) | Self::Other(_) => "internal_error",
        }
    }
}

pub mod catalog;
pub mod commands;
pub mod config;
pub mod conversation;
pub mod embeddings;
pub mod generation;
pub mod index;
pub mod indexer;
pub mod remote;
pub mod retriever;
pub mod server;

#[cfg(test)]
pub(crate) mod testing;
