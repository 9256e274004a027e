use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnalyzerError>;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("{service} failed: {source}")]
    Collaborator {
        service: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Batch of {changes} change(s) exceeded {timeout_ms}ms")]
    BatchTimeout { changes: usize, timeout_ms: u64 },

    #[error("Batch task panicked: {0}")]
    BatchPanicked(String),

    #[error("Analyzer scheduler is no longer running")]
    ChannelClosed,

    #[error("{0}")]
    Other(String),
}

impl AnalyzerError {
    pub(crate) fn collaborator(service: &'static str, source: anyhow::Error) -> Self {
        Self::Collaborator { service, source }
    }
}
