use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("harvester error: {0}")]
    Harvester(#[from] vacancy_harvester::HarvesterError),

    #[error("harvest task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
