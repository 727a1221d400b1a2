#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("encoder spawn failed: {0}")]
    Spawn(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for RecordError {
    fn from(e: std::io::Error) -> Self {
        RecordError::Io(e.to_string())
    }
}
