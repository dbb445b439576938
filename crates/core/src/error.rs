use assets_files::FilesError;
use assets_hashing::HashingError;

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("asset not found: {0}")]
    NotFound(String),
    #[error("file already exists: {0}")]
    FileAlreadyExists(String),
    #[error("no free name for {filename} after {attempts} attempts")]
    NamingExhausted { filename: String, attempts: usize },
    #[error("misconfiguration: {0}")]
    Misconfiguration(String),
    #[error("record store error: {0}")]
    Records(String),

    #[error(transparent)]
    Files(#[from] FilesError),
    #[error(transparent)]
    Hashing(#[from] HashingError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to (de)serialise records: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AssetError {
    /// Whether the error means "nothing stored there" rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AssetError::NotFound(_) | AssetError::Files(FilesError::NotFound(_))
        )
    }
}

pub type AssetResult<T> = std::result::Result<T, AssetError>;
