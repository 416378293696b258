use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store io ({path}): {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("store parse ({path}): {source}")]
    Parse { path: PathBuf, source: toml::de::Error },

    #[error("store serialize: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid key '{0}'")]
    InvalidKey(String),

    #[error("key '{key}' crosses non-table value at '{segment}'")]
    NotATable { key: String, segment: String },
}
