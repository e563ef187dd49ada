use std::path::PathBuf;
use thiserror::Error;

/// Application error type
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Failed to read script {}: {source}", path.display())]
    ReadScript {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Script failed in page: {0}")]
    PageScript(String),

    #[error("Timed out waiting for the page to answer")]
    PageTimeout,

    #[error("Page bridge dropped the pending request")]
    BridgeClosed,

    #[error("Discord presence error: {0}")]
    Presence(String),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Window error: {0}")]
    Tauri(#[from] tauri::Error),
}
