use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Network unreachable: {0}")]
    Unreachable(String),
}

/// Maximum length for error details kept in log output
const MAX_DETAIL_LENGTH: usize = 200;

impl FetchError {
    /// Short, log-friendly description of the failure
    pub fn summary(&self) -> String {
        let text = self.to_string();
        if text.len() <= MAX_DETAIL_LENGTH {
            text
        } else {
            let cut: String = text.chars().take(MAX_DETAIL_LENGTH).collect();
            format!("{}... (truncated)", cut)
        }
    }
}
