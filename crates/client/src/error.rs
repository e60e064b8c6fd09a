use trickplay_core::bif::BifError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a status the retry contract does not cover.
    #[error("Unexpected response ({status}): {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("BIF is not usable: {0}")]
    Bif(#[from] BifError),
}
