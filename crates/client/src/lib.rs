//! Player-side trickplay consumer.
//!
//! Fetches the manifest and the best-fitting BIF for a playback session,
//! then turns slider positions into preview frames.

pub mod config;
pub mod error;
pub mod preview;
pub mod selection;
pub mod session;
pub mod source;

pub use config::ClientConfig;
pub use error::ClientError;
pub use session::{PlaybackSession, SessionState};
pub use source::{FetchOutcome, HttpSource, TrickplaySource};
