pub mod jobs;
pub mod trickplay;
