//! Trickplay core: the BIF container codec and everything that decides
//! where artifacts live and which videos qualify for them.
//!
//! Nothing in here spawns tasks or processes except [`ffmpeg::probe_video`];
//! orchestration lives in `trickplay-pipeline`.

pub mod bif;
pub mod cache;
pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod manifest;
pub mod media;
pub mod running_time;
pub mod types;
