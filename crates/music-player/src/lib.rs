//! A small desktop audio-file player.
//!
//! [`player::Player`] opens a sound source (local path, byte stream, or URL),
//! decodes it through Symphonia, and streams PCM to a CPAL output device from
//! a single worker thread. Transport controls (play/pause/resume/stop/loop)
//! plus metadata and gain queries live on the player.

pub mod config;
pub mod decode;
pub mod device;
pub mod error;
pub mod metadata;
pub mod player;
pub mod source;
pub mod status;

mod http_stream;
mod line;
mod queue;
mod resample;
