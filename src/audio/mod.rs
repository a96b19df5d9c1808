//! # Audio Module
//!
//! Per-guild playback queues for Guild Jukebox.
//!
//! ## Architecture
//!
//! ### [`player`] - Queue Controller
//! - Creates a queue (and a voice connection) on the first `play` of a guild
//! - Plays tracks in FIFO order, one at a time
//! - Tears the queue down when it runs dry or on `stop`
//!
//! ### [`queue`] - Guild Queue
//! - Pending tracks, the voice connection and the explicit player state
//!
//! ### [`registry`] - Guild Registry
//! - One lock per guild; operations on different guilds never wait on each other
//!
//! ### [`transport`] / [`songbird_transport`] - Voice Transport
//! - The seam between the controller and songbird
//! - One-shot end-of-track signals tagged with a generation number
//!
//! ## Audio Quality
//!
//! - **Sample Rate**: 48kHz (Discord standard)
//! - **Bit Depth**: 16-bit signed integers
//! - **Channels**: Stereo (2 channels)

pub mod announcer;
pub mod player;
pub mod queue;
pub mod registry;
pub mod songbird_transport;
pub mod transport;

#[cfg(test)]
pub mod testing;
