//! The mixer seam.
//!
//! Lyrebird does no decoding or mixing of its own. Everything that touches
//! sample data lives behind the [`Mixer`] trait: the engine decides *what*
//! plays *where* and at *which* gain, and the backend owns the audio thread,
//! the decoded data and the output device.

use std::fmt;

use crate::config::LyrebirdConfig;
use crate::error::Result;

/// Identifies one voice slot in the mixer.
///
/// Buffer channels are a fixed pool indexed `0..N`; the stream channel is a
/// single distinguished slot for music. Backends treat them separately
/// because streamed audio is decoded on the fly rather than held in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelId {
    Buffer(usize),
    Stream,
}

impl ChannelId {
    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffer(index) => write!(f, "buffer channel {index}"),
            Self::Stream => write!(f, "stream channel"),
        }
    }
}

/// A hardware-facing playback backend.
///
/// `Sound` is whatever the backend hands back for a loaded piece of audio;
/// the engine stores these opaquely inside sound collections and passes them
/// back on [`play`](Mixer::play).
///
/// Gains are linear in `0.0..=1.0`; backends with integer volume scales do
/// their own conversion.
pub trait Mixer {
    type Sound;

    /// Open the output device with the requested format.
    fn open(&mut self, config: &LyrebirdConfig) -> Result<()>;

    /// Set the size of the buffer channel pool.
    fn allocate_channels(&mut self, count: usize);

    /// Current size of the buffer channel pool.
    fn allocated_channels(&self) -> usize;

    /// Load a sound fully into memory for buffer-channel playback.
    fn load_buffer(&mut self, filename: &str) -> Result<Self::Sound>;

    /// Open a sound for streamed playback on the stream channel.
    fn load_stream(&mut self, filename: &str) -> Result<Self::Sound>;

    /// Start playback. A looping sound repeats until halted.
    fn play(&mut self, channel: ChannelId, sound: &Self::Sound, looping: bool) -> Result<()>;

    fn playing(&self, channel: ChannelId) -> bool;

    /// Stop immediately, without a fade.
    fn halt(&mut self, channel: ChannelId);

    /// Stop with a linear fade over `ms` milliseconds.
    fn fade_out(&mut self, channel: ChannelId, ms: u32) -> Result<()>;

    fn set_volume(&mut self, channel: ChannelId, gain: f32);

    fn volume(&self, channel: ChannelId) -> f32;

    /// Suspend every channel, the stream included.
    fn pause_all(&mut self);

    fn resume_all(&mut self);
}
