//! A single playable variant of a sound collection.

use crate::error::Result;
use crate::mixer::{ChannelId, Mixer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Fully decoded in backend memory, playable on any buffer channel.
    Buffer,
    /// Decoded on the fly; there is exactly one stream slot system-wide.
    Stream,
}

/// One loaded variant: the backend's decoded data plus this variant's gain.
pub struct SoundSource<S> {
    data: S,
    kind: SourceKind,
    gain: f32,
}

impl<S> SoundSource<S> {
    pub(crate) fn new(data: S, kind: SourceKind, gain: f32) -> Self {
        Self { data, kind, gain }
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Gain of this variant alone, before the collection and bus gains.
    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub(crate) fn play<M: Mixer<Sound = S>>(
        &self,
        mixer: &mut M,
        channel: ChannelId,
        looping: bool,
    ) -> Result<()> {
        mixer.play(channel, &self.data, looping)
    }
}
