//! Lyrebird - Game Audio Playback Engine
//!
//! The policy and bookkeeping layer between game code ("play this named
//! sound") and a low-level mixer owning a fixed pool of playback channels:
//! channel arbitration with priority preemption, a hierarchical bus graph
//! with ducking, and reference-counted sound banks.

pub mod bank;
pub mod bus;
pub mod collection;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod mixer;
mod slab;
pub mod source;

pub use bank::{DefinitionLoader, MemoryDefs, SoundBank};
pub use bus::{Bus, BusId};
pub use collection::SoundCollection;
pub use config::{
    AudioSampleEntry, BusDef, BusDefList, LyrebirdConfig, SoundBankDef, SoundCollectionDef,
};
pub use engine::{LyrebirdEngine, PlayingSound, SoundHandle, WorldTime};
pub use error::{LyrebirdError, Result};
pub use events::LyrebirdEvent;
pub use mixer::{ChannelId, Mixer};
pub use source::{SoundSource, SourceKind};

pub use glam::Vec3;
