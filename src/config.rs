//! Configuration records consumed by the engine.
//!
//! Every record here is a plain deserializable struct; how it is read from
//! disk (and in which format) is up to the embedding game. The engine only
//! ever sees already-parsed values.

use serde::{Deserialize, Serialize};

fn default_gain() -> f32 {
    1.0
}

fn default_weight() -> f32 {
    1.0
}

/// Output and channel-pool configuration for the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LyrebirdConfig {
    /// Output frequency in Hz.
    pub output_frequency: u32,
    /// Number of hardware output channels (2 for stereo).
    pub output_channels: u16,
    /// Mix buffer size in frames.
    pub output_buffer_size: usize,
    /// Number of simultaneous buffer channels the mixer should allocate.
    pub mixer_channels: usize,
    /// Seed for the variant selection RNG.
    #[serde(default)]
    pub selection_seed: u64,
}

impl Default for LyrebirdConfig {
    fn default() -> Self {
        Self {
            output_frequency: 48000,
            output_channels: 2,
            output_buffer_size: 1024,
            mixer_channels: 16,
            selection_seed: 0,
        }
    }
}

impl LyrebirdConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output_frequency(mut self, frequency: u32) -> Self {
        self.output_frequency = frequency;
        self
    }

    pub fn output_channels(mut self, channels: u16) -> Self {
        self.output_channels = channels;
        self
    }

    pub fn output_buffer_size(mut self, size: usize) -> Self {
        self.output_buffer_size = size;
        self
    }

    pub fn mixer_channels(mut self, channels: usize) -> Self {
        self.mixer_channels = channels;
        self
    }

    pub fn selection_seed(mut self, seed: u64) -> Self {
        self.selection_seed = seed;
        self
    }
}

/// Definition of a single mixer bus.
///
/// Child and duck relationships are given by name and resolved against the
/// full bus list when the engine initializes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusDef {
    pub name: String,
    /// Nominal gain of this bus, multiplied with the parent gain each frame.
    #[serde(default = "default_gain")]
    pub gain: f32,
    /// The attenuation floor this bus imposes on its duck targets while it
    /// has sounds playing. 0.0 silences them entirely.
    #[serde(default)]
    pub duck_gain: f32,
    /// Milliseconds for a duck target to reach the attenuation floor.
    /// Falls back to an engine-wide default when omitted.
    #[serde(default)]
    pub duck_fade_in_ms: Option<f32>,
    /// Milliseconds for a duck target to recover once this bus goes idle.
    #[serde(default)]
    pub duck_fade_out_ms: Option<f32>,
    #[serde(default)]
    pub child_buses: Vec<String>,
    #[serde(default)]
    pub duck_buses: Vec<String>,
}

impl BusDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            gain: 1.0,
            duck_gain: 0.0,
            duck_fade_in_ms: None,
            duck_fade_out_ms: None,
            child_buses: Vec::new(),
            duck_buses: Vec::new(),
        }
    }
}

/// The full bus list, one entry per bus, in materialization order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusDefList {
    pub buses: Vec<BusDef>,
}

/// One playable variant of a sound collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSampleEntry {
    pub filename: String,
    /// Per-variant gain, multiplied with the collection gain at play time.
    #[serde(default = "default_gain")]
    pub gain: f32,
    /// Relative selection weight among the collection's variants.
    #[serde(default = "default_weight")]
    pub weight: f32,
}

impl AudioSampleEntry {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            gain: 1.0,
            weight: 1.0,
        }
    }
}

/// Definition of a named logical sound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoundCollectionDef {
    pub name: String,
    /// Name of the bus this sound is routed to.
    pub bus: String,
    #[serde(default = "default_gain")]
    pub gain: f32,
    /// Higher values win channel arbitration.
    #[serde(default)]
    pub priority: f32,
    #[serde(default, rename = "loop")]
    pub looping: bool,
    /// Streamed sounds play on the single stream channel instead of the
    /// buffer pool.
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub audio_sample_set: Vec<AudioSampleEntry>,
}

impl SoundCollectionDef {
    pub fn new(name: impl Into<String>, bus: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bus: bus.into(),
            gain: 1.0,
            priority: 0.0,
            looping: false,
            stream: false,
            audio_sample_set: Vec::new(),
        }
    }
}

/// A named group of sound collections loaded and unloaded together.
///
/// Entries are definition filenames, resolved through the engine's
/// [`DefinitionLoader`](crate::bank::DefinitionLoader).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoundBankDef {
    pub name: String,
    pub filenames: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bus_def_defaults_from_minimal_json() {
        let def: BusDef = serde_json::from_str(r#"{"name": "sfx"}"#).unwrap();
        assert_eq!(def.name, "sfx");
        assert_eq!(def.gain, 1.0);
        assert_eq!(def.duck_gain, 0.0);
        assert!(def.duck_fade_in_ms.is_none());
        assert!(def.child_buses.is_empty());
    }

    #[test]
    fn collection_def_loop_field_round_trips() {
        let def: SoundCollectionDef = serde_json::from_str(
            r#"{
                "name": "explosion",
                "bus": "sfx",
                "priority": 5.0,
                "loop": true,
                "audio_sample_set": [{"filename": "boom.wav", "gain": 0.8}]
            }"#,
        )
        .unwrap();
        assert!(def.looping);
        assert!(!def.stream);
        assert_eq!(def.audio_sample_set.len(), 1);
        assert_eq!(def.audio_sample_set[0].weight, 1.0);

        let json = serde_json::to_string(&def).unwrap();
        assert!(json.contains("\"loop\":true"));
    }
}
