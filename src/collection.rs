//! Named logical sounds with one or more playable variants.

use rand::Rng;

use crate::bus::BusId;
use crate::config::SoundCollectionDef;
use crate::error::{LyrebirdError, Result};
use crate::mixer::Mixer;
use crate::source::{SoundSource, SourceKind};

/// A named logical sound: its definition, its resolved bus, and the loaded
/// variants a play request selects among.
///
/// Collections are shared between sound banks; the reference count tracks
/// how many loaded banks still list this collection.
pub struct SoundCollection<S> {
    def: SoundCollectionDef,
    bus: BusId,
    sources: Vec<SoundSource<S>>,
    total_weight: f32,
    ref_count: usize,
}

impl<S> SoundCollection<S> {
    /// Loads every variant of `def` through the mixer.
    ///
    /// A streamed collection must have exactly one variant; the mixer's
    /// streaming facility has a single slot, so selection among stream
    /// variants could never be honored.
    pub(crate) fn load<M: Mixer<Sound = S>>(
        def: SoundCollectionDef,
        bus: BusId,
        mixer: &mut M,
    ) -> Result<Self> {
        if def.audio_sample_set.is_empty() {
            return Err(LyrebirdError::InvalidDefinition(format!(
                "sound collection \"{}\" has no variants",
                def.name
            )));
        }
        if def.stream && def.audio_sample_set.len() > 1 {
            return Err(LyrebirdError::InvalidDefinition(format!(
                "streamed sound collection \"{}\" has {} variants",
                def.name,
                def.audio_sample_set.len()
            )));
        }

        let mut sources = Vec::with_capacity(def.audio_sample_set.len());
        let mut total_weight = 0.0;
        for entry in &def.audio_sample_set {
            let source = if def.stream {
                SoundSource::new(
                    mixer.load_stream(&entry.filename)?,
                    SourceKind::Stream,
                    entry.gain,
                )
            } else {
                SoundSource::new(
                    mixer.load_buffer(&entry.filename)?,
                    SourceKind::Buffer,
                    entry.gain,
                )
            };
            sources.push(source);
            total_weight += entry.weight;
        }

        Ok(Self {
            def,
            bus,
            sources,
            total_weight,
            ref_count: 0,
        })
    }

    pub fn def(&self) -> &SoundCollectionDef {
        &self.def
    }

    pub fn bus(&self) -> BusId {
        self.bus
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    /// Picks a variant by weighted random selection.
    ///
    /// Walks the variants subtracting each weight from a roll in
    /// `0..total_weight`; the final variant catches any floating point
    /// rounding shortfall.
    pub(crate) fn select(&self, rng: &mut impl Rng) -> Option<&SoundSource<S>> {
        let mut selection = rng.gen::<f32>() * self.total_weight;
        for (entry, source) in self.def.audio_sample_set.iter().zip(&self.sources) {
            selection -= entry.weight;
            if selection <= 0.0 {
                return Some(source);
            }
        }
        self.sources.last()
    }

    pub(crate) fn acquire(&mut self) {
        self.ref_count += 1;
    }

    /// Drops one bank's claim and returns the remaining count.
    pub(crate) fn release(&mut self) -> usize {
        debug_assert!(self.ref_count > 0, "collection reference count underflow");
        self.ref_count = self.ref_count.saturating_sub(1);
        self.ref_count
    }

    pub fn ref_count(&self) -> usize {
        self.ref_count
    }
}
