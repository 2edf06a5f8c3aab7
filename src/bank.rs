//! Sound banks and the definition loading seam.
//!
//! A bank is a named group of sound collections loaded together. Banks may
//! overlap: two banks listing the same collection share one loaded copy, and
//! the collection stays resident until the last bank claiming it unloads.

use std::collections::HashMap;

use crate::config::{SoundBankDef, SoundCollectionDef};
use crate::error::{LyrebirdError, Result};

/// Supplies parsed bank and collection definitions by name.
///
/// The engine never reads or deserializes anything itself; games back this
/// with whatever asset pipeline they have.
pub trait DefinitionLoader {
    fn load_bank_def(&mut self, name: &str) -> Result<SoundBankDef>;

    /// Resolves one entry of a bank's `filenames` list.
    fn load_collection_def(&mut self, filename: &str) -> Result<SoundCollectionDef>;
}

/// A [`DefinitionLoader`] over definitions registered up front.
///
/// Handy for games that embed their audio metadata, and for tests.
#[derive(Default)]
pub struct MemoryDefs {
    banks: HashMap<String, SoundBankDef>,
    collections: HashMap<String, SoundCollectionDef>,
}

impl MemoryDefs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bank(&mut self, def: SoundBankDef) -> &mut Self {
        self.banks.insert(def.name.clone(), def);
        self
    }

    /// Registers a collection def under `filename`, the key bank entries
    /// refer to it by.
    pub fn add_collection(&mut self, filename: impl Into<String>, def: SoundCollectionDef) -> &mut Self {
        self.collections.insert(filename.into(), def);
        self
    }
}

impl DefinitionLoader for MemoryDefs {
    fn load_bank_def(&mut self, name: &str) -> Result<SoundBankDef> {
        self.banks
            .get(name)
            .cloned()
            .ok_or_else(|| LyrebirdError::DefinitionNotFound(name.to_owned()))
    }

    fn load_collection_def(&mut self, filename: &str) -> Result<SoundCollectionDef> {
        self.collections
            .get(filename)
            .cloned()
            .ok_or_else(|| LyrebirdError::DefinitionNotFound(filename.to_owned()))
    }
}

/// A loaded bank: its definition and how many loads are outstanding.
pub struct SoundBank {
    def: SoundBankDef,
    ref_count: usize,
}

impl SoundBank {
    pub(crate) fn new(def: SoundBankDef) -> Self {
        Self { def, ref_count: 1 }
    }

    pub fn def(&self) -> &SoundBankDef {
        &self.def
    }

    pub fn ref_count(&self) -> usize {
        self.ref_count
    }

    pub(crate) fn acquire(&mut self) {
        self.ref_count += 1;
    }

    pub(crate) fn release(&mut self) -> usize {
        debug_assert!(self.ref_count > 0, "bank reference count underflow");
        self.ref_count = self.ref_count.saturating_sub(1);
        self.ref_count
    }
}
