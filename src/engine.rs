//! The engine façade: channel arbitration, per-frame bus evaluation and
//! sound bank management.
//!
//! The engine is single-threaded and driven by the game loop: play requests
//! and bank operations happen between frames, and [`advance_frame`]
//! re-evaluates the bus graph and rewrites channel volumes once per tick.
//! The mixer backend may run an audio thread internally; the engine only
//! ever calls it synchronously.
//!
//! [`advance_frame`]: LyrebirdEngine::advance_frame

use std::cmp::Ordering;
use std::collections::HashMap;

use crossbeam_channel::{unbounded, Receiver, Sender};
use glam::Vec3;
use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::bank::{DefinitionLoader, SoundBank};
use crate::bus::{self, Bus, BusId};
use crate::collection::SoundCollection;
use crate::config::{BusDefList, LyrebirdConfig};
use crate::error::{LyrebirdError, Result};
use crate::events::LyrebirdEvent;
use crate::mixer::{ChannelId, Mixer};
use crate::slab::{Slab, SlabKey};

/// Milliseconds over which [`LyrebirdEngine::stop`] fades a channel out.
const CHANNEL_FADE_OUT_MS: u32 = 10;

/// Monotonically non-decreasing time supplied by the caller each frame, in
/// milliseconds. Duck and fade rates are expressed against this clock.
pub type WorldTime = u64;

/// A stable reference to a loaded sound collection.
///
/// Handles survive bank loads and unloads without ever dangling: once the
/// collection behind a handle is released, the handle simply stops
/// resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SoundHandle(SlabKey);

/// The record of one currently voiced sound.
///
/// Deliberately move-only: the engine adjusts bus sound counters exactly
/// once per insert and once per remove, so copies of a record would double
/// count.
pub struct PlayingSound {
    collection: SoundHandle,
    bus: BusId,
    channel: ChannelId,
    start_time: WorldTime,
    priority: f32,
    stream: bool,
    location: Vec3,
}

impl PlayingSound {
    pub fn collection(&self) -> SoundHandle {
        self.collection
    }

    pub fn bus(&self) -> BusId {
        self.bus
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn start_time(&self) -> WorldTime {
        self.start_time
    }

    pub fn location(&self) -> Vec3 {
        self.location
    }
}

/// Orders two sound definitions for arbitration. `Less` means `a` outranks
/// `b`. The single stream outranks every buffer sound regardless of numeric
/// priority; buffer sounds compare by priority alone.
fn def_order(a_stream: bool, a_priority: f32, b_stream: bool, b_priority: f32) -> Ordering {
    match b_stream.cmp(&a_stream) {
        Ordering::Equal => b_priority.total_cmp(&a_priority),
        other => other,
    }
}

/// Orders playing sounds highest-rank first. Among equal priorities the
/// later-started sound ranks higher, so a burst of equal effects stays
/// fresh instead of freezing the earliest one in place.
fn playing_order(a: &PlayingSound, b: &PlayingSound) -> Ordering {
    def_order(a.stream, a.priority, b.stream, b.priority).then_with(|| b.start_time.cmp(&a.start_time))
}

/// The audio playback engine.
///
/// Owns the bus graph, the sound collection registry, the sound bank
/// registry and the playing-sounds table, and arbitrates the mixer's fixed
/// channel pool between competing play requests.
pub struct LyrebirdEngine<M: Mixer, D: DefinitionLoader> {
    config: LyrebirdConfig,
    mixer: M,
    defs: D,
    buses: Vec<Bus>,
    master_bus: BusId,
    master_gain: f32,
    mute: bool,
    collections: Slab<SoundCollection<M::Sound>>,
    collections_by_name: HashMap<String, SoundHandle>,
    /// Definition filename to collection name, maintained by bank loads.
    collection_files: HashMap<String, String>,
    banks: HashMap<String, SoundBank>,
    playing: Vec<PlayingSound>,
    world_time: WorldTime,
    duck_scratch: Vec<(BusId, f32)>,
    rng: SmallRng,
    event_sender: Sender<LyrebirdEvent>,
    event_receiver: Receiver<LyrebirdEvent>,
}

impl<M: Mixer, D: DefinitionLoader> LyrebirdEngine<M, D> {
    /// Opens the mixer, allocates the channel pool and materializes the bus
    /// graph. Every step must succeed or the engine fails to initialize.
    pub fn new(config: LyrebirdConfig, bus_defs: &BusDefList, mut mixer: M, defs: D) -> Result<Self> {
        mixer.open(&config)?;
        mixer.allocate_channels(config.mixer_channels);

        let (buses, master_bus) = bus::build(bus_defs)?;
        let (event_sender, event_receiver) = unbounded();

        log::info!(
            "Audio engine initialized: {} buses, {} buffer channels",
            buses.len(),
            config.mixer_channels
        );

        Ok(Self {
            rng: SmallRng::seed_from_u64(config.selection_seed),
            playing: Vec::with_capacity(config.mixer_channels),
            config,
            mixer,
            defs,
            buses,
            master_bus,
            master_gain: 1.0,
            mute: false,
            collections: Slab::default(),
            collections_by_name: HashMap::new(),
            collection_files: HashMap::new(),
            banks: HashMap::new(),
            world_time: 0,
            duck_scratch: Vec::new(),
            event_sender,
            event_receiver,
        })
    }

    pub fn config(&self) -> &LyrebirdConfig {
        &self.config
    }

    pub fn mixer(&self) -> &M {
        &self.mixer
    }

    /// Receiver for engine notifications. Reading it is optional.
    pub fn events(&self) -> &Receiver<LyrebirdEvent> {
        &self.event_receiver
    }

    // ------------------------------------------------------------------
    // Sound banks
    // ------------------------------------------------------------------

    /// Loads a sound bank, or bumps its reference count if it already is.
    ///
    /// Collections listed by several banks are loaded once and shared. If
    /// any collection fails to load, the ones this call already loaded are
    /// released again and the bank is not registered.
    pub fn load_sound_bank(&mut self, name: &str) -> Result<()> {
        if let Some(bank) = self.banks.get_mut(name) {
            bank.acquire();
            return Ok(());
        }

        let def = self.defs.load_bank_def(name)?;
        let mut loaded: Vec<String> = Vec::new();
        for filename in &def.filenames {
            match self.load_collection(filename) {
                Ok(collection_name) => loaded.push(collection_name),
                Err(error) => {
                    log::error!("Failed loading sound bank \"{name}\": {error}");
                    for collection_name in &loaded {
                        self.release_collection(collection_name);
                    }
                    return Err(error);
                }
            }
        }

        self.banks.insert(name.to_owned(), SoundBank::new(def));
        let _ = self.event_sender.send(LyrebirdEvent::BankLoaded { name: name.to_owned() });
        log::info!("Loaded sound bank \"{name}\"");
        Ok(())
    }

    /// Drops one claim on a bank. When the last claim goes, the bank's
    /// collections are released; any of them not shared with another loaded
    /// bank are unloaded. Unloading a bank that is not loaded is a
    /// programmer error.
    pub fn unload_sound_bank(&mut self, name: &str) -> Result<()> {
        let Some(bank) = self.banks.get_mut(name) else {
            log::error!("Cannot unload sound bank \"{name}\": not loaded");
            return Err(LyrebirdError::BankNotLoaded(name.to_owned()));
        };
        if bank.release() > 0 {
            return Ok(());
        }

        if let Some(bank) = self.banks.remove(name) {
            for filename in &bank.def().filenames {
                if let Some(collection_name) = self.collection_files.get(filename).cloned() {
                    self.release_collection(&collection_name);
                }
            }
        }
        let _ = self.event_sender.send(LyrebirdEvent::BankUnloaded { name: name.to_owned() });
        log::info!("Unloaded sound bank \"{name}\"");
        Ok(())
    }

    fn load_collection(&mut self, filename: &str) -> Result<String> {
        if let Some(name) = self.collection_files.get(filename).cloned() {
            if let Some(&handle) = self.collections_by_name.get(&name) {
                if let Some(collection) = self.collections.get_mut(handle.0) {
                    collection.acquire();
                    return Ok(name);
                }
            }
        }

        let def = self.defs.load_collection_def(filename)?;

        // The same collection may be listed under another definition file;
        // share the loaded copy instead of shadowing it.
        if let Some(&handle) = self.collections_by_name.get(&def.name) {
            if let Some(collection) = self.collections.get_mut(handle.0) {
                collection.acquire();
                self.collection_files.insert(filename.to_owned(), def.name.clone());
                return Ok(def.name);
            }
        }

        let bus = self.find_bus(&def.bus).ok_or_else(|| {
            log::error!(
                "Sound collection \"{}\" routes to unknown bus \"{}\"",
                def.name,
                def.bus
            );
            LyrebirdError::UnknownBus(def.bus.clone())
        })?;

        let name = def.name.clone();
        let mut collection = SoundCollection::load(def, bus, &mut self.mixer)?;
        collection.acquire();
        let handle = SoundHandle(self.collections.insert(collection));
        self.collections_by_name.insert(name.clone(), handle);
        self.collection_files.insert(filename.to_owned(), name.clone());
        Ok(name)
    }

    fn release_collection(&mut self, name: &str) {
        let Some(&handle) = self.collections_by_name.get(name) else {
            return;
        };
        let Some(collection) = self.collections.get_mut(handle.0) else {
            return;
        };
        if collection.release() == 0 {
            self.halt_collection(handle);
            self.collections_by_name.remove(name);
            self.collection_files.retain(|_, collection_name| collection_name.as_str() != name);
            let _ = self.collections.remove(handle.0);
            log::debug!("Unloaded sound collection \"{name}\"");
        }
    }

    /// Halts and forgets every playing sound of a collection about to be
    /// unloaded, so no table entry outlives its collection.
    fn halt_collection(&mut self, handle: SoundHandle) {
        let mut index = 0;
        while index < self.playing.len() {
            if self.playing[index].collection == handle {
                let entry = self.playing.swap_remove(index);
                self.mixer.halt(entry.channel);
                self.buses[entry.bus.0].decrement_sounds();
            } else {
                index += 1;
            }
        }
    }

    // ------------------------------------------------------------------
    // Handles and lookups
    // ------------------------------------------------------------------

    /// Resolves a collection by name. Returns `None` when no loaded bank
    /// provides it.
    pub fn sound_handle(&self, name: &str) -> Option<SoundHandle> {
        self.collections_by_name
            .get(name)
            .copied()
            .filter(|handle| self.collections.get(handle.0).is_some())
    }

    /// Resolves a collection by the definition filename it was loaded from.
    pub fn sound_handle_from_file(&self, filename: &str) -> Option<SoundHandle> {
        self.collection_files
            .get(filename)
            .and_then(|name| self.sound_handle(name))
    }

    pub fn collection(&self, handle: SoundHandle) -> Option<&SoundCollection<M::Sound>> {
        self.collections.get(handle.0)
    }

    /// Finds a bus by name.
    pub fn find_bus(&self, name: &str) -> Option<BusId> {
        self.buses
            .iter()
            .position(|bus| bus.def().name == name)
            .map(BusId)
    }

    pub fn bus(&self, id: BusId) -> Option<&Bus> {
        self.buses.get(id.0)
    }

    /// The currently voiced sounds, in no particular order.
    pub fn playing_sounds(&self) -> &[PlayingSound] {
        &self.playing
    }

    // ------------------------------------------------------------------
    // Playback
    // ------------------------------------------------------------------

    /// Plays the named sound. See [`play_sound`](Self::play_sound).
    pub fn play_sound_by_name(&mut self, name: &str) -> Result<ChannelId> {
        match self.sound_handle(name) {
            Some(handle) => self.play_sound(handle),
            None => {
                log::error!("Cannot play sound: unknown name \"{name}\"");
                Err(LyrebirdError::InvalidHandle)
            }
        }
    }

    /// Plays one variant of the collection behind `handle` and returns the
    /// channel it was voiced on.
    ///
    /// Streamed sounds always take the stream channel, replacing whatever
    /// stream is playing. Buffer sounds take the first idle channel; when
    /// the pool is full, the lowest-priority playing sound is preempted if
    /// the new request strictly outranks it, otherwise the request is
    /// refused with [`LyrebirdError::NoFreeChannel`].
    pub fn play_sound(&mut self, handle: SoundHandle) -> Result<ChannelId> {
        let Some(collection) = self.collections.get(handle.0) else {
            log::error!("Cannot play sound: invalid sound handle");
            return Err(LyrebirdError::InvalidHandle);
        };
        let def = collection.def();
        let stream = def.stream;
        let priority = def.priority;
        let looping = def.looping;
        let collection_gain = def.gain;
        let bus = collection.bus();
        let name = collection.name().to_owned();

        self.erase_finished_sounds();

        let channel = match self.find_free_channel(stream) {
            Some(channel) => channel,
            None => self.preempt_lowest_priority(stream, priority)?,
        };

        if channel.is_stream() && self.mixer.playing(ChannelId::Stream) {
            self.mixer.halt(ChannelId::Stream);
            self.erase_streams();
            let _ = self
                .event_sender
                .send(LyrebirdEvent::StreamReplaced { collection: name.clone() });
        }

        let Some(collection) = self.collections.get(handle.0) else {
            return Err(LyrebirdError::InvalidHandle);
        };
        let Some(source) = collection.select(&mut self.rng) else {
            return Err(LyrebirdError::InvalidDefinition(format!(
                "sound collection \"{name}\" has no variants"
            )));
        };

        let gain = source.gain() * collection_gain;
        self.mixer.set_volume(channel, gain);
        if let Err(error) = source.play(&mut self.mixer, channel, looping) {
            log::error!("Can't play sound \"{name}\": {error}");
            return Err(error);
        }

        self.buses[bus.0].increment_sounds();
        self.playing.push(PlayingSound {
            collection: handle,
            bus,
            channel,
            start_time: self.world_time,
            priority,
            stream,
            location: Vec3::ZERO,
        });
        let _ = self
            .event_sender
            .send(LyrebirdEvent::SoundStarted { collection: name, channel });
        Ok(channel)
    }

    /// First idle channel of the pool, or the stream slot for streams.
    fn find_free_channel(&self, stream: bool) -> Option<ChannelId> {
        if stream {
            return Some(ChannelId::Stream);
        }
        (0..self.mixer.allocated_channels())
            .map(ChannelId::Buffer)
            .find(|&channel| !self.mixer.playing(channel))
    }

    /// With the pool full, halts the lowest-priority playing sound and hands
    /// its channel to the new request, provided the new request strictly
    /// outranks it.
    fn preempt_lowest_priority(&mut self, stream: bool, priority: f32) -> Result<ChannelId> {
        self.playing.sort_by(playing_order);
        match self.playing.pop() {
            Some(victim)
                if def_order(stream, priority, victim.stream, victim.priority) == Ordering::Less =>
            {
                self.mixer.halt(victim.channel);
                self.buses[victim.bus.0].decrement_sounds();
                let collection = self
                    .collections
                    .get(victim.collection.0)
                    .map(|collection| collection.name().to_owned())
                    .unwrap_or_default();
                log::debug!("Preempted \"{collection}\" on {}", victim.channel);
                let _ = self.event_sender.send(LyrebirdEvent::SoundPreempted {
                    collection,
                    channel: victim.channel,
                });
                Ok(victim.channel)
            }
            Some(victim) => {
                self.playing.push(victim);
                Err(LyrebirdError::NoFreeChannel)
            }
            None => Err(LyrebirdError::NoFreeChannel),
        }
    }

    /// Drops table entries whose channel the mixer reports idle.
    fn erase_finished_sounds(&mut self) {
        let mut index = 0;
        while index < self.playing.len() {
            if self.mixer.playing(self.playing[index].channel) {
                index += 1;
            } else {
                let entry = self.playing.swap_remove(index);
                self.buses[entry.bus.0].decrement_sounds();
            }
        }
    }

    /// Drops table entries bound to the stream channel.
    fn erase_streams(&mut self) {
        let mut index = 0;
        while index < self.playing.len() {
            if self.playing[index].channel.is_stream() {
                let entry = self.playing.swap_remove(index);
                self.buses[entry.bus.0].decrement_sounds();
            } else {
                index += 1;
            }
        }
    }

    // ------------------------------------------------------------------
    // Per-frame evaluation
    // ------------------------------------------------------------------

    /// Advances the engine clock, re-evaluates duck and bus gains and
    /// rewrites every active channel's volume. Never fails; mixer trouble
    /// here is logged and ignored.
    pub fn advance_frame(&mut self, world_time: WorldTime) {
        let delta_ms = world_time.saturating_sub(self.world_time) as f32;
        self.world_time = world_time;

        self.erase_finished_sounds();

        bus::reset_duck_targets(&mut self.buses);
        bus::accumulate_duck_demand(&mut self.buses, &mut self.duck_scratch);
        bus::step_duck_gains(&mut self.buses, delta_ms);

        let root_gain = if self.mute { 0.0 } else { self.master_gain };
        bus::propagate_gain(&mut self.buses, self.master_bus, root_gain);

        for entry in &self.playing {
            self.mixer.set_volume(entry.channel, self.buses[entry.bus.0].gain());
        }
    }

    pub fn world_time(&self) -> WorldTime {
        self.world_time
    }

    // ------------------------------------------------------------------
    // Channel control
    // ------------------------------------------------------------------

    /// Fades the channel out over a few milliseconds to avoid clicks.
    ///
    /// A channel already at zero volume is halted outright; fading from
    /// silence is inaudible and some mixers refuse it.
    pub fn stop(&mut self, channel: ChannelId) {
        if self.mixer.volume(channel) == 0.0 {
            self.mixer.halt(channel);
        } else if let Err(error) = self.mixer.fade_out(channel, CHANNEL_FADE_OUT_MS) {
            log::error!("Error stopping {channel}: {error}");
        }
    }

    /// Whether the mixer is voicing anything on this channel.
    pub fn playing(&self, channel: ChannelId) -> bool {
        self.mixer.playing(channel)
    }

    /// Suspends or resumes every channel, the stream included.
    pub fn pause(&mut self, paused: bool) {
        if paused {
            self.mixer.pause_all();
        } else {
            self.mixer.resume_all();
        }
    }

    /// Spatial position attribute carried on a playing voice. The core does
    /// no panning itself; backends may consume it.
    pub fn location(&self, channel: ChannelId) -> Option<Vec3> {
        self.playing
            .iter()
            .find(|entry| entry.channel == channel)
            .map(|entry| entry.location)
    }

    pub fn set_location(&mut self, channel: ChannelId, location: Vec3) {
        if let Some(entry) = self.playing.iter_mut().find(|entry| entry.channel == channel) {
            entry.location = location;
        }
    }

    // ------------------------------------------------------------------
    // Master controls
    // ------------------------------------------------------------------

    pub fn set_master_gain(&mut self, master_gain: f32) {
        self.master_gain = master_gain.max(0.0);
    }

    pub fn master_gain(&self) -> f32 {
        self.master_gain
    }

    /// While muted, every bus evaluates to zero gain regardless of the
    /// master gain.
    pub fn set_mute(&mut self, mute: bool) {
        self.mute = mute;
    }

    pub fn mute(&self) -> bool {
        self.mute
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playing(priority: f32, stream: bool, channel: usize, start_time: WorldTime) -> PlayingSound {
        PlayingSound {
            collection: SoundHandle(Slab::default().insert(())),
            bus: BusId(0),
            channel: ChannelId::Buffer(channel),
            start_time,
            priority,
            stream,
            location: Vec3::ZERO,
        }
    }

    fn buffer_index(sound: &PlayingSound) -> usize {
        match sound.channel {
            ChannelId::Buffer(index) => index,
            ChannelId::Stream => usize::MAX,
        }
    }

    #[test]
    fn increasing_priority_sorts_highest_first() {
        let mut sounds: Vec<PlayingSound> = (0..6)
            .map(|index| playing(index as f32, false, index, index as WorldTime))
            .collect();
        sounds.sort_by(playing_order);

        let channels: Vec<usize> = sounds.iter().map(buffer_index).collect();
        assert_eq!(channels, vec![5, 4, 3, 2, 1, 0]);
    }

    #[test]
    fn same_priority_newer_start_ranks_higher() {
        let mut sounds = vec![
            playing(0.0, false, 0, 1),
            playing(0.0, false, 1, 0),
            playing(1.0, false, 2, 1),
            playing(1.0, false, 3, 0),
            playing(2.0, false, 4, 1),
            playing(2.0, false, 5, 0),
        ];
        sounds.sort_by(playing_order);

        let channels: Vec<usize> = sounds.iter().map(buffer_index).collect();
        assert_eq!(channels, vec![4, 5, 2, 3, 0, 1]);
    }

    #[test]
    fn stream_outranks_any_priority() {
        let mut sounds = vec![playing(100.0, false, 0, 0), playing(0.0, true, 1, 0)];
        sounds.sort_by(playing_order);
        assert!(sounds[0].stream);

        assert_eq!(def_order(false, 100.0, true, 0.0), Ordering::Greater);
        assert_eq!(def_order(true, 0.0, false, 100.0), Ordering::Less);
    }
}
