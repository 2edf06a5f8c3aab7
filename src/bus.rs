//! The bus graph.
//!
//! Buses form a directed acyclic graph rooted at the bus named `"master"`.
//! Each frame the engine resets duck targets, lets every active bus push its
//! attenuation floor onto its duck targets, interpolates each bus toward its
//! target, and then propagates gain down from the master. Buses refer to one
//! another by index into the engine-owned vector, resolved once at init.

use std::collections::HashMap;

use crate::config::{BusDef, BusDefList};
use crate::error::{LyrebirdError, Result};

/// Fallback duck attack/release time for defs that leave theirs out.
const DEFAULT_DUCK_FADE_MS: f32 = 250.0;

pub(crate) const MASTER_BUS_NAME: &str = "master";

/// Index of a bus in the engine's bus vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BusId(pub(crate) usize);

#[derive(Debug)]
pub struct Bus {
    def: BusDef,
    children: Vec<BusId>,
    ducks: Vec<BusId>,
    /// Effective gain including the parent contribution, recomputed each
    /// frame by [`propagate_gain`].
    gain: f32,
    /// Attenuation currently applied to this bus by other buses ducking it.
    duck_gain: f32,
    /// Where `duck_gain` is headed this frame. 1.0 unless some active bus
    /// ducks this one.
    duck_target: f32,
    /// Number of currently playing sounds routed to this bus.
    sound_count: usize,
}

impl Bus {
    fn new(def: BusDef) -> Self {
        Self {
            def,
            children: Vec::new(),
            ducks: Vec::new(),
            gain: 0.0,
            duck_gain: 1.0,
            duck_target: 1.0,
            sound_count: 0,
        }
    }

    pub fn def(&self) -> &BusDef {
        &self.def
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn duck_gain(&self) -> f32 {
        self.duck_gain
    }

    pub fn sound_count(&self) -> usize {
        self.sound_count
    }

    pub(crate) fn increment_sounds(&mut self) {
        self.sound_count += 1;
    }

    pub(crate) fn decrement_sounds(&mut self) {
        debug_assert!(self.sound_count > 0, "bus sound counter underflow");
        self.sound_count = self.sound_count.saturating_sub(1);
    }

    fn duck_fade_in_ms(&self) -> f32 {
        self.def.duck_fade_in_ms.unwrap_or(DEFAULT_DUCK_FADE_MS)
    }

    fn duck_fade_out_ms(&self) -> f32 {
        self.def.duck_fade_out_ms.unwrap_or(DEFAULT_DUCK_FADE_MS)
    }

    /// Moves `duck_gain` toward `duck_target` by at most the per-millisecond
    /// fade step, attack when descending and release when rising.
    fn step_duck_gain(&mut self, delta_ms: f32) {
        if self.duck_gain > self.duck_target {
            let fade = self.duck_fade_in_ms();
            if fade > 0.0 {
                self.duck_gain -= delta_ms / fade;
                self.duck_gain = self.duck_gain.max(self.duck_target);
            } else {
                self.duck_gain = self.duck_target;
            }
        } else if self.duck_gain < self.duck_target {
            let fade = self.duck_fade_out_ms();
            if fade > 0.0 {
                self.duck_gain += delta_ms / fade;
                self.duck_gain = self.duck_gain.min(self.duck_target);
            } else {
                self.duck_gain = self.duck_target;
            }
        }
        self.duck_gain = self.duck_gain.clamp(0.0, 1.0);
    }
}

/// Materializes the bus vector from a definition list and resolves the child
/// and duck name references. Fails on duplicate names, unknown references, a
/// cyclic child graph, or a missing master bus.
pub(crate) fn build(defs: &BusDefList) -> Result<(Vec<Bus>, BusId)> {
    let mut index_by_name: HashMap<&str, usize> = HashMap::new();
    for (index, def) in defs.buses.iter().enumerate() {
        if index_by_name.insert(def.name.as_str(), index).is_some() {
            return Err(LyrebirdError::InvalidDefinition(format!(
                "duplicate bus name \"{}\"",
                def.name
            )));
        }
    }

    let mut buses: Vec<Bus> = defs.buses.iter().cloned().map(Bus::new).collect();

    for index in 0..buses.len() {
        let def = buses[index].def.clone();
        buses[index].children = resolve(&index_by_name, &def.child_buses, "child_buses")?;
        buses[index].ducks = resolve(&index_by_name, &def.duck_buses, "duck_buses")?;
    }

    if let Some(name) = find_cycle(&buses) {
        return Err(LyrebirdError::BusCycle(name));
    }

    let master = index_by_name
        .get(MASTER_BUS_NAME)
        .copied()
        .map(BusId)
        .ok_or(LyrebirdError::NoMasterBus)?;

    Ok((buses, master))
}

fn resolve(
    index_by_name: &HashMap<&str, usize>,
    names: &[String],
    list_name: &str,
) -> Result<Vec<BusId>> {
    names
        .iter()
        .map(|name| {
            index_by_name.get(name.as_str()).copied().map(BusId).ok_or_else(|| {
                log::error!("Unknown bus \"{name}\" listed in {list_name}");
                LyrebirdError::UnknownBus(name.clone())
            })
        })
        .collect()
}

/// Returns the name of a bus on a child-graph cycle, if any.
fn find_cycle(buses: &[Bus]) -> Option<String> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }

    fn visit(buses: &[Bus], marks: &mut [Mark], index: usize) -> Option<usize> {
        match marks[index] {
            Mark::Done => return None,
            Mark::InProgress => return Some(index),
            Mark::Unvisited => {}
        }
        marks[index] = Mark::InProgress;
        for &child in &buses[index].children {
            if let Some(found) = visit(buses, marks, child.0) {
                return Some(found);
            }
        }
        marks[index] = Mark::Done;
        None
    }

    let mut marks = vec![Mark::Unvisited; buses.len()];
    for index in 0..buses.len() {
        if let Some(found) = visit(buses, &mut marks, index) {
            return Some(buses[found].def.name.clone());
        }
    }
    None
}

/// Resets every bus's duck target for a new frame.
pub(crate) fn reset_duck_targets(buses: &mut [Bus]) {
    for bus in buses.iter_mut() {
        bus.duck_target = 1.0;
    }
}

/// Every bus with sounds playing pushes its attenuation floor onto its duck
/// targets. Multiple duckers combine by taking the lowest floor.
pub(crate) fn accumulate_duck_demand(buses: &mut [Bus], scratch: &mut Vec<(BusId, f32)>) {
    scratch.clear();
    for bus in buses.iter() {
        if bus.sound_count > 0 {
            for &target in &bus.ducks {
                scratch.push((target, bus.def.duck_gain));
            }
        }
    }
    for &(target, floor) in scratch.iter() {
        let bus = &mut buses[target.0];
        bus.duck_target = bus.duck_target.min(floor.clamp(0.0, 1.0));
    }
}

/// Interpolates every bus's duck gain toward its target.
pub(crate) fn step_duck_gains(buses: &mut [Bus], delta_ms: f32) {
    for bus in buses.iter_mut() {
        bus.step_duck_gain(delta_ms);
    }
}

/// Walks the graph from the master bus, setting each bus's effective gain to
/// `parent_gain * def.gain * duck_gain`. On diamond shapes the last write
/// wins, which is stable because the walk order is deterministic.
pub(crate) fn propagate_gain(buses: &mut [Bus], master: BusId, root_gain: f32) {
    let mut stack = vec![(master, root_gain)];
    while let Some((BusId(index), parent_gain)) = stack.pop() {
        let bus = &mut buses[index];
        bus.gain = parent_gain * bus.def.gain * bus.duck_gain;
        let gain = bus.gain;
        for &child in &bus.children {
            stack.push((child, gain));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BusDef;

    fn def(name: &str) -> BusDef {
        BusDef::new(name)
    }

    fn list(buses: Vec<BusDef>) -> BusDefList {
        BusDefList { buses }
    }

    #[test]
    fn build_resolves_children_and_master() {
        let mut master = def("master");
        master.child_buses = vec!["music".into(), "sfx".into()];
        let (buses, master_id) = build(&list(vec![master, def("music"), def("sfx")])).unwrap();
        assert_eq!(master_id, BusId(0));
        assert_eq!(buses[0].children, vec![BusId(1), BusId(2)]);
    }

    #[test]
    fn build_rejects_unknown_child() {
        let mut master = def("master");
        master.child_buses = vec!["ghost".into()];
        let result = build(&list(vec![master]));
        assert!(matches!(result, Err(LyrebirdError::UnknownBus(name)) if name == "ghost"));
    }

    #[test]
    fn build_rejects_missing_master() {
        let result = build(&list(vec![def("music")]));
        assert!(matches!(result, Err(LyrebirdError::NoMasterBus)));
    }

    #[test]
    fn build_rejects_cycle() {
        let mut a = def("master");
        a.child_buses = vec!["b".into()];
        let mut b = def("b");
        b.child_buses = vec!["c".into()];
        let mut c = def("c");
        c.child_buses = vec!["b".into()];
        let result = build(&list(vec![a, b, c]));
        assert!(matches!(result, Err(LyrebirdError::BusCycle(_))));
    }

    #[test]
    fn build_rejects_duplicate_names() {
        let result = build(&list(vec![def("master"), def("sfx"), def("sfx")]));
        assert!(matches!(result, Err(LyrebirdError::InvalidDefinition(_))));
    }

    #[test]
    fn gain_propagates_from_master() {
        let mut master = def("master");
        master.gain = 0.5;
        master.child_buses = vec!["sfx".into()];
        let mut sfx = def("sfx");
        sfx.gain = 0.5;
        sfx.child_buses = vec!["ui".into()];
        let mut ui = def("ui");
        ui.gain = 0.8;

        let (mut buses, master_id) = build(&list(vec![master, sfx, ui])).unwrap();
        propagate_gain(&mut buses, master_id, 1.0);

        assert!((buses[0].gain() - 0.5).abs() < 1e-6);
        assert!((buses[1].gain() - 0.25).abs() < 1e-6);
        assert!((buses[2].gain() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn duck_gain_converges_at_the_configured_rate() {
        let mut music = def("music");
        music.duck_fade_in_ms = Some(100.0);
        music.duck_fade_out_ms = Some(200.0);
        let mut sfx = def("sfx");
        sfx.duck_buses = vec!["music".into()];

        let (mut buses, _) = build(&list(vec![def("master"), music, sfx])).unwrap();
        let mut scratch = Vec::new();

        buses[2].increment_sounds();
        for _ in 0..10 {
            reset_duck_targets(&mut buses);
            accumulate_duck_demand(&mut buses, &mut scratch);
            step_duck_gains(&mut buses, 10.0);
        }
        assert!(buses[1].duck_gain() < 1e-6, "music should be fully ducked");

        buses[2].decrement_sounds();
        for _ in 0..10 {
            reset_duck_targets(&mut buses);
            accumulate_duck_demand(&mut buses, &mut scratch);
            step_duck_gains(&mut buses, 10.0);
        }
        assert!((buses[1].duck_gain() - 0.5).abs() < 1e-6, "release is half done");
        for _ in 0..10 {
            reset_duck_targets(&mut buses);
            accumulate_duck_demand(&mut buses, &mut scratch);
            step_duck_gains(&mut buses, 10.0);
        }
        assert!((buses[1].duck_gain() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn duckers_combine_by_lowest_floor() {
        let mut quiet = def("quiet");
        quiet.duck_gain = 0.5;
        quiet.duck_buses = vec!["music".into()];
        let mut silent = def("silent");
        silent.duck_gain = 0.0;
        silent.duck_buses = vec!["music".into()];

        let (mut buses, _) = build(&list(vec![def("master"), def("music"), quiet, silent])).unwrap();
        let mut scratch = Vec::new();

        buses[2].increment_sounds();
        buses[3].increment_sounds();
        reset_duck_targets(&mut buses);
        accumulate_duck_demand(&mut buses, &mut scratch);
        assert_eq!(buses[1].duck_target, 0.0);
    }
}
