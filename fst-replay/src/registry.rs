// Copyright 2025 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use crate::model::PortId;
use crate::pack::byte_len;
use crate::{ReplayError, Result};
use rustc_hash::FxHashMap;
use std::num::NonZeroU32;

/// The reader's stable integer identifier for a signal within the waveform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FacilityId(NonZeroU32);

impl FacilityId {
    #[inline]
    pub fn from_index(index: usize) -> Option<Self> {
        NonZeroU32::new(index as u32 + 1).map(FacilityId)
    }

    #[inline]
    pub fn index(&self) -> usize {
        (self.0.get() - 1) as usize
    }
}

/// Whether a boundary signal drives the model or is driven by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// A name announced by the caller, waiting to be matched to the waveform.
struct Registered {
    direction: Direction,
    port: PortId,
    bits: u32,
    bound: bool,
}

/// A bound input: packed values are written straight into the model's port.
pub struct InputSignal {
    pub name: String,
    pub port: PortId,
    pub bits: u32,
}

/// A bound output: packed values accumulate in `expected` until the check
/// that follows the next evaluation.
pub struct OutputSignal {
    pub name: String,
    pub port: PortId,
    pub bits: u32,
    pub expected: Vec<u8>,
}

pub enum Resolved<'a> {
    Input(&'a InputSignal),
    Output(&'a mut OutputSignal),
}

/// Maps hierarchical signal names to reader facilities and model ports.
///
/// Names are unique across both directions and a facility resolves to
/// exactly one descriptor once [`bind`](SignalRegistry::bind) has run.
#[derive(Default)]
pub struct SignalRegistry {
    by_name: FxHashMap<String, Registered>,
    input_slots: FxHashMap<FacilityId, usize>,
    output_slots: FxHashMap<FacilityId, usize>,
    inputs: Vec<InputSignal>,
    outputs: Vec<OutputSignal>,
}

impl SignalRegistry {
    pub fn register(
        &mut self,
        name: String,
        direction: Direction,
        port: PortId,
        bits: u32,
    ) -> Result<()> {
        if bits == 0 {
            return Err(ReplayError::NotABitVector(name));
        }
        if self.by_name.contains_key(&name) {
            return Err(ReplayError::DuplicateSignal(name));
        }
        self.by_name.insert(
            name,
            Registered {
                direction,
                port,
                bits,
                bound: false,
            },
        );
        Ok(())
    }

    /// Matches a registered name to the facility and width the reader
    /// announced for it.
    pub fn bind(&mut self, name: &str, facility: FacilityId, reported_bits: u32) -> Result<()> {
        let Some(entry) = self.by_name.get_mut(name) else {
            return Err(ReplayError::UnknownSignal(name.to_string()));
        };
        if entry.bound {
            return Err(ReplayError::DuplicateSignal(name.to_string()));
        }
        if entry.bits != reported_bits {
            return Err(ReplayError::WidthMismatch {
                name: name.to_string(),
                registered: entry.bits,
                reported: reported_bits,
            });
        }
        if self.input_slots.contains_key(&facility) || self.output_slots.contains_key(&facility) {
            return Err(ReplayError::DuplicateFacility(facility.index() as u32));
        }
        entry.bound = true;
        match entry.direction {
            Direction::Input => {
                self.input_slots.insert(facility, self.inputs.len());
                self.inputs.push(InputSignal {
                    name: name.to_string(),
                    port: entry.port,
                    bits: entry.bits,
                });
            }
            Direction::Output => {
                self.output_slots.insert(facility, self.outputs.len());
                self.outputs.push(OutputSignal {
                    name: name.to_string(),
                    port: entry.port,
                    bits: entry.bits,
                    expected: vec![0; byte_len(entry.bits)],
                });
            }
        }
        Ok(())
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn resolve(&mut self, facility: FacilityId) -> Option<Resolved<'_>> {
        if let Some(&slot) = self.input_slots.get(&facility) {
            Some(Resolved::Input(&self.inputs[slot]))
        } else if let Some(&slot) = self.output_slots.get(&facility) {
            Some(Resolved::Output(&mut self.outputs[slot]))
        } else {
            None
        }
    }

    pub fn name_of(&self, facility: FacilityId) -> Option<&str> {
        if let Some(&slot) = self.input_slots.get(&facility) {
            Some(&self.inputs[slot].name)
        } else {
            let slot = *self.output_slots.get(&facility)?;
            Some(&self.outputs[slot].name)
        }
    }

    pub fn outputs(&self) -> &[OutputSignal] {
        &self.outputs
    }

    /// All bound signals in bind order, inputs first.
    pub fn bound(&self) -> impl Iterator<Item = (&str, Direction, PortId, u32)> + '_ {
        let inputs = self
            .inputs
            .iter()
            .map(|s| (s.name.as_str(), Direction::Input, s.port, s.bits));
        let outputs = self
            .outputs
            .iter()
            .map(|s| (s.name.as_str(), Direction::Output, s.port, s.bits));
        inputs.chain(outputs)
    }

    /// Names that were registered but never matched in the waveform, sorted
    /// for stable diagnostics.
    pub fn unbound(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .by_name
            .iter()
            .filter(|(_, entry)| !entry.bound)
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// The facilities whose value changes should pass the reader's process
    /// mask.
    pub fn facilities(&self) -> Vec<FacilityId> {
        let mut all: Vec<FacilityId> = self
            .input_slots
            .keys()
            .chain(self.output_slots.keys())
            .copied()
            .collect();
        all.sort_unstable_by_key(|f| f.index());
        all
    }
}
