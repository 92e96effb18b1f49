// Copyright 2025 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>
//
// Turns the reader's value change stream into model evaluations: inputs are
// applied as they arrive, the model is evaluated once per time step, and
// every output is checked against the recorded waveform after each step.

use crate::model::Model;
use crate::pack::{byte_len, is_two_state, pack_bits};
use crate::registry::{FacilityId, Resolved, SignalRegistry};
use crate::trace::TraceSink;
use crate::{ReplayError, Result, Time};

/// A single observed divergence between the model and the recorded waveform.
pub struct Mismatch<'a> {
    /// Full hierarchical name of the diverging output.
    pub signal: &'a str,
    /// Simulated time at which the comparison ran.
    pub time: Time,
    /// Packed bytes the waveform recorded.
    pub expected: &'a [u8],
    /// Packed bytes the model produced.
    pub actual: &'a [u8],
}

impl std::fmt::Display for Mismatch<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Miscompare: {} @ {}", self.signal, self.time)
    }
}

/// Counters reported after a completed run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplaySummary {
    /// Number of model evaluations, one per time step including the final one.
    pub evals: u64,
    /// Total number of miscompares across the whole run.
    pub mismatches: u64,
    /// Value changes that contained characters other than `0` and `1`.
    pub encoding_warnings: u64,
    /// The last simulated time that was evaluated.
    pub end_time: Time,
}

pub(crate) struct Replayer<'a, M: Model> {
    registry: &'a mut SignalRegistry,
    model: &'a mut M,
    trace: Option<&'a mut (dyn TraceSink<M> + 'static)>,
    time: Time,
    warned_encoding: bool,
    summary: ReplaySummary,
}

impl<'a, M: Model> Replayer<'a, M> {
    pub fn new(
        registry: &'a mut SignalRegistry,
        model: &'a mut M,
        trace: Option<&'a mut (dyn TraceSink<M> + 'static)>,
        start_time: Time,
    ) -> Self {
        Replayer {
            registry,
            model,
            trace,
            time: start_time,
            warned_encoding: false,
            summary: ReplaySummary {
                end_time: start_time,
                ..ReplaySummary::default()
            },
        }
    }

    /// Handles one value change from the reader.
    ///
    /// A change at a later time first evaluates and checks the step that just
    /// completed; the first change at the reader's start time evaluates
    /// nothing.
    pub fn change(
        &mut self,
        time: Time,
        facility: FacilityId,
        value: &[u8],
        on_mismatch: &mut impl FnMut(&Mismatch),
    ) -> Result<()> {
        debug_assert!(time >= self.time, "value changes must arrive in time order");
        if time > self.time {
            self.step(on_mismatch)?;
            self.time = time;
        }
        if !is_two_state(value) {
            self.summary.encoding_warnings += 1;
            if !self.warned_encoding {
                self.warned_encoding = true;
                println!(
                    "WARN: value {} contains characters other than 0 and 1, packing them as 0",
                    String::from_utf8_lossy(value)
                );
            }
        }
        match self.registry.resolve(facility) {
            Some(Resolved::Input(sig)) => {
                let port = sig.port;
                pack_bits(self.model.port_mut(port), value);
            }
            Some(Resolved::Output(sig)) => pack_bits(&mut sig.expected, value),
            None => return Err(ReplayError::UnknownFacility(facility.index() as u32)),
        }
        Ok(())
    }

    /// Evaluates the model for the current time step and compares every
    /// output against the values captured from the stream.
    fn step(&mut self, on_mismatch: &mut impl FnMut(&Mismatch)) -> Result<()> {
        self.model.eval();
        self.summary.evals += 1;
        self.summary.end_time = self.time;
        for sig in self.registry.outputs() {
            let bytes = byte_len(sig.bits);
            let actual = &self.model.port(sig.port)[..bytes];
            if actual != &sig.expected[..] {
                self.summary.mismatches += 1;
                on_mismatch(&Mismatch {
                    signal: &sig.name,
                    time: self.time,
                    expected: &sig.expected,
                    actual,
                });
            }
        }
        if let Some(trace) = &mut self.trace {
            trace.dump(self.time, &*self.model)?;
        }
        Ok(())
    }

    /// One final evaluation after the stream ends, then the model's final
    /// hook. Evaluation is deferred until a time boundary, so the last time
    /// step is still pending here.
    pub fn finish(mut self, on_mismatch: &mut impl FnMut(&Mismatch)) -> Result<ReplaySummary> {
        self.step(on_mismatch)?;
        self.model.finish();
        Ok(self.summary)
    }

    /// Diagnostic for a facility that delivered non bit vector data.
    pub fn not_a_bit_vector(&self, facility_index: usize) -> ReplayError {
        match FacilityId::from_index(facility_index).and_then(|f| self.registry.name_of(f)) {
            Some(name) => ReplayError::NotABitVector(name.to_string()),
            None => ReplayError::UnknownFacility(facility_index as u32),
        }
    }
}
