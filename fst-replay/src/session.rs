// Copyright 2025 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>
//
// One-shot session lifecycle: open the waveform, register boundary signals,
// bind them to the hierarchy, replay the value changes, tear down.

use crate::model::{Model, PortId};
use crate::registry::{Direction, FacilityId, SignalRegistry};
use crate::replay::{Mismatch, Replayer, ReplaySummary};
use crate::trace::{FstTrace, TraceSink};
use crate::{ReplayError, Result, Time};
use fst_reader::{
    FstFilter, FstHierarchyEntry, FstReader, FstSignalHandle, FstSignalValue, FstVarType,
};
use std::io::BufReader;
use std::path::{Path, PathBuf};

type Reader = FstReader<BufReader<std::fs::File>>;

/// A replay session in its registration stage.
///
/// Register every boundary signal of the design, then call
/// [`bind`](Session::bind) to match them against the waveform. Each lifecycle
/// stage consumes the previous one, so a session cannot be rewound or reused.
pub struct Session<M: Model> {
    reader: Reader,
    registry: SignalRegistry,
    model: M,
    trace_path: Option<PathBuf>,
    trace: Option<Box<dyn TraceSink<M>>>,
}

impl<M: Model> Session<M> {
    /// Opens the waveform and takes the model for the duration of the replay.
    ///
    /// Pass `&mut model` to keep ownership on the caller's side.
    pub fn open<P: AsRef<Path>>(filename: P, model: M) -> Result<Self> {
        let input = BufReader::new(std::fs::File::open(filename.as_ref())?);
        let reader = FstReader::open_and_read_time_table(input)?;
        Ok(Session {
            reader,
            registry: SignalRegistry::default(),
            model,
            trace_path: None,
            trace: None,
        })
    }

    /// Declares an input: recorded values for `name` are packed into the
    /// model's port memory as they stream by.
    pub fn register_input(&mut self, name: impl Into<String>, port: PortId, bits: u32) -> Result<()> {
        self.registry
            .register(name.into(), Direction::Input, port, bits)
    }

    /// Declares an output: recorded values for `name` become the expected
    /// side of the per-step check.
    pub fn register_output(
        &mut self,
        name: impl Into<String>,
        port: PortId,
        bits: u32,
    ) -> Result<()> {
        self.registry
            .register(name.into(), Direction::Output, port, bits)
    }

    /// Writes an FST rendition of the model's boundary signals to `path`
    /// during the run.
    pub fn trace_to(&mut self, path: impl Into<PathBuf>) {
        self.trace_path = Some(path.into());
        self.trace = None;
    }

    /// Installs a custom trace sink instead of the built-in FST writer.
    pub fn set_trace(&mut self, sink: Box<dyn TraceSink<M>>) {
        self.trace = Some(sink);
        self.trace_path = None;
    }

    /// Walks the waveform hierarchy once, resolves every registered name to
    /// its facility, and fixes the facility process mask for the run.
    ///
    /// Fails if a registered signal is missing from the waveform, differs in
    /// width, or does not carry bit vector data; no value change has been
    /// consumed at that point.
    pub fn bind(mut self) -> Result<BoundSession<M>> {
        let registry = &mut self.registry;
        let mut scopes: Vec<String> = Vec::new();
        let mut fatal: Option<ReplayError> = None;
        self.reader.read_hierarchy(|entry| match entry {
            FstHierarchyEntry::Scope { name, .. } => scopes.push(name),
            FstHierarchyEntry::UpScope => {
                scopes.pop();
            }
            FstHierarchyEntry::Var {
                tpe,
                name,
                length,
                handle,
                ..
            } => {
                if fatal.is_some() {
                    return;
                }
                let full = full_name(&scopes, strip_index(&name));
                if !registry.is_registered(&full) {
                    return;
                }
                if let Err(e) = bind_var(registry, full, tpe, length, handle) {
                    fatal = Some(e);
                }
            }
            _ => {}
        })?;
        if let Some(e) = fatal {
            return Err(e);
        }
        if let Some(name) = self.registry.unbound().first() {
            return Err(ReplayError::SignalNotInWaveform(name.to_string()));
        }

        let header = self.reader.get_header();
        let start_time = header.start_time;
        let trace = match (self.trace, self.trace_path) {
            (Some(sink), _) => Some(sink),
            (None, Some(path)) => {
                let trace = FstTrace::create(
                    &path,
                    start_time,
                    header.timescale_exponent,
                    &self.registry,
                )?;
                Some(Box::new(trace) as Box<dyn TraceSink<M>>)
            }
            (None, None) => None,
        };
        let facilities = self.registry.facilities();
        Ok(BoundSession {
            reader: self.reader,
            registry: self.registry,
            model: self.model,
            trace,
            facilities,
            start_time,
        })
    }
}

/// A session whose signals are all matched to the waveform, ready to run.
pub struct BoundSession<M: Model> {
    reader: Reader,
    registry: SignalRegistry,
    model: M,
    trace: Option<Box<dyn TraceSink<M>>>,
    facilities: Vec<FacilityId>,
    start_time: Time,
}

impl<M: Model> std::fmt::Debug for BoundSession<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundSession")
            .field("start_time", &self.start_time)
            .finish_non_exhaustive()
    }
}

impl<M: Model> BoundSession<M> {
    /// Replays the whole stream against the model.
    ///
    /// `on_mismatch` is invoked for every miscompare; the run continues so a
    /// single pass reveals all divergence points. Teardown, including closing
    /// the trace sink, is attempted even when the replay fails.
    pub fn run(mut self, mut on_mismatch: impl FnMut(&Mismatch)) -> Result<ReplaySummary> {
        let fst_ids: Vec<FstSignalHandle> = self
            .facilities
            .iter()
            .map(|f| FstSignalHandle::from_index(f.index()))
            .collect();
        let filter = FstFilter::filter_signals(fst_ids);

        let mut replayer = Replayer::new(
            &mut self.registry,
            &mut self.model,
            self.trace.as_deref_mut(),
            self.start_time,
        );
        let mut fatal: Option<ReplayError> = None;
        let read_result = self.reader.read_signals(&filter, |time, handle, value| {
            if fatal.is_some() {
                return;
            }
            let value = match value {
                FstSignalValue::String(value) => value,
                FstSignalValue::Real(_) => {
                    fatal = Some(replayer.not_a_bit_vector(handle.get_index()));
                    return;
                }
            };
            let facility = FacilityId::from_index(handle.get_index()).unwrap();
            if let Err(e) = replayer.change(time, facility, value, &mut on_mismatch) {
                fatal = Some(e);
            }
        });

        let result = match (read_result, fatal) {
            (Err(e), _) => Err(e.into()),
            (Ok(()), Some(e)) => Err(e),
            // the stream only evaluates on time boundaries, so the last time
            // step is processed here
            (Ok(()), None) => replayer.finish(&mut on_mismatch),
        };

        // close the trace even when the replay failed
        let trace_result = match self.trace.as_mut() {
            Some(trace) => trace.finish(),
            None => Ok(()),
        };
        let summary = result?;
        trace_result?;
        Ok(summary)
    }
}

fn bind_var(
    registry: &mut SignalRegistry,
    name: String,
    tpe: FstVarType,
    length: u32,
    handle: FstSignalHandle,
) -> Result<()> {
    match tpe {
        FstVarType::Real
        | FstVarType::RealTime
        | FstVarType::RealParameter
        | FstVarType::ShortReal
        | FstVarType::GenericString => return Err(ReplayError::NotABitVector(name)),
        _ => {}
    }
    let facility = FacilityId::from_index(handle.get_index()).unwrap();
    registry.bind(&name, facility, length)
}

/// FST variable names often carry the bit range, like `data [7:0]`.
fn strip_index(name: &str) -> &str {
    match name.find(' ') {
        Some(pos) => &name[..pos],
        None => name,
    }
}

fn full_name(scopes: &[String], name: &str) -> String {
    let capacity = scopes.iter().map(|s| s.len() + 1).sum::<usize>() + name.len();
    let mut full = String::with_capacity(capacity);
    for scope in scopes {
        full.push_str(scope);
        full.push('.');
    }
    full.push_str(name);
    full
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_index() {
        assert_eq!(strip_index("data [7:0]"), "data");
        assert_eq!(strip_index("clk"), "clk");
        assert_eq!(strip_index("bus [11:0]"), "bus");
    }

    #[test]
    fn test_full_name() {
        assert_eq!(full_name(&[], "clk"), "clk");
        let scopes = vec!["top".to_string(), "core".to_string()];
        assert_eq!(full_name(&scopes, "state"), "top.core.state");
    }
}
