// Copyright 2025 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>
//
// Re-emits what the model actually produced as an FST file, one sample per
// evaluated time step, for diff-based debugging against the input waveform.

use crate::model::{Model, PortId};
use crate::pack::unpack_bits;
use crate::registry::{Direction, SignalRegistry};
use crate::{Result, Time};
use fst_writer::{
    open_fst, FstFileType, FstInfo, FstScopeType, FstSignalId, FstSignalType, FstVarDirection,
    FstVarType,
};
use std::path::Path;

/// Receives one sample per evaluated time step.
///
/// The sink is an optional collaborator: a session without one simply never
/// samples. [`finish`](TraceSink::finish) is always attempted during
/// teardown, even when the run failed.
pub trait TraceSink<M: Model> {
    /// Records the value of every traced signal at `time`.
    fn dump(&mut self, time: Time, model: &M) -> Result<()>;

    /// Flushes and closes the sink. Must be safe to call more than once.
    fn finish(&mut self) -> Result<()>;
}

type BodyWriter = fst_writer::FstBodyWriter<std::io::BufWriter<std::fs::File>>;

struct TraceVar {
    id: FstSignalId,
    port: PortId,
    bits: u32,
}

/// FST trace of the model's boundary signals, mirroring the scope layout of
/// the hierarchical names they were registered under.
pub(crate) struct FstTrace {
    writer: Option<BodyWriter>,
    vars: Vec<TraceVar>,
    buf: Vec<u8>,
}

impl FstTrace {
    /// Declares one variable per bound signal and switches the underlying
    /// writer into its value change section.
    pub(crate) fn create(
        path: &Path,
        start_time: Time,
        timescale_exponent: i8,
        registry: &SignalRegistry,
    ) -> Result<Self> {
        let info = FstInfo {
            start_time,
            timescale_exponent,
            version: format!("fst-replay {}", crate::VERSION),
            date: String::new(),
            file_type: FstFileType::Verilog,
        };
        let mut header = open_fst(path, &info)?;

        // sorting groups signals that share scope prefixes
        let mut signals: Vec<(&str, Direction, PortId, u32)> = registry.bound().collect();
        signals.sort_unstable_by(|a, b| a.0.cmp(b.0));

        let mut stack: Vec<&str> = Vec::new();
        let mut vars = Vec::with_capacity(signals.len());
        for (name, direction, port, bits) in signals {
            let (scope_path, leaf) = match name.rfind('.') {
                Some(pos) => (&name[..pos], &name[pos + 1..]),
                None => ("", name),
            };
            let scopes: Vec<&str> = if scope_path.is_empty() {
                Vec::new()
            } else {
                scope_path.split('.').collect()
            };
            let common = stack
                .iter()
                .zip(scopes.iter())
                .take_while(|(a, b)| a == b)
                .count();
            while stack.len() > common {
                header.up_scope()?;
                stack.pop();
            }
            for &scope in &scopes[common..] {
                header.scope(scope, "", FstScopeType::Module)?;
                stack.push(scope);
            }
            let fst_direction = match direction {
                Direction::Input => FstVarDirection::Input,
                Direction::Output => FstVarDirection::Output,
            };
            let id = header.var(
                leaf,
                FstSignalType::bit_vec(bits),
                FstVarType::Wire,
                fst_direction,
                None,
            )?;
            vars.push(TraceVar { id, port, bits });
        }
        while stack.pop().is_some() {
            header.up_scope()?;
        }

        let writer = header.finish()?;
        Ok(FstTrace {
            writer: Some(writer),
            vars,
            buf: Vec::with_capacity(128),
        })
    }
}

impl<M: Model> TraceSink<M> for FstTrace {
    fn dump(&mut self, time: Time, model: &M) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        writer.time_change(time)?;
        for var in &self.vars {
            unpack_bits(model.port(var.port), var.bits, &mut self.buf);
            writer.signal_change(var.id, &self.buf)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finish()?;
        }
        Ok(())
    }
}
