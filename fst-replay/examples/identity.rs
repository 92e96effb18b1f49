// Copyright 2025 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>
//
// Writes a small stimulus waveform, then replays it against a hand-written
// identity model while recording what the model produced.

use clap::Parser;
use fst_replay::{Model, PortId, Session};
use fst_writer::{
    open_fst, FstFileType, FstInfo, FstScopeType, FstSignalType, FstVarDirection, FstVarType,
};

#[derive(Parser, Debug)]
#[command(name = "identity")]
#[command(version)]
#[command(about = "Replays a generated stimulus against an identity model.", long_about = None)]
struct Args {
    #[arg(value_name = "FSTFILE", index = 1, default_value = "identity.fst")]
    stimulus: String,
    /// Where to write the model's own waveform.
    #[arg(long, default_value = "replay.fst")]
    trace: String,
}

/// `y` follows `a` combinationally.
#[derive(Default)]
struct Identity {
    a: [u8; 1],
    y: [u8; 1],
}

impl Model for Identity {
    fn eval(&mut self) {
        self.y[0] = self.a[0];
    }

    fn port(&self, port: PortId) -> &[u8] {
        match port.index() {
            0 => &self.a,
            _ => &self.y,
        }
    }

    fn port_mut(&mut self, port: PortId) -> &mut [u8] {
        match port.index() {
            0 => &mut self.a,
            _ => &mut self.y,
        }
    }
}

fn write_stimulus(filename: &str) -> fst_replay::Result<()> {
    let info = FstInfo {
        start_time: 0,
        timescale_exponent: -9,
        version: format!("fst-replay {}", fst_replay::VERSION),
        date: String::new(),
        file_type: FstFileType::Verilog,
    };
    let mut header = open_fst(filename, &info)?;
    header.scope("top", "", FstScopeType::Module)?;
    let a = header.var(
        "a",
        FstSignalType::bit_vec(1),
        FstVarType::Wire,
        FstVarDirection::Input,
        None,
    )?;
    let y = header.var(
        "y",
        FstSignalType::bit_vec(1),
        FstVarType::Wire,
        FstVarDirection::Output,
        None,
    )?;
    header.up_scope()?;

    let mut body = header.finish()?;
    for (time, value) in [(0u64, b"1"), (10, b"0"), (20, b"1"), (30, b"0")] {
        if time > 0 {
            body.time_change(time)?;
        }
        body.signal_change(a, value)?;
        body.signal_change(y, value)?;
    }
    body.finish()?;
    Ok(())
}

fn main() -> fst_replay::Result<()> {
    let args = Args::parse();
    write_stimulus(&args.stimulus)?;

    let mut model = Identity::default();
    let mut session = Session::open(&args.stimulus, &mut model)?;
    session.register_input("top.a", PortId::from_index(0).unwrap(), 1)?;
    session.register_output("top.y", PortId::from_index(1).unwrap(), 1)?;
    session.trace_to(&args.trace);

    let summary = session.bind()?.run(|m| println!("{m}"))?;
    println!(
        "replayed {} time steps from {}: {} miscompares, trace written to {}",
        summary.evals, args.stimulus, summary.mismatches, args.trace
    );
    Ok(())
}
