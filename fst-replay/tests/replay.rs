// Copyright 2025 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>
//
// End-to-end replay tests: fabricate a small FST with fst-writer, replay it
// against a hand-written model and check what the harness reports.

use fst_reader::{FstFilter, FstHierarchyEntry, FstReader, FstSignalValue};
use fst_replay::{Model, PortId, ReplayError, Session};
use fst_writer::{
    open_fst, FstFileType, FstInfo, FstScopeType, FstSignalType, FstVarDirection, FstVarType,
};
use std::io::BufReader;
use std::path::Path;

/// A model backed by one byte buffer per port with a pluggable update
/// function that runs on every eval.
struct PortModel {
    ports: Vec<Vec<u8>>,
    update: fn(&mut [Vec<u8>]),
    evals: u64,
    finished: bool,
}

impl PortModel {
    fn new(widths: &[u32], update: fn(&mut [Vec<u8>])) -> Self {
        PortModel {
            ports: widths
                .iter()
                .map(|bits| vec![0; (*bits as usize).div_ceil(8)])
                .collect(),
            update,
            evals: 0,
            finished: false,
        }
    }
}

impl Model for PortModel {
    fn eval(&mut self) {
        (self.update)(&mut self.ports);
        self.evals += 1;
    }

    fn finish(&mut self) {
        self.finished = true;
    }

    fn port(&self, port: PortId) -> &[u8] {
        &self.ports[port.index()]
    }

    fn port_mut(&mut self, port: PortId) -> &mut [u8] {
        &mut self.ports[port.index()]
    }
}

fn identity(ports: &mut [Vec<u8>]) {
    ports[1][0] = ports[0][0];
}

fn inverter(ports: &mut [Vec<u8>]) {
    ports[1][0] = !ports[0][0] & 1;
}

fn noop(_: &mut [Vec<u8>]) {}

fn port(index: usize) -> PortId {
    PortId::from_index(index).unwrap()
}

fn fst_info() -> FstInfo {
    FstInfo {
        start_time: 0,
        timescale_exponent: -9,
        version: "fst-replay test".to_string(),
        date: String::new(),
        file_type: FstFileType::Verilog,
    }
}

/// Writes `top.a` (1 bit input) and `top.y` (1 bit output) with the given
/// `(time, name, value)` changes.
fn write_two_signal_fst(path: &Path, changes: &[(u64, &str, &str)]) {
    let mut header = open_fst(path, &fst_info()).unwrap();
    header.scope("top", "", FstScopeType::Module).unwrap();
    let a = header
        .var(
            "a",
            FstSignalType::bit_vec(1),
            FstVarType::Wire,
            FstVarDirection::Input,
            None,
        )
        .unwrap();
    let y = header
        .var(
            "y",
            FstSignalType::bit_vec(1),
            FstVarType::Wire,
            FstVarDirection::Output,
            None,
        )
        .unwrap();
    header.up_scope().unwrap();

    let mut body = header.finish().unwrap();
    let mut time = None;
    for (t, name, value) in changes {
        // values at the start time become the initial frame, everything
        // later is a regular change
        if *t > 0 && time != Some(*t) {
            body.time_change(*t).unwrap();
            time = Some(*t);
        }
        let id = if *name == "a" { a } else { y };
        body.signal_change(id, value.as_bytes()).unwrap();
    }
    body.finish().unwrap();
}

/// Writes a single `top.bus` variable of the given width with one change per
/// `(time, value)` entry.
fn write_bus_fst(path: &Path, bits: u32, changes: &[(u64, &str)]) {
    let mut header = open_fst(path, &fst_info()).unwrap();
    header.scope("top", "", FstScopeType::Module).unwrap();
    let bus = header
        .var(
            "bus",
            FstSignalType::bit_vec(bits),
            FstVarType::Wire,
            FstVarDirection::Input,
            None,
        )
        .unwrap();
    header.up_scope().unwrap();

    let mut body = header.finish().unwrap();
    for (t, value) in changes {
        if *t > 0 {
            body.time_change(*t).unwrap();
        }
        body.signal_change(bus, value.as_bytes()).unwrap();
    }
    body.finish().unwrap();
}

#[test]
fn test_identity_passthrough() {
    let dir = tempfile::tempdir().unwrap();
    let fst = dir.path().join("identity.fst");
    write_two_signal_fst(
        &fst,
        &[(0, "a", "1"), (0, "y", "1"), (10, "a", "0"), (10, "y", "0")],
    );

    let mut model = PortModel::new(&[1, 1], identity);
    let mut session = Session::open(&fst, &mut model).unwrap();
    session.register_input("top.a", port(0), 1).unwrap();
    session.register_output("top.y", port(1), 1).unwrap();

    let mut reports = Vec::new();
    let summary = session
        .bind()
        .unwrap()
        .run(|m| reports.push(m.to_string()))
        .unwrap();

    assert!(reports.is_empty());
    assert_eq!(summary.mismatches, 0);
    // one eval at the boundary to time 10, one for the final time step
    assert_eq!(summary.evals, 2);
    assert_eq!(summary.end_time, 10);
    assert_eq!(model.evals, 2);
    assert!(model.finished);
}

#[test]
fn test_detected_divergence() {
    let dir = tempfile::tempdir().unwrap();
    let fst = dir.path().join("diverge.fst");
    write_two_signal_fst(
        &fst,
        &[(0, "a", "1"), (0, "y", "1"), (10, "a", "0"), (10, "y", "0")],
    );

    let mut model = PortModel::new(&[1, 1], inverter);
    let mut session = Session::open(&fst, &mut model).unwrap();
    session.register_input("top.a", port(0), 1).unwrap();
    session.register_output("top.y", port(1), 1).unwrap();

    let mut reports = Vec::new();
    let summary = session
        .bind()
        .unwrap()
        .run(|m| reports.push(m.to_string()))
        .unwrap();

    // the run completes and reports every divergence point
    assert_eq!(summary.mismatches, 2);
    assert_eq!(reports, ["Miscompare: top.y @ 0", "Miscompare: top.y @ 10"]);
}

#[test]
fn test_multi_bit_packing() {
    let dir = tempfile::tempdir().unwrap();
    let fst = dir.path().join("bus.fst");
    write_bus_fst(&fst, 12, &[(0, "100000000001")]);

    let mut model = PortModel::new(&[12], noop);
    let mut session = Session::open(&fst, &mut model).unwrap();
    session.register_input("top.bus", port(0), 12).unwrap();
    let summary = session.bind().unwrap().run(|_| {}).unwrap();

    assert_eq!(summary.evals, 1);
    assert_eq!(model.ports[0], [0x01, 0x08]);
}

#[test]
fn test_width_mismatch_fails_at_bind() {
    let dir = tempfile::tempdir().unwrap();
    let fst = dir.path().join("narrow.fst");
    write_bus_fst(&fst, 7, &[(0, "1010101")]);

    let mut model = PortModel::new(&[8], noop);
    let mut session = Session::open(&fst, &mut model).unwrap();
    session.register_input("top.bus", port(0), 8).unwrap();
    let err = session.bind().unwrap_err();

    assert!(matches!(
        err,
        ReplayError::WidthMismatch {
            registered: 8,
            reported: 7,
            ..
        }
    ));
    // bind failed before any value change was consumed
    assert_eq!(model.evals, 0);
}

#[test]
fn test_missing_signal_fails_at_bind() {
    let dir = tempfile::tempdir().unwrap();
    let fst = dir.path().join("missing.fst");
    write_two_signal_fst(&fst, &[(0, "a", "1")]);

    let mut model = PortModel::new(&[1, 1], identity);
    let mut session = Session::open(&fst, &mut model).unwrap();
    session.register_input("top.a", port(0), 1).unwrap();
    session.register_output("top.ghost", port(1), 1).unwrap();
    let err = session.bind().unwrap_err();

    assert!(matches!(
        err,
        ReplayError::SignalNotInWaveform(name) if name == "top.ghost"
    ));
}

#[test]
fn test_duplicate_registration() {
    let dir = tempfile::tempdir().unwrap();
    let fst = dir.path().join("dup.fst");
    write_two_signal_fst(&fst, &[]);

    let mut model = PortModel::new(&[1, 1], identity);
    let mut session = Session::open(&fst, &mut model).unwrap();
    session.register_input("top.a", port(0), 1).unwrap();
    let err = session.register_output("top.a", port(1), 1).unwrap_err();
    assert!(matches!(err, ReplayError::DuplicateSignal(_)));
}

#[test]
fn test_empty_stream() {
    let dir = tempfile::tempdir().unwrap();
    let fst = dir.path().join("empty.fst");
    write_two_signal_fst(&fst, &[]);

    let mut model = PortModel::new(&[1, 1], identity);
    let mut session = Session::open(&fst, &mut model).unwrap();
    session.register_input("top.a", port(0), 1).unwrap();
    session.register_output("top.y", port(1), 1).unwrap();
    let summary = session.bind().unwrap().run(|_| {}).unwrap();

    // exactly one eval + final pair even without any value change
    assert_eq!(summary.evals, 1);
    assert_eq!(summary.mismatches, 0);
    assert_eq!(summary.end_time, 0);
    assert_eq!(model.evals, 1);
    assert!(model.finished);
}

#[test]
fn test_four_state_values_pack_as_zero() {
    let dir = tempfile::tempdir().unwrap();
    let fst = dir.path().join("fourstate.fst");
    write_bus_fst(&fst, 4, &[(0, "10x1"), (5, "zz11")]);

    let mut model = PortModel::new(&[4], noop);
    let mut session = Session::open(&fst, &mut model).unwrap();
    session.register_input("top.bus", port(0), 4).unwrap();
    let summary = session.bind().unwrap().run(|_| {}).unwrap();

    assert_eq!(summary.encoding_warnings, 2);
    // the final value "zz11" with z treated as 0
    assert_eq!(model.ports[0], [0x03]);
}

#[test]
fn test_replay_trace_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let fst = dir.path().join("stimulus.fst");
    let trace = dir.path().join("replay.fst");
    write_two_signal_fst(
        &fst,
        &[(0, "a", "1"), (0, "y", "1"), (10, "a", "0"), (10, "y", "0")],
    );

    let mut model = PortModel::new(&[1, 1], identity);
    let mut session = Session::open(&fst, &mut model).unwrap();
    session.register_input("top.a", port(0), 1).unwrap();
    session.register_output("top.y", port(1), 1).unwrap();
    session.trace_to(&trace);
    let summary = session.bind().unwrap().run(|_| {}).unwrap();
    assert_eq!(summary.mismatches, 0);

    // the emitted trace contains the model's values at both sample times
    let (vars, changes) = read_fst(&trace);
    let a = var_handle(&vars, "top.a");
    let y = var_handle(&vars, "top.y");
    assert_eq!(vars.len(), 2);

    for handle in [a, y] {
        assert_eq!(value_at(&changes, handle, 0).as_deref(), Some("1"));
        assert_eq!(value_at(&changes, handle, 10).as_deref(), Some("0"));
    }
}

fn read_fst(path: &Path) -> (Vec<(usize, String, u32)>, Vec<(u64, usize, String)>) {
    let input = BufReader::new(std::fs::File::open(path).unwrap());
    let mut reader = FstReader::open_and_read_time_table(input).unwrap();

    let mut vars = Vec::new();
    let mut scopes: Vec<String> = Vec::new();
    reader
        .read_hierarchy(|entry| match entry {
            FstHierarchyEntry::Scope { name, .. } => scopes.push(name),
            FstHierarchyEntry::UpScope => {
                scopes.pop();
            }
            FstHierarchyEntry::Var {
                name,
                length,
                handle,
                ..
            } => {
                let full = format!("{}.{}", scopes.join("."), name);
                vars.push((handle.get_index(), full, length));
            }
            _ => {}
        })
        .unwrap();

    let mut changes = Vec::new();
    reader
        .read_signals(&FstFilter::all(), |time, handle, value| {
            if let FstSignalValue::String(value) = value {
                changes.push((
                    time,
                    handle.get_index(),
                    String::from_utf8_lossy(value).to_string(),
                ));
            }
        })
        .unwrap();
    (vars, changes)
}

fn var_handle(vars: &[(usize, String, u32)], name: &str) -> usize {
    vars.iter()
        .find(|(_, n, _)| n == name)
        .unwrap_or_else(|| panic!("no var named {name}"))
        .0
}

/// The last value recorded for `handle` at exactly `time`.
fn value_at(changes: &[(u64, usize, String)], handle: usize, time: u64) -> Option<String> {
    changes
        .iter()
        .filter(|(t, h, _)| *h == handle && *t == time)
        .map(|(_, _, v)| v.clone())
        .last()
}
