// Copyright 2025 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use std::num::NonZeroU32;

/// Identifies the byte region backing one boundary signal of a [`Model`].
///
/// Indices are assigned by the model implementation; the harness never
/// interprets them beyond handing them back to [`Model::port`] and
/// [`Model::port_mut`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortId(NonZeroU32);

impl PortId {
    #[inline]
    pub fn from_index(index: usize) -> Option<Self> {
        NonZeroU32::new(index as u32 + 1).map(PortId)
    }

    #[inline]
    pub fn index(&self) -> usize {
        (self.0.get() - 1) as usize
    }
}

/// A compiled, cycle-accurate simulation model of the design under test.
///
/// The harness drives the model exclusively through this trait: inputs are
/// written into port memory between evaluations, [`eval`](Model::eval) is
/// called once per time step, and output ports are read back for checking.
pub trait Model {
    /// Advances combinational and sequential logic to a fixed point for the
    /// current input vector.
    fn eval(&mut self);

    /// Invoked exactly once, after the last evaluation.
    fn finish(&mut self) {}

    /// The byte region backing a boundary signal: `ceil(width / 8)` bytes,
    /// little-endian, with bit `i` of the signal stored in byte `i / 8` at
    /// position `i % 8`. Bits past the signal width in the final byte must
    /// read as zero after every `eval`.
    fn port(&self, port: PortId) -> &[u8];

    /// Mutable access to the same region. The harness writes input values
    /// through this; it never writes outputs.
    fn port_mut(&mut self, port: PortId) -> &mut [u8];
}

/// Allows a caller to keep ownership of the model across a replay session.
impl<M: Model + ?Sized> Model for &mut M {
    fn eval(&mut self) {
        (**self).eval()
    }

    fn finish(&mut self) {
        (**self).finish()
    }

    fn port(&self, port: PortId) -> &[u8] {
        (**self).port(port)
    }

    fn port_mut(&mut self, port: PortId) -> &mut [u8] {
        (**self).port_mut(port)
    }
}
