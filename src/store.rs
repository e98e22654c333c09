//! Shared register storage for the slave.
//!
//! The store owns the four Modbus data banks: coils and discrete inputs
//! as bit-packed cells, holding and input registers as 16-bit words.
//! Bank sizes are fixed at construction and every cell starts at zero.
//!
//! Each bank sits behind its own `RwLock`; an operation touches exactly
//! one bank, takes its lock once, and either commits fully or leaves the
//! bank untouched. Worker ticks increment their whole address list under
//! a single write lock, so a concurrent reader never observes a partial
//! tick.
//!
//! Bit cells are packed little-endian within a byte: address `a` lives
//! in bit `a % 8` of byte `a / 8`. This matches the wire layout of the
//! bit-oriented function codes, so reads and writes move whole packed
//! spans.

use std::sync::RwLock;

use crate::error::{ModsimError, ModsimResult};

/// Selector for the two word banks a mutator may target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordBank {
    /// Holding registers (read/write)
    Holding,
    /// Input registers (read-only to the protocol)
    Input,
}

impl std::fmt::Display for WordBank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WordBank::Holding => write!(f, "holding"),
            WordBank::Input => write!(f, "input"),
        }
    }
}

/// Bit-packed bank of single-bit cells
#[derive(Debug)]
struct BitBank {
    bytes: Vec<u8>,
    size: u16,
}

impl BitBank {
    fn new(size: u16) -> Self {
        Self {
            bytes: vec![0u8; (size as usize + 7) / 8],
            size,
        }
    }

    fn check_span(&self, start: u16, count: u16) -> ModsimResult<()> {
        if start as usize + count as usize > self.size as usize {
            return Err(ModsimError::out_of_range(start, count));
        }
        Ok(())
    }

    fn get(&self, addr: u16) -> bool {
        self.bytes[addr as usize / 8] & (1 << (addr % 8)) != 0
    }

    fn set(&mut self, addr: u16, value: bool) {
        let byte = &mut self.bytes[addr as usize / 8];
        if value {
            *byte |= 1 << (addr % 8);
        } else {
            *byte &= !(1 << (addr % 8));
        }
    }

    /// Copy `count` cells starting at `start` into a fresh packed span.
    /// Output bit `i` is bit `i % 8` of byte `i / 8`; the tail byte is
    /// zero-padded in its high bits.
    fn read_packed(&self, start: u16, count: u16) -> Vec<u8> {
        let mut out = vec![0u8; (count as usize + 7) / 8];
        for i in 0..count {
            if self.get(start + i) {
                out[i as usize / 8] |= 1 << (i % 8);
            }
        }
        out
    }

    fn write_packed(&mut self, start: u16, count: u16, packed: &[u8]) {
        for i in 0..count {
            let bit = packed[i as usize / 8] & (1 << (i % 8)) != 0;
            self.set(start + i, bit);
        }
    }
}

/// Word bank of 16-bit registers
#[derive(Debug)]
struct RegBank {
    words: Vec<u16>,
}

impl RegBank {
    fn new(size: u16) -> Self {
        Self {
            words: vec![0u16; size as usize],
        }
    }

    fn check_span(&self, start: u16, count: u16) -> ModsimResult<()> {
        if start as usize + count as usize > self.words.len() {
            return Err(ModsimError::out_of_range(start, count));
        }
        Ok(())
    }

    fn read_be(&self, start: u16, count: u16) -> Vec<u8> {
        let mut out = Vec::with_capacity(count as usize * 2);
        for &word in &self.words[start as usize..start as usize + count as usize] {
            out.extend_from_slice(&word.to_be_bytes());
        }
        out
    }

    fn write_be(&mut self, start: u16, count: u16, bytes: &[u8]) {
        for i in 0..count as usize {
            let word = u16::from_be_bytes([bytes[i * 2], bytes[i * 2 + 1]]);
            self.words[start as usize + i] = word;
        }
    }
}

/// Thread-safe register storage shared by client handlers and workers
#[derive(Debug)]
pub struct RegisterStore {
    coils: RwLock<BitBank>,
    discrete_inputs: RwLock<BitBank>,
    holding_registers: RwLock<RegBank>,
    input_registers: RwLock<RegBank>,
}

impl RegisterStore {
    /// Create a store with the given bank sizes, all cells zero
    pub fn new(coils: u16, discrete: u16, holding: u16, input: u16) -> Self {
        Self {
            coils: RwLock::new(BitBank::new(coils)),
            discrete_inputs: RwLock::new(BitBank::new(discrete)),
            holding_registers: RwLock::new(RegBank::new(holding)),
            input_registers: RwLock::new(RegBank::new(input)),
        }
    }

    /// Read coils as a bit-packed span
    pub fn read_coils(&self, start: u16, count: u16) -> ModsimResult<Vec<u8>> {
        let coils = self.coils.read().unwrap();
        coils.check_span(start, count)?;
        Ok(coils.read_packed(start, count))
    }

    /// Read discrete inputs as a bit-packed span
    pub fn read_discrete(&self, start: u16, count: u16) -> ModsimResult<Vec<u8>> {
        let inputs = self.discrete_inputs.read().unwrap();
        inputs.check_span(start, count)?;
        Ok(inputs.read_packed(start, count))
    }

    /// Read holding registers as big-endian bytes
    pub fn read_holding(&self, start: u16, count: u16) -> ModsimResult<Vec<u8>> {
        let registers = self.holding_registers.read().unwrap();
        registers.check_span(start, count)?;
        Ok(registers.read_be(start, count))
    }

    /// Read input registers as big-endian bytes
    pub fn read_input(&self, start: u16, count: u16) -> ModsimResult<Vec<u8>> {
        let registers = self.input_registers.read().unwrap();
        registers.check_span(start, count)?;
        Ok(registers.read_be(start, count))
    }

    /// Write a single coil
    pub fn write_coil(&self, addr: u16, value: bool) -> ModsimResult<()> {
        let mut coils = self.coils.write().unwrap();
        coils.check_span(addr, 1)?;
        coils.set(addr, value);
        Ok(())
    }

    /// Write a single holding register
    pub fn write_register(&self, addr: u16, value: u16) -> ModsimResult<()> {
        let mut registers = self.holding_registers.write().unwrap();
        registers.check_span(addr, 1)?;
        registers.words[addr as usize] = value;
        Ok(())
    }

    /// Write `count` coils from a bit-packed span
    ///
    /// `packed` must hold at least `ceil(count / 8)` bytes.
    pub fn write_coils(&self, start: u16, count: u16, packed: &[u8]) -> ModsimResult<()> {
        if packed.len() < (count as usize + 7) / 8 {
            return Err(ModsimError::illegal_value(format!(
                "{} bytes cannot hold {} coils",
                packed.len(),
                count
            )));
        }
        let mut coils = self.coils.write().unwrap();
        coils.check_span(start, count)?;
        coils.write_packed(start, count, packed);
        Ok(())
    }

    /// Write `count` holding registers from big-endian bytes
    pub fn write_registers(&self, start: u16, count: u16, bytes: &[u8]) -> ModsimResult<()> {
        if bytes.len() < count as usize * 2 {
            return Err(ModsimError::illegal_value(format!(
                "{} bytes cannot hold {} registers",
                bytes.len(),
                count
            )));
        }
        let mut registers = self.holding_registers.write().unwrap();
        registers.check_span(start, count)?;
        registers.write_be(start, count, bytes);
        Ok(())
    }

    /// Apply one auto-increment tick to a word bank
    ///
    /// Each in-range address steps by `inc`, wrapping to zero once the
    /// value reaches `max - inc` (or immediately when `inc > max`).
    /// Out-of-range addresses are skipped; they come from configuration,
    /// not from a client. The whole list commits under one write lock.
    pub fn increment(&self, bank: WordBank, addresses: &[u16], inc: u16, max: u16) {
        let lock = match bank {
            WordBank::Holding => &self.holding_registers,
            WordBank::Input => &self.input_registers,
        };
        let mut registers = lock.write().unwrap();

        for &addr in addresses {
            let Some(slot) = registers.words.get_mut(addr as usize) else {
                continue;
            };
            *slot = match max.checked_sub(inc) {
                Some(threshold) if *slot < threshold => *slot + inc,
                _ => 0,
            };
        }
    }
}
