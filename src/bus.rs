//! Register bus access
//!
//! The core never opens hardware on its own; it is handed an already
//! addressed [`RegisterBus`] by the caller. A programming pass needs the bus
//! for itself from start to finish, which is expressed by borrowing it
//! mutably for the duration of the pass. When several devices share one bus
//! across threads wrap it in a [`SharedBus`] and take an
//! [`exclusive`][`SharedBus::exclusive`] scope.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use crate::OnixError;


/// Communication fault reported by a register bus
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("Write of 0x{value:02x} to register 0x{addr:02x} failed: {reason}")]
    Write { addr: u32, value: u32, reason: String },
    #[error("Read from register 0x{addr:02x} failed: {reason}")]
    Read { addr: u32, reason: String },
}


/// Synchronous access to a device's register space
pub trait RegisterBus {

    /// Write `value` to register `addr`
    fn write_register(&mut self, addr: u32, value: u32) -> Result<(), BusError>;

    /// Read register `addr`
    fn read_register(&mut self, addr: u32) -> Result<u32, BusError>;
}

impl<B: RegisterBus + ?Sized> RegisterBus for &mut B {
    fn write_register(&mut self, addr: u32, value: u32) -> Result<(), BusError> {
        (**self).write_register(addr, value)
    }

    fn read_register(&mut self, addr: u32) -> Result<u32, BusError> {
        (**self).read_register(addr)
    }
}

impl<B: RegisterBus + ?Sized> RegisterBus for Box<B> {
    fn write_register(&mut self, addr: u32, value: u32) -> Result<(), BusError> {
        (**self).write_register(addr, value)
    }

    fn read_register(&mut self, addr: u32) -> Result<u32, BusError> {
        (**self).read_register(addr)
    }
}


/// A register bus shared between several users
///
/// Cloning a `SharedBus` yields another handle to the same bus. Exclusive
/// access is held for as long as the guard returned by
/// [`SharedBus::exclusive`] is alive and released when it is dropped,
/// whether the pass succeeded or not.
pub struct SharedBus<B> {
    inner: Arc<Mutex<B>>,
}

impl<B> Clone for SharedBus<B> {
    fn clone(&self) -> Self {
        SharedBus { inner: self.inner.clone() }
    }
}

impl<B: RegisterBus> SharedBus<B> {

    pub fn new(bus: B) -> Self {
        SharedBus { inner: Arc::new(Mutex::new(bus)) }
    }

    /// Block until the bus is available and hold it exclusively
    pub fn exclusive(&self) -> Result<MutexGuard<'_, B>, OnixError> {
        self.inner.lock().map_err(|_| OnixError::BusPoisoned)
    }
}


/// A single recorded bus transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transaction {
    Write { addr: u32, value: u32 },
    Read { addr: u32, value: u32 },
}


/// In-memory register file that records all traffic
///
/// `DummyBus` stands in for real hardware. Written values are stored and
/// read back; reads of specific registers can be scripted with
/// [`DummyBus::script_reads`] and a communication fault can be injected at
/// a given transaction with [`DummyBus::fail_at`].
#[derive(Debug, Default)]
pub struct DummyBus {
    registers: HashMap<u32, u32>,
    scripted: HashMap<u32, VecDeque<u32>>,
    log: Vec<Transaction>,
    fail_at: Option<usize>,
}

impl DummyBus {

    pub fn new() -> Self {
        Self::default()
    }

    /// Queue values returned by successive reads of `addr`. Once the
    /// queue is exhausted reads return the last written value.
    pub fn script_reads(&mut self, addr: u32, values: &[u32]) -> &mut Self {
        self.scripted.entry(addr).or_default().extend(values);
        self
    }

    /// Fail the `n`-th transaction (0-based) and every one after it
    pub fn fail_at(&mut self, n: usize) -> &mut Self {
        self.fail_at = Some(n);
        self
    }

    /// All transactions so far, in order
    pub fn transactions(&self) -> &[Transaction] {
        &self.log
    }

    /// Values written to `addr`, in order
    pub fn writes_to(&self, addr: u32) -> Vec<u32> {
        self.log.iter().filter_map(|t| match t {
            Transaction::Write { addr: a, value } if *a == addr => Some(*value),
            _ => None
        }).collect()
    }

    /// Current content of register `addr`
    pub fn value(&self, addr: u32) -> Option<u32> {
        self.registers.get(&addr).copied()
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    fn faulted(&self) -> bool {
        matches!(self.fail_at, Some(n) if self.log.len() >= n)
    }
}

impl RegisterBus for DummyBus {

    fn write_register(&mut self, addr: u32, value: u32) -> Result<(), BusError> {
        if self.faulted() {
            return Err(BusError::Write { addr, value, reason: String::from("injected fault") });
        }

        regdbg!("W", addr, value);
        self.registers.insert(addr, value);
        self.log.push(Transaction::Write { addr, value });
        Ok(())
    }

    fn read_register(&mut self, addr: u32) -> Result<u32, BusError> {
        if self.faulted() {
            return Err(BusError::Read { addr, reason: String::from("injected fault") });
        }

        let value = match self.scripted.get_mut(&addr).and_then(|q| q.pop_front()) {
            Some(v) => v,
            None => self.value(addr).unwrap_or(0)
        };

        regdbg!("R", addr, value);
        self.log.push(Transaction::Read { addr, value });
        Ok(value)
    }
}


#[cfg(test)]
mod tests {

    use super::*;
    use assert_matches::assert_matches;
    use std::thread;

    #[test]
    fn dummy_bus_stores_and_scripts() {
        let mut bus = DummyBus::new();
        bus.write_register(0x3, 0xAB).unwrap();
        assert_eq!(bus.read_register(0x3).unwrap(), 0xAB);

        bus.script_reads(0x8, &[0x00, 0x80]);
        assert_eq!(bus.read_register(0x8).unwrap(), 0x00);
        assert_eq!(bus.read_register(0x8).unwrap(), 0x80);
        assert_eq!(bus.read_register(0x8).unwrap(), 0x00);

        assert_eq!(bus.transactions()[0], Transaction::Write { addr: 0x3, value: 0xAB });
        assert_eq!(bus.transactions().len(), 5);
        assert_eq!(bus.writes_to(0x3), vec![0xAB]);
    }

    #[test]
    fn dummy_bus_fault_injection() {
        let mut bus = DummyBus::new();
        bus.fail_at(1);
        assert!(bus.write_register(0x0, 1).is_ok());
        assert_matches!(bus.write_register(0x0, 2), Err(BusError::Write { addr: 0, value: 2, .. }));
        assert_matches!(bus.read_register(0x0), Err(BusError::Read { addr: 0, .. }));
        assert_eq!(bus.value(0x0), Some(1));
    }

    #[test]
    fn shared_bus_serializes_access() {
        let bus = SharedBus::new(DummyBus::new());

        let handles: Vec<_> = (0..4u32).map(|t| {
            let bus = bus.clone();
            thread::spawn(move || {
                let mut guard = bus.exclusive().unwrap();
                // a whole pass without interleaving
                for i in 0..16 {
                    guard.write_register(t, i).unwrap();
                }
            })
        }).collect();

        for h in handles {
            h.join().unwrap();
        }

        let guard = bus.exclusive().unwrap();
        let log = guard.transactions();
        assert_eq!(log.len(), 64);

        // every run of 16 writes belongs to a single thread
        for pass in log.chunks(16) {
            let first = match pass[0] { Transaction::Write { addr, .. } => addr, _ => unreachable!() };
            assert!(pass.iter().all(|t| matches!(t, Transaction::Write { addr, .. } if *addr == first)));
        }
    }
}
