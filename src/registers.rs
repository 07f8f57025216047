//! Register address spaces of the supported devices
//!
//! Every device family exposes a fixed set of named registers. Each set is
//! modelled as an enum whose discriminant is the register address, so the
//! whole space is known at compile time and cannot be altered once defined.
//! Symbolic names can be resolved at runtime through [`RegisterSpace::from_name`]
//! which is backed by a lookup table built once per family.

use std::collections::HashMap;
use std::fmt;
use bitflags::bitflags;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;


/// Common behaviour of a device register address space.
pub trait RegisterSpace: Copy + fmt::Debug + Sized + 'static {

    /// Numeric address of this register
    fn addr(self) -> u32;

    /// Symbolic name of this register
    fn name(self) -> &'static str;

    /// All registers of this space in ascending address order
    fn all() -> &'static [Self];

    /// Resolve a register from its address.
    fn from_addr(addr: u32) -> Option<Self>;

    /// Resolve a register from its symbolic name.
    fn from_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|r| r.name() == name)
    }
}


/// Neuropixels 1.0e probe registers, accessed through the headstage
/// serializer passthrough.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u32)]
pub enum Np1eRegister {
    OpMode = 0x00,
    RecMod = 0x01,
    CalMod = 0x02,
    TestConfig1 = 0x03,
    TestConfig2 = 0x04,
    TestConfig3 = 0x05,
    TestConfig4 = 0x06,
    TestConfig5 = 0x07,
    Status = 0x08,
    Sync = 0x09,
    /// Base configuration, odd channels
    SrChain3 = 0x0C,
    /// Base configuration, even channels
    SrChain2 = 0x0D,
    /// Shank configuration
    SrChain1 = 0x0E,
    SrLength2 = 0x0F,
    SrLength1 = 0x10,
    SoftReset = 0x11,
}

const NP1E_REGISTERS: [Np1eRegister; 16] = [
    Np1eRegister::OpMode, Np1eRegister::RecMod, Np1eRegister::CalMod,
    Np1eRegister::TestConfig1, Np1eRegister::TestConfig2,
    Np1eRegister::TestConfig3, Np1eRegister::TestConfig4,
    Np1eRegister::TestConfig5, Np1eRegister::Status, Np1eRegister::Sync,
    Np1eRegister::SrChain3, Np1eRegister::SrChain2, Np1eRegister::SrChain1,
    Np1eRegister::SrLength2, Np1eRegister::SrLength1, Np1eRegister::SoftReset,
];

impl RegisterSpace for Np1eRegister {

    fn addr(self) -> u32 {
        self as u32
    }

    fn name(self) -> &'static str {
        match self {
            Np1eRegister::OpMode => "OP_MODE",
            Np1eRegister::RecMod => "REC_MOD",
            Np1eRegister::CalMod => "CAL_MOD",
            Np1eRegister::TestConfig1 => "TEST_CONFIG1",
            Np1eRegister::TestConfig2 => "TEST_CONFIG2",
            Np1eRegister::TestConfig3 => "TEST_CONFIG3",
            Np1eRegister::TestConfig4 => "TEST_CONFIG4",
            Np1eRegister::TestConfig5 => "TEST_CONFIG5",
            Np1eRegister::Status => "STATUS",
            Np1eRegister::Sync => "SYNC",
            Np1eRegister::SrChain3 => "SR_CHAIN3",
            Np1eRegister::SrChain2 => "SR_CHAIN2",
            Np1eRegister::SrChain1 => "SR_CHAIN1",
            Np1eRegister::SrLength2 => "SR_LENGTH2",
            Np1eRegister::SrLength1 => "SR_LENGTH1",
            Np1eRegister::SoftReset => "SOFT_RESET",
        }
    }

    fn all() -> &'static [Self] {
        &NP1E_REGISTERS
    }

    fn from_addr(addr: u32) -> Option<Self> {
        Np1eRegister::from_u32(addr)
    }

    fn from_name(name: &str) -> Option<Self> {
        NP1E_NAMES.get(name).copied()
    }
}


/// ONIX breakout board analog IO registers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u32)]
pub enum AnalogIoRegister {
    Enable = 0,
    ChDir = 1,
    Ch00InRange = 2,
    Ch01InRange = 3,
    Ch02InRange = 4,
    Ch03InRange = 5,
    Ch04InRange = 6,
    Ch05InRange = 7,
    Ch06InRange = 8,
    Ch07InRange = 9,
    Ch08InRange = 10,
    Ch09InRange = 11,
    Ch10InRange = 12,
    Ch11InRange = 13,
}

const ANALOG_IO_REGISTERS: [AnalogIoRegister; 14] = [
    AnalogIoRegister::Enable, AnalogIoRegister::ChDir,
    AnalogIoRegister::Ch00InRange, AnalogIoRegister::Ch01InRange,
    AnalogIoRegister::Ch02InRange, AnalogIoRegister::Ch03InRange,
    AnalogIoRegister::Ch04InRange, AnalogIoRegister::Ch05InRange,
    AnalogIoRegister::Ch06InRange, AnalogIoRegister::Ch07InRange,
    AnalogIoRegister::Ch08InRange, AnalogIoRegister::Ch09InRange,
    AnalogIoRegister::Ch10InRange, AnalogIoRegister::Ch11InRange,
];

impl AnalogIoRegister {

    /// Input range register of the specified analog channel. Returns
    /// `None` if `channel` exceeds the available channels.
    pub fn input_range(channel: usize) -> Option<Self> {
        if channel >= ANALOG_IO_REGISTERS.len() - 2 {
            return None;
        }
        AnalogIoRegister::from_u32(AnalogIoRegister::Ch00InRange as u32 + channel as u32)
    }
}

impl RegisterSpace for AnalogIoRegister {

    fn addr(self) -> u32 {
        self as u32
    }

    fn name(self) -> &'static str {
        match self {
            AnalogIoRegister::Enable => "ENABLE",
            AnalogIoRegister::ChDir => "CHDIR",
            AnalogIoRegister::Ch00InRange => "CH00INRANGE",
            AnalogIoRegister::Ch01InRange => "CH01INRANGE",
            AnalogIoRegister::Ch02InRange => "CH02INRANGE",
            AnalogIoRegister::Ch03InRange => "CH03INRANGE",
            AnalogIoRegister::Ch04InRange => "CH04INRANGE",
            AnalogIoRegister::Ch05InRange => "CH05INRANGE",
            AnalogIoRegister::Ch06InRange => "CH06INRANGE",
            AnalogIoRegister::Ch07InRange => "CH07INRANGE",
            AnalogIoRegister::Ch08InRange => "CH08INRANGE",
            AnalogIoRegister::Ch09InRange => "CH09INRANGE",
            AnalogIoRegister::Ch10InRange => "CH10INRANGE",
            AnalogIoRegister::Ch11InRange => "CH11INRANGE",
        }
    }

    fn all() -> &'static [Self] {
        &ANALOG_IO_REGISTERS
    }

    fn from_addr(addr: u32) -> Option<Self> {
        AnalogIoRegister::from_u32(addr)
    }

    fn from_name(name: &str) -> Option<Self> {
        ANALOG_IO_NAMES.get(name).copied()
    }
}

lazy_static! {
    static ref NP1E_NAMES: HashMap<&'static str, Np1eRegister> = {
        NP1E_REGISTERS.iter().map(|r| (r.name(), *r)).collect()
    };

    static ref ANALOG_IO_NAMES: HashMap<&'static str, AnalogIoRegister> = {
        ANALOG_IO_REGISTERS.iter().map(|r| (r.name(), *r)).collect()
    };
}


bitflags! {
    /// Values of the `OP_MODE` register
    pub struct OpMode: u32 {
        const TEST = 1 << 3;
        const DIG_TEST = 1 << 4;
        const CALIBRATE = 1 << 5;
        const RECORD = 1 << 6;
        const POWER_DOWN = 1 << 7;
    }
}

bitflags! {
    /// Values of the `REC_MOD` register. An empty value holds both
    /// the digital and channel circuitry in reset.
    pub struct RecMod: u32 {
        const RESET_ALL = 1 << 5;
        const DIG_NRESET = 1 << 6;
        const CH_NRESET = 1 << 7;
        const ACTIVE = Self::DIG_NRESET.bits | Self::CH_NRESET.bits;
    }
}

bitflags! {
    /// Values of the `CAL_MOD` register. An empty value disables
    /// every calibration mode.
    pub struct CalMod: u32 {
        const OSC_ACTIVE = 1 << 4;
        const ADC_CAL = 1 << 5;
        const CH_CAL = 1 << 6;
        const PIX_CAL = 1 << 7;
    }
}

bitflags! {
    /// Values of the `STATUS` register
    pub struct Status: u32 {
        /// Last shift register transfer completed
        const SR_OK = 1 << 7;
    }
}
