//! Breakout board analog IO
//!
//! Twelve bidirectional analog channels. Each input channel digitizes one
//! of three voltage ranges over a 16-bit code space; the resulting volts per
//! division are fixed once at configuration time and kept in a
//! [`VoltageScale`] so that samples can be converted on demand.

use ndarray::{Array1, ArrayView2, Array2, Axis};
use num_derive::{FromPrimitive, ToPrimitive};
use serde::{Serialize, Deserialize};

use crate::bus::RegisterBus;
use crate::device::DeviceInfo;
use crate::registers::{AnalogIoRegister, RegisterSpace};
use crate::OnixError;

/// Number of analog channels
pub const ANALOG_CHANNEL_COUNT: usize = 12;

/// Size of the ADC code space
pub const DIVISIONS: f32 = (1u32 << 16) as f32;


/// Input voltage range of an analog channel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive,
         Serialize, Deserialize)]
#[repr(u32)]
pub enum VoltageRange {
    /// ±10 V
    TenVolts = 0,
    /// ±2.5 V
    TwoPointFiveVolts = 1,
    /// ±5 V
    FiveVolts = 2,
}

impl Default for VoltageRange {
    fn default() -> Self {
        VoltageRange::TenVolts
    }
}

impl VoltageRange {

    /// Volts represented by one ADC code
    pub fn volts_per_division(self) -> f32 {
        match self {
            VoltageRange::TenVolts => 20.0 / DIVISIONS,
            VoltageRange::TwoPointFiveVolts => 5.0 / DIVISIONS,
            VoltageRange::FiveVolts => 10.0 / DIVISIONS,
        }
    }
}


#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive,
         Serialize, Deserialize)]
#[repr(u32)]
pub enum Direction {
    Input = 0,
    Output = 1,
}

impl Default for Direction {
    fn default() -> Self {
        Direction::Input
    }
}


/// Representation of analog samples handed to consumers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnalogDataType {
    /// Raw signed 16-bit codes
    S16,
    /// Samples scaled to volts
    Volts,
}

impl Default for AnalogDataType {
    fn default() -> Self {
        AnalogDataType::S16
    }
}


/// Volts per division of every analog channel
#[derive(Clone, Debug, PartialEq)]
pub struct VoltageScale {
    scale: Array1<f32>,
}

impl VoltageScale {

    pub fn from_ranges(ranges: &[VoltageRange]) -> Self {
        VoltageScale {
            scale: ranges.iter().map(|r| r.volts_per_division()).collect()
        }
    }

    pub fn len(&self) -> usize {
        self.scale.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scale.is_empty()
    }

    /// Scale factor of `channel`
    pub fn get(&self, channel: usize) -> Option<f32> {
        self.scale.get(channel).copied()
    }

    /// Convert a single sample of `channel` to volts
    pub fn volts(&self, channel: usize, raw: i16) -> Option<f32> {
        self.get(channel).map(|s| raw as f32 * s)
    }

    /// Convert a (frames, channels) sample matrix to volts. Returns `None`
    /// if the number of columns differs from the number of scale factors.
    pub fn apply(&self, raw: ArrayView2<i16>) -> Option<Array2<f32>> {
        if raw.ncols() != self.scale.len() {
            return None;
        }

        let mut out = raw.mapv(f32::from);
        for mut row in out.axis_iter_mut(Axis(0)) {
            row *= &self.scale;
        }
        Some(out)
    }

    pub fn as_slice(&self) -> Option<&[f32]> {
        self.scale.as_slice()
    }
}


/// Analog IO configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalogIoConfiguration {
    pub enable: bool,
    pub input_range: [VoltageRange; ANALOG_CHANNEL_COUNT],
    pub direction: [Direction; ANALOG_CHANNEL_COUNT],
    pub data_type: AnalogDataType,
}

impl Default for AnalogIoConfiguration {
    fn default() -> Self {
        AnalogIoConfiguration {
            enable: true,
            input_range: [VoltageRange::default(); ANALOG_CHANNEL_COUNT],
            direction: [Direction::default(); ANALOG_CHANNEL_COUNT],
            data_type: AnalogDataType::default(),
        }
    }
}

impl AnalogIoConfiguration {

    /// Channel direction bitmask; bit `n` set means channel `n` is an output
    pub fn direction_mask(&self) -> u32 {
        self.direction.iter().enumerate().fold(0u32, |reg, (ch, dir)| {
            (reg & !(1 << ch)) | ((*dir as u32) << ch)
        })
    }

    pub fn voltage_scale(&self) -> VoltageScale {
        VoltageScale::from_ranges(&self.input_range)
    }

    /// Write the configuration to the device. The enable state goes first,
    /// then the input ranges, then the direction mask in a single write.
    pub fn configure<B: RegisterBus>(&self, mut bus: B) -> Result<DeviceInfo, OnixError> {

        bus.write_register(AnalogIoRegister::Enable.addr(), self.enable as u32)?;

        for (ch, range) in self.input_range.iter().enumerate() {
            // input_range covers exactly the channels with a range register
            if let Some(reg) = AnalogIoRegister::input_range(ch) {
                bus.write_register(reg.addr(), *range as u32)?;
            }
        }

        bus.write_register(AnalogIoRegister::ChDir.addr(), self.direction_mask())?;

        log::debug!("Analog IO configured, enable: {}, direction mask: 0x{:03x}",
            self.enable, self.direction_mask());

        Ok(DeviceInfo::AnalogIo {
            enable: self.enable,
            data_type: self.data_type,
            scale: self.voltage_scale(),
        })
    }
}
