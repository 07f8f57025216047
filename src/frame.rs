//! Frame decoding
//!
//! Every device streams fixed layout payloads. A payload starts with the
//! 64-bit hub clock, which is transmitted in network (big-endian) order,
//! followed by per channel samples in little-endian order. The local
//! acquisition clock is not part of the payload; it is carried by the
//! frame header and handed over in [`RawFrame`].
//!
//! ```text
//!  byte 0        8                                         8 + 2*N
//!  +-------------+------+------+------+- ... -+------------+
//!  | hub clock   | s[0] | s[1] | s[2] |       | s[N-1]     |
//!  | (BE u64)    | (LE) | (LE) | (LE) |       | (LE)       |
//!  +-------------+------+------+------+- ... -+------------+
//! ```
//!
//! Decoding is a pure function of the payload. A short payload fails
//! that frame alone; the buffered decoders drop it and keep going.

use ndarray::{Array2, ShapeBuilder};
use thiserror::Error;

use crate::analogio::{VoltageScale, ANALOG_CHANNEL_COUNT};
use crate::device::DeviceFamily;

/// Size of the hub clock field
pub const HUB_CLOCK_SIZE: usize = 8;

pub const RHD2164_AMPLIFIER_CHANNEL_COUNT: usize = 64;
pub const RHD2164_AUX_CHANNEL_COUNT: usize = 3;

pub const ANALOG_PAYLOAD_SIZE: usize = HUB_CLOCK_SIZE + 2 * ANALOG_CHANNEL_COUNT;
pub const RHD2164_PAYLOAD_SIZE: usize = HUB_CLOCK_SIZE
    + 2 * (RHD2164_AMPLIFIER_CHANNEL_COUNT + RHD2164_AUX_CHANNEL_COUNT);
pub const BNO055_PAYLOAD_SIZE: usize = 28;
pub const HEARTBEAT_PAYLOAD_SIZE: usize = HUB_CLOCK_SIZE;


#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameDecodeError {
    #[error("Truncated payload: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("Device family {0:?} does not stream frames")]
    Unsupported(DeviceFamily),
}


/// A frame as received from the acquisition hardware
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawFrame {
    /// Acquisition side clock
    pub clock: u64,
    pub device_address: u32,
    pub data: Vec<u8>,
}

impl RawFrame {
    pub fn new(clock: u64, device_address: u32, data: Vec<u8>) -> Self {
        RawFrame { clock, device_address, data }
    }
}


/// Hub clock as transmitted, in network order
pub fn hub_clock_from_wire(bytes: [u8; HUB_CLOCK_SIZE]) -> u64 {
    u64::from_be_bytes(bytes)
}

/// Polled devices report their clock as two 32-bit halves
pub fn clock_from_halves(low: u32, high: u32) -> u64 {
    (low as u64) | (high as u64) << 32
}


/// Sequential reader over a payload whose length has been checked
struct Payload<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Payload<'a> {

    fn new(data: &'a [u8], expected: usize) -> Result<Self, FrameDecodeError> {
        if data.len() < expected {
            return Err(FrameDecodeError::Truncated { expected, actual: data.len() });
        }
        Ok(Payload { data, pos: 0 })
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn hub_clock(&mut self) -> u64 {
        hub_clock_from_wire(self.take())
    }

    fn i16(&mut self) -> i16 {
        i16::from_le_bytes(self.take())
    }

    fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.take())
    }

    fn i8(&mut self) -> i8 {
        i8::from_le_bytes(self.take())
    }

    fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    fn i16_array<const N: usize>(&mut self) -> [i16; N] {
        let mut out = [0i16; N];
        for v in out.iter_mut() {
            *v = self.i16();
        }
        out
    }

    fn u16_array<const N: usize>(&mut self) -> [u16; N] {
        let mut out = [0u16; N];
        for v in out.iter_mut() {
            *v = self.u16();
        }
        out
    }
}


/// One analog input sample of all channels
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnalogInputFrame {
    pub clock: u64,
    pub hub_clock: u64,
    pub data: [i16; ANALOG_CHANNEL_COUNT],
}

impl AnalogInputFrame {
    pub fn decode(clock: u64, payload: &[u8]) -> Result<Self, FrameDecodeError> {
        let mut p = Payload::new(payload, ANALOG_PAYLOAD_SIZE)?;
        let hub_clock = p.hub_clock();
        Ok(AnalogInputFrame { clock, hub_clock, data: p.i16_array() })
    }
}


/// One sample of an RHD2164 amplifier chip
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rhd2164Frame {
    pub clock: u64,
    pub hub_clock: u64,
    pub amplifier: [u16; RHD2164_AMPLIFIER_CHANNEL_COUNT],
    pub aux: [u16; RHD2164_AUX_CHANNEL_COUNT],
}

impl Rhd2164Frame {
    pub fn decode(clock: u64, payload: &[u8]) -> Result<Self, FrameDecodeError> {
        let mut p = Payload::new(payload, RHD2164_PAYLOAD_SIZE)?;
        let hub_clock = p.hub_clock();
        let amplifier = p.u16_array();
        let aux = p.u16_array();
        Ok(Rhd2164Frame { clock, hub_clock, amplifier, aux })
    }
}


/// BNO055 fused orientation sample
///
/// ```text
///  0      6           14         20       26    27
///  +------+-----------+----------+--------+-----+-----+
///  | eul  | quat      | lin acc  | grav   | T   | cal |
///  | 3xi16| 4xi16     | 3xi16    | 3xi16  | i8  | u8  |
///  +------+-----------+----------+--------+-----+-----+
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bno055Frame {
    pub clock: u64,
    /// Yaw, roll, pitch in degrees
    pub euler: [f32; 3],
    /// Unit quaternion, w x y z
    pub quaternion: [f32; 4],
    /// Linear acceleration in m/s²
    pub acceleration: [f32; 3],
    /// Gravity vector in m/s²
    pub gravity: [f32; 3],
    /// Degrees Celsius
    pub temperature: i8,
    pub calibration: u8,
}

impl Bno055Frame {

    const EULER_DIVISOR: f32 = 16.0;
    const QUATERNION_DIVISOR: f32 = (1 << 14) as f32;
    const ACCELERATION_DIVISOR: f32 = 100.0;

    pub fn decode(clock: u64, payload: &[u8]) -> Result<Self, FrameDecodeError> {
        let mut p = Payload::new(payload, BNO055_PAYLOAD_SIZE)?;

        let euler = p.i16_array::<3>().map(|v| v as f32 / Self::EULER_DIVISOR);
        let quaternion = p.i16_array::<4>().map(|v| v as f32 / Self::QUATERNION_DIVISOR);
        let acceleration = p.i16_array::<3>().map(|v| v as f32 / Self::ACCELERATION_DIVISOR);
        let gravity = p.i16_array::<3>().map(|v| v as f32 / Self::ACCELERATION_DIVISOR);

        Ok(Bno055Frame {
            clock,
            euler,
            quaternion,
            acceleration,
            gravity,
            temperature: p.i8(),
            calibration: p.u8(),
        })
    }
}


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeartbeatFrame {
    pub clock: u64,
    pub hub_clock: u64,
}

impl HeartbeatFrame {
    pub fn decode(clock: u64, payload: &[u8]) -> Result<Self, FrameDecodeError> {
        let mut p = Payload::new(payload, HEARTBEAT_PAYLOAD_SIZE)?;
        Ok(HeartbeatFrame { clock, hub_clock: p.hub_clock() })
    }
}


/// A decoded frame, tagged by the device family that produced it
#[derive(Clone, Debug, PartialEq)]
pub enum DataFrame {
    AnalogInput(AnalogInputFrame),
    Rhd2164(Rhd2164Frame),
    Bno055(Bno055Frame),
    Heartbeat(HeartbeatFrame),
}

impl DataFrame {
    pub fn clock(&self) -> u64 {
        match self {
            DataFrame::AnalogInput(f) => f.clock,
            DataFrame::Rhd2164(f) => f.clock,
            DataFrame::Bno055(f) => f.clock,
            DataFrame::Heartbeat(f) => f.clock,
        }
    }
}

/// Decode a raw frame of a device of `family`
pub fn decode(family: DeviceFamily, raw: &RawFrame) -> Result<DataFrame, FrameDecodeError> {
    match family {
        DeviceFamily::AnalogIo => AnalogInputFrame::decode(raw.clock, &raw.data).map(DataFrame::AnalogInput),
        DeviceFamily::Rhd2164 => Rhd2164Frame::decode(raw.clock, &raw.data).map(DataFrame::Rhd2164),
        DeviceFamily::Bno055 => Bno055Frame::decode(raw.clock, &raw.data).map(DataFrame::Bno055),
        DeviceFamily::Heartbeat => HeartbeatFrame::decode(raw.clock, &raw.data).map(DataFrame::Heartbeat),
        DeviceFamily::NeuropixelsV1e => Err(FrameDecodeError::Unsupported(family)),
    }
}


/// Stack per-frame sample arrays into a column-major (frames, channels)
/// matrix
fn column_major<T: Copy + Default, const C: usize>(rows: &[[T; C]]) -> Array2<T> {
    let mut out = Array2::<T>::default((rows.len(), C).f());
    for (mut dst, src) in out.rows_mut().into_iter().zip(rows) {
        for (d, s) in dst.iter_mut().zip(src.iter()) {
            *d = *s;
        }
    }
    out
}

/// Decode each raw frame, drop the malformed ones and keep the order of
/// the rest
fn decode_all<T, F>(frames: &[RawFrame], decoder: F) -> Vec<T>
    where F: Fn(u64, &[u8]) -> Result<T, FrameDecodeError> {

    frames.iter().filter_map(|raw| {
        match decoder(raw.clock, &raw.data) {
            Ok(f) => Some(f),
            Err(err) => {
                log::warn!("Dropping frame from device {} at clock {}: {}",
                    raw.device_address, raw.clock, err);
                None
            }
        }
    }).collect()
}


/// A batch of analog input frames
#[derive(Clone, Debug, PartialEq)]
pub struct BufferedAnalogFrame {
    pub clock: Vec<u64>,
    pub hub_clock: Vec<u64>,
    /// Raw samples, one row per frame
    pub data: Array2<i16>,
}

impl BufferedAnalogFrame {

    pub fn from_frames(frames: &[AnalogInputFrame]) -> Self {
        let rows: Vec<[i16; ANALOG_CHANNEL_COUNT]> = frames.iter().map(|f| f.data).collect();

        BufferedAnalogFrame {
            clock: frames.iter().map(|f| f.clock).collect(),
            hub_clock: frames.iter().map(|f| f.hub_clock).collect(),
            data: column_major(&rows),
        }
    }

    /// Decode a batch of raw frames. Malformed frames are dropped.
    pub fn decode(frames: &[RawFrame]) -> Self {
        Self::from_frames(&decode_all(frames, AnalogInputFrame::decode))
    }

    pub fn len(&self) -> usize {
        self.clock.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clock.is_empty()
    }

    /// Samples converted to volts, `None` if `scale` does not cover every
    /// channel
    pub fn volts(&self, scale: &VoltageScale) -> Option<Array2<f32>> {
        scale.apply(self.data.view())
    }
}


/// A batch of RHD2164 frames
#[derive(Clone, Debug, PartialEq)]
pub struct BufferedRhd2164Frame {
    pub clock: Vec<u64>,
    pub hub_clock: Vec<u64>,
    pub amplifier: Array2<u16>,
    pub aux: Array2<u16>,
}

impl BufferedRhd2164Frame {

    pub fn from_frames(frames: &[Rhd2164Frame]) -> Self {
        let amplifier: Vec<_> = frames.iter().map(|f| f.amplifier).collect();
        let aux: Vec<_> = frames.iter().map(|f| f.aux).collect();

        BufferedRhd2164Frame {
            clock: frames.iter().map(|f| f.clock).collect(),
            hub_clock: frames.iter().map(|f| f.hub_clock).collect(),
            amplifier: column_major(&amplifier),
            aux: column_major(&aux),
        }
    }

    pub fn decode(frames: &[RawFrame]) -> Self {
        Self::from_frames(&decode_all(frames, Rhd2164Frame::decode))
    }

    pub fn len(&self) -> usize {
        self.clock.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clock.is_empty()
    }
}
