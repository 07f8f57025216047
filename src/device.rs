//! Device descriptors produced once a device has been configured

use crate::analogio::{AnalogDataType, VoltageScale};
use crate::calibration::GainCorrection;


/// Device families with a known register space or wire layout
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeviceFamily {
    AnalogIo,
    NeuropixelsV1e,
    Rhd2164,
    Bno055,
    Heartbeat,
}


/// Descriptor of a configured device. Each variant carries only what the
/// consumers of that family need: the frame decoder and whatever stores or
/// displays the data downstream.
#[derive(Clone, Debug, PartialEq)]
pub enum DeviceInfo {
    AnalogIo {
        enable: bool,
        data_type: AnalogDataType,
        scale: VoltageScale,
    },
    NeuropixelsV1e {
        serial_number: u64,
        gain_correction: GainCorrection,
        adc_offsets: Vec<u16>,
        adc_thresholds: Vec<u16>,
    },
    Rhd2164,
    Bno055,
    Heartbeat,
}

impl DeviceInfo {

    pub fn family(&self) -> DeviceFamily {
        match self {
            DeviceInfo::AnalogIo { .. } => DeviceFamily::AnalogIo,
            DeviceInfo::NeuropixelsV1e { .. } => DeviceFamily::NeuropixelsV1e,
            DeviceInfo::Rhd2164 => DeviceFamily::Rhd2164,
            DeviceInfo::Bno055 => DeviceFamily::Bno055,
            DeviceInfo::Heartbeat => DeviceFamily::Heartbeat,
        }
    }

    /// Per channel voltage scale, if the family has one
    pub fn voltage_scale(&self) -> Option<&VoltageScale> {
        match self {
            DeviceInfo::AnalogIo { scale, .. } => Some(scale),
            _ => None
        }
    }
}
