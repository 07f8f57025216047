use thiserror::Error;

use crate::calibration::CalibrationError;
use crate::topology::TopologyError;
use crate::bus::BusError;
use crate::context::ContextState;


/// Errors raised while validating and encoding a configuration. These are
/// always raised before any hardware write takes place.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    /// Missing, malformed or mismatched calibration
    #[error("Calibration error: {0}")]
    Calibration(#[from] CalibrationError),
    /// Invalid electrode selection
    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),
    /// Electrode resolved against a topology other than Neuropixels 1.0
    #[error("Electrode {0} does not belong to a Neuropixels 1.0 probe")]
    ForeignElectrode(usize),
    /// Same electrode selected twice
    #[error("Electrode {0} is selected more than once")]
    DuplicateElectrode(usize),
    /// Two electrodes routed to the same channel
    #[error("Electrodes {first} and {second} are both routed to channel {channel}")]
    ChannelConflict { channel: usize, first: usize, second: usize },
    /// Calibration value does not fit in its shift register field
    #[error("ADC {adc} calibration parameter {field} value of {value} is invalid \
             for probe {serial}; must be within [0, {max}]")]
    OutOfRange { field: &'static str, adc: usize, value: i32, max: i32, serial: u64 },
    /// Calibration does not cover every ADC
    #[error("Calibration holds {found} ADC entries, expected {expected}")]
    AdcCount { expected: usize, found: usize },
}


/// Top level error type
#[derive(Error, Debug)]
pub enum OnixError {
    /// Configuration rejected before touching the hardware
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    /// Shift register status check failed
    #[error("Shift register {register} (image {image}) status check failed: 0x{status:02x}")]
    HardwareFault { register: &'static str, image: usize, status: u32 },
    /// The register bus reported a communication fault
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),
    /// Operation not permitted in the current state
    #[error("Invalid operation in state {found:?}; expected {expected}")]
    InvalidState { expected: &'static str, found: ContextState },
    /// A thread panicked while holding the bus
    #[error("Register bus lock is poisoned")]
    BusPoisoned,
}

impl std::convert::From<CalibrationError> for OnixError {
    fn from(error: CalibrationError) -> Self {
        OnixError::Configuration(ConfigurationError::Calibration(error))
    }
}
