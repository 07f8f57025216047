//! Configuration and frame decoding core for ONIX neural recording hardware
//!
//! This library turns validated probe configurations and vendor calibration
//! files into the shift register bitstreams of Neuropixels-class recording
//! ASICs, pushes them to the hardware over a caller supplied register bus
//! and decodes the sample frames the devices stream back once acquisition
//! has started.
//!
//! A typical session looks like this
//!
//! ```no_run
//! use libonix::bus::DummyBus;
//! use libonix::context::NeuropixelsV1eContext;
//! use libonix::probe::{ProbeConfiguration, ReferenceSource};
//!
//! let mut conf = ProbeConfiguration::default();
//! conf.reference = ReferenceSource::Tip;
//!
//! // Calibration problems are reported here, before touching the hardware
//! let mut probe = NeuropixelsV1eContext::new(18005117431, &conf,
//!     "18005117431_gainCalValues.csv", "18005117431_ADCCalibration.csv").unwrap();
//!
//! // Any type implementing `RegisterBus` will do
//! let mut bus = DummyBus::new();
//! let info = probe.program(&mut bus).unwrap();
//! probe.start_acquisition(&mut bus).unwrap();
//! ```
//!
//! Incoming frames are decoded with the functions of the [`frame`] module,
//! using the [`device::DeviceInfo`] produced during configuration for
//! voltage scaling.

#[macro_use] extern crate lazy_static;

#[macro_use] mod macros;

mod error;
pub mod calibration;
pub mod topology;
pub mod probe;
pub mod registers;
pub mod shiftreg;
pub mod bus;
pub mod context;
pub mod analogio;
pub mod frame;
pub mod device;

pub use error::{ConfigurationError, OnixError};
pub use bus::{RegisterBus, SharedBus, BusError};
pub use context::{NeuropixelsV1eContext, ContextState};
pub use device::{DeviceInfo, DeviceFamily};
