//! Probe configuration
//!
//! A [`ProbeConfiguration`] is handed to the core by the application layer.
//! It is validated once, before anything is encoded or written to the
//! hardware, see [`ProbeConfiguration::validate`].

use std::collections::HashSet;
use num_derive::{FromPrimitive, ToPrimitive};
use serde::{Serialize, Deserialize};

use crate::topology::{Topology, ElectrodeSite, TopologyError, CHANNEL_COUNT};
use crate::ConfigurationError;


/// Reference selection of a probe. The discriminant is the 3-bit code
/// shifted into the base configuration of every channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive,
         Serialize, Deserialize)]
#[repr(u8)]
pub enum ReferenceSource {
    /// No reference connected
    None = 0b000,
    /// External reference pad
    External = 0b001,
    /// Shank tip electrode
    Tip = 0b010,
}

impl Default for ReferenceSource {
    fn default() -> Self {
        ReferenceSource::External
    }
}


/// Amplifier gain steps. The discriminant is the 3-bit gain code and the
/// column of the matching correction factor in the gain calibration file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive,
         Serialize, Deserialize)]
#[repr(u8)]
pub enum Gain {
    Gain50 = 0,
    Gain125 = 1,
    Gain250 = 2,
    Gain500 = 3,
    Gain1000 = 4,
    Gain1500 = 5,
    Gain2000 = 6,
    Gain3000 = 7,
}

impl Gain {
    /// Number of supported gain steps
    pub const STEPS: usize = 8;

    /// Nominal amplification of this step
    pub fn multiplier(self) -> f64 {
        match self {
            Gain::Gain50 => 50.0,
            Gain::Gain125 => 125.0,
            Gain::Gain250 => 250.0,
            Gain::Gain500 => 500.0,
            Gain::Gain1000 => 1000.0,
            Gain::Gain1500 => 1500.0,
            Gain::Gain2000 => 2000.0,
            Gain::Gain3000 => 3000.0,
        }
    }
}


/// An electrode selected for recording.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct Electrode {
    site: ElectrodeSite,
}

impl Electrode {

    /// Select a Neuropixels 1.0 electrode
    pub fn new(index: usize) -> Result<Self, TopologyError> {
        Self::with_topology(Topology::NeuropixelsV1e, index)
    }

    /// Select an electrode of an arbitrary topology
    pub fn with_topology(topology: Topology, index: usize) -> Result<Self, TopologyError> {
        Ok(Electrode { site: topology.locate(index)? })
    }

    pub fn index(&self) -> usize {
        self.site.index
    }

    pub fn channel(&self) -> usize {
        self.site.channel
    }

    pub fn site(&self) -> &ElectrodeSite {
        &self.site
    }
}

impl std::convert::TryFrom<usize> for Electrode {
    type Error = TopologyError;

    fn try_from(index: usize) -> Result<Self, Self::Error> {
        Electrode::new(index)
    }
}

impl From<Electrode> for usize {
    fn from(e: Electrode) -> usize {
        e.index()
    }
}


/// Neuropixels 1.0e probe configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProbeConfiguration {
    pub reference: ReferenceSource,
    pub spike_amplifier_gain: Gain,
    pub lfp_amplifier_gain: Gain,
    pub spike_filter: bool,
    pub channel_map: Vec<Electrode>,
}

impl Default for ProbeConfiguration {
    /// Bank A, external reference, AP gain 1000, LFP gain 50, spike
    /// filter on.
    fn default() -> Self {
        let channel_map = (0..CHANNEL_COUNT)
            .filter_map(|i| Electrode::new(i).ok())
            .collect();

        ProbeConfiguration {
            reference: ReferenceSource::External,
            spike_amplifier_gain: Gain::Gain1000,
            lfp_amplifier_gain: Gain::Gain50,
            spike_filter: true,
            channel_map,
        }
    }
}

impl ProbeConfiguration {

    /// Create a configuration from a list of electrode indices
    pub fn with_electrodes(indices: &[usize]) -> Result<Self, ConfigurationError> {
        let channel_map = indices.iter()
            .map(|i| Electrode::new(*i))
            .collect::<Result<Vec<_>, _>>()?;

        let conf = ProbeConfiguration { channel_map, ..Default::default() };
        conf.validate()?;

        Ok(conf)
    }

    /// Make sure every electrode is a Neuropixels 1.0 electrode, that
    /// electrode indices are unique and that no two electrodes are routed
    /// to the same channel.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let mut indices: HashSet<usize> = HashSet::with_capacity(self.channel_map.len());
        let mut channels: Vec<Option<usize>> = vec![None; CHANNEL_COUNT];

        for e in &self.channel_map {
            // electrodes built with another topology must resolve to the
            // same site on this probe
            if Topology::NeuropixelsV1e.locate(e.index())? != *e.site() {
                return Err(ConfigurationError::ForeignElectrode(e.index()));
            }

            if !indices.insert(e.index()) {
                return Err(ConfigurationError::DuplicateElectrode(e.index()));
            }

            match channels[e.channel()] {
                Some(other) => {
                    return Err(ConfigurationError::ChannelConflict {
                        channel: e.channel(),
                        first: other,
                        second: e.index()
                    });
                },
                None => channels[e.channel()] = Some(e.index())
            }
        }

        Ok(())
    }
}
