//! Electrode to channel topologies
//!
//! A probe carries many more electrodes than it has recording channels. The
//! electrodes are grouped into banks of [`CHANNEL_COUNT`] electrodes and each
//! bank is split into blocks of [`ELECTRODES_PER_BLOCK`]. Within a shank, a
//! block is wired to a physical channel block according to a fixed
//! permutation; the channel of an electrode is then
//!
//! ```text
//! channel = block_index + ELECTRODES_PER_BLOCK × block_map[shank][block]
//! ```
//!
//! The permutations are wiring facts of the silicon and are kept as data in
//! [`NP1E_BLOCK_MAP`] and [`QUAD_SHANK_BLOCK_MAP`].

use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Recording channels of every supported probe
pub const CHANNEL_COUNT: usize = 384;
/// Electrodes that share a physical channel block
pub const ELECTRODES_PER_BLOCK: usize = 48;
/// Blocks per bank
pub const BLOCKS_PER_BANK: usize = CHANNEL_COUNT / ELECTRODES_PER_BLOCK;

/// Electrodes on a Neuropixels 1.0 shank
pub const NP1E_ELECTRODE_COUNT: usize = 960;
/// Fixed internal reference tap of Neuropixels 1.0; never gets a shank bit
pub const NP1E_INTERNAL_REFERENCE: usize = 191;

/// Shanks on a Neuropixels 2.0 quad-shank probe
pub const QUAD_SHANK_COUNT: usize = 4;
/// Electrodes on each Neuropixels 2.0 shank
pub const QUAD_SHANK_ELECTRODES_PER_SHANK: usize = 1280;
/// Total electrodes on a Neuropixels 2.0 quad-shank probe
pub const QUAD_SHANK_ELECTRODE_COUNT: usize = QUAD_SHANK_COUNT * QUAD_SHANK_ELECTRODES_PER_SHANK;

/// Single-shank Neuropixels 1.0 wiring; blocks map onto themselves
pub const NP1E_BLOCK_MAP: [[usize; BLOCKS_PER_BANK]; 1] = [
    [0, 1, 2, 3, 4, 5, 6, 7],
];

/// Neuropixels 2.0 quad-shank (shank, block) → physical block wiring
pub const QUAD_SHANK_BLOCK_MAP: [[usize; BLOCKS_PER_BANK]; QUAD_SHANK_COUNT] = [
    [0, 2, 4, 6, 5, 7, 1, 3],
    [1, 3, 5, 7, 4, 6, 0, 2],
    [4, 6, 0, 2, 1, 3, 5, 7],
    [5, 7, 1, 3, 0, 2, 4, 6],
];


#[derive(Error, Debug, PartialEq, Eq)]
pub enum TopologyError {
    /// Electrode index outside the probe
    #[error("Electrode {index} is out of range; probe has {count} electrodes")]
    ElectrodeOutOfRange { index: usize, count: usize },
    /// Shank or block outside the wiring table
    #[error("Invalid shank and/or block: ({shank}, {block})")]
    InvalidBlock { shank: usize, block: usize },
    /// Position within a block past the block size
    #[error("Block index {0} is out of range; blocks hold {} electrodes", ELECTRODES_PER_BLOCK)]
    InvalidBlockIndex(usize),
}


/// Logical bank of electrodes. Each bank holds up to one electrode per
/// channel on every shank.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bank {
    A,
    B,
    C,
    D,
}

impl Bank {
    fn from_index(idx: usize) -> Bank {
        match idx {
            0 => Bank::A,
            1 => Bank::B,
            2 => Bank::C,
            _ => Bank::D,
        }
    }
}


/// Resolved position of an electrode
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ElectrodeSite {
    pub index: usize,
    pub shank: usize,
    pub bank: Bank,
    pub block: usize,
    pub block_index: usize,
    pub channel: usize,
}


/// Supported probe topologies
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topology {
    /// Neuropixels 1.0, single shank
    NeuropixelsV1e,
    /// Neuropixels 2.0, four shanks
    NeuropixelsV2QuadShank,
}

impl Topology {

    /// Total number of electrodes
    pub fn electrode_count(self) -> usize {
        match self {
            Topology::NeuropixelsV1e => NP1E_ELECTRODE_COUNT,
            Topology::NeuropixelsV2QuadShank => QUAD_SHANK_ELECTRODE_COUNT,
        }
    }

    /// Number of recording channels
    pub fn channel_count(self) -> usize {
        CHANNEL_COUNT
    }

    pub fn shank_count(self) -> usize {
        self.block_map().len()
    }

    pub fn electrodes_per_shank(self) -> usize {
        self.electrode_count() / self.shank_count()
    }

    /// The internal reference tap, if the probe has one
    pub fn reference_electrode(self) -> Option<usize> {
        match self {
            Topology::NeuropixelsV1e => Some(NP1E_INTERNAL_REFERENCE),
            Topology::NeuropixelsV2QuadShank => None,
        }
    }

    /// The (shank, block) wiring table of this topology
    pub fn block_map(self) -> &'static [[usize; BLOCKS_PER_BANK]] {
        match self {
            Topology::NeuropixelsV1e => &NP1E_BLOCK_MAP,
            Topology::NeuropixelsV2QuadShank => &QUAD_SHANK_BLOCK_MAP,
        }
    }

    /// Channel wired to `block_index` of `block` on `shank`
    pub fn channel(self, shank: usize, block: usize, block_index: usize) -> Result<usize, TopologyError> {
        let physical = self.block_map()
            .get(shank)
            .and_then(|row| row.get(block))
            .ok_or(TopologyError::InvalidBlock { shank, block })?;

        if block_index >= ELECTRODES_PER_BLOCK {
            return Err(TopologyError::InvalidBlockIndex(block_index));
        }

        Ok(block_index + ELECTRODES_PER_BLOCK * physical)
    }

    /// Resolve the shank, bank, block and channel of an electrode
    pub fn locate(self, index: usize) -> Result<ElectrodeSite, TopologyError> {
        let count = self.electrode_count();
        if index >= count {
            return Err(TopologyError::ElectrodeOutOfRange { index, count });
        }

        let per_shank = self.electrodes_per_shank();
        let shank = index / per_shank;
        let shank_index = index % per_shank;
        let block = shank_index % CHANNEL_COUNT / ELECTRODES_PER_BLOCK;
        let block_index = shank_index % ELECTRODES_PER_BLOCK;

        Ok(ElectrodeSite {
            index,
            shank,
            bank: Bank::from_index(shank_index / CHANNEL_COUNT),
            block,
            block_index,
            channel: self.channel(shank, block, block_index)?,
        })
    }

    /// Channel of an electrode
    pub fn channel_of(self, index: usize) -> Result<usize, TopologyError> {
        Ok(self.locate(index)?.channel)
    }
}


#[cfg(test)]
mod tests {

    use super::*;
    use assert_matches::assert_matches;

    fn assert_bijective(topology: Topology) {
        let per_shank = topology.electrodes_per_shank();

        for shank in 0..topology.shank_count() {
            let base = shank * per_shank;
            let full_banks = per_shank / CHANNEL_COUNT;

            // each full bank covers every channel exactly once
            for bank in 0..full_banks {
                let mut hits = vec![0usize; CHANNEL_COUNT];
                for i in 0..CHANNEL_COUNT {
                    let site = topology.locate(base + bank*CHANNEL_COUNT + i).unwrap();
                    assert_eq!(site.shank, shank);
                    hits[site.channel] += 1;
                }
                assert!(hits.iter().all(|&h| h == 1),
                    "{:?} shank {} bank {} is not a bijection", topology, shank, bank);
            }

            // every channel is reachable on this shank
            let mut reachable = vec![false; CHANNEL_COUNT];
            for i in 0..per_shank {
                reachable[topology.channel_of(base + i).unwrap()] = true;
            }
            assert!(reachable.iter().all(|r| *r));
        }
    }

    #[test]
    fn np1e_is_bijective() {
        assert_bijective(Topology::NeuropixelsV1e);
    }

    #[test]
    fn quad_shank_is_bijective() {
        assert_bijective(Topology::NeuropixelsV2QuadShank);
    }

    #[test]
    fn quad_shank_block_map_rows_are_permutations() {
        for row in QUAD_SHANK_BLOCK_MAP.iter() {
            let mut sorted = *row;
            sorted.sort_unstable();
            assert_eq!(sorted, [0, 1, 2, 3, 4, 5, 6, 7]);
        }
    }

    #[test]
    fn quad_shank_known_channels() {
        let t = Topology::NeuropixelsV2QuadShank;

        // shank 0, block 1 goes to physical block 2
        assert_eq!(t.channel_of(48).unwrap(), 96);
        // shank 1, block 0 goes to physical block 1
        assert_eq!(t.channel_of(1280).unwrap(), 48);
        // shank 3, block 7, index 47 goes to physical block 6
        assert_eq!(t.channel_of(3*1280 + 383).unwrap(), 6*48 + 47);

        let site = t.locate(2*1280 + 384 + 100).unwrap();
        assert_eq!(site.shank, 2);
        assert_eq!(site.bank, Bank::B);
        assert_eq!(site.block, 2);
        assert_eq!(site.block_index, 4);
        assert_eq!(site.channel, 4);

        // last bank on a shank is partial
        assert_eq!(t.locate(1279).unwrap().bank, Bank::D);
    }

    #[test]
    fn np1e_channels() {
        let t = Topology::NeuropixelsV1e;
        assert_eq!(t.channel_of(0).unwrap(), 0);
        assert_eq!(t.channel_of(383).unwrap(), 383);
        assert_eq!(t.channel_of(384).unwrap(), 0);
        assert_eq!(t.locate(959).unwrap().bank, Bank::C);
        assert_eq!(t.reference_electrode(), Some(191));
    }

    #[test]
    fn out_of_range() {
        assert_matches!(Topology::NeuropixelsV1e.locate(960),
            Err(TopologyError::ElectrodeOutOfRange { index: 960, count: 960 }));
        assert_matches!(Topology::NeuropixelsV2QuadShank.channel(4, 0, 0),
            Err(TopologyError::InvalidBlock { shank: 4, block: 0 }));
        assert_matches!(Topology::NeuropixelsV2QuadShank.channel(0, 8, 0),
            Err(TopologyError::InvalidBlock { .. }));
    }

    #[test]
    fn block_index_past_block() {
        let t = Topology::NeuropixelsV1e;
        assert_eq!(t.channel(0, 0, 47).unwrap(), 47);
        assert_eq!(t.channel(0, 0, 50), Err(TopologyError::InvalidBlockIndex(50)));
        assert_eq!(Topology::NeuropixelsV2QuadShank.channel(1, 2, ELECTRODES_PER_BLOCK),
            Err(TopologyError::InvalidBlockIndex(ELECTRODES_PER_BLOCK)));
    }
}
