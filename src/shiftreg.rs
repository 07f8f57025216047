//! Shift register bit images
//!
//! A Neuropixels 1.0 probe is configured by shifting three fixed-length bit
//! images into the ASIC: one shank image selecting the active electrodes and
//! two base images, one for the even and one for the odd channels, holding
//! the per-channel options and the ADC trim values. The images are built as
//! [`BitImage`]s, whose bits are addressed by closed-form offsets and never
//! resized, and are transformed by [`BitImage::to_wire_bytes`] before being
//! written to the probe.
//!
//! ## Base image layout
//!
//! ```text
//!  0                     576                              2112          2448
//!  +---------------------+--------------------------------+-------------+
//!  | reference (3 bits   | channel options (8 bits per    | ADC trim    |
//!  | per channel, desc.) | channel pair, ascending)       | (42 / pair) |
//!  +---------------------+--------------------------------+-------------+
//! ```
//!
//! Channel options are `[APGain(3) LFPGain(3) Standby(1) Filter(1)]`, LSB
//! first. Each pair of ADCs sharing an image uses 42 bits:
//! `CompP(5) CompN(5)` for both ADCs followed by
//! `Slope(3) Fine(2) Coarse(2) Cfix(4)` for both ADCs.

use bitvec::prelude::{BitVec, Lsb0};

use crate::calibration::{Adc, CalibrationRecord, ADC_COUNT};
use crate::probe::{ProbeConfiguration, ReferenceSource};
use crate::topology::{CHANNEL_COUNT, NP1E_INTERNAL_REFERENCE};
use crate::ConfigurationError;

/// Length of the shank image in bits
pub const SHANK_BIT_COUNT: usize = 968;
/// Length of each base image in bits
pub const BASE_BIT_COUNT: usize = 2448;
/// First channel option bit in the base images
pub const BASE_CONFIG_OFFSET: usize = 576;

pub const SHANK_BIT_EXT1: usize = 965;
pub const SHANK_BIT_EXT2: usize = 2;
pub const SHANK_BIT_TIP1: usize = 484;
pub const SHANK_BIT_TIP2: usize = 483;

const SHANK_EVEN_BASE: usize = 485;
const SHANK_ODD_BASE: usize = 482;
const ADC_COMP_BASE: usize = 2406;
const ADC_PAIR_STRIDE: usize = 42;
const ADC_COMP_WIDTH: usize = 10;
const ADC_SLOPE_SHIFT: usize = 20;
const CHANNEL_OPTION_STRIDE: usize = 4;


/// Reverse the bit order of a byte.
pub fn reverse_bits(byte: u8) -> u8 {
    byte.reverse_bits()
}


/// A fixed-length shift register payload
#[derive(Clone, PartialEq, Eq)]
pub struct BitImage {
    bits: BitVec<u8, Lsb0>,
}

impl std::fmt::Debug for BitImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitImage")
         .field("len", &self.bits.len())
         .field("ones", &self.bits.count_ones())
         .finish()
    }
}

impl BitImage {

    /// Create a new image of `len` bits, all cleared
    pub fn new(len: usize) -> Self {
        BitImage { bits: BitVec::repeat(false, len) }
    }

    /// Length of the image in bits
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// State of bit `idx`. Panics if `idx` is out of bounds.
    pub fn get(&self, idx: usize) -> bool {
        self.bits[idx]
    }

    fn set(&mut self, idx: usize, val: bool) {
        self.bits.set(idx, val);
    }

    /// Number of set bits
    pub fn count_ones(&self) -> usize {
        self.bits.count_ones()
    }

    /// Indices of all set bits in ascending order
    pub fn ones(&self) -> Vec<usize> {
        self.bits.iter_ones().collect()
    }

    // Store the `width` low bits of `value` LSB first starting at `offset`
    fn put_field(&mut self, offset: usize, width: usize, value: u32) {
        for i in 0..width {
            self.set(offset + i, ((value >> i) & 0x1) == 1);
        }
    }

    /// Read back a `width` bit field stored LSB first at `offset`
    pub fn field(&self, offset: usize, width: usize) -> u32 {
        (0..width).fold(0u32, |acc, i| acc | ((self.get(offset + i) as u32) << i))
    }

    /// The bytes of the image with bit `i` stored in byte `i / 8`, bit
    /// `i % 8`.
    pub fn as_raw_bytes(&self) -> &[u8] {
        self.bits.as_raw_slice()
    }

    /// Wire representation of the image; every byte is bit-reversed.
    pub fn to_wire_bytes(&self) -> Vec<u8> {
        self.as_raw_bytes().iter().map(|b| reverse_bits(*b)).collect()
    }
}


/// Build the shank image of a configuration. Every selected electrode
/// except the internal reference sets one bit; external and tip references
/// set two more.
pub fn shank_image(conf: &ProbeConfiguration) -> BitImage {
    let mut image = BitImage::new(SHANK_BIT_COUNT);

    for e in &conf.channel_map {
        let idx = e.index();
        if idx == NP1E_INTERNAL_REFERENCE {
            continue;
        }

        let bit = if idx % 2 == 0 {
            SHANK_EVEN_BASE + idx / 2
        } else {
            SHANK_ODD_BASE - idx / 2
        };

        image.set(bit, true);
    }

    match conf.reference {
        ReferenceSource::External => {
            image.set(SHANK_BIT_EXT1, true);
            image.set(SHANK_BIT_EXT2, true);
        },
        ReferenceSource::Tip => {
            image.set(SHANK_BIT_TIP1, true);
            image.set(SHANK_BIT_TIP2, true);
        },
        ReferenceSource::None => {}
    }

    image
}


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Anchor {
    Comp,
    Slope,
}

/// An ADC trim field of the base images
#[derive(Clone, Copy)]
pub struct AdcField {
    pub name: &'static str,
    anchor: Anchor,
    shift: usize,
    pub width: usize,
    get: fn(&Adc) -> i32,
}

impl AdcField {

    /// Largest value that fits in the field
    pub fn max(&self) -> i32 {
        (1 << self.width) - 1
    }

    pub fn value(&self, adc: &Adc) -> i32 {
        (self.get)(adc)
    }

    /// Absolute bit offset of this field for ADC `adc`
    pub fn offset(&self, adc: usize) -> usize {
        self.shift + match self.anchor {
            Anchor::Comp => BaseLayout::comp_offset(adc),
            Anchor::Slope => BaseLayout::slope_offset(adc),
        }
    }
}

fn comp_p(a: &Adc) -> i32 { a.comp_p }
fn comp_n(a: &Adc) -> i32 { a.comp_n }
fn slope(a: &Adc) -> i32 { a.slope }
fn fine(a: &Adc) -> i32 { a.fine }
fn coarse(a: &Adc) -> i32 { a.coarse }
fn cfix(a: &Adc) -> i32 { a.cfix }

/// ADC trim fields in shift register order
pub const ADC_FIELDS: [AdcField; 6] = [
    AdcField { name: "CompP",  anchor: Anchor::Comp,  shift: 0, width: 5, get: comp_p },
    AdcField { name: "CompN",  anchor: Anchor::Comp,  shift: 5, width: 5, get: comp_n },
    AdcField { name: "Slope",  anchor: Anchor::Slope, shift: 0, width: 3, get: slope },
    AdcField { name: "Fine",   anchor: Anchor::Slope, shift: 3, width: 2, get: fine },
    AdcField { name: "Coarse", anchor: Anchor::Slope, shift: 5, width: 2, get: coarse },
    AdcField { name: "Cfix",   anchor: Anchor::Slope, shift: 7, width: 4, get: cfix },
];


/// Bit offsets shared by both base images
pub struct BaseLayout;

impl BaseLayout {

    /// Base image holding `channel`; even channels go to image 0
    pub fn channel_image(channel: usize) -> usize {
        channel % 2
    }

    /// First of the three reference bits of `channel`
    pub fn reference_offset(channel: usize) -> usize {
        let parity = channel % 2;
        (CHANNEL_COUNT - 2 + parity - channel) / 2 * 3
    }

    /// First option bit of `channel`
    pub fn options_offset(channel: usize) -> usize {
        BASE_CONFIG_OFFSET + (channel - channel % 2) * CHANNEL_OPTION_STRIDE
    }

    /// Base image holding the trim values of `adc`
    pub fn adc_image(adc: usize) -> usize {
        adc % 2
    }

    /// Comparator field anchor of `adc`
    pub fn comp_offset(adc: usize) -> usize {
        let d = adc / 2;
        ADC_COMP_BASE - ADC_PAIR_STRIDE * (d / 2) + (d % 2) * ADC_COMP_WIDTH
    }

    /// Slope field anchor of `adc`
    pub fn slope_offset(adc: usize) -> usize {
        let d = adc / 2;
        Self::comp_offset(adc) + ADC_SLOPE_SHIFT + d % 2
    }
}


/// Check every ADC trim value against the width of its field
pub fn check_adc_ranges(cal: &CalibrationRecord) -> Result<(), ConfigurationError> {
    let adcs = cal.adcs();

    if adcs.len() != ADC_COUNT {
        return Err(ConfigurationError::AdcCount { expected: ADC_COUNT, found: adcs.len() });
    }

    for (idx, adc) in adcs.iter().enumerate() {
        for field in ADC_FIELDS.iter() {
            let value = field.value(adc);
            if value < 0 || value > field.max() {
                return Err(ConfigurationError::OutOfRange {
                    field: field.name,
                    adc: idx,
                    value,
                    max: field.max(),
                    serial: cal.serial_number(),
                });
            }
        }
    }

    Ok(())
}


/// Build the two parity-interleaved base images. ADC trim values are
/// range checked before any bit is set.
pub fn base_images(conf: &ProbeConfiguration, cal: &CalibrationRecord)
    -> Result<[BitImage; 2], ConfigurationError> {

    check_adc_ranges(cal)?;

    let mut images = [BitImage::new(BASE_BIT_COUNT), BitImage::new(BASE_BIT_COUNT)];

    let reference = conf.reference as u32;
    let options = (conf.spike_amplifier_gain as u32)
        | (conf.lfp_amplifier_gain as u32) << 3
        | (conf.spike_filter as u32) << 7;

    for channel in 0..CHANNEL_COUNT {
        let image = &mut images[BaseLayout::channel_image(channel)];
        image.put_field(BaseLayout::reference_offset(channel), 3, reference);
        image.put_field(BaseLayout::options_offset(channel), 8, options);
    }

    for (idx, adc) in cal.adcs().iter().enumerate() {
        let image = &mut images[BaseLayout::adc_image(idx)];
        for field in ADC_FIELDS.iter() {
            image.put_field(field.offset(idx), field.width, field.value(adc) as u32);
        }
    }

    Ok(images)
}


/// Complete set of shift register images for a probe
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShiftRegisterImages {
    pub shank: BitImage,
    pub base: [BitImage; 2],
}

impl ShiftRegisterImages {

    /// Validate the configuration and encode all images
    pub fn encode(conf: &ProbeConfiguration, cal: &CalibrationRecord)
        -> Result<Self, ConfigurationError> {

        conf.validate()?;
        let base = base_images(conf, cal)?;

        Ok(ShiftRegisterImages { shank: shank_image(conf), base })
    }
}
