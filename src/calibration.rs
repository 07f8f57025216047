//! Probe calibration files
//!
//! Every Neuropixels 1.0 probe ships with two calibration files, both
//! plain text and starting with the serial number of the probe they
//! belong to.
//!
//! The ADC calibration file holds one line per ADC
//!
//! ```text
//! <serial number>
//! adc,CompP,CompN,Slope,Coarse,Fine,Cfix,Offset,Threshold
//! ... × 32
//! ```
//!
//! and the gain calibration file holds one line per electrode with the
//! correction factor of every AP gain step followed by every LFP gain step
//!
//! ```text
//! <serial number>
//! electrode,ap0,ap1,...,ap7,lfp0,lfp1,...,lfp7
//! ... × 960
//! ```
//!
//! Parsing is all-or-nothing; a file that does not match the layout exactly
//! is rejected as a whole.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::probe::Gain;
use crate::topology::NP1E_ELECTRODE_COUNT;

/// Number of ADCs on a Neuropixels 1.0 probe
pub const ADC_COUNT: usize = 32;
const ADC_COLUMNS: usize = 9;
const GAIN_COLUMNS: usize = 1 + 2 * Gain::STEPS;


#[derive(Error, Debug)]
pub enum CalibrationError {
    /// Calibration file does not exist
    #[error("Calibration file {0} does not exist")]
    NotFound(PathBuf),
    /// Structural parse failure
    #[error("Malformed calibration data at line {line}: {reason}")]
    Malformed { line: usize, reason: String },
    /// Calibration belongs to another probe
    #[error("Probe serial number ({expected}) does not match calibration serial number ({found})")]
    IdentityMismatch { expected: u64, found: u64 },
    /// Underlying I/O error
    #[error("Calibration I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn malformed<S: Into<String>>(line: usize, reason: S) -> CalibrationError {
    CalibrationError::Malformed { line, reason: reason.into() }
}

// Non-empty lines of a calibration file, trimmed and numbered from 1
struct SplitLines {
    serial_number: u64,
    serial_text: String,
    lines: Vec<(usize, String)>,
}

// Read the serial number line and return the remaining numbered, non-empty
// lines.
fn split_lines<R: BufRead>(reader: R) -> Result<SplitLines, CalibrationError> {
    let mut lines = Vec::new();
    let mut serial: Option<(u64, String)> = None;

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match serial {
            None => {
                let number = trimmed.parse::<u64>()
                    .map_err(|e| malformed(idx+1, format!("invalid serial number: {}", e)))?;
                serial = Some((number, trimmed.to_string()));
            },
            Some(_) => lines.push((idx+1, trimmed.to_string()))
        }
    }

    match serial {
        Some((serial_number, serial_text)) =>
            Ok(SplitLines { serial_number, serial_text, lines }),
        None => Err(malformed(0, "empty calibration data"))
    }
}

fn parse_fields<T: FromStr>(lineno: usize, line: &str, count: usize) -> Result<Vec<T>, CalibrationError>
    where T::Err: std::fmt::Display {

    let fields = line.split(',')
        .map(|f| f.trim().parse::<T>()
            .map_err(|e| malformed(lineno, format!("invalid field '{}': {}", f, e))))
        .collect::<Result<Vec<T>, _>>()?;

    if fields.len() != count {
        return Err(malformed(lineno,
            format!("expected {} fields, found {}", count, fields.len())));
    }

    Ok(fields)
}

fn open_existing(path: &Path) -> Result<BufReader<File>, CalibrationError> {
    if !path.is_file() {
        return Err(CalibrationError::NotFound(path.to_path_buf()));
    }
    Ok(BufReader::new(File::open(path)?))
}

fn check_identity(expected: u64, found: u64) -> Result<(), CalibrationError> {
    if expected != found {
        return Err(CalibrationError::IdentityMismatch { expected, found });
    }
    Ok(())
}


/// Trim parameters of a single ADC. Fields are kept as read; their
/// bit-width ranges are enforced when the base configuration is encoded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Adc {
    pub comp_p: i32,
    pub comp_n: i32,
    pub slope: i32,
    pub coarse: i32,
    pub fine: i32,
    pub cfix: i32,
    pub offset: i32,
    pub threshold: i32,
}


/// Contents of an ADC calibration file
#[derive(Clone, Debug, PartialEq)]
pub struct AdcCalibration {
    pub serial_number: u64,
    pub adcs: Vec<Adc>,
}

impl AdcCalibration {

    /// Parse ADC calibration data without checking its identity.
    pub fn parse<R: BufRead>(reader: R) -> Result<Self, CalibrationError> {
        let SplitLines { serial_number, lines, .. } = split_lines(reader)?;

        if lines.len() != ADC_COUNT {
            return Err(malformed(0,
                format!("expected {} ADC entries, found {}", ADC_COUNT, lines.len())));
        }

        let mut adcs = Vec::with_capacity(ADC_COUNT);

        for (i, (lineno, line)) in lines.iter().enumerate() {
            let f: Vec<i32> = parse_fields(*lineno, line, ADC_COLUMNS)?;

            if f[0] != i as i32 {
                return Err(malformed(*lineno,
                    format!("ADC index {} out of sequence, expected {}", f[0], i)));
            }

            adcs.push(Adc {
                comp_p: f[1],
                comp_n: f[2],
                slope: f[3],
                coarse: f[4],
                fine: f[5],
                cfix: f[6],
                offset: f[7],
                threshold: f[8],
            });
        }

        Ok(AdcCalibration { serial_number, adcs })
    }

    /// Load an ADC calibration file for the probe with the specified serial number
    pub fn load<P: AsRef<Path>>(path: P, serial_number: u64) -> Result<Self, CalibrationError> {
        let cal = Self::parse(open_existing(path.as_ref())?)?;
        check_identity(serial_number, cal.serial_number)?;
        Ok(cal)
    }

    /// Write the calibration back in the file layout
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<(), CalibrationError> {
        writeln!(writer, "{}", self.serial_number)?;
        for (i, a) in self.adcs.iter().enumerate() {
            writeln!(writer, "{},{},{},{},{},{},{},{},{}", i, a.comp_p, a.comp_n,
                a.slope, a.coarse, a.fine, a.cfix, a.offset, a.threshold)?;
        }
        Ok(())
    }
}


/// Correction factors of one electrode, indexed by gain code
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GainRow {
    pub ap: [f64; Gain::STEPS],
    pub lfp: [f64; Gain::STEPS],
}


/// Contents of a gain calibration file. The text of every line is kept
/// alongside the parsed values so the file can be written back unchanged.
#[derive(Clone, Debug, PartialEq)]
pub struct GainCalibration {
    serial_number: u64,
    rows: Vec<GainRow>,
    text: Vec<String>,
}

impl GainCalibration {

    /// Parse gain calibration data without checking its identity.
    pub fn parse<R: BufRead>(reader: R) -> Result<Self, CalibrationError> {
        let SplitLines { serial_number, serial_text, lines } = split_lines(reader)?;

        if lines.len() != NP1E_ELECTRODE_COUNT {
            return Err(malformed(0, format!("expected {} electrode entries, found {}",
                NP1E_ELECTRODE_COUNT, lines.len())));
        }

        let mut rows = Vec::with_capacity(NP1E_ELECTRODE_COUNT);
        let mut text = Vec::with_capacity(NP1E_ELECTRODE_COUNT + 1);
        text.push(serial_text);

        for (i, (lineno, line)) in lines.into_iter().enumerate() {
            let f: Vec<f64> = parse_fields(lineno, &line, GAIN_COLUMNS)?;

            if f[0] != i as f64 {
                return Err(malformed(lineno,
                    format!("electrode index {} out of sequence, expected {}", f[0], i)));
            }

            let mut row = GainRow { ap: [0.0; Gain::STEPS], lfp: [0.0; Gain::STEPS] };
            row.ap.copy_from_slice(&f[1..1+Gain::STEPS]);
            row.lfp.copy_from_slice(&f[1+Gain::STEPS..]);
            rows.push(row);
            text.push(line);
        }

        Ok(GainCalibration { serial_number, rows, text })
    }

    pub fn serial_number(&self) -> u64 {
        self.serial_number
    }

    /// Correction factors of every electrode, in electrode order
    pub fn rows(&self) -> &[GainRow] {
        &self.rows
    }

    /// Load a gain calibration file for the probe with the specified serial number
    pub fn load<P: AsRef<Path>>(path: P, serial_number: u64) -> Result<Self, CalibrationError> {
        let cal = Self::parse(open_existing(path.as_ref())?)?;
        check_identity(serial_number, cal.serial_number)?;
        Ok(cal)
    }

    /// Correction factors for the selected AP and LFP gains. The probe
    /// applies a single factor per signal path so the first electrode's
    /// entry is used.
    pub fn correction(&self, ap: Gain, lfp: Gain) -> GainCorrection {
        // parse guarantees NP1E_ELECTRODE_COUNT rows
        let row = &self.rows[0];
        GainCorrection {
            ap: row.ap[ap as usize],
            lfp: row.lfp[lfp as usize],
        }
    }

    /// Write the calibration back in the file layout, reproducing the
    /// numbers exactly as they were read
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<(), CalibrationError> {
        for line in &self.text {
            writeln!(writer, "{}", line)?;
        }
        Ok(())
    }
}


/// Gain correction scalars, one per signal path
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GainCorrection {
    pub ap: f64,
    pub lfp: f64,
}


/// Validated calibration of one probe, assembled from both calibration
/// files. It is immutable once loaded.
#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationRecord {
    serial_number: u64,
    adcs: Vec<Adc>,
    gain: GainCorrection,
}

impl CalibrationRecord {

    /// Merge independently validated calibrations. Both must belong to
    /// the probe with `serial_number`.
    pub fn new(serial_number: u64, adc: AdcCalibration, gain: GainCorrection, gain_serial: u64)
        -> Result<Self, CalibrationError> {

        check_identity(serial_number, adc.serial_number)?;
        check_identity(serial_number, gain_serial)?;

        Ok(CalibrationRecord { serial_number, adcs: adc.adcs, gain })
    }

    /// Load and validate both calibration files of a probe. The gain
    /// correction is selected for the `ap` and `lfp` gain steps.
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(serial_number: u64, gain_file: P, adc_file: Q,
        ap: Gain, lfp: Gain) -> Result<Self, CalibrationError> {

        let adc = AdcCalibration::load(adc_file, serial_number)?;
        let gain = GainCalibration::load(gain_file, serial_number)?;

        Self::new(serial_number, adc, gain.correction(ap, lfp), gain.serial_number())
    }

    pub fn serial_number(&self) -> u64 {
        self.serial_number
    }

    pub fn adcs(&self) -> &[Adc] {
        &self.adcs
    }

    pub fn gain_correction(&self) -> GainCorrection {
        self.gain
    }

    pub fn adc_offsets(&self) -> Vec<u16> {
        self.adcs.iter().map(|a| a.offset as u16).collect()
    }

    pub fn adc_thresholds(&self) -> Vec<u16> {
        self.adcs.iter().map(|a| a.threshold as u16).collect()
    }
}


#[cfg(test)]
pub(crate) mod tests {

    use super::*;
    use assert_matches::assert_matches;

    pub(crate) fn adc_text(serial: u64) -> String {
        let mut s = format!("{}\n", serial);
        for i in 0..ADC_COUNT {
            s.push_str(&format!("{},{},{},{},{},{},{},{},{}\n",
                i, i % 32, 31 - i % 32, i % 8, i % 4, (i + 1) % 4, i % 16, 10 + i, 20 + i));
        }
        s
    }

    pub(crate) fn gain_text(serial: u64) -> String {
        let mut s = format!("{}\n", serial);
        for i in 0..NP1E_ELECTRODE_COUNT {
            s.push_str(&format!("{}", i));
            for g in 0..Gain::STEPS {
                s.push_str(&format!(",1.0{}", g + 1));
            }
            for g in 0..Gain::STEPS {
                s.push_str(&format!(",0.9{}", g + 1));
            }
            s.push('\n');
        }
        s
    }

    #[test]
    fn parse_adc() {
        let cal = AdcCalibration::parse(adc_text(42).as_bytes()).unwrap();
        assert_eq!(cal.serial_number, 42);
        assert_eq!(cal.adcs.len(), ADC_COUNT);
        assert_eq!(cal.adcs[3], Adc { comp_p: 3, comp_n: 28, slope: 3, coarse: 3,
            fine: 0, cfix: 3, offset: 13, threshold: 23 });
    }

    #[test]
    fn adc_roundtrip_is_exact() {
        let text = adc_text(18005117431);
        let cal = AdcCalibration::parse(text.as_bytes()).unwrap();

        let mut out: Vec<u8> = Vec::new();
        cal.write_to(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), text);
    }

    #[test]
    fn gain_roundtrip_is_exact() {
        let text = gain_text(18005117431);
        let cal = GainCalibration::parse(text.as_bytes()).unwrap();

        let mut out: Vec<u8> = Vec::new();
        cal.write_to(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), text);
    }

    #[test]
    fn gain_roundtrip_keeps_number_formatting() {
        let text = gain_text(18005117431)
            .replacen(",1.01,", ",1.000,", 1)
            .replacen(",0.91,", ",9.1e-1,", 1);
        let cal = GainCalibration::parse(text.as_bytes()).unwrap();
        assert_eq!(cal.rows()[0].ap[0], 1.0);
        assert_eq!(cal.rows()[0].lfp[0], 0.91);

        let mut out: Vec<u8> = Vec::new();
        cal.write_to(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), text);
    }

    #[test]
    fn gain_correction_selection() {
        let cal = GainCalibration::parse(gain_text(1).as_bytes()).unwrap();
        let corr = cal.correction(Gain::Gain1000, Gain::Gain50);
        assert_eq!(corr.ap, 1.05);
        assert_eq!(corr.lfp, 0.91);
    }

    #[test]
    fn adc_wrong_field_count() {
        let text = adc_text(1).replacen("0,0,31,0,0,1,0,10,20", "0,0,31,0,0,1,0,10", 1);
        assert_matches!(AdcCalibration::parse(text.as_bytes()),
            Err(CalibrationError::Malformed { line: 2, .. }));
    }

    #[test]
    fn adc_wrong_field_type() {
        let text = adc_text(1).replacen("0,0,31", "0,x,31", 1);
        assert_matches!(AdcCalibration::parse(text.as_bytes()),
            Err(CalibrationError::Malformed { .. }));
    }

    #[test]
    fn adc_missing_entries() {
        let text: String = adc_text(1).lines().take(20)
            .map(|l| format!("{}\n", l)).collect();
        assert_matches!(AdcCalibration::parse(text.as_bytes()),
            Err(CalibrationError::Malformed { line: 0, .. }));
    }

    #[test]
    fn bad_serial() {
        assert_matches!(AdcCalibration::parse("abc\n".as_bytes()),
            Err(CalibrationError::Malformed { line: 1, .. }));
        assert_matches!(GainCalibration::parse("".as_bytes()),
            Err(CalibrationError::Malformed { .. }));
    }

    #[test]
    fn merged_identity_mismatch() {
        let adc = AdcCalibration::parse(adc_text(5).as_bytes()).unwrap();
        let gain = GainCalibration::parse(gain_text(6).as_bytes()).unwrap();
        let corr = gain.correction(Gain::Gain50, Gain::Gain50);

        assert_matches!(CalibrationRecord::new(5, adc.clone(), corr, gain.serial_number()),
            Err(CalibrationError::IdentityMismatch { expected: 5, found: 6 }));
        assert_matches!(CalibrationRecord::new(6, adc, corr, gain.serial_number()),
            Err(CalibrationError::IdentityMismatch { expected: 6, found: 5 }));
    }
}
