#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

use libonix::calibration::{AdcCalibration, CalibrationRecord, GainCorrection, ADC_COUNT};

pub const SERIAL: u64 = 18005117431;

/// ADC calibration text with every trim value inside its field range
pub fn adc_text(serial: u64) -> String {
    let mut s = format!("{}\n", serial);
    for i in 0..ADC_COUNT {
        s.push_str(&format!("{},{},{},{},{},{},{},{},{}\n",
            i, (i * 3) % 32, 31 - i % 32, i % 8, i % 4, (i + 2) % 4, i % 16, 40 + i, 60 + i));
    }
    s
}

pub fn gain_text(serial: u64) -> String {
    let mut s = format!("{}\n", serial);
    for i in 0..960 {
        s.push_str(&format!("{}", i));
        for g in 0..8 {
            s.push_str(&format!(",1.0{}", g));
        }
        for g in 0..8 {
            s.push_str(&format!(",0.9{}", g));
        }
        s.push('\n');
    }
    s
}

/// Calibration files of one probe, removed when dropped
pub struct CalibrationFiles {
    _dir: TempDir,
    pub gain: PathBuf,
    pub adc: PathBuf,
}

pub fn write_calibration(adc_serial: u64, gain_serial: u64) -> CalibrationFiles {
    let dir = tempfile::tempdir().unwrap();
    let gain = dir.path().join(format!("{}_gainCalValues.csv", gain_serial));
    let adc = dir.path().join(format!("{}_ADCCalibration.csv", adc_serial));

    fs::write(&gain, gain_text(gain_serial)).unwrap();
    fs::write(&adc, adc_text(adc_serial)).unwrap();

    CalibrationFiles { _dir: dir, gain, adc }
}

pub fn record() -> CalibrationRecord {
    let adc = AdcCalibration::parse(adc_text(SERIAL).as_bytes()).unwrap();
    CalibrationRecord::new(SERIAL, adc, GainCorrection { ap: 1.0, lfp: 1.0 }, SERIAL).unwrap()
}
