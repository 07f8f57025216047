//! Neuropixels 1.0e register protocol
//!
//! A [`NeuropixelsV1eContext`] owns the calibration of one probe and the
//! shift register images encoded from its configuration. Encoding happens
//! when the context is created, so every configuration or calibration
//! problem is reported before the first register write. Programming then
//! walks through the following states:
//!
//! ```text
//! Idle -> Initializing -> ProgrammingShank
//!      -> ProgrammingBase(0) -> Verifying(0)
//!      -> ProgrammingBase(1) -> Verifying(1) -> Ready -> Acquiring
//! ```
//!
//! Any bus fault or failed status check moves the context to `Failed`.
//! Verification is never retried; the caller has to start a new
//! [`program`][`NeuropixelsV1eContext::program`] pass.

use std::fmt;
use std::path::Path;

use crate::bus::{RegisterBus, SharedBus};
use crate::calibration::CalibrationRecord;
use crate::device::DeviceInfo;
use crate::probe::ProbeConfiguration;
use crate::registers::{Np1eRegister, RegisterSpace, OpMode, RecMod, CalMod, Status};
use crate::shiftreg::{ShiftRegisterImages, BitImage};
use crate::{ConfigurationError, OnixError};

/// Soft reset pulse values
const SOFT_RESET_ON: u32 = 0xFF;
const SOFT_RESET_OFF: u32 = 0x00;

/// Base configuration chains, indexed by image
const BASE_CHAINS: [Np1eRegister; 2] = [Np1eRegister::SrChain2, Np1eRegister::SrChain3];


/// Protocol state of a probe
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextState {
    Idle,
    Initializing,
    ProgrammingShank,
    ProgrammingBase(usize),
    Verifying(usize),
    Ready,
    Acquiring,
    Failed,
}

impl fmt::Display for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextState::ProgrammingBase(i) => write!(f, "ProgrammingBase[{}]", i),
            ContextState::Verifying(i) => write!(f, "Verifying[{}]", i),
            other => write!(f, "{:?}", other)
        }
    }
}


/// Register context of a single Neuropixels 1.0e probe
#[derive(Debug)]
pub struct NeuropixelsV1eContext {
    calibration: CalibrationRecord,
    images: ShiftRegisterImages,
    state: ContextState,
}

impl NeuropixelsV1eContext {

    /// Load both calibration files of probe `serial_number` and encode
    /// `conf`. Nothing is written to the hardware.
    ///
    /// ```no_run
    /// use libonix::context::NeuropixelsV1eContext;
    /// use libonix::probe::ProbeConfiguration;
    ///
    /// let conf = ProbeConfiguration::default();
    /// let ctx = NeuropixelsV1eContext::new(18005117431, &conf,
    ///     "18005117431_gainCalValues.csv", "18005117431_ADCCalibration.csv").unwrap();
    /// ```
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(serial_number: u64, conf: &ProbeConfiguration,
        gain_file: P, adc_file: Q) -> Result<Self, ConfigurationError> {

        let calibration = CalibrationRecord::load(serial_number, gain_file, adc_file,
            conf.spike_amplifier_gain, conf.lfp_amplifier_gain)?;

        Self::from_calibration(conf, calibration)
    }

    /// Encode `conf` with an already loaded calibration
    pub fn from_calibration(conf: &ProbeConfiguration, calibration: CalibrationRecord)
        -> Result<Self, ConfigurationError> {

        let images = ShiftRegisterImages::encode(conf, &calibration)?;

        log::debug!("Encoded configuration of probe {}: {} shank bits, {}+{} base bits set",
            calibration.serial_number(), images.shank.count_ones(),
            images.base[0].count_ones(), images.base[1].count_ones());

        Ok(NeuropixelsV1eContext { calibration, images, state: ContextState::Idle })
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn calibration(&self) -> &CalibrationRecord {
        &self.calibration
    }

    pub fn images(&self) -> &ShiftRegisterImages {
        &self.images
    }

    /// Descriptor of this probe for downstream consumers
    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo::NeuropixelsV1e {
            serial_number: self.calibration.serial_number(),
            gain_correction: self.calibration.gain_correction(),
            adc_offsets: self.calibration.adc_offsets(),
            adc_thresholds: self.calibration.adc_thresholds(),
        }
    }

    fn transition(&mut self, next: ContextState) {
        log::debug!("Probe {}: {} -> {}", self.calibration.serial_number(), self.state, next);
        self.state = next;
    }

    fn guard<T>(&mut self, result: Result<T, OnixError>) -> Result<T, OnixError> {
        if let Err(err) = &result {
            log::error!("Probe {} programming failed in state {}: {}",
                self.calibration.serial_number(), self.state, err);
            self.transition(ContextState::Failed);
        }
        result
    }

    /// Run a complete programming pass: initialize the probe and write
    /// every shift register. The bus must not carry any other traffic
    /// until this returns. A pass may be started again after a failure.
    pub fn program<B: RegisterBus>(&mut self, mut bus: B) -> Result<DeviceInfo, OnixError> {
        self.initialize(&mut bus)?;
        self.write_configuration(&mut bus)?;

        log::info!("Probe {} programmed", self.calibration.serial_number());
        Ok(self.device_info())
    }

    /// Same as [`program`][`Self::program`] on a shared bus. The bus is
    /// held for the whole pass and released when it ends, successfully or
    /// not.
    pub fn program_shared<B: RegisterBus>(&mut self, bus: &SharedBus<B>) -> Result<DeviceInfo, OnixError> {
        let mut guard = bus.exclusive()?;
        self.program(&mut *guard)
    }

    /// Disable calibration and test modes and select recording mode
    pub fn initialize<B: RegisterBus>(&mut self, mut bus: B) -> Result<&mut Self, OnixError> {
        match self.state {
            ContextState::Idle | ContextState::Ready |
            ContextState::Acquiring | ContextState::Failed => {},
            found => return Err(OnixError::InvalidState { expected: "Idle", found })
        }

        self.transition(ContextState::Initializing);
        let res = Self::write_init(&mut bus);
        self.guard(res)?;

        Ok(self)
    }

    fn write_init<B: RegisterBus>(bus: &mut B) -> Result<(), OnixError> {
        // order matters
        write(bus, Np1eRegister::CalMod, CalMod::empty().bits())?;
        write(bus, Np1eRegister::TestConfig1, 0)?;
        write(bus, Np1eRegister::TestConfig2, 0)?;
        write(bus, Np1eRegister::TestConfig3, 0)?;
        write(bus, Np1eRegister::TestConfig4, 0)?;
        write(bus, Np1eRegister::TestConfig5, 0)?;
        write(bus, Np1eRegister::Sync, 0)?;
        write(bus, Np1eRegister::RecMod, RecMod::ACTIVE.bits())?;
        write(bus, Np1eRegister::OpMode, OpMode::RECORD.bits())?;
        Ok(())
    }

    /// Write the shank image followed by both base images. Each base image
    /// is written twice and checked through the status register.
    pub fn write_configuration<B: RegisterBus>(&mut self, mut bus: B) -> Result<&mut Self, OnixError> {
        if self.state != ContextState::Initializing {
            return Err(OnixError::InvalidState { expected: "Initializing", found: self.state });
        }

        self.transition(ContextState::ProgrammingShank);
        // The status register does not report success reliably after a
        // shank write so it is not checked here.
        let shank = self.images.shank.to_wire_bytes();
        let res = write_image(&mut bus, Np1eRegister::SrChain1, &shank);
        self.guard(res)?;

        for i in 0..self.images.base.len() {
            self.transition(ContextState::ProgrammingBase(i));
            let res = Self::write_base(&mut bus, i, &self.images.base[i]);
            self.guard(res)?;

            self.transition(ContextState::Verifying(i));
            let res = Self::verify(&mut bus, i);
            self.guard(res)?;
        }

        self.transition(ContextState::Ready);
        Ok(self)
    }

    fn write_base<B: RegisterBus>(bus: &mut B, image: usize, bits: &BitImage) -> Result<(), OnixError> {
        let bytes = bits.to_wire_bytes();

        for _ in 0..2 {
            // Without this pulse the following status check fails
            write(bus, Np1eRegister::SoftReset, SOFT_RESET_ON)?;
            write(bus, Np1eRegister::SoftReset, SOFT_RESET_OFF)?;
            write_image(bus, BASE_CHAINS[image], &bytes)?;
        }

        Ok(())
    }

    fn verify<B: RegisterBus>(bus: &mut B, image: usize) -> Result<(), OnixError> {
        let status = bus.read_register(Np1eRegister::Status.addr())?;

        if status != Status::SR_OK.bits() {
            return Err(OnixError::HardwareFault {
                register: BASE_CHAINS[image].name(),
                image,
                status
            });
        }

        Ok(())
    }

    /// Clear the reset state left by programming and start sampling
    pub fn start_acquisition<B: RegisterBus>(&mut self, mut bus: B) -> Result<&mut Self, OnixError> {
        if self.state != ContextState::Ready {
            return Err(OnixError::InvalidState { expected: "Ready", found: self.state });
        }

        let res = write(&mut bus, Np1eRegister::OpMode, OpMode::RECORD.bits())
            .and_then(|_| write(&mut bus, Np1eRegister::RecMod, RecMod::ACTIVE.bits()));
        self.guard(res)?;

        self.transition(ContextState::Acquiring);
        log::info!("Probe {} acquiring", self.calibration.serial_number());

        Ok(self)
    }
}


fn write<B: RegisterBus>(bus: &mut B, reg: Np1eRegister, value: u32) -> Result<(), OnixError> {
    bus.write_register(reg.addr(), value)?;
    Ok(())
}

/// Stream `bytes` into shift register `chain`, length first, low byte first
fn write_image<B: RegisterBus>(bus: &mut B, chain: Np1eRegister, bytes: &[u8]) -> Result<(), OnixError> {
    write(bus, Np1eRegister::SrLength1, (bytes.len() % 0x100) as u32)?;
    write(bus, Np1eRegister::SrLength2, (bytes.len() / 0x100) as u32)?;

    for b in bytes {
        write(bus, chain, *b as u32)?;
    }

    Ok(())
}


#[cfg(test)]
mod tests {

    use super::*;
    use crate::bus::{DummyBus, Transaction};
    use crate::calibration::{AdcCalibration, GainCorrection};
    use crate::calibration::tests::adc_text;
    use assert_matches::assert_matches;

    const SERIAL: u64 = 18005117431;

    fn context() -> NeuropixelsV1eContext {
        let adc = AdcCalibration::parse(adc_text(SERIAL).as_bytes()).unwrap();
        let cal = CalibrationRecord::new(SERIAL, adc, GainCorrection { ap: 1.0, lfp: 1.0 }, SERIAL).unwrap();
        NeuropixelsV1eContext::from_calibration(&ProbeConfiguration::default(), cal).unwrap()
    }

    fn status_ok() -> u32 {
        Status::SR_OK.bits()
    }

    #[test]
    fn initialize_sequence() {
        let mut ctx = context();
        let mut bus = DummyBus::new();
        ctx.initialize(&mut bus).unwrap();

        let expected: Vec<Transaction> = [(2, 0), (3, 0), (4, 0), (5, 0), (6, 0), (7, 0),
            (9, 0), (1, 0xC0), (0, 0x40)].iter()
            .map(|(addr, value)| Transaction::Write { addr: *addr, value: *value })
            .collect();

        assert_eq!(bus.transactions(), &expected[..]);
        assert_eq!(ctx.state(), ContextState::Initializing);
    }

    #[test]
    fn full_pass() {
        let mut ctx = context();
        let mut bus = DummyBus::new();
        bus.script_reads(Np1eRegister::Status.addr(), &[status_ok(), status_ok()]);

        let info = ctx.program(&mut bus).unwrap();
        assert_eq!(ctx.state(), ContextState::Ready);
        assert_matches!(info, DeviceInfo::NeuropixelsV1e { serial_number: SERIAL, .. });

        // 121 shank bytes, two base images written twice with 306 bytes each
        assert_eq!(bus.writes_to(Np1eRegister::SrChain1.addr()).len(), 121);
        assert_eq!(bus.writes_to(Np1eRegister::SrChain2.addr()).len(), 612);
        assert_eq!(bus.writes_to(Np1eRegister::SrChain3.addr()).len(), 612);
        assert_eq!(bus.writes_to(Np1eRegister::SoftReset.addr()), vec![0xFF, 0, 0xFF, 0, 0xFF, 0, 0xFF, 0]);
        assert_eq!(bus.writes_to(Np1eRegister::SrLength1.addr()), vec![121, 50, 50, 50, 50]);
        assert_eq!(bus.writes_to(Np1eRegister::SrLength2.addr()), vec![0, 1, 1, 1, 1]);

        let reads = bus.transactions().iter()
            .filter(|t| matches!(t, Transaction::Read { .. }))
            .count();
        assert_eq!(reads, 2);
    }

    #[test]
    fn status_mismatch_on_first_image() {
        let mut ctx = context();
        let mut bus = DummyBus::new();
        // extra bits are not accepted
        bus.script_reads(Np1eRegister::Status.addr(), &[status_ok() | 0x01]);

        assert_matches!(ctx.program(&mut bus),
            Err(OnixError::HardwareFault { register: "SR_CHAIN2", image: 0, status: 0x81 }));
        assert_eq!(ctx.state(), ContextState::Failed);
        assert!(bus.writes_to(Np1eRegister::SrChain3.addr()).is_empty());
        assert_matches!(bus.transactions().last(), Some(Transaction::Read { addr: 0x08, .. }));
    }

    #[test]
    fn bus_fault_fails_context() {
        let mut ctx = context();
        let mut bus = DummyBus::new();
        bus.fail_at(20);

        assert_matches!(ctx.program(&mut bus), Err(OnixError::Bus(_)));
        assert_eq!(ctx.state(), ContextState::Failed);
        assert_eq!(bus.transactions().len(), 20);
    }

    #[test]
    fn restart_after_failure() {
        let mut ctx = context();
        let mut bus = DummyBus::new();
        bus.script_reads(Np1eRegister::Status.addr(), &[0, status_ok(), status_ok()]);

        assert!(ctx.program(&mut bus).is_err());
        assert_eq!(ctx.state(), ContextState::Failed);

        assert!(ctx.program(&mut bus).is_ok());
        assert_eq!(ctx.state(), ContextState::Ready);
    }

    #[test]
    fn acquisition_requires_ready() {
        let mut ctx = context();
        let mut bus = DummyBus::new();

        assert_matches!(ctx.start_acquisition(&mut bus),
            Err(OnixError::InvalidState { expected: "Ready", found: ContextState::Idle }));
        assert!(bus.transactions().is_empty());

        assert_matches!(ctx.write_configuration(&mut bus),
            Err(OnixError::InvalidState { expected: "Initializing", .. }));

        bus.script_reads(Np1eRegister::Status.addr(), &[status_ok(), status_ok()]);
        ctx.program(&mut bus).unwrap();
        bus.clear_log();

        ctx.start_acquisition(&mut bus).unwrap();
        assert_eq!(ctx.state(), ContextState::Acquiring);
        assert_eq!(bus.transactions(), &[
            Transaction::Write { addr: 0x00, value: 0x40 },
            Transaction::Write { addr: 0x01, value: 0xC0 },
        ]);
    }

    #[test]
    fn shared_bus_pass() {
        let mut ctx = context();
        let mut dummy = DummyBus::new();
        dummy.script_reads(Np1eRegister::Status.addr(), &[status_ok(), status_ok()]);
        let bus = SharedBus::new(dummy);

        ctx.program_shared(&bus).unwrap();
        assert_eq!(ctx.state(), ContextState::Ready);

        // released after the pass
        assert!(bus.exclusive().is_ok());
    }
}
