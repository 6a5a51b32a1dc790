use embassy_time::{Duration, Ticker};

use crate::adc::{AdcHardware, Sampler};
use crate::measurements::{snapshot, Measurements, SharedMeasurements};
use crate::mppt;
use crate::pwm::{Adjustment, DutyCycle, PwmHardware};

/// Battery voltage below which a new charge cycle starts.
pub const VBAT_LOW_MV: i32 = 3_900;
/// Charge-complete voltage held during constant-voltage charging.
pub const VCHARGE_MV: i32 = 4_200;
/// Battery current at which constant-voltage charging terminates.
pub const IBAT_THRESHOLD_MA: i32 = 50;

pub const CONTROL_LOOP_PERIOD: Duration = Duration::from_millis(200);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChargeMode {
    Idle,
    ConstantCurrent,
    ConstantVoltage,
}

/// Controller selected for the current tick.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Step {
    TrackMpp,
    HoldChargeVoltage,
}

/// Charge-mode transitions, evaluated once per tick on fresh measurements.
pub struct ChargeState {
    mode: ChargeMode,
}

impl ChargeState {
    pub const fn new() -> Self {
        Self { mode: ChargeMode::Idle }
    }

    pub fn mode(&self) -> ChargeMode {
        self.mode
    }

    pub fn advance(&mut self, m: &Measurements) -> Step {
        match self.mode {
            ChargeMode::Idle => {
                if m.output_voltage_mv < VBAT_LOW_MV {
                    #[cfg(feature = "defmt")]
                    defmt::info!("battery at {} mV, starting charge", m.output_voltage_mv);
                    self.mode = ChargeMode::ConstantCurrent;
                }
                // keep tracking the array while idle so the operating point
                // is close to the mpp when charging resumes
                Step::TrackMpp
            }
            ChargeMode::ConstantCurrent => {
                if m.output_voltage_mv >= VCHARGE_MV {
                    #[cfg(feature = "defmt")]
                    defmt::info!("charge voltage reached, holding {} mV", VCHARGE_MV);
                    self.mode = ChargeMode::ConstantVoltage;
                    Step::HoldChargeVoltage
                } else {
                    Step::TrackMpp
                }
            }
            ChargeMode::ConstantVoltage => Step::HoldChargeVoltage,
        }
    }

    pub fn finish_charge(&mut self) {
        #[cfg(feature = "defmt")]
        defmt::info!("charge complete, idling");
        self.mode = ChargeMode::Idle;
    }
}

/// One regulation step toward the charge voltage.
pub fn constant_voltage_step(output_voltage_mv: i32) -> Adjustment {
    if output_voltage_mv > VCHARGE_MV {
        Adjustment::Decrease
    } else if output_voltage_mv < VCHARGE_MV {
        Adjustment::Increase
    } else {
        Adjustment::Hold
    }
}

/// Battery current has tapered off to the cutoff.
pub fn charge_complete(m: &Measurements) -> bool {
    m.output_current_ma <= IBAT_THRESHOLD_MA
}

/// Fixed-period orchestrator: samples, advances the charge state and runs
/// the selected controller every tick.
pub struct ControlLoop<'a, A: AdcHardware, P: PwmHardware> {
    sampler: Sampler<'a, A>,
    duty: DutyCycle<P>,
    state: ChargeState,
    store: &'a SharedMeasurements,
}

impl<'a, A: AdcHardware, P: PwmHardware> ControlLoop<'a, A, P> {
    pub fn new(
        sampler: Sampler<'a, A>,
        duty: DutyCycle<P>,
        store: &'a SharedMeasurements,
    ) -> Self {
        Self { sampler, duty, state: ChargeState::new(), store }
    }

    pub fn charge_mode(&self) -> ChargeMode {
        self.state.mode()
    }

    pub fn duty(&self) -> u16 {
        self.duty.get()
    }

    pub async fn run(mut self) -> ! {
        self.warm_up().await;
        let mut ticker = Ticker::every(CONTROL_LOOP_PERIOD);
        loop {
            self.tick().await;
            ticker.next().await;
        }
    }

    /// Two blocking sweeps before regulation starts, so both halves of every
    /// history pair hold real samples.
    pub async fn warm_up(&mut self) {
        self.sampler.run_round().await;
        self.sampler.run_round().await;
    }

    pub async fn tick(&mut self) {
        self.sampler.run_round().await;
        let m = snapshot(self.store);
        match self.state.advance(&m) {
            Step::TrackMpp => self.duty.apply(mppt::perturb(&m)),
            Step::HoldChargeVoltage => self.hold_charge_voltage().await,
        }
    }

    /// Regulate the output at the charge voltage, re-sampling every
    /// iteration, until the battery current tapers to the cutoff.
    async fn hold_charge_voltage(&mut self) {
        loop {
            let m = snapshot(self.store);
            if charge_complete(&m) {
                break;
            }
            self.duty.apply(constant_voltage_step(m.output_voltage_mv));
            self.sampler.run_round().await;
        }
        self.state.finish_charge();
    }
}
