use embassy_futures::yield_now;

use crate::measurements::SharedMeasurements;

pub const NUM_CHANNELS: usize = 4;

/// Multiplexed analog channels, in sampling order.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Channel {
    InputVoltage,
    InputSenseVoltage,
    OutputVoltage,
    OutputSenseVoltage,
}

impl Channel {
    pub const ALL: [Channel; NUM_CHANNELS] = [
        Channel::InputVoltage,
        Channel::InputSenseVoltage,
        Channel::OutputVoltage,
        Channel::OutputSenseVoltage,
    ];

    /// Round-robin successor, wrapping after the last channel.
    pub fn next(self) -> Self {
        match self {
            Channel::InputVoltage => Channel::InputSenseVoltage,
            Channel::InputSenseVoltage => Channel::OutputVoltage,
            Channel::OutputVoltage => Channel::OutputSenseVoltage,
            Channel::OutputSenseVoltage => Channel::InputVoltage,
        }
    }
}

/// Converter interface provided by the board bring-up.
///
/// `read_sample` returns the raw 10-bit result of the conversion that
/// `conversion_in_progress` last reported finished.
pub trait AdcHardware {
    fn select_channel(&mut self, channel: Channel);
    fn start_conversion(&mut self);
    fn conversion_in_progress(&self) -> bool;
    fn read_sample(&self) -> u16;
}

pub mod conversion {
    //! Linear calibration from raw counts to fixed-point physical units.

    /// Internal ADC reference.
    pub const REF_VOLTAGE_MV: i32 = 1_100;
    /// Measured division of the input dividers.
    pub const VOLTAGE_DIV_FACTOR: i32 = 6;
    pub const RAW_FULL_SCALE: i32 = 1023;
    /// Shunt used for both current measurements.
    pub const RSENSE_MILLIOHM: i32 = 10;

    pub fn calculate_voltage_mv(raw: u16) -> i32 {
        raw as i32 * REF_VOLTAGE_MV * VOLTAGE_DIV_FACTOR / RAW_FULL_SCALE
    }

    /// Current through the shunt from the voltage drop across it.
    pub fn calculate_current_ma(drop_mv: i32) -> i32 {
        drop_mv * 1_000 / RSENSE_MILLIOHM
    }
}

/// Cycles the analog channels and routes every completed conversion into the
/// measurement store. Sole writer of [`SharedMeasurements`].
pub struct Sampler<'a, A: AdcHardware> {
    adc: A,
    channel: Channel,
    store: &'a SharedMeasurements,
}

impl<'a, A: AdcHardware> Sampler<'a, A> {
    pub fn new(mut adc: A, store: &'a SharedMeasurements) -> Self {
        let channel = Channel::InputVoltage;
        adc.select_channel(channel);
        Self { adc, channel, store }
    }

    /// One full pass over all channels, each visited exactly once.
    ///
    /// The wait on the in-progress flag has no timeout: a conversion that
    /// never finishes stalls the charger. Watchdog hookup point.
    pub async fn run_round(&mut self) {
        for _ in 0..NUM_CHANNELS {
            self.adc.start_conversion();
            while self.adc.conversion_in_progress() {
                yield_now().await;
            }
            let raw = self.adc.read_sample();
            self.apply_sample(raw);
        }
    }

    /// Calibrate a raw conversion for the selected channel, fold it into the
    /// store and advance the selector.
    fn apply_sample(&mut self, raw: u16) {
        let mv = conversion::calculate_voltage_mv(raw);
        self.store.lock(|m| {
            let mut m = m.borrow_mut();
            match self.channel {
                Channel::InputVoltage => m.input_voltage_mv.push(mv),
                Channel::InputSenseVoltage => {
                    // sense tap sits behind the shunt; the drop against the
                    // array voltage sampled just before gives the current
                    let drop_mv = m.input_voltage_mv.current - mv;
                    m.input_current_ma.push(conversion::calculate_current_ma(drop_mv));
                }
                Channel::OutputVoltage => m.output_voltage_mv = mv,
                Channel::OutputSenseVoltage => {
                    let drop_mv = m.output_voltage_mv - mv;
                    m.output_current_ma = conversion::calculate_current_ma(drop_mv);
                }
            }
        });
        self.channel = self.channel.next();
        self.adc.select_channel(self.channel);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::measurements::{self, snapshot};
    use embassy_futures::block_on;
    use heapless::{Deque, Vec};

    /// Scripted converter: conversions finish immediately, raw values pop off
    /// a queue on start (0 once exhausted), channel selections are recorded.
    pub(crate) struct ScriptedAdc {
        script: Deque<u16, 64>,
        current: u16,
        pub selected: Vec<Channel, 64>,
    }

    impl ScriptedAdc {
        pub fn with_script(raws: &[u16]) -> Self {
            let mut script = Deque::new();
            for &raw in raws {
                script.push_back(raw).unwrap();
            }
            Self { script, current: 0, selected: Vec::new() }
        }
    }

    impl AdcHardware for ScriptedAdc {
        fn select_channel(&mut self, channel: Channel) {
            self.selected.push(channel).unwrap();
        }
        fn start_conversion(&mut self) {
            self.current = self.script.pop_front().unwrap_or(0);
        }
        fn conversion_in_progress(&self) -> bool {
            false
        }
        fn read_sample(&self) -> u16 {
            self.current
        }
    }

    // raw counts that calibrate to exact millivolt values
    pub(crate) const RAW_600MV: u16 = 93;
    pub(crate) const RAW_1200MV: u16 = 186;
    pub(crate) const RAW_1800MV: u16 = 279;
    pub(crate) const RAW_3600MV: u16 = 558;
    pub(crate) const RAW_4200MV: u16 = 651;
    pub(crate) const RAW_4800MV: u16 = 744;

    #[test]
    fn calibration_spans_the_reference_range() {
        assert_eq!(conversion::calculate_voltage_mv(0), 0);
        assert_eq!(conversion::calculate_voltage_mv(1023), 6_600);
        assert_eq!(conversion::calculate_voltage_mv(RAW_600MV), 600);
    }

    #[test]
    fn current_follows_the_shunt_drop() {
        // 600 mV over 10 mOhm
        assert_eq!(conversion::calculate_current_ma(600), 60_000);
        assert_eq!(conversion::calculate_current_ma(0), 0);
        assert_eq!(conversion::calculate_current_ma(-5), -500);
    }

    #[test]
    fn round_visits_every_channel_once_in_order() {
        let store = measurements::shared();
        let adc = ScriptedAdc::with_script(&[0; 8]);
        let mut sampler = Sampler::new(adc, &store);
        block_on(sampler.run_round());
        block_on(sampler.run_round());
        // initial selection plus one advance per conversion, wrapping between
        // rounds with no skips or repeats
        let expected: Vec<Channel, 64> = core::iter::once(Channel::InputVoltage)
            .chain(Channel::ALL.into_iter().cycle().skip(1).take(8))
            .collect();
        assert_eq!(sampler.adc.selected, expected);
    }

    #[test]
    fn round_routes_calibrated_values_to_the_store() {
        let store = measurements::shared();
        let adc = ScriptedAdc::with_script(&[RAW_1200MV, RAW_600MV, RAW_4200MV, RAW_3600MV]);
        let mut sampler = Sampler::new(adc, &store);
        block_on(sampler.run_round());

        let m = snapshot(&store);
        assert_eq!(m.input_voltage_mv.current, 1_200);
        // (1200 - 600) mV over the 10 mOhm shunt
        assert_eq!(m.input_current_ma.current, 60_000);
        assert_eq!(m.output_voltage_mv, 4_200);
        assert_eq!(m.output_current_ma, 60_000);
    }

    #[test]
    fn second_round_shifts_the_input_histories() {
        let store = measurements::shared();
        let adc = ScriptedAdc::with_script(&[
            RAW_1200MV, RAW_600MV, RAW_4200MV, RAW_3600MV,
            RAW_600MV, RAW_600MV, RAW_4200MV, RAW_4200MV,
        ]);
        let mut sampler = Sampler::new(adc, &store);
        block_on(sampler.run_round());
        block_on(sampler.run_round());

        let m = snapshot(&store);
        assert_eq!(m.input_voltage_mv.previous, 1_200);
        assert_eq!(m.input_voltage_mv.current, 600);
        assert_eq!(m.input_current_ma.previous, 60_000);
        assert_eq!(m.input_current_ma.current, 0);
        assert_eq!(m.output_current_ma, 0);
    }
}
