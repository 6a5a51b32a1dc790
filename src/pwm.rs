/// Duty-cycle change requested by a controller for one tick.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Adjustment {
    Increase,
    Decrease,
    Hold,
}

/// Register step per adjustment.
pub const DUTY_STEP: u16 = 1;

/// PWM output configured by the board bring-up. `max_duty` is the timer
/// period and does not change after init.
pub trait PwmHardware {
    fn max_duty(&self) -> u16;
    fn set_duty(&mut self, duty: u16);
}

/// Clamped view of the PWM compare register. Every write lands in
/// `[0, max_duty]`, saturating instead of wrapping.
pub struct DutyCycle<P: PwmHardware> {
    pwm: P,
    value: u16,
}

impl<P: PwmHardware> DutyCycle<P> {
    pub fn new(pwm: P, initial: u16) -> Self {
        let mut duty = Self { pwm, value: 0 };
        duty.set(initial);
        duty
    }

    pub fn get(&self) -> u16 {
        self.value
    }

    pub fn set(&mut self, duty: u16) {
        self.value = duty.min(self.pwm.max_duty());
        self.pwm.set_duty(self.value);
    }

    pub fn apply(&mut self, adjustment: Adjustment) {
        match adjustment {
            Adjustment::Increase => self.set(self.value.saturating_add(DUTY_STEP)),
            Adjustment::Decrease => self.set(self.value.saturating_sub(DUTY_STEP)),
            Adjustment::Hold => {}
        }
    }
}
