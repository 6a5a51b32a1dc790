use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

/// Latest and immediately preceding value of one quantity.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct History {
    pub previous: i32,
    pub current: i32,
}

impl History {
    pub const fn new() -> Self {
        Self { previous: 0, current: 0 }
    }

    /// Shift `current` into `previous` before overwriting it.
    pub fn push(&mut self, value: i32) {
        self.previous = self.current;
        self.current = value;
    }

    pub fn delta(&self) -> i32 {
        self.current - self.previous
    }
}

/// Calibrated readings for one sampling round. Input quantities keep a
/// two-sample history for the perturb-and-observe tracker; output quantities
/// only need the latest value.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Measurements {
    pub input_voltage_mv: History,
    pub input_current_ma: History,
    pub output_voltage_mv: i32,
    pub output_current_ma: i32,
}

impl Measurements {
    pub const fn new() -> Self {
        Self {
            input_voltage_mv: History::new(),
            input_current_ma: History::new(),
            output_voltage_mv: 0,
            output_current_ma: 0,
        }
    }
}

/// Store shared between the sampler and the controllers.
///
/// Single writer (the sampler), any number of readers. Readers copy the
/// whole struct out under the lock so a history pair is never observed
/// mid-update.
pub type SharedMeasurements = Mutex<CriticalSectionRawMutex, RefCell<Measurements>>;

pub const fn shared() -> SharedMeasurements {
    Mutex::new(RefCell::new(Measurements::new()))
}

/// Consistent copy of the latest readings.
pub fn snapshot(store: &SharedMeasurements) -> Measurements {
    store.lock(|m| *m.borrow())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_shifts_on_every_push() {
        let mut h = History::new();
        for (i, value) in [3300, 3350, 3275, 3275, 0].into_iter().enumerate() {
            let before = h.current;
            h.push(value);
            assert_eq!(h.previous, before, "push #{i} lost the preceding value");
            assert_eq!(h.current, value);
        }
    }

    #[test]
    fn delta_is_current_minus_previous() {
        let mut h = History::new();
        h.push(1200);
        h.push(1150);
        assert_eq!(h.delta(), -50);
    }

    #[test]
    fn snapshot_copies_the_store() {
        let store = shared();
        store.lock(|m| m.borrow_mut().output_voltage_mv = 4100);
        let copy = snapshot(&store);
        assert_eq!(copy.output_voltage_mv, 4100);
        // mutating the store afterwards must not affect the copy
        store.lock(|m| m.borrow_mut().output_voltage_mv = 0);
        assert_eq!(copy.output_voltage_mv, 4100);
    }
}
