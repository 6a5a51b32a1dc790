//! Control core of a solar MPPT battery charger for a small satellite EPS.
//!
//! Samples array and battery voltage/current over a multiplexed ADC, runs a
//! perturb-and-observe tracker while charging in constant current, holds the
//! charge voltage once the battery is full, and idles until it discharges
//! again. Hardware bring-up (PLL, timer, ADC reference selection) stays
//! outside this crate; the board plugs in through [`adc::AdcHardware`] and
//! [`pwm::PwmHardware`].

#![cfg_attr(not(test), no_std)]

pub mod adc;
pub mod control_loop;
pub mod measurements;
pub mod mppt;
pub mod pwm;
