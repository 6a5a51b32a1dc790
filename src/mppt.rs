use crate::measurements::Measurements;
use crate::pwm::Adjustment;

/// Perturb-and-observe maximum power point tracker.
///
/// Hill-climbing over the last two input samples: compares the incremental
/// conductance dI/dV against the negative instantaneous conductance -I/V and
/// nudges the duty cycle one step toward the maximum power point. No memory
/// beyond the history pairs, so the control-loop period sets the tracking
/// speed versus stability trade-off.
pub fn perturb(m: &Measurements) -> Adjustment {
    let v = m.input_voltage_mv.current as i64;
    let i = m.input_current_ma.current as i64;
    let dv = m.input_voltage_mv.delta() as i64;
    let di = m.input_current_ma.delta() as i64;

    if dv == 0 {
        return if di > 0 {
            Adjustment::Decrease
        } else if di < 0 {
            Adjustment::Increase
        } else {
            Adjustment::Hold
        };
    }
    if v == 0 {
        // -I/V is undefined, hold rather than divide by zero
        return Adjustment::Hold;
    }

    // dI/dV vs -I/V without dividing: multiply both sides by dV*V and swap
    // the operands when that product is negative
    let lhs = di * v;
    let rhs = -i * dv;
    let (lhs, rhs) = if dv * v > 0 { (lhs, rhs) } else { (rhs, lhs) };
    if lhs > rhs {
        Adjustment::Decrease
    } else if lhs < rhs {
        Adjustment::Increase
    } else {
        Adjustment::Hold
    }
}
