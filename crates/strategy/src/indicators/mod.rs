//! Pure indicator functions. None of them fail on short input; they return
//! neutral values instead.

pub mod fib;
pub mod moving;
pub mod rsi;
pub mod structure;
pub mod table;
pub mod volatility;

pub use fib::{fib_extension, fib_retracement, retracement_level};
pub use moving::{ema, rolling_mean, slope, sma};
pub use rsi::{RsiIndicator, RsiZone};
pub use structure::{classify_structure, find_swings, structure_of, SwingPoint};
pub use table::{CandleTable, MaKind, MaSpec};
pub use volatility::{no_trade_zone, volatility_regime};

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

pub fn round2(value: f64) -> f64 {
    round_to(value, 2)
}

/// Round a price to a precision that suits its magnitude.
pub fn smart_round(value: f64) -> f64 {
    let abs = value.abs();
    let decimals = if abs >= 100.0 {
        2
    } else if abs >= 1.0 {
        3
    } else if abs >= 0.01 {
        5
    } else if abs >= 0.0001 {
        6
    } else {
        8
    };
    round_to(value, decimals)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smart_round_scales_with_magnitude() {
        assert_eq!(smart_round(50123.4567), 50123.46);
        assert_eq!(smart_round(2.34567), 2.346);
        assert_eq!(smart_round(0.0123456), 0.01235);
        assert_eq!(smart_round(0.000012345678), 0.00001235);
    }
}
