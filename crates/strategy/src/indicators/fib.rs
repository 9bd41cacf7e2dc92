use common::{ExtensionLevels, FibLevels};

/// Retracement levels measured from `from` back towards `to`.
///
/// With `from` = swing high and `to` = swing low these are the usual pullback
/// levels of an up-move; swapping the arguments gives the levels of a
/// down-move.
pub fn fib_retracement(from: f64, to: f64) -> FibLevels {
    let range = from - to;
    FibLevels {
        r236: from - range * 0.236,
        r382: from - range * 0.382,
        r500: from - range * 0.5,
        r618: from - range * 0.618,
        r786: from - range * 0.786,
    }
}

/// Single retracement level for an arbitrary ratio.
pub fn retracement_level(from: f64, to: f64, ratio: f64) -> f64 {
    from - (from - to) * ratio
}

/// Extension targets projected from `base` by the `from -> to` leg.
/// A leg pointing down projects below `base`.
pub fn fib_extension(from: f64, to: f64, base: f64) -> ExtensionLevels {
    let range = to - from;
    ExtensionLevels {
        e1272: base + range * 1.272,
        e1618: base + range * 1.618,
        e2000: base + range * 2.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retracement_of_up_leg() {
        let fib = fib_retracement(100.0, 50.0);
        assert!((fib.r500 - 75.0).abs() < 1e-9);
        assert!((fib.r618 - 69.1).abs() < 1e-9);
        assert!((fib.r236 - 88.2).abs() < 1e-9);
    }

    #[test]
    fn retracement_of_down_leg_mirrors() {
        let fib = fib_retracement(50.0, 100.0);
        assert!((fib.r500 - 75.0).abs() < 1e-9);
        assert!((fib.r618 - 80.9).abs() < 1e-9);
    }

    #[test]
    fn extension_direction_follows_leg() {
        let up = fib_extension(50.0, 100.0, 100.0);
        assert!((up.e1272 - 163.6).abs() < 1e-9);
        assert!((up.e2000 - 200.0).abs() < 1e-9);

        let down = fib_extension(100.0, 50.0, 50.0);
        assert!(down.e1618 < 50.0);
        assert!((down.e1618 - (50.0 - 80.9)).abs() < 1e-9);
    }

    #[test]
    fn single_level_matches_table() {
        assert!((retracement_level(100.0, 50.0, 0.618) - fib_retracement(100.0, 50.0).r618).abs() < 1e-12);
    }
}
