use common::{finite_or_zero, Direction, FibReport, OptimalEntry, TradeLevels};

use super::params::{Layer, VariantParams};
use crate::indicators::{
    fib_extension, fib_retracement, find_swings, retracement_level, round2, smart_round,
    CandleTable,
};

/// The three prepared tables of one evaluation.
pub struct Frames<'a> {
    pub trend: &'a CandleTable,
    pub confirm: &'a CandleTable,
    pub fast: &'a CandleTable,
}

impl<'a> Frames<'a> {
    pub fn layer(&self, layer: Layer) -> &'a CandleTable {
        match layer {
            Layer::Trend => self.trend,
            Layer::Confirm => self.confirm,
            Layer::Fast => self.fast,
        }
    }
}

/// Percent distance of `level` from `entry`, rounded to two decimals.
pub fn distance_pct(entry: f64, level: f64) -> f64 {
    if entry <= 0.0 {
        return 0.0;
    }
    round2(finite_or_zero((level - entry).abs() / entry * 100.0))
}

/// Reward per unit of risk; zero when there is no risk distance.
pub fn risk_reward(stop_pct: f64, tp1_pct: f64) -> f64 {
    if stop_pct > 0.0 {
        round2(finite_or_zero(tp1_pct / stop_pct))
    } else {
        0.0
    }
}

/// Entry, stop and targets for `lean`. A non-directional lean puts every
/// level at `price`, which yields a zero R:R.
pub fn compute_levels(params: &VariantParams, frames: &Frames, lean: Direction, price: f64) -> TradeLevels {
    let long = match lean {
        Direction::Long => true,
        Direction::Short => false,
        Direction::Wait => {
            let p = smart_round(finite_or_zero(price));
            return TradeLevels {
                entry: p,
                stop_loss: p,
                take_profit_1: p,
                take_profit_2: p,
                ..TradeLevels::default()
            };
        }
    };

    let entry = price;
    let stop = stop_loss(params, frames, long, entry);
    let tp1 = first_target(params, frames, long, entry);
    let tp2 = second_target(params, frames, long, entry, tp1);

    let stop_pct = distance_pct(entry, stop);
    let tp1_pct = distance_pct(entry, tp1);
    let optimal_entry = if params.optimal_entry {
        optimal_entry(params, frames, long, price, stop, tp1)
    } else {
        None
    };

    TradeLevels {
        entry: smart_round(finite_or_zero(entry)),
        stop_loss: smart_round(finite_or_zero(stop)),
        take_profit_1: smart_round(finite_or_zero(tp1)),
        take_profit_2: smart_round(finite_or_zero(tp2)),
        stop_pct,
        tp1_pct,
        risk_reward: risk_reward(stop_pct, tp1_pct),
        optimal_entry,
    }
}

fn stop_loss(params: &VariantParams, frames: &Frames, long: bool, entry: f64) -> f64 {
    let rule = &params.stop;
    let table = frames.layer(rule.layer);
    let atr = table.atr_last();
    let (high, low) = table.range(rule.window).unwrap_or((entry, entry));

    if long {
        let structural = low - atr * rule.atr_buffer;
        structural
            .max(entry * (1.0 - rule.max_pct / 100.0))
            .min(entry * (1.0 - rule.min_pct / 100.0))
    } else {
        let structural = high + atr * rule.atr_buffer;
        structural
            .min(entry * (1.0 + rule.max_pct / 100.0))
            .max(entry * (1.0 + rule.min_pct / 100.0))
    }
}

/// Nearest swing level inside the target band, else the nearest reference MA
/// inside it, else an ATR multiple (never closer than the band minimum).
fn first_target(params: &VariantParams, frames: &Frames, long: bool, entry: f64) -> f64 {
    let rule = &params.target;
    let table = frames.layer(rule.layer);
    let sign = if long { 1.0 } else { -1.0 };
    let near = entry * (1.0 + sign * rule.min_pct / 100.0);
    let far = entry * (1.0 + sign * rule.max_pct / 100.0);
    let in_band = |level: f64| {
        if long {
            level > near && level < far
        } else {
            level < near && level > far
        }
    };
    let nearest = |levels: Vec<f64>| -> Option<f64> {
        levels
            .into_iter()
            .filter(|&l| in_band(l))
            .min_by(|a, b| (a - entry).abs().total_cmp(&(b - entry).abs()))
    };

    let (highs, lows) = find_swings(table.tail(rule.window), rule.swing_lookback);
    let swings = if long { highs } else { lows };
    if let Some(level) = nearest(swings.iter().map(|p| p.price).collect()) {
        return level;
    }

    let mas: Vec<f64> = [table.ma_fast_last(), table.ma_slow_last(), table.ma_long_last()]
        .into_iter()
        .flatten()
        .collect();
    if let Some(level) = nearest(mas) {
        return level;
    }

    let atr = frames.layer(rule.atr_layer).atr_last();
    if long {
        near.max(entry + atr * rule.atr_multiple)
    } else {
        near.min(entry - atr * rule.atr_multiple)
    }
}

/// Fibonacci 1.272 then 1.618 extension of the recent range, if it lands
/// clearly beyond the first target and within its cap; otherwise the first
/// target distance again.
fn second_target(params: &VariantParams, frames: &Frames, long: bool, entry: f64, tp1: f64) -> f64 {
    let rule = &params.target;
    let table = frames.layer(rule.layer);
    let fallback = tp1 + (tp1 - entry);
    let Some((high, low)) = table.range(rule.ext_window) else {
        return fallback;
    };

    let sign = if long { 1.0 } else { -1.0 };
    let ext = if long {
        fib_extension(low, high, entry)
    } else {
        fib_extension(high, low, entry)
    };
    let beyond = tp1 * (1.0 + sign * rule.ext_gap_pct / 100.0);
    let fits = |level: f64, cap_pct: f64| {
        let cap = entry * (1.0 + sign * cap_pct / 100.0);
        if long {
            level > beyond && level < cap
        } else {
            level < beyond && level > cap
        }
    };

    if fits(ext.e1272, rule.cap_1272_pct) {
        ext.e1272
    } else if fits(ext.e1618, rule.cap_1618_pct) {
        ext.e1618
    } else {
        fallback
    }
}

/// A pullback level at least 0.5% better than market and still on the right
/// side of the stop. Candidates: Fibonacci 0.5/0.618/0.382 of the target
/// layer's range, and the fast MA of the fast and confirmation timeframes.
fn optimal_entry(
    params: &VariantParams,
    frames: &Frames,
    long: bool,
    price: f64,
    stop: f64,
    tp1: f64,
) -> Option<OptimalEntry> {
    let rule = &params.target;
    let swing_table = frames.layer(rule.layer);
    let fast_label = params.averages.fast_label();
    let mut candidates: Vec<(f64, String)> = Vec::new();

    if let Some((high, low)) = swing_table.range(rule.ext_window) {
        let (from, to) = if long { (high, low) } else { (low, high) };
        for ratio in [0.5, 0.618, 0.382] {
            candidates.push((
                retracement_level(from, to, ratio),
                format!("Fib {ratio} {}", swing_table.timeframe),
            ));
        }
    }
    if let Some(ma) = frames.fast.ma_fast_last() {
        candidates.push((ma, format!("{fast_label} {}", frames.fast.timeframe)));
    }
    if let Some(ma) = frames.confirm.ma_fast_last() {
        candidates.push((ma, format!("{fast_label} {}", frames.confirm.timeframe)));
    }

    let (level, label) = candidates
        .into_iter()
        .filter(|(level, _)| {
            if long {
                *level < price * 0.995 && *level > stop
            } else {
                *level > price * 1.005 && *level < stop
            }
        })
        .min_by(|(a, _), (b, _)| (a - price).abs().total_cmp(&(b - price).abs()))?;

    let risk = (level - stop).abs();
    let reward = (tp1 - level).abs();
    let risk_reward = (risk > 0.0).then(|| round2(finite_or_zero(reward / risk)));

    Some(OptimalEntry {
        price: smart_round(finite_or_zero(level)),
        label,
        risk_reward,
    })
}

/// Retracement zone of the recent range for `lean`, with membership of `price`.
pub fn fib_report(params: &VariantParams, frames: &Frames, lean: Direction, price: f64) -> FibReport {
    let table = frames.layer(params.zone_layer);
    let Some((high, low)) = table.range(params.zone_window) else {
        return FibReport::default();
    };

    let (from, to) = if lean == Direction::Short { (low, high) } else { (high, low) };
    let a = retracement_level(from, to, params.zone.0);
    let b = retracement_level(from, to, params.zone.1);
    let (zone_low, zone_high) = (a.min(b), a.max(b));
    let in_zone = lean.is_directional() && price >= zone_low * 0.998 && price <= zone_high * 1.002;

    let ext = if lean == Direction::Short {
        fib_extension(high, low, price)
    } else {
        fib_extension(low, high, price)
    };

    FibReport {
        swing_high: finite_or_zero(high),
        swing_low: finite_or_zero(low),
        retracement: fib_retracement(from, to),
        extension: ext,
        zone_low: smart_round(finite_or_zero(zone_low)),
        zone_high: smart_round(finite_or_zero(zone_high)),
        in_zone,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::MaSpec;
    use chrono::{TimeZone, Utc};
    use common::{Candle, Timeframe};

    fn table(tf: Timeframe, closes: &[f64], spread: f64) -> CandleTable {
        let candles = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                open_time: Utc.timestamp_opt(1_700_000_000 + i as i64 * 3600, 0).unwrap(),
                open: close,
                high: close + spread,
                low: close - spread,
                close,
                volume: 1.0,
            })
            .collect();
        CandleTable::prepare(tf, candles, &MaSpec::SMA_34_89_200)
    }

    fn rally(n: usize) -> Vec<f64> {
        (0..n).map(|i| 50.0 + i as f64 * 0.25).collect()
    }

    #[test]
    fn wait_lean_has_flat_levels() {
        let params = VariantParams::position();
        let t = table(Timeframe::H1, &rally(120), 0.5);
        let frames = Frames { trend: &t, confirm: &t, fast: &t };
        let levels = compute_levels(&params, &frames, Direction::Wait, 100.0);
        assert_eq!(levels.entry, 100.0);
        assert_eq!(levels.stop_loss, 100.0);
        assert_eq!(levels.risk_reward, 0.0);
    }

    #[test]
    fn long_levels_are_ordered_and_stop_is_banded() {
        let params = VariantParams::position();
        let t = table(Timeframe::H1, &rally(120), 0.5);
        let frames = Frames { trend: &t, confirm: &t, fast: &t };
        let price = t.close();
        let levels = compute_levels(&params, &frames, Direction::Long, price);

        assert!(levels.stop_loss < levels.entry);
        assert!(levels.take_profit_1 > levels.entry);
        assert!(levels.take_profit_2 > levels.take_profit_1);
        assert!(levels.stop_pct >= 0.99 && levels.stop_pct <= 4.01, "stop_pct {}", levels.stop_pct);
        assert!(levels.tp1_pct >= 2.0);
    }

    #[test]
    fn short_levels_mirror() {
        let params = VariantParams::swing();
        let closes: Vec<f64> = (0..120).map(|i| 200.0 - i as f64 * 0.25).collect();
        let t = table(Timeframe::H1, &closes, 0.5);
        let frames = Frames { trend: &t, confirm: &t, fast: &t };
        let price = t.close();
        let levels = compute_levels(&params, &frames, Direction::Short, price);

        assert!(levels.stop_loss > levels.entry);
        assert!(levels.take_profit_1 < levels.entry);
        assert!(levels.take_profit_2 < levels.take_profit_1);
        assert!(levels.stop_pct >= 1.99 && levels.stop_pct <= 3.01, "stop_pct {}", levels.stop_pct);
    }

    #[test]
    fn risk_reward_handles_zero_stop() {
        assert_eq!(risk_reward(0.0, 3.0), 0.0);
        assert_eq!(risk_reward(2.0, 4.0), 2.0);
        assert_eq!(distance_pct(100.0, 98.0), 2.0);
    }

    #[test]
    fn fib_zone_of_long_pullback() {
        let params = VariantParams::position();
        // Range 100..200 over the zone window; 0.5-0.618 zone is 138.2..150.
        let mut t = table(Timeframe::H1, &[150.0; 60], 0.0);
        let n = t.candles.len();
        t.candles[n - 30].high = 200.0;
        t.candles[n - 20].low = 100.0;
        let frames = Frames { trend: &t, confirm: &t, fast: &t };
        let report = fib_report(&params, &frames, Direction::Long, 145.0);
        assert_eq!(report.zone_low, 138.2);
        assert_eq!(report.zone_high, 150.0);
        assert!(report.in_zone);

        let outside = fib_report(&params, &frames, Direction::Long, 170.0);
        assert!(!outside.in_zone);
    }
}
