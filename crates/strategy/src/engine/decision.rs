use chrono::{DateTime, Utc};
use tracing::debug;

use common::{
    finite_or_zero, Bias, Candle, Confidence, Direction, Error, MarketStats, Result, Sentiment,
    SignalRecord, Slope, Structure, Trend, Verdict, VolatilityState,
};

use super::checklist::{build_checklist, verdict, ChecklistInputs};
use super::frame::{fast_state, FrameReading};
use super::levels::{compute_levels, fib_report, Frames};
use super::params::{FrameSpec, StandAside, VariantParams};
use super::MarketSnapshot;
use crate::indicators::{no_trade_zone, volatility_regime, CandleTable, RsiIndicator, RsiZone};

/// Run the decision skeleton on one snapshot.
///
/// Stateless: the same snapshot and parameters always give the same record.
/// Fails only when a timeframe has too little history after indicator warm-up.
pub fn decide(
    params: &VariantParams,
    symbol: &str,
    snapshot: MarketSnapshot,
    now: DateTime<Utc>,
) -> Result<SignalRecord> {
    let MarketSnapshot {
        trend,
        confirm,
        fast,
        funding_rate,
        oi_change,
        context,
    } = snapshot;

    let trend = prepare(params, symbol, params.trend, trend)?;
    let confirm = prepare(params, symbol, params.confirm, confirm)?;
    let fast = prepare(params, symbol, params.fast, fast)?;
    let frames = Frames {
        trend: &trend,
        confirm: &confirm,
        fast: &fast,
    };

    let price = fast.close();
    let lookback = params.structure_lookback;
    let t = FrameReading::read(&trend, price, lookback);
    let c = FrameReading::read(&confirm, price, lookback);
    let f = FrameReading::read(&fast, price, lookback);

    let fast_label = params.averages.fast_label();
    let slow_label = params.averages.slow_label();
    let (ttf, ctf) = (trend.timeframe, confirm.timeframe);

    let mut conditions: Vec<String> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();

    // ── 1-2. Bias and conflict ───────────────────────────────────────────────
    let ntz = c.ma_slow.and_then(|slow| no_trade_zone(price, c.ma_fast, slow));
    if let Some(gap) = ntz {
        warnings.push(format!(
            "Price inside the {fast_label}/{slow_label} no-trade zone on {ctf} (gap {gap:.2}%)"
        ));
    }

    let mut direction = match (t.bias, c.bias) {
        (Bias::Neutral, _) | (_, Bias::Neutral) => Direction::Wait,
        _ if ntz.is_some() => Direction::Wait,
        (a, b) if a != b => {
            conditions.push(format!("{ttf} {a} conflicts with {ctf} {b}"));
            Direction::Wait
        }
        (a, _) => a.direction(),
    };

    // ── 3-4. Conditions and confidence ───────────────────────────────────────
    let mut rsi_value = None;
    if direction.is_directional() {
        let long = direction == Direction::Long;
        let (side, rising, structure) = if long {
            ("above", Slope::Up, Structure::Uptrend)
        } else {
            ("below", Slope::Down, Structure::Downtrend)
        };

        conditions.push(format!("{ttf} bias {direction}: price {side} {fast_label}/{slow_label}"));
        if t.structure == structure {
            conditions.push(format!("{ttf} structure {structure}"));
        }
        if (long && c.above_fast) || (!long && c.below_fast) {
            conditions.push(format!("{ctf} {side} {fast_label} ({:+.2}%)", c.distance_pct));
        }
        if (long && c.above_slow) || (!long && c.below_slow) {
            conditions.push(format!("{ctf} {side} {slow_label}"));
        }
        if c.slope_fast == rising {
            conditions.push(format!("{ctf} {fast_label} slope {}", c.slope_fast));
        }
        if c.structure == structure {
            conditions.push(format!("{ctf} structure {structure}"));
        }
        if (long && c.crossed_up_fast) || (!long && c.crossed_down_fast) {
            conditions.push(format!("KEY: {ctf} crossed {side} {fast_label}"));
        }
        if (long && c.crossed_up_slow) || (!long && c.crossed_down_slow) {
            conditions.push(format!("KEY: {ctf} crossed {side} {slow_label}"));
        }

        let momentum_table = frames.layer(params.momentum_layer);
        let colour_ok = momentum_table
            .last()
            .is_some_and(|m| if long { m.is_bullish() } else { m.is_bearish() });
        let volume = momentum_table.volume_ratio_last();
        if colour_ok && volume > params.volume_confirm {
            let colour = if long { "bullish" } else { "bearish" };
            conditions.push(format!(
                "{} {colour} candle on {volume:.1}x volume",
                momentum_table.timeframe
            ));
        }

        let fib = fib_report(params, &frames, direction, price);
        if fib.in_zone {
            conditions.push(format!(
                "{} in Fibonacci {}-{} zone ({}-{})",
                frames.layer(params.zone_layer).timeframe,
                params.zone.0,
                params.zone.1,
                fib.zone_low,
                fib.zone_high
            ));
        }

        if let Some(filter) = &params.rsi {
            let rsi = RsiIndicator::new(filter.period, filter.overbought, filter.oversold);
            if let Some(value) = rsi.compute(&confirm.closes()) {
                rsi_value = Some(value);
                let (lo, hi) = if long { filter.long_zone } else { filter.short_zone };
                let extreme = match rsi.zone(value) {
                    RsiZone::Overbought if long => Some("overbought"),
                    RsiZone::Oversold if !long => Some("oversold"),
                    _ => None,
                };
                if let Some(word) = extreme {
                    warnings.push(format!("{ctf} RSI {value:.0} {word}, late entry"));
                } else if value >= lo && value <= hi {
                    conditions.push(format!("{ctf} RSI {value:.0} within {lo}-{hi}"));
                }
            }
        }

        if let Some(limit) = params.far_from_ma_pct {
            if t.distance_pct.abs() > limit {
                warnings.push(format!(
                    "{ttf} price {:.1}% from {fast_label}, extended",
                    t.distance_pct
                ));
            }
        }
    }

    let score = if direction.is_directional() {
        conditions.len() as u32
    } else {
        0
    };
    let mut confidence = if !direction.is_directional() {
        Confidence::Low
    } else if score >= params.high_score {
        Confidence::High
    } else if score >= params.medium_score {
        Confidence::Medium
    } else {
        Confidence::Low
    };

    // ── 5. Fast timeframe state ──────────────────────────────────────────────
    let (fast_state, fast_note) = fast_state(&fast, t.bias);

    // ── 6. Risk adjustments and vetoes ───────────────────────────────────────
    let volatility_table = frames.layer(params.volatility_layer);
    let volatility = volatility_regime(&volatility_table.atr, params.compress, params.expand);
    let mut adjustment: i32 = 0;

    if direction.is_directional() {
        let long = direction == Direction::Long;

        if let Some(rate) = funding_rate {
            let against = if long { rate } else { -rate };
            if against > params.funding_extreme {
                adjustment -= 1;
                warnings.push(format!("Funding {rate:.4}% crowded against the {direction}"));
            } else if against < -params.funding_favourable {
                warnings.push(format!("Funding {rate:.4}% favours the {direction}"));
            }
        }

        if volatility.state != VolatilityState::Normal {
            adjustment -= 1;
            warnings.push(format!("{}: {}", volatility_table.timeframe, volatility.note));
        }

        let sentiment = context.sentiment;
        let opposed = match direction {
            Direction::Long => matches!(sentiment, Sentiment::RiskOff | Sentiment::Dump),
            _ => matches!(sentiment, Sentiment::RiskOn | Sentiment::Pump),
        };
        if opposed {
            warnings.push(format!("BTC {sentiment}: {direction} against the market"));
        }

        let mut veto = None;
        if long && matches!(sentiment, Sentiment::RiskOff | Sentiment::Dump) && context.daily_trend == Trend::Bear {
            veto = Some(format!("Blocked: BTC {sentiment} with daily trend BEAR"));
        } else if !long && sentiment == Sentiment::RiskOn && context.daily_trend == Trend::Bull {
            veto = Some(format!("Blocked: BTC {sentiment} with daily trend BULL"));
        }
        if veto.is_none() {
            if let Some(oi) = oi_change {
                if long && oi <= -params.oi_block_pct {
                    veto = Some(format!("Blocked: open interest {oi:+.1}%, longs unwinding"));
                } else if !long && oi >= params.oi_block_pct {
                    veto = Some(format!("Blocked: open interest {oi:+.1}%, shorts squeezable"));
                }
            }
        }
        if let Some(reason) = veto {
            debug!(symbol, reason = %reason, "Signal vetoed");
            warnings.insert(0, reason);
            direction = Direction::Wait;
            confidence = Confidence::Low;
        }

        if adjustment <= -2 && confidence != Confidence::Low {
            confidence = Confidence::Low;
            warnings.push(format!("Risk adjustment {adjustment}: confidence lowered to LOW"));
        } else if adjustment == -1 && confidence == Confidence::High {
            confidence = Confidence::Medium;
        }
    }

    // ── 7-8. Levels and R:R gate ─────────────────────────────────────────────
    let lean = if direction.is_directional() {
        direction
    } else {
        c.bias.direction()
    };
    let levels = compute_levels(params, &frames, lean, price);
    let fib = fib_report(params, &frames, lean, price);

    let gated = levels.risk_reward < params.min_rr;
    if gated {
        if direction.is_directional() {
            warnings.push(format!(
                "R:R 1:{} below 1:{}, not worth the risk",
                levels.risk_reward, params.min_rr
            ));
        }
        direction = Direction::Wait;
        confidence = Confidence::Low;
    }

    // ── 9. Checklist and verdict ─────────────────────────────────────────────
    let checklist = build_checklist(&ChecklistInputs {
        lean,
        confidence,
        medium_confidence_fails: params.medium_confidence_fails,
        fast_state,
        fast_note: &fast_note,
        no_trade_zone: ntz.is_some(),
        risk_reward: levels.risk_reward,
        funding_rate,
        funding_extreme: params.funding_extreme,
        context: &context,
        oi_change,
    });
    let verdict = if gated {
        Verdict::No
    } else if direction == Direction::Wait && params.stand_aside == StandAside::Wait {
        Verdict::Wait
    } else {
        verdict(&checklist, confidence, fast_state)
    };

    if let Some(value) = rsi_value {
        debug!(symbol, rsi = value, "RSI filter applied");
    }
    debug!(
        symbol,
        variant = %params.variant,
        direction = %direction,
        confidence = %confidence,
        score,
        rr = levels.risk_reward,
        verdict = %verdict,
        "Signal decided"
    );

    Ok(SignalRecord {
        symbol: symbol.to_string(),
        variant: params.variant,
        price: finite_or_zero(price),
        direction,
        confidence,
        score,
        conditions,
        warnings,
        no_trade_zone: ntz.is_some(),
        levels,
        checklist,
        verdict,
        fast_state,
        fast_note,
        trend: t.diagnostics(&trend),
        confirm: c.diagnostics(&confirm),
        fast: f.diagnostics(&fast),
        fib,
        market: MarketStats {
            funding_rate: funding_rate.map(finite_or_zero),
            oi_change: oi_change.map(finite_or_zero),
            volatility,
        },
        context,
        timestamp: now,
    })
}

fn prepare(params: &VariantParams, symbol: &str, spec: FrameSpec, candles: Vec<Candle>) -> Result<CandleTable> {
    let table = CandleTable::prepare(spec.timeframe, candles, &params.averages);
    if table.len() < params.min_rows {
        return Err(Error::InsufficientHistory {
            symbol: symbol.to_string(),
            timeframe: spec.timeframe,
            have: table.len(),
            need: params.min_rows,
        });
    }
    Ok(table)
}
