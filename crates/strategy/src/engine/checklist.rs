use common::{
    CheckItem, CheckOutcome, Confidence, Direction, FastState, MarketContext, Sentiment, Verdict,
};

/// Funding (percent) paid by the other side that counts as favourable.
const FUNDING_FAVOURABLE_CHECK: f64 = 0.01;
/// Open-interest change (percent) that confirms or contradicts a move.
const OI_CHECK_PCT: f64 = 5.0;

/// Inputs of the entry checklist, gathered after scoring and vetoes.
pub struct ChecklistInputs<'a> {
    pub lean: Direction,
    pub confidence: Confidence,
    pub medium_confidence_fails: bool,
    pub fast_state: FastState,
    pub fast_note: &'a str,
    pub no_trade_zone: bool,
    pub risk_reward: f64,
    pub funding_rate: Option<f64>,
    pub funding_extreme: f64,
    pub context: &'a MarketContext,
    pub oi_change: Option<f64>,
}

/// The seven ordered entry checks.
pub fn build_checklist(inputs: &ChecklistInputs) -> Vec<CheckItem> {
    vec![
        confidence_check(inputs.confidence, inputs.medium_confidence_fails),
        fast_state_check(inputs.fast_state, inputs.fast_note),
        if inputs.no_trade_zone {
            CheckItem::undecided("Inside the no-trade zone")
        } else {
            CheckItem::pass("Outside the no-trade zone")
        },
        rr_check(inputs.risk_reward),
        funding_check(inputs.lean, inputs.funding_rate, inputs.funding_extreme),
        macro_check(inputs.lean, inputs.context),
        oi_check(inputs.lean, inputs.oi_change),
    ]
}

fn confidence_check(confidence: Confidence, medium_fails: bool) -> CheckItem {
    match confidence {
        Confidence::High => CheckItem::pass("Confidence HIGH"),
        Confidence::Medium if medium_fails => {
            CheckItem::fail("Confidence MEDIUM, wait for the confirmation timeframe to settle")
        }
        Confidence::Medium => CheckItem::undecided("Confidence MEDIUM, wait for more confluence"),
        Confidence::Low => CheckItem::fail("Confidence LOW"),
    }
}

fn fast_state_check(state: FastState, note: &str) -> CheckItem {
    match state {
        FastState::Confirmed => CheckItem::pass(note),
        FastState::Counter => CheckItem::fail(note),
        _ => CheckItem::undecided(note),
    }
}

fn rr_check(rr: f64) -> CheckItem {
    if rr >= 2.0 {
        CheckItem::pass(format!("R:R 1:{rr} excellent"))
    } else if rr >= 1.5 {
        CheckItem::pass(format!("R:R 1:{rr} good"))
    } else if rr >= 1.0 {
        CheckItem::undecided(format!("R:R 1:{rr} acceptable"))
    } else {
        CheckItem::fail(format!("R:R 1:{rr} too low"))
    }
}

fn funding_check(lean: Direction, funding: Option<f64>, extreme: f64) -> CheckItem {
    let Some(rate) = funding else {
        return CheckItem::undecided("Funding unavailable");
    };
    let text = |what: &str| format!("Funding {rate:.4}% {what}");
    match lean {
        Direction::Long if rate < -FUNDING_FAVOURABLE_CHECK => CheckItem::pass(text("paid by shorts")),
        Direction::Long if rate > extreme => CheckItem::fail(text("longs crowded")),
        Direction::Short if rate > FUNDING_FAVOURABLE_CHECK => CheckItem::pass(text("paid by longs")),
        Direction::Short if rate < -extreme => CheckItem::fail(text("shorts crowded")),
        _ => CheckItem::undecided(text("neutral")),
    }
}

fn macro_check(lean: Direction, context: &MarketContext) -> CheckItem {
    let sentiment = context.sentiment;
    let text = format!("BTC {sentiment}");
    match (lean, sentiment) {
        (Direction::Long, Sentiment::RiskOn) => CheckItem::pass(text),
        (Direction::Long, Sentiment::RiskOff | Sentiment::Dump) => CheckItem::fail(text),
        (Direction::Short, Sentiment::RiskOff | Sentiment::Dump) => CheckItem::pass(text),
        _ => CheckItem::undecided(text),
    }
}

fn oi_check(lean: Direction, oi_change: Option<f64>) -> CheckItem {
    let Some(oi) = oi_change else {
        return CheckItem::undecided("Open interest unavailable");
    };
    let text = format!("Open interest {oi:+.1}%");
    let signed = match lean {
        Direction::Long => oi,
        Direction::Short => -oi,
        Direction::Wait => return CheckItem::undecided(text),
    };
    if signed > OI_CHECK_PCT {
        CheckItem::pass(text)
    } else if signed < -OI_CHECK_PCT {
        CheckItem::fail(text)
    } else {
        CheckItem::undecided(text)
    }
}

/// Aggregate the checklist into a verdict.
///
/// Two or more failures is NO; no failures with at least four passes is GO;
/// anything else WAIT. LOW confidence is NO on any failure and WAIT otherwise,
/// MEDIUM confidence and an unresolved fast timeframe cap the verdict at WAIT.
pub fn verdict(checklist: &[CheckItem], confidence: Confidence, fast_state: FastState) -> Verdict {
    let fails = checklist.iter().filter(|c| c.outcome == CheckOutcome::Fail).count();
    let passes = checklist.iter().filter(|c| c.outcome == CheckOutcome::Pass).count();

    let mut verdict = if fails >= 2 {
        Verdict::No
    } else if fails == 0 && passes >= 4 {
        Verdict::Go
    } else {
        Verdict::Wait
    };

    match confidence {
        Confidence::Low => {
            verdict = if fails >= 1 { Verdict::No } else { Verdict::Wait };
        }
        Confidence::Medium if verdict == Verdict::Go => verdict = Verdict::Wait,
        _ => {}
    }

    if fast_state.is_unresolved() && verdict == Verdict::Go {
        verdict = Verdict::Wait;
    }
    verdict
}
