use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

/// Clamp a computed value so serialized records never carry NaN or infinity.
pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

// ─── Market data ──────────────────────────────────────────────────────────────

/// One OHLCV bar as returned by the data source, oldest first in any series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}

/// Candle interval understood by the data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Timeframe {
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[default]
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }

    pub fn duration(&self) -> chrono::Duration {
        match self {
            Timeframe::M5 => chrono::Duration::minutes(5),
            Timeframe::M15 => chrono::Duration::minutes(15),
            Timeframe::H1 => chrono::Duration::hours(1),
            Timeframe::H4 => chrono::Duration::hours(4),
            Timeframe::D1 => chrono::Duration::days(1),
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 24h statistics for one instrument of the scan universe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub last_price: f64,
    /// 24h traded volume in the quote asset (USDT).
    pub quote_volume: f64,
    pub price_change_pct: f64,
}

// ─── Decision vocabulary ──────────────────────────────────────────────────────

/// Which timeframe triple and threshold set the decision engine runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// D1 / H4 / H1
    #[default]
    Position,
    /// H4 / H1 / M15
    Swing,
    /// H1 / M15 / M5
    Scalp,
}

impl Variant {
    pub const ALL: [Variant; 3] = [Variant::Position, Variant::Swing, Variant::Scalp];
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Variant::Position => write!(f, "position"),
            Variant::Swing => write!(f, "swing"),
            Variant::Scalp => write!(f, "scalp"),
        }
    }
}

impl std::str::FromStr for Variant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "position" => Ok(Variant::Position),
            "swing" => Ok(Variant::Swing),
            "scalp" => Ok(Variant::Scalp),
            other => Err(Error::Config(format!(
                "unknown variant '{other}', expected position, swing or scalp"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
    #[default]
    Wait,
}

impl Direction {
    pub fn is_directional(&self) -> bool {
        !matches!(self, Direction::Wait)
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
            Direction::Wait => write!(f, "WAIT"),
        }
    }
}

/// Directional lean of a single timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Bias {
    Long,
    Short,
    #[default]
    Neutral,
}

impl Bias {
    pub fn direction(&self) -> Direction {
        match self {
            Bias::Long => Direction::Long,
            Bias::Short => Direction::Short,
            Bias::Neutral => Direction::Wait,
        }
    }
}

impl std::fmt::Display for Bias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bias::Long => write!(f, "LONG"),
            Bias::Short => write!(f, "SHORT"),
            Bias::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Ordered so that `High > Medium > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    #[default]
    Low,
    Medium,
    High,
}

impl Confidence {
    /// One tier lower, saturating at `Low`.
    pub fn downgrade(self) -> Self {
        match self {
            Confidence::High => Confidence::Medium,
            _ => Confidence::Low,
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Confidence::Low => write!(f, "LOW"),
            Confidence::Medium => write!(f, "MEDIUM"),
            Confidence::High => write!(f, "HIGH"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Go,
    #[default]
    Wait,
    No,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Go => write!(f, "GO"),
            Verdict::Wait => write!(f, "WAIT"),
            Verdict::No => write!(f, "NO"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CheckOutcome {
    Pass,
    Fail,
    #[default]
    Undecided,
}

/// One line of the entry checklist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CheckItem {
    pub outcome: CheckOutcome,
    pub text: String,
}

impl CheckItem {
    pub fn pass(text: impl Into<String>) -> Self {
        Self { outcome: CheckOutcome::Pass, text: text.into() }
    }

    pub fn fail(text: impl Into<String>) -> Self {
        Self { outcome: CheckOutcome::Fail, text: text.into() }
    }

    pub fn undecided(text: impl Into<String>) -> Self {
        Self { outcome: CheckOutcome::Undecided, text: text.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Structure {
    Uptrend,
    Downtrend,
    #[default]
    Sideways,
}

impl std::fmt::Display for Structure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Structure::Uptrend => write!(f, "UPTREND"),
            Structure::Downtrend => write!(f, "DOWNTREND"),
            Structure::Sideways => write!(f, "SIDEWAYS"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Slope {
    Up,
    Down,
    #[default]
    Flat,
}

impl std::fmt::Display for Slope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Slope::Up => write!(f, "UP"),
            Slope::Down => write!(f, "DOWN"),
            Slope::Flat => write!(f, "FLAT"),
        }
    }
}

/// Short-term state of the fastest timeframe relative to the trend lean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum FastState {
    Confirmed,
    Pullback,
    Counter,
    Forming,
    #[default]
    Neutral,
}

impl FastState {
    /// States that keep a verdict from reaching GO.
    pub fn is_unresolved(&self) -> bool {
        matches!(self, FastState::Forming | FastState::Counter | FastState::Neutral)
    }
}

impl std::fmt::Display for FastState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FastState::Confirmed => write!(f, "CONFIRMED"),
            FastState::Pullback => write!(f, "PULLBACK"),
            FastState::Counter => write!(f, "COUNTER"),
            FastState::Forming => write!(f, "FORMING"),
            FastState::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum VolatilityState {
    Compress,
    #[default]
    Normal,
    Expand,
}

impl std::fmt::Display for VolatilityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VolatilityState::Compress => write!(f, "COMPRESS"),
            VolatilityState::Normal => write!(f, "NORMAL"),
            VolatilityState::Expand => write!(f, "EXPAND"),
        }
    }
}

// ─── Market context ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Trend {
    Bull,
    Bear,
    #[default]
    Neutral,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trend::Bull => write!(f, "BULL"),
            Trend::Bear => write!(f, "BEAR"),
            Trend::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Market-wide regime derived from the reference instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Sentiment {
    RiskOn,
    RiskOff,
    Dump,
    Pump,
    Neutral,
    #[default]
    Unknown,
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sentiment::RiskOn => write!(f, "RISK_ON"),
            Sentiment::RiskOff => write!(f, "RISK_OFF"),
            Sentiment::Dump => write!(f, "DUMP"),
            Sentiment::Pump => write!(f, "PUMP"),
            Sentiment::Neutral => write!(f, "NEUTRAL"),
            Sentiment::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Read-only snapshot of the reference instrument, recomputed per evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MarketContext {
    pub price: Option<f64>,
    pub change_24h: Option<f64>,
    pub daily_trend: Trend,
    pub h4_trend: Trend,
    pub sentiment: Sentiment,
    pub note: String,
}

impl MarketContext {
    /// Context used when the reference instrument could not be read.
    pub fn unknown(note: impl Into<String>) -> Self {
        Self {
            note: note.into(),
            ..Self::default()
        }
    }
}

// ─── Signal record ────────────────────────────────────────────────────────────

/// What one timeframe looked like at decision time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TimeframeDiagnostics {
    pub timeframe: Timeframe,
    pub bias: Bias,
    pub structure: Structure,
    pub close: f64,
    pub ma_fast: f64,
    pub ma_slow: Option<f64>,
    pub ma_long: Option<f64>,
    pub slope_fast: Slope,
    pub slope_slow: Slope,
    pub crossed_up: bool,
    pub crossed_down: bool,
    pub volume_ratio: f64,
    /// Distance of the close from the fast MA, in percent.
    pub distance_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct FibLevels {
    pub r236: f64,
    pub r382: f64,
    pub r500: f64,
    pub r618: f64,
    pub r786: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ExtensionLevels {
    pub e1272: f64,
    pub e1618: f64,
    pub e2000: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FibReport {
    pub swing_high: f64,
    pub swing_low: f64,
    pub retracement: FibLevels,
    pub extension: ExtensionLevels,
    pub zone_low: f64,
    pub zone_high: f64,
    pub in_zone: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct VolatilityReading {
    pub ratio: f64,
    pub state: VolatilityState,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MarketStats {
    /// Latest funding rate in percent, `None` when unavailable.
    pub funding_rate: Option<f64>,
    /// Open-interest change over the lookback window in percent.
    pub oi_change: Option<f64>,
    pub volatility: VolatilityReading,
}

/// A better-priced entry than market, if one was found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OptimalEntry {
    pub price: f64,
    pub label: String,
    pub risk_reward: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TradeLevels {
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit_1: f64,
    pub take_profit_2: f64,
    pub stop_pct: f64,
    pub tp1_pct: f64,
    pub risk_reward: f64,
    pub optimal_entry: Option<OptimalEntry>,
}

/// The full output of one decision engine evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SignalRecord {
    pub symbol: String,
    pub variant: Variant,
    pub price: f64,
    pub direction: Direction,
    pub confidence: Confidence,
    pub score: u32,
    pub conditions: Vec<String>,
    pub warnings: Vec<String>,
    pub no_trade_zone: bool,
    pub levels: TradeLevels,
    pub checklist: Vec<CheckItem>,
    pub verdict: Verdict,
    pub fast_state: FastState,
    pub fast_note: String,
    pub trend: TimeframeDiagnostics,
    pub confirm: TimeframeDiagnostics,
    pub fast: TimeframeDiagnostics,
    pub fib: FibReport,
    pub market: MarketStats,
    pub context: MarketContext,
    pub timestamp: DateTime<Utc>,
}

impl SignalRecord {
    pub fn is_directional(&self) -> bool {
        self.direction.is_directional()
    }

    /// Directional and at least `min_rr` reward per unit of risk.
    pub fn is_actionable(&self, min_rr: f64) -> bool {
        self.is_directional() && self.levels.risk_reward >= min_rr
    }
}
