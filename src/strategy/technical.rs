//! Technical rule: golden cross + volume expansion + breakout.

use crate::types::{Advice, PriceHistory, StrategyResult};

const NAME: &str = "Technical";

/// Bars needed to compare today against yesterday with a meaningful
/// 20-bar context.
const MIN_BARS: usize = 21;

/// Bars needed before price advice is worth giving (full 60-bar prior
/// high behind the latest bar).
const ADVICE_MIN_BARS: usize = 61;

/// Triggers only when all three hold on the latest bar:
/// ma5 crossed above ma20 since the prior bar, volume exceeds its
/// trailing average by `volume_multiplier`, and close breaks the max
/// close of the preceding 20 bars. The reason reports each
/// sub-condition regardless of the verdict.
pub fn strategy_technical(
    prices: Option<&PriceHistory>,
    volume_multiplier: f64,
) -> StrategyResult {
    let Some(history) = prices else {
        return StrategyResult::skipped(NAME, "insufficient data");
    };
    if history.len() < MIN_BARS {
        return StrategyResult::skipped(NAME, "insufficient data");
    }

    let today = &history.bars[history.len() - 1];
    let yesterday = &history.bars[history.len() - 2];

    let golden_cross = yesterday.ma5 < yesterday.ma20 && today.ma5 > today.ma20;
    let volume_ok = today.volume > today.volume_avg * volume_multiplier;
    let breakout = match history.prior_high(20) {
        Some(high) => today.close > high,
        None => false,
    };

    let triggered = golden_cross && volume_ok && breakout;
    let held = [golden_cross, volume_ok, breakout]
        .iter()
        .filter(|b| **b)
        .count();
    let reason = format!(
        "{held}/3 held: golden cross={golden_cross}, volume expansion={volume_ok}, breakout={breakout}"
    );

    let advice = if triggered {
        build_advice(history)
    } else {
        None
    };

    StrategyResult {
        strategy: NAME,
        triggered,
        reason,
        advice,
    }
}

/// Buy zone between the two averages, stop just under its low edge,
/// targets at the prior 20- and 60-bar highs.
fn build_advice(history: &PriceHistory) -> Option<Advice> {
    if history.len() < ADVICE_MIN_BARS {
        return None;
    }
    let today = history.last()?;
    let (lo, hi) = if today.ma5 <= today.ma20 {
        (today.ma5, today.ma20)
    } else {
        (today.ma20, today.ma5)
    };
    Some(Advice {
        buy_low: lo,
        buy_high: hi,
        stop: (lo * 0.98).max(0.0),
        tp1: history.prior_high(20)?,
        tp2: history.prior_high(60)?,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
