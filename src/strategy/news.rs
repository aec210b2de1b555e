//! News rule: strong positive sentiment among linked items.

use crate::types::{NewsItem, Sentiment, StrategyResult};

const NAME: &str = "News";

/// Triggers when the best positive-labelled item's sentiment score
/// reaches the threshold. Weighted scores rank the feed; the raw
/// sentiment confidence decides the trigger.
pub fn strategy_news(items: &[NewsItem], positive_threshold: f64) -> StrategyResult {
    if items.is_empty() {
        return StrategyResult::skipped(NAME, "insufficient data");
    }

    let best = items
        .iter()
        .filter(|n| n.sentiment == Sentiment::Positive)
        .map(|n| n.sentiment_score)
        .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |a| a.max(s))));

    let Some(best) = best else {
        return StrategyResult::skipped(NAME, "no positive coverage");
    };

    let triggered = best >= positive_threshold;
    StrategyResult {
        strategy: NAME,
        triggered,
        reason: format!("best positive score {best:.2} (threshold {positive_threshold:.2})"),
        advice: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(sentiment: Sentiment, score: f64) -> NewsItem {
        let mut n = NewsItem::raw("t", "b", "", "鉅亨網", "");
        n.sentiment = sentiment;
        n.sentiment_score = score;
        n
    }

    #[test]
    fn test_triggers_at_threshold() {
        let items = vec![item(Sentiment::Positive, 0.82)];
        assert!(strategy_news(&items, 0.80).triggered);
    }

    #[test]
    fn test_below_threshold_not_triggered() {
        let items = vec![item(Sentiment::Positive, 0.79)];
        let r = strategy_news(&items, 0.80);
        assert!(!r.triggered);
        assert!(r.reason.contains("0.79"));
    }

    #[test]
    fn test_negative_items_ignored() {
        // A screaming negative never counts toward the trigger.
        let items = vec![item(Sentiment::Negative, 0.99), item(Sentiment::Positive, 0.6)];
        let r = strategy_news(&items, 0.80);
        assert!(!r.triggered);
        assert!(r.reason.contains("0.60"));
    }

    #[test]
    fn test_no_items_or_no_positive() {
        assert_eq!(strategy_news(&[], 0.80).reason, "insufficient data");
        let items = vec![item(Sentiment::Neutral, 0.5)];
        assert_eq!(strategy_news(&items, 0.80).reason, "no positive coverage");
    }
}
