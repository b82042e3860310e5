//! Technical signals derived from daily closes

use super::{PriceBar, SignalDirection, TechnicalSignal};
use crate::error::{ContextError, Result};
use ta::Next;
use ta::indicators::{MovingAverageConvergenceDivergence, RelativeStrengthIndex, SimpleMovingAverage};

const RSI_PERIOD: usize = 14;
const SMA_FAST: usize = 20;
const SMA_SLOW: usize = 50;
const MACD_FAST: usize = 12;
const MACD_SLOW: usize = 26;
const MACD_SIGNAL: usize = 9;

/// RSI, SMA trend and MACD signals for a price series.
///
/// Indicators that need more bars than the series has are skipped.
pub fn compute_signals(bars: &[PriceBar]) -> Result<Vec<TechnicalSignal>> {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).filter(|c| c.is_finite()).collect();
    let mut signals = Vec::new();

    if closes.len() > RSI_PERIOD {
        signals.push(rsi_signal(&closes)?);
    }
    if closes.len() >= SMA_SLOW {
        signals.push(sma_signal(&closes)?);
    }
    if closes.len() >= MACD_SLOW + MACD_SIGNAL {
        signals.push(macd_signal(&closes)?);
    }

    Ok(signals)
}

fn indicator_error(e: impl std::fmt::Display) -> ContextError {
    ContextError::Indicator(e.to_string())
}

fn rsi_signal(closes: &[f64]) -> Result<TechnicalSignal> {
    let mut rsi = RelativeStrengthIndex::new(RSI_PERIOD).map_err(indicator_error)?;
    let value = closes.iter().fold(50.0, |_, &close| rsi.next(close));

    let (direction, strength, description) = if value > 70.0 {
        (
            SignalDirection::Bearish,
            0.5 + (value - 70.0) / 60.0,
            format!("RSI {value:.1} is overbought"),
        )
    } else if value < 30.0 {
        (
            SignalDirection::Bullish,
            0.5 + (30.0 - value) / 60.0,
            format!("RSI {value:.1} is oversold"),
        )
    } else {
        (
            SignalDirection::Neutral,
            (value - 50.0).abs() / 40.0,
            format!("RSI {value:.1} is in the neutral range"),
        )
    };

    Ok(TechnicalSignal {
        indicator: "RSI".to_string(),
        direction,
        strength: strength.clamp(0.0, 1.0),
        value,
        description,
    })
}

fn sma_signal(closes: &[f64]) -> Result<TechnicalSignal> {
    let mut fast = SimpleMovingAverage::new(SMA_FAST).map_err(indicator_error)?;
    let mut slow = SimpleMovingAverage::new(SMA_SLOW).map_err(indicator_error)?;
    let (fast_value, slow_value) = closes
        .iter()
        .fold((0.0, 0.0), |_, &close| (fast.next(close), slow.next(close)));

    let spread = if slow_value.abs() > f64::EPSILON {
        (fast_value - slow_value) / slow_value
    } else {
        0.0
    };
    let direction = if spread > 0.0 {
        SignalDirection::Bullish
    } else if spread < 0.0 {
        SignalDirection::Bearish
    } else {
        SignalDirection::Neutral
    };

    Ok(TechnicalSignal {
        indicator: "SMA 20/50".to_string(),
        direction,
        // a 10% gap between the averages is a full-strength trend
        strength: (spread.abs() * 10.0).clamp(0.0, 1.0),
        value: fast_value,
        description: format!(
            "SMA20 {fast_value:.2} is {} SMA50 {slow_value:.2}",
            if spread >= 0.0 { "above" } else { "below" }
        ),
    })
}

fn macd_signal(closes: &[f64]) -> Result<TechnicalSignal> {
    let mut macd = MovingAverageConvergenceDivergence::new(MACD_FAST, MACD_SLOW, MACD_SIGNAL)
        .map_err(indicator_error)?;
    let mut last = None;
    for &close in closes {
        last = Some(macd.next(close));
    }
    let Some(output) = last else {
        return Err(ContextError::Indicator("no closes for MACD".to_string()));
    };

    let direction = if output.histogram > 0.0 {
        SignalDirection::Bullish
    } else if output.histogram < 0.0 {
        SignalDirection::Bearish
    } else {
        SignalDirection::Neutral
    };
    let scale = output.macd.abs().max(output.signal.abs());
    let strength = if scale > f64::EPSILON {
        output.histogram.abs() / scale
    } else {
        0.0
    };

    Ok(TechnicalSignal {
        indicator: "MACD".to_string(),
        direction,
        strength: strength.clamp(0.0, 1.0),
        value: output.macd,
        description: format!(
            "MACD {:.3} vs signal {:.3} (histogram {:.3})",
            output.macd, output.signal, output.histogram
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn bars(closes: impl IntoIterator<Item = f64>) -> Vec<PriceBar> {
        let start = Utc::now() - Duration::days(200);
        closes
            .into_iter()
            .enumerate()
            .map(|(i, close)| PriceBar {
                timestamp: start + Duration::days(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1_000,
            })
            .collect()
    }

    #[test]
    fn test_short_series_yields_nothing() {
        let signals = compute_signals(&bars((0..10).map(f64::from))).unwrap();
        assert!(signals.is_empty());
    }

    #[test]
    fn test_steady_uptrend() {
        let signals = compute_signals(&bars((0..80).map(|i| 100.0 + f64::from(i)))).unwrap();
        assert_eq!(signals.len(), 3);

        let rsi = signals.iter().find(|s| s.indicator == "RSI").unwrap();
        assert_eq!(rsi.direction, SignalDirection::Bearish);
        assert!(rsi.value > 70.0);

        let sma = signals.iter().find(|s| s.indicator == "SMA 20/50").unwrap();
        assert_eq!(sma.direction, SignalDirection::Bullish);

        for signal in &signals {
            assert!((0.0..=1.0).contains(&signal.strength));
        }
    }

    #[test]
    fn test_steady_downtrend() {
        let signals = compute_signals(&bars((0..80).map(|i| 200.0 - f64::from(i)))).unwrap();
        let rsi = signals.iter().find(|s| s.indicator == "RSI").unwrap();
        assert_eq!(rsi.direction, SignalDirection::Bullish);
        let sma = signals.iter().find(|s| s.indicator == "SMA 20/50").unwrap();
        assert_eq!(sma.direction, SignalDirection::Bearish);
    }
}
