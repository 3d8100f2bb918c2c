use serde::{Deserialize, Serialize};

use crate::position::{Position, PositionUpdate};
use crate::trailing;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    TrailingStop,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExitDecision {
    /// Fields to merge back into the position regardless of `reason`.
    pub update: PositionUpdate,
    pub reason: Option<ExitReason>,
}

/// Fixed take-profit / stop-loss first, then the trailing stop.
pub fn evaluate_exit(position: &Position, price: f64) -> ExitDecision {
    if !position.is_active() {
        return ExitDecision {
            update: PositionUpdate::price(price),
            reason: None,
        };
    }

    let trailing = trailing::evaluate(position, price);
    let entry = position.entry_price;

    let take_profit = position
        .take_profit_pct
        .filter(|tp| *tp > 0.0)
        .is_some_and(|tp| price >= entry * (1.0 + tp / 100.0));
    let stop_loss = position
        .stop_loss_pct
        .filter(|sl| *sl > 0.0)
        .is_some_and(|sl| price <= entry * (1.0 - sl / 100.0));

    let reason = if take_profit {
        Some(ExitReason::TakeProfit)
    } else if stop_loss {
        Some(ExitReason::StopLoss)
    } else if trailing.should_close {
        Some(ExitReason::TrailingStop)
    } else {
        None
    };

    ExitDecision {
        update: trailing.update,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::{sample_position, PositionStatus};

    fn with_limits(tp: Option<f64>, sl: Option<f64>) -> Position {
        Position {
            take_profit_pct: tp,
            stop_loss_pct: sl,
            ..sample_position()
        }
    }

    #[test]
    fn take_profit_and_stop_loss_thresholds() {
        let p = with_limits(Some(100.0), Some(50.0));
        assert_eq!(evaluate_exit(&p, 2.0).reason, Some(ExitReason::TakeProfit));
        assert_eq!(evaluate_exit(&p, 1.99).reason, None);
        assert_eq!(evaluate_exit(&p, 0.5).reason, Some(ExitReason::StopLoss));
        assert_eq!(evaluate_exit(&p, 0.51).reason, None);
    }

    #[test]
    fn unset_or_zero_limits_never_fire() {
        let p = with_limits(None, Some(0.0));
        assert_eq!(evaluate_exit(&p, 1000.0).reason, None);
        assert_eq!(evaluate_exit(&p, 0.0001).reason, None);
    }

    #[test]
    fn trailing_stop_reported_when_fixed_limits_silent() {
        let p = Position {
            trailing_stop_activated: true,
            highest_price: 1.5,
            trailing_stop_price: Some(1.35),
            trailing_stop_distance_pct: Some(10.0),
            trailing_stop_activation_pct: Some(20.0),
            ..with_limits(Some(100.0), Some(50.0))
        };
        let d = evaluate_exit(&p, 1.3);
        assert_eq!(d.reason, Some(ExitReason::TrailingStop));
        assert_eq!(d.update.current_price, Some(1.3));
    }

    #[test]
    fn take_profit_wins_over_trailing_update() {
        let p = Position {
            trailing_stop_distance_pct: Some(10.0),
            trailing_stop_activation_pct: Some(20.0),
            ..with_limits(Some(50.0), None)
        };
        let d = evaluate_exit(&p, 1.6);
        assert_eq!(d.reason, Some(ExitReason::TakeProfit));
        assert_eq!(d.update.trailing_stop_activated, Some(true));
    }

    #[test]
    fn closed_positions_only_track_price() {
        let p = Position {
            status: PositionStatus::Closed,
            ..with_limits(Some(1.0), None)
        };
        let d = evaluate_exit(&p, 5.0);
        assert_eq!(d.reason, None);
        assert_eq!(d.update, PositionUpdate::price(5.0));
    }
}
