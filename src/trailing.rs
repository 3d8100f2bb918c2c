//! Trailing stop state machine.
//!
//! Inactive -> Armed once price reaches `entry * (1 + activation/100)`.
//! While Armed the stop follows the peak at `peak * (1 - distance/100)` and
//! only ever rises. Price at or below the stop is Triggered; the caller closes.
//! Positions without both percentages never leave Inactive.

use crate::position::{Position, PositionUpdate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrailingState {
    Inactive,
    Armed,
    Triggered,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrailingOutcome {
    pub update: PositionUpdate,
    pub should_close: bool,
}

impl TrailingOutcome {
    pub fn state(&self, position: &Position) -> TrailingState {
        if self.should_close {
            TrailingState::Triggered
        } else if self
            .update
            .trailing_stop_activated
            .unwrap_or(position.trailing_stop_activated)
        {
            TrailingState::Armed
        } else {
            TrailingState::Inactive
        }
    }
}

/// Distance and activation, when the position opted in with sane values.
fn params(position: &Position) -> Option<(f64, f64)> {
    let distance = position.trailing_stop_distance_pct?;
    let activation = position.trailing_stop_activation_pct?;
    (distance > 0.0 && distance < 100.0 && activation >= 0.0).then_some((distance, activation))
}

pub fn evaluate(position: &Position, current_price: f64) -> TrailingOutcome {
    let mut update = PositionUpdate::price(current_price);

    let Some((distance, activation)) = params(position) else {
        return TrailingOutcome {
            update,
            should_close: false,
        };
    };
    let keep = 1.0 - distance / 100.0;

    if !position.trailing_stop_activated {
        let threshold = position.entry_price * (1.0 + activation / 100.0);
        if current_price >= threshold {
            update.trailing_stop_activated = Some(true);
            update.highest_price = Some(current_price.max(position.highest_price));
            update.trailing_stop_price = Some(current_price * keep);
        }
        return TrailingOutcome {
            update,
            should_close: false,
        };
    }

    let mut stop = match position.trailing_stop_price {
        Some(stop) => stop,
        None => {
            let stop = position.highest_price * keep;
            update.trailing_stop_price = Some(stop);
            stop
        }
    };
    if current_price > position.highest_price {
        stop = current_price * keep;
        update.highest_price = Some(current_price);
        update.trailing_stop_price = Some(stop);
    }

    TrailingOutcome {
        update,
        should_close: current_price <= stop,
    }
}
