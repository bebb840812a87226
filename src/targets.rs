//! ATR-derived take-profit / stop-loss suggestions

use serde::{Deserialize, Serialize};

use crate::config::AssetTuning;
use crate::Direction;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceTargets {
    pub take_profit: f64,
    pub stop_loss: f64,
    pub expected_move_pct: f64,
    pub risk_pct: f64,
    /// expected_move_pct / risk_pct, 0 when there is no risk
    pub risk_reward: f64,
}

/// TP = price ± atr × tp_mult, SL = price ∓ atr × sl_mult
pub fn price_targets(
    current_price: f64,
    atr: f64,
    direction: Direction,
    tuning: &AssetTuning,
) -> PriceTargets {
    let (tp_mult, sl_mult) = (tuning.tp_atr_multiplier, tuning.sl_atr_multiplier);
    let atr = atr.max(0.0);

    let (take_profit, stop_loss) = match direction {
        Direction::Buy => (current_price + atr * tp_mult, current_price - atr * sl_mult),
        Direction::Sell => (current_price - atr * tp_mult, current_price + atr * sl_mult),
    };

    if current_price <= 0.0 {
        return PriceTargets {
            take_profit,
            stop_loss,
            ..PriceTargets::default()
        };
    }

    let expected_move_pct = (take_profit - current_price).abs() / current_price * 100.0;
    let risk_pct = (current_price - stop_loss).abs() / current_price * 100.0;
    let risk_reward = if risk_pct > 0.0 {
        expected_move_pct / risk_pct
    } else {
        0.0
    };

    PriceTargets {
        take_profit,
        stop_loss,
        expected_move_pct,
        risk_pct,
        risk_reward,
    }
}
