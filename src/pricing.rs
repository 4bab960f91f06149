//! Margin / profit / price resolution
//!
//! The three pricing fields are tied together by
//! `price = cost + profit` and `margin = profit / price × 100`.
//! Whichever field the user edited last drives the other two.

use serde::{Deserialize, Serialize};

use crate::error::{ensure_non_negative, CostError, CostResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrivingField {
    #[default]
    Margin,
    Profit,
    Price,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceTriple {
    pub margin_percent: f64,
    pub profit: f64,
    pub selling_price: f64,
}

impl PriceTriple {
    pub fn from_margin(margin_percent: f64) -> Self {
        PriceTriple {
            margin_percent,
            ..Default::default()
        }
    }

    pub fn from_profit(profit: f64) -> Self {
        PriceTriple {
            profit,
            ..Default::default()
        }
    }

    pub fn from_price(selling_price: f64) -> Self {
        PriceTriple {
            selling_price,
            ..Default::default()
        }
    }
}

fn margin_of(profit: f64, price: f64) -> f64 {
    if price > 0.0 { profit / price * 100.0 } else { 0.0 }
}

/// Recompute the two derived fields from `unit_cost` and the driving one.
///
/// With no positive unit cost there is no valid price yet, so `current`
/// comes back unchanged. A driving margin of 100% or more has no finite
/// price and is rejected, as is any driving value that leads to a
/// negative or non-finite price.
pub fn resolve(unit_cost: f64, driving: DrivingField, current: PriceTriple) -> CostResult<PriceTriple> {
    match driving {
        DrivingField::Margin => {}
        DrivingField::Profit if !current.profit.is_finite() => {
            return Err(CostError::NonFinite {
                field: "profit".to_string(),
            });
        }
        DrivingField::Profit => {}
        DrivingField::Price => ensure_non_negative("selling price", current.selling_price)?,
    }
    if unit_cost.is_nan() || unit_cost <= 0.0 {
        return Ok(current);
    }

    let resolved = match driving {
        DrivingField::Margin => {
            let margin = current.margin_percent;
            if !margin.is_finite() || margin >= 100.0 {
                return Err(CostError::MarginOutOfRange(margin));
            }
            let price = unit_cost / (1.0 - margin / 100.0);
            PriceTriple {
                margin_percent: margin,
                profit: price - unit_cost,
                selling_price: price,
            }
        }
        DrivingField::Profit => {
            let price = unit_cost + current.profit;
            ensure_non_negative("selling price", price)?;
            PriceTriple {
                margin_percent: margin_of(current.profit, price),
                profit: current.profit,
                selling_price: price,
            }
        }
        DrivingField::Price => {
            let price = current.selling_price;
            let profit = price - unit_cost;
            PriceTriple {
                margin_percent: margin_of(profit, price),
                profit,
                selling_price: price,
            }
        }
    };

    Ok(resolved)
}
