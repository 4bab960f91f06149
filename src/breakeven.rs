//! Break-even analysis
//!
//! Two different questions, kept apart on purpose:
//! - [`job_break_even`] projects forward from planned pricing: how many
//!   copies until a job's fixed costs are paid back.
//! - [`equipment_recovery`] reports actuals: how much of a printer's price
//!   the recorded sales have already earned back.

use std::fmt;

use serde::Serialize;

use crate::models::{EquipmentInstance, EquipmentProfile, JobSnapshot};

/// A unit count that may never be reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum BreakEven {
    Units(u64),
    /// Every sale loses money while fixed costs remain
    Unreachable,
}

impl BreakEven {
    pub fn units(&self) -> Option<u64> {
        match self {
            BreakEven::Units(n) => Some(*n),
            BreakEven::Unreachable => None,
        }
    }
}

impl fmt::Display for BreakEven {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakEven::Units(n) => write!(f, "{n}"),
            BreakEven::Unreachable => write!(f, "not achievable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobBreakEven {
    pub fixed_costs_total: f64,
    pub profit_per_unit: f64,
    pub break_even_units: BreakEven,
    pub remaining_units: BreakEven,
    /// Fixed costs plus the unit cost of every copy needed to break even
    pub total_investment: Option<f64>,
    /// Gross from the copies sold so far
    pub revenue_earned: f64,
    pub is_recovered: bool,
}

/// Copies needed to pay back `fixed_costs_total` at the given price
pub fn break_even_units(fixed_costs_total: f64, unit_cost: f64, selling_price: f64) -> BreakEven {
    let profit_per_unit = selling_price - unit_cost;
    if fixed_costs_total <= 0.0 {
        BreakEven::Units(0)
    } else if profit_per_unit > 0.0 {
        BreakEven::Units((fixed_costs_total / profit_per_unit).ceil() as u64)
    } else {
        BreakEven::Unreachable
    }
}

pub fn job_break_even(
    fixed_costs_total: f64,
    unit_cost: f64,
    selling_price: f64,
    units_sold: u32,
) -> JobBreakEven {
    let break_even = break_even_units(fixed_costs_total, unit_cost, selling_price);
    let sold = u64::from(units_sold);

    let remaining_units = match break_even {
        BreakEven::Units(n) => BreakEven::Units(n.saturating_sub(sold)),
        BreakEven::Unreachable => BreakEven::Unreachable,
    };

    JobBreakEven {
        fixed_costs_total,
        profit_per_unit: selling_price - unit_cost,
        break_even_units: break_even,
        remaining_units,
        total_investment: break_even
            .units()
            .map(|n| fixed_costs_total + unit_cost * n as f64),
        revenue_earned: selling_price * f64::from(units_sold),
        is_recovered: remaining_units == BreakEven::Units(0),
    }
}

/// Break-even of a saved job, from its frozen costs
pub fn for_job(job: &JobSnapshot) -> JobBreakEven {
    job_break_even(job.fixed_costs, job.unit_cost, job.selling_price, job.units_sold)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquipmentRecovery {
    pub instance_id: String,
    pub purchase_price: f64,
    pub realized_profit: f64,
    pub recovery_percent: f64,
    pub remaining_to_recover: f64,
    pub job_count: usize,
    pub units_sold: u64,
}

/// How much of an instance's purchase price recorded sales have earned back.
///
/// Only jobs printed on `instance` are counted; others in `jobs` are ignored.
pub fn equipment_recovery(
    instance: &EquipmentInstance,
    profile: Option<&EquipmentProfile>,
    jobs: &[JobSnapshot],
) -> EquipmentRecovery {
    let purchase_price = instance.purchase_price(profile);

    let mut realized_profit = 0.0;
    let mut job_count = 0;
    let mut units_sold = 0_u64;
    for job in jobs
        .iter()
        .filter(|j| j.inputs.instance_id.as_deref() == Some(instance.id.as_str()))
    {
        realized_profit += (job.selling_price - job.unit_cost) * job.units_sold as f64;
        units_sold += u64::from(job.units_sold);
        job_count += 1;
    }

    let recovery_percent = if purchase_price > 0.0 {
        realized_profit / purchase_price * 100.0
    } else {
        0.0
    };

    EquipmentRecovery {
        instance_id: instance.id.clone(),
        purchase_price,
        realized_profit,
        recovery_percent,
        remaining_to_recover: (purchase_price - realized_profit).max(0.0),
        job_count,
        units_sold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobInputs;
    use chrono::Utc;

    fn job(id: &str, instance: &str, unit_cost: f64, price: f64, sold: u32) -> JobSnapshot {
        let now = Utc::now();
        JobSnapshot {
            id: id.to_string(),
            name: id.to_string(),
            created_at: now,
            updated_at: now,
            inputs: JobInputs {
                instance_id: Some(instance.to_string()),
                ..Default::default()
            },
            unit_cost,
            fixed_costs: 0.0,
            selling_price: price,
            units_sold: sold,
            notes: None,
        }
    }

    fn instance(price: Option<f64>) -> EquipmentInstance {
        EquipmentInstance {
            id: "office".to_string(),
            profile_id: "a1-mini".to_string(),
            nickname: "Office".to_string(),
            usage_hours: 0.0,
            actual_purchase_price: price,
            recovery_months: None,
            monthly_usage_hours: None,
            notes: None,
        }
    }

    #[test]
    fn rounds_up_to_whole_copies() {
        assert_eq!(break_even_units(100.0, 4.0, 10.0), BreakEven::Units(17));
    }

    #[test]
    fn losing_money_never_breaks_even() {
        assert_eq!(break_even_units(50.0, 5.0, 4.0), BreakEven::Unreachable);
        assert_eq!(break_even_units(50.0, 5.0, 5.0), BreakEven::Unreachable);
    }

    #[test]
    fn nothing_to_recover() {
        assert_eq!(break_even_units(0.0, 5.0, 4.0), BreakEven::Units(0));
        let result = job_break_even(0.0, 5.0, 4.0, 0);
        assert!(result.is_recovered);
    }

    #[test]
    fn higher_price_never_needs_more_copies() {
        let mut previous = BreakEven::Unreachable;
        for cents in (300..2000).step_by(7) {
            let current = break_even_units(100.0, 4.0, cents as f64 / 100.0);
            assert!(current <= previous, "{current:?} > {previous:?}");
            previous = current;
        }
    }

    #[test]
    fn remaining_units_floor_at_zero() {
        let partway = job_break_even(100.0, 4.0, 10.0, 5);
        assert_eq!(partway.remaining_units, BreakEven::Units(12));
        assert!(!partway.is_recovered);
        assert_eq!(partway.total_investment, Some(100.0 + 4.0 * 17.0));
        assert_eq!(partway.revenue_earned, 50.0);

        let done = job_break_even(100.0, 4.0, 10.0, 40);
        assert_eq!(done.remaining_units, BreakEven::Units(0));
        assert!(done.is_recovered);

        let hopeless = job_break_even(50.0, 5.0, 4.0, 3);
        assert_eq!(hopeless.remaining_units, BreakEven::Unreachable);
        assert_eq!(hopeless.total_investment, None);
    }

    #[test]
    fn recovery_counts_only_this_printer() {
        let jobs = vec![
            job("vase", "office", 2.0, 10.0, 10),
            job("hook", "office", 1.0, 3.0, 5),
            job("gear", "garage", 1.0, 50.0, 100),
        ];

        let recovery = equipment_recovery(&instance(Some(400.0)), None, &jobs);
        assert!((recovery.realized_profit - 90.0).abs() < 1e-9);
        assert!((recovery.recovery_percent - 22.5).abs() < 1e-9);
        assert!((recovery.remaining_to_recover - 310.0).abs() < 1e-9);
        assert_eq!(recovery.job_count, 2);
        assert_eq!(recovery.units_sold, 15);
    }

    #[test]
    fn recovery_with_unknown_price() {
        let jobs = vec![job("vase", "office", 2.0, 10.0, 10)];
        let recovery = equipment_recovery(&instance(None), None, &jobs);
        assert_eq!(recovery.recovery_percent, 0.0);
        assert_eq!(recovery.remaining_to_recover, 0.0);
    }

    #[test]
    fn recovery_uses_profile_price_and_caps_remaining() {
        let profile = EquipmentProfile {
            purchase_price: 50.0,
            expected_lifespan_hours: 5000.0,
            power_watts: 70.0,
            tool_cost: 8.0,
            tool_lifespan_cm3: 15000.0,
        };
        let jobs = vec![job("vase", "office", 2.0, 10.0, 10)];
        let recovery = equipment_recovery(&instance(None), Some(&profile), &jobs);
        assert!((recovery.recovery_percent - 160.0).abs() < 1e-9);
        assert_eq!(recovery.remaining_to_recover, 0.0);
    }
}
