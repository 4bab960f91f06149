//! Cost decomposition of a single print job
//!
//! Splits a job into per-unit costs (charged on every copy) and fixed costs
//! (recovered across a sales volume), then inflates the per-unit part by
//! the expected failure rate.

use tracing::{debug, warn};

use crate::catalog::{usage_cost, Catalog};
use crate::config::Settings;
use crate::error::{ensure_non_negative, CostError, CostResult};
use crate::models::{CostBreakdown, JobInputs, ShippingSelection};

/// Reject input that would produce a meaningless number
pub fn validate(inputs: &JobInputs, settings: &Settings) -> CostResult<()> {
    if !inputs.failure_rate.is_finite() || !(0.0..100.0).contains(&inputs.failure_rate) {
        return Err(CostError::FailureRateOutOfRange(inputs.failure_rate));
    }

    ensure_non_negative("material grams", inputs.material_grams)?;
    ensure_non_negative("print hours", inputs.print_hours)?;
    ensure_non_negative("prep minutes", inputs.prep_minutes)?;
    ensure_non_negative("post-processing minutes", inputs.post_process_minutes)?;
    ensure_non_negative("licensing cost", inputs.licensing.cost)?;

    if let Some(price) = inputs.material.as_ref().and_then(|m| m.price_per_gram_override) {
        ensure_non_negative("price per gram", price)?;
    }
    if let Some(min) = inputs.author_min_price {
        ensure_non_negative("author minimum price", min)?;
    }
    for usage in &inputs.consumables {
        ensure_non_negative(&format!("quantity of {}", usage.asset_id), usage.quantity)?;
    }
    validate_shipping(&inputs.shipping)?;

    ensure_non_negative("energy price", settings.energy_price_per_kwh)?;
    ensure_non_negative("labor rate", settings.labor_hourly_rate)?;
    Ok(())
}

/// Shipping choices are checked the same way for quotes and for sales
pub fn validate_shipping(selection: &ShippingSelection) -> CostResult<()> {
    ensure_non_negative("dropoff distance", selection.distance_km)?;
    if let Some(cost) = selection.override_cost {
        ensure_non_negative("shipping cost", cost)?;
    }
    for usage in &selection.packaging {
        ensure_non_negative(&format!("quantity of {}", usage.asset_id), usage.quantity)?;
    }
    Ok(())
}

/// `1 / (1 − rate/100)`; rates of 100% or more are rejected
pub fn failure_multiplier(failure_rate: f64) -> CostResult<f64> {
    if !failure_rate.is_finite() || !(0.0..100.0).contains(&failure_rate) {
        return Err(CostError::FailureRateOutOfRange(failure_rate));
    }
    Ok(1.0 / (1.0 - failure_rate / 100.0))
}

/// Break a job down into line items.
///
/// Never fails: references the catalog cannot resolve simply cost 0.
/// `failure_adjusted_subtotal` is left equal to the raw subtotal; see
/// [`apply_failure_rate`].
pub fn decompose<C: Catalog + ?Sized>(
    inputs: &JobInputs,
    catalog: &C,
    settings: &Settings,
) -> CostBreakdown {
    let grams = inputs.material_grams;
    let hours = inputs.print_hours;

    let price_per_gram = inputs
        .material
        .as_ref()
        .map(|m| {
            m.price_per_gram_override
                .unwrap_or_else(|| catalog.unit_cost(&m.asset_id))
        })
        .unwrap_or(0.0);
    let material = if price_per_gram > 0.0 {
        grams * price_per_gram
    } else {
        0.0
    };

    let instance = inputs.instance_id.as_deref().and_then(|id| {
        let found = catalog.instance(id);
        if found.is_none() {
            warn!(instance_id = id, "equipment instance not found, machine costs are 0");
        }
        found
    });
    let profile = instance.and_then(|i| catalog.profile_for(i));

    let energy = profile
        .map(|p| p.power_watts / 1000.0 * hours * settings.energy_price_per_kwh)
        .unwrap_or(0.0);

    let depreciation = instance
        .map(|i| i.depreciation_per_hour(profile) * hours)
        .unwrap_or(0.0);

    let tool_wear = match profile {
        Some(p) if p.tool_lifespan_cm3 > 0.0 && settings.material_density > 0.0 => {
            let volume_cm3 = grams / settings.material_density;
            volume_cm3 / p.tool_lifespan_cm3 * p.tool_cost
        }
        _ => 0.0,
    };

    let consumables = usage_cost(&inputs.consumables, catalog);

    let labor_minutes = inputs.prep_minutes + inputs.post_process_minutes;
    let labor = labor_minutes / 60.0 * settings.labor_hourly_rate;

    let (per_unit_licensing, fixed_licensing) = if inputs.licensing.per_unit {
        (inputs.licensing.cost, 0.0)
    } else {
        (0.0, inputs.licensing.cost)
    };

    let per_unit_subtotal = material + energy + consumables + labor + per_unit_licensing;

    debug!(
        material,
        energy,
        consumables,
        labor,
        depreciation,
        tool_wear,
        per_unit_subtotal,
        "decomposed job cost"
    );

    CostBreakdown {
        material,
        energy,
        consumables,
        labor,
        per_unit_licensing,
        depreciation,
        tool_wear,
        fixed_licensing,
        per_unit_subtotal,
        failure_adjusted_subtotal: per_unit_subtotal,
    }
}

/// Inflate the per-unit subtotal to pay for the prints that fail
pub fn apply_failure_rate(breakdown: &mut CostBreakdown, failure_rate: f64) -> CostResult<()> {
    breakdown.failure_adjusted_subtotal =
        breakdown.per_unit_subtotal * failure_multiplier(failure_rate)?;
    Ok(())
}

/// Validate, decompose and failure-adjust in one go
pub fn breakdown<C: Catalog + ?Sized>(
    inputs: &JobInputs,
    catalog: &C,
    settings: &Settings,
) -> CostResult<CostBreakdown> {
    validate(inputs, settings)?;
    let mut breakdown = decompose(inputs, catalog, settings);
    apply_failure_rate(&mut breakdown, inputs.failure_rate)?;
    Ok(breakdown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::models::{
        Asset, AssetCategory, AssetSpec, Consumable, EquipmentInstance, EquipmentProfile,
        Licensing, MaterialSelection, UsageEntry,
    };

    const EPS: f64 = 1e-9;

    fn asset(id: &str, category: AssetCategory, spec: AssetSpec) -> Asset {
        Asset {
            id: id.to_string(),
            name: id.to_string(),
            category,
            brand: None,
            notes: None,
            spec,
        }
    }

    fn test_catalog() -> MemoryCatalog {
        let mut catalog = MemoryCatalog::default();
        catalog.insert_asset(asset(
            "pla-basic",
            AssetCategory::Filament,
            AssetSpec::Consumable(Consumable::from_package("g", 25.0, 1000.0)),
        ));
        catalog.insert_asset(asset(
            "glue-stick",
            AssetCategory::Consumable,
            AssetSpec::Consumable(Consumable::from_package("use", 4.0, 20.0)),
        ));
        catalog.insert_asset(asset(
            "printer-100w",
            AssetCategory::Printer,
            AssetSpec::Equipment(EquipmentProfile {
                purchase_price: 480.0,
                expected_lifespan_hours: 5000.0,
                power_watts: 100.0,
                tool_cost: 10.0,
                tool_lifespan_cm3: 15000.0,
            }),
        ));
        catalog.insert_instance(EquipmentInstance {
            id: "office".to_string(),
            profile_id: "printer-100w".to_string(),
            nickname: "Office".to_string(),
            usage_hours: 0.0,
            actual_purchase_price: None,
            recovery_months: Some(12.0),
            monthly_usage_hours: Some(40.0),
            notes: None,
        });
        catalog
    }

    fn example_job() -> JobInputs {
        JobInputs {
            material: Some(MaterialSelection {
                asset_id: "pla-basic".to_string(),
                price_per_gram_override: None,
            }),
            material_grams: 20.0,
            print_hours: 3.0,
            instance_id: Some("office".to_string()),
            failure_rate: 5.0,
            ..Default::default()
        }
    }

    #[test]
    fn worked_example() {
        let catalog = test_catalog();
        let settings = Settings {
            labor_hourly_rate: 0.0,
            ..Default::default()
        };

        let b = breakdown(&example_job(), &catalog, &settings).unwrap();
        assert!((b.material - 0.50).abs() < EPS);
        assert!((b.energy - 0.036).abs() < EPS);
        assert!((b.per_unit_subtotal - 0.536).abs() < EPS);
        assert!((b.failure_adjusted_subtotal - 0.536 / 0.95).abs() < EPS);
    }

    #[test]
    fn machine_costs_stay_out_of_the_unit_subtotal() {
        let catalog = test_catalog();
        let settings = Settings::default();
        let mut job = example_job();
        job.prep_minutes = 10.0;
        job.post_process_minutes = 20.0;
        job.consumables = vec![UsageEntry::new("glue-stick", 1.0)];

        let b = decompose(&job, &catalog, &settings);

        // 480 / (12 × 40) = 1.0 per hour
        assert!((b.depreciation - 3.0).abs() < EPS);
        assert!((b.tool_wear - 20.0 / 1.24 / 15000.0 * 10.0).abs() < EPS);
        assert!((b.labor - 7.5).abs() < EPS);
        assert!((b.consumables - 0.2).abs() < EPS);

        let per_unit = b.material + b.energy + b.consumables + b.labor + b.per_unit_licensing;
        assert!((b.per_unit_subtotal - per_unit).abs() < EPS);
        assert!((b.fixed_costs_total() - (b.depreciation + b.tool_wear)).abs() < EPS);
    }

    #[test]
    fn licensing_lands_on_exactly_one_side() {
        let catalog = test_catalog();
        let settings = Settings::default();
        let mut job = example_job();

        job.licensing = Licensing { cost: 12.0, per_unit: false };
        let amortized = decompose(&job, &catalog, &settings);
        assert_eq!(amortized.per_unit_licensing, 0.0);
        assert_eq!(amortized.fixed_licensing, 12.0);

        job.licensing.per_unit = true;
        let per_unit = decompose(&job, &catalog, &settings);
        assert_eq!(per_unit.per_unit_licensing, 12.0);
        assert_eq!(per_unit.fixed_licensing, 0.0);
        assert!((per_unit.per_unit_subtotal - amortized.per_unit_subtotal - 12.0).abs() < EPS);
    }

    #[test]
    fn price_override_and_missing_material() {
        let catalog = test_catalog();
        let settings = Settings::default();
        let mut job = example_job();

        job.material.as_mut().unwrap().price_per_gram_override = Some(0.05);
        assert!((decompose(&job, &catalog, &settings).material - 1.0).abs() < EPS);

        job.material = Some(MaterialSelection {
            asset_id: "discontinued".to_string(),
            price_per_gram_override: None,
        });
        assert_eq!(decompose(&job, &catalog, &settings).material, 0.0);

        job.material = None;
        assert_eq!(decompose(&job, &catalog, &settings).material, 0.0);
    }

    #[test]
    fn missing_instance_zeroes_machine_costs_only() {
        let catalog = test_catalog();
        let settings = Settings::default();
        let mut job = example_job();
        job.instance_id = Some("sold-printer".to_string());

        let b = decompose(&job, &catalog, &settings);
        assert_eq!(b.energy, 0.0);
        assert_eq!(b.depreciation, 0.0);
        assert_eq!(b.tool_wear, 0.0);
        assert!((b.material - 0.5).abs() < EPS);
    }

    #[test]
    fn unconfigured_recovery_plan_means_no_depreciation() {
        let mut catalog = test_catalog();
        catalog.insert_instance(EquipmentInstance {
            id: "garage".to_string(),
            profile_id: "printer-100w".to_string(),
            nickname: "Garage".to_string(),
            usage_hours: 0.0,
            actual_purchase_price: Some(350.0),
            recovery_months: Some(0.0),
            monthly_usage_hours: Some(40.0),
            notes: None,
        });
        let mut job = example_job();
        job.instance_id = Some("garage".to_string());

        let b = decompose(&job, &catalog, &Settings::default());
        assert_eq!(b.depreciation, 0.0);
        assert!(b.energy > 0.0);
    }

    #[test]
    fn failure_adjustment_never_lowers_cost() {
        for rate in [0.0, 1.0, 5.0, 33.3, 50.0, 99.9] {
            let multiplier = failure_multiplier(rate).unwrap();
            if rate == 0.0 {
                assert_eq!(multiplier, 1.0);
            } else {
                assert!(multiplier > 1.0);
            }
        }
    }

    #[test]
    fn impossible_failure_rates_are_rejected() {
        let catalog = test_catalog();
        let settings = Settings::default();
        for rate in [100.0, 150.0, -1.0, f64::NAN] {
            let mut job = example_job();
            job.failure_rate = rate;
            assert!(matches!(
                breakdown(&job, &catalog, &settings),
                Err(CostError::FailureRateOutOfRange(_))
            ));
        }
    }

    #[test]
    fn negative_quantities_are_rejected() {
        let catalog = test_catalog();
        let settings = Settings::default();
        let mut job = example_job();
        job.consumables = vec![UsageEntry::new("glue-stick", -2.0)];

        let err = breakdown(&job, &catalog, &settings).unwrap_err();
        assert!(matches!(err, CostError::NegativeValue { .. }));

        let mut job = example_job();
        job.material_grams = -5.0;
        assert!(breakdown(&job, &catalog, &settings).is_err());
    }

    #[test]
    fn inputs_are_left_untouched() {
        let catalog = test_catalog();
        let job = example_job();
        let before = job.clone();
        let _ = breakdown(&job, &catalog, &Settings::default()).unwrap();
        assert_eq!(job, before);
    }
}
