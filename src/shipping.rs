//! Shipping cost resolution

use serde::Serialize;
use tracing::{debug, warn};

use crate::catalog::{usage_cost, Catalog};
use crate::config::ShippingConfig;
use crate::models::{ShippingMethod, ShippingSelection};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ShippingCost {
    /// Carrier rate, fuel, or the override
    pub delivery: f64,
    pub packaging: f64,
    pub total: f64,
    /// Dropoff distance is beyond the configured delivery radius
    pub exceeds_radius: bool,
}

/// Fuel for a round trip to the buyer
pub fn dropoff_cost(distance_km: f64, config: &ShippingConfig) -> f64 {
    let round_trip_km = distance_km * 2.0;
    let liters = round_trip_km / 100.0 * config.fuel_efficiency;
    liters * config.fuel_price_per_liter
}

/// Cost of getting one unit to the buyer, packaging excluded
pub fn delivery_cost(selection: &ShippingSelection, config: &ShippingConfig) -> f64 {
    if let Some(cost) = selection.override_cost {
        return cost;
    }

    match &selection.method {
        ShippingMethod::LocalPickup => 0.0,
        ShippingMethod::Dropoff => dropoff_cost(selection.distance_km, config),
        ShippingMethod::Carrier(carrier) => config.carrier_rates.get(*carrier),
        ShippingMethod::Custom(id) => config
            .custom_carriers
            .iter()
            .find(|c| c.id == *id)
            .map(|c| c.default_cost)
            .unwrap_or_else(|| {
                warn!(carrier = %id, "unknown carrier, shipping costed at 0");
                0.0
            }),
    }
}

/// Delivery plus packaging materials
pub fn resolve<C: Catalog + ?Sized>(
    selection: &ShippingSelection,
    config: &ShippingConfig,
    catalog: &C,
) -> ShippingCost {
    let delivery = delivery_cost(selection, config);
    let packaging = usage_cost(&selection.packaging, catalog);

    let exceeds_radius = selection.method == ShippingMethod::Dropoff
        && selection.override_cost.is_none()
        && selection.distance_km > config.max_delivery_radius_km;
    if exceeds_radius {
        warn!(
            distance_km = selection.distance_km,
            max_km = config.max_delivery_radius_km,
            "dropoff is outside the delivery radius"
        );
    }

    debug!(method = selection.method.id(), delivery, packaging, "resolved shipping");

    ShippingCost {
        delivery,
        packaging,
        total: delivery + packaging,
        exceeds_radius,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::config::CustomCarrier;
    use crate::models::{Asset, AssetCategory, AssetSpec, Carrier, Consumable, UsageEntry};

    fn selection(method: ShippingMethod) -> ShippingSelection {
        ShippingSelection {
            method,
            ..Default::default()
        }
    }

    fn config_with_courier() -> ShippingConfig {
        let mut config = ShippingConfig::default();
        config.custom_carriers.push(CustomCarrier {
            id: "bike-courier".to_string(),
            name: "Bike courier".to_string(),
            default_cost: 6.5,
        });
        config
    }

    #[test]
    fn local_pickup_is_free() {
        let config = ShippingConfig::default();
        assert_eq!(delivery_cost(&selection(ShippingMethod::LocalPickup), &config), 0.0);
    }

    #[test]
    fn dropoff_burns_fuel_both_ways() {
        let config = ShippingConfig::default();
        let mut sel = selection(ShippingMethod::Dropoff);
        sel.distance_km = 10.0;

        // 20 km at 10 L/100km = 2 L at 1.50
        assert!((delivery_cost(&sel, &config) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn named_carrier_uses_flat_rate() {
        let config = ShippingConfig::default();
        let cost = delivery_cost(&selection(ShippingMethod::Carrier(Carrier::RoyalMail)), &config);
        assert_eq!(cost, 8.0);
    }

    #[test]
    fn custom_carrier_lookup() {
        let config = config_with_courier();
        let known = selection(ShippingMethod::from("bike-courier".to_string()));
        let unknown = selection(ShippingMethod::from("pigeon".to_string()));

        assert_eq!(delivery_cost(&known, &config), 6.5);
        assert_eq!(delivery_cost(&unknown, &config), 0.0);
    }

    #[test]
    fn override_short_circuits() {
        let config = ShippingConfig::default();
        let mut sel = selection(ShippingMethod::Carrier(Carrier::Dhl));
        sel.override_cost = Some(4.25);
        assert_eq!(delivery_cost(&sel, &config), 4.25);

        let mut dropoff = selection(ShippingMethod::Dropoff);
        dropoff.distance_km = 500.0;
        dropoff.override_cost = Some(0.0);
        let resolved = resolve(&dropoff, &config, &MemoryCatalog::default());
        assert_eq!(resolved.total, 0.0);
        assert!(!resolved.exceeds_radius);
    }

    #[test]
    fn packaging_is_added_to_delivery() {
        let mut catalog = MemoryCatalog::default();
        catalog.insert_asset(Asset {
            id: "mailer-box".to_string(),
            name: "Mailer box".to_string(),
            category: AssetCategory::Packaging,
            brand: None,
            notes: None,
            spec: AssetSpec::Consumable(Consumable::from_package("ea", 30.0, 25.0)),
        });

        let mut sel = selection(ShippingMethod::Carrier(Carrier::Usps));
        sel.packaging = vec![
            UsageEntry::new("mailer-box", 1.0),
            UsageEntry::new("missing-tape", 3.0),
        ];

        let resolved = resolve(&sel, &ShippingConfig::default(), &catalog);
        assert!((resolved.packaging - 1.2).abs() < 1e-9);
        assert!((resolved.total - 11.2).abs() < 1e-9);
    }

    #[test]
    fn far_dropoff_is_flagged_but_costed() {
        let config = ShippingConfig::default();
        let mut sel = selection(ShippingMethod::Dropoff);
        sel.distance_km = 40.0;

        let resolved = resolve(&sel, &config, &MemoryCatalog::default());
        assert!(resolved.exceeds_radius);
        assert!((resolved.total - 12.0).abs() < 1e-9);
    }
}
