//! Catalog lookups
//!
//! Jobs reference assets and equipment by id. A reference that no longer
//! resolves is not an error: it contributes zero cost and the rest of the
//! calculation carries on.

use std::collections::HashMap;

use tracing::warn;

use crate::models::{Asset, EquipmentInstance, EquipmentProfile, UsageEntry};

pub trait Catalog {
    /// Look up an asset; `None` means it costs nothing
    fn resolve(&self, id: &str) -> Option<&Asset>;

    /// Look up a physical equipment instance
    fn instance(&self, id: &str) -> Option<&EquipmentInstance>;

    /// Profile of the printer model an instance was bought as
    fn profile_for(&self, instance: &EquipmentInstance) -> Option<&EquipmentProfile> {
        self.resolve(&instance.profile_id).and_then(Asset::equipment)
    }

    /// Cost of one unit of an asset, 0 when unresolvable
    fn unit_cost(&self, id: &str) -> f64 {
        match self.resolve(id) {
            Some(asset) => match asset.cost_per_unit() {
                Some(cost) => cost,
                None => {
                    warn!(asset_id = id, "asset is equipment, not a consumable; costing it at 0");
                    0.0
                }
            },
            None => {
                warn!(asset_id = id, "asset not found in catalog, costing it at 0");
                0.0
            }
        }
    }
}

/// Sum of `quantity × cost_per_unit` over every entry
pub fn usage_cost<C: Catalog + ?Sized>(entries: &[UsageEntry], catalog: &C) -> f64 {
    entries
        .iter()
        .map(|usage| usage.quantity * catalog.unit_cost(&usage.asset_id))
        .sum()
}

/// Catalog held fully in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    assets: HashMap<String, Asset>,
    instances: HashMap<String, EquipmentInstance>,
}

impl MemoryCatalog {
    pub fn new(assets: Vec<Asset>, instances: Vec<EquipmentInstance>) -> Self {
        MemoryCatalog {
            assets: assets.into_iter().map(|a| (a.id.clone(), a)).collect(),
            instances: instances.into_iter().map(|i| (i.id.clone(), i)).collect(),
        }
    }

    pub fn insert_asset(&mut self, asset: Asset) {
        self.assets.insert(asset.id.clone(), asset);
    }

    pub fn insert_instance(&mut self, instance: EquipmentInstance) {
        self.instances.insert(instance.id.clone(), instance);
    }

    pub fn assets(&self) -> impl Iterator<Item = &Asset> {
        self.assets.values()
    }
}

impl Catalog for MemoryCatalog {
    fn resolve(&self, id: &str) -> Option<&Asset> {
        self.assets.get(id)
    }

    fn instance(&self, id: &str) -> Option<&EquipmentInstance> {
        self.instances.get(id)
    }
}
