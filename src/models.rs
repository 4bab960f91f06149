//! Data models for the asset catalog, print jobs and sales

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Recovery period assumed when an equipment instance does not set one
pub const DEFAULT_RECOVERY_MONTHS: f64 = 12.0;

/// Monthly usage assumed when an equipment instance does not set one
pub const DEFAULT_MONTHLY_USAGE_HOURS: f64 = 40.0;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AssetCategory {
    Filament,
    Consumable,
    Finishing,
    Tool,
    Packaging,
    Printer,
    Custom(String),
}

impl AssetCategory {
    pub fn as_str(&self) -> &str {
        match self {
            AssetCategory::Filament => "filament",
            AssetCategory::Consumable => "consumable",
            AssetCategory::Finishing => "finishing",
            AssetCategory::Tool => "tool",
            AssetCategory::Packaging => "packaging",
            AssetCategory::Printer => "printer",
            AssetCategory::Custom(name) => name,
        }
    }
}

impl From<String> for AssetCategory {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "filament" => AssetCategory::Filament,
            "consumable" => AssetCategory::Consumable,
            "finishing" => AssetCategory::Finishing,
            "tool" => AssetCategory::Tool,
            "packaging" => AssetCategory::Packaging,
            "printer" => AssetCategory::Printer,
            _ => AssetCategory::Custom(value.trim().to_string()),
        }
    }
}

impl From<AssetCategory> for String {
    fn from(value: AssetCategory) -> Self {
        value.as_str().to_string()
    }
}

/// Something bought in bulk and used up a little at a time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consumable {
    pub unit: String,
    pub cost_per_unit: f64,
    pub package_cost: Option<f64>,
    pub units_per_package: Option<f64>,
    pub lifespan_uses: Option<f64>,
}

impl Consumable {
    /// Build a consumable whose unit cost is derived from its package
    pub fn from_package(unit: &str, package_cost: f64, units_per_package: f64) -> Self {
        let cost_per_unit = if units_per_package > 0.0 {
            package_cost / units_per_package
        } else {
            0.0
        };

        Consumable {
            unit: unit.to_string(),
            cost_per_unit,
            package_cost: Some(package_cost),
            units_per_package: Some(units_per_package),
            lifespan_uses: None,
        }
    }
}

/// A printer model as listed in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentProfile {
    pub purchase_price: f64,
    pub expected_lifespan_hours: f64,
    pub power_watts: f64,
    pub tool_cost: f64,
    pub tool_lifespan_cm3: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AssetSpec {
    Consumable(Consumable),
    Equipment(EquipmentProfile),
}

/// A catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub name: String,
    pub category: AssetCategory,
    pub brand: Option<String>,
    pub notes: Option<String>,
    pub spec: AssetSpec,
}

impl Asset {
    pub fn cost_per_unit(&self) -> Option<f64> {
        match &self.spec {
            AssetSpec::Consumable(c) => Some(c.cost_per_unit),
            AssetSpec::Equipment(_) => None,
        }
    }

    pub fn equipment(&self) -> Option<&EquipmentProfile> {
        match &self.spec {
            AssetSpec::Equipment(profile) => Some(profile),
            AssetSpec::Consumable(_) => None,
        }
    }
}

/// One physical printer owned by the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentInstance {
    pub id: String,
    pub profile_id: String,
    pub nickname: String,
    pub usage_hours: f64,
    pub actual_purchase_price: Option<f64>,
    pub recovery_months: Option<f64>,
    pub monthly_usage_hours: Option<f64>,
    pub notes: Option<String>,
}

impl EquipmentInstance {
    /// What the user paid, falling back to the profile's list price
    pub fn purchase_price(&self, profile: Option<&EquipmentProfile>) -> f64 {
        self.actual_purchase_price
            .or_else(|| profile.map(|p| p.purchase_price))
            .unwrap_or(0.0)
    }

    /// Hours over which the purchase price should be recovered
    pub fn recovery_hours(&self) -> f64 {
        self.recovery_months.unwrap_or(DEFAULT_RECOVERY_MONTHS)
            * self.monthly_usage_hours.unwrap_or(DEFAULT_MONTHLY_USAGE_HOURS)
    }

    /// Depreciation charged per print hour; 0 while the recovery plan is unset
    pub fn depreciation_per_hour(&self, profile: Option<&EquipmentProfile>) -> f64 {
        let hours = self.recovery_hours();
        if hours > 0.0 {
            self.purchase_price(profile) / hours
        } else {
            0.0
        }
    }
}

/// A reference to a catalog asset plus the quantity consumed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEntry {
    pub asset_id: String,
    pub quantity: f64,
}

impl UsageEntry {
    pub fn new(asset_id: &str, quantity: f64) -> Self {
        UsageEntry {
            asset_id: asset_id.to_string(),
            quantity,
        }
    }
}

/// The filament chosen for a job, with an optional edited price per gram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialSelection {
    pub asset_id: String,
    pub price_per_gram_override: Option<f64>,
}

/// One-time model licensing cost
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Licensing {
    pub cost: f64,
    /// Charged on every unit instead of recovered across sales
    pub per_unit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Carrier {
    Ups,
    Fedex,
    Purolator,
    Usps,
    Dhl,
    RoyalMail,
    AustraliaPost,
    CanadaPost,
}

impl Carrier {
    pub const ALL: [Carrier; 8] = [
        Carrier::Ups,
        Carrier::Fedex,
        Carrier::Purolator,
        Carrier::Usps,
        Carrier::Dhl,
        Carrier::RoyalMail,
        Carrier::AustraliaPost,
        Carrier::CanadaPost,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Carrier::Ups => "ups",
            Carrier::Fedex => "fedex",
            Carrier::Purolator => "purolator",
            Carrier::Usps => "usps",
            Carrier::Dhl => "dhl",
            Carrier::RoyalMail => "royal_mail",
            Carrier::AustraliaPost => "australia_post",
            Carrier::CanadaPost => "canada_post",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ShippingMethod {
    #[default]
    LocalPickup,
    Dropoff,
    Carrier(Carrier),
    /// A user-defined carrier id
    Custom(String),
}

impl ShippingMethod {
    pub fn id(&self) -> &str {
        match self {
            ShippingMethod::LocalPickup => "local_pickup",
            ShippingMethod::Dropoff => "dropoff",
            ShippingMethod::Carrier(carrier) => carrier.id(),
            ShippingMethod::Custom(id) => id,
        }
    }
}

impl From<String> for ShippingMethod {
    fn from(value: String) -> Self {
        match value.as_str() {
            "local_pickup" => ShippingMethod::LocalPickup,
            "dropoff" => ShippingMethod::Dropoff,
            other => Carrier::ALL
                .iter()
                .find(|c| c.id() == other)
                .map(|c| ShippingMethod::Carrier(*c))
                .unwrap_or(ShippingMethod::Custom(value)),
        }
    }
}

impl From<ShippingMethod> for String {
    fn from(value: ShippingMethod) -> Self {
        value.id().to_string()
    }
}

/// How a unit gets to the buyer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShippingSelection {
    pub method: ShippingMethod,
    /// One-way distance, only used for dropoff
    pub distance_km: f64,
    /// When set, replaces whatever the method would cost
    pub override_cost: Option<f64>,
    /// Boxes, mailers and filler, costed as shipping rather than production
    pub packaging: Vec<UsageEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Marketplace {
    #[default]
    None,
    FacebookLocal,
    FacebookShipped,
    Etsy,
    EtsyOffsiteAd,
    Kijiji,
    Ebay,
    AmazonHandmade,
    /// A user-defined marketplace id
    Custom(String),
}

impl Marketplace {
    pub fn id(&self) -> &str {
        match self {
            Marketplace::None => "none",
            Marketplace::FacebookLocal => "facebook_local",
            Marketplace::FacebookShipped => "facebook_shipped",
            Marketplace::Etsy => "etsy",
            Marketplace::EtsyOffsiteAd => "etsy_offsite_ad",
            Marketplace::Kijiji => "kijiji",
            Marketplace::Ebay => "ebay",
            Marketplace::AmazonHandmade => "amazon_handmade",
            Marketplace::Custom(id) => id,
        }
    }
}

impl From<String> for Marketplace {
    fn from(value: String) -> Self {
        match value.as_str() {
            "none" | "" => Marketplace::None,
            "facebook_local" => Marketplace::FacebookLocal,
            "facebook_shipped" => Marketplace::FacebookShipped,
            "etsy" => Marketplace::Etsy,
            "etsy_offsite_ad" => Marketplace::EtsyOffsiteAd,
            "kijiji" => Marketplace::Kijiji,
            "ebay" => Marketplace::Ebay,
            "amazon_handmade" => Marketplace::AmazonHandmade,
            _ => Marketplace::Custom(value),
        }
    }
}

impl From<Marketplace> for String {
    fn from(value: Marketplace) -> Self {
        value.id().to_string()
    }
}

/// Raw parameters of one production run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobInputs {
    pub material: Option<MaterialSelection>,
    pub material_grams: f64,
    pub print_hours: f64,
    pub instance_id: Option<String>,
    pub consumables: Vec<UsageEntry>,
    pub prep_minutes: f64,
    pub post_process_minutes: f64,
    pub licensing: Licensing,
    /// Advisory minimum price set by the model's author
    pub author_min_price: Option<f64>,
    /// Expected share of failed prints, in percent
    pub failure_rate: f64,
    pub shipping: ShippingSelection,
    pub marketplace: Marketplace,
}

/// A committed calculation.
///
/// `unit_cost` and `fixed_costs` are frozen at save time and never
/// recomputed when the catalog changes later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub inputs: JobInputs,
    pub unit_cost: f64,
    pub fixed_costs: f64,
    pub selling_price: f64,
    pub units_sold: u32,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleRecord {
    pub id: String,
    pub job_id: String,
    pub quantity: u32,
    pub unit_price: f64,
    pub shipping_method: ShippingMethod,
    pub shipping_cost: f64,
    pub marketplace: Marketplace,
    pub marketplace_fee: f64,
    pub sold_at: DateTime<Utc>,
    pub customer: Option<String>,
    pub notes: Option<String>,
}

impl SaleRecord {
    pub fn total_revenue(&self) -> f64 {
        self.quantity as f64 * self.unit_price
    }

    /// What the seller keeps: revenue plus shipping charged, minus platform fee
    pub fn net_proceeds(&self) -> f64 {
        self.total_revenue() + self.shipping_cost - self.marketplace_fee
    }
}

/// Line items of one job's cost.
///
/// Depreciation and tool wear are fixed costs and never part of
/// `per_unit_subtotal`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CostBreakdown {
    pub material: f64,
    pub energy: f64,
    pub consumables: f64,
    pub labor: f64,
    pub per_unit_licensing: f64,

    pub depreciation: f64,
    pub tool_wear: f64,
    pub fixed_licensing: f64,

    pub per_unit_subtotal: f64,
    pub failure_adjusted_subtotal: f64,
}

impl CostBreakdown {
    pub fn fixed_costs_total(&self) -> f64 {
        self.depreciation + self.tool_wear + self.fixed_licensing
    }
}
