//! Calculation settings
//!
//! Everything the engine would otherwise read from global state is carried
//! in [`Settings`] and passed explicitly into each computation.

use serde::{Deserialize, Serialize};

use crate::models::Carrier;

/// PLA density in g/cm³, used to turn filament mass into volume
pub const DEFAULT_MATERIAL_DENSITY: f64 = 1.24;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub energy_price_per_kwh: f64,
    pub labor_hourly_rate: f64,
    pub material_density: f64,
    pub shipping: ShippingConfig,
    pub marketplace: MarketplaceFeeSchedule,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            energy_price_per_kwh: 0.12,
            labor_hourly_rate: 15.0,
            material_density: DEFAULT_MATERIAL_DENSITY,
            shipping: ShippingConfig::default(),
            marketplace: MarketplaceFeeSchedule::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomCarrier {
    pub id: String,
    pub name: String,
    pub default_cost: f64,
}

/// Flat rate per built-in carrier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarrierRates {
    pub ups: f64,
    pub fedex: f64,
    pub purolator: f64,
    pub usps: f64,
    pub dhl: f64,
    pub royal_mail: f64,
    pub australia_post: f64,
    pub canada_post: f64,
}

impl CarrierRates {
    pub fn get(&self, carrier: Carrier) -> f64 {
        match carrier {
            Carrier::Ups => self.ups,
            Carrier::Fedex => self.fedex,
            Carrier::Purolator => self.purolator,
            Carrier::Usps => self.usps,
            Carrier::Dhl => self.dhl,
            Carrier::RoyalMail => self.royal_mail,
            Carrier::AustraliaPost => self.australia_post,
            Carrier::CanadaPost => self.canada_post,
        }
    }
}

impl Default for CarrierRates {
    fn default() -> Self {
        CarrierRates {
            ups: 15.0,
            fedex: 15.0,
            purolator: 12.0,
            usps: 10.0,
            dhl: 20.0,
            royal_mail: 8.0,
            australia_post: 12.0,
            canada_post: 15.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShippingConfig {
    pub max_delivery_radius_km: f64,
    pub fuel_price_per_liter: f64,
    /// Litres per 100 km
    pub fuel_efficiency: f64,
    pub carrier_rates: CarrierRates,
    pub custom_carriers: Vec<CustomCarrier>,
}

impl Default for ShippingConfig {
    fn default() -> Self {
        ShippingConfig {
            max_delivery_radius_km: 25.0,
            fuel_price_per_liter: 1.50,
            fuel_efficiency: 10.0,
            carrier_rates: CarrierRates::default(),
            custom_carriers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomMarketplace {
    pub id: String,
    pub name: String,
    /// Percent of the gross, e.g. 10 for 10%
    pub fee_percent: f64,
    pub fixed_fee: f64,
}

/// Platform fee parameters. All percentages are whole percents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketplaceFeeSchedule {
    pub facebook_shipped_percent: f64,
    pub facebook_min_fee: f64,
    pub facebook_processing_percent: f64,

    pub etsy_transaction_percent: f64,
    pub etsy_payment_percent: f64,
    pub etsy_payment_fixed: f64,
    pub etsy_listing_fee: f64,
    pub etsy_offsite_ad_percent: f64,

    pub kijiji_featured_fee: f64,

    pub ebay_final_value_percent: f64,
    pub ebay_fixed_fee: f64,

    pub amazon_handmade_percent: f64,

    pub custom_marketplaces: Vec<CustomMarketplace>,
}

impl Default for MarketplaceFeeSchedule {
    fn default() -> Self {
        MarketplaceFeeSchedule {
            facebook_shipped_percent: 10.0,
            facebook_min_fee: 0.80,
            facebook_processing_percent: 2.9,
            etsy_transaction_percent: 6.5,
            etsy_payment_percent: 3.0,
            etsy_payment_fixed: 0.25,
            etsy_listing_fee: 0.20,
            etsy_offsite_ad_percent: 15.0,
            kijiji_featured_fee: 0.0,
            ebay_final_value_percent: 12.9,
            ebay_fixed_fee: 0.30,
            amazon_handmade_percent: 15.0,
            custom_marketplaces: Vec::new(),
        }
    }
}
