//! 3D print cost calculator
//!
//! Turns a print job's raw inputs into a cost breakdown, a shipping total,
//! a marketplace fee, a consistent margin/profit/price triple and a
//! break-even projection. The engine modules are pure functions of their
//! arguments; [`db`] and [`extract`] are the record store and importers
//! around them.

pub mod breakeven;
pub mod calculator;
pub mod catalog;
pub mod config;
pub mod cost;
pub mod db;
pub mod error;
pub mod extract;
pub mod logging;
pub mod marketplace;
pub mod models;
pub mod pricing;
pub mod shipping;

pub use calculator::{quote, PricingInput, Quote, SaleDraft};
pub use catalog::{Catalog, MemoryCatalog};
pub use config::Settings;
pub use error::CostError;
pub use pricing::{DrivingField, PriceTriple};
