//! One full pricing pass over a job
//!
//! Every stage reads the same `JobInputs`, catalog and settings, so the
//! shipping, fee and cost figures in a [`Quote`] always describe the same
//! snapshot of input.

use chrono::Utc;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::breakeven::{job_break_even, JobBreakEven};
use crate::catalog::Catalog;
use crate::config::Settings;
use crate::cost;
use crate::error::{ensure_non_negative, CostError, CostResult};
use crate::marketplace;
use crate::models::{CostBreakdown, JobInputs, JobSnapshot, Marketplace, SaleRecord, ShippingSelection};
use crate::pricing::{self, DrivingField, PriceTriple};
use crate::shipping::{self, ShippingCost};

/// Pricing state carried between passes
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PricingInput {
    pub driving: DrivingField,
    pub current: PriceTriple,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub breakdown: CostBreakdown,
    pub shipping: ShippingCost,
    /// Failure-adjusted per-unit cost plus shipping
    pub true_unit_cost: f64,
    pub pricing: PriceTriple,
    /// Platform fee on one unit sold at the resolved price
    pub marketplace_fee: f64,
    /// Price minus the platform fee
    pub seller_receives: f64,
    /// Profit per unit once the platform fee is paid
    pub net_profit: f64,
    pub net_margin_percent: f64,
    pub break_even: JobBreakEven,
    pub below_author_minimum: bool,
}

/// Run every stage of the engine over one input snapshot
pub fn quote<C: Catalog + ?Sized>(
    inputs: &JobInputs,
    pricing_input: PricingInput,
    catalog: &C,
    settings: &Settings,
) -> CostResult<Quote> {
    let breakdown = cost::breakdown(inputs, catalog, settings)?;
    let shipping = shipping::resolve(&inputs.shipping, &settings.shipping, catalog);
    let true_unit_cost = breakdown.failure_adjusted_subtotal + shipping.total;

    let pricing = pricing::resolve(true_unit_cost, pricing_input.driving, pricing_input.current)?;
    let marketplace_fee = marketplace::fee(pricing.selling_price, &inputs.marketplace, &settings.marketplace);
    let seller_receives = pricing.selling_price - marketplace_fee;
    let net_profit = seller_receives - true_unit_cost;
    let net_margin_percent = if pricing.selling_price > 0.0 {
        net_profit / pricing.selling_price * 100.0
    } else {
        0.0
    };
    let break_even = job_break_even(
        breakdown.fixed_costs_total(),
        true_unit_cost,
        pricing.selling_price,
        0,
    );

    let below_author_minimum = inputs
        .author_min_price
        .is_some_and(|min| min > 0.0 && pricing.selling_price < min);

    debug!(
        true_unit_cost,
        selling_price = pricing.selling_price,
        marketplace_fee,
        "quote ready"
    );

    Ok(Quote {
        breakdown,
        shipping,
        true_unit_cost,
        pricing,
        marketplace_fee,
        seller_receives,
        net_profit,
        net_margin_percent,
        break_even,
        below_author_minimum,
    })
}

impl std::fmt::Display for Quote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let b = &self.breakdown;
        writeln!(f, "=== Cost per unit ===")?;
        writeln!(f, "  Material:     {:.2}", b.material)?;
        writeln!(f, "  Energy:       {:.2}", b.energy)?;
        writeln!(f, "  Consumables:  {:.2}", b.consumables)?;
        writeln!(f, "  Labor:        {:.2}", b.labor)?;
        if b.per_unit_licensing > 0.0 {
            writeln!(f, "  Licensing:    {:.2}", b.per_unit_licensing)?;
        }
        writeln!(f, "  Subtotal:     {:.2}", b.per_unit_subtotal)?;
        writeln!(f, "  With failures:{:>7.2}", b.failure_adjusted_subtotal)?;
        writeln!(f, "  Shipping:     {:.2}", self.shipping.total)?;
        if self.shipping.exceeds_radius {
            writeln!(f, "    (dropoff is beyond your delivery radius)")?;
        }
        writeln!(f, "  True cost:    {:.2}", self.true_unit_cost)?;
        writeln!(f)?;

        writeln!(f, "Fixed costs:")?;
        writeln!(f, "  Depreciation: {:.2}", b.depreciation)?;
        writeln!(f, "  Nozzle wear:  {:.2}", b.tool_wear)?;
        writeln!(f, "  Licensing:    {:.2}", b.fixed_licensing)?;
        writeln!(f)?;

        writeln!(f, "Pricing:")?;
        writeln!(f, "  Price:        {:.2}", self.pricing.selling_price)?;
        writeln!(f, "  Profit:       {:.2}", self.pricing.profit)?;
        writeln!(f, "  Margin:       {:.1}%", self.pricing.margin_percent)?;
        if self.marketplace_fee > 0.0 {
            writeln!(f, "  Platform fee: -{:.2}", self.marketplace_fee)?;
            writeln!(f, "  You receive:  {:.2}", self.seller_receives)?;
            writeln!(f, "  Net profit:   {:.2}", self.net_profit)?;
            writeln!(f, "  Net margin:   {:.1}%", self.net_margin_percent)?;
            if self.pricing.selling_price > 0.0 {
                writeln!(
                    f,
                    "  Fees take {:.2} ({:.1}% of the sale) out of your profit",
                    self.marketplace_fee,
                    self.marketplace_fee / self.pricing.selling_price * 100.0
                )?;
            }
        }
        writeln!(f, "  Break-even:   {} units", self.break_even.break_even_units)?;
        if self.below_author_minimum {
            writeln!(f, "  Warning: price is below the author's minimum")?;
        }

        Ok(())
    }
}

/// Freeze a quote into a job record.
///
/// Editing an existing job keeps its id, creation time and sold count.
pub fn finalize_job(
    name: &str,
    inputs: JobInputs,
    quote: &Quote,
    existing: Option<&JobSnapshot>,
) -> JobSnapshot {
    let now = Utc::now();
    JobSnapshot {
        id: existing
            .map(|j| j.id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        name: name.to_string(),
        created_at: existing.map(|j| j.created_at).unwrap_or(now),
        updated_at: now,
        inputs,
        unit_cost: quote.true_unit_cost,
        fixed_costs: quote.breakdown.fixed_costs_total(),
        selling_price: quote.pricing.selling_price,
        units_sold: existing.map(|j| j.units_sold).unwrap_or(0),
        notes: existing.and_then(|j| j.notes.clone()),
    }
}

/// What the seller entered when recording a sale
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaleDraft {
    pub quantity: u32,
    /// Defaults to the job's selling price
    pub unit_price: Option<f64>,
    pub shipping: ShippingSelection,
    pub marketplace: Marketplace,
    pub customer: Option<String>,
    pub notes: Option<String>,
}

/// Build the sale record for a job; the fee is charged on the gross
pub fn prepare_sale<C: Catalog + ?Sized>(
    job: &JobSnapshot,
    draft: SaleDraft,
    catalog: &C,
    settings: &Settings,
) -> CostResult<SaleRecord> {
    if draft.quantity == 0 {
        return Err(CostError::EmptySale);
    }
    let unit_price = draft.unit_price.unwrap_or(job.selling_price);
    ensure_non_negative("unit price", unit_price)?;
    cost::validate_shipping(&draft.shipping)?;

    let gross = draft.quantity as f64 * unit_price;
    let shipping = shipping::resolve(&draft.shipping, &settings.shipping, catalog);
    let marketplace_fee = marketplace::fee(gross, &draft.marketplace, &settings.marketplace);

    Ok(SaleRecord {
        id: Uuid::new_v4().to_string(),
        job_id: job.id.clone(),
        quantity: draft.quantity,
        unit_price,
        shipping_method: draft.shipping.method,
        shipping_cost: shipping.total,
        marketplace: draft.marketplace,
        marketplace_fee,
        sold_at: Utc::now(),
        customer: draft.customer,
        notes: draft.notes,
    })
}
