//! Marketplace fee calculation
//!
//! Every platform is reduced to one rule:
//! `max(min_fee, gross × percent) + gross × extra_percent + fixed`.
//! Fees are always charged on the gross sale amount.

use tracing::warn;

use crate::config::MarketplaceFeeSchedule;
use crate::models::Marketplace;

/// Fee terms of one platform, percentages as whole percents
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FeeRule {
    pub min_fee: f64,
    pub percent: f64,
    pub extra_percent: f64,
    pub fixed: f64,
}

impl FeeRule {
    pub fn apply(&self, gross: f64) -> f64 {
        if gross <= 0.0 {
            return 0.0;
        }
        let selling = (gross * self.percent / 100.0).max(self.min_fee);
        selling + gross * self.extra_percent / 100.0 + self.fixed
    }
}

impl MarketplaceFeeSchedule {
    pub fn rule_for(&self, marketplace: &Marketplace) -> FeeRule {
        match marketplace {
            Marketplace::None | Marketplace::FacebookLocal => FeeRule::default(),
            Marketplace::Kijiji => FeeRule {
                fixed: self.kijiji_featured_fee,
                ..Default::default()
            },
            Marketplace::FacebookShipped => FeeRule {
                min_fee: self.facebook_min_fee,
                percent: self.facebook_shipped_percent,
                extra_percent: self.facebook_processing_percent,
                fixed: 0.0,
            },
            Marketplace::Etsy => self.etsy_rule(),
            Marketplace::EtsyOffsiteAd => {
                let mut rule = self.etsy_rule();
                rule.extra_percent += self.etsy_offsite_ad_percent;
                rule
            }
            Marketplace::Ebay => FeeRule {
                percent: self.ebay_final_value_percent,
                fixed: self.ebay_fixed_fee,
                ..Default::default()
            },
            Marketplace::AmazonHandmade => FeeRule {
                percent: self.amazon_handmade_percent,
                ..Default::default()
            },
            Marketplace::Custom(id) => match self.custom_marketplaces.iter().find(|m| m.id == *id) {
                Some(custom) => FeeRule {
                    percent: custom.fee_percent,
                    fixed: custom.fixed_fee,
                    ..Default::default()
                },
                None => {
                    warn!(marketplace = %id, "unknown marketplace, no fee applied");
                    FeeRule::default()
                }
            },
        }
    }

    fn etsy_rule(&self) -> FeeRule {
        FeeRule {
            min_fee: 0.0,
            percent: self.etsy_transaction_percent,
            extra_percent: self.etsy_payment_percent,
            fixed: self.etsy_payment_fixed + self.etsy_listing_fee,
        }
    }
}

/// Platform fee on a sale grossing `gross`
pub fn fee(gross: f64, marketplace: &Marketplace, schedule: &MarketplaceFeeSchedule) -> f64 {
    schedule.rule_for(marketplace).apply(gross)
}
