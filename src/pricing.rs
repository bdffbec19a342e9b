//! Price resolution for a product or variant: regular price, sale price, or
//! the price of a flash sale that is running right now.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    Regular,
    Sale,
    FlashSale,
}

/// A product's slot in a flash sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashOffer {
    pub flash_sale_price: i64,
    pub is_active: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl FlashOffer {
    pub fn is_running(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.start_time <= now && now < self.end_time
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct PriceQuote {
    /// What the customer pays per unit.
    pub price: i64,
    pub original_price: i64,
    pub discount_percentage: i64,
    pub source: PriceSource,
    pub flash_sale_ends_at: Option<DateTime<Utc>>,
}

pub fn resolve_price(
    price: i64,
    sale_price: Option<i64>,
    flash: Option<&FlashOffer>,
    now: DateTime<Utc>,
) -> PriceQuote {
    let original = price.max(0);

    if let Some(offer) = flash.filter(|offer| offer.is_running(now)) {
        let effective = offer.flash_sale_price.clamp(0, original);
        return PriceQuote {
            price: effective,
            original_price: original,
            discount_percentage: discount_percentage(original, effective),
            source: PriceSource::FlashSale,
            flash_sale_ends_at: Some(offer.end_time),
        };
    }

    if let Some(sale) = sale_price.filter(|sale| *sale >= 0 && *sale < original) {
        return PriceQuote {
            price: sale,
            original_price: original,
            discount_percentage: discount_percentage(original, sale),
            source: PriceSource::Sale,
            flash_sale_ends_at: None,
        };
    }

    PriceQuote {
        price: original,
        original_price: original,
        discount_percentage: 0,
        source: PriceSource::Regular,
        flash_sale_ends_at: None,
    }
}

/// Whole-number percentage off `original`, rounded half up.
pub fn discount_percentage(original: i64, price: i64) -> i64 {
    if original <= 0 || price >= original {
        return 0;
    }
    let off = original - price.max(0);
    (off * 200 + original) / (original * 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn offer(price: i64, is_active: bool, now: DateTime<Utc>) -> FlashOffer {
        FlashOffer {
            flash_sale_price: price,
            is_active,
            start_time: now - Duration::hours(1),
            end_time: now + Duration::hours(1),
        }
    }

    #[test]
    fn regular_price_without_discounts() {
        let quote = resolve_price(1_000, None, None, Utc::now());
        assert_eq!(quote.price, 1_000);
        assert_eq!(quote.source, PriceSource::Regular);
        assert_eq!(quote.discount_percentage, 0);
    }

    #[test]
    fn sale_price_below_price_wins() {
        let quote = resolve_price(1_000, Some(750), None, Utc::now());
        assert_eq!(quote.price, 750);
        assert_eq!(quote.source, PriceSource::Sale);
        assert_eq!(quote.discount_percentage, 25);
    }

    #[test]
    fn sale_price_not_below_price_is_ignored() {
        let quote = resolve_price(1_000, Some(1_200), None, Utc::now());
        assert_eq!(quote.price, 1_000);
        assert_eq!(quote.source, PriceSource::Regular);
    }

    #[test]
    fn running_flash_sale_beats_sale_price() {
        let now = Utc::now();
        let flash = offer(500, true, now);
        let quote = resolve_price(1_000, Some(750), Some(&flash), now);
        assert_eq!(quote.price, 500);
        assert_eq!(quote.source, PriceSource::FlashSale);
        assert_eq!(quote.discount_percentage, 50);
        assert_eq!(quote.flash_sale_ends_at, Some(flash.end_time));
    }

    #[test]
    fn inactive_flash_sale_falls_back_to_sale_price() {
        let now = Utc::now();
        let flash = offer(500, false, now);
        let quote = resolve_price(1_000, Some(750), Some(&flash), now);
        assert_eq!(quote.price, 750);
        assert_eq!(quote.source, PriceSource::Sale);
    }

    #[test]
    fn ended_flash_sale_falls_back_to_price() {
        let now = Utc::now();
        let flash = FlashOffer {
            flash_sale_price: 500,
            is_active: true,
            start_time: now - Duration::hours(2),
            end_time: now,
        };
        let quote = resolve_price(1_000, None, Some(&flash), now);
        assert_eq!(quote.price, 1_000);
        assert_eq!(quote.source, PriceSource::Regular);
    }

    #[test]
    fn quotes_never_go_negative_or_above_original() {
        let now = Utc::now();
        let quote = resolve_price(-10, Some(-5), None, now);
        assert_eq!(quote.price, 0);
        assert_eq!(quote.discount_percentage, 0);

        let flash = offer(2_000, true, now);
        let quote = resolve_price(1_000, None, Some(&flash), now);
        assert_eq!(quote.price, 1_000);
        assert_eq!(quote.discount_percentage, 0);
    }

    #[test]
    fn discount_rounds_half_up() {
        assert_eq!(discount_percentage(300, 200), 33);
        assert_eq!(discount_percentage(200, 133), 34);
        assert_eq!(discount_percentage(0, 0), 0);
    }
}
