//! Shared catalog helpers: turning product rows into priced cards and looking
//! up the flash sales that apply to them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    entity::{
        flash_sale_items::{Column as FlashItemCol, Entity as FlashSaleItems},
        flash_sales::{Column as FlashSaleCol, Entity as FlashSales},
        product_variants::Model as VariantModel,
        products::Model as ProductModel,
    },
    dto::products::VariantCard,
    error::{AppError, AppResult},
    models::{Product, ProductCard, ProductVariant},
    pricing::{FlashOffer, PriceQuote, resolve_price},
};

/// Flash offers running at `now` for the given products. When a product sits in
/// several running sales the cheapest offer wins.
pub async fn running_flash_offers<C: ConnectionTrait>(
    db: &C,
    product_ids: &[Uuid],
    now: DateTime<Utc>,
) -> AppResult<HashMap<Uuid, FlashOffer>> {
    if product_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = FlashSaleItems::find()
        .find_also_related(FlashSales)
        .filter(FlashItemCol::ProductId.is_in(product_ids.iter().copied()))
        .filter(FlashSaleCol::IsActive.eq(true))
        .filter(FlashSaleCol::StartTime.lte(now))
        .filter(FlashSaleCol::EndTime.gt(now))
        .all(db)
        .await?;

    let mut offers: HashMap<Uuid, FlashOffer> = HashMap::new();
    for (item, sale) in rows {
        let Some(sale) = sale else { continue };
        let offer = FlashOffer {
            flash_sale_price: item.flash_sale_price,
            is_active: sale.is_active,
            start_time: sale.start_time.with_timezone(&Utc),
            end_time: sale.end_time.with_timezone(&Utc),
        };
        offers
            .entry(item.product_id)
            .and_modify(|current| {
                if offer.flash_sale_price < current.flash_sale_price {
                    *current = offer;
                }
            })
            .or_insert(offer);
    }
    Ok(offers)
}

pub fn product_view(config: &AppConfig, model: ProductModel) -> Product {
    let mut product = Product::from(model);
    product.images = product
        .images
        .iter()
        .map(|path| config.asset_url(path))
        .collect();
    product
}

pub fn product_card(
    config: &AppConfig,
    model: ProductModel,
    offer: Option<&FlashOffer>,
    now: DateTime<Utc>,
) -> ProductCard {
    let pricing = resolve_price(model.price, model.sale_price, offer, now);
    ProductCard {
        product: product_view(config, model),
        pricing,
    }
}

/// Price a page of products in one flash-sale lookup.
pub async fn product_cards<C: ConnectionTrait>(
    db: &C,
    config: &AppConfig,
    models: Vec<ProductModel>,
) -> AppResult<Vec<ProductCard>> {
    let now = Utc::now();
    let ids: Vec<Uuid> = models.iter().map(|p| p.id).collect();
    let offers = running_flash_offers(db, &ids, now).await?;
    Ok(models
        .into_iter()
        .map(|model| {
            let offer = offers.get(&model.id);
            product_card(config, model, offer, now)
        })
        .collect())
}

/// Flash sales are priced per product, so variants only see their own sale price.
pub fn variant_quote(variant: &VariantModel, now: DateTime<Utc>) -> PriceQuote {
    resolve_price(variant.price, variant.sale_price, None, now)
}

/// Unit price for a cart or order line.
pub fn line_quote(
    product: &ProductModel,
    variant: Option<&VariantModel>,
    offers: &HashMap<Uuid, FlashOffer>,
    now: DateTime<Utc>,
) -> PriceQuote {
    match variant {
        Some(variant) => variant_quote(variant, now),
        None => resolve_price(product.price, product.sale_price, offers.get(&product.id), now),
    }
}

/// Quantity must reach the MOQ and fit in the available stock.
pub fn check_quantity(quantity: i32, moq: i32, stock: i32, name: &str) -> AppResult<()> {
    if quantity < 1 {
        return Err(AppError::BadRequest("quantity must be at least 1".into()));
    }
    if quantity < moq {
        return Err(AppError::BadRequest(format!(
            "minimum order quantity for {name} is {moq}"
        )));
    }
    if quantity > stock {
        return Err(AppError::BadRequest(format!(
            "insufficient stock for {name}: {stock} available"
        )));
    }
    Ok(())
}

pub fn variant_card(variant: VariantModel, now: DateTime<Utc>) -> VariantCard {
    let pricing = variant_quote(&variant, now);
    VariantCard {
        variant: ProductVariant::from(variant),
        pricing,
    }
}

#[cfg(test)]
mod tests {
    use super::check_quantity;

    #[test]
    fn quantity_respects_moq_and_stock() {
        assert!(check_quantity(5, 5, 10, "Bolt").is_ok());
        assert!(check_quantity(10, 1, 10, "Bolt").is_ok());
        assert!(check_quantity(4, 5, 10, "Bolt").is_err());
        assert!(check_quantity(11, 1, 10, "Bolt").is_err());
        assert!(check_quantity(0, 1, 10, "Bolt").is_err());
    }
}
