use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, Condition, ConnectionTrait, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use sea_orm::sea_query::LockType;
use uuid::Uuid;

use crate::{
    audit,
    dto::orders::{
        CheckoutRequest, ConfirmPaymentRequest, OrderList, OrderWithItems, UpdateOrderStatusRequest,
    },
    entity::{
        cart_items::{Column as CartCol, Entity as CartItems},
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        orders::{
            ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel,
        },
        product_variants::{Column as VariantCol, Entity as ProductVariants, Model as VariantModel},
        products::{Column as ProdCol, Entity as Products, Model as ProductModel},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_permission},
    models::{Order, OrderItem},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::{address_service, catalog, inventory_service},
    state::AppState,
};

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_PROCESSING: &str = "processing";
pub const STATUS_SHIPPED: &str = "shipped";
pub const STATUS_DELIVERED: &str = "delivered";
pub const STATUS_CANCELLED: &str = "cancelled";

pub const PAYMENT_UNPAID: &str = "unpaid";
pub const PAYMENT_PAID: &str = "paid";
pub const PAYMENT_REFUNDED: &str = "refunded";

const PAYMENT_METHODS: [&str; 2] = ["cod", "online"];
const ORDER_STATUSES: [&str; 5] = [
    STATUS_PENDING,
    STATUS_PROCESSING,
    STATUS_SHIPPED,
    STATUS_DELIVERED,
    STATUS_CANCELLED,
];

/// Allowed order status moves. Everything else is rejected.
pub fn can_transition(from: &str, to: &str) -> bool {
    matches!(
        (from, to),
        (STATUS_PENDING, STATUS_PROCESSING)
            | (STATUS_PROCESSING, STATUS_SHIPPED)
            | (STATUS_SHIPPED, STATUS_DELIVERED)
            | (STATUS_PENDING, STATUS_CANCELLED)
            | (STATUS_PROCESSING, STATUS_CANCELLED)
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal: i64,
    pub discount_total: i64,
    pub total_amount: i64,
}

/// Totals over `(unit_price, original_price, quantity)` lines.
pub fn compute_totals(lines: &[(i64, i64, i32)]) -> OrderTotals {
    let (subtotal, total_amount) = lines.iter().fold((0i64, 0i64), |(sub, tot), (unit, orig, qty)| {
        let qty = i64::from(*qty);
        (sub + orig * qty, tot + unit * qty)
    });
    OrderTotals {
        subtotal,
        discount_total: subtotal - total_amount,
        total_amount,
    }
}

pub fn build_order_number(order_id: Uuid) -> String {
    let date = Utc::now().format("%Y%m%d");
    let suffix = order_id.simple().to_string();
    format!("DFK-{}-{}", date, suffix[..8].to_uppercase())
}

struct PricedLine {
    product: ProductModel,
    variant: Option<VariantModel>,
    quantity: i32,
    unit_price: i64,
    original_price: i64,
}

pub async fn checkout(
    state: &AppState,
    user: &AuthUser,
    payload: CheckoutRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let payment_method = payload.payment_method.trim().to_lowercase();
    if !PAYMENT_METHODS.contains(&payment_method.as_str()) {
        return Err(AppError::BadRequest("payment_method must be cod or online".into()));
    }

    let txn = state.orm.begin().await?;
    let address = address_service::find_owned(&txn, user.user_id, payload.address_id)
        .await
        .map_err(|err| match err {
            AppError::NotFound => AppError::BadRequest("address not found".into()),
            other => other,
        })?;

    let cart = CartItems::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .order_by_asc(CartCol::CreatedAt)
        .lock(LockType::Update)
        .all(&txn)
        .await?;
    if cart.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".into()));
    }

    let product_ids: Vec<Uuid> = cart.iter().map(|c| c.product_id).collect();
    let variant_ids: Vec<Uuid> = cart.iter().filter_map(|c| c.variant_id).collect();

    let products: HashMap<Uuid, ProductModel> = Products::find()
        .filter(ProdCol::Id.is_in(product_ids.clone()))
        .lock(LockType::Update)
        .all(&txn)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();
    let variants: HashMap<Uuid, VariantModel> = if variant_ids.is_empty() {
        HashMap::new()
    } else {
        ProductVariants::find()
            .filter(VariantCol::Id.is_in(variant_ids))
            .lock(LockType::Update)
            .all(&txn)
            .await?
            .into_iter()
            .map(|v| (v.id, v))
            .collect()
    };

    let now = Utc::now();
    let offers = catalog::running_flash_offers(&txn, &product_ids, now).await?;

    let mut lines = Vec::with_capacity(cart.len());
    for row in &cart {
        let product = products
            .get(&row.product_id)
            .filter(|p| p.is_active)
            .ok_or_else(|| {
                AppError::BadRequest(format!("product {} is unavailable", row.product_id))
            })?;
        let variant = match row.variant_id {
            Some(id) => Some(
                variants
                    .get(&id)
                    .filter(|v| v.is_active)
                    .ok_or_else(|| AppError::BadRequest(format!("variant {id} is unavailable")))?,
            ),
            None => None,
        };

        match variant {
            Some(v) => catalog::check_quantity(
                row.quantity,
                v.moq,
                v.stock,
                &format!("{} ({})", product.name, v.name),
            )?,
            None => {
                catalog::check_quantity(row.quantity, product.moq, product.stock, &product.name)?
            }
        }

        let quote = catalog::line_quote(product, variant, &offers, now);
        lines.push(PricedLine {
            product: product.clone(),
            variant: variant.cloned(),
            quantity: row.quantity,
            unit_price: quote.price,
            original_price: quote.original_price,
        });
    }

    let totals = compute_totals(
        &lines
            .iter()
            .map(|l| (l.unit_price, l.original_price, l.quantity))
            .collect::<Vec<_>>(),
    );

    let order_id = Uuid::new_v4();
    let shipping_address = serde_json::json!({
        "full_name": address.full_name,
        "phone": address.phone,
        "line1": address.line1,
        "line2": address.line2,
        "city": address.city,
        "state": address.state,
        "postal_code": address.postal_code,
        "country": address.country,
    });

    let order = OrderActive {
        id: Set(order_id),
        user_id: Set(user.user_id),
        order_number: Set(build_order_number(order_id)),
        status: Set(STATUS_PENDING.into()),
        payment_status: Set(PAYMENT_UNPAID.into()),
        payment_method: Set(payment_method),
        payment_reference: Set(None),
        subtotal: Set(totals.subtotal),
        discount_total: Set(totals.discount_total),
        total_amount: Set(totals.total_amount),
        shipping_address: Set(shipping_address),
        notes: Set(payload.notes.filter(|n| !n.trim().is_empty())),
        paid_at: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut items = Vec::with_capacity(lines.len());
    for line in lines {
        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(line.product.id),
            variant_id: Set(line.variant.as_ref().map(|v| v.id)),
            product_name: Set(line.product.name.clone()),
            variant_name: Set(line.variant.as_ref().map(|v| v.name.clone())),
            quantity: Set(line.quantity),
            unit_price: Set(line.unit_price),
            original_price: Set(line.original_price),
            line_total: Set(line.unit_price * i64::from(line.quantity)),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;

        inventory_service::shift_stock(&txn, item.product_id, item.variant_id, -item.quantity)
            .await?;
        items.push(OrderItem::from(item));
    }

    CartItems::delete_many()
        .filter(CartCol::UserId.eq(user.user_id))
        .exec(&txn)
        .await?;

    txn.commit().await?;

    tracing::info!(
        order_id = %order.id,
        order_number = %order.order_number,
        total = order.total_amount,
        "order placed"
    );
    audit::record(
        &state.pool,
        user.user_id,
        "checkout",
        "orders",
        serde_json::json!({ "order_id": order.id, "total_amount": order.total_amount }),
    )
    .await;

    Ok(ApiResponse::success(
        "Checkout success",
        OrderWithItems {
            order: Order::from(order),
            items,
        },
        Some(Meta::empty()),
    ))
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let scope = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    paged_orders(state, scope, query, "Orders").await
}

/// Caller's orders as seen by the payment screens.
pub async fn list_payment_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let scope = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    paged_orders(state, scope, query, "Payments").await
}

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_permission(user, "orders", "read")?;
    paged_orders(state, Condition::all(), query, "Orders").await
}

async fn paged_orders(
    state: &AppState,
    scope: Condition,
    query: OrderListQuery,
    message: &str,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination().normalize();

    let mut condition = scope;
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(OrderCol::Status.eq(status.clone()));
    }
    if let Some(payment_status) = query.payment_status.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(OrderCol::PaymentStatus.eq(payment_status.clone()));
    }

    let mut finder = Orders::find().filter(condition);
    finder = match query.sort_order.unwrap_or(SortOrder::Desc) {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;
    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Order::from)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(message, OrderList { items: orders }, Some(meta)))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find_by_id(id)
        .filter(OrderCol::UserId.eq(user.user_id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    let data = with_items(&state.orm, order).await?;
    Ok(ApiResponse::success("OK", data, Some(Meta::empty())))
}

pub async fn get_order_admin(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_permission(user, "orders", "read")?;
    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    let data = with_items(&state.orm, order).await?;
    Ok(ApiResponse::success("Order found", data, Some(Meta::empty())))
}

pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let txn = state.orm.begin().await?;
    let order = Orders::find_by_id(id)
        .filter(OrderCol::UserId.eq(user.user_id))
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    if !can_transition(&order.status, STATUS_CANCELLED) {
        return Err(AppError::BadRequest(format!(
            "order in status {} cannot be cancelled",
            order.status
        )));
    }

    let order = apply_status(&txn, order, STATUS_CANCELLED).await?;
    let data = with_items(&txn, order).await?;
    txn.commit().await?;

    audit::record(
        &state.pool,
        user.user_id,
        "order_cancel",
        "orders",
        serde_json::json!({ "order_id": id }),
    )
    .await;

    Ok(ApiResponse::success("Order cancelled", data, Some(Meta::empty())))
}

pub async fn confirm_payment(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: ConfirmPaymentRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let reference = payload.payment_reference.trim().to_string();
    if reference.is_empty() {
        return Err(AppError::BadRequest("payment_reference is required".into()));
    }

    let txn = state.orm.begin().await?;
    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    if order.payment_status != PAYMENT_UNPAID {
        return Err(AppError::BadRequest("Order already paid".into()));
    }
    if order.status == STATUS_CANCELLED {
        return Err(AppError::BadRequest("Order is cancelled".into()));
    }

    let now = Utc::now();
    let advance = order.status == STATUS_PENDING;
    let mut active: OrderActive = order.into();
    active.payment_status = Set(PAYMENT_PAID.into());
    active.payment_reference = Set(Some(reference));
    active.paid_at = Set(Some(now.into()));
    if advance {
        active.status = Set(STATUS_PROCESSING.into());
    }
    active.updated_at = Set(now.into());
    let order = active.update(&txn).await?;
    let data = with_items(&txn, order).await?;
    txn.commit().await?;

    audit::record(
        &state.pool,
        user.user_id,
        "order_paid",
        "orders",
        serde_json::json!({ "order_id": id }),
    )
    .await;

    Ok(ApiResponse::success("Payment recorded", data, Some(Meta::empty())))
}

pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    ensure_permission(user, "orders", "update")?;
    let target = payload.status.trim().to_lowercase();
    if !ORDER_STATUSES.contains(&target.as_str()) {
        return Err(AppError::BadRequest("Invalid order status".into()));
    }

    let txn = state.orm.begin().await?;
    let existing = Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    if !can_transition(&existing.status, &target) {
        return Err(AppError::BadRequest(format!(
            "cannot move order from {} to {}",
            existing.status, target
        )));
    }
    let from = existing.status.clone();
    let order = apply_status(&txn, existing, &target).await?;
    txn.commit().await?;

    audit::record(
        &state.pool,
        user.user_id,
        "order_status_update",
        "orders",
        serde_json::json!({ "order_id": order.id, "from": from, "to": order.status }),
    )
    .await;

    Ok(ApiResponse::success("Order updated", Order::from(order), Some(Meta::empty())))
}

/// Writes a validated status. Cancelling puts the stock back and refunds paid orders;
/// delivering a cash-on-delivery order settles its payment.
async fn apply_status<C: ConnectionTrait>(
    db: &C,
    order: OrderModel,
    target: &str,
) -> AppResult<OrderModel> {
    let now = Utc::now();
    if target == STATUS_CANCELLED {
        let items = OrderItems::find()
            .filter(OrderItemCol::OrderId.eq(order.id))
            .all(db)
            .await?;
        for item in &items {
            inventory_service::shift_stock(db, item.product_id, item.variant_id, item.quantity)
                .await?;
        }
    }

    let payment_status = order.payment_status.clone();
    let payment_method = order.payment_method.clone();
    let mut active: OrderActive = order.into();
    active.status = Set(target.to_string());
    if target == STATUS_CANCELLED && payment_status == PAYMENT_PAID {
        active.payment_status = Set(PAYMENT_REFUNDED.into());
    }
    if target == STATUS_DELIVERED && payment_method == "cod" && payment_status == PAYMENT_UNPAID {
        active.payment_status = Set(PAYMENT_PAID.into());
        active.paid_at = Set(Some(now.into()));
    }
    active.updated_at = Set(now.into());
    Ok(active.update(db).await?)
}

async fn with_items<C: ConnectionTrait>(db: &C, order: OrderModel) -> AppResult<OrderWithItems> {
    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .order_by_asc(OrderItemCol::CreatedAt)
        .all(db)
        .await?
        .into_iter()
        .map(OrderItem::from)
        .collect();
    Ok(OrderWithItems {
        order: Order::from(order),
        items,
    })
}

/// Item row for a caller-owned order, locked for update. Call inside a transaction.
pub async fn find_owned_item<C: ConnectionTrait>(
    db: &C,
    user_id: Uuid,
    order_id: Uuid,
    item_id: Uuid,
) -> AppResult<(OrderModel, OrderItemModel)> {
    let order = Orders::find_by_id(order_id)
        .filter(OrderCol::UserId.eq(user_id))
        .one(db)
        .await?
        .ok_or(AppError::NotFound)?;
    // Row lock serializes concurrent return requests for the same line.
    let item = OrderItems::find_by_id(item_id)
        .filter(OrderItemCol::OrderId.eq(order.id))
        .lock(LockType::Update)
        .one(db)
        .await?
        .ok_or_else(|| AppError::BadRequest("order item does not belong to order".into()))?;
    Ok((order, item))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_machine() {
        assert!(can_transition("pending", "processing"));
        assert!(can_transition("processing", "shipped"));
        assert!(can_transition("shipped", "delivered"));
        assert!(can_transition("pending", "cancelled"));
        assert!(can_transition("processing", "cancelled"));

        assert!(!can_transition("shipped", "cancelled"));
        assert!(!can_transition("delivered", "pending"));
        assert!(!can_transition("pending", "delivered"));
        assert!(!can_transition("cancelled", "processing"));
    }

    #[test]
    fn totals_balance() {
        let totals = compute_totals(&[(800, 1_000, 2), (500, 500, 3)]);
        assert_eq!(totals.subtotal, 3_500);
        assert_eq!(totals.total_amount, 3_100);
        assert_eq!(totals.discount_total, 400);
        assert_eq!(totals.subtotal - totals.discount_total, totals.total_amount);
    }

    #[test]
    fn order_numbers_are_dated_and_short() {
        let id = Uuid::parse_str("abcdef12-0000-0000-0000-000000000000").unwrap();
        let number = build_order_number(id);
        assert!(number.starts_with("DFK-"));
        assert!(number.ends_with("-ABCDEF12"));
        assert_eq!(number.len(), "DFK-20260101-ABCDEF12".len());
    }
}
