use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        addresses::{AddressList, AddressRequest},
        admin::{DashboardStats, InventoryAdjustRequest, UpdateUserRequest, UserList},
        auth::{LoginRequest, LoginResponse, RegisterRequest, UpdateProfileRequest},
        blog::{BlogPostList, CreateBlogPostRequest, UpdateBlogPostRequest},
        cart::{AddToCartRequest, CartLine, CartView, UpdateCartItemRequest},
        categories::{CategoryList, CreateCategoryRequest, UpdateCategoryRequest},
        flash_sales::{
            CreateFlashSaleRequest, FlashSaleItemRequest, FlashSaleList, FlashSaleProduct,
            FlashSaleWithProducts, UpdateFlashSaleRequest,
        },
        orders::{CheckoutRequest, ConfirmPaymentRequest, OrderList, OrderWithItems, UpdateOrderStatusRequest},
        products::{
            AdminProductList, CreateProductRequest, CreateVariantRequest, ProductDetail, ProductList,
            RatingSummary, UpdateProductRequest, UpdateVariantRequest, VariantCard,
        },
        referrals::{ReferralSummary, ReferredUser},
        returns::{CreateReturnRequest, ReturnList, UpdateReturnRequest},
        reviews::{CreateReviewRequest, ProductReviews, PublicReview, ReviewList, UpdateReviewStatusRequest},
        wishlist::{AddWishlistRequest, WishlistProductList},
    },
    models::{
        Address, BlogPost, CartItem, Category, FlashSale, FlashSaleItem, Order, OrderItem, Product,
        ProductCard, ProductVariant, ReturnRequest, Review, User, WishlistItem,
    },
    pricing::{PriceQuote, PriceSource},
    response::{ApiResponse, Meta},
    routes::{admin, auth, cart, health, orders, params, public, returns, reviews, users},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(title = "DFix Kart API", description = "Storefront and back-office API for DFix Kart"),
    paths(
        health::health_check,
        auth::register,
        auth::login,
        auth::me,
        public::list_categories,
        public::get_category,
        public::list_products,
        public::get_product,
        public::list_product_reviews,
        public::active_flash_sales,
        public::list_posts,
        public::get_post,
        cart::get_cart,
        cart::add_to_cart,
        cart::update_cart_item,
        cart::remove_cart_item,
        cart::clear_cart,
        users::get_profile,
        users::update_profile,
        users::list_addresses,
        users::create_address,
        users::update_address,
        users::delete_address,
        users::set_default_address,
        users::list_wishlist,
        users::add_to_wishlist,
        users::remove_from_wishlist,
        users::my_referrals,
        orders::list_orders,
        orders::checkout,
        orders::get_order,
        orders::cancel_order,
        orders::list_payment_orders,
        orders::confirm_payment,
        reviews::create_review,
        reviews::delete_review,
        returns::create_return,
        returns::list_returns,
        returns::get_return,
        returns::update_return,
        admin::dashboard,
        admin::list_users,
        admin::get_user,
        admin::update_user,
        admin::list_all_orders,
        admin::get_order_admin,
        admin::update_order_status,
        admin::list_low_stock,
        admin::adjust_inventory,
        admin::list_reviews,
        admin::moderate_review,
        admin::list_returns,
        admin::list_categories,
        admin::create_category,
        admin::update_category,
        admin::delete_category,
        admin::list_products,
        admin::create_product,
        admin::update_product,
        admin::delete_product,
        admin::list_variants,
        admin::create_variant,
        admin::update_variant,
        admin::delete_variant,
        admin::list_flash_sales,
        admin::create_flash_sale,
        admin::update_flash_sale,
        admin::delete_flash_sale,
        admin::add_flash_sale_item,
        admin::remove_flash_sale_item,
        admin::list_posts,
        admin::create_post,
        admin::update_post,
        admin::delete_post
    ),
    components(
        schemas(
            User,
            Category,
            Product,
            ProductVariant,
            ProductCard,
            CartItem,
            Address,
            Order,
            OrderItem,
            WishlistItem,
            Review,
            ReturnRequest,
            FlashSale,
            FlashSaleItem,
            BlogPost,
            PriceQuote,
            PriceSource,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            UpdateProfileRequest,
            AddressRequest,
            AddressList,
            AddToCartRequest,
            UpdateCartItemRequest,
            CartLine,
            CartView,
            CategoryList,
            CreateCategoryRequest,
            UpdateCategoryRequest,
            CreateProductRequest,
            UpdateProductRequest,
            CreateVariantRequest,
            UpdateVariantRequest,
            VariantCard,
            RatingSummary,
            ProductDetail,
            ProductList,
            AdminProductList,
            CheckoutRequest,
            ConfirmPaymentRequest,
            UpdateOrderStatusRequest,
            OrderWithItems,
            OrderList,
            AddWishlistRequest,
            WishlistProductList,
            CreateReviewRequest,
            UpdateReviewStatusRequest,
            PublicReview,
            ProductReviews,
            ReviewList,
            CreateReturnRequest,
            UpdateReturnRequest,
            ReturnList,
            CreateFlashSaleRequest,
            UpdateFlashSaleRequest,
            FlashSaleItemRequest,
            FlashSaleProduct,
            FlashSaleWithProducts,
            FlashSaleList,
            CreateBlogPostRequest,
            UpdateBlogPostRequest,
            BlogPostList,
            ReferredUser,
            ReferralSummary,
            UpdateUserRequest,
            UserList,
            InventoryAdjustRequest,
            DashboardStats,
            params::Pagination,
            params::SortOrder,
            params::ProductSortBy,
            params::ProductQuery,
            params::OrderListQuery,
            params::StatusQuery,
            params::UserListQuery,
            params::LowStockQuery,
            health::HealthData,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<ProductDetail>,
            ApiResponse<CartView>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<AdminProductList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Registration, login and token identity"),
        (name = "Catalog", description = "Public categories and products"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Users", description = "Profile, addresses and referrals"),
        (name = "Wishlist", description = "Saved products"),
        (name = "Orders", description = "Checkout and order history"),
        (name = "Payment", description = "Payment confirmation"),
        (name = "Reviews", description = "Product reviews"),
        (name = "Returns", description = "Return requests"),
        (name = "Flash Sales", description = "Time-boxed promotions"),
        (name = "Blog", description = "Published posts"),
        (name = "Admin", description = "Back-office endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
