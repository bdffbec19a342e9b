pub mod address_service;
pub mod admin_service;
pub mod auth_service;
pub mod blog_service;
pub mod cart_service;
pub mod catalog;
pub mod category_service;
pub mod flash_sale_service;
pub mod inventory_service;
pub mod order_service;
pub mod product_service;
pub mod referral_service;
pub mod return_service;
pub mod review_service;
pub mod wishlist_service;
