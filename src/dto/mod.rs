pub mod addresses;
pub mod admin;
pub mod auth;
pub mod blog;
pub mod cart;
pub mod categories;
pub mod flash_sales;
pub mod orders;
pub mod products;
pub mod referrals;
pub mod returns;
pub mod reviews;
pub mod wishlist;
