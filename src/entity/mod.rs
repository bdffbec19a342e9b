pub mod addresses;
pub mod blog_posts;
pub mod cart_items;
pub mod categories;
pub mod flash_sale_items;
pub mod flash_sales;
pub mod order_items;
pub mod orders;
pub mod product_variants;
pub mod products;
pub mod referrals;
pub mod return_requests;
pub mod reviews;
pub mod users;
pub mod wishlist_items;

pub use addresses::Entity as Addresses;
pub use blog_posts::Entity as BlogPosts;
pub use cart_items::Entity as CartItems;
pub use categories::Entity as Categories;
pub use flash_sale_items::Entity as FlashSaleItems;
pub use flash_sales::Entity as FlashSales;
pub use order_items::Entity as OrderItems;
pub use orders::Entity as Orders;
pub use product_variants::Entity as ProductVariants;
pub use products::Entity as Products;
pub use referrals::Entity as Referrals;
pub use return_requests::Entity as ReturnRequests;
pub use reviews::Entity as Reviews;
pub use users::Entity as Users;
pub use wishlist_items::Entity as WishlistItems;
