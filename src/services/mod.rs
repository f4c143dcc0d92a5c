//! Service layer: one service per concern, each a cheap-to-clone handle
//! around the shared database pool.

pub mod cart;
pub mod checkout;
pub mod coupons;
pub mod orders;
pub mod products;
pub mod search;
pub mod stock;

pub use cart::{AddToCartInput, CartLine, CartService};
pub use checkout::{
    CardCheckoutInput, CardSessionInit, CheckoutLine, CheckoutService, CodCheckoutInput,
    PriceLock, ShippingInput, VerifyWalletInput, WalletCheckoutInput, WalletRequest,
};
pub use coupons::{CouponService, CouponValidation, CreateCouponInput};
pub use orders::{NewOrder, NewOrderLine, OrderService, OrderView, ShippingInfo};
pub use products::{
    CreateProductInput, CreateVariantInput, ProductService, ProductWithVariants,
    RecommendedProduct, UpdateProductInput,
};
pub use search::{SearchPage, SearchQuery, SearchService, SortMode, Suggestion};
pub use stock::Availability;
