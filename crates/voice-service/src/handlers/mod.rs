//! HTTP request handlers for the voice service.

pub mod products;
pub mod ws;

pub use products::create_product;
pub use ws::products_stream;
