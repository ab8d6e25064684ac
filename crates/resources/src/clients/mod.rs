//! `ResourceBookingClient` implementations.

pub mod fault;
pub mod http;
pub mod store_backed;

pub use fault::FaultInjectingClient;
pub use http::HttpResourceClient;
pub use store_backed::StoreBackedClient;
