//! Remote data gateway for the SweetNest REST API.
//!
//! One function per remote operation. Gateways never touch the query cache;
//! cache policy lives in `crate::resources`.

mod error;
mod notifications;
mod reviews;
mod transport;
pub mod types;

pub use error::GatewayError;
pub use notifications::NotificationsApi;
pub use reviews::ReviewsApi;
pub use transport::ApiTransport;
