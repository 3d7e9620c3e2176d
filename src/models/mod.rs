//! # Data Models
//!
//! SeaORM entity models for the revsync service plus small shared API types.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod cached_rating;
pub mod connection;
pub mod location;
pub mod review;
pub mod venue_grant;

pub use cached_rating::Entity as CachedRating;
pub use connection::Entity as Connection;
pub use location::Entity as Location;
pub use review::Entity as Review;
pub use venue_grant::Entity as VenueGrant;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "revsync".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
