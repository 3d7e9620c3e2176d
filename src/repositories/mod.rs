//! Repository layer
//!
//! Encapsulates SeaORM operations per table. Tenant scoping happens here so
//! handlers never build cross-tenant queries by hand.

pub mod cached_rating;
pub mod connection;
pub mod location;
pub mod review;
pub mod venue_grant;

pub use cached_rating::CachedRatingRepository;
pub use connection::ConnectionRepository;
pub use location::LocationRepository;
pub use review::{ReviewFilter, ReviewRepository, UpsertOutcome};
pub use venue_grant::VenueGrantRepository;
