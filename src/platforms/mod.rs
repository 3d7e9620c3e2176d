//! Platforms module
//!
//! The review platform SDK:
//! - The `ReviewPlatform` trait defining the interface every integration implements
//! - The registry used for slug-based lookup
//! - Individual platform implementations

pub mod google;
pub mod registry;
pub mod trait_;

pub use google::{GOOGLE_PLATFORM_SLUG, GooglePlatform};
pub use registry::{PlatformRegistry, RegistryError};
pub use trait_::{
    AuthorizeParams, RemoteAccount, RemoteLocation, RemoteRating, RemoteReview, ReviewPage,
    ReviewPlatform, TokenGrant, UpstreamError,
};
