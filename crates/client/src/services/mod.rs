//! Thin services over the gateway for catalog, selling, profiles and comments.
//!
//! Each service borrows the gateway for the duration of one call site, the
//! same way the stores take `&G` per operation.

mod catalog;
mod comments;
mod listing;
mod profile;

pub use catalog::CatalogService;
pub use comments::{CommentService, MAX_COMMENT_CHARS};
pub use listing::{IMAGE_BUCKET, ListingImage, ListingService, MAX_IMAGE_BYTES};
pub use profile::ProfileService;
