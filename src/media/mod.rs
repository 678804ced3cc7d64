//! Image dimension inspection and minimum-size normalization.
//!
//! Both operations are synchronous and CPU/file bound; async callers run
//! them on the blocking pool.

mod error;
mod inspect;
mod upscale;

pub use error::MediaError;
pub use inspect::{Dimensions, inspect};
pub use upscale::{
    MAX_TARGET_PIXELS, TEMP_SUFFIX, ensure_minimum_size, target_dimensions, temp_sibling,
};
