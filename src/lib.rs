
//! Read Sigma/Foveon x3f raw camera files.
//!
//! An x3f file is a little endian container with a trailing directory.
//! The directory lists property lists (utf16 key/value metadata),
//! image sections (thumbnails and raw sensor planes),
//! and camf sections (encrypted camera calibration metadata).
//!
//! ```no_run
//! use x3f::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let mut file = X3fFile::read_from_file("photo.x3f")?;
//!
//!     if let Some(properties) = file.prop() {
//!         for (name, value) in file.load_properties(properties)?.properties() {
//!             println!("{} = {}", name, value);
//!         }
//!     }
//!
//!     if let Some(raw) = file.raw() {
//!         let image = file.load_image(raw)?;
//!         println!("{} planes of raw data", image.planes().len());
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(
    rust_2018_idioms,
    future_incompatible,
    unused_extern_crates,
    unused,

    missing_copy_implementations,
    missing_debug_implementations,

    clippy::all,
    clippy::pedantic,
)]

#![deny(
    unused_must_use,
    trivial_numeric_casts,
)]

#![forbid(unsafe_code)]

#![warn(missing_docs)]


pub mod io; // public to allow for custom section byte parsing

pub mod camf;
pub mod compression;
pub mod error;
pub mod file;
pub mod image;
pub mod meta;

/// Re-exports of all types commonly required for simply reading an x3f image.
pub mod prelude {

    // main exports
    pub use crate::file::{SectionData, SectionHandle, X3fFile};

    // secondary data types
    pub use crate::camf::{Camf, CamfEntry, CamfMatrix, CamfValue, MatrixValues};
    pub use crate::error::{Error, Result};
    pub use crate::image::{ImageKind, ImageSection, PixelData, Plane, PlaneView, Samples};
    pub use crate::meta::property::PropertyList;
    pub use crate::meta::{FileHeader, SectionInfo, SectionKind, Version};
}
