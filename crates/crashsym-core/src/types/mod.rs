//! # Types
//!
//! Value types shared by the whole pipeline.
//!
//! These types keep addresses, CPU families, register state, and validated
//! images apart from the loose JSON shapes crash reports arrive in, so the
//! rest of the crate can work with checked values.

pub mod address;
pub mod arch;
pub mod image;
pub mod registers;
pub mod sdk;

// Re-export all public types
pub use address::Address;
pub use arch::Architecture;
pub use image::{is_valid_image, DebugImage, ImageType};
pub use registers::RegisterSnapshot;
pub use sdk::SdkInfo;
