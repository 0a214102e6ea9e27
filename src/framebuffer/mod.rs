//! # Software Framebuffer
//!
//! The packed-pixel surface a head draws into, and the dirty region that
//! records what changed since the last flush.
//!
//! ## Modules
//!
//! - `pixel_buffer`: `PixelBuffer`, an ARGB surface implementing
//!   embedded-graphics `DrawTarget`
//! - `region`: `Region`, a rectangle set with sorted extraction
//!
//! ## Update Flow
//!
//! 1. Drawing operations write ARGB words into the pixel buffer
//! 2. Each write unions its bounding rectangle into the region
//! 3. The renderer flushes the sorted rectangles, then clears the region

pub mod pixel_buffer;
pub mod region;

pub use pixel_buffer::PixelBuffer;
pub use region::Region;
