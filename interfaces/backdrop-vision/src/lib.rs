//! # Backdrop Vision
//!
//! Swap out the background behind a subject. A segmentation model turns a few clicked points into
//! a mask of the subject, then a text conditioned inpainting model regenerates everything outside
//! of it.
//!
//! The models themselves are plugged in through the [`Segmenter`] and [`Inpainter`] traits, so
//! this crate only contains the glue around them:
//!
//! - [`MaskAdapter`] picks the most confident segmentation candidate and flips it into a [`Mask`]
//!   where the background is the region to fill.
//! - [`InpaintAdapter`] turns the [`Mask`] into the single channel image inpainting models expect
//!   and seeds the run from a [`PromptBundle`].
//! - [`BackdropApp`] chains both behind the synchronous [`RequestHandler`] interface.
//!
//! ## Usage
//!
//! ```rust, ignore
//! use backdrop_vision::*;
//!
//! let app = BackdropApp::new(segmenter, inpainter);
//! let response = app.handle(SwapRequest {
//!     image: load_image("car.png")?,
//!     points: ForegroundPoints::new(vec![Point::new(150, 170), Point::new(300, 250)])?,
//!     prompt: PromptBundle::new("a car driving on Mars. Studio lights, 1970s")
//!         .with_negative_prompt("artifacts, low quality, distortion"),
//! })?;
//! response.result.save("result.png")?;
//! ```

#![warn(missing_docs)]

mod adapter;
pub use adapter::*;
mod app;
pub use app::*;
mod capability;
pub use capability::*;
mod error;
pub use error::*;
mod io;
pub use io::*;
mod mask;
pub use mask::*;
mod point;
pub use point::*;
mod prompt;
pub use prompt::*;
