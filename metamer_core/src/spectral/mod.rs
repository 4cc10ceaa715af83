//! Frequency-domain machinery for the cortical model.
//!
//! [`fft`] wraps `rustfft` for 2-D matrices; [`pyramid`] builds the complex
//! steerable pyramid on top of it and provides the adjoint used for
//! gradients.

pub mod fft;
pub mod pyramid;

pub use fft::{fftshift, ifftshift, Fft2};
pub use pyramid::{max_pyramid_height, PyramidBands, SteerablePyramid};
