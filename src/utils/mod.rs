//! Shared utility functions

pub mod validation;

pub use validation::{
    validate_mask_output_shape, validate_pixel_dimensions, validate_rgba_buffer,
};
