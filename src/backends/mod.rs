//! Backend implementations for different inference runtimes
//!
//! - Tract backend (pure Rust, portable, default)
//! - ONNX Runtime backend (native runtime, optional)

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "tract")]
pub mod tract;

// Mock backends shared by module tests
#[cfg(test)]
pub mod test_utils;

#[cfg(feature = "onnx")]
pub use self::onnx::OnnxBackend;

#[cfg(feature = "tract")]
pub use self::tract::TractBackend;
