//! Profiling support via Tracy.
//!
//! Enabled with the `profiling` Cargo feature. The host application must
//! start a `tracy_client::Client` before any instrumented code runs. When
//! the feature is disabled every macro compiles to nothing.
//!
//! ```ignore
//! use redlilium_denoiser::profile_scope;
//!
//! fn rebuild() {
//!     profile_scope!("denoiser_rebuild");
//!     // ...
//! }
//! ```

#[cfg(feature = "profiling")]
pub use tracy_client::{self, Client, Span, span};

/// Create a profiling span for the current scope.
///
/// The span ends when the scope exits.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_scope {
    ($name:expr) => {
        let _profile_span = $crate::profiling::span!($name);
    };
}

/// Create a profiling span (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_scope {
    ($name:expr) => {};
}
