pub mod marker;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use marker::{MarkerDetector, PERSON_MARKER, VEHICLE_MARKER};

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;
