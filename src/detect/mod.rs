//! Object detection.
//!
//! `DetectorBackend` is the model boundary: pixels in, labelled boxes out.
//! `PersonDetector` sits on top and applies the person-only view every HTTP
//! route and analytics job uses.

mod backend;
mod backends;
mod person;
mod result;

pub use backend::{build_backend, DetectorBackend, SharedBackend};
pub use backends::ScriptedBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use person::PersonDetector;
pub use result::{non_max_suppression, Detection, ObjectClass, PersonBox};
