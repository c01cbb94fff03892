//! augv-eye: vision collaborators for the AUGV pipeline
//!
//! Frame decoding, the detector capability (with a null and an HTTP-backed
//! implementation), road outline extraction from the simulation's painted
//! road surface, and annotated debug snapshots.

pub mod annotate;
pub mod detector;
pub mod error;
pub mod frame;
pub mod remote;
pub mod road;

pub use detector::{DetectedObject, Detector, NullDetector};
pub use error::VisionError;
pub use frame::Frame;
pub use remote::RemoteDetector;
pub use road::extract_outline;
