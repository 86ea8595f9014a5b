pub mod classify;
pub mod error;
pub mod host;
pub mod installer;
pub mod locate;
pub mod manifest;

pub use classify::PathClassifier;
pub use installer::{InstallRequest, Installer};
