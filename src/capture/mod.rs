pub mod classifier;
pub mod command;
pub mod session;
pub mod supervisor;

pub use classifier::{FailureClassifier, FailureKind, SubstringClassifier};
pub use session::CaptureSession;
pub use supervisor::{CaptureSupervisor, LaunchSpec};
