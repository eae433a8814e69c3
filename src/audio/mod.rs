pub mod control;
pub mod input;
pub mod lease;
pub mod routing;
pub mod sink_inputs;

pub use control::{AudioControl, ControlOutput, PactlControl};
pub use input::{AudioBackend, AudioInput};
pub use lease::SinkLease;
pub use routing::AudioRouter;
pub use sink_inputs::SinkInput;
