pub mod overlay;
pub mod recorder;
pub mod seekable;
pub mod state;

pub use overlay::PauseOverlay;
pub use recorder::Recorder;
pub use seekable::{make_seekable, seekable_path, RemuxDecision};
pub use state::{RecorderConfig, RecorderState};
