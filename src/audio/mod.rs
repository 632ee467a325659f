pub mod convert;
pub mod decoder;
pub mod error;
pub mod processor;
pub mod waveform;

pub use error::AnalysisError;
pub use processor::{AudioProcessor, ProcessorConfig, SymphoniaProcessor};
pub use waveform::amplitude_envelope;
