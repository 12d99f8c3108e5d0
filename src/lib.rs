pub mod audio_capture;
pub mod codec;
pub mod config;
pub mod devices;
pub mod error;
pub mod generate_content;
pub mod live;
pub mod playback;
pub mod prompts;
pub mod script;
pub mod tts;
pub mod visualize;

pub use codec::{SampleBuffer, TransportBlob};
pub use error::{NewsroomError, Result};
