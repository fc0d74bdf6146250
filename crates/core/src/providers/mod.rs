pub mod elevenlabs;
pub mod gemini;

pub use elevenlabs::ElevenLabsSynthesizer;
pub use gemini::GeminiModel;
