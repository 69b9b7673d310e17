pub mod gemini;
pub mod media;

pub use gemini::{ChatSession, GeminiClient, GeneratedImage, Part};
