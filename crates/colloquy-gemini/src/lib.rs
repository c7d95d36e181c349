// Gemini backend for the colloquy engine
//
// Implements ModelBackend against the generativelanguage.googleapis.com
// v1beta streaming API. See driver.rs for the endpoint and mapping rules.

mod driver;
mod types;

pub use driver::GeminiBackend;
