pub mod analyzer;
pub mod engine;

pub use analyzer::{AnalyzerAck, HttpAnalyzer, RemoteAnalyzer};
pub use engine::{EngineClient, EnginePayload, HttpEngineClient};
