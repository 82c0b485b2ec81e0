//! Imgvet Services Library
//!
//! External-facing service clients and stage engines: the malware scanner,
//! the content safety client, the image analyzer, and the completion event
//! publisher.

pub mod analyzer;
pub mod events;
pub mod safety;
pub mod scanner;

pub use analyzer::{AnalysisReport, ImageAnalyzer};
pub use events::{EventPublisher, MemoryPublisher, NullPublisher, WebhookPublisher};
pub use safety::{AllowAllSafety, ContentSafety, HttpSafetyClient, SafetyVerdict};
pub use scanner::{ScanOutcome, SignatureScanner};
