//! Malware scanner: byte-signature search over artifact content.
//!
//! The scanner searches the raw bytes for known signatures regardless of
//! position. Scanning runs on the blocking pool under a timeout so a large
//! artifact cannot stall an async worker.

use std::time::{Duration, Instant};

/// Default signature set: the test marker `VIR`.
const DEFAULT_SIGNATURES: &[(&str, &[u8])] = &[("Test.Marker.VIR", b"VIR")];

const DEFAULT_SCAN_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Clean,
    /// Signature name that matched.
    Infected(String),
    Error(String),
}

#[derive(Clone)]
pub struct SignatureScanner {
    signatures: Vec<(String, Vec<u8>)>,
    timeout_secs: u64,
}

impl Default for SignatureScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl SignatureScanner {
    pub fn new() -> Self {
        Self {
            signatures: DEFAULT_SIGNATURES
                .iter()
                .map(|(name, sig)| (name.to_string(), sig.to_vec()))
                .collect(),
            timeout_secs: DEFAULT_SCAN_TIMEOUT_SECS,
        }
    }

    /// Create with a custom signature set (used by tests).
    pub fn with_signatures(signatures: Vec<(String, Vec<u8>)>) -> Self {
        Self {
            signatures,
            timeout_secs: DEFAULT_SCAN_TIMEOUT_SECS,
        }
    }

    /// Scan in-memory data on the blocking pool.
    pub async fn scan_bytes(&self, data: &[u8]) -> ScanOutcome {
        let start = Instant::now();
        let data = data.to_vec();
        let signatures = self.signatures.clone();
        let size = data.len();

        let result = tokio::time::timeout(
            Duration::from_secs(self.timeout_secs),
            tokio::task::spawn_blocking(move || {
                for (name, signature) in &signatures {
                    if !signature.is_empty()
                        && data.windows(signature.len()).any(|w| w == signature.as_slice())
                    {
                        return ScanOutcome::Infected(name.clone());
                    }
                }
                ScanOutcome::Clean
            }),
        )
        .await;

        match result {
            Ok(Ok(outcome)) => {
                match &outcome {
                    ScanOutcome::Clean => tracing::info!(
                        size_bytes = size,
                        duration_ms = start.elapsed().as_millis(),
                        "Scan completed: clean"
                    ),
                    ScanOutcome::Infected(name) => tracing::warn!(
                        size_bytes = size,
                        signature = %name,
                        duration_ms = start.elapsed().as_millis(),
                        "Scan detected signature"
                    ),
                    ScanOutcome::Error(_) => {}
                }
                outcome
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Scan task panicked");
                ScanOutcome::Error(format!("Scan task failed: {}", e))
            }
            Err(_) => {
                tracing::error!(
                    size_bytes = size,
                    timeout_secs = self.timeout_secs,
                    "Scan timed out"
                );
                ScanOutcome::Error("Scan timed out".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clean_bytes_pass() {
        let scanner = SignatureScanner::new();
        assert_eq!(scanner.scan_bytes(b"perfectly harmless").await, ScanOutcome::Clean);
    }

    #[tokio::test]
    async fn signature_found_anywhere() {
        let scanner = SignatureScanner::new();
        for payload in [&b"VIRxxxx"[..], b"xxVIRxx", b"xxxxVIR"] {
            match scanner.scan_bytes(payload).await {
                ScanOutcome::Infected(name) => assert_eq!(name, "Test.Marker.VIR"),
                other => panic!("expected infected, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn partial_signature_is_clean() {
        let scanner = SignatureScanner::new();
        assert_eq!(scanner.scan_bytes(b"VI R V IR").await, ScanOutcome::Clean);
        assert_eq!(scanner.scan_bytes(b"").await, ScanOutcome::Clean);
    }

    #[tokio::test]
    async fn lowercase_marker_is_clean() {
        // Signatures are byte-exact; lowercase must not match.
        let scanner = SignatureScanner::new();
        assert_eq!(scanner.scan_bytes(b"vir").await, ScanOutcome::Clean);
    }

    #[tokio::test]
    async fn custom_signatures() {
        let scanner = SignatureScanner::with_signatures(vec![(
            "Custom".to_string(),
            vec![0xDE, 0xAD],
        )]);
        match scanner.scan_bytes(&[0x00, 0xDE, 0xAD, 0x01]).await {
            ScanOutcome::Infected(name) => assert_eq!(name, "Custom"),
            other => panic!("expected infected, got {:?}", other),
        }
    }
}
