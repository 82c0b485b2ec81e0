//! Image analyzer: decodes a clean artifact and derives its findings.
//!
//! The report is written to the analysis namespace as the durable result;
//! the findings are the summary attached to the status record. Decoding
//! happens on the blocking pool.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use imgvet_core::models::Finding;

/// Durable analysis result, stored as `analysis/{corrId}.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub corr_id: Uuid,
    pub analyzed_at: DateTime<Utc>,
    pub format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    pub findings: Vec<Finding>,
}

#[derive(Clone, Default)]
pub struct ImageAnalyzer;

impl ImageAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Decode the artifact and build its report. Undecodable content is not
    /// an error; it yields a report with a `corrupt` finding, since retrying
    /// a deterministic decode cannot change the outcome.
    pub async fn analyze(&self, corr_id: Uuid, data: Vec<u8>) -> Result<AnalysisReport> {
        let report = tokio::task::spawn_blocking(move || Self::analyze_blocking(corr_id, &data))
            .await
            .context("Analysis task panicked")?;

        tracing::info!(
            corr_id = %corr_id,
            format = %report.format,
            width = report.width,
            height = report.height,
            findings = report.findings.len(),
            "Image analysis completed"
        );
        Ok(report)
    }

    fn analyze_blocking(corr_id: Uuid, data: &[u8]) -> AnalysisReport {
        let format = image::guess_format(data)
            .map(|f| f.to_mime_type().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        match image::load_from_memory(data) {
            Ok(decoded) => {
                let (width, height) = (decoded.width(), decoded.height());
                let orientation = if width > height {
                    "landscape"
                } else if width < height {
                    "portrait"
                } else {
                    "square"
                };

                let findings = vec![Finding {
                    labels: vec![format.clone(), orientation.to_string()],
                    score: Some(1.0),
                }];

                AnalysisReport {
                    corr_id,
                    analyzed_at: Utc::now(),
                    format,
                    width: Some(width),
                    height: Some(height),
                    findings,
                }
            }
            Err(e) => {
                tracing::warn!(corr_id = %corr_id, error = %e, "Image failed to decode");
                AnalysisReport {
                    corr_id,
                    analyzed_at: Utc::now(),
                    format,
                    width: None,
                    height: None,
                    findings: vec![Finding {
                        labels: vec!["corrupt".to_string()],
                        score: None,
                    }],
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_pixel(width, height, Rgb::<u8>([10, 20, 30]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[tokio::test]
    async fn decodes_png_with_dimensions() {
        let analyzer = ImageAnalyzer::new();
        let report = analyzer
            .analyze(Uuid::new_v4(), png_bytes(4, 2))
            .await
            .unwrap();

        assert_eq!(report.format, "image/png");
        assert_eq!(report.width, Some(4));
        assert_eq!(report.height, Some(2));
        assert!(report.findings[0].labels.contains(&"landscape".to_string()));
    }

    #[tokio::test]
    async fn square_orientation() {
        let analyzer = ImageAnalyzer::new();
        let report = analyzer
            .analyze(Uuid::new_v4(), png_bytes(3, 3))
            .await
            .unwrap();
        assert!(report.findings[0].labels.contains(&"square".to_string()));
    }

    #[tokio::test]
    async fn undecodable_content_yields_corrupt_finding() {
        let analyzer = ImageAnalyzer::new();
        let report = analyzer
            .analyze(Uuid::new_v4(), vec![0xFF, 0xD8, 0x00, 0x01])
            .await
            .unwrap();

        assert!(report.width.is_none());
        assert_eq!(report.findings[0].labels, vec!["corrupt".to_string()]);
    }
}
