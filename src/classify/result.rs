//! Classification output and its human-readable report.

/// Detections at or below this confidence are dropped from reporting.
pub const MIN_REPORTED_CONFIDENCE: f32 = 1e-6;

/// Per-stage timing breakdown of one inference call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Timing {
    pub dsp_ms: u32,
    pub classification_ms: u32,
    pub anomaly_ms: u32,
}

/// One labeled, bounded, confidence-scored classifier output.
#[derive(Clone, Debug)]
pub struct Detection {
    pub label: String,
    /// Confidence in `0..=1`.
    pub value: f32,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Result of one inference call: timing plus zero-or-more detections.
/// Produced once, consumed immediately for reporting, not retained.
#[derive(Clone, Debug, Default)]
pub struct ClassificationResult {
    pub timing: Timing,
    pub detections: Vec<Detection>,
}

impl ClassificationResult {
    /// Detections that survive the near-zero confidence filter.
    pub fn reported_detections(&self) -> impl Iterator<Item = &Detection> {
        self.detections
            .iter()
            .filter(|det| det.value > MIN_REPORTED_CONFIDENCE)
    }

    /// Emit the timing line and one line per surviving detection.
    pub fn log_report(&self) {
        log::info!(
            "timing: dsp {} ms, inference {} ms, anomaly {} ms",
            self.timing.dsp_ms,
            self.timing.classification_ms,
            self.timing.anomaly_ms
        );
        for det in self.reported_detections() {
            log::info!(
                "  {} ({:.2}) [ x: {}, y: {}, width: {}, height: {} ]",
                det.label,
                det.value,
                det.x,
                det.y,
                det.width,
                det.height
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(label: &str, value: f32) -> Detection {
        Detection {
            label: label.to_string(),
            value,
            x: 0,
            y: 0,
            width: 8,
            height: 8,
        }
    }

    #[test]
    fn zero_confidence_detections_are_filtered_from_reporting() {
        let result = ClassificationResult {
            timing: Timing::default(),
            detections: vec![
                detection("object", 0.91),
                detection("background", 0.0),
                detection("noise", 1e-9),
            ],
        };

        let reported: Vec<_> = result.reported_detections().collect();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].label, "object");
    }
}
