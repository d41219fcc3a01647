use lazy_static::lazy_static;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ==== Detection Decoder Metrics ====
    pub static ref DETECTIONS_DECODED: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "recognition_detections_decoded_total",
                "Detector candidates by decode outcome",
            ),
            &["outcome"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref DEGENERATE_CROPS: IntCounter = {
        let metric = IntCounter::new(
            "recognition_degenerate_crops_total",
            "Detections skipped because the clamped box had no area",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Plate Validation Metrics ====
    pub static ref PLATE_CANDIDATES: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "recognition_plate_candidates_total",
                "Plate text candidates by validation result",
            ),
            &["result"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref OCR_FAILURES: IntCounter = {
        let metric = IntCounter::new(
            "recognition_ocr_failures_total",
            "Text recognition requests that reported an error",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Face Matching Metrics ====
    pub static ref FACE_MATCHES: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "recognition_face_matches_total",
                "Face verification decisions",
            ),
            &["result"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref ENROLLED_EMBEDDINGS: IntCounter = {
        let metric = IntCounter::new(
            "recognition_enrolled_embeddings_total",
            "Embeddings appended during enrollment sessions",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Inference Metrics ====
    pub static ref INFERENCE_TIME: HistogramVec = {
        let metric = HistogramVec::new(
            HistogramOpts::new(
                "recognition_inference_seconds",
                "Time spent inside model inference (excluding pre/post processing)",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.02, 0.05, 0.1, 0.2, 0.5, 1.0]),
            &["model"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };
}

/// Helper function to encode metrics in the Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| {
        prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_metrics_accessible() {
        let before = DETECTIONS_DECODED.with_label_values(&["accepted"]).get();
        DETECTIONS_DECODED.with_label_values(&["accepted"]).inc();
        assert_eq!(
            DETECTIONS_DECODED.with_label_values(&["accepted"]).get(),
            before + 1
        );
    }

    #[test]
    fn test_face_metrics_accessible() {
        FACE_MATCHES.with_label_values(&["match"]).inc();
        assert!(FACE_MATCHES.with_label_values(&["match"]).get() >= 1);
    }

    #[test]
    fn test_encode_metrics() {
        OCR_FAILURES.inc();
        INFERENCE_TIME.with_label_values(&["plate_detector"]).observe(0.01);

        let text = encode_metrics().unwrap();
        assert!(text.contains("recognition_ocr_failures_total"));
        assert!(text.contains("recognition_inference_seconds"));
    }
}
