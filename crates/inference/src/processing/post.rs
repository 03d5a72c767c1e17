use ndarray::{ArrayViewD, Axis, Ix2};
use preprocess::Letterbox;

/// Most boxes kept per frame after NMS.
pub const MAX_DETECTIONS: usize = 300;

/// One object found in a frame, in source-frame pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: u32,
}

impl Detection {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    pub fn iou(&self, other: &Detection) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 { 0.0 } else { inter / union }
    }
}

/// Decodes YOLO head output into detections.
pub struct PostProcessor {
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl PostProcessor {
    pub fn new(iou_threshold: f32) -> Self {
        Self {
            iou_threshold,
            max_detections: MAX_DETECTIONS,
        }
    }

    /// Decode `[1, 4 + num_classes, anchors]` predictions (boxes cxcywh in model-input
    /// pixels, class scores already activated). `[1, anchors, 4 + num_classes]` is
    /// accepted too.
    #[tracing::instrument(level = "debug", skip(self, predictions, letterbox))]
    pub fn decode(
        &self,
        predictions: &ArrayViewD<f32>,
        letterbox: &Letterbox,
        confidence_threshold: f32,
    ) -> anyhow::Result<Vec<Detection>> {
        let shape = predictions.shape();
        if shape.len() != 3 || shape[0] != 1 {
            anyhow::bail!("Expected predictions shaped [1, C, A], got {:?}", shape);
        }

        let preds = predictions.index_axis(Axis(0), 0).into_dimensionality::<Ix2>()?;
        // channels are the short axis (84 vs 8400 for COCO)
        let preds = if preds.nrows() <= preds.ncols() {
            preds
        } else {
            preds.reversed_axes()
        };

        if preds.nrows() <= 4 {
            anyhow::bail!("Predictions carry no class scores: {:?}", shape);
        }

        let mut candidates = Vec::new();
        for anchor in preds.columns() {
            let (class_idx, confidence) = anchor
                .iter()
                .skip(4)
                .copied()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |best, (i, s)| {
                    if s > best.1 { (i, s) } else { best }
                });

            if confidence < confidence_threshold {
                continue;
            }

            let (x1, y1, x2, y2) = cxcywh_to_xyxy(anchor[0], anchor[1], anchor[2], anchor[3]);
            let (x1, y1) = letterbox.to_source(x1, y1);
            let (x2, y2) = letterbox.to_source(x2, y2);

            candidates.push(Detection {
                x1,
                y1,
                x2,
                y2,
                confidence,
                class_id: class_idx as u32,
            });
        }

        Ok(self.non_max_suppression(candidates))
    }

    /// Class-aware greedy NMS, highest confidence first.
    pub fn non_max_suppression(&self, mut candidates: Vec<Detection>) -> Vec<Detection> {
        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let mut kept: Vec<Detection> = Vec::new();
        for candidate in candidates {
            if kept.len() >= self.max_detections {
                break;
            }
            let suppressed = kept.iter().any(|k| {
                k.class_id == candidate.class_id && k.iou(&candidate) > self.iou_threshold
            });
            if !suppressed {
                kept.push(candidate);
            }
        }
        kept
    }
}

#[inline]
fn cxcywh_to_xyxy(cx: f32, cy: f32, w: f32, h: f32) -> (f32, f32, f32, f32) {
    (cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, IxDyn};

    fn identity_letterbox(size: u32) -> Letterbox {
        Letterbox {
            scale: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
            orig_width: size,
            orig_height: size,
        }
    }

    /// `[1, 4 + num_classes, n]` tensor from per-anchor boxes and (class, score).
    fn predictions(anchors: &[([f32; 4], usize, f32)], num_classes: usize) -> Array<f32, IxDyn> {
        let n = anchors.len();
        let channels = 4 + num_classes;
        let mut data = vec![0.0f32; channels * n];
        for (i, (bbox, class, score)) in anchors.iter().enumerate() {
            for (c, v) in bbox.iter().enumerate() {
                data[c * n + i] = *v;
            }
            data[(4 + class) * n + i] = *score;
        }
        Array::from_shape_vec(IxDyn(&[1, channels, n]), data).unwrap()
    }

    fn det(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32, class_id: u32) -> Detection {
        Detection {
            x1,
            y1,
            x2,
            y2,
            confidence,
            class_id,
        }
    }

    #[test]
    fn test_cxcywh_to_xyxy() {
        assert_eq!(
            cxcywh_to_xyxy(50.0, 40.0, 20.0, 10.0),
            (40.0, 35.0, 60.0, 45.0)
        );
    }

    #[test]
    fn test_confidence_threshold_filtering() {
        let preds = predictions(
            &[
                ([100.0, 100.0, 20.0, 20.0], 0, 0.2),
                ([200.0, 200.0, 20.0, 20.0], 1, 0.25),
                ([300.0, 300.0, 20.0, 20.0], 2, 0.9),
            ],
            3,
        );

        let detections = PostProcessor::new(0.7)
            .decode(&preds.view(), &identity_letterbox(640), 0.25)
            .unwrap();

        assert_eq!(detections.len(), 2, "Scores below 0.25 are dropped");
        assert_eq!(detections[0].class_id, 2, "Sorted by confidence");
        assert_eq!(detections[1].class_id, 1, "Boundary score is kept");
    }

    #[test]
    fn test_argmax_picks_best_class() {
        let mut preds = predictions(&[([320.0, 320.0, 40.0, 40.0], 1, 0.6)], 4);
        preds[[0, 4 + 3, 0]] = 0.8;

        let detections = PostProcessor::new(0.7)
            .decode(&preds.view(), &identity_letterbox(640), 0.25)
            .unwrap();

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class_id, 3);
        assert!((detections[0].confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_coordinate_inverse_transformation() {
        // 800x600 letterboxed into 640: scale 0.8, 80px padding top and bottom
        let letterbox = Letterbox {
            scale: 0.8,
            offset_x: 0.0,
            offset_y: 80.0,
            orig_width: 800,
            orig_height: 600,
        };
        let preds = predictions(&[([320.0, 320.0, 128.0, 128.0], 0, 0.9)], 1);

        let detections = PostProcessor::new(0.7)
            .decode(&preds.view(), &letterbox, 0.25)
            .unwrap();

        let d = &detections[0];
        // model-space (256, 256, 384, 384) -> source (320, 220, 480, 380)
        assert!((d.x1 - 320.0).abs() < 0.1, "x1 = {}", d.x1);
        assert!((d.y1 - 220.0).abs() < 0.1, "y1 = {}", d.y1);
        assert!((d.x2 - 480.0).abs() < 0.1, "x2 = {}", d.x2);
        assert!((d.y2 - 380.0).abs() < 0.1, "y2 = {}", d.y2);
    }

    #[test]
    fn test_coordinates_clamped_to_image_bounds() {
        let preds = predictions(
            &[
                ([5.0, 5.0, 40.0, 40.0], 0, 0.9),
                ([395.0, 395.0, 40.0, 40.0], 1, 0.9),
            ],
            2,
        );

        let detections = PostProcessor::new(0.7)
            .decode(&preds.view(), &identity_letterbox(400), 0.25)
            .unwrap();

        let low = detections.iter().find(|d| d.class_id == 0).unwrap();
        assert_eq!((low.x1, low.y1), (0.0, 0.0));
        let high = detections.iter().find(|d| d.class_id == 1).unwrap();
        assert_eq!((high.x2, high.y2), (400.0, 400.0));
    }

    #[test]
    fn test_anchor_major_layout_accepted() {
        // [1, anchors, 4 + nc] with more anchors than channels
        let channel_major = predictions(
            &[
                ([100.0, 100.0, 10.0, 10.0], 0, 0.9),
                ([200.0, 200.0, 10.0, 10.0], 0, 0.1),
                ([300.0, 300.0, 10.0, 10.0], 0, 0.1),
                ([400.0, 400.0, 10.0, 10.0], 0, 0.1),
                ([500.0, 500.0, 10.0, 10.0], 0, 0.1),
                ([600.0, 600.0, 10.0, 10.0], 0, 0.1),
            ],
            1,
        );
        let mut anchor_major = channel_major.clone();
        anchor_major.swap_axes(1, 2);

        let post = PostProcessor::new(0.7);
        let a = post
            .decode(&channel_major.view(), &identity_letterbox(640), 0.5)
            .unwrap();
        let b = post
            .decode(&anchor_major.view(), &identity_letterbox(640), 0.5)
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn test_nms_is_class_aware() {
        let post = PostProcessor::new(0.5);
        let kept = post.non_max_suppression(vec![
            det(0.0, 0.0, 100.0, 100.0, 0.9, 0),
            det(5.0, 5.0, 100.0, 100.0, 0.8, 0),
            det(5.0, 5.0, 100.0, 100.0, 0.7, 1),
            det(200.0, 200.0, 300.0, 300.0, 0.6, 0),
        ]);

        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].confidence, 0.9);
        assert!(kept.iter().any(|d| d.class_id == 1), "Other class survives");
        assert!(!kept.iter().any(|d| d.confidence == 0.8), "Overlap suppressed");
    }

    #[test]
    fn test_max_detections_cap() {
        let post = PostProcessor::new(0.7);
        let candidates = (0..400)
            .map(|i| {
                let x = (i % 20) as f32 * 50.0;
                let y = (i / 20) as f32 * 50.0;
                det(x, y, x + 10.0, y + 10.0, 0.5, 0)
            })
            .collect();

        assert_eq!(post.non_max_suppression(candidates).len(), MAX_DETECTIONS);
    }

    #[test]
    fn test_zero_detections_when_all_below_threshold() {
        let preds = predictions(
            &[
                ([100.0, 100.0, 10.0, 10.0], 0, 0.1),
                ([200.0, 200.0, 10.0, 10.0], 1, 0.2),
            ],
            2,
        );
        let detections = PostProcessor::new(0.7)
            .decode(&preds.view(), &identity_letterbox(640), 0.25)
            .unwrap();
        assert!(detections.is_empty());
    }

    #[test]
    fn test_malformed_output_rejected() {
        let flat = Array::<f32, IxDyn>::zeros(IxDyn(&[1, 84]));
        assert!(
            PostProcessor::new(0.7)
                .decode(&flat.view(), &identity_letterbox(640), 0.25)
                .is_err()
        );
    }
}
