//! YOLOv8 object detection model

use sightline_core::{BoundingBox, Detection};

/// COCO class names (80 classes)
pub const COCO_CLASSES: &[&str] = &[
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat",
    "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack",
    "umbrella", "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball",
    "kite", "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket",
    "bottle", "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple",
    "sandwich", "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair",
    "couch", "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
    "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator",
    "book", "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

/// Square network input side
pub const INPUT_SIZE: u32 = 640;

const MAX_DETECTIONS: usize = 100;

#[derive(Debug, Clone, Copy)]
struct Candidate {
    class_id: usize,
    score: f32,
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
}

fn iou(a: &Candidate, b: &Candidate) -> f32 {
    let ix1 = a.x1.max(b.x1);
    let iy1 = a.y1.max(b.y1);
    let ix2 = a.x2.min(b.x2);
    let iy2 = a.y2.min(b.y2);
    let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
    let area_a = (a.x2 - a.x1).max(0.0) * (a.y2 - a.y1).max(0.0);
    let area_b = (b.x2 - b.x1).max(0.0) * (b.y2 - b.y1).max(0.0);
    let union = area_a + area_b - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// Decode a YOLOv8 output tensor laid out as `[1, 4 + classes, anchors]`.
///
/// Boxes are `(cx, cy, w, h)` in network input pixels and are scaled back to
/// a `frame_width` x `frame_height` frame. Class-wise non-maximum suppression
/// is applied with `iou_threshold`.
pub fn decode_yolov8(
    output: &[f32],
    num_attributes: usize,
    num_anchors: usize,
    confidence_threshold: f32,
    iou_threshold: f32,
    frame_width: u32,
    frame_height: u32,
) -> Vec<Detection> {
    if num_attributes <= 4 || output.len() < num_attributes * num_anchors {
        return Vec::new();
    }

    let num_classes = num_attributes - 4;
    let scale_x = frame_width as f32 / INPUT_SIZE as f32;
    let scale_y = frame_height as f32 / INPUT_SIZE as f32;
    let at = |attr: usize, anchor: usize| output[attr * num_anchors + anchor];

    let mut candidates = Vec::new();
    for anchor in 0..num_anchors {
        let mut best_class = 0;
        let mut best_score = f32::MIN;
        for class_id in 0..num_classes {
            let score = at(4 + class_id, anchor);
            if score > best_score {
                best_score = score;
                best_class = class_id;
            }
        }
        if best_score < confidence_threshold {
            continue;
        }

        let (cx, cy, w, h) = (at(0, anchor), at(1, anchor), at(2, anchor), at(3, anchor));
        candidates.push(Candidate {
            class_id: best_class,
            score: best_score,
            x1: (cx - w / 2.0) * scale_x,
            y1: (cy - h / 2.0) * scale_y,
            x2: (cx + w / 2.0) * scale_x,
            y2: (cy + h / 2.0) * scale_y,
        });
    }

    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if kept.len() >= MAX_DETECTIONS {
            break;
        }
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == candidate.class_id && iou(k, &candidate) > iou_threshold);
        if !suppressed {
            kept.push(candidate);
        }
    }

    kept.into_iter()
        .map(|c| {
            let label = COCO_CLASSES
                .get(c.class_id)
                .map(|s| s.to_string())
                .unwrap_or_else(|| format!("class {}", c.class_id));
            Detection::new(
                label,
                BoundingBox::new(c.x1 as i32, c.y1 as i32, c.x2 as i32, c.y2 as i32),
            )
        })
        .collect()
}

#[cfg(feature = "onnx")]
pub use onnx::YoloModel;

#[cfg(feature = "onnx")]
mod onnx {
    use super::{decode_yolov8, INPUT_SIZE};
    use crate::detection::Detector;
    use crate::error::VisionError;
    use crate::frame::Frame;
    use image::imageops::{self, FilterType};
    use ort::session::builder::GraphOptimizationLevel;
    use ort::session::Session;
    use ort::value::Tensor;
    use parking_lot::Mutex;
    use sightline_core::Detection;
    use std::path::Path;
    use tracing::{debug, info};

    /// YOLOv8 detector running on ONNX Runtime
    pub struct YoloModel {
        session: Mutex<Session>,
        confidence_threshold: f32,
        iou_threshold: f32,
    }

    impl YoloModel {
        pub fn new(model_path: &Path, confidence_threshold: f32, iou_threshold: f32) -> Result<Self, VisionError> {
            let session = Session::builder()?
                .with_optimization_level(GraphOptimizationLevel::Level3)?
                .commit_from_file(model_path)
                .map_err(|e| VisionError::Ort(format!("Failed to load YOLO model {:?}: {}", model_path, e)))?;

            info!("YOLO model loaded from {:?}", model_path);

            Ok(Self {
                session: Mutex::new(session),
                confidence_threshold,
                iou_threshold,
            })
        }

        /// Resize to the network input and lay out as normalized CHW floats
        fn preprocess(&self, frame: &Frame) -> Result<Tensor<f32>, VisionError> {
            let resized = imageops::resize(frame.image(), INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);
            let plane = (INPUT_SIZE * INPUT_SIZE) as usize;
            let mut data = vec![0.0f32; plane * 3];
            for (i, pixel) in resized.pixels().enumerate() {
                data[i] = pixel.0[0] as f32 / 255.0;
                data[plane + i] = pixel.0[1] as f32 / 255.0;
                data[2 * plane + i] = pixel.0[2] as f32 / 255.0;
            }
            let shape = [1usize, 3, INPUT_SIZE as usize, INPUT_SIZE as usize];
            Ok(Tensor::from_array((shape, data.into_boxed_slice()))?)
        }
    }

    impl Detector for YoloModel {
        fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, VisionError> {
            let input = self.preprocess(frame)?;

            let mut session = self.session.lock();
            let outputs = session
                .run(ort::inputs![input])
                .map_err(|e| VisionError::Ort(format!("YOLO inference failed: {}", e)))?;

            let (shape, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| VisionError::Ort(format!("Failed to extract output tensor: {}", e)))?;

            debug!("YOLO output shape: {:?}", shape);
            if shape.len() != 3 {
                return Err(VisionError::Model(format!("Unexpected YOLO output rank {}", shape.len())));
            }

            Ok(decode_yolov8(
                data,
                shape[1] as usize,
                shape[2] as usize,
                self.confidence_threshold,
                self.iou_threshold,
                frame.width(),
                frame.height(),
            ))
        }

        fn name(&self) -> &str {
            "yolov8"
        }
    }
}
