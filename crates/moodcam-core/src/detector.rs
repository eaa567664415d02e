//! Face localization with an SCRFD model run through ONNX Runtime.
//!
//! The frame is letterboxed into a square input, the score and bbox heads of
//! the three stride levels are decoded into candidates, and overlapping
//! candidates are merged by NMS. Landmark heads are never read.

use crate::classifier::ClassifierError;
use crate::decode::PixelGrid;
use crate::types::FaceBox;
use image::imageops::{self, FilterType};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}; download it and place it in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("emotion classifier: {0}")]
    Classifier(#[from] ClassifierError),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// A face candidate in frame coordinates, before integer conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceCandidate {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl FaceCandidate {
    /// Clamp to a `frame_w` × `frame_h` frame and convert to whole pixels.
    ///
    /// The near edge is floored and the far edge ceiled, so the integer box
    /// covers the candidate. Returns `None` if nothing remains inside the frame.
    pub fn to_face_box(&self, frame_w: u32, frame_h: u32) -> Option<FaceBox> {
        if !(self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite())
        {
            return None;
        }
        let x1 = self.x.max(0.0).floor();
        let y1 = self.y.max(0.0).floor();
        let x2 = (self.x + self.width).min(frame_w as f32).ceil();
        let y2 = (self.y + self.height).min(frame_h as f32).ceil();
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(FaceBox {
            x: x1 as u32,
            y: y1 as u32,
            width: (x2 - x1) as u32,
            height: (y2 - y1) as u32,
        })
    }
}

/// How a frame was fitted into the square model input.
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// Output tensor indices for one stride: (score_idx, bbox_idx).
type StrideOutputIndices = (usize, usize);

/// SCRFD-based face localizer.
pub struct FaceDetector {
    session: Session,
    input_size: usize,
    /// (score, bbox) output slots for strides 8, 16 and 32.
    stride_indices: [StrideOutputIndices; 3],
}

impl FaceDetector {
    /// `input_size` is the side of the square model input and must be a
    /// multiple of 32 (320 for fast mode, 640 for accurate).
    pub fn load(model_path: &str, input_size: usize) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }
        if input_size == 0 || input_size % 32 != 0 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD input size must be a positive multiple of 32, got {input_size}"
            )));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = model_path,
            input_size,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        if output_names.len() < 2 * SCRFD_STRIDES.len() {
            return Err(DetectorError::InferenceFailed(format!(
                "expected score and bbox outputs for {} strides, model has {} outputs",
                SCRFD_STRIDES.len(),
                output_names.len()
            )));
        }

        let stride_indices = discover_output_indices(&output_names);
        tracing::debug!(?stride_indices, "SCRFD output slots");

        Ok(Self {
            session,
            input_size,
            stride_indices,
        })
    }

    /// Detect faces in an RGB frame, returning candidates sorted by confidence.
    pub fn detect(&mut self, grid: &PixelGrid) -> Result<Vec<FaceCandidate>, DetectorError> {
        let (input, letterbox) = self.preprocess(grid);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (&stride, &(score_slot, bbox_slot)) in SCRFD_STRIDES.iter().zip(&self.stride_indices) {
            let (_, scores) = outputs[score_slot].try_extract_tensor::<f32>().map_err(|e| {
                DetectorError::InferenceFailed(format!("score head, stride {stride}: {e}"))
            })?;
            let (_, bboxes) = outputs[bbox_slot].try_extract_tensor::<f32>().map_err(|e| {
                DetectorError::InferenceFailed(format!("bbox head, stride {stride}: {e}"))
            })?;
            candidates.extend(decode_stride(
                scores,
                bboxes,
                stride,
                self.input_size,
                &letterbox,
                SCRFD_CONFIDENCE_THRESHOLD,
            ));
        }

        let faces = nms(candidates, SCRFD_NMS_THRESHOLD);
        tracing::debug!(faces = faces.len(), "face localization finished");
        Ok(faces)
    }

    /// Letterbox an RGB frame into a normalized NCHW float tensor.
    fn preprocess(&self, grid: &PixelGrid) -> (Array4<f32>, LetterboxInfo) {
        let size = self.input_size;
        let (width, height) = (grid.width() as f32, grid.height() as f32);

        let scale = (size as f32 / width).min(size as f32 / height);
        let new_w = ((width * scale).round() as usize).clamp(1, size);
        let new_h = ((height * scale).round() as usize).clamp(1, size);
        let pad_x = (size - new_w) as f32 / 2.0;
        let pad_y = (size - new_h) as f32 / 2.0;

        let resized =
            imageops::resize(grid.as_rgb(), new_w as u32, new_h as u32, FilterType::Triangle);

        // Padding stays 0.0, the normalized value of SCRFD_MEAN.
        let (left, top) = (pad_x.floor() as usize, pad_y.floor() as usize);
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for (c, &v) in pixel.0.iter().enumerate() {
                tensor[[0, c, top + y as usize, left + x as usize]] = (v as f32 - SCRFD_MEAN) / SCRFD_STD;
            }
        }

        (tensor, LetterboxInfo { scale, pad_x, pad_y })
    }
}

/// Map stride levels to output slots.
///
/// Exports that name their heads `score_<stride>` / `bbox_<stride>` are
/// matched by name. Anything else gets the insightface layout: scores in
/// slots 0..3, bboxes in 3..6.
fn discover_output_indices(names: &[String]) -> [StrideOutputIndices; 3] {
    let find = |prefix: &str, stride: usize| -> Option<usize> {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| n == &target)
    };

    let named: Option<Vec<StrideOutputIndices>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| Some((find("score", stride)?, find("bbox", stride)?)))
        .collect();

    match named {
        Some(indices) => {
            tracing::info!("SCRFD outputs matched by name");
            [indices[0], indices[1], indices[2]]
        }
        None => {
            tracing::info!(?names, "SCRFD output names unrecognized; using positional slots");
            [(0, 3), (1, 4), (2, 5)]
        }
    }
}

/// Candidates from one stride level whose score exceeds `threshold`, in
/// frame coordinates.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    stride: usize,
    input_size: usize,
    letterbox: &LetterboxInfo,
    threshold: f32,
) -> Vec<FaceCandidate> {
    let grid = input_size / stride;
    let num_anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;

    let mut detections = Vec::new();

    for idx in 0..num_anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= threshold {
            continue;
        }

        let Some(offsets) = bboxes.get(idx * 4..idx * 4 + 4) else {
            continue;
        };
        let cell = idx / SCRFD_ANCHORS_PER_CELL;
        let step = stride as f32;
        let (cx, cy) = ((cell % grid) as f32 * step, (cell / grid) as f32 * step);

        // Offsets are distances from the anchor centre to each edge, in strides.
        let to_frame_x = |v: f32| (v - letterbox.pad_x) / letterbox.scale;
        let to_frame_y = |v: f32| (v - letterbox.pad_y) / letterbox.scale;
        let left = to_frame_x(cx - offsets[0] * step);
        let top = to_frame_y(cy - offsets[1] * step);
        let right = to_frame_x(cx + offsets[2] * step);
        let bottom = to_frame_y(cy + offsets[3] * step);

        detections.push(FaceCandidate {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
            confidence: score,
        });
    }

    detections
}

/// Greedy non-maximum suppression. Output is ordered by confidence, highest first.
fn nms(mut candidates: Vec<FaceCandidate>, iou_threshold: f32) -> Vec<FaceCandidate> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<FaceCandidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if kept.iter().all(|k| iou(k, &candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}

/// Intersection over union of two candidates; 0 for degenerate boxes.
fn iou(a: &FaceCandidate, b: &FaceCandidate) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter_area = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union_area = a.width * a.height + b.width * b.height - inter_area;

    if union_area > 0.0 {
        inter_area / union_area
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(x: f32, y: f32, w: f32, h: f32, confidence: f32) -> FaceCandidate {
        FaceCandidate { x, y, width: w, height: h, confidence }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_iou() {
        let a = cand(0.0, 0.0, 10.0, 10.0, 1.0);
        assert_eq!(iou(&a, &a), 1.0);
        assert_eq!(iou(&a, &cand(20.0, 20.0, 10.0, 10.0, 1.0)), 0.0);
        // half-width shift: 50 shared of 150 total
        assert!((iou(&a, &cand(5.0, 0.0, 10.0, 10.0, 1.0)) - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(iou(&cand(0.0, 0.0, 0.0, 0.0, 1.0), &cand(0.0, 0.0, 0.0, 0.0, 1.0)), 0.0);
    }

    #[test]
    fn test_nms_suppresses_overlapping_and_sorts() {
        let detections = vec![
            cand(200.0, 200.0, 50.0, 50.0, 0.7),
            cand(5.0, 5.0, 100.0, 100.0, 0.8),
            cand(0.0, 0.0, 100.0, 100.0, 0.9),
        ];
        let kept: Vec<f32> = nms(detections, 0.4).iter().map(|c| c.confidence).collect();
        assert_eq!(kept, vec![0.9, 0.7]);
    }

    #[test]
    fn test_nms_empty() {
        assert!(nms(vec![], 0.4).is_empty());
    }

    #[test]
    fn test_decode_stride_maps_through_letterbox() {
        // One anchor at grid cell (1, 0) of stride 32 on a 64px input.
        let letterbox = LetterboxInfo { scale: 0.5, pad_x: 0.0, pad_y: 16.0 };
        let mut scores = vec![0.0f32; 2 * 2 * SCRFD_ANCHORS_PER_CELL];
        let mut bboxes = vec![0.0f32; scores.len() * 4];
        let idx = SCRFD_ANCHORS_PER_CELL; // anchor_idx 1 → cx = 32, cy = 0
        scores[idx] = 0.9;
        bboxes[idx * 4..idx * 4 + 4].copy_from_slice(&[0.5, -1.0, 0.5, 2.0]);

        let dets = decode_stride(&scores, &bboxes, 32, 64, &letterbox, 0.5);
        assert_eq!(dets.len(), 1);
        let d = &dets[0];
        // letterboxed: x1 = 16, y1 = 32, x2 = 48, y2 = 64
        assert!((d.x - 32.0).abs() < 1e-4);
        assert!((d.y - 32.0).abs() < 1e-4);
        assert!((d.width - 64.0).abs() < 1e-4);
        assert!((d.height - 64.0).abs() < 1e-4);
    }

    #[test]
    fn test_decode_stride_respects_threshold() {
        let letterbox = LetterboxInfo { scale: 1.0, pad_x: 0.0, pad_y: 0.0 };
        let scores = vec![0.5f32; 2 * 2 * SCRFD_ANCHORS_PER_CELL];
        let bboxes = vec![1.0f32; scores.len() * 4];
        assert!(decode_stride(&scores, &bboxes, 32, 64, &letterbox, 0.5).is_empty());
    }

    #[test]
    fn test_to_face_box_clamps_to_frame() {
        let c = cand(-4.5, 10.2, 30.0, 200.0, 0.9);
        let b = c.to_face_box(100, 80).unwrap();
        assert_eq!(b, FaceBox::new(0, 10, 26, 70));
    }

    #[test]
    fn test_to_face_box_outside_frame() {
        let c = cand(150.0, 10.0, 20.0, 20.0, 0.9);
        assert!(c.to_face_box(100, 100).is_none());
        let c = cand(f32::NAN, 10.0, 20.0, 20.0, 0.9);
        assert!(c.to_face_box(100, 100).is_none());
    }

    #[test]
    fn test_output_slots_by_name() {
        let grouped = names(&["score_8", "score_16", "score_32", "bbox_8", "bbox_16", "bbox_32"]);
        assert_eq!(discover_output_indices(&grouped), [(0, 3), (1, 4), (2, 5)]);

        let interleaved = names(&[
            "bbox_8", "kps_8", "score_8", "bbox_16", "kps_16", "score_16", "bbox_32", "kps_32",
            "score_32",
        ]);
        assert_eq!(discover_output_indices(&interleaved), [(2, 0), (5, 3), (8, 6)]);
    }

    #[test]
    fn test_output_slots_positional() {
        let numeric = names(&["448", "471", "494", "451", "474", "497"]);
        assert_eq!(discover_output_indices(&numeric), [(0, 3), (1, 4), (2, 5)]);
        // One missing head disables name matching entirely.
        let partial = names(&["score_8", "score_16", "bbox_8", "bbox_16", "x", "y"]);
        assert_eq!(discover_output_indices(&partial), [(0, 3), (1, 4), (2, 5)]);
    }
}
