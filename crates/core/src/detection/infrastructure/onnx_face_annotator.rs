//! UltraFace detector with optional landmark and age/gender heads, via `ort`.
//!
//! The detector pass runs on the full frame; the secondary models run on a
//! square crop around each kept detection. Which heads exist is decided by
//! the loaded model set, and `depth()` reports the resulting annotation depth.

use std::path::Path;

use crate::detection::domain::face_annotator::FaceAnnotator;
use crate::models::registry::LoadedModels;
use crate::shared::face::{AnnotationDepth, Face, FaceAttributes, FaceBox, Gender};
use crate::shared::frame::Frame;

/// UltraFace RFB-320 input resolution.
const DETECTOR_INPUT_W: u32 = 320;
const DETECTOR_INPUT_H: u32 = 240;

/// Landmark model input resolution (square).
const LANDMARKS_INPUT: u32 = 192;

/// Points produced by the 106-point landmark model.
const LANDMARK_POINTS: usize = 106;

/// Age/gender model input resolution (square).
const AGE_GENDER_INPUT: u32 = 96;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f32 = 0.3;

/// Margin added around a detection box before cropping for the secondary
/// models, as a fraction of the longer box side.
const CROP_MARGIN: f32 = 0.2;

pub struct OnnxFaceAnnotator {
    detector: ort::session::Session,
    landmarks: Option<ort::session::Session>,
    age_gender: Option<ort::session::Session>,
    confidence: f32,
}

impl OnnxFaceAnnotator {
    /// Build a session for every artifact in the loaded set.
    pub fn from_models(
        models: &LoadedModels,
        confidence: f32,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let detector = build_session(models.detector())?;
        let landmarks = models.landmarks().map(build_session).transpose()?;
        let age_gender = models.age_gender().map(build_session).transpose()?;
        Ok(Self {
            detector,
            landmarks,
            age_gender,
            confidence,
        })
    }

    fn detect_faces(&mut self, frame: &Frame) -> Result<Vec<RawDet>, Box<dyn std::error::Error>> {
        // 1. Preprocess: resize to 320x240, normalize (px - 127) / 128, NCHW
        let input_tensor = preprocess_detector(frame);

        // 2. Inference
        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.detector.run(ort::inputs![input_value])?;

        // UltraFace outputs two tensors:
        // - scores: [1, 4420, 2] (background, face)
        // - boxes:  [1, 4420, 4] (corners, normalized to [0,1])
        if outputs.len() < 2 {
            return Err(
                format!("detector model expected 2 outputs, got {}", outputs.len()).into(),
            );
        }
        let scores = outputs[0].try_extract_array::<f32>()?;
        let boxes = outputs[1].try_extract_array::<f32>()?;
        let score_data = scores.as_slice().ok_or("Cannot get score slice")?;
        let box_data = boxes.as_slice().ok_or("Cannot get box slice")?;

        // 3. Keep face-class candidates above the confidence threshold
        let fw = frame.width() as f32;
        let fh = frame.height() as f32;
        let count = (score_data.len() / 2).min(box_data.len() / 4);
        let mut raw_dets = Vec::new();
        for i in 0..count {
            let score = score_data[i * 2 + 1];
            if score < self.confidence {
                continue;
            }
            let corners = &box_data[i * 4..i * 4 + 4];
            let x1 = (corners[0] * fw).clamp(0.0, fw);
            let y1 = (corners[1] * fh).clamp(0.0, fh);
            let x2 = (corners[2] * fw).clamp(0.0, fw);
            let y2 = (corners[3] * fh).clamp(0.0, fh);
            if x2 <= x1 || y2 <= y1 {
                continue;
            }
            raw_dets.push(RawDet {
                x1,
                y1,
                x2,
                y2,
                score,
            });
        }

        // 4. NMS
        Ok(nms(&mut raw_dets, NMS_IOU_THRESH))
    }
}

impl FaceAnnotator for OnnxFaceAnnotator {
    fn annotate(&mut self, frame: &Frame) -> Result<Vec<Face>, Box<dyn std::error::Error>> {
        let detections = self.detect_faces(frame)?;

        let mut faces = Vec::with_capacity(detections.len());
        for det in detections {
            let bbox = FaceBox {
                x: det.x1,
                y: det.y1,
                width: det.x2 - det.x1,
                height: det.y2 - det.y1,
            };
            let crop = square_crop(&bbox, frame.width(), frame.height());
            let landmarks = match self.landmarks.as_mut() {
                Some(session) => Some(run_landmarks(session, frame, &crop)?),
                None => None,
            };
            let attributes = match self.age_gender.as_mut() {
                Some(session) => Some(run_age_gender(session, frame, &crop)?),
                None => None,
            };
            faces.push(Face {
                bbox,
                score: det.score,
                landmarks,
                attributes,
            });
        }
        Ok(faces)
    }

    fn depth(&self) -> AnnotationDepth {
        if self.age_gender.is_some() {
            AnnotationDepth::Full
        } else if self.landmarks.is_some() {
            AnnotationDepth::WithLandmarks
        } else {
            AnnotationDepth::Detection
        }
    }
}

fn build_session(path: &Path) -> Result<ort::session::Session, Box<dyn std::error::Error>> {
    Ok(ort::session::Session::builder()?
        .with_execution_providers(preferred_execution_providers())?
        .commit_from_file(path)?)
}

/// Platform-preferred ONNX execution providers, CPU as the implicit fallback.
fn preferred_execution_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![]
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Resize to the detector input and normalize with UltraFace's `(px-127)/128`.
fn preprocess_detector(frame: &Frame) -> ndarray::Array4<f32> {
    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;
    let tw = DETECTOR_INPUT_W as usize;
    let th = DETECTOR_INPUT_H as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, th, tw));
    for y in 0..th {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / th as f64) as usize).min(src_h - 1);
        for x in 0..tw {
            let src_x = (((x as f64 + 0.5) * src_w as f64 / tw as f64) as usize).min(src_w - 1);
            for c in 0..3 {
                tensor[[0, c, y, x]] = (src[[src_y, src_x, c]] as f32 - 127.0) / 128.0;
            }
        }
    }
    tensor
}

/// Square crop region in frame pixels, fully inside the frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct CropRect {
    x: u32,
    y: u32,
    size: u32,
}

/// Square crop around a box with margin, clamped to the frame bounds.
fn square_crop(bbox: &FaceBox, frame_w: u32, frame_h: u32) -> CropRect {
    let side = (bbox.width.max(bbox.height) * (1.0 + CROP_MARGIN))
        .min(frame_w.min(frame_h) as f32)
        .max(1.0);
    let cx = bbox.x + bbox.width / 2.0;
    let cy = bbox.y + bbox.height / 2.0;
    let x = (cx - side / 2.0).clamp(0.0, frame_w as f32 - side);
    let y = (cy - side / 2.0).clamp(0.0, frame_h as f32 - side);
    CropRect {
        x: x as u32,
        y: y as u32,
        size: side as u32,
    }
}

/// Nearest-neighbor resample of a square crop to `target`, raw f32 pixels.
///
/// The landmark and age/gender models take unnormalized pixel values.
fn preprocess_crop(frame: &Frame, crop: &CropRect, target: u32) -> ndarray::Array4<f32> {
    let src = frame.as_ndarray();
    let t = target as usize;
    let size = crop.size as usize;
    let x0 = crop.x as usize;
    let y0 = crop.y as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, t, t));
    for y in 0..t {
        let src_y = y0 + (((y as f64 + 0.5) * size as f64 / t as f64) as usize).min(size - 1);
        for x in 0..t {
            let src_x = x0 + (((x as f64 + 0.5) * size as f64 / t as f64) as usize).min(size - 1);
            for c in 0..3 {
                tensor[[0, c, y, x]] = src[[src_y, src_x, c]] as f32;
            }
        }
    }
    tensor
}

// ---------------------------------------------------------------------------
// Secondary heads
// ---------------------------------------------------------------------------

fn run_landmarks(
    session: &mut ort::session::Session,
    frame: &Frame,
    crop: &CropRect,
) -> Result<Vec<(f32, f32)>, Box<dyn std::error::Error>> {
    let input_tensor = preprocess_crop(frame, crop, LANDMARKS_INPUT);
    let input_value = ort::value::Tensor::from_array(input_tensor)?;
    let outputs = session.run(ort::inputs![input_value])?;
    if outputs.len() == 0 {
        return Err("landmark model produced no outputs".into());
    }
    let raw = outputs[0].try_extract_array::<f32>()?;
    let data = raw.as_slice().ok_or("Cannot get landmark slice")?;
    if data.len() < LANDMARK_POINTS * 2 {
        return Err(format!("landmark output too short: {}", data.len()).into());
    }
    Ok(map_landmarks(data, crop))
}

/// Map normalized `[-1, 1]` landmark pairs from crop space to frame space.
fn map_landmarks(data: &[f32], crop: &CropRect) -> Vec<(f32, f32)> {
    let half = LANDMARKS_INPUT as f32 / 2.0;
    let scale = crop.size as f32 / LANDMARKS_INPUT as f32;
    (0..LANDMARK_POINTS)
        .map(|i| {
            let cx = (data[i * 2] + 1.0) * half;
            let cy = (data[i * 2 + 1] + 1.0) * half;
            (crop.x as f32 + cx * scale, crop.y as f32 + cy * scale)
        })
        .collect()
}

fn run_age_gender(
    session: &mut ort::session::Session,
    frame: &Frame,
    crop: &CropRect,
) -> Result<FaceAttributes, Box<dyn std::error::Error>> {
    let input_tensor = preprocess_crop(frame, crop, AGE_GENDER_INPUT);
    let input_value = ort::value::Tensor::from_array(input_tensor)?;
    let outputs = session.run(ort::inputs![input_value])?;
    if outputs.len() == 0 {
        return Err("age/gender model produced no outputs".into());
    }
    let raw = outputs[0].try_extract_array::<f32>()?;
    let data = raw.as_slice().ok_or("Cannot get attribute slice")?;
    if data.len() < 3 {
        return Err(format!("attribute output too short: {}", data.len()).into());
    }
    Ok(decode_attributes(data))
}

/// Decode `[female_score, male_score, age/100]` into face attributes.
fn decode_attributes(data: &[f32]) -> FaceAttributes {
    let (p_female, p_male) = softmax2(data[0], data[1]);
    let (gender, gender_probability) = if p_male >= p_female {
        (Gender::Male, p_male)
    } else {
        (Gender::Female, p_female)
    };
    FaceAttributes {
        age: (data[2] * 100.0).clamp(0.0, 120.0),
        gender,
        gender_probability,
    }
}

fn softmax2(a: f32, b: f32) -> (f32, f32) {
    let m = a.max(b);
    let ea = (a - m).exp();
    let eb = (b - m).exp();
    (ea / (ea + eb), eb / (ea + eb))
}

// ---------------------------------------------------------------------------
// NMS
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct RawDet {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    score: f32,
}

/// Greedy NMS: sort by score descending, suppress overlapping boxes.
fn nms(dets: &mut [RawDet], iou_thresh: f32) -> Vec<RawDet> {
    dets.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; dets.len()];

    for i in 0..dets.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(dets[i].clone());
        for j in (i + 1)..dets.len() {
            if suppressed[j] {
                continue;
            }
            if bbox_iou(&dets[i], &dets[j]) > iou_thresh {
                suppressed[j] = true;
            }
        }
    }
    keep
}

fn bbox_iou(a: &RawDet, b: &RawDet) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = (a.x2 - a.x1) * (a.y2 - a.y1);
    let area_b = (b.x2 - b.x1) * (b.y2 - b.y1);
    inter / (area_a + area_b - inter)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
