/// BlazeFace face detector using ONNX Runtime via `ort`.
///
/// Runs the short-range model on a grayscale frame, replicating the luma
/// plane into the three input channels the network expects.
use std::path::Path;

use image::GrayImage;

use crate::detection::domain::detection_params::DetectionParams;
use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::infrastructure::execution_provider::preferred_execution_providers;
use crate::shared::region::Region;

/// BlazeFace model input resolution.
const INPUT_SIZE: u32 = 128;

/// Number of BlazeFace anchors (short-range model).
const NUM_ANCHORS: usize = 896;

/// Values per anchor in the regressor output (box + 6 keypoints).
const REGRESSOR_STRIDE: usize = 16;

/// Regressors and classificators.
const EXPECTED_OUTPUTS: usize = 2;

pub struct OnnxBlazefaceDetector {
    session: ort::session::Session,
    confidence: f32,
    overlap: f64,
    min_size: (u32, u32),
    anchors: Vec<[f32; 2]>,
}

impl OnnxBlazefaceDetector {
    /// Load a BlazeFace ONNX model tuned by `params`.
    pub fn new(
        model_path: &Path,
        params: &DetectionParams,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let session = ort::session::Session::builder()?
            .with_execution_providers(preferred_execution_providers())?
            .commit_from_file(model_path)?;
        check_output_count(session.outputs().len())?;
        Ok(Self {
            session,
            confidence: params.confidence_floor(),
            overlap: params.overlap_threshold(),
            min_size: params.min_size,
            anchors: generate_anchors(),
        })
    }
}

impl FaceDetector for OnnxBlazefaceDetector {
    fn detect(&mut self, image: &GrayImage) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }

        let input_value = ort::value::Tensor::from_array(preprocess(image, INPUT_SIZE))?;
        let outputs = self.session.run(ort::inputs![input_value])?;

        // regressors: [1, 896, 16], classificators: [1, 896, 1]
        check_output_count(outputs.len())?;
        let regressors = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let reg_data = regressors.as_slice().ok_or("Cannot get regressor slice")?;
        let score_data = scores.as_slice().ok_or("Cannot get score slice")?;

        let mut candidates = decode(
            &self.anchors,
            reg_data,
            score_data,
            self.confidence,
            image.width(),
            image.height(),
        );
        let kept = nms(&mut candidates, self.overlap);

        Ok(to_regions(&kept, image.width(), image.height(), self.min_size))
    }
}

fn check_output_count(count: usize) -> Result<(), Box<dyn std::error::Error>> {
    if count < EXPECTED_OUTPUTS {
        return Err(format!(
            "BlazeFace model expected {EXPECTED_OUTPUTS} outputs, got {count}"
        )
        .into());
    }
    Ok(())
}

/// Nearest-neighbour resize to `size × size`, normalized to [0,1] NCHW with
/// the gray value copied into all three channels.
fn preprocess(image: &GrayImage, size: u32) -> ndarray::Array4<f32> {
    let src_w = image.width() as usize;
    let src_h = image.height() as usize;
    let s = size as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, s, s));
    for y in 0..s {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / s as f64) as usize).min(src_h - 1);
        for x in 0..s {
            let src_x = (((x as f64 + 0.5) * src_w as f64 / s as f64) as usize).min(src_w - 1);
            let value = image.get_pixel(src_x as u32, src_y as u32)[0] as f32 / 255.0;
            for c in 0..3 {
                tensor[[0, c, y, x]] = value;
            }
        }
    }
    tensor
}

/// Generate BlazeFace anchors for the short-range model.
///
/// Two feature maps, 16×16 and 8×8, with 2 and 6 anchors per cell.
fn generate_anchors() -> Vec<[f32; 2]> {
    let strides = [(8, 2), (16, 6)]; // (stride, anchors_per_cell)
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);

    for &(stride, num) in &strides {
        let grid_size = INPUT_SIZE as usize / stride;
        for y in 0..grid_size {
            for x in 0..grid_size {
                let cx = (x as f32 + 0.5) / grid_size as f32;
                let cy = (y as f32 + 0.5) / grid_size as f32;
                for _ in 0..num {
                    anchors.push([cx, cy]);
                }
            }
        }
    }

    anchors
}

#[derive(Clone, Debug)]
struct Candidate {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    score: f64,
}

impl Candidate {
    fn iou(&self, other: &Candidate) -> f64 {
        let inter_w = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let inter_h = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter = inter_w * inter_h;
        if inter == 0.0 {
            return 0.0;
        }
        let area_a = (self.x2 - self.x1) * (self.y2 - self.y1);
        let area_b = (other.x2 - other.x1) * (other.y2 - other.y1);
        inter / (area_a + area_b - inter)
    }
}

/// Turns anchor-relative regressions above `confidence` into boxes in
/// `width × height` image coordinates.
fn decode(
    anchors: &[[f32; 2]],
    reg_data: &[f32],
    score_data: &[f32],
    confidence: f32,
    width: u32,
    height: u32,
) -> Vec<Candidate> {
    let (fw, fh) = (width as f32, height as f32);
    let scale = INPUT_SIZE as f32;
    let mut candidates = Vec::new();

    for (i, &raw_score) in score_data.iter().enumerate().take(anchors.len()) {
        let score = sigmoid(raw_score);
        if score < confidence {
            continue;
        }
        let offset = i * REGRESSOR_STRIDE;
        if offset + 4 > reg_data.len() {
            break;
        }

        let anchor = anchors[i];
        let cx = anchor[0] + reg_data[offset] / scale;
        let cy = anchor[1] + reg_data[offset + 1] / scale;
        let w = reg_data[offset + 2] / scale;
        let h = reg_data[offset + 3] / scale;

        candidates.push(Candidate {
            x1: ((cx - w / 2.0) * fw).max(0.0) as f64,
            y1: ((cy - h / 2.0) * fh).max(0.0) as f64,
            x2: ((cx + w / 2.0) * fw).min(fw) as f64,
            y2: ((cy + h / 2.0) * fh).min(fh) as f64,
            score: score as f64,
        });
    }

    candidates
}

fn nms(candidates: &mut [Candidate], iou_thresh: f64) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Candidate> = Vec::new();
    for candidate in candidates.iter() {
        if keep.iter().all(|k| k.iou(candidate) <= iou_thresh) {
            keep.push(candidate.clone());
        }
    }
    keep
}

/// Integer regions clamped to the image, dropping those under `min_size`.
fn to_regions(kept: &[Candidate], width: u32, height: u32, min_size: (u32, u32)) -> Vec<Region> {
    kept.iter()
        .filter_map(|c| {
            let x = c.x1 as i32;
            let y = c.y1 as i32;
            Region::new(x, y, (c.x2 - c.x1) as i32, (c.y2 - c.y1) as i32).clamp_to(width, height)
        })
        .filter(|r| r.meets_min_size(min_size.0, min_size.1))
        .collect()
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
