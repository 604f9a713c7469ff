// GestureGate - Edge Impulse C++ SDK Back-end
//
// Calls the SDK through the C shim in ffi/ei_shim.cpp, compiled by build.rs
// when the `edge-impulse` feature is enabled. Each classify call returns a
// shim-allocated result; `ShimResult` owns it and frees it on every path.

use std::ffi::{c_char, CStr};
use std::ptr::NonNull;

use super::{BoundingBox, Classifier, ModelProperties, ModelType, RawOutput};
use crate::error::ClassifierError;

mod sys {
    use std::ffi::c_char;

    #[repr(C)]
    pub struct EiShimBox {
        pub label: *const c_char,
        pub value: f32,
        pub x: u32,
        pub y: u32,
        pub width: u32,
        pub height: u32,
    }

    #[repr(C)]
    pub struct EiShimResult {
        pub code: i32,
        pub classification_count: usize,
        pub classification: *mut EiShimBox,
        pub bbox_count: usize,
        pub bboxes: *mut EiShimBox,
        pub grid_count: usize,
        pub grid: *mut EiShimBox,
        pub has_anomaly: i32,
        pub anomaly: f32,
        pub has_visual_anomaly: i32,
        pub visual_max: f32,
        pub visual_mean: f32,
    }

    extern "C" {
        pub fn ei_shim_model_type() -> i32;
        pub fn ei_shim_has_visual_anomaly() -> i32;
        pub fn ei_shim_input_size() -> usize;
        pub fn ei_shim_label_count() -> usize;
        pub fn ei_shim_label(ix: usize) -> *const c_char;
        pub fn ei_shim_init();
        pub fn ei_shim_classify(data: *const f32, len: usize) -> *mut EiShimResult;
        pub fn ei_shim_result_free(result: *mut EiShimResult);
    }
}

/// Owning handle for a shim result.
struct ShimResult(NonNull<sys::EiShimResult>);

impl ShimResult {
    fn get(&self) -> &sys::EiShimResult {
        // SAFETY: the pointer came from ei_shim_classify and is only freed in Drop.
        unsafe { self.0.as_ref() }
    }
}

impl Drop for ShimResult {
    fn drop(&mut self) {
        // SAFETY: allocated by ei_shim_classify, freed exactly once here.
        unsafe { sys::ei_shim_result_free(self.0.as_ptr()) }
    }
}

fn label_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    // SAFETY: SDK labels are static NUL-terminated strings.
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

fn copy_boxes(ptr: *const sys::EiShimBox, count: usize) -> Vec<BoundingBox> {
    if ptr.is_null() || count == 0 {
        return Vec::new();
    }
    // SAFETY: the shim allocates exactly `count` boxes behind `ptr`.
    let boxes = unsafe { std::slice::from_raw_parts(ptr, count) };
    boxes
        .iter()
        .map(|b| BoundingBox {
            label: label_string(b.label),
            value: b.value,
            x: b.x,
            y: b.y,
            width: b.width,
            height: b.height,
        })
        .collect()
}

pub struct SdkClassifier {
    properties: Option<ModelProperties>,
}

impl SdkClassifier {
    pub fn new() -> Self {
        Self { properties: None }
    }
}

impl Default for SdkClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier for SdkClassifier {
    fn initialize(&mut self) -> Result<ModelProperties, ClassifierError> {
        // SAFETY: plain calls into the statically linked SDK.
        let props = unsafe {
            sys::ei_shim_init();
            ModelProperties {
                model_type: if sys::ei_shim_model_type() == 1 {
                    ModelType::ObjectDetection
                } else {
                    ModelType::Classification
                },
                has_visual_anomaly_detection: sys::ei_shim_has_visual_anomaly() == 1,
                labels: (0..sys::ei_shim_label_count())
                    .map(|ix| label_string(sys::ei_shim_label(ix)))
                    .collect(),
                input_features_count: Some(sys::ei_shim_input_size()),
            }
        };
        log::info!(
            "Edge Impulse SDK ready: {:?}, {} labels, {} input features",
            props.model_type,
            props.labels.len(),
            props.input_features_count.unwrap_or(0)
        );
        self.properties = Some(props.clone());
        Ok(props)
    }

    fn properties(&self) -> Result<&ModelProperties, ClassifierError> {
        self.properties.as_ref().ok_or(ClassifierError::NotInitialized)
    }

    fn classify(&mut self, features: &[f32]) -> Result<RawOutput, ClassifierError> {
        self.properties()?;

        // SAFETY: the SDK copies out of `features` before returning.
        let raw = unsafe { sys::ei_shim_classify(features.as_ptr(), features.len()) };
        let result = NonNull::new(raw)
            .map(ShimResult)
            .ok_or_else(|| ClassifierError::Protocol("shim returned no result".into()))?;
        let r = result.get();

        if r.code != 0 {
            return Err(ClassifierError::ClassificationFailed {
                code: r.code,
                detail: "run_classifier returned an error".into(),
            });
        }

        Ok(RawOutput {
            result_code: r.code,
            classification: copy_boxes(r.classification, r.classification_count)
                .into_iter()
                .map(|b| (b.label, b.value))
                .collect(),
            bounding_boxes: copy_boxes(r.bboxes, r.bbox_count),
            anomaly: (r.has_anomaly != 0).then_some(r.anomaly),
            visual_anomaly_grid: copy_boxes(r.grid, r.grid_count),
            visual_anomaly_max: (r.has_visual_anomaly != 0).then_some(r.visual_max),
            visual_anomaly_mean: (r.has_visual_anomaly != 0).then_some(r.visual_mean),
        })
    }
}
