/// File extensions the image processor accepts (compared case-insensitively).
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tif", "tiff", "webp"];

/// Worker threads executing marker jobs. Inference is CPU/GPU heavy, so keep it small.
pub const DEFAULT_WORKERS: usize = 2;

/// Jobs that may wait for a free worker before submissions are rejected.
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// Snapshot of persisted detections, relative to the results root.
pub const DETECTIONS_FILE: &str = "detections.json";

pub const OBJECT_MODEL_NAME: &str = "yolo11m";
pub const OBJECT_MODEL_FILE: &str = "yolo11m.onnx";

pub const MILITARY_MODEL_NAME: &str = "yolo11m_military";
pub const MILITARY_MODEL_FILE: &str = "yolo11m-military.onnx";

pub const DAMAGE_MODEL_NAME: &str = "xbd_classifier";
pub const DAMAGE_MODEL_FILE: &str = "xbd_damage_classifier.onnx";

pub const EMERGENCY_MODEL_NAME: &str = "emergency_net";
pub const EMERGENCY_MODEL_FILE: &str = "emergency_net.onnx";

/// Square input resolution for YOLO exports.
pub const OBJECT_INPUT_SIZE: u32 = 640;
/// Square input resolution for the classifiers.
pub const CLASSIFIER_INPUT_SIZE: u32 = 224;

pub const DEFAULT_IOU_THRESHOLD: f32 = 0.45;

pub const DAMAGE_LABELS: &[&str] = &["no_damage", "minor_damage", "major_damage", "destroyed"];

pub const EMERGENCY_LABELS: &[&str] = &[
    "normal",
    "fire",
    "flood",
    "explosion",
    "collapse",
    "other_emergency",
];

pub const MILITARY_LABELS: &[&str] = &[
    "soldier",
    "tank",
    "armored_vehicle",
    "military_vehicle",
    "artillery",
    "helicopter",
    "airplane",
    "weapon",
];

pub const COCO_LABELS: &[&str] = &[
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];
