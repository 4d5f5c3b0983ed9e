pub mod boxes;
pub mod extract;
pub mod pipeline;
pub mod preprocess;
pub mod recognizer;
pub mod types;

pub use boxes::{draw_boxes, parse_box_text};
pub use extract::RecordParser;
pub use pipeline::{list_images, processed_name, PipelineError, RoutePipeline};
pub use preprocess::{LineOrientation, PreprocessError, TransformChain};
pub use recognizer::{backend_for, MockRecognizer, OcrBackend, OcrError, TesseractCli};
pub use types::{CharBox, LineVerdict, Rejection, StageLine};
