use crate::shared::face::{AnnotationDepth, Face};
use crate::shared::frame::Frame;

/// Domain interface for the detection capability.
///
/// Implementations may hold inference state, hence `&mut self`. Errors are
/// opaque to callers and void only the tick that observed them.
pub trait FaceAnnotator: Send {
    fn annotate(&mut self, frame: &Frame) -> Result<Vec<Face>, Box<dyn std::error::Error>>;

    /// The annotation depth this annotator produces.
    fn depth(&self) -> AnnotationDepth;
}
