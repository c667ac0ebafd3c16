//! Face detection output types shared across capture, detection and overlay.

use std::fmt;

/// Axis-aligned face bounding box in source-frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl FaceBox {
    /// Uniformly rescale the box (native frame space → display space).
    pub fn scaled(&self, factor: f32) -> FaceBox {
        FaceBox {
            x: self.x * factor,
            y: self.y * factor,
            width: self.width * factor,
            height: self.height * factor,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    /// Single-letter form used in overlay labels.
    pub fn letter(&self) -> char {
        match self {
            Gender::Male => 'M',
            Gender::Female => 'F',
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gender::Male => write!(f, "male"),
            Gender::Female => write!(f, "female"),
        }
    }
}

/// Age/gender estimate for one face. `gender_probability` is the model's
/// confidence in the reported gender, in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceAttributes {
    pub age: f32,
    pub gender: Gender,
    pub gender_probability: f32,
}

/// One detected face. Landmarks and attributes are present only when the
/// corresponding models were loaded (see [`AnnotationDepth`]).
#[derive(Clone, Debug, PartialEq)]
pub struct Face {
    pub bbox: FaceBox,
    pub score: f32,
    pub landmarks: Option<Vec<(f32, f32)>>,
    pub attributes: Option<FaceAttributes>,
}

impl Face {
    /// Compact overlay label, e.g. `~31 M 98%`. `None` without attributes.
    pub fn label(&self) -> Option<String> {
        self.attributes.as_ref().map(|a| {
            format!(
                "~{} {} {:.0}%",
                a.age.round() as i32,
                a.gender.letter(),
                a.gender_probability * 100.0
            )
        })
    }
}

/// Which optional annotations the loaded model set provides.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnnotationDepth {
    /// Bounding boxes and scores only.
    Detection,
    /// Boxes plus landmark point sets.
    WithLandmarks,
    /// Boxes and age/gender attributes, landmarks when loaded.
    Full,
}

/// One detection tick's complete output. Replaces the previous result
/// wholesale: faces absent here are gone, not merely unmentioned.
///
/// Geometry is expressed in the native frame space given by
/// `native_width`/`native_height`; the overlay rescales to display space.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionResult {
    depth: AnnotationDepth,
    faces: Vec<Face>,
    native_width: u32,
    native_height: u32,
}

impl DetectionResult {
    pub fn new(
        depth: AnnotationDepth,
        faces: Vec<Face>,
        native_width: u32,
        native_height: u32,
    ) -> Self {
        Self {
            depth,
            faces,
            native_width,
            native_height,
        }
    }

    pub fn depth(&self) -> AnnotationDepth {
        self.depth
    }

    pub fn faces(&self) -> &[Face] {
        &self.faces
    }

    pub fn native_width(&self) -> u32 {
        self.native_width
    }

    pub fn native_height(&self) -> u32 {
        self.native_height
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Drop faces whose box width is not strictly greater than `min_width`.
    /// Tiny boxes are detector noise, not faces.
    pub fn retain_wider_than(&mut self, min_width: f32) {
        self.faces.retain(|f| f.bbox.width > min_width);
    }

    /// One-line text summary for console/UI output,
    /// e.g. `2 faces: ~31 M 98%, ~27 F 93%`.
    pub fn summary(&self) -> String {
        if self.faces.is_empty() {
            return "no faces".to_string();
        }
        let noun = if self.faces.len() == 1 {
            "face"
        } else {
            "faces"
        };
        let labels: Vec<String> = self.faces.iter().filter_map(Face::label).collect();
        if labels.is_empty() {
            format!("{} {noun}", self.faces.len())
        } else {
            format!("{} {noun}: {}", self.faces.len(), labels.join(", "))
        }
    }
}
