pub mod face_annotator;
