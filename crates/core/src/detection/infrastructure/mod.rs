pub mod onnx_face_annotator;
