pub mod conic;
pub mod eigen;

pub use conic::ShapeError;
