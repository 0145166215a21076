pub mod fit;
pub mod planar;
pub mod spatial;

pub use fit::{fit_ellipse, FitError};
pub use planar::{Ellipse, RotatedRect};
pub use spatial::Limbus;
