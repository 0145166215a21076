use image::{GrayImage, ImageBuffer, Luma};
use imageproc::filter::separable_filter;
use nalgebra as na;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GradientFieldError {
    #[error("Gradient planes differ in shape: {0:?} and {1:?}")]
    ShapeMismatch((usize, usize), (usize, usize)),

    #[error("Gradient field has no pixels")]
    Empty,
}

/// Horizontal and vertical intensity gradients of an eye-region image.
///
/// Both planes are stored row-major in the image sense: row index is `y`, column index is `x`.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientField {
    dx: na::DMatrix<f64>,
    dy: na::DMatrix<f64>,
}

type FloatImage = ImageBuffer<Luma<f32>, Vec<f32>>;

const BOX_3: [f32; 3] = [1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0];
const SOBEL_5_SMOOTH: [f32; 5] = [1.0, 4.0, 6.0, 4.0, 1.0];
const SOBEL_5_DERIV: [f32; 5] = [-1.0, -2.0, 0.0, 2.0, 1.0];

impl GradientField {
    pub fn new(dx: na::DMatrix<f64>, dy: na::DMatrix<f64>) -> Result<Self, GradientFieldError> {
        if dx.shape() != dy.shape() {
            return Err(GradientFieldError::ShapeMismatch(dx.shape(), dy.shape()));
        }
        if dx.is_empty() {
            return Err(GradientFieldError::Empty);
        }
        Ok(Self { dx, dy })
    }

    /// Builds a field by evaluating `f(x, y)` at every pixel.
    pub fn from_fn<G>(width: usize, height: usize, mut f: G) -> Self
    where
        G: FnMut(usize, usize) -> na::Vector2<f64>,
    {
        let mut dx = na::DMatrix::zeros(height, width);
        let mut dy = na::DMatrix::zeros(height, width);
        for y in 0..height {
            for x in 0..width {
                let g = f(x, y);
                dx[(y, x)] = g.x;
                dy[(y, x)] = g.y;
            }
        }
        Self { dx, dy }
    }

    /// Gradients of a greyscale image: 3x3 box blur followed by a 5x5 Sobel operator, with
    /// replicated borders.
    pub fn from_intensity(image: &GrayImage) -> Result<Self, GradientFieldError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(GradientFieldError::Empty);
        }

        let intensity: FloatImage =
            ImageBuffer::from_fn(width, height, |x, y| Luma([f32::from(image.get_pixel(x, y)[0])]));
        let blurred = separable_filter(&intensity, &BOX_3, &BOX_3);
        let gx = separable_filter(&blurred, &SOBEL_5_DERIV, &SOBEL_5_SMOOTH);
        let gy = separable_filter(&blurred, &SOBEL_5_SMOOTH, &SOBEL_5_DERIV);

        Ok(Self {
            dx: to_matrix(&gx),
            dy: to_matrix(&gy),
        })
    }

    pub fn width(&self) -> usize {
        self.dx.ncols()
    }

    pub fn height(&self) -> usize {
        self.dx.nrows()
    }

    /// Gradient at the pixel containing `p`, coordinates truncated towards zero.
    ///
    /// `None` outside the image.
    pub fn at(&self, p: &na::Point2<f64>) -> Option<na::Vector2<f64>> {
        if !(p.x >= 0.0 && p.y >= 0.0) {
            return None;
        }
        let (col, row) = (p.x as usize, p.y as usize);
        if col >= self.width() || row >= self.height() {
            return None;
        }
        Some(na::Vector2::new(self.dx[(row, col)], self.dy[(row, col)]))
    }
}

fn to_matrix(image: &FloatImage) -> na::DMatrix<f64> {
    let (width, height) = image.dimensions();
    na::DMatrix::from_fn(height as usize, width as usize, |row, col| {
        f64::from(image.get_pixel(col as u32, row as u32)[0])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_ramp_gradients() -> anyhow::Result<()> {
        // I(x, y) = 2x
        let image = GrayImage::from_fn(12, 12, |x, _| Luma([2 * x as u8]));
        let field = GradientField::from_intensity(&image)?;

        assert_eq!((field.width(), field.height()), (12, 12));
        for y in 3..9 {
            for x in 3..9 {
                let g = field.at(&na::Point2::new(x as f64, y as f64)).unwrap();
                // Sobel 5x5 gain is 16 · 8 per unit slope
                assert_relative_eq!(g.x, 256.0, epsilon = 1e-3);
                assert_relative_eq!(g.y, 0.0, epsilon = 1e-3);
            }
        }
        Ok(())
    }

    #[test]
    fn test_vertical_edge_direction() -> anyhow::Result<()> {
        // Dark above, bright below
        let image = GrayImage::from_fn(10, 10, |_, y| Luma([if y < 5 { 10 } else { 200 }]));
        let field = GradientField::from_intensity(&image)?;

        let g = field.at(&na::Point2::new(5.0, 5.0)).unwrap();
        assert!(g.y > 0.0);
        assert_relative_eq!(g.x, 0.0, epsilon = 1e-3);
        Ok(())
    }

    #[test]
    fn test_lookup_truncates() {
        let field = GradientField::from_fn(4, 3, |x, y| na::Vector2::new(x as f64, y as f64));

        assert_eq!(field.at(&na::Point2::new(2.9, 1.2)), Some(na::Vector2::new(2.0, 1.0)));
        assert_eq!(field.at(&na::Point2::new(0.0, 0.0)), Some(na::Vector2::new(0.0, 0.0)));
        assert_eq!(field.at(&na::Point2::new(4.0, 1.0)), None);
        assert_eq!(field.at(&na::Point2::new(1.0, 3.5)), None);
        assert_eq!(field.at(&na::Point2::new(-0.5, 1.0)), None);
        assert_eq!(field.at(&na::Point2::new(f64::NAN, 1.0)), None);
    }

    #[test]
    fn test_mismatched_planes() {
        let result = GradientField::new(na::DMatrix::zeros(3, 4), na::DMatrix::zeros(4, 3));
        assert_eq!(
            result,
            Err(GradientFieldError::ShapeMismatch((3, 4), (4, 3)))
        );
        assert_eq!(
            GradientField::from_intensity(&GrayImage::new(0, 0)),
            Err(GradientFieldError::Empty)
        );
    }
}
