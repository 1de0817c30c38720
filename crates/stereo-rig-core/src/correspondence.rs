use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CorrespondenceError {
    #[error("{object} pattern points but {image} image points")]
    LengthMismatch { object: usize, image: usize },
    #[error("correspondence has no points")]
    Empty,
    #[error("non-finite coordinate at point {index}")]
    NonFinite { index: usize },
}

/// Inner-corner count of a planar grid pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatternSize {
    pub cols: usize,
    pub rows: usize,
}

impl PatternSize {
    pub const fn new(cols: usize, rows: usize) -> Self {
        Self { cols, rows }
    }

    pub fn point_count(&self) -> usize {
        self.cols * self.rows
    }

    /// Planar template in raster order (x fastest), z = 0, spaced by
    /// `square_size` in whatever unit the caller wants depth in.
    pub fn object_points(&self, square_size: f64) -> Vec<Point3<f64>> {
        (0..self.rows)
            .flat_map(|j| {
                (0..self.cols)
                    .map(move |i| Point3::new(i as f64 * square_size, j as f64 * square_size, 0.0))
            })
            .collect()
    }
}

/// One observed view: pattern points and their index-aligned image points.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Correspondence {
    object_points: Vec<Point3<f64>>,
    image_points: Vec<Point2<f64>>,
}

impl Correspondence {
    pub fn new(
        object_points: Vec<Point3<f64>>,
        image_points: Vec<Point2<f64>>,
    ) -> Result<Self, CorrespondenceError> {
        if object_points.len() != image_points.len() {
            return Err(CorrespondenceError::LengthMismatch {
                object: object_points.len(),
                image: image_points.len(),
            });
        }
        if object_points.is_empty() {
            return Err(CorrespondenceError::Empty);
        }
        let finite = |v: &[f64]| v.iter().all(|c| c.is_finite());
        if let Some(index) = object_points
            .iter()
            .zip(&image_points)
            .position(|(o, i)| !finite(&[o.x, o.y, o.z, i.x, i.y]))
        {
            return Err(CorrespondenceError::NonFinite { index });
        }
        Ok(Self {
            object_points,
            image_points,
        })
    }

    pub fn object_points(&self) -> &[Point3<f64>] {
        &self.object_points
    }

    pub fn image_points(&self) -> &[Point2<f64>] {
        &self.image_points
    }

    pub fn len(&self) -> usize {
        self.object_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.object_points.is_empty()
    }

    /// All pattern points lie on z = 0 (within `tol`).
    pub fn is_planar(&self, tol: f64) -> bool {
        self.object_points.iter().all(|p| p.z.abs() <= tol)
    }

    /// Pattern points projected onto the z = 0 plane.
    pub fn plane_points(&self) -> Vec<Point2<f64>> {
        self.object_points
            .iter()
            .map(|p| Point2::new(p.x, p.y))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Point3<f64>, &Point2<f64>)> {
        self.object_points.iter().zip(&self.image_points)
    }
}
