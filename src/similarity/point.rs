use crate::error::Error;
use ordered_float::NotNan;
use std::ops::{Add, Div, Sub};

/// A finite 2-D coordinate in pose space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub(super) struct Point {
    x: f64,
    y: f64,
}

impl Point {
    pub(super) fn new(x: f64, y: f64) -> Result<Self, Error> {
        Ok(Self {
            x: NotNan::new(x)
                .map_err(|e| Error::ConstructNotNan(e, x))?
                .into_inner(),
            y: NotNan::new(y)
                .map_err(|e| Error::ConstructNotNan(e, y))?
                .into_inner(),
        })
    }

    pub(super) fn distance(self, other: Self) -> f64 {
        let delta = other - self;
        delta.dot(delta).sqrt()
    }

    #[inline]
    pub(super) fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// Mean of `points`, or the origin when there are none.
    pub(super) fn centroid(points: impl IntoIterator<Item = Self>) -> Self {
        let (sum, count) = points
            .into_iter()
            .fold((Self::default(), 0usize), |(sum, count), point| {
                (sum + point, count + 1)
            });
        if count == 0 {
            Self::default()
        } else {
            sum / count as f64
        }
    }
}

impl Sub for Point {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::Output {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl Add for Point {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::Output {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl Div<f64> for Point {
    type Output = Self;

    fn div(self, rhs: f64) -> Self::Output {
        Self::Output {
            x: self.x / rhs,
            y: self.y / rhs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Point;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn xy_points() {
        let a = Point::new(0.0, 0.0).unwrap();
        let b = Point::new(3.0, 4.0).unwrap();
        assert_approx_eq!(a.distance(b), 5.0);
    }

    #[test]
    fn rejects_nan() {
        assert!(Point::new(f64::NAN, 1.0).is_err());
    }

    #[test]
    fn centroid_of_nothing_is_origin() {
        assert_eq!(Point::centroid(Vec::new()), Point::default());
    }

    #[test]
    fn centroid() {
        let points = vec![
            Point::new(100.0, 100.0).unwrap(),
            Point::new(200.0, 200.0).unwrap(),
        ];
        assert_eq!(Point::centroid(points), Point::new(150.0, 150.0).unwrap());
    }
}
