use std::fmt::Display;
use std::str::FromStr;

use crate::Error;

/// A pixel position on the subject, as clicked in the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    /// Column, from the left edge
    pub x: u32,
    /// Row, from the top edge
    pub y: u32,
}

impl Point {
    /// Create a new point
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Check if the point lies inside an image of the given size
    pub fn within(&self, width: u32, height: u32) -> bool {
        self.x < width && self.y < height
    }

    /// The point as fractions of the image size, the form SAM style models take
    pub fn normalized(&self, width: u32, height: u32) -> (f64, f64) {
        (
            self.x as f64 / width.max(1) as f64,
            self.y as f64 / height.max(1) as f64,
        )
    }
}

impl From<(u32, u32)> for Point {
    fn from((x, y): (u32, u32)) -> Self {
        Self::new(x, y)
    }
}

impl Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

/// The error returned when a point cannot be parsed from `X,Y`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid point `{0}`, expected X,Y")]
pub struct ParsePointError(String);

impl FromStr for Point {
    type Err = ParsePointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParsePointError(s.to_string());
        let (x, y) = s.split_once(',').ok_or_else(err)?;
        let x = x.trim().parse().map_err(|_| err())?;
        let y = y.trim().parse().map_err(|_| err())?;
        Ok(Self::new(x, y))
    }
}

/// One ordered group of foreground hints for a single image. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForegroundPoints(Vec<Point>);

impl ForegroundPoints {
    /// Create a point group, failing if `points` is empty
    pub fn new(points: impl IntoIterator<Item = impl Into<Point>>) -> Result<Self, Error> {
        let points: Vec<Point> = points.into_iter().map(Into::into).collect();
        if points.is_empty() {
            return Err(Error::EmptyPoints);
        }
        Ok(Self(points))
    }

    /// The points in click order
    pub fn as_slice(&self) -> &[Point] {
        &self.0
    }

    /// Iterate over the points in click order
    pub fn iter(&self) -> impl Iterator<Item = &Point> {
        self.0.iter()
    }

    /// The number of points
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Points that fall outside of an image of the given size
    pub fn out_of_bounds(&self, width: u32, height: u32) -> impl Iterator<Item = &Point> {
        self.0.iter().filter(move |point| !point.within(width, height))
    }
}

impl<'a> IntoIterator for &'a ForegroundPoints {
    type Item = &'a Point;
    type IntoIter = std::slice::Iter<'a, Point>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
