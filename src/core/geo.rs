use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents a point in projected (world) coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn add(&self, other: &Point) -> Point {
        Point::new(self.x + other.x, self.y + other.y)
    }

    pub fn subtract(&self, other: &Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

impl Default for Point {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Identifies one tile of a [`TileSchema`](crate::tiles::schema::TileSchema):
/// column, row and the index of its resolution level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    pub col: i32,
    pub row: i32,
    pub level: u8,
}

impl TileCoord {
    pub fn new(col: i32, row: i32, level: u8) -> Self {
        Self { col, row, level }
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.level, self.col, self.row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_tile_coord_value_equality() {
        let a = TileCoord::new(3, 4, 5);
        let b = TileCoord::new(3, 4, 5);
        assert_eq!(a, b);

        let set: HashSet<_> = [a, b, TileCoord::new(4, 3, 5)].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_tile_coord_display() {
        assert_eq!(TileCoord::new(1, 0, 2).to_string(), "2/1/0");
    }

    #[test]
    fn test_point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert_eq!(a.distance_to(&b), 5.0);
        assert_eq!(b.subtract(&a), b);
        assert_eq!(a.add(&b), b);
    }
}
