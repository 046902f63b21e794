/// World-space coordinates, in distance units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Position {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance, rounded down to whole units.
    pub fn distance_to(&self, other: Position) -> u32 {
        let dx = i64::from(self.x) - i64::from(other.x);
        let dy = i64::from(self.y) - i64::from(other.y);
        let dz = i64::from(self.z) - i64::from(other.z);
        let squared = (dx * dx + dy * dy + dz * dz) as f64;
        squared.sqrt() as u32
    }

    pub fn is_within_range(&self, other: Position, range: u32) -> bool {
        self.distance_to(other) <= range
    }
}
