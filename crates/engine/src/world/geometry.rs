use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn lerp(self, to: Vec2, alpha: f32) -> Vec2 {
        Vec2 {
            x: self.x + (to.x - self.x) * alpha,
            y: self.y + (to.y - self.y) * alpha,
        }
    }

    pub fn distance(self, other: Vec2) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

impl std::ops::Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2 {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2 {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub const fn square(side: f32) -> Self {
        Self {
            width: side,
            height: side,
        }
    }

    pub fn half(self) -> Vec2 {
        Vec2 {
            x: self.width * 0.5,
            y: self.height * 0.5,
        }
    }
}

/// Board directions. Screen convention: `Up` decreases y, `Down` increases it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[serde(alias = "UP")]
    Up,
    #[serde(alias = "LEFT")]
    Left,
    #[serde(alias = "DOWN")]
    Down,
    #[serde(alias = "RIGHT")]
    Right,
}

impl Direction {
    /// Tie-break order used wherever several directions score equally.
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Left,
        Direction::Down,
        Direction::Right,
    ];

    pub const fn opposite(self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    pub const fn is_horizontal(self) -> bool {
        matches!(self, Direction::Left | Direction::Right)
    }

    pub const fn unit(self) -> Vec2 {
        match self {
            Direction::Up => Vec2 { x: 0.0, y: -1.0 },
            Direction::Down => Vec2 { x: 0.0, y: 1.0 },
            Direction::Left => Vec2 { x: -1.0, y: 0.0 },
            Direction::Right => Vec2 { x: 1.0, y: 0.0 },
        }
    }

    pub fn step(self, from: Vec2, distance: f32) -> Vec2 {
        let unit = self.unit();
        Vec2 {
            x: from.x + unit.x * distance,
            y: from.y + unit.y * distance,
        }
    }

    /// Signed distance of `target` ahead of `from` along this direction.
    pub fn ahead(self, from: Vec2, target: Vec2) -> f32 {
        let unit = self.unit();
        (target.x - from.x) * unit.x + (target.y - from.y) * unit.y
    }

    pub const fn token(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Left => "left",
            Direction::Down => "down",
            Direction::Right => "right",
        }
    }
}

/// Small bit set of directions, iterated in tie-break order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DirectionSet(u8);

impl DirectionSet {
    pub const EMPTY: DirectionSet = DirectionSet(0);

    const fn bit(direction: Direction) -> u8 {
        match direction {
            Direction::Up => 1,
            Direction::Left => 2,
            Direction::Down => 4,
            Direction::Right => 8,
        }
    }

    pub fn insert(&mut self, direction: Direction) {
        self.0 |= Self::bit(direction);
    }

    pub fn contains(self, direction: Direction) -> bool {
        self.0 & Self::bit(direction) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(self) -> impl Iterator<Item = Direction> {
        Direction::ALL
            .into_iter()
            .filter(move |direction| self.contains(*direction))
    }
}

impl FromIterator<Direction> for DirectionSet {
    fn from_iter<I: IntoIterator<Item = Direction>>(iter: I) -> Self {
        let mut set = DirectionSet::EMPTY;
        for direction in iter {
            set.insert(direction);
        }
        set
    }
}

/// Axis-aligned pixel bounds, half-open on the right and bottom edges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionBox {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
}

impl CollisionBox {
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            right: left + width,
            top,
            bottom: top + height,
        }
    }

    /// Box centered inside the entity rectangle, scaled by `percent` on both axes.
    pub fn for_entity(position: Vec2, size: Size, percent: u8) -> Self {
        let scale = f32::from(percent.min(100)) / 100.0;
        let width = size.width * scale;
        let height = size.height * scale;
        let left = position.x + (size.width - width) * 0.5;
        let top = position.y + (size.height - height) * 0.5;
        Self::new(left, top, width, height)
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn center(&self) -> Vec2 {
        Vec2 {
            x: (self.left + self.right) * 0.5,
            y: (self.top + self.bottom) * 0.5,
        }
    }

    pub fn overlaps(&self, other: &CollisionBox) -> bool {
        self.left < other.right
            && self.right > other.left
            && self.top < other.bottom
            && self.bottom > other.top
    }

    pub fn union(&self, other: &CollisionBox) -> CollisionBox {
        CollisionBox {
            left: self.left.min(other.left),
            right: self.right.max(other.right),
            top: self.top.min(other.top),
            bottom: self.bottom.max(other.bottom),
        }
    }

    /// Euclidean distance from `point` to the nearest point of the box; zero inside.
    pub fn distance_to_point(&self, point: Vec2) -> f32 {
        let dx = (self.left - point.x).max(0.0).max(point.x - self.right);
        let dy = (self.top - point.y).max(0.0).max(point.y - self.bottom);
        (dx * dx + dy * dy).sqrt()
    }
}
