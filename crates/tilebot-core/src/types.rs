use serde::{Deserialize, Serialize};

/// Paint colour of a tile, also used as an instruction condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Color {
    Red,
    Green,
    Blue,
}

impl Color {
    pub const ALL: [Color; 3] = [Color::Red, Color::Green, Color::Blue];

    /// Single-letter code used in program signatures
    pub fn code(self) -> char {
        match self {
            Color::Red => 'r',
            Color::Green => 'g',
            Color::Blue => 'b',
        }
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Color::Red => write!(f, "red"),
            Color::Green => write!(f, "green"),
            Color::Blue => write!(f, "blue"),
        }
    }
}

/// Facing of the robot, ordered clockwise starting at `Up`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    Up,
    Right,
    Down,
    Left,
}

impl Direction {
    pub const ALL: [Direction; 4] = [Direction::Up, Direction::Right, Direction::Down, Direction::Left];

    /// Position on the clockwise cycle (up = 0)
    pub fn index(self) -> usize {
        match self {
            Direction::Up => 0,
            Direction::Right => 1,
            Direction::Down => 2,
            Direction::Left => 3,
        }
    }

    pub fn turn_left(self) -> Self {
        match self {
            Direction::Up => Direction::Left,
            Direction::Left => Direction::Down,
            Direction::Down => Direction::Right,
            Direction::Right => Direction::Up,
        }
    }

    pub fn turn_right(self) -> Self {
        match self {
            Direction::Up => Direction::Right,
            Direction::Right => Direction::Down,
            Direction::Down => Direction::Left,
            Direction::Left => Direction::Up,
        }
    }

    /// Column/row delta of one step in this direction
    pub fn delta(self) -> (isize, isize) {
        match self {
            Direction::Up => (0, -1),
            Direction::Right => (1, 0),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
        }
    }

    /// Minimal number of quarter turns between two facings (0, 1 or 2)
    pub fn turn_distance(self, other: Direction) -> usize {
        let diff = self.index().abs_diff(other.index());
        diff.min(4 - diff)
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Right => write!(f, "right"),
            Direction::Down => write!(f, "down"),
            Direction::Left => write!(f, "left"),
        }
    }
}

/// A cell coordinate (x = column, y = row, row 0 at the top)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: usize,
    pub y: usize,
}

impl Position {
    pub const fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    /// Neighbouring position in `direction`, or `None` when it leaves a
    /// `width × height` area
    pub fn step(self, direction: Direction, width: usize, height: usize) -> Option<Position> {
        let (dx, dy) = direction.delta();
        let x = self.x.checked_add_signed(dx)?;
        let y = self.y.checked_add_signed(dy)?;
        (x < width && y < height).then_some(Position::new(x, y))
    }

    /// The four orthogonal neighbours that exist within `width × height`
    pub fn neighbors(self, width: usize, height: usize) -> impl Iterator<Item = Position> {
        Direction::ALL
            .into_iter()
            .filter_map(move |d| self.step(d, width, height))
    }

    /// Direction of a unit move from `self` to `to`, if they are adjacent
    pub fn direction_to(self, to: Position) -> Option<Direction> {
        Direction::ALL.into_iter().find(|d| {
            let (dx, dy) = d.delta();
            self.x.checked_add_signed(dx) == Some(to.x) && self.y.checked_add_signed(dy) == Some(to.y)
        })
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Robot position plus facing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pose {
    pub position: Position,
    pub direction: Direction,
}

impl Pose {
    pub const fn new(position: Position, direction: Direction) -> Self {
        Self { position, direction }
    }
}

/// A traversable grid cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tile {
    /// `None` is an uncoloured tile
    pub color: Option<Color>,
    #[serde(default)]
    pub has_star: bool,
}

impl Tile {
    pub const fn new(color: Option<Color>) -> Self {
        Self {
            color,
            has_star: false,
        }
    }

    pub const fn colored(color: Color) -> Self {
        Self::new(Some(color))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turns_are_inverse() {
        for d in Direction::ALL {
            assert_eq!(d.turn_left().turn_right(), d);
            assert_eq!(d.turn_left().turn_left().turn_left().turn_left(), d);
        }
    }

    #[test]
    fn test_turn_distance() {
        assert_eq!(Direction::Up.turn_distance(Direction::Up), 0);
        assert_eq!(Direction::Up.turn_distance(Direction::Right), 1);
        assert_eq!(Direction::Up.turn_distance(Direction::Left), 1);
        assert_eq!(Direction::Up.turn_distance(Direction::Down), 2);
        assert_eq!(Direction::Left.turn_distance(Direction::Right), 2);
    }

    #[test]
    fn test_step_respects_bounds() {
        let origin = Position::new(0, 0);
        assert_eq!(origin.step(Direction::Up, 3, 3), None);
        assert_eq!(origin.step(Direction::Left, 3, 3), None);
        assert_eq!(origin.step(Direction::Right, 3, 3), Some(Position::new(1, 0)));
        assert_eq!(Position::new(2, 2).step(Direction::Down, 3, 3), None);
        assert_eq!(origin.neighbors(3, 3).count(), 2);
    }

    #[test]
    fn test_direction_to() {
        let p = Position::new(1, 1);
        assert_eq!(p.direction_to(Position::new(1, 0)), Some(Direction::Up));
        assert_eq!(p.direction_to(Position::new(0, 1)), Some(Direction::Left));
        assert_eq!(p.direction_to(Position::new(2, 2)), None);
    }
}
