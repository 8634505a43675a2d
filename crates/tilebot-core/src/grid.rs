use crate::{Pose, Position, Tile};
use serde::{Deserialize, Serialize};

/// Rectangular board of optional tiles. `None` cells are void.
///
/// Serializes as rows of `{color, hasStar} | null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<Option<Tile>>>", into = "Vec<Vec<Option<Tile>>>")]
pub struct Grid {
    width: usize,
    height: usize,
    cells: Vec<Option<Tile>>,
}

impl Grid {
    /// Create an all-void grid
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![None; width * height],
        }
    }

    /// Create a square all-void grid
    pub fn square(size: usize) -> Self {
        Self::new(size, size)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn contains(&self, pos: Position) -> bool {
        pos.x < self.width && pos.y < self.height
    }

    fn index(&self, pos: Position) -> Option<usize> {
        self.contains(pos).then(|| pos.y * self.width + pos.x)
    }

    /// Tile at `pos`; `None` for void or out-of-bounds cells
    pub fn get(&self, pos: Position) -> Option<&Tile> {
        self.index(pos).and_then(|i| self.cells[i].as_ref())
    }

    pub fn get_mut(&mut self, pos: Position) -> Option<&mut Tile> {
        let i = self.index(pos)?;
        self.cells[i].as_mut()
    }

    /// Place (or overwrite) a tile. Out-of-bounds positions are ignored.
    pub fn set(&mut self, pos: Position, tile: Tile) {
        if let Some(i) = self.index(pos) {
            self.cells[i] = Some(tile);
        }
    }

    pub fn is_void(&self, pos: Position) -> bool {
        self.get(pos).is_none()
    }

    /// Iterate over every non-void cell
    pub fn tiles(&self) -> impl Iterator<Item = (Position, &Tile)> + '_ {
        self.cells.iter().enumerate().filter_map(move |(i, cell)| {
            cell.as_ref()
                .map(|tile| (Position::new(i % self.width, i / self.width), tile))
        })
    }

    pub fn tile_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    pub fn star_count(&self) -> usize {
        self.tiles().filter(|(_, t)| t.has_star).count()
    }

    /// Positions of every starred tile
    pub fn stars(&self) -> Vec<Position> {
        self.tiles()
            .filter(|(_, t)| t.has_star)
            .map(|(p, _)| p)
            .collect()
    }

    /// The same grid with every star removed
    pub fn without_stars(&self) -> Grid {
        let mut grid = self.clone();
        for tile in grid.cells.iter_mut().flatten() {
            tile.has_star = false;
        }
        grid
    }

    /// Check a start pose is inside the grid and on a tile
    pub fn can_start(&self, start: Pose) -> bool {
        !self.is_void(start.position)
    }

    /// Rows of cells, top to bottom
    pub fn rows(&self) -> Vec<Vec<Option<Tile>>> {
        self.cells
            .chunks(self.width.max(1))
            .map(|row| row.to_vec())
            .collect()
    }
}

impl From<Grid> for Vec<Vec<Option<Tile>>> {
    fn from(grid: Grid) -> Self {
        if grid.width == 0 {
            return Vec::new();
        }
        grid.rows()
    }
}

impl TryFrom<Vec<Vec<Option<Tile>>>> for Grid {
    type Error = String;

    fn try_from(rows: Vec<Vec<Option<Tile>>>) -> Result<Self, Self::Error> {
        let height = rows.len();
        let width = rows.first().map_or(0, Vec::len);
        if let Some(bad) = rows.iter().position(|r| r.len() != width) {
            return Err(format!(
                "grid row {} has {} cells, expected {}",
                bad,
                rows[bad].len(),
                width
            ));
        }
        Ok(Self {
            width,
            height,
            cells: rows.into_iter().flatten().collect(),
        })
    }
}

impl std::fmt::Display for Grid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for y in 0..self.height {
            for x in 0..self.width {
                let c = match self.get(Position::new(x, y)) {
                    None => '.',
                    Some(t) if t.has_star => '*',
                    Some(t) => match t.color {
                        Some(color) => color.code().to_ascii_uppercase(),
                        None => 'o',
                    },
                };
                write!(f, "{}", c)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Color;

    #[test]
    fn test_lazy_placement() {
        let mut grid = Grid::square(4);
        assert_eq!(grid.tile_count(), 0);
        assert!(grid.is_void(Position::new(1, 2)));

        grid.set(Position::new(1, 2), Tile::colored(Color::Red));
        assert_eq!(grid.tile_count(), 1);
        assert_eq!(grid.get(Position::new(1, 2)).and_then(|t| t.color), Some(Color::Red));

        // Out of bounds writes are dropped
        grid.set(Position::new(9, 9), Tile::default());
        assert_eq!(grid.tile_count(), 1);
        assert!(grid.get(Position::new(9, 9)).is_none());
    }

    #[test]
    fn test_serializes_as_rows() {
        let mut grid = Grid::new(2, 1);
        grid.set(
            Position::new(1, 0),
            Tile {
                color: Some(Color::Blue),
                has_star: true,
            },
        );

        let json = serde_json::to_value(&grid).unwrap();
        assert_eq!(
            json,
            serde_json::json!([[null, {"color": "blue", "hasStar": true}]])
        );

        let back: Grid = serde_json::from_value(json).unwrap();
        assert_eq!(back, grid);
    }

    #[test]
    fn test_rejects_ragged_rows() {
        let json = serde_json::json!([[null, null], [null]]);
        assert!(serde_json::from_value::<Grid>(json).is_err());
    }

    #[test]
    fn test_without_stars() {
        let mut grid = Grid::square(2);
        grid.set(
            Position::new(0, 0),
            Tile {
                color: None,
                has_star: true,
            },
        );
        assert_eq!(grid.star_count(), 1);
        assert_eq!(grid.without_stars().star_count(), 0);
        assert_eq!(grid.stars(), vec![Position::new(0, 0)]);
    }
}
