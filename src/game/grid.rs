//! Grid Model
//!
//! Row-major board of cells. Each cell holds a wall, an optional item and
//! the fires currently burning on it (oldest first).
//!
//! An item on a Brick cell is hidden: it is rolled when fire first touches
//! the brick and becomes reachable once the brick burns away.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::hash::StateHasher;
use crate::core::rng::DeterministicRng;
use crate::game::config::GameSettings;
use crate::game::fire::Fire;
use crate::game::item::ItemKind;

/// Wall occupying a cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Wall {
    /// Walkable.
    #[default]
    Empty = 0,
    /// Indestructible.
    Concrete = 1,
    /// Destroyed by fire.
    Brick = 2,
}

/// One board cell.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// Wall on the cell.
    pub wall: Wall,
    /// Item on (or hidden in) the cell.
    pub item: Option<ItemKind>,
    /// Fires burning here, in insertion order.
    pub fires: Vec<Fire>,
}

impl Cell {
    /// The most recently added fire.
    #[inline]
    pub fn dominant_fire(&self) -> Option<&Fire> {
        self.fires.last()
    }

    /// Whether any fire burns here.
    #[inline]
    pub fn is_burning(&self) -> bool {
        !self.fires.is_empty()
    }

    /// Empty wall with an item lying on it.
    #[inline]
    pub fn has_visible_item(&self) -> bool {
        self.wall == Wall::Empty && self.item.is_some()
    }

    /// Empty wall and no item.
    #[inline]
    pub fn is_clear(&self) -> bool {
        self.wall == Wall::Empty && self.item.is_none()
    }
}

/// The board.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    width: i32,
    height: i32,
    cells: Vec<Cell>,
}

impl Grid {
    /// All-empty board.
    pub fn new(width: i32, height: i32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            width,
            height,
            cells: vec![Cell::default(); (width * height) as usize],
        }
    }

    /// Random board: concrete border and pillars, bricks elsewhere by chance.
    pub fn generate(settings: &GameSettings, rng: &mut DeterministicRng) -> Self {
        let mut grid = Self::new(settings.level.width, settings.level.height);
        let (width, height) = (grid.width, grid.height);

        for y in 0..height {
            for x in 0..width {
                let wall = if y == 0 || y == height - 1 || x == 0 || x == width - 1 {
                    Wall::Concrete
                } else if x & 1 == 0 && y & 1 == 0 {
                    Wall::Concrete
                } else if rng.next_int(100) < settings.amount_of_brick_walls {
                    Wall::Brick
                } else {
                    Wall::Empty
                };
                grid.cell_mut(x, y).wall = wall;
            }
        }

        grid
    }

    /// Board with a concrete border and nothing else.
    pub fn bordered(width: i32, height: i32) -> Self {
        let mut grid = Self::new(width, height);
        let (width, height) = (grid.width, grid.height);
        for y in 0..height {
            for x in 0..width {
                if y == 0 || y == height - 1 || x == 0 || x == width - 1 {
                    grid.cell_mut(x, y).wall = Wall::Concrete;
                }
            }
        }
        grid
    }

    /// Parse a stored level, one string per row.
    ///
    /// `#` concrete, `+` brick, anything else empty.
    pub fn from_rows<S: AsRef<str>>(rows: &[S]) -> Self {
        let height = rows.len() as i32;
        let width = rows.iter().map(|r| r.as_ref().chars().count()).max().unwrap_or(0) as i32;
        let mut grid = Self::new(width, height);

        for (y, row) in rows.iter().enumerate() {
            for (x, ch) in row.as_ref().chars().enumerate() {
                grid.cell_mut(x as i32, y as i32).wall = match ch {
                    '#' => Wall::Concrete,
                    '+' => Wall::Brick,
                    _ => Wall::Empty,
                };
            }
        }

        grid
    }

    /// Copy of the layout with every fire removed.
    pub fn without_fires(&self) -> Self {
        let mut grid = self.clone();
        for cell in &mut grid.cells {
            cell.fires.clear();
        }
        grid
    }

    /// Columns.
    #[inline]
    pub fn width(&self) -> i32 {
        self.width
    }

    /// Rows.
    #[inline]
    pub fn height(&self) -> i32 {
        self.height
    }

    /// Whether a tile lies on the board.
    #[inline]
    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && x < self.width && y < self.height
    }

    #[inline]
    fn index(&self, x: i32, y: i32) -> usize {
        (y * self.width + x) as usize
    }

    /// Cell at a tile, if on the board.
    #[inline]
    pub fn get(&self, x: i32, y: i32) -> Option<&Cell> {
        if self.in_bounds(x, y) {
            Some(&self.cells[self.index(x, y)])
        } else {
            None
        }
    }

    /// Mutable cell at a tile, if on the board.
    #[inline]
    pub fn get_mut(&mut self, x: i32, y: i32) -> Option<&mut Cell> {
        if self.in_bounds(x, y) {
            let idx = self.index(x, y);
            Some(&mut self.cells[idx])
        } else {
            None
        }
    }

    /// Cell at an on-board tile.
    ///
    /// # Panics
    /// Panics if the tile is off the board.
    #[inline]
    pub fn cell(&self, x: i32, y: i32) -> &Cell {
        assert!(self.in_bounds(x, y), "tile ({x}, {y}) off the board");
        &self.cells[self.index(x, y)]
    }

    /// Mutable cell at an on-board tile.
    ///
    /// # Panics
    /// Panics if the tile is off the board.
    #[inline]
    pub fn cell_mut(&mut self, x: i32, y: i32) -> &mut Cell {
        assert!(self.in_bounds(x, y), "tile ({x}, {y}) off the board");
        let idx = self.index(x, y);
        &mut self.cells[idx]
    }

    /// Wall at a tile; off-board tiles read as concrete.
    #[inline]
    pub fn wall_at(&self, x: i32, y: i32) -> Wall {
        self.get(x, y).map(|c| c.wall).unwrap_or(Wall::Concrete)
    }

    /// Iterate `(x, y, cell)` in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (i32, i32, &Cell)> {
        let width = self.width;
        self.cells
            .iter()
            .enumerate()
            .map(move |(i, cell)| (i as i32 % width, i as i32 / width, cell))
    }

    /// Mutable cells in row-major order.
    pub fn cells_mut(&mut self) -> impl Iterator<Item = &mut Cell> {
        self.cells.iter_mut()
    }

    /// Number of fires on the whole board.
    pub fn fire_count(&self) -> usize {
        self.cells.iter().map(|c| c.fires.len()).sum()
    }

    /// Fold the board into a state hash.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_i32(self.width);
        hasher.update_i32(self.height);
        for cell in &self.cells {
            hasher.update_u8(cell.wall as u8);
            hasher.update_u8(cell.item.map(|i| i as u8 + 1).unwrap_or(0));
            hasher.update_u32(cell.fires.len() as u32);
            for fire in &cell.fires {
                fire.hash_into(hasher);
            }
        }
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for y in 0..self.height {
            for x in 0..self.width {
                let cell = self.cell(x, y);
                let ch = if cell.is_burning() {
                    '*'
                } else {
                    match cell.wall {
                        Wall::Concrete => '#',
                        Wall::Brick => '+',
                        Wall::Empty if cell.item.is_some() => 'i',
                        Wall::Empty => '.',
                    }
                };
                write!(f, "{ch}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
