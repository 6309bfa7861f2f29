//! Navcell grid storage and grid-level movement tests.
//!
//! The navcell grid is a dense array of 16-bit masks. Bit `k` set means
//! "blocked for passability class `k`". The most significant bit is kept
//! free as scratch space for in-place grid algorithms.

use crate::math::{Fixed, Vec2Fixed};

/// Per-navcell passability data: one blocked bit per class.
pub type NavcellData = u16;

/// Bitmask selecting one (or more) passability classes.
pub type PassClassMask = u16;

/// Reserved bit used as scratch by grid algorithms.
pub const SCRATCH_BIT: NavcellData = 1 << 15;

/// Side length of one navcell in world units.
pub const NAVCELL_SIZE: Fixed = Fixed::ONE;

/// Navcells along each side of a terrain tile.
pub const NAVCELLS_PER_TILE: u16 = 4;

/// Side length of one terrain tile in world units.
pub const TERRAIN_TILE_SIZE: Fixed = Fixed::const_from_int(4);

/// Returns true if `data` is passable for every class in `mask`.
#[inline]
#[must_use]
pub const fn is_passable(data: NavcellData, mask: PassClassMask) -> bool {
    data & mask == 0
}

/// Dense row-major 2D array.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Grid<T> {
    width: u16,
    height: u16,
    data: Vec<T>,
}

impl<T: Copy + Default> Grid<T> {
    /// Create a grid filled with `T::default()`.
    #[must_use]
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            data: vec![T::default(); width as usize * height as usize],
        }
    }

    /// Grid width in cells.
    #[must_use]
    pub const fn width(&self) -> u16 {
        self.width
    }

    /// Grid height in cells.
    #[must_use]
    pub const fn height(&self) -> u16 {
        self.height
    }

    #[inline]
    fn index(&self, i: u16, j: u16) -> usize {
        j as usize * self.width as usize + i as usize
    }

    /// Check if signed coordinates are within bounds.
    #[inline]
    #[must_use]
    pub fn in_bounds(&self, i: i32, j: i32) -> bool {
        i >= 0 && j >= 0 && i < i32::from(self.width) && j < i32::from(self.height)
    }

    /// Value at `(i, j)`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are out of bounds.
    #[inline]
    #[must_use]
    pub fn get(&self, i: u16, j: u16) -> T {
        debug_assert!(i < self.width && j < self.height);
        self.data[self.index(i, j)]
    }

    /// Value at signed coordinates, `None` if out of bounds.
    #[inline]
    #[must_use]
    pub fn try_get(&self, i: i32, j: i32) -> Option<T> {
        if self.in_bounds(i, j) {
            Some(self.get(i as u16, j as u16))
        } else {
            None
        }
    }

    /// Store a value at `(i, j)`.
    #[inline]
    pub fn set(&mut self, i: u16, j: u16, value: T) {
        debug_assert!(i < self.width && j < self.height);
        let index = self.index(i, j);
        self.data[index] = value;
    }

    /// Mutable reference to the value at `(i, j)`.
    #[inline]
    pub fn get_mut(&mut self, i: u16, j: u16) -> &mut T {
        let index = self.index(i, j);
        &mut self.data[index]
    }

    /// Reset every cell to `T::default()`.
    pub fn reset(&mut self) {
        self.data.fill(T::default());
    }

    /// Raw row-major cell data.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }
}

impl Grid<u8> {
    /// Returns true if any cell is non-zero.
    #[must_use]
    pub fn any_set(&self) -> bool {
        self.data.iter().any(|&v| v != 0)
    }
}

/// The navcell grid.
pub type NavcellGrid = Grid<NavcellData>;

impl NavcellGrid {
    /// Passability of a navcell; out-of-bounds cells are impassable.
    #[inline]
    #[must_use]
    pub fn is_passable_at(&self, i: i32, j: i32, mask: PassClassMask) -> bool {
        self.try_get(i, j).is_some_and(|d| is_passable(d, mask))
    }
}

/// Which parts of the navcell grid changed since the last update.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GridDirtiness {
    /// Whether anything changed at all.
    pub dirty: bool,
    /// Whether the whole grid must be rebuilt.
    pub global_recompute: bool,
    /// Per-navcell dirtiness (non-zero means changed).
    pub dirty_cells: Grid<u8>,
}

impl GridDirtiness {
    /// Create a clean dirtiness record for a grid of the given size.
    #[must_use]
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            dirty: false,
            global_recompute: false,
            dirty_cells: Grid::new(width, height),
        }
    }

    /// Mark a single navcell as dirty.
    pub fn mark(&mut self, i: u16, j: u16) {
        self.dirty = true;
        self.dirty_cells.set(i, j, 1);
    }

    /// Request a full rebuild.
    pub fn mark_global(&mut self) {
        self.dirty = true;
        self.global_recompute = true;
    }

    /// Fold another record into this one.
    pub fn merge(&mut self, other: &GridDirtiness) {
        self.dirty |= other.dirty;
        self.global_recompute |= other.global_recompute;
        if other.dirty_cells.width() == self.dirty_cells.width()
            && other.dirty_cells.height() == self.dirty_cells.height()
        {
            for (dst, &src) in self.dirty_cells.data.iter_mut().zip(&other.dirty_cells.data) {
                *dst |= src;
            }
        } else if other.dirty {
            self.global_recompute = true;
        }
    }

    /// Forget all recorded changes.
    pub fn clean(&mut self) {
        self.dirty = false;
        self.global_recompute = false;
        self.dirty_cells.reset();
    }
}

/// Navcell containing a world position, clamped into the grid.
#[must_use]
pub fn nearest_navcell(x: Fixed, z: Fixed, width: u16, height: u16) -> (u16, u16) {
    let clamp = |v: Fixed, max: u16| -> u16 {
        let cell = (v / NAVCELL_SIZE).floor().to_num::<i32>();
        cell.clamp(0, i32::from(max.max(1)) - 1) as u16
    };
    (clamp(x, width), clamp(z, height))
}

/// World-space center of a navcell.
#[must_use]
pub fn navcell_center(i: u16, j: u16) -> Vec2Fixed {
    let half = NAVCELL_SIZE / 2;
    Vec2Fixed::new(
        Fixed::from_num(i) * NAVCELL_SIZE + half,
        Fixed::from_num(j) * NAVCELL_SIZE + half,
    )
}

/// Walks the navcells crossed by the segment `a -> b` and reports whether the
/// movement is allowed for `mask`.
///
/// Moving out of impassable cells is always allowed; once the segment has
/// touched a passable cell, entering an impassable one fails. A segment that
/// passes exactly through a navcell corner must have both side cells free.
#[must_use]
pub fn check_line_movement(a: Vec2Fixed, b: Vec2Fixed, mask: PassClassMask, grid: &NavcellGrid) -> bool {
    let cell = |p: Fixed| (p / NAVCELL_SIZE).floor().to_num::<i32>();
    let (mut i, mut j) = (cell(a.x), cell(a.y));
    let (i1, j1) = (cell(b.x), cell(b.y));

    let di: i32 = if b.x > a.x { 1 } else { -1 };
    let dj: i32 = if b.y > a.y { 1 } else { -1 };
    let delta = b - a;

    let mut in_passable = grid.is_passable_at(i, j, mask);

    while (i, j) != (i1, j1) {
        if i == i1 {
            j += dj;
        } else if j == j1 {
            i += di;
        } else {
            let corner = Vec2Fixed::new(
                Fixed::from_num(if di > 0 { i + 1 } else { i }) * NAVCELL_SIZE,
                Fixed::from_num(if dj > 0 { j + 1 } else { j }) * NAVCELL_SIZE,
            );
            let side = delta.cross(corner - a);
            let turn = side * Fixed::from_num(di * dj);
            if turn > Fixed::ZERO {
                i += di;
            } else if turn < Fixed::ZERO {
                j += dj;
            } else {
                if in_passable
                    && (!grid.is_passable_at(i + di, j, mask) || !grid.is_passable_at(i, j + dj, mask))
                {
                    return false;
                }
                i += di;
                j += dj;
            }
        }

        if grid.is_passable_at(i, j, mask) {
            in_passable = true;
        } else if in_passable {
            return false;
        }
    }

    true
}

/// Marks as impassable (for the single class `mask`) every navcell within
/// Chebyshev distance `clearance` of an impassable navcell.
///
/// Runs as two separable 1D passes through [`SCRATCH_BIT`].
pub fn expand_impassable_cells(grid: &mut NavcellGrid, clearance: i32, mask: PassClassMask) {
    if clearance <= 0 {
        return;
    }
    let w = i32::from(grid.width());
    let h = i32::from(grid.height());
    let blocked = |d: NavcellData| !is_passable(d, mask);

    // Horizontal pass: mask -> scratch.
    for j in 0..h {
        let mut count = (0..=clearance.min(w - 1))
            .filter(|&i| blocked(grid.get(i as u16, j as u16)))
            .count();
        for i in 0..w {
            if count > 0 {
                *grid.get_mut(i as u16, j as u16) |= SCRATCH_BIT;
            }
            let leaving = i - clearance;
            if leaving >= 0 && blocked(grid.get(leaving as u16, j as u16)) {
                count -= 1;
            }
            let entering = i + clearance + 1;
            if entering < w && blocked(grid.get(entering as u16, j as u16)) {
                count += 1;
            }
        }
    }

    // Vertical pass: scratch -> mask.
    for i in 0..w {
        let scratch = |grid: &NavcellGrid, j: i32| grid.get(i as u16, j as u16) & SCRATCH_BIT != 0;
        let mut count = (0..=clearance.min(h - 1)).filter(|&j| scratch(grid, j)).count();
        for j in 0..h {
            let leaving = j - clearance;
            let leaving_set = leaving >= 0 && scratch(grid, leaving);
            let entering = j + clearance + 1;
            let entering_set = entering < h && scratch(grid, entering);
            if count > 0 {
                *grid.get_mut(i as u16, j as u16) |= mask;
            }
            if leaving_set {
                count -= 1;
            }
            if entering_set {
                count += 1;
            }
        }
    }

    for cell in &mut grid.data {
        *cell &= !SCRATCH_BIT;
    }
}
