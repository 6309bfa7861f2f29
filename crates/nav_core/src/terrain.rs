//! Terrain queries consumed by the navcell grid builder.
//!
//! The navigation core never owns terrain data; it asks a [`TerrainSource`]
//! for ground height, slope and water level at navcell centers.
//! [`HeightmapTerrain`] is the in-crate implementation used by the
//! simulation façade, tools and tests.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::grid::{Grid, TERRAIN_TILE_SIZE};
use crate::math::{fixed_serde, Fixed};

/// Source of terrain height and water data.
pub trait TerrainSource {
    /// Number of terrain tiles along each side of the (square) map.
    fn tiles_per_side(&self) -> u16;

    /// Ground height at a world position.
    fn ground_level(&self, x: Fixed, z: Fixed) -> Fixed;

    /// Slope (rise over run) at a world position.
    fn slope(&self, x: Fixed, z: Fixed) -> Fixed;

    /// Water surface height at a world position.
    fn water_level(&self, x: Fixed, z: Fixed) -> Fixed;

    /// Water depth at a world position, negative on dry land.
    fn water_depth(&self, x: Fixed, z: Fixed) -> Fixed {
        self.water_level(x, z) - self.ground_level(x, z)
    }
}

/// Terrain defined by heights at tile vertices.
///
/// Heights are stored for `(tiles + 1)²` vertices, row-major.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeightmapTerrain {
    tiles: u16,
    heights: Vec<i64>,
    #[serde(with = "fixed_serde")]
    water_level: Fixed,
}

impl HeightmapTerrain {
    /// Flat dry terrain of the given size.
    #[must_use]
    pub fn flat(tiles: u16) -> Self {
        let verts = (tiles as usize + 1) * (tiles as usize + 1);
        Self {
            tiles,
            heights: vec![0; verts],
            water_level: Fixed::from_num(-1),
        }
    }

    /// Build from per-vertex heights. Missing heights default to zero.
    #[must_use]
    pub fn from_heights(tiles: u16, heights: &[Fixed], water_level: Fixed) -> Self {
        let verts = (tiles as usize + 1) * (tiles as usize + 1);
        let mut bits: Vec<i64> = heights.iter().map(|h| h.to_bits()).collect();
        bits.resize(verts, 0);
        Self {
            tiles,
            heights: bits,
            water_level,
        }
    }

    /// Set the height of one vertex.
    pub fn set_vertex_height(&mut self, vi: u16, vj: u16, height: Fixed) {
        let stride = self.tiles as usize + 1;
        if let Some(h) = self.heights.get_mut(vj as usize * stride + vi as usize) {
            *h = height.to_bits();
        }
    }

    /// Change the global water level.
    pub fn set_water_level(&mut self, level: Fixed) {
        self.water_level = level;
    }

    fn vertex(&self, vi: i32, vj: i32) -> Fixed {
        let max = i32::from(self.tiles);
        let vi = vi.clamp(0, max) as usize;
        let vj = vj.clamp(0, max) as usize;
        Fixed::from_bits(self.heights[vj * (self.tiles as usize + 1) + vi])
    }

    fn tile_coords(x: Fixed, z: Fixed) -> (i32, i32, Fixed, Fixed) {
        let tx = x / TERRAIN_TILE_SIZE;
        let tz = z / TERRAIN_TILE_SIZE;
        let i = tx.floor().to_num::<i32>();
        let j = tz.floor().to_num::<i32>();
        (i, j, tx.frac(), tz.frac())
    }
}

impl TerrainSource for HeightmapTerrain {
    fn tiles_per_side(&self) -> u16 {
        self.tiles
    }

    fn ground_level(&self, x: Fixed, z: Fixed) -> Fixed {
        let (i, j, fx, fz) = Self::tile_coords(x, z);
        let h00 = self.vertex(i, j);
        let h10 = self.vertex(i + 1, j);
        let h01 = self.vertex(i, j + 1);
        let h11 = self.vertex(i + 1, j + 1);
        let top = h00 + (h10 - h00) * fx;
        let bottom = h01 + (h11 - h01) * fx;
        top + (bottom - top) * fz
    }

    fn slope(&self, x: Fixed, z: Fixed) -> Fixed {
        let (i, j, _, _) = Self::tile_coords(x, z);
        let h00 = self.vertex(i, j);
        let h10 = self.vertex(i + 1, j);
        let h01 = self.vertex(i, j + 1);
        let h11 = self.vertex(i + 1, j + 1);
        // Steepest of the four tile edges.
        let rise = [
            (h10 - h00).abs(),
            (h11 - h01).abs(),
            (h01 - h00).abs(),
            (h11 - h10).abs(),
        ]
        .into_iter()
        .max()
        .unwrap_or(Fixed::ZERO);
        rise / TERRAIN_TILE_SIZE
    }

    fn water_level(&self, _x: Fixed, _z: Fixed) -> Fixed {
        self.water_level
    }
}

/// Distance from each terrain tile to the shoreline, in world units.
///
/// Land tiles get the distance to the nearest water tile, water tiles get the
/// negated distance to the nearest land tile. Distances are measured in
/// whole tiles with 8-connected steps. Maps without water (or without land)
/// report `i32::MAX` (or `i32::MIN`) everywhere.
#[must_use]
pub fn compute_shore_distances(terrain: &dyn TerrainSource) -> Grid<i32> {
    let tiles = terrain.tiles_per_side();
    let half = TERRAIN_TILE_SIZE / 2;
    let mut is_water: Grid<u8> = Grid::new(tiles, tiles);
    for j in 0..tiles {
        for i in 0..tiles {
            let x = Fixed::from_num(i) * TERRAIN_TILE_SIZE + half;
            let z = Fixed::from_num(j) * TERRAIN_TILE_SIZE + half;
            if terrain.water_depth(x, z) > Fixed::ZERO {
                is_water.set(i, j, 1);
            }
        }
    }

    let to_land = tile_distances(&is_water, 1, tiles);
    let to_water = tile_distances(&is_water, 0, tiles);

    let tile_size = TERRAIN_TILE_SIZE.to_num::<i32>();
    let mut out: Grid<i32> = Grid::new(tiles, tiles);
    for j in 0..tiles {
        for i in 0..tiles {
            let value = if is_water.get(i, j) == 1 {
                to_land.get(i, j).map_or(i32::MIN, |d| -(d as i32) * tile_size)
            } else {
                to_water.get(i, j).map_or(i32::MAX, |d| d as i32 * tile_size)
            };
            out.set(i, j, value);
        }
    }
    out
}

/// Multi-source BFS: tiles whose water flag differs from `source_flag` are
/// seeds; returns the step distance to the nearest seed.
fn tile_distances(is_water: &Grid<u8>, source_flag: u8, tiles: u16) -> Grid<Option<u32>> {
    let mut dist: Grid<Option<u32>> = Grid::new(tiles, tiles);
    let mut queue = VecDeque::new();
    for j in 0..tiles {
        for i in 0..tiles {
            if is_water.get(i, j) != source_flag {
                dist.set(i, j, Some(0));
                queue.push_back((i, j));
            }
        }
    }
    while let Some((i, j)) = queue.pop_front() {
        let d = dist.get(i, j).unwrap_or(0);
        for (di, dj) in [(-1, -1), (0, -1), (1, -1), (-1, 0), (1, 0), (-1, 1), (0, 1), (1, 1)] {
            let ni = i32::from(i) + di;
            let nj = i32::from(j) + dj;
            if !dist.in_bounds(ni, nj) {
                continue;
            }
            let (ni, nj) = (ni as u16, nj as u16);
            if dist.get(ni, nj).is_none() {
                dist.set(ni, nj, Some(d + 1));
                queue.push_back((ni, nj));
            }
        }
    }
    dist
}
