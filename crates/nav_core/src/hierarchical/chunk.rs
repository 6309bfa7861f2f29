//! Per-chunk connected-region labelling.

use serde::{Deserialize, Serialize};

use crate::grid::{NavcellGrid, PassClassMask};

/// Side length of a chunk in navcells.
pub const CHUNK_SIZE: u16 = 96;

const CELLS: usize = CHUNK_SIZE as usize * CHUNK_SIZE as usize;

/// Identifies one region inside one chunk. `r` starts at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegionId {
    /// Chunk column.
    pub ci: u16,
    /// Chunk row.
    pub cj: u16,
    /// Local region number.
    pub r: u16,
}

/// Inclusive navcell bounding box of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionBounds {
    /// Minimum column.
    pub i0: u16,
    /// Minimum row.
    pub j0: u16,
    /// Maximum column.
    pub i1: u16,
    /// Maximum row.
    pub j1: u16,
}

impl RegionBounds {
    fn point(i: u16, j: u16) -> Self {
        Self { i0: i, j0: j, i1: i, j1: j }
    }

    fn include(&mut self, i: u16, j: u16) {
        self.i0 = self.i0.min(i);
        self.j0 = self.j0.min(j);
        self.i1 = self.i1.max(i);
        self.j1 = self.j1.max(j);
    }

    /// Squared Euclidean distance (in navcells) from a navcell to the box.
    #[must_use]
    pub fn distance_squared(&self, i: u16, j: u16) -> u32 {
        let di = u32::from(self.i0.saturating_sub(i).max(i.saturating_sub(self.i1)));
        let dj = u32::from(self.j0.saturating_sub(j).max(j.saturating_sub(self.j1)));
        di * di + dj * dj
    }
}

/// Union-find over provisional labels with path compression. The smaller
/// label always becomes the root, which keeps the labelling deterministic.
#[derive(Debug, Default)]
struct UnionFind {
    parent: Vec<u16>,
}

impl UnionFind {
    fn make(&mut self) -> u16 {
        if self.parent.is_empty() {
            // Label 0 means "impassable".
            self.parent.push(0);
        }
        let label = self.parent.len() as u16;
        self.parent.push(label);
        label
    }

    fn find(&mut self, mut x: u16) -> u16 {
        let mut root = x;
        while self.parent[root as usize] != root {
            root = self.parent[root as usize];
        }
        while self.parent[x as usize] != root {
            let next = self.parent[x as usize];
            self.parent[x as usize] = root;
            x = next;
        }
        root
    }

    fn union(&mut self, a: u16, b: u16) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra < rb {
            self.parent[rb as usize] = ra;
        } else if rb < ra {
            self.parent[ra as usize] = rb;
        }
    }
}

/// Region labels of one chunk for one passability class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    ci: u16,
    cj: u16,
    regions: Vec<u16>,
    bounds: Vec<RegionBounds>,
}

impl Chunk {
    /// Label the 4-connected passable components of chunk `(ci, cj)`.
    ///
    /// Cells outside the grid count as impassable.
    #[must_use]
    pub fn compute(grid: &NavcellGrid, mask: PassClassMask, ci: u16, cj: u16) -> Self {
        let i_base = u32::from(ci) * u32::from(CHUNK_SIZE);
        let j_base = u32::from(cj) * u32::from(CHUNK_SIZE);
        let n = CHUNK_SIZE as usize;

        let mut labels = vec![0u16; CELLS];
        let mut sets = UnionFind::default();

        for lj in 0..n {
            for li in 0..n {
                let i = (i_base + li as u32) as i32;
                let j = (j_base + lj as u32) as i32;
                if !grid.is_passable_at(i, j, mask) {
                    continue;
                }
                let index = lj * n + li;
                let left = if li > 0 { labels[index - 1] } else { 0 };
                let down = if lj > 0 { labels[index - n] } else { 0 };
                labels[index] = match (left, down) {
                    (0, 0) => sets.make(),
                    (l, 0) | (0, l) => l,
                    (l, d) => {
                        sets.union(l, d);
                        l.min(d)
                    }
                };
            }
        }

        // Compaction: roots become dense ids in scan order.
        let mut dense = vec![0u16; sets.parent.len()];
        let mut bounds: Vec<RegionBounds> = Vec::new();
        for lj in 0..n {
            for li in 0..n {
                let index = lj * n + li;
                if labels[index] == 0 {
                    continue;
                }
                let root = sets.find(labels[index]);
                let (i, j) = ((i_base + li as u32) as u16, (j_base + lj as u32) as u16);
                if dense[root as usize] == 0 {
                    bounds.push(RegionBounds::point(i, j));
                    dense[root as usize] = bounds.len() as u16;
                }
                let id = dense[root as usize];
                bounds[id as usize - 1].include(i, j);
                labels[index] = id;
            }
        }

        Self {
            ci,
            cj,
            regions: labels,
            bounds,
        }
    }

    /// Chunk column.
    #[must_use]
    pub fn ci(&self) -> u16 {
        self.ci
    }

    /// Chunk row.
    #[must_use]
    pub fn cj(&self) -> u16 {
        self.cj
    }

    /// Number of regions.
    #[must_use]
    pub fn region_count(&self) -> u16 {
        self.bounds.len() as u16
    }

    /// Region ids of this chunk, in ascending order.
    pub fn region_ids(&self) -> impl Iterator<Item = RegionId> + '_ {
        (1..=self.region_count()).map(|r| RegionId {
            ci: self.ci,
            cj: self.cj,
            r,
        })
    }

    /// Local region number of a chunk-relative cell (0 if impassable).
    #[must_use]
    pub fn local_region(&self, li: u16, lj: u16) -> u16 {
        self.regions[lj as usize * CHUNK_SIZE as usize + li as usize]
    }

    /// Local region number of a navcell inside this chunk.
    #[must_use]
    pub fn region_at(&self, i: u16, j: u16) -> u16 {
        let li = i - self.ci * CHUNK_SIZE;
        let lj = j - self.cj * CHUNK_SIZE;
        self.local_region(li, lj)
    }

    /// Bounding box of local region `r`.
    #[must_use]
    pub fn bounds(&self, r: u16) -> RegionBounds {
        self.bounds[r as usize - 1]
    }

    /// Navcells of region `r`, row-major.
    pub fn cells(&self, r: u16) -> impl Iterator<Item = (u16, u16)> + '_ {
        let b = self.bounds(r);
        (b.j0..=b.j1)
            .flat_map(move |j| (b.i0..=b.i1).map(move |i| (i, j)))
            .filter(move |&(i, j)| self.region_at(i, j) == r)
    }
}
