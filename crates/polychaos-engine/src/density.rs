//! Per-pixel hit counts.
//!
//! Points are rounded to the nearest pixel and counted in a row-major
//! `size * size` matrix. Points that round outside the canvas are
//! discarded and counted separately; they never wrap or clamp onto an
//! edge pixel.

use crate::geometry::Geometry;
use crate::types::Point;

/// Hit-count matrix plus the counters derived from it.
///
/// Invariants within a run: every cell is non-decreasing, and
/// `max_value` is at least 1 and at least every cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DensityMatrix {
    size: u32,
    cells: Vec<u32>,
    max_value: u32,
    new_pixels: u64,
    filled_pixels: u64,
    plotted: u64,
    discarded: u64,
}

impl DensityMatrix {
    /// Create an all-zero `size * size` matrix.
    #[must_use]
    pub fn new(size: u32) -> Self {
        let len = size as usize * size as usize;
        Self {
            size,
            cells: vec![0; len],
            max_value: 1,
            new_pixels: 0,
            filled_pixels: 0,
            plotted: 0,
            discarded: 0,
        }
    }

    /// Width and height in pixels.
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Row-major cell counts.
    #[must_use]
    pub fn cells(&self) -> &[u32] {
        &self.cells
    }

    /// Count at pixel `(x, y)`, or `None` outside the canvas.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.size || y >= self.size {
            return None;
        }
        self.cells
            .get(y as usize * self.size as usize + x as usize)
            .copied()
    }

    /// Largest count in the matrix, never below 1.
    #[must_use]
    pub const fn max_value(&self) -> u32 {
        self.max_value
    }

    /// Cells with at least one hit.
    #[must_use]
    pub const fn filled_pixels(&self) -> u64 {
        self.filled_pixels
    }

    /// Points counted since the last clear.
    #[must_use]
    pub const fn plotted(&self) -> u64 {
        self.plotted
    }

    /// Points dropped for rounding outside the canvas since the last
    /// clear.
    #[must_use]
    pub const fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Cells that went from zero to one since the last call.
    pub fn take_new_pixels(&mut self) -> u64 {
        std::mem::take(&mut self.new_pixels)
    }

    /// Map a point to its row-major cell index.
    #[allow(clippy::cast_possible_truncation)]
    fn index_of(&self, point: Point) -> Option<usize> {
        let x = point.x.round();
        let y = point.y.round();
        let size = f64::from(self.size);
        // Negated form so NaN coordinates are rejected too.
        if !(x >= 0.0 && x < size && y >= 0.0 && y < size) {
            return None;
        }
        Some(y as usize * self.size as usize + x as usize)
    }

    /// Count one hit at `point`. Returns `false` if the point was
    /// discarded.
    pub fn plot(&mut self, point: Point) -> bool {
        let Some(index) = self.index_of(point) else {
            self.discarded += 1;
            return false;
        };
        let Some(cell) = self.cells.get_mut(index) else {
            self.discarded += 1;
            return false;
        };
        if *cell == 0 {
            self.new_pixels += 1;
            self.filled_pixels += 1;
        }
        *cell = cell.saturating_add(1);
        self.max_value = self.max_value.max(*cell);
        self.plotted += 1;
        true
    }

    /// Count `point`, or its full symmetry orbit when `symmetrical` is
    /// set: every rotation of the point and of its mirror image across
    /// the vertical axis through the center.
    pub fn accumulate(&mut self, point: Point, geometry: &Geometry, symmetrical: bool) {
        if !symmetrical {
            self.plot(point);
            return;
        }
        let center = geometry.center();
        let dx = point.x - center.x;
        let dy = point.y - center.y;
        for &rotation in geometry.rotations() {
            for (ox, oy) in [(dx, dy), (-dx, dy)] {
                let (rx, ry) = rotation.apply(ox, oy);
                self.plot(Point::new(center.x + rx, center.y + ry));
            }
        }
    }

    /// Reset every cell and counter, keeping the allocation.
    pub fn clear(&mut self) {
        self.cells.fill(0);
        self.max_value = 1;
        self.new_pixels = 0;
        self.filled_pixels = 0;
        self.plotted = 0;
        self.discarded = 0;
    }
}
