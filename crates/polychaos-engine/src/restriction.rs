//! Vertex selection rules and their precomputed lookup table.
//!
//! The [`Restriction`] enum selects a rule; [`RestrictionTable`] bakes
//! the static part of that rule (which vertices are legal after a given
//! vertex) into a per-vertex list so the walker never has to retry a
//! rejected choice. The dynamic part (how far back to look, and whether
//! the rule is active at all) lives in the walker.

use serde::{Deserialize, Serialize};

use crate::geometry::Geometry;

/// Rule constraining which vertex may be chosen next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Restriction {
    /// Any vertex may follow any vertex.
    #[default]
    None,

    /// The same vertex may not be chosen twice in a row.
    NoRepeat,

    /// After choosing the same vertex twice in a row, a third repeat is
    /// forbidden.
    NoDoubleRepeat,

    /// The vertex chosen two steps ago may not be chosen again.
    NoReturn,

    /// A ring neighbor of the previous vertex may not be chosen.
    NoNeighbor,

    /// After choosing the same vertex twice in a row, its ring
    /// neighbors are forbidden.
    NoNeighborAfterRepeat,
}

impl Restriction {
    /// Every rule, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::None,
        Self::NoRepeat,
        Self::NoDoubleRepeat,
        Self::NoReturn,
        Self::NoNeighbor,
        Self::NoNeighborAfterRepeat,
    ];

    /// The kebab-case name used in serialized settings.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::NoRepeat => "no-repeat",
            Self::NoDoubleRepeat => "no-double-repeat",
            Self::NoReturn => "no-return",
            Self::NoNeighbor => "no-neighbor",
            Self::NoNeighborAfterRepeat => "no-neighbor-after-repeat",
        }
    }

    /// Whether the rule only applies after the last two choices were
    /// identical.
    #[must_use]
    pub const fn requires_repeat(self) -> bool {
        matches!(self, Self::NoDoubleRepeat | Self::NoNeighborAfterRepeat)
    }

    /// Whether the rule forbids the lookback vertex itself.
    #[must_use]
    pub const fn excludes_self(self) -> bool {
        matches!(
            self,
            Self::NoRepeat | Self::NoDoubleRepeat | Self::NoReturn
        )
    }

    /// Whether the rule forbids the ring neighbors of the lookback
    /// vertex.
    #[must_use]
    pub const fn excludes_neighbors(self) -> bool {
        matches!(self, Self::NoNeighbor | Self::NoNeighborAfterRepeat)
    }
}

impl std::fmt::Display for Restriction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Legal next-vertex indices for every vertex under one rule.
///
/// Invariant: every entry is non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestrictionTable {
    allowed: Vec<Vec<usize>>,
}

impl RestrictionTable {
    /// Build the table for `geometry` under `rule`.
    #[must_use]
    pub fn build(geometry: &Geometry, rule: Restriction) -> Self {
        Self::for_ring(geometry.len(), geometry.ring_size(), rule)
    }

    /// Build the table for `vertex_count` vertices of which the first
    /// `ring_size` form the neighbor ring.
    #[must_use]
    pub fn for_ring(vertex_count: usize, ring_size: usize, rule: Restriction) -> Self {
        let allowed = (0..vertex_count)
            .map(|i| {
                let legal: Vec<usize> = (0..vertex_count)
                    .filter(|&j| !forbids(rule, ring_size, i, j))
                    .collect();
                if legal.is_empty() {
                    (0..vertex_count).collect()
                } else {
                    legal
                }
            })
            .collect();
        Self { allowed }
    }

    /// Legal successors of vertex `index`.
    ///
    /// Out-of-range indices have no legal successors.
    #[must_use]
    pub fn allowed(&self, index: usize) -> &[usize] {
        self.allowed.get(index).map_or(&[], Vec::as_slice)
    }

    /// Number of vertices covered by the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.allowed.len()
    }

    /// Whether the table covers no vertices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }
}

/// Whether `rule` forbids moving from vertex `from` to vertex `to`.
fn forbids(rule: Restriction, ring_size: usize, from: usize, to: usize) -> bool {
    if rule.excludes_self() {
        return from == to;
    }
    if rule.excludes_neighbors() {
        // Vertices outside the ring (the center) have no neighbors.
        if from >= ring_size || to >= ring_size {
            return false;
        }
        let left = (from + ring_size - 1) % ring_size;
        let right = (from + 1) % ring_size;
        return to == left || to == right;
    }
    false
}
