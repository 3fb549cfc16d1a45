//! The restricted random walk.
//!
//! Each step picks a vertex (subject to the active [`Restriction`]),
//! records it in a bounded [`MoveHistory`], and moves the current point
//! a fixed fraction of the way toward it.

use std::collections::VecDeque;

use rand::Rng;

use crate::geometry::Geometry;
use crate::restriction::{Restriction, RestrictionTable};
use crate::types::Point;

/// Bounded queue of recent vertex choices, oldest evicted first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveHistory {
    moves: VecDeque<usize>,
    capacity: usize,
}

impl MoveHistory {
    /// Create an empty history holding at most `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            moves: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Record a choice, evicting the oldest entry when full.
    pub fn push(&mut self, index: usize) {
        self.moves.push_back(index);
        while self.moves.len() > self.capacity {
            self.moves.pop_front();
        }
    }

    /// The most recent choice.
    #[must_use]
    pub fn last(&self) -> Option<usize> {
        self.moves.back().copied()
    }

    /// The choice before the most recent one.
    #[must_use]
    pub fn second_last(&self) -> Option<usize> {
        self.moves.len().checked_sub(2).and_then(|i| self.moves.get(i).copied())
    }

    /// Number of recorded choices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.moves.len()
    }

    /// Whether no choice has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// Maximum number of retained choices.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Forget every recorded choice.
    pub fn clear(&mut self) {
        self.moves.clear();
    }

    /// Iterate from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.moves.iter().copied()
    }

    /// The vertex whose legal set constrains the next choice, or `None`
    /// when the next choice is unconstrained.
    #[must_use]
    pub fn lookback(&self, rule: Restriction) -> Option<usize> {
        let last = self.last()?;
        match rule {
            Restriction::NoReturn => self.second_last(),
            r if r.requires_repeat() => self.second_last().filter(|&prev| prev == last),
            _ => Some(last),
        }
    }
}

/// Everything a step needs besides the walker's own state.
#[derive(Debug, Clone, Copy)]
pub struct WalkRules<'a> {
    /// Vertex positions.
    pub geometry: &'a Geometry,
    /// Legal successors per vertex.
    pub table: &'a RestrictionTable,
    /// Active rule, used to decide the lookback.
    pub restriction: Restriction,
    /// Fraction of the distance covered per jump.
    pub jump_distance: f64,
}

/// Current point plus choice history.
#[derive(Debug, Clone, PartialEq)]
pub struct Walker {
    current: Point,
    history: MoveHistory,
}

impl Walker {
    /// Create a walker at `start` with an empty history.
    #[must_use]
    pub fn new(start: Point, history_capacity: usize) -> Self {
        Self {
            current: start,
            history: MoveHistory::with_capacity(history_capacity),
        }
    }

    /// Create a walker at a uniform point inside the polygon and run
    /// `burn_in` discarded steps so it settles onto the attractor.
    pub fn spawn<R: Rng + ?Sized>(
        rules: &WalkRules<'_>,
        history_capacity: usize,
        burn_in: usize,
        rng: &mut R,
    ) -> Self {
        let start = rules.geometry.sample_interior(rng);
        let mut walker = Self::new(start, history_capacity);
        walker.burn_in(rules, burn_in, rng);
        walker
    }

    /// Run `steps` steps without reporting the points.
    pub fn burn_in<R: Rng + ?Sized>(&mut self, rules: &WalkRules<'_>, steps: usize, rng: &mut R) {
        for _ in 0..steps {
            self.step(rules, rng);
        }
    }

    /// Choose the next vertex index without moving.
    pub fn choose<R: Rng + ?Sized>(&self, rules: &WalkRules<'_>, rng: &mut R) -> usize {
        let vertex_count = rules.geometry.len();
        let legal = self
            .history
            .lookback(rules.restriction)
            .map(|prev| rules.table.allowed(prev))
            .filter(|legal| !legal.is_empty());
        match legal {
            Some(legal) => legal[rng.gen_range(0..legal.len())],
            None => rng.gen_range(0..vertex_count),
        }
    }

    /// Take one step and return the new point.
    pub fn step<R: Rng + ?Sized>(&mut self, rules: &WalkRules<'_>, rng: &mut R) -> Point {
        let index = self.choose(rules, rng);
        self.history.push(index);
        self.current = self
            .current
            .lerp(rules.geometry.vertices()[index], rules.jump_distance);
        self.current
    }

    /// The current point.
    #[must_use]
    pub const fn current(&self) -> Point {
        self.current
    }

    /// Recent vertex choices.
    #[must_use]
    pub const fn history(&self) -> &MoveHistory {
        &self.history
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    use super::*;

    /// Run `steps` steps and return every chosen vertex index.
    fn choices(geometry: &Geometry, rule: Restriction, steps: usize, seed: u64) -> Vec<usize> {
        let table = RestrictionTable::build(geometry, rule);
        let rules = WalkRules {
            geometry,
            table: &table,
            restriction: rule,
            jump_distance: 0.5,
        };
        let mut rng = Pcg32::seed_from_u64(seed);
        let mut walker = Walker::new(geometry.center(), 10);
        (0..steps)
            .map(|_| {
                walker.step(&rules, &mut rng);
                walker.history().last().unwrap()
            })
            .collect()
    }

    fn square() -> Geometry {
        Geometry::new(200, 4, 0.0, false, false).unwrap()
    }

    // --- MoveHistory tests ---

    #[test]
    fn history_evicts_oldest() {
        let mut h = MoveHistory::with_capacity(3);
        for i in 0..5 {
            h.push(i);
        }
        assert_eq!(h.len(), 3);
        assert_eq!(h.iter().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(h.last(), Some(4));
        assert_eq!(h.second_last(), Some(3));
    }

    #[test]
    fn history_empty_has_no_lookback() {
        let h = MoveHistory::with_capacity(10);
        for rule in Restriction::ALL {
            assert_eq!(h.lookback(rule), None, "{rule}");
        }
    }

    #[test]
    fn no_return_needs_two_entries() {
        let mut h = MoveHistory::with_capacity(10);
        h.push(1);
        assert_eq!(h.lookback(Restriction::NoReturn), None);
        h.push(2);
        assert_eq!(h.lookback(Restriction::NoReturn), Some(1));
    }

    #[test]
    fn repeat_rules_need_a_repeat() {
        let mut h = MoveHistory::with_capacity(10);
        h.push(1);
        assert_eq!(h.lookback(Restriction::NoDoubleRepeat), None);
        h.push(2);
        assert_eq!(h.lookback(Restriction::NoDoubleRepeat), None);
        h.push(2);
        assert_eq!(h.lookback(Restriction::NoDoubleRepeat), Some(2));
        assert_eq!(h.lookback(Restriction::NoNeighborAfterRepeat), Some(2));
    }

    #[test]
    fn single_step_rules_use_last() {
        let mut h = MoveHistory::with_capacity(10);
        h.push(3);
        assert_eq!(h.lookback(Restriction::NoRepeat), Some(3));
        assert_eq!(h.lookback(Restriction::NoNeighbor), Some(3));
        assert_eq!(h.lookback(Restriction::None), Some(3));
    }

    // --- Walker tests ---

    #[test]
    fn step_moves_toward_chosen_vertex() {
        let g = square();
        let table = RestrictionTable::build(&g, Restriction::None);
        let rules = WalkRules {
            geometry: &g,
            table: &table,
            restriction: Restriction::None,
            jump_distance: 0.25,
        };
        let mut rng = Pcg32::seed_from_u64(1);
        let mut walker = Walker::new(g.center(), 10);
        let before = walker.current();
        let after = walker.step(&rules, &mut rng);
        let vertex = g.vertices()[walker.history().last().unwrap()];
        let expected = before.lerp(vertex, 0.25);
        assert!(after.distance(expected) < 1e-12);
        assert!((after.distance(before) - 25.0).abs() < 1e-9);
    }

    #[test]
    fn history_never_exceeds_capacity() {
        let g = square();
        let table = RestrictionTable::build(&g, Restriction::None);
        let rules = WalkRules {
            geometry: &g,
            table: &table,
            restriction: Restriction::None,
            jump_distance: 0.5,
        };
        let mut rng = Pcg32::seed_from_u64(2);
        let mut walker = Walker::new(g.center(), 10);
        walker.burn_in(&rules, 100, &mut rng);
        assert_eq!(walker.history().len(), 10);
    }

    #[test]
    fn no_repeat_never_repeats() {
        let seq = choices(&square(), Restriction::NoRepeat, 20_000, 3);
        assert!(seq.windows(2).all(|w| w[0] != w[1]));
    }

    #[test]
    fn no_return_never_returns() {
        let seq = choices(&square(), Restriction::NoReturn, 20_000, 4);
        assert!(seq.windows(3).all(|w| w[0] != w[2]));
    }

    #[test]
    fn no_double_repeat_never_triples() {
        let seq = choices(&square(), Restriction::NoDoubleRepeat, 20_000, 5);
        assert!(seq.windows(3).all(|w| !(w[0] == w[1] && w[1] == w[2])));
        // Doubles are still allowed.
        assert!(seq.windows(2).any(|w| w[0] == w[1]));
    }

    #[test]
    fn no_neighbor_never_steps_to_neighbor() {
        let g = Geometry::new(200, 5, 0.0, true, true).unwrap();
        let ring = g.ring_size();
        let seq = choices(&g, Restriction::NoNeighbor, 20_000, 6);
        for w in seq.windows(2) {
            if w[0] < ring && w[1] < ring {
                let diff = (w[1] + ring - w[0]) % ring;
                assert!(diff != 1 && diff != ring - 1, "neighbor step {w:?}");
            }
        }
        // The center is reachable.
        assert!(seq.contains(&ring));
    }

    #[test]
    fn no_neighbor_after_repeat_only_restricts_after_repeat() {
        let g = Geometry::new(200, 6, 0.0, false, false).unwrap();
        let seq = choices(&g, Restriction::NoNeighborAfterRepeat, 30_000, 7);
        for w in seq.windows(3) {
            if w[0] == w[1] {
                let diff = (w[2] + 6 - w[1]) % 6;
                assert!(diff != 1 && diff != 5, "neighbor after repeat {w:?}");
            }
        }
        // Without a repeat, neighbor steps do happen.
        assert!(seq.windows(2).any(|w| (w[1] + 6 - w[0]) % 6 == 1));
    }

    #[test]
    fn unrestricted_choice_is_roughly_uniform() {
        let seq = choices(&square(), Restriction::None, 40_000, 8);
        let mut counts = [0_u32; 4];
        for i in seq {
            counts[i] += 1;
        }
        for c in counts {
            assert!((9_000..=11_000).contains(&c), "skewed: {counts:?}");
        }
    }

    #[test]
    fn spawn_burns_in_inside_polygon() {
        let g = square();
        let table = RestrictionTable::build(&g, Restriction::None);
        let rules = WalkRules {
            geometry: &g,
            table: &table,
            restriction: Restriction::None,
            jump_distance: 0.5,
        };
        let mut rng = Pcg32::seed_from_u64(9);
        let walker = Walker::spawn(&rules, 10, 300, &mut rng);
        assert_eq!(walker.history().len(), 10);
        let p = walker.current();
        assert!((p.x - 100.0).abs() + (p.y - 100.0).abs() <= 100.0 + 1e-9);
    }

    #[test]
    fn same_seed_same_walk() {
        let a = choices(&square(), Restriction::NoReturn, 1_000, 42);
        let b = choices(&square(), Restriction::NoReturn, 1_000, 42);
        assert_eq!(a, b);
    }
}
