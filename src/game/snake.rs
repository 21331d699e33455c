//! Snake body and per-segment turn propagation
//!
//! A snake does not turn as a whole. A turn is recorded as a turn-point at the
//! cell the head occupies, and every segment picks up the new heading when it
//! reaches that cell. The point is dropped once the tail has passed through it.
//!
//! The body is contiguous, so a point's cell stays occupied from the moment
//! the head records it until the tail leaves. The head can only come back to
//! that cell on the tick the tail vacates it, and the tail drops the point on
//! that same advance. Each point is therefore applied by the head exactly once.

use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

use super::grid::{Coordinate, Direction};

/// One body cell and the heading it is travelling along
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub at: Coordinate,
    pub heading: Direction,
}

/// A player's snake (authoritative)
#[derive(Debug, Clone)]
pub struct Snake {
    owner: Uuid,
    /// Head first
    body: VecDeque<Segment>,
    turn_points: HashMap<Coordinate, Direction>,
    pending_growth: u32,
    /// Fruit eaten
    score: u32,
}

impl Snake {
    /// Single-segment snake
    pub fn new(owner: Uuid, at: Coordinate, heading: Direction) -> Self {
        Self {
            owner,
            body: VecDeque::from([Segment { at, heading }]),
            turn_points: HashMap::new(),
            pending_growth: 0,
            score: 0,
        }
    }

    /// Build a snake from explicit segments, head first
    #[cfg(test)]
    pub(crate) fn from_segments(owner: Uuid, segments: impl IntoIterator<Item = Segment>) -> Self {
        let body: VecDeque<Segment> = segments.into_iter().collect();
        assert!(!body.is_empty(), "a snake needs at least one segment");
        Self {
            owner,
            body,
            turn_points: HashMap::new(),
            pending_growth: 0,
            score: 0,
        }
    }

    pub fn owner(&self) -> Uuid {
        self.owner
    }

    pub fn head(&self) -> Segment {
        self.body[0]
    }

    pub fn tail(&self) -> Segment {
        self.body[self.body.len() - 1]
    }

    pub fn heading(&self) -> Direction {
        self.head().heading
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.body.iter()
    }

    pub fn occupies(&self, c: Coordinate) -> bool {
        self.body.iter().any(|s| s.at == c)
    }

    /// Direction recorded at `c`, if a turn-point is still pending there
    pub fn pending_turn(&self, c: Coordinate) -> Option<Direction> {
        self.turn_points.get(&c).copied()
    }

    pub fn pending_turn_count(&self) -> usize {
        self.turn_points.len()
    }

    /// Record a heading change at the head's current cell.
    ///
    /// Returns false when the request is the current heading or its reverse.
    /// A second request before the head leaves the cell replaces the first.
    pub fn turn(&mut self, direction: Direction) -> bool {
        let head = self.head();
        if direction == head.heading || direction.is_opposite(head.heading) {
            return false;
        }
        self.turn_points.insert(head.at, direction);
        true
    }

    /// Count an eaten fruit and queue one segment of growth for the next advance
    pub fn grow(&mut self) {
        self.pending_growth += 1;
        self.score += 1;
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn is_growing(&self) -> bool {
        self.pending_growth > 0
    }

    fn next_heading(&self) -> Direction {
        let head = self.head();
        self.turn_points
            .get(&head.at)
            .copied()
            .unwrap_or(head.heading)
    }

    /// Where the head will land on the next advance, without moving
    pub fn next_head(&self) -> Coordinate {
        self.head().at.step(self.next_heading())
    }

    /// Cell the tail gives up on the next advance; None while growing
    pub fn vacating_tail(&self) -> Option<Coordinate> {
        if self.is_growing() {
            None
        } else {
            Some(self.tail().at)
        }
    }

    /// Move one cell. Returns the new head coordinate.
    pub fn advance(&mut self) -> Coordinate {
        let last = self.body.len() - 1;
        for (i, seg) in self.body.iter_mut().enumerate() {
            let Some(&direction) = self.turn_points.get(&seg.at) else {
                continue;
            };
            seg.heading = direction;
            if i == last {
                self.turn_points.remove(&seg.at);
            }
        }

        let head = self.body[0];
        let new_head = Segment {
            at: head.at.step(head.heading),
            heading: head.heading,
        };
        self.body.push_front(new_head);

        if self.pending_growth > 0 {
            self.pending_growth -= 1;
        } else {
            self.body.pop_back();
        }

        new_head.at
    }
}
