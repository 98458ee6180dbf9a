//! Quadtree spatial index over a fixed boundary.
//!
//! The index is rebuilt from scratch every detection cycle, so it favours
//! cheap insertion and `clear` over removal. Points carry an arbitrary
//! payload (usually a [`crate::detection::Detection`]).
//!
//! Containment is half-open on every node: `[min, max)` on both axes. A point
//! lying on the shared edge of two sibling quadrants therefore lands in
//! exactly one of them, and a point on the root's `max` edge is rejected.

use pilot_geometry::{Aabb, Point2};
use tracing::trace;

use crate::error::NavigationError;

/// A point stored in the index together with its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedPoint<T> {
    /// World position.
    pub position: Point2,
    /// Opaque payload, never inspected by the index.
    pub payload: T,
}

impl<T> IndexedPoint<T> {
    /// Creates a new indexed point.
    pub fn new(position: Point2, payload: T) -> Self {
        Self { position, payload }
    }
}

/// Structure statistics, mainly for tests and debug logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexStats {
    /// Total points stored.
    pub points: usize,
    /// Deepest node depth reached (root is depth 0).
    pub depth: usize,
    /// Number of leaf nodes.
    pub leaves: usize,
    /// Number of subdivided nodes.
    pub internal: usize,
}

#[derive(Debug)]
struct QuadNode<T> {
    bounds: Aabb,
    points: Vec<IndexedPoint<T>>,
    /// NW, NE, SW, SE. `None` while this node is a leaf.
    children: Option<Box<[QuadNode<T>; 4]>>,
    depth: usize,
}

impl<T> QuadNode<T> {
    fn new(bounds: Aabb, depth: usize) -> Self {
        Self {
            bounds,
            points: Vec::new(),
            children: None,
            depth,
        }
    }

    /// Inserts a point already known to lie inside `self.bounds`.
    fn insert(&mut self, point: IndexedPoint<T>, capacity: usize, max_depth: usize) {
        let index = self.child_index(point.position);
        if let Some(children) = &mut self.children {
            children[index].insert(point, capacity, max_depth);
            return;
        }

        self.points.push(point);
        // Past the depth cap the leaf just keeps growing.
        if self.points.len() > capacity && self.depth < max_depth {
            self.subdivide(capacity, max_depth);
        }
    }

    fn subdivide(&mut self, capacity: usize, max_depth: usize) {
        let Aabb { min, max } = self.bounds;
        let mid = self.bounds.center();
        let depth = self.depth + 1;

        self.children = Some(Box::new([
            QuadNode::new(Aabb::from_corners(min, mid), depth),
            QuadNode::new(
                Aabb::from_corners(Point2::new(mid.x, min.y), Point2::new(max.x, mid.y)),
                depth,
            ),
            QuadNode::new(
                Aabb::from_corners(Point2::new(min.x, mid.y), Point2::new(mid.x, max.y)),
                depth,
            ),
            QuadNode::new(Aabb::from_corners(mid, max), depth),
        ]));

        let points = std::mem::take(&mut self.points);
        for point in points {
            let index = self.child_index(point.position);
            if let Some(children) = &mut self.children {
                children[index].insert(point, capacity, max_depth);
            }
        }
    }

    /// Quadrant for `p`. Points on the midlines go right/down, matching the
    /// half-open bounds of the children.
    fn child_index(&self, p: Point2) -> usize {
        let mid = self.bounds.center();
        let right = p.x >= mid.x;
        let down = p.y >= mid.y;
        match (down, right) {
            (false, false) => 0,
            (false, true) => 1,
            (true, false) => 2,
            (true, true) => 3,
        }
    }

    fn query_range<'a>(&'a self, range: &Aabb, found: &mut Vec<&'a IndexedPoint<T>>) {
        if !self.bounds.intersects(range) {
            return;
        }
        found.extend(self.points.iter().filter(|p| range.contains_half_open(p.position)));
        if let Some(children) = &self.children {
            for child in children.iter() {
                child.query_range(range, found);
            }
        }
    }

    fn query_circle<'a>(&'a self, center: Point2, radius: f64, found: &mut Vec<&'a IndexedPoint<T>>) {
        if !self.bounds.intersects_circle(center, radius) {
            return;
        }
        let radius_sq = radius * radius;
        found.extend(
            self.points
                .iter()
                .filter(|p| p.position.distance_squared(center) <= radius_sq),
        );
        if let Some(children) = &self.children {
            for child in children.iter() {
                child.query_circle(center, radius, found);
            }
        }
    }

    fn collect_stats(&self, stats: &mut IndexStats) {
        stats.points += self.points.len();
        stats.depth = stats.depth.max(self.depth);
        match &self.children {
            None => stats.leaves += 1,
            Some(children) => {
                stats.internal += 1;
                for child in children.iter() {
                    child.collect_stats(stats);
                }
            }
        }
    }
}

/// A bounded quadtree of points with attached payloads.
#[derive(Debug)]
pub struct SpatialIndex<T> {
    root: QuadNode<T>,
    capacity: usize,
    max_depth: usize,
    len: usize,
}

impl<T> SpatialIndex<T> {
    /// Creates an empty index covering `boundary`.
    ///
    /// # Arguments
    /// * `boundary` - Region covered by the root node; it never grows.
    /// * `capacity` - Points a leaf holds before it subdivides.
    /// * `max_depth` - Deepest level a node may subdivide to (root is 0).
    ///
    /// # Returns
    /// * `Result<Self, NavigationError>` - The index, or an error if `capacity` is zero.
    pub fn new(boundary: Aabb, capacity: usize, max_depth: usize) -> Result<Self, NavigationError> {
        if capacity == 0 {
            return Err(NavigationError::InvalidCapacity("node capacity must be at least 1"));
        }
        Ok(Self {
            root: QuadNode::new(boundary, 0),
            capacity,
            max_depth,
            len: 0,
        })
    }

    /// Region covered by the index.
    pub fn boundary(&self) -> Aabb {
        self.root.bounds
    }

    /// Inserts a point. Returns `false` and drops the point when it lies
    /// outside the root boundary; callers decide whether that matters.
    pub fn insert(&mut self, point: IndexedPoint<T>) -> bool {
        if !self.root.bounds.contains_half_open(point.position) {
            trace!(x = point.position.x, y = point.position.y, "point outside index boundary dropped");
            return false;
        }
        self.root.insert(point, self.capacity, self.max_depth);
        self.len += 1;
        true
    }

    /// All points inside `range` (half-open). Order is unspecified.
    pub fn query_range(&self, range: &Aabb) -> Vec<&IndexedPoint<T>> {
        let mut found = Vec::new();
        self.root.query_range(range, &mut found);
        found
    }

    /// All points within `radius` of `center` (inclusive). Order is unspecified.
    pub fn query_circle(&self, center: Point2, radius: f64) -> Vec<&IndexedPoint<T>> {
        let mut found = Vec::new();
        if radius < 0.0 || !radius.is_finite() {
            return found;
        }
        self.root.query_circle(center, radius, &mut found);
        found
    }

    /// Removes every point and collapses the tree back to a single leaf.
    pub fn clear(&mut self) {
        self.root = QuadNode::new(self.root.bounds, 0);
        self.len = 0;
    }

    /// Number of stored points.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when no points are stored.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Walks the tree and reports its shape.
    pub fn stats(&self) -> IndexStats {
        let mut stats = IndexStats::default();
        self.root.collect_stats(&mut stats);
        stats
    }
}
