//! Point-region quadtree with a separate build stage.
//!
//! Points are inserted into a [`QuadtreeBuilder`]; [`QuadtreeBuilder::finish`]
//! freezes the nodes into a query-only [`Quadtree`]. A leaf splits into four
//! quadrants once it holds more than [`NODE_CAPACITY`] points, unless it is
//! already at [`MAX_DEPTH`].

use std::mem;

use geo::{Coord, Rect};
use geoindex_core::BuildError;

/// Points a leaf holds before it splits.
pub const NODE_CAPACITY: usize = 16;

/// Deepest level a node may reach; leaves at this depth grow without
/// splitting.
pub const MAX_DEPTH: u8 = 24;

/// Point stored in the tree with its position in the geometry file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Entry {
    /// Position in the loaded geometry collection.
    pub position: usize,
    /// Planar location.
    pub location: Coord<f64>,
}

#[derive(Debug)]
enum Kind {
    Leaf(Vec<Entry>),
    /// Child node ids in south-west, south-east, north-west, north-east
    /// order.
    Branch([usize; 4]),
}

#[derive(Debug)]
struct Node {
    bounds: Rect<f64>,
    depth: u8,
    kind: Kind,
}

impl Node {
    const fn leaf(bounds: Rect<f64>, depth: u8) -> Self {
        Self {
            bounds,
            depth,
            kind: Kind::Leaf(Vec::new()),
        }
    }
}

fn contains(rect: &Rect<f64>, point: Coord<f64>) -> bool {
    let (min, max) = (rect.min(), rect.max());
    (min.x..=max.x).contains(&point.x) && (min.y..=max.y).contains(&point.y)
}

fn intersects(a: &Rect<f64>, b: &Rect<f64>) -> bool {
    a.min().x <= b.max().x
        && b.min().x <= a.max().x
        && a.min().y <= b.max().y
        && b.min().y <= a.max().y
}

fn quadrant(bounds: &Rect<f64>, point: Coord<f64>) -> usize {
    let centre = bounds.center();
    usize::from(point.x >= centre.x) | (usize::from(point.y >= centre.y) << 1)
}

fn quadrant_bounds(bounds: &Rect<f64>) -> [Rect<f64>; 4] {
    let (min, max, mid) = (bounds.min(), bounds.max(), bounds.center());
    [
        Rect::new(min, mid),
        Rect::new(Coord { x: mid.x, y: min.y }, Coord { x: max.x, y: mid.y }),
        Rect::new(Coord { x: min.x, y: mid.y }, Coord { x: mid.x, y: max.y }),
        Rect::new(mid, max),
    ]
}

/// Mutable quadtree under construction. It cannot be queried.
#[derive(Debug)]
pub struct QuadtreeBuilder {
    nodes: Vec<Node>,
    len: usize,
}

impl QuadtreeBuilder {
    /// Start a tree covering `bounds`, boundary included.
    #[must_use]
    pub fn new(bounds: Rect<f64>) -> Self {
        Self {
            nodes: vec![Node::leaf(bounds, 0)],
            len: 0,
        }
    }

    /// Insert the point at `position`.
    ///
    /// # Errors
    /// Returns [`BuildError::InvalidGeometry`] when the point is not finite
    /// or lies outside the tree bounds.
    pub fn insert(&mut self, position: usize, location: Coord<f64>) -> Result<(), BuildError> {
        if !(location.x.is_finite() && location.y.is_finite()) {
            return Err(BuildError::InvalidGeometry {
                position,
                reason: format!("coordinate ({}, {}) is not finite", location.x, location.y),
            });
        }
        let mut id = 0;
        loop {
            let node = self.nodes.get_mut(id).ok_or_else(|| corrupt(position))?;
            if node.depth == 0 && !contains(&node.bounds, location) {
                return Err(BuildError::InvalidGeometry {
                    position,
                    reason: format!(
                        "coordinate ({}, {}) lies outside the quadtree bounds",
                        location.x, location.y
                    ),
                });
            }
            match &mut node.kind {
                Kind::Branch(children) => {
                    id = children
                        .get(quadrant(&node.bounds, location))
                        .copied()
                        .ok_or_else(|| corrupt(position))?;
                }
                Kind::Leaf(entries) => {
                    entries.push(Entry { position, location });
                    let overflowing = entries.len() > NODE_CAPACITY && node.depth < MAX_DEPTH;
                    self.len += 1;
                    if overflowing {
                        self.split(id);
                    }
                    return Ok(());
                }
            }
        }
    }

    /// Split the leaf `id` and any child that still overflows.
    fn split(&mut self, id: usize) {
        let mut pending = vec![id];
        while let Some(id) = pending.pop() {
            let first_child = self.nodes.len();
            let Some(node) = self.nodes.get_mut(id) else {
                continue;
            };
            let Kind::Leaf(entries) = &mut node.kind else {
                continue;
            };
            let entries = mem::take(entries);
            let (bounds, depth) = (node.bounds, node.depth);
            node.kind = Kind::Branch([first_child, first_child + 1, first_child + 2, first_child + 3]);

            let mut children = quadrant_bounds(&bounds).map(|quad| Node::leaf(quad, depth + 1));
            for entry in entries {
                if let Some(Node {
                    kind: Kind::Leaf(bucket),
                    ..
                }) = children.get_mut(quadrant(&bounds, entry.location))
                {
                    bucket.push(entry);
                }
            }
            for (offset, child) in children.iter().enumerate() {
                if let Kind::Leaf(bucket) = &child.kind
                    && bucket.len() > NODE_CAPACITY
                    && child.depth < MAX_DEPTH
                {
                    pending.push(first_child + offset);
                }
            }
            self.nodes.extend(children);
        }
    }

    /// Finalise the tree. Only the finished tree answers queries.
    #[must_use]
    pub fn finish(mut self) -> Quadtree {
        for node in &mut self.nodes {
            if let Kind::Leaf(entries) = &mut node.kind {
                entries.shrink_to_fit();
            }
        }
        self.nodes.shrink_to_fit();
        Quadtree {
            nodes: self.nodes,
            len: self.len,
        }
    }
}

fn corrupt(position: usize) -> BuildError {
    BuildError::InvalidGeometry {
        position,
        reason: "quadtree node table is inconsistent".to_owned(),
    }
}

/// Finalised, read-only quadtree.
#[derive(Debug)]
pub struct Quadtree {
    nodes: Vec<Node>,
    len: usize,
}

impl Quadtree {
    /// Number of stored points.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the tree holds no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of nodes, leaves and branches.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Depth of the deepest node.
    #[must_use]
    pub fn depth(&self) -> u8 {
        self.nodes.iter().map(|node| node.depth).max().unwrap_or(0)
    }

    /// Bytes held by the tree's node table and leaf buckets.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        let buckets: usize = self
            .nodes
            .iter()
            .map(|node| match &node.kind {
                Kind::Leaf(entries) => entries.capacity() * size_of::<Entry>(),
                Kind::Branch(_) => 0,
            })
            .sum();
        size_of::<Self>() + self.nodes.capacity() * size_of::<Node>() + buckets
    }

    /// Visit every entry inside `rect`, boundary included.
    pub fn for_each_in(&self, rect: &Rect<f64>, mut visit: impl FnMut(&Entry)) {
        let mut stack = vec![0];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            if !intersects(&node.bounds, rect) {
                continue;
            }
            match &node.kind {
                Kind::Branch(children) => stack.extend_from_slice(children),
                Kind::Leaf(entries) => entries
                    .iter()
                    .filter(|entry| contains(rect, entry.location))
                    .for_each(&mut visit),
            }
        }
    }

    /// Count entries inside `rect`, boundary included.
    #[must_use]
    pub fn count_in(&self, rect: &Rect<f64>) -> usize {
        let mut count = 0;
        self.for_each_in(rect, |_| count += 1);
        count
    }
}
