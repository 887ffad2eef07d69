//! Quadtree subdivision strategies.
//!
//! Both variants refine a node set until there are at least `n` non-empty
//! leaves (or nothing is left to split) and then emit the strongest
//! keypoint of each leaf. `distribute_quadtree_orbslam` seeds the domain
//! with vertical strips and resolves splitting ties the way ORB-SLAM2
//! does (more keypoints, then larger area, then lower index);
//! `distribute_quadtree` runs the same refinement through a priority
//! queue keyed on population, starting from a single root.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::{sort_by_response_desc, Bounds};
use crate::keypoint::KeyPoint;
use crate::util::math::round_coord;

struct Node {
    x0: f32,
    y0: f32,
    x1: f32,
    y1: f32,
    kpts: Vec<KeyPoint>,
}

impl Node {
    fn area(&self) -> f32 {
        (self.x1 - self.x0) * (self.y1 - self.y0)
    }

    /// A node is worth splitting only if it holds several keypoints that a
    /// subdivision could still separate.
    fn splittable(&self) -> bool {
        self.kpts.len() > 1 && (self.x1 - self.x0 > 1.0 || self.y1 - self.y0 > 1.0)
    }

    /// Divides into four equal quadrants, dropping empty ones.
    fn split(self) -> Vec<Node> {
        let mx = self.x0 + (self.x1 - self.x0) / 2.0;
        let my = self.y0 + (self.y1 - self.y0) / 2.0;
        let mut children = [
            Node::empty(self.x0, self.y0, mx, my),
            Node::empty(mx, self.y0, self.x1, my),
            Node::empty(self.x0, my, mx, self.y1),
            Node::empty(mx, my, self.x1, self.y1),
        ];
        for kpt in self.kpts {
            let right = kpt.pt.x >= mx;
            let bottom = kpt.pt.y >= my;
            let idx = usize::from(right) + 2 * usize::from(bottom);
            children[idx].kpts.push(kpt);
        }
        children.into_iter().filter(|c| !c.kpts.is_empty()).collect()
    }

    fn empty(x0: f32, y0: f32, x1: f32, y1: f32) -> Node {
        Node {
            x0,
            y0,
            x1,
            y1,
            kpts: Vec::new(),
        }
    }

    /// Strongest keypoint; the earliest wins ties.
    fn best(&self) -> KeyPoint {
        let mut best = self.kpts[0];
        for kpt in &self.kpts[1..] {
            if kpt.response > best.response {
                best = *kpt;
            }
        }
        best
    }
}

/// Quadtree distribution with strip seeding and the ORB-SLAM2 tie-breaks.
pub(crate) fn distribute_quadtree_orbslam(kpts: &mut Vec<KeyPoint>, bounds: Bounds, n: usize) {
    let width = bounds.width() as f32;
    let height = bounds.height() as f32;
    let n_strips = round_coord(width / height).max(1) as usize;
    let strip_w = width / n_strips as f32;

    let mut nodes: Vec<Node> = (0..n_strips)
        .map(|i| {
            Node::empty(
                bounds.min_x as f32 + i as f32 * strip_w,
                bounds.min_y as f32,
                bounds.min_x as f32 + (i + 1) as f32 * strip_w,
                bounds.max_y as f32,
            )
        })
        .collect();
    for kpt in kpts.iter() {
        let idx = (((kpt.pt.x - bounds.min_x as f32) / strip_w).max(0.0) as usize)
            .min(n_strips - 1);
        nodes[idx].kpts.push(*kpt);
    }
    nodes.retain(|node| !node.kpts.is_empty());

    while nodes.len() < n {
        // Pick the node to subdivide: most keypoints, then larger area,
        // then lower index.
        let mut pick: Option<usize> = None;
        for (i, node) in nodes.iter().enumerate() {
            if !node.splittable() {
                continue;
            }
            match pick {
                None => pick = Some(i),
                Some(j) => {
                    let better = node.kpts.len() > nodes[j].kpts.len()
                        || (node.kpts.len() == nodes[j].kpts.len()
                            && node.area() > nodes[j].area());
                    if better {
                        pick = Some(i);
                    }
                }
            }
        }
        let Some(pick) = pick else {
            break;
        };
        let node = nodes.remove(pick);
        nodes.extend(node.split());
    }

    emit_leaves(kpts, nodes, n);
}

struct HeapNode {
    seq: usize,
    node: Node,
}

impl HeapNode {
    fn key(&self) -> (bool, usize, std::cmp::Reverse<usize>) {
        (
            self.node.splittable(),
            self.node.kpts.len(),
            std::cmp::Reverse(self.seq),
        )
    }
}

impl PartialEq for HeapNode {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for HeapNode {}

impl PartialOrd for HeapNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Priority-driven quadtree distribution from a single root node.
pub(crate) fn distribute_quadtree(kpts: &mut Vec<KeyPoint>, bounds: Bounds, n: usize) {
    let root = Node {
        x0: bounds.min_x as f32,
        y0: bounds.min_y as f32,
        x1: bounds.max_x as f32,
        y1: bounds.max_y as f32,
        kpts: std::mem::take(kpts),
    };
    let mut seq = 0usize;
    let mut heap = BinaryHeap::new();
    heap.push(HeapNode { seq, node: root });

    while heap.len() < n {
        let top = heap.peek().expect("heap holds the root");
        if !top.node.splittable() {
            break;
        }
        let node = heap.pop().expect("peeked entry").node;
        for child in node.split() {
            seq += 1;
            heap.push(HeapNode { seq, node: child });
        }
    }

    let nodes: Vec<Node> = heap.into_iter().map(|h| h.node).collect();
    emit_leaves(kpts, nodes, n);
}

fn emit_leaves(kpts: &mut Vec<KeyPoint>, nodes: Vec<Node>, n: usize) {
    let mut out: Vec<KeyPoint> = nodes.iter().map(Node::best).collect();
    if out.len() > n {
        // Subdivision can overshoot by up to three leaves per split.
        sort_by_response_desc(&mut out);
        out.truncate(n);
    }
    *kpts = out;
}
