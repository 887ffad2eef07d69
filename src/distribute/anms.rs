//! Adaptive non-maximum suppression.
//!
//! Every keypoint gets a suppression radius: the distance to the nearest
//! keypoint whose response exceeds its own by more than a small relative
//! margin. Keypoints are then ranked by radius (descending) and the top
//! `n` survive. The two entry points differ only in the data structure
//! answering the nearest-higher-response query: an incrementally filled
//! k-d tree fed in response order, or a static range tree over all
//! candidates probed with growing search squares.

use super::sort_by_response_desc;
use crate::keypoint::KeyPoint;

const ANMS_EPSILON: f32 = 0.1;

pub(crate) fn distribute_anms_kdtree(kpts: &mut Vec<KeyPoint>, n: usize) {
    sort_by_response_desc(kpts);

    let mut tree = KdTree::new();
    let mut inserted = 0usize;
    let mut ranked: Vec<(f32, usize)> = Vec::with_capacity(kpts.len());
    for i in 0..kpts.len() {
        let limit = kpts[i].response * (1.0 + ANMS_EPSILON);
        while inserted < i && kpts[inserted].response > limit {
            tree.insert(kpts[inserted].pt.x, kpts[inserted].pt.y);
            inserted += 1;
        }
        let radius = tree.nearest_sq(kpts[i].pt.x, kpts[i].pt.y).sqrt();
        ranked.push((radius, i));
    }

    keep_largest_radii(kpts, ranked, n);
}

pub(crate) fn distribute_anms_range_tree(kpts: &mut Vec<KeyPoint>, n: usize) {
    sort_by_response_desc(kpts);

    let tree = RangeTree::build(kpts);
    let ranked: Vec<(f32, usize)> = (0..kpts.len())
        .map(|i| (tree.suppression_radius(kpts, i), i))
        .collect();

    keep_largest_radii(kpts, ranked, n);
}

fn keep_largest_radii(kpts: &mut Vec<KeyPoint>, mut ranked: Vec<(f32, usize)>, n: usize) {
    ranked.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .expect("suppression radii are never NaN")
            .then(a.1.cmp(&b.1))
    });
    let kept: Vec<KeyPoint> = ranked.iter().take(n).map(|&(_, i)| kpts[i]).collect();
    *kpts = kept;
}

// --- incremental k-d tree ---------------------------------------------

struct KdNode {
    x: f32,
    y: f32,
    left: Option<usize>,
    right: Option<usize>,
}

struct KdTree {
    nodes: Vec<KdNode>,
}

impl KdTree {
    fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    fn insert(&mut self, x: f32, y: f32) {
        let new_idx = self.nodes.len();
        let node = KdNode {
            x,
            y,
            left: None,
            right: None,
        };
        if self.nodes.is_empty() {
            self.nodes.push(node);
            return;
        }
        let mut idx = 0;
        let mut depth = 0;
        loop {
            let go_left = if depth % 2 == 0 {
                x < self.nodes[idx].x
            } else {
                y < self.nodes[idx].y
            };
            let child = if go_left {
                &mut self.nodes[idx].left
            } else {
                &mut self.nodes[idx].right
            };
            match child {
                Some(next) => {
                    idx = *next;
                    depth += 1;
                }
                None => {
                    *child = Some(new_idx);
                    self.nodes.push(node);
                    return;
                }
            }
        }
    }

    /// Squared distance to the nearest stored point, or infinity when the
    /// tree is empty.
    fn nearest_sq(&self, x: f32, y: f32) -> f32 {
        if self.nodes.is_empty() {
            return f32::INFINITY;
        }
        let mut best = f32::INFINITY;
        self.nearest_rec(0, 0, x, y, &mut best);
        best
    }

    fn nearest_rec(&self, idx: usize, depth: usize, x: f32, y: f32, best: &mut f32) {
        let node = &self.nodes[idx];
        let dx = node.x - x;
        let dy = node.y - y;
        let dist_sq = dx * dx + dy * dy;
        if dist_sq < *best {
            *best = dist_sq;
        }
        let split = if depth % 2 == 0 { dx } else { dy };
        let (near, far) = if split > 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };
        if let Some(near) = near {
            self.nearest_rec(near, depth + 1, x, y, best);
        }
        if let Some(far) = far {
            if split * split < *best {
                self.nearest_rec(far, depth + 1, x, y, best);
            }
        }
    }
}

// --- static range tree ------------------------------------------------

const RT_LEAF: usize = 8;

struct RtNode {
    start: usize,
    end: usize,
    left: Option<usize>,
    right: Option<usize>,
    /// Points of the span sorted by y: `(y, index into by_x)`.
    ys: Vec<(f32, usize)>,
}

/// Balanced tree over the x-sorted candidates; every node keeps its span
/// additionally sorted by y, so an axis-aligned rectangle reports its
/// points through O(log n) sorted runs.
struct RangeTree {
    /// `(x, y, response, original index)` sorted by x.
    by_x: Vec<(f32, f32, f32, usize)>,
    nodes: Vec<RtNode>,
    root: Option<usize>,
    span: f32,
}

impl RangeTree {
    fn build(kpts: &[KeyPoint]) -> Self {
        let mut by_x: Vec<(f32, f32, f32, usize)> = kpts
            .iter()
            .enumerate()
            .map(|(i, k)| (k.pt.x, k.pt.y, k.response, i))
            .collect();
        by_x.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .expect("keypoint coordinates are never NaN")
                .then(a.3.cmp(&b.3))
        });

        let span = if by_x.is_empty() {
            0.0
        } else {
            let min_x = by_x.first().expect("non-empty candidate set").0;
            let max_x = by_x.last().expect("non-empty candidate set").0;
            let (min_y, max_y) = by_x
                .iter()
                .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), p| {
                    (lo.min(p.1), hi.max(p.1))
                });
            (max_x - min_x).max(max_y - min_y)
        };

        let mut tree = Self {
            by_x,
            nodes: Vec::new(),
            root: None,
            span,
        };
        if !tree.by_x.is_empty() {
            tree.root = Some(tree.build_node(0, tree.by_x.len()));
        }
        tree
    }

    fn build_node(&mut self, start: usize, end: usize) -> usize {
        let mut ys: Vec<(f32, usize)> = (start..end).map(|i| (self.by_x[i].1, i)).collect();
        ys.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .expect("keypoint coordinates are never NaN")
                .then(a.1.cmp(&b.1))
        });

        let idx = self.nodes.len();
        self.nodes.push(RtNode {
            start,
            end,
            left: None,
            right: None,
            ys,
        });
        if end - start > RT_LEAF {
            let mid = (start + end) / 2;
            let left = self.build_node(start, mid);
            let right = self.build_node(mid, end);
            self.nodes[idx].left = Some(left);
            self.nodes[idx].right = Some(right);
        }
        idx
    }

    /// Reports indices (into `by_x`) of points inside the closed rectangle.
    fn query(&self, rect: [f32; 4], out: &mut Vec<usize>) {
        if let Some(root) = self.root {
            self.query_rec(root, rect, out);
        }
    }

    fn query_rec(&self, idx: usize, rect: [f32; 4], out: &mut Vec<usize>) {
        let node = &self.nodes[idx];
        let [x0, x1, y0, y1] = rect;
        let span_x0 = self.by_x[node.start].0;
        let span_x1 = self.by_x[node.end - 1].0;
        if span_x0 > x1 || span_x1 < x0 {
            return;
        }
        if span_x0 >= x0 && span_x1 <= x1 {
            let lo = node.ys.partition_point(|p| p.0 < y0);
            for &(y, i) in &node.ys[lo..] {
                if y > y1 {
                    break;
                }
                out.push(i);
            }
            return;
        }
        match (node.left, node.right) {
            (Some(left), Some(right)) => {
                self.query_rec(left, rect, out);
                self.query_rec(right, rect, out);
            }
            _ => {
                for i in node.start..node.end {
                    let (x, y, _, _) = self.by_x[i];
                    if x >= x0 && x <= x1 && y >= y0 && y <= y1 {
                        out.push(i);
                    }
                }
            }
        }
    }

    /// Distance from `kpts[i]` to its nearest significantly-stronger
    /// candidate, found by growing search squares and one exact refinement
    /// pass.
    fn suppression_radius(&self, kpts: &[KeyPoint], i: usize) -> f32 {
        let p = &kpts[i];
        let limit = p.response * (1.0 + ANMS_EPSILON);
        let mut radius = 8.0f32;
        let mut hits = Vec::new();

        loop {
            hits.clear();
            self.query(
                [
                    p.pt.x - radius,
                    p.pt.x + radius,
                    p.pt.y - radius,
                    p.pt.y + radius,
                ],
                &mut hits,
            );
            if let Some(found) = self.min_dist_to_stronger(&hits, p.pt.x, p.pt.y, limit, i) {
                // A closer stronger point could still hide outside the
                // square; one exact pass at the found distance settles it.
                hits.clear();
                self.query(
                    [
                        p.pt.x - found,
                        p.pt.x + found,
                        p.pt.y - found,
                        p.pt.y + found,
                    ],
                    &mut hits,
                );
                return self
                    .min_dist_to_stronger(&hits, p.pt.x, p.pt.y, limit, i)
                    .unwrap_or(found);
            }
            if radius > self.span {
                return f32::INFINITY;
            }
            radius *= 2.0;
        }
    }

    fn min_dist_to_stronger(
        &self,
        hits: &[usize],
        x: f32,
        y: f32,
        limit: f32,
        skip: usize,
    ) -> Option<f32> {
        let mut best: Option<f32> = None;
        for &h in hits {
            let (hx, hy, resp, orig) = self.by_x[h];
            if orig == skip || resp <= limit {
                continue;
            }
            let dx = hx - x;
            let dy = hy - y;
            let dist = (dx * dx + dy * dy).sqrt();
            best = Some(best.map_or(dist, |b: f32| b.min(dist)));
        }
        best
    }
}
