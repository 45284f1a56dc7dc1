//! Static 3-D k-d tree over BGR colors, used for full-color palette lookup.
//!
//! Ported from a C++ `KDTreeBRG` that reserves node 0 as a null sentinel and
//! numbers real nodes `1..=N`, which is why node ids here are `u16` and the
//! tree is capped at 65,535 entries — the id space is the actual limit, not
//! an arbitrary choice, and halving node size this way roughly doubles how
//! much of the tree fits in cache during a query.

use crate::error::{Error, Result};
use crate::pixel::Color;

#[derive(Debug, Clone, Copy)]
struct KdNode {
    left: u16,
    right: u16,
    color: Color,
    /// Index of this color's first occurrence in the slice passed to `build`.
    first_index: u32,
}

#[derive(Debug, Clone, Copy)]
struct Rect {
    min: [u8; 3],
    max: [u8; 3],
}

impl Rect {
    fn infinite() -> Self {
        Rect {
            min: [0, 0, 0],
            max: [255, 255, 255],
        }
    }

    /// Squared distance from `target` to the nearest point in this box.
    fn lower_bound_sq(&self, target: Color) -> u32 {
        let channels = [target.r(), target.g(), target.b()];
        let mut sum = 0i32;
        for axis in 0..3 {
            let v = channels[axis];
            let clamped = v.clamp(self.min[axis], self.max[axis]);
            let diff = i32::from(v) - i32::from(clamped);
            sum += diff * diff;
        }
        sum as u32
    }
}

/// A k-d tree over up to 65,535 BGR colors, built once and queried read-only
/// afterward.
#[derive(Debug, Clone)]
pub struct KDTree3 {
    nodes: Vec<KdNode>,
    root: u16,
}

const MAX_COLORS: usize = 65_535;

impl KDTree3 {
    /// Build a tree from an insertion-ordered color list.
    ///
    /// Exact duplicates are rejected (no new node is allocated for them);
    /// the earliest occurrence of a color is what [`KDTree3::nearest`]
    /// reports as its insertion index.
    pub fn build(colors: &[Color]) -> Result<Self> {
        if colors.len() > MAX_COLORS {
            return Err(Error::InvalidArgument(format!(
                "k-d tree supports at most {MAX_COLORS} colors, got {}",
                colors.len()
            )));
        }

        // index 0 is the null sentinel; real nodes start at 1.
        let mut tree = KDTree3 {
            nodes: vec![KdNode {
                left: 0,
                right: 0,
                color: Color::from_rgb(0, 0, 0),
                first_index: 0,
            }],
            root: 0,
        };

        for (index, &color) in colors.iter().enumerate() {
            tree.insert(color, index as u32);
        }

        Ok(tree)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root == 0
    }

    fn insert(&mut self, color: Color, index: u32) {
        if self.root == 0 {
            self.nodes.push(KdNode {
                left: 0,
                right: 0,
                color,
                first_index: index,
            });
            self.root = (self.nodes.len() - 1) as u16;
            return;
        }

        let mut depth = 0usize;
        let mut cur = self.root;
        loop {
            let node = self.nodes[cur as usize];
            if node.color == color {
                // exact duplicate: reject, keep the earlier node as-is.
                return;
            }

            let axis = depth % 3;
            let go_right = match axis {
                0 => color.r() > node.color.r(),
                1 => color.g() > node.color.g(),
                _ => color.b() > node.color.b(),
            };

            let child = if go_right { node.right } else { node.left };
            if child == 0 {
                self.nodes.push(KdNode {
                    left: 0,
                    right: 0,
                    color,
                    first_index: index,
                });
                let new_id = (self.nodes.len() - 1) as u16;
                if go_right {
                    self.nodes[cur as usize].right = new_id;
                } else {
                    self.nodes[cur as usize].left = new_id;
                }
                return;
            }

            cur = child;
            depth += 1;
        }
    }

    /// Find the nearest color to `target`, returning its insertion index
    /// and the squared Euclidean distance.
    ///
    /// Ties (more than one palette entry at the same minimum distance) are
    /// broken by whichever the traversal visits first; which one that is
    /// depends on tree shape, not just input order.
    pub fn nearest(&self, target: Color) -> Result<(usize, u32)> {
        if self.root == 0 {
            return Err(Error::InvalidArgument("k-d tree is empty".to_string()));
        }

        let mut best_node = 0u16;
        let mut best_dist = u32::MAX;
        self.search(self.root, Rect::infinite(), 0, target, &mut best_node, &mut best_dist);

        if best_node == 0 {
            return Err(Error::inconsistent(
                "nearest-neighbor search visited a non-empty tree but found no candidate",
            ));
        }
        Ok((self.nodes[best_node as usize].first_index as usize, best_dist))
    }

    #[allow(clippy::too_many_arguments)]
    fn search(
        &self,
        node_id: u16,
        rect: Rect,
        depth: usize,
        target: Color,
        best_node: &mut u16,
        best_dist: &mut u32,
    ) {
        let node = self.nodes[node_id as usize];
        let dist = target.distance_sq(node.color);
        if dist < *best_dist {
            *best_dist = dist;
            *best_node = node_id;
        }

        if node.left == 0 && node.right == 0 {
            return;
        }

        let axis = depth % 3;
        let (split, target_val) = match axis {
            0 => (node.color.r(), target.r()),
            1 => (node.color.g(), target.g()),
            _ => (node.color.b(), target.b()),
        };

        let mut left_rect = rect;
        let mut right_rect = rect;
        left_rect.max[axis] = split;
        right_rect.min[axis] = split;

        let target_in_left = target_val < split;

        let (near_id, near_rect, far_id, far_rect) = if target_in_left {
            (node.left, left_rect, node.right, right_rect)
        } else {
            (node.right, right_rect, node.left, left_rect)
        };

        if near_id != 0 {
            self.search(near_id, near_rect, depth + 1, target, best_node, best_dist);
        }

        if far_id != 0 {
            let lower_bound = far_rect.lower_bound_sq(target);
            if lower_bound < *best_dist {
                self.search(far_id, far_rect, depth + 1, target, best_node, best_dist);
            }
        }
    }
}

/// Linear-scan nearest neighbor, used to cross-check [`KDTree3::nearest`] in
/// tests and as a fallback reference implementation.
#[must_use]
pub fn linear_nearest(colors: &[Color], target: Color) -> Option<(usize, u32)> {
    colors
        .iter()
        .enumerate()
        .map(|(i, &c)| (i, target.distance_sq(c)))
        .min_by_key(|&(_, d)| d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn empty_tree_is_an_error() {
        let tree = KDTree3::build(&[]).unwrap();
        assert!(tree.nearest(Color::from_rgb(0, 0, 0)).is_err());
    }

    #[test]
    fn single_node_is_the_answer() {
        let c = Color::from_rgb(1, 2, 3);
        let tree = KDTree3::build(&[c]).unwrap();
        let (idx, dist) = tree.nearest(Color::from_rgb(10, 10, 10)).unwrap();
        assert_eq!(idx, 0);
        assert_eq!(dist, c.distance_sq(Color::from_rgb(10, 10, 10)));
    }

    #[test]
    fn rejects_exact_duplicates() {
        let c = Color::from_rgb(5, 5, 5);
        let tree = KDTree3::build(&[c, c, c]).unwrap();
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn too_many_colors_is_rejected() {
        let colors: Vec<Color> = (0..=MAX_COLORS)
            .map(|i| Color::from_packed(i as u32))
            .collect();
        assert!(KDTree3::build(&colors).is_err());
    }

    #[test]
    fn matches_linear_scan_distance() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        for _ in 0..20 {
            let n = rng.gen_range(1..=3000);
            let mut colors = Vec::with_capacity(n);
            let mut seen = std::collections::HashSet::new();
            while colors.len() < n {
                let c = Color::from_rgb(rng.gen(), rng.gen(), rng.gen());
                if seen.insert(c) {
                    colors.push(c);
                }
            }

            let tree = KDTree3::build(&colors).unwrap();

            for _ in 0..25 {
                let q = Color::from_rgb(rng.gen(), rng.gen(), rng.gen());
                let (_, tree_dist) = tree.nearest(q).unwrap();
                let (_, linear_dist) = linear_nearest(&colors, q).unwrap();
                assert_eq!(tree_dist, linear_dist);
            }
        }
    }
}
