//! Uniform box grid for the bucketed backend.
//!
//! Points are binned into square boxes slightly larger than the search
//! radius, so every neighbor of a point lies in its own box or one of the 8
//! surrounding boxes. For each box the index stores the indices of all points
//! in that 3x3 neighborhood as one contiguous, ascending run of a flat arena.
//!
//! The arena is built in two passes (count, then fill after a prefix sum),
//! so there is no per-box allocation.

use super::clustering::ClusterError;

/// CSR-style candidate lists keyed by box id.
#[derive(Debug, Clone)]
pub struct BoxIndex {
    box_size: f64,
    n_boxes_x: usize,
    n_boxes_y: usize,
    /// Box of each point.
    box_ids: Vec<u32>,
    /// Start of each box's candidate run in `candidates`, plus the final length.
    offsets: Vec<u32>,
    /// Candidate point indices grouped by box.
    candidates: Vec<u32>,
}

impl BoxIndex {
    /// Bins `x`/`y` into boxes of edge `box_size`.
    ///
    /// # Errors
    ///
    /// `GridTooLarge` when the grid would exceed `max_boxes` boxes (or the
    /// arena would not fit `u32` offsets); `BoxOutOfRange` if a point's box id
    /// falls outside the grid.
    pub fn build(x: &[f64], y: &[f64], box_size: f64, max_boxes: usize) -> Result<Self, ClusterError> {
        let n = x.len();
        debug_assert_eq!(n, y.len());
        if n == 0 {
            return Ok(Self {
                box_size,
                n_boxes_x: 1,
                n_boxes_y: 1,
                box_ids: Vec::new(),
                offsets: vec![0, 0],
                candidates: Vec::new(),
            });
        }

        let (x_min, x_max) = min_max(x);
        let (y_min, y_max) = min_max(y);

        let span_x = ((x_max - x_min) / box_size).floor();
        let span_y = ((y_max - y_min) / box_size).floor();
        // Checked in f64 first so huge spans never reach an integer cast.
        if !(span_x + 1.0).is_finite()
            || !(span_y + 1.0).is_finite()
            || (span_x + 1.0) * (span_y + 1.0) > max_boxes as f64
        {
            return Err(ClusterError::GridTooLarge {
                boxes_x: span_x + 1.0,
                boxes_y: span_y + 1.0,
                limit: max_boxes,
            });
        }
        let n_boxes_x = span_x as usize + 1;
        let n_boxes_y = span_y as usize + 1;
        let n_boxes = n_boxes_x * n_boxes_y;

        if n.saturating_mul(9) > u32::MAX as usize || n_boxes > u32::MAX as usize {
            return Err(ClusterError::GridTooLarge {
                boxes_x: n_boxes_x as f64,
                boxes_y: n_boxes_y as f64,
                limit: max_boxes,
            });
        }

        let mut box_ids = Vec::with_capacity(n);
        for i in 0..n {
            let bx = ((x[i] - x_min) / box_size).floor() as usize;
            let by = ((y[i] - y_min) / box_size).floor() as usize;
            let box_id = bx + by * n_boxes_x;
            if bx >= n_boxes_x || by >= n_boxes_y {
                return Err(ClusterError::BoxOutOfRange {
                    point: i,
                    box_id,
                    n_boxes,
                });
            }
            box_ids.push(box_id as u32);
        }

        let mut index = Self {
            box_size,
            n_boxes_x,
            n_boxes_y,
            box_ids,
            offsets: Vec::new(),
            candidates: Vec::new(),
        };

        // Pass 1: count candidates per box
        let mut counts = vec![0u32; n_boxes];
        for i in 0..n {
            index.for_each_adjacent_box(index.box_ids[i] as usize, |b| counts[b] += 1);
        }

        let mut offsets = Vec::with_capacity(n_boxes + 1);
        offsets.push(0u32);
        let mut sum = 0u32;
        for &count in &counts {
            sum += count;
            offsets.push(sum);
        }

        // Pass 2: scatter in ascending point order
        let mut candidates = vec![0u32; sum as usize];
        let mut cursors = offsets[..n_boxes].to_vec();
        for i in 0..n {
            index.for_each_adjacent_box(index.box_ids[i] as usize, |b| {
                candidates[cursors[b] as usize] = i as u32;
                cursors[b] += 1;
            });
        }

        index.offsets = offsets;
        index.candidates = candidates;

        log::debug!(
            "box index: {} points in {}x{} boxes of size {:.4}, {} candidate slots",
            n,
            n_boxes_x,
            n_boxes_y,
            box_size,
            index.candidates.len()
        );

        Ok(index)
    }

    /// Calls `f` with `box_id` and each in-grid box around it.
    ///
    /// Boxes past the first/last column or row are skipped, never wrapped.
    fn for_each_adjacent_box<F: FnMut(usize)>(&self, box_id: usize, mut f: F) {
        let bx = box_id % self.n_boxes_x;
        let by = box_id / self.n_boxes_x;
        let x_lo = bx.saturating_sub(1);
        let x_hi = (bx + 1).min(self.n_boxes_x - 1);
        let y_lo = by.saturating_sub(1);
        let y_hi = (by + 1).min(self.n_boxes_y - 1);
        for ny in y_lo..=y_hi {
            for nx in x_lo..=x_hi {
                f(nx + ny * self.n_boxes_x);
            }
        }
    }

    /// Candidate neighbors of point `i`, ascending, including `i` itself.
    #[inline]
    pub fn candidates(&self, i: usize) -> &[u32] {
        let b = self.box_ids[i] as usize;
        let start = self.offsets[b] as usize;
        let end = self.offsets[b + 1] as usize;
        &self.candidates[start..end]
    }

    /// Box containing point `i`.
    #[inline]
    pub fn box_of(&self, i: usize) -> usize {
        self.box_ids[i] as usize
    }

    /// Grid dimensions as (columns, rows).
    pub fn shape(&self) -> (usize, usize) {
        (self.n_boxes_x, self.n_boxes_y)
    }

    pub fn box_size(&self) -> f64 {
        self.box_size
    }

    pub fn n_boxes(&self) -> usize {
        self.n_boxes_x * self.n_boxes_y
    }
}

fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_point_single_box() {
        let index = BoxIndex::build(&[3.0], &[4.0], 1.0, 16).unwrap();
        assert_eq!(index.shape(), (1, 1));
        assert_eq!(index.candidates(0), &[0]);
    }

    #[test]
    fn test_empty_input() {
        let index = BoxIndex::build(&[], &[], 1.0, 16).unwrap();
        assert_eq!(index.n_boxes(), 1);
    }

    #[test]
    fn test_box_ids_row_major() {
        // 3 columns x 2 rows
        let x = [0.0, 1.5, 2.5, 0.5, 2.9];
        let y = [0.0, 0.2, 0.9, 1.1, 1.9];
        let index = BoxIndex::build(&x, &y, 1.0, 64).unwrap();
        assert_eq!(index.shape(), (3, 2));
        assert_eq!(index.box_of(0), 0);
        assert_eq!(index.box_of(1), 1);
        assert_eq!(index.box_of(2), 2);
        assert_eq!(index.box_of(3), 3);
        assert_eq!(index.box_of(4), 5);
    }

    #[test]
    fn test_edge_boxes_do_not_wrap() {
        // Points at the far left of row 1 and the far right of row 0 must not
        // see each other through a wrapped column.
        let x = [0.0, 4.5, 0.2];
        let y = [1.5, 0.5, 0.0];
        let index = BoxIndex::build(&x, &y, 1.0, 64).unwrap();
        assert_eq!(index.shape(), (5, 2));
        assert_eq!(index.box_of(0), 5);
        assert_eq!(index.box_of(1), 4);
        assert!(!index.candidates(0).contains(&1));
        assert!(!index.candidates(1).contains(&0));
        assert!(index.candidates(0).contains(&2));
    }

    #[test]
    fn test_candidates_sorted_and_cover_neighbors() {
        let x: Vec<f64> = (0..50).map(|i| (i % 7) as f64 * 0.4).collect();
        let y: Vec<f64> = (0..50).map(|i| (i / 7) as f64 * 0.4).collect();
        let radius = 0.5;
        let index = BoxIndex::build(&x, &y, radius * 1.05, 1 << 16).unwrap();
        for i in 0..x.len() {
            let cands = index.candidates(i);
            assert!(cands.windows(2).all(|w| w[0] < w[1]));
            for j in 0..x.len() {
                let d2 = (x[i] - x[j]).powi(2) + (y[i] - y[j]).powi(2);
                if d2 <= radius * radius {
                    assert!(cands.contains(&(j as u32)), "missing neighbor {} of {}", j, i);
                }
            }
        }
    }

    #[test]
    fn test_grid_too_large() {
        let err = BoxIndex::build(&[0.0, 1.0e9], &[0.0, 1.0e9], 1.0e-3, 1 << 20).unwrap_err();
        assert!(matches!(err, ClusterError::GridTooLarge { .. }));
    }
}
