//! Laying out a set of source images into a single collage canvas.
//!
//! Two independent algorithms, chosen by the caller: a uniform grid that
//! picks the (cols, rows) pair closest to a target aspect ratio, and a
//! fixed-column waterfall that places each image into whichever column is
//! currently shortest.

use rand::Rng;

use crate::compose::TileSpec;
use crate::error::{Error, Result};

/// Width and height of one source image, as reported by the image
/// provider before any scaling.
#[derive(Debug, Clone, Copy)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

fn same_double(a: f64, b: f64) -> bool {
    (a - b).abs() < 0.01
}

/// Result of [`plan_grid`]: the chosen grid shape, per-cell size, overall
/// canvas size, and each input image's destination rectangle (indexed the
/// same as the input `dimensions` slice; trailing grid cells beyond
/// `dimensions.len()` are simply left unfilled).
#[derive(Debug, Clone)]
pub struct GridPlan {
    pub cols: u32,
    pub rows: u32,
    pub cell_width: u32,
    pub cell_height: u32,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub placements: Vec<TileSpec>,
}

/// Method 1: a uniform grid whose (cols, rows) is chosen to best match
/// `target_aspect`, scaled down so its larger dimension fits `long_edge`
/// (if given).
pub fn plan_grid(
    dimensions: &[ImageDimensions],
    target_aspect: f64,
    long_edge: Option<u32>,
) -> Result<GridPlan> {
    let n = dimensions.len();
    if n == 0 {
        return Err(Error::InvalidArgument(
            "grid collage needs at least one image".to_string(),
        ));
    }

    let min_width = dimensions.iter().map(|d| d.width).min().unwrap();
    let min_height = dimensions.iter().map(|d| d.height).min().unwrap();
    let min_long_edge = dimensions.iter().map(|d| d.width.max(d.height)).min().unwrap();

    if min_long_edge == 0 {
        return Err(Error::InvalidArgument(
            "collage images must have nonzero dimensions".to_string(),
        ));
    }

    let first_aspect = f64::from(dimensions[0].width) / f64::from(dimensions[0].height);
    let all_same_aspect = dimensions.iter().all(|d| {
        same_double(f64::from(d.width) / f64::from(d.height), first_aspect)
    });

    let (mut dx, mut dy) = if all_same_aspect {
        (min_width, min_height)
    } else {
        (min_long_edge, min_long_edge)
    };

    let mut cols = 1u32;
    let mut rows = 1u32;
    let mut best_distance = f64::MAX;

    for x in 1..=n {
        for y in 1..=n {
            let capacity = x * y;
            if capacity < n {
                continue;
            }
            let unused = capacity - n;
            if unused >= x || unused >= y {
                continue;
            }

            let test_aspect = (x as f64 * f64::from(dx)) / (y as f64 * f64::from(dy));
            let distance = (target_aspect - test_aspect).abs();
            if distance < best_distance {
                best_distance = distance;
                cols = x as u32;
                rows = y as u32;
            }
        }
    }

    let mut canvas_width = cols * dx;
    let mut canvas_height = rows * dy;

    if let Some(edge) = long_edge {
        if canvas_width > edge || canvas_height > edge {
            if all_same_aspect {
                if dy > dx {
                    let scale = (f64::from(edge) / f64::from(rows)) / f64::from(dy);
                    dx = (scale * f64::from(dx)).round() as u32;
                    dy = edge / rows;
                    canvas_height = edge;
                    canvas_width = cols * dx;
                } else {
                    let scale = (f64::from(edge) / f64::from(cols)) / f64::from(dx);
                    dy = (scale * f64::from(dy)).round() as u32;
                    dx = edge / cols;
                    canvas_width = edge;
                    canvas_height = rows * dy;
                }
            } else {
                let cell = if canvas_width > canvas_height {
                    edge / cols
                } else {
                    edge / rows
                };
                dx = cell;
                dy = cell;
                canvas_width = dx * cols;
                canvas_height = dy * rows;
            }
        }
    }

    let mut placements = Vec::with_capacity(n);
    for (i, _) in dimensions.iter().enumerate() {
        let col = (i as u32) % cols;
        let row = (i as u32) / cols;
        placements.push(TileSpec {
            offset_x: col * dx,
            offset_y: row * dy,
            width: dx,
            height: dy,
        });
    }

    Ok(GridPlan {
        cols,
        rows,
        cell_width: dx,
        cell_height: dy,
        canvas_width,
        canvas_height,
        placements,
    })
}

/// Result of [`plan_waterfall`]: each input image's destination rectangle,
/// indexed the same as the input slice, plus the overall canvas size.
#[derive(Debug, Clone)]
pub struct WaterfallPlan {
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub placements: Vec<TileSpec>,
}

/// Method 2: `cols` fixed-width columns; each image is placed at the top
/// of whichever column currently has the lowest bottom edge. Optionally
/// shuffles each column's internal order afterward and spreads any slack
/// evenly between that column's images so every column ends at the same
/// height (the "partial shuffle" used here is the original's `2n` random
/// swaps, not a uniform Fisher-Yates permutation — kept as-is rather than
/// silently substituted).
pub fn plan_waterfall(
    dimensions: &[ImageDimensions],
    cols: u32,
    target_width: u32,
    spacing: u32,
    randomize: bool,
    distribute_slack: bool,
    rng: &mut impl Rng,
) -> Result<WaterfallPlan> {
    let n = dimensions.len();
    if n == 0 {
        return Err(Error::InvalidArgument(
            "waterfall collage needs at least one image".to_string(),
        ));
    }
    if dimensions.iter().any(|d| d.width == 0 || d.height == 0) {
        return Err(Error::InvalidArgument(
            "collage images must have nonzero dimensions".to_string(),
        ));
    }

    let cols = cols.clamp(1, n as u32);
    if target_width < (cols - 1) * spacing {
        return Err(Error::InvalidArgument(
            "target width is too small for the requested columns and spacing".to_string(),
        ));
    }
    let image_width = (target_width - (cols - 1) * spacing) / cols;
    if image_width == 0 {
        return Err(Error::InvalidArgument(
            "target width is too small to fit any column".to_string(),
        ));
    }

    let mut sorted_indexes: Vec<usize> = (0..n).collect();
    sorted_indexes.sort_by(|&a, &b| {
        let aspect_a = f64::from(dimensions[a].width) / f64::from(dimensions[a].height);
        let aspect_b = f64::from(dimensions[b].width) / f64::from(dimensions[b].height);
        aspect_a.total_cmp(&aspect_b)
    });

    let image_height_of = |i: usize| -> u32 {
        (f64::from(image_width) / f64::from(dimensions[i].width) * f64::from(dimensions[i].height))
            .round() as u32
    };

    let mut bottoms = vec![0u32; cols as usize];
    let mut y_offsets = vec![0u32; n];
    let mut columns_to_use = vec![0usize; n];

    for &si in &sorted_indexes {
        let mut column_to_use = 0usize;
        let mut lowest_bottom = u32::MAX;
        for (c, &bottom) in bottoms.iter().enumerate() {
            if bottom < lowest_bottom {
                lowest_bottom = bottom;
                column_to_use = c;
            }
        }

        y_offsets[si] = bottoms[column_to_use];
        bottoms[column_to_use] += spacing + image_height_of(si);
        columns_to_use[si] = column_to_use;
    }

    let full_height = bottoms.iter().copied().max().unwrap_or(0).saturating_sub(spacing);

    if randomize {
        for c in 0..cols as usize {
            let mut column_members: Vec<usize> = sorted_indexes
                .iter()
                .copied()
                .filter(|&si| columns_to_use[si] == c)
                .collect();

            partial_shuffle(&mut column_members, rng);

            let space_count = column_members.len().saturating_sub(1);
            let heights_sum: u32 = column_members.iter().map(|&ri| image_height_of(ri)).sum();
            let extra_space =
                i64::from(full_height) - i64::from(space_count as u32 * spacing) - i64::from(heights_sum);

            let (extra_between, extra_last) = if distribute_slack && space_count > 0 {
                (extra_space / space_count as i64, extra_space % space_count as i64)
            } else {
                (0, 0)
            };

            let mut current_y: i64 = 0;
            for (i, &ri) in column_members.iter().enumerate() {
                y_offsets[ri] = current_y.max(0) as u32;
                let image_height = i64::from(image_height_of(ri));
                current_y += i64::from(spacing)
                    + image_height
                    + extra_between
                    + if space_count > 0 && i == space_count - 1 {
                        extra_last
                    } else {
                        0
                    };
            }
        }
    }

    let full_width = image_width * cols + (cols - 1) * spacing;

    let mut placements = Vec::with_capacity(n);
    for i in 0..n {
        let col = columns_to_use[i] as u32;
        placements.push(TileSpec {
            offset_x: col * (image_width + spacing),
            offset_y: y_offsets[i],
            width: image_width,
            height: image_height_of(i),
        });
    }

    Ok(WaterfallPlan {
        canvas_width: full_width,
        canvas_height: full_height,
        placements,
    })
}

/// The original tool's column-shuffle: `2 * n` swaps of uniformly random
/// pairs. This is deliberately *not* a Fisher-Yates shuffle and does not
/// produce a uniform permutation over small `n` — kept faithful to the
/// source rather than silently replaced with a textbook-uniform shuffle.
fn partial_shuffle<T>(elements: &mut [T], rng: &mut impl Rng) {
    if elements.len() <= 1 {
        return;
    }
    for _ in 0..(elements.len() * 2) {
        let a = rng.gen_range(0..elements.len());
        let b = rng.gen_range(0..elements.len());
        elements.swap(a, b);
    }
}
