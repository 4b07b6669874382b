//! Dominant color extraction.
//!
//! Clusters the pixels of an image with k-means and reports the cluster
//! centers as hex colors together with the share of pixels each one covers.

use std::path::Path;

use image::{imageops::FilterType, DynamicImage, GenericImageView};
use itertools::Itertools;
use rand::{rngs::StdRng, seq::IndexedRandom, SeedableRng};
use serde::Serialize;

use crate::error::{Result, TaggerError};

/// Longest side the image is reduced to before clustering.
pub const SAMPLE_SIDE: u32 = 256;
pub const MAX_ITERATIONS: usize = 100;
const SEED: u64 = 0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DominantColor {
    /// `#rrggbb`
    pub color: String,
    /// Share of pixels in this cluster, in percent with two decimals.
    pub percentage: f64,
}

/// Cluster centers and per-pixel assignments.
#[derive(Debug, Clone)]
pub struct KMeans {
    pub centroids: Vec<[f32; 3]>,
    pub assignments: Vec<usize>,
}

impl KMeans {
    /// Runs k-means on RGB points with a fixed seed.
    ///
    /// `k` is clamped to the number of points. An empty cluster is reseeded
    /// with the point farthest from its own centroid.
    pub fn fit(points: &[[f32; 3]], k: usize, max_iterations: usize) -> Self {
        if points.is_empty() || k == 0 {
            return Self {
                centroids: vec![],
                assignments: vec![],
            };
        }

        let k = k.min(points.len());
        let mut rng = StdRng::seed_from_u64(SEED);
        let mut centroids: Vec<[f32; 3]> =
            points.choose_multiple(&mut rng, k).copied().collect();
        let mut assignments = vec![usize::MAX; points.len()];
        let mut reseeded = false;

        for _ in 0..max_iterations {
            let mut changed = false;
            for (point, assignment) in points.iter().zip(assignments.iter_mut()) {
                let nearest = nearest_centroid(point, &centroids);
                if *assignment != nearest {
                    *assignment = nearest;
                    changed = true;
                }
            }
            if !changed && !reseeded {
                break;
            }
            reseeded = false;

            let mut sums = vec![[0.0f64; 3]; k];
            let mut counts = vec![0usize; k];
            for (point, &cluster) in points.iter().zip(&assignments) {
                for c in 0..3 {
                    sums[cluster][c] += point[c] as f64;
                }
                counts[cluster] += 1;
            }
            for (j, centroid) in centroids.iter_mut().enumerate() {
                if counts[j] > 0 {
                    for c in 0..3 {
                        centroid[c] = (sums[j][c] / counts[j] as f64) as f32;
                    }
                }
            }
            for j in (0..k).filter(|&j| counts[j] == 0) {
                let farthest = points
                    .iter()
                    .zip(&assignments)
                    .map(|(p, &a)| distance(p, &centroids[a]))
                    .position_max_by(|a, b| a.total_cmp(b));
                if let Some(i) = farthest {
                    if distance(&points[i], &centroids[assignments[i]]) > 0.0 {
                        centroids[j] = points[i];
                        assignments[i] = j;
                        reseeded = true;
                    }
                }
            }
        }

        Self {
            centroids,
            assignments,
        }
    }

    /// Number of points assigned to each centroid.
    pub fn counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.centroids.len()];
        for &a in &self.assignments {
            if let Some(count) = counts.get_mut(a) {
                *count += 1;
            }
        }
        counts
    }
}

fn distance(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    (0..3).map(|i| (a[i] - b[i]).powi(2)).sum()
}

fn nearest_centroid(point: &[f32; 3], centroids: &[[f32; 3]]) -> usize {
    centroids
        .iter()
        .map(|c| distance(point, c))
        .position_min_by(|a, b| a.total_cmp(b))
        .unwrap_or(0)
}

pub fn to_hex(color: [f32; 3]) -> String {
    let [r, g, b] = color.map(|c| c.round().clamp(0.0, 255.0) as u8);
    format!("#{:02x}{:02x}{:02x}", r, g, b)
}

/// The `count` most common colors of `image`, most common first.
pub fn dominant_colors(image: &DynamicImage, count: usize) -> Result<Vec<DominantColor>> {
    if count == 0 {
        return Err(TaggerError::Configuration(
            "color count must be at least 1".to_string(),
        ));
    }
    let (width, height) = image.dimensions();
    let sample = if width.max(height) > SAMPLE_SIDE {
        image.resize(SAMPLE_SIDE, SAMPLE_SIDE, FilterType::Triangle)
    } else {
        image.clone()
    };
    let points: Vec<[f32; 3]> = sample
        .to_rgb8()
        .pixels()
        .map(|p| p.0.map(|c| c as f32))
        .collect();

    let kmeans = KMeans::fit(&points, count, MAX_ITERATIONS);
    let total = points.len() as f64;
    let colors = kmeans
        .centroids
        .iter()
        .zip(kmeans.counts())
        .map(|(&centroid, n)| DominantColor {
            color: to_hex(centroid),
            percentage: (n as f64 / total * 10_000.0).round() / 100.0,
        })
        .sorted_by(|a, b| b.percentage.total_cmp(&a.percentage))
        .collect();
    Ok(colors)
}

/// Opens the image at `path` and extracts its dominant colors.
pub fn dominant_colors_from_path<P: AsRef<Path>>(
    path: P,
    count: usize,
) -> Result<Vec<DominantColor>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(TaggerError::NotFound(path.to_path_buf()));
    }
    let image = image::open(path)?;
    dominant_colors(&image, count)
}
