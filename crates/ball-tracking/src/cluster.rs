//! Proximity merging of same-color detections.

use std::collections::VecDeque;

use crate::observation::Point2;

pub const DEFAULT_MERGE_DISTANCE: f32 = 80.0;

/// A group of points that are transitively closer than the merge distance.
#[derive(Clone, Debug, PartialEq)]
pub struct Cluster {
    pub centroid: Point2,
    /// Indices into the input slice, ascending.
    pub members: Vec<usize>,
}

#[derive(Clone, Copy, Debug)]
pub struct ClusterMerger {
    threshold: f32,
}

impl Default for ClusterMerger {
    fn default() -> Self {
        Self::new(DEFAULT_MERGE_DISTANCE)
    }
}

impl ClusterMerger {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Connected components of the "distance < threshold" graph.
    ///
    /// Clusters are ordered by their lowest member index, so the result only
    /// depends on the point set and not on how linking was discovered.
    pub fn cluster(&self, points: &[Point2]) -> Vec<Cluster> {
        let mut assigned = vec![false; points.len()];
        let mut clusters = Vec::new();
        let mut queue = VecDeque::new();

        for seed in 0..points.len() {
            if assigned[seed] {
                continue;
            }
            assigned[seed] = true;
            queue.push_back(seed);
            let mut members = Vec::new();

            while let Some(current) = queue.pop_front() {
                members.push(current);
                for (other, point) in points.iter().enumerate() {
                    if !assigned[other] && points[current].distance(point) < self.threshold {
                        assigned[other] = true;
                        queue.push_back(other);
                    }
                }
            }

            members.sort_unstable();
            let n = members.len() as f32;
            let (sx, sy) = members
                .iter()
                .fold((0.0, 0.0), |(sx, sy), &i| (sx + points[i].x, sy + points[i].y));
            clusters.push(Cluster {
                centroid: Point2::new(sx / n, sy / n),
                members,
            });
        }
        clusters
    }

    /// Centroids only.
    pub fn merge(&self, points: &[Point2]) -> Vec<Point2> {
        self.cluster(points).into_iter().map(|c| c.centroid).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearby_points_merge_and_far_ones_stay() {
        let points = [
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(200.0, 200.0),
        ];
        let merged = ClusterMerger::default().merge(&points);
        assert_eq!(merged, vec![Point2::new(5.0, 0.0), Point2::new(200.0, 200.0)]);
    }

    #[test]
    fn threshold_is_strict() {
        let points = [Point2::new(0.0, 0.0), Point2::new(80.0, 0.0)];
        assert_eq!(ClusterMerger::default().merge(&points).len(), 2);
    }

    #[test]
    fn chains_merge_regardless_of_input_order() {
        // a-b and b-c are within range, a-c is not; listing c before b must not matter.
        let a = Point2::new(0.0, 0.0);
        let b = Point2::new(60.0, 0.0);
        let c = Point2::new(120.0, 0.0);
        let merger = ClusterMerger::default();

        let forward = merger.cluster(&[a, b, c]);
        let shuffled = merger.cluster(&[a, c, b]);
        assert_eq!(forward.len(), 1);
        assert_eq!(shuffled.len(), 1);
        assert_eq!(forward[0].centroid, Point2::new(60.0, 0.0));
        assert_eq!(shuffled[0].centroid, forward[0].centroid);
        assert_eq!(shuffled[0].members, vec![0, 1, 2]);
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(ClusterMerger::default().cluster(&[]).is_empty());
    }
}
