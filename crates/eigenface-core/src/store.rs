//! Labelled feature storage and nearest-neighbour classification.

use crate::types::FaceSample;
use serde::Serialize;
use std::sync::Arc;

/// Label under which samples without a classification are filed.
pub const UNLABELED: &str = "unlabeled";

/// Representative points drawn per label for the 3-D chart.
const CHART_POINTS_PER_LABEL: usize = 18;
/// Upper bound of each normalized chart axis.
const CHART_AXIS_MAX: f64 = 100.0;

/// Dense label identifier, assigned in first-seen order.
pub type LabelId = usize;

/// Distance between two coefficient vectors.
///
/// Implementations must satisfy `distance(a, b) >= 0` and `distance(a, a) == 0`.
pub trait DistanceMetric {
    fn distance(&self, a: &[f64], b: &[f64]) -> f64;
}

impl<F> DistanceMetric for F
where
    F: Fn(&[f64], &[f64]) -> f64,
{
    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        self(a, b)
    }
}

/// Euclidean distance over the first `min(a.len(), b.len())` coefficients.
///
/// Vectors from different retraining epochs may differ in length.
pub fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Default metric: [`euclidean_distance`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Euclidean;

impl DistanceMetric for Euclidean {
    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        euclidean_distance(a, b)
    }
}

/// Sum of absolute differences over the shared prefix.
#[derive(Debug, Clone, Copy, Default)]
pub struct Manhattan;

impl DistanceMetric for Manhattan {
    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum()
    }
}

/// Bijection between label ids and label strings. Never shrinks.
#[derive(Debug, Clone, Default)]
pub struct LabelDictionary {
    labels: Vec<String>,
}

impl LabelDictionary {
    /// Id for `label`, registering it if unseen.
    pub fn resolve_or_insert(&mut self, label: &str) -> LabelId {
        match self.id_of(label) {
            Some(id) => id,
            None => {
                self.labels.push(label.to_string());
                self.labels.len() - 1
            }
        }
    }

    pub fn id_of(&self, label: &str) -> Option<LabelId> {
        self.labels.iter().position(|l| l == label)
    }

    pub fn label(&self, id: LabelId) -> Option<&str> {
        self.labels.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (LabelId, &str)> {
        self.labels.iter().map(String::as_str).enumerate()
    }
}

/// A gallery entry: coefficients, label and the sample they came from.
#[derive(Debug, Clone)]
pub struct FeatureVector {
    pub coefficients: Vec<f64>,
    pub label: LabelId,
    pub sample: Arc<FaceSample>,
}

/// One entry of a distance ranking.
#[derive(Debug, Clone)]
pub struct RankedMatch<'a> {
    /// Position of the record in insertion order.
    pub index: usize,
    pub label: &'a str,
    pub distance: f64,
    pub record: &'a FeatureVector,
}

/// Vote tallies of a k-NN query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KnnTally {
    /// Label of the single closest record.
    pub nearest: String,
    /// Label with the most votes; ties go to the label that reached the
    /// winning count first.
    pub majority: String,
    /// `(label, votes)` in order of first appearance among the neighbours.
    pub votes: Vec<(String, usize)>,
    /// Number of neighbours actually consulted.
    pub neighbours: usize,
}

impl KnnTally {
    /// Tally the first `k` entries of a [`FeatureStore::distance_order`] ranking.
    ///
    /// `None` when the ranking is empty or `k == 0`.
    pub fn from_ranking(ranked: &[RankedMatch<'_>], k: usize) -> Option<Self> {
        let k = k.min(ranked.len());
        if k == 0 {
            return None;
        }

        let mut votes: Vec<(String, usize)> = Vec::new();
        let mut majority: Option<(usize, usize)> = None;
        for m in &ranked[..k] {
            let slot = match votes.iter().position(|(l, _)| l == m.label) {
                Some(slot) => slot,
                None => {
                    votes.push((m.label.to_string(), 0));
                    votes.len() - 1
                }
            };
            votes[slot].1 += 1;
            if majority.map_or(true, |(_, count)| votes[slot].1 > count) {
                majority = Some((slot, votes[slot].1));
            }
        }

        let majority = majority.map(|(slot, _)| votes[slot].0.clone())?;
        Some(Self {
            nearest: ranked[0].label.to_string(),
            majority,
            votes,
            neighbours: k,
        })
    }
}

/// A point of the normalized 3-D feature chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    /// `None` marks the probe.
    pub label: Option<String>,
    pub position: [f64; 3],
}

/// Ordered gallery of labelled feature vectors.
#[derive(Debug, Clone, Default)]
pub struct FeatureStore {
    records: Vec<FeatureVector>,
    labels: LabelDictionary,
}

impl FeatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample's coefficients under its label.
    pub fn insert(&mut self, sample: Arc<FaceSample>, coefficients: Vec<f64>) -> LabelId {
        let label = self
            .labels
            .resolve_or_insert(sample.label.as_deref().unwrap_or(UNLABELED));
        self.records.push(FeatureVector {
            coefficients,
            label,
            sample,
        });
        label
    }

    /// Drop every record; label ids stay reserved.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// `true` while untrained.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[FeatureVector] {
        &self.records
    }

    pub fn labels(&self) -> &LabelDictionary {
        &self.labels
    }

    fn label_of(&self, record: &FeatureVector) -> &str {
        self.labels.label(record.label).unwrap_or(UNLABELED)
    }

    /// Every record with its distance to `probe`, closest first.
    ///
    /// Equal distances keep insertion order.
    pub fn distance_order(&self, probe: &[f64], metric: &dyn DistanceMetric) -> Vec<RankedMatch<'_>> {
        let mut ranked: Vec<RankedMatch<'_>> = self
            .records
            .iter()
            .enumerate()
            .map(|(index, record)| RankedMatch {
                index,
                label: self.label_of(record),
                distance: metric.distance(probe, &record.coefficients),
                record,
            })
            .collect();
        ranked.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        ranked
    }

    /// Label of the closest record, or `None` when the store is empty.
    pub fn nearest_label(&self, probe: &[f64], metric: &dyn DistanceMetric) -> Option<&str> {
        self.distance_order(probe, metric).first().map(|m| m.label)
    }

    /// Majority label among the `k` closest records.
    ///
    /// `None` when the store is empty or `k == 0`.
    pub fn knn(&self, probe: &[f64], metric: &dyn DistanceMetric, k: usize) -> Option<&str> {
        let ranked = self.distance_order(probe, metric);
        let k = k.min(ranked.len());
        if k == 0 {
            return None;
        }

        let mut counts = vec![0usize; self.labels.len()];
        let mut best: Option<(LabelId, usize)> = None;
        for m in &ranked[..k] {
            let id = m.record.label;
            counts[id] += 1;
            if best.map_or(true, |(_, votes)| counts[id] > votes) {
                best = Some((id, counts[id]));
            }
        }
        best.and_then(|(id, _)| self.labels.label(id))
    }

    /// Vote tallies of the `k` closest records alongside the nearest label.
    pub fn knn_tally(&self, probe: &[f64], metric: &dyn DistanceMetric, k: usize) -> Option<KnnTally> {
        KnnTally::from_ranking(&self.distance_order(probe, metric), k)
    }

    /// First three coefficients of representative records per label, plus
    /// the optional probe, each axis min-max normalized into `[0, 100]`.
    ///
    /// Labels with fewer than 18 records repeat them cyclically. Missing
    /// coefficients read as zero; a flat axis maps to zero.
    pub fn project_to_3d(&self, probe: Option<&[f64]>) -> Vec<ChartPoint> {
        let mut points = Vec::with_capacity(self.labels.len() * CHART_POINTS_PER_LABEL + 1);

        for (id, label) in self.labels.iter() {
            let members: Vec<&FeatureVector> = self.records.iter().filter(|r| r.label == id).collect();
            if members.is_empty() {
                continue;
            }
            for j in 0..CHART_POINTS_PER_LABEL {
                points.push(ChartPoint {
                    label: Some(label.to_string()),
                    position: first_three(&members[j % members.len()].coefficients),
                });
            }
        }

        if let Some(probe) = probe {
            points.push(ChartPoint {
                label: None,
                position: first_three(probe),
            });
        }

        for axis in 0..3 {
            let min = points.iter().map(|p| p.position[axis]).fold(f64::INFINITY, f64::min);
            let max = points.iter().map(|p| p.position[axis]).fold(f64::NEG_INFINITY, f64::max);
            let range = max - min;
            for point in &mut points {
                point.position[axis] = if range > 0.0 {
                    (point.position[axis] - min) / range * CHART_AXIS_MAX
                } else {
                    0.0
                };
            }
        }

        points
    }
}

fn first_three(coefficients: &[f64]) -> [f64; 3] {
    let mut out = [0.0; 3];
    for (dst, src) in out.iter_mut().zip(coefficients) {
        *dst = *src;
    }
    out
}
