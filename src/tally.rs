use crate::types::{District, GeoPoint};
use geo::algorithm::bounding_rect::BoundingRect;
use geo::algorithm::contains::Contains;
use rstar::{RTree, RTreeObject, AABB};
use std::collections::BTreeMap;

// Wrapper for RTree indexing
struct AreaIndex {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for AreaIndex {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// Bounding-box index over the district polygons. Only narrows the
/// candidates; containment is always decided by the polygon itself.
pub struct DistrictIndex<'a> {
    districts: &'a [District],
    tree: RTree<AreaIndex>,
}

impl<'a> DistrictIndex<'a> {
    pub fn new(districts: &'a [District]) -> Self {
        let tree_items: Vec<AreaIndex> = districts.iter().enumerate().filter_map(|(i, district)| {
            // Empty geometries have no extent and can never contain a point.
            let rect = district.geometry.bounding_rect()?;
            Some(AreaIndex {
                index: i,
                aabb: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
            })
        }).collect();

        DistrictIndex {
            districts,
            tree: RTree::bulk_load(tree_items),
        }
    }

    pub fn districts(&self) -> &'a [District] {
        self.districts
    }

    /// Every district whose polygon contains `point` (boundary excluded).
    /// Overlapping districts all match.
    pub fn containing<'s>(&'s self, point: &'s GeoPoint) -> impl Iterator<Item = &'a District> + 's {
        let districts = self.districts;
        let envelope = AABB::from_point([point.x(), point.y()]);
        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .map(move |candidate| &districts[candidate.index])
            .filter(move |district| district.geometry.contains(point))
    }
}

/// Per-district counters for one category of points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tally {
    counts: BTreeMap<String, usize>,
}

impl Tally {
    pub fn zeroed(districts: &[District]) -> Self {
        Tally {
            counts: districts.iter().map(|d| (d.name.clone(), 0)).collect(),
        }
    }

    fn add<'p>(&mut self, index: &DistrictIndex, points: impl IntoIterator<Item = &'p GeoPoint>) {
        for point in points {
            for district in index.containing(point) {
                if let Some(count) = self.counts.get_mut(&district.name) {
                    *count += 1;
                }
            }
        }
    }

    pub fn counts(&self) -> &BTreeMap<String, usize> {
        &self.counts
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.counts.get(name).copied()
    }

    /// Sum over all districts.
    pub fn within_boundary(&self) -> usize {
        self.counts.values().sum()
    }
}

/// Count `points` into fresh counters for every indexed district.
pub fn tally<'p>(index: &DistrictIndex, points: impl IntoIterator<Item = &'p GeoPoint>) -> Tally {
    let mut tally = Tally::zeroed(index.districts());
    tally.add(index, points);
    tally
}
