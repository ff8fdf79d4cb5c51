//! Position sequencer and gap detection
//!
//! Positions are sparse samples of a document's chunk order, so gap flags are
//! advisory: they tell the model that context between two chunks is missing,
//! not that anything is wrong.

use super::grouper::{ChunkCluster, DocumentGroup};
use std::cmp::Ordering;

/// First non-null position among the cluster's facets, in storage order
pub fn resolve_position(cluster: &ChunkCluster) -> Option<u32> {
    cluster.facets.iter().find_map(|f| f.position)
}

/// Positioned clusters first (ascending), unpositioned ones after
fn by_position(a: &ChunkCluster, b: &ChunkCluster) -> Ordering {
    match (a.position, b.position) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Whether consecutive resolved positions ever jump by more than one
pub fn has_gaps<I>(sorted_positions: I) -> bool
where
    I: IntoIterator<Item = u32>,
{
    let mut prev: Option<u32> = None;
    for pos in sorted_positions {
        if let Some(p) = prev {
            if pos.saturating_sub(p) > 1 {
                return true;
            }
        }
        prev = Some(pos);
    }
    false
}

/// Resolve positions, sort clusters and flag gaps for one group
pub fn sequence_group(group: &mut DocumentGroup) {
    for cluster in &mut group.clusters {
        cluster.position = resolve_position(cluster);
    }

    // Stable: ties and unpositioned clusters keep first-seen order
    group.clusters.sort_by(by_position);

    group.has_gaps = has_gaps(group.clusters.iter().filter_map(|c| c.position));
}

pub fn sequence_groups(groups: &mut [DocumentGroup]) {
    for group in groups.iter_mut() {
        sequence_group(group);
        if group.has_gaps {
            tracing::trace!(document = %group.group_key, "Non-consecutive chunks");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::grouper::Facet;
    use crate::evidence::record::ChunkSource;

    fn cluster(id: &str, facets: &[(ChunkSource, Option<u32>)]) -> ChunkCluster {
        ChunkCluster {
            chunk_id: id.to_string(),
            facets: facets
                .iter()
                .map(|(source, position)| Facet {
                    source: *source,
                    content: format!("{id} text"),
                    position: *position,
                })
                .collect(),
            position: None,
        }
    }

    fn group(clusters: Vec<ChunkCluster>) -> DocumentGroup {
        DocumentGroup {
            group_key: "doc".into(),
            display_name: "Doc".into(),
            clusters,
            has_gaps: false,
        }
    }

    fn order(group: &DocumentGroup) -> Vec<&str> {
        group.clusters.iter().map(|c| c.chunk_id.as_str()).collect()
    }

    #[test]
    fn test_position_from_first_non_null_facet() {
        let c = cluster("a", &[(ChunkSource::Probe, None), (ChunkSource::Search, Some(7))]);
        assert_eq!(resolve_position(&c), Some(7));

        let c = cluster("b", &[(ChunkSource::Probe, Some(2)), (ChunkSource::Search, Some(9))]);
        assert_eq!(resolve_position(&c), Some(2));
    }

    #[test]
    fn test_gap_detection() {
        assert!(has_gaps([1, 2, 5]));
        assert!(!has_gaps([1, 2, 3]));
        assert!(!has_gaps([4, 4, 5]));
        assert!(!has_gaps([8]));
        assert!(!has_gaps(std::iter::empty::<u32>()));
    }

    #[test]
    fn test_sort_and_unpositioned_last() {
        let mut g = group(vec![
            cluster("late", &[(ChunkSource::Search, Some(9))]),
            cluster("none1", &[(ChunkSource::Search, None)]),
            cluster("early", &[(ChunkSource::Search, Some(8))]),
            cluster("none2", &[(ChunkSource::Probe, None)]),
        ]);
        sequence_group(&mut g);
        assert_eq!(order(&g), vec!["early", "late", "none1", "none2"]);
        assert!(!g.has_gaps);
    }

    #[test]
    fn test_unpositioned_cluster_does_not_hide_or_cause_gaps() {
        let mut g = group(vec![
            cluster("a", &[(ChunkSource::Search, Some(1))]),
            cluster("b", &[(ChunkSource::Search, None)]),
            cluster("c", &[(ChunkSource::Search, Some(2))]),
        ]);
        sequence_group(&mut g);
        assert!(!g.has_gaps);

        let mut g = group(vec![
            cluster("a", &[(ChunkSource::Search, Some(1))]),
            cluster("b", &[(ChunkSource::Search, None)]),
            cluster("c", &[(ChunkSource::Search, Some(5))]),
        ]);
        sequence_group(&mut g);
        assert!(g.has_gaps);
    }
}
