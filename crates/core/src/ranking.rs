use crate::models::{QueryHit, SourceRanking};

pub fn group_by_source(hits: &[QueryHit]) -> Vec<SourceRanking> {
    let mut rankings: Vec<SourceRanking> = Vec::new();

    for hit in hits {
        let source = hit.source();
        match rankings.iter_mut().find(|entry| entry.source == source) {
            Some(entry) => {
                if hit.distance < entry.min_distance {
                    entry.min_distance = hit.distance;
                }
            }
            None => rankings.push(SourceRanking {
                source: source.to_string(),
                min_distance: hit.distance,
            }),
        }
    }

    rankings
}

pub fn rank_sources(hits: &[QueryHit], limit: usize) -> Vec<SourceRanking> {
    let mut rankings = group_by_source(hits);
    rankings.sort_by(|left, right| left.min_distance.total_cmp(&right.min_distance));
    rankings.truncate(limit);
    rankings
}
