//! Joins reviews to their entries and tallies per-entry statistics.

use std::collections::HashMap;

use crate::criteria::round_two;
use crate::types::{DisplayReview, EntryProjection, EntryWithReviews, Review, ReviewTally};

#[derive(Debug, Clone, Copy, Default)]
pub struct ReviewAggregator;

impl ReviewAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Attach to each entry the reviews targeting it, keeping review order.
    ///
    /// Reviews whose target is not among `entries` are dropped.
    pub fn join(&self, entries: Vec<EntryProjection>, reviews: &[Review]) -> Vec<EntryWithReviews> {
        let mut by_target: HashMap<&str, Vec<DisplayReview>> = HashMap::new();
        for review in reviews {
            by_target
                .entry(review.target.id.as_str())
                .or_default()
                .push(review.to_display());
        }

        entries
            .into_iter()
            .map(|entry| {
                let reviews = by_target.get(entry.id.as_str()).cloned().unwrap_or_default();
                EntryWithReviews {
                    id: entry.id,
                    version: entry.version,
                    review_statistics: entry.review_statistics,
                    reviews,
                }
            })
            .collect()
    }

    /// Count and two-decimal average score of the given reviews.
    ///
    /// The average covers reviews that carry a score; it is `0.0` when none do.
    pub fn tally(&self, reviews: &[DisplayReview]) -> ReviewTally {
        let scores: Vec<f64> = reviews.iter().filter_map(|r| r.score).map(f64::from).collect();
        let average_score = if scores.is_empty() {
            0.0
        } else {
            round_two(scores.iter().sum::<f64>() / scores.len() as f64)
        };
        ReviewTally {
            total_review_count: reviews.len() as u64,
            average_score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ReviewStatistics, ReviewTarget};

    fn projection(id: &str) -> EntryProjection {
        EntryProjection {
            id: id.into(),
            version: 1,
            review_statistics: ReviewStatistics::default(),
        }
    }

    fn review(id: &str, target: &str, rating: Option<i32>) -> Review {
        Review {
            id: id.into(),
            title: Some(id.to_uppercase()),
            text: Some(format!("text of {id}")),
            rating,
            target: ReviewTarget {
                type_id: "product".into(),
                id: target.into(),
            },
        }
    }

    fn display(score: Option<i32>) -> DisplayReview {
        DisplayReview {
            title: None,
            review: None,
            score,
        }
    }

    #[test]
    fn test_join_groups_by_target() {
        let agg = ReviewAggregator::new();
        let joined = agg.join(
            vec![projection("a"), projection("b"), projection("c")],
            &[
                review("r1", "a", Some(5)),
                review("r2", "b", Some(3)),
                review("r3", "a", Some(4)),
                review("r4", "zzz", Some(1)),
            ],
        );
        assert_eq!(joined.len(), 3);
        assert_eq!(joined[0].reviews.len(), 2);
        assert_eq!(joined[0].reviews[0].title.as_deref(), Some("R1"));
        assert_eq!(joined[0].reviews[1].title.as_deref(), Some("R3"));
        assert_eq!(joined[1].reviews.len(), 1);
        assert!(joined[2].reviews.is_empty());
    }

    #[test]
    fn test_tally_rounds_average() {
        let agg = ReviewAggregator::new();
        let tally = agg.tally(&[display(Some(5)), display(Some(4)), display(Some(4))]);
        assert_eq!(tally.total_review_count, 3);
        assert_eq!(tally.average_score, 4.33);
    }

    #[test]
    fn test_tally_ignores_missing_scores_in_average() {
        let agg = ReviewAggregator::new();
        let tally = agg.tally(&[display(Some(2)), display(None)]);
        assert_eq!(tally.total_review_count, 2);
        assert_eq!(tally.average_score, 2.0);
    }

    #[test]
    fn test_tally_empty() {
        let tally = ReviewAggregator::new().tally(&[]);
        assert_eq!(tally.total_review_count, 0);
        assert_eq!(tally.average_score, 0.0);
    }
}
