use std::collections::BTreeMap;

use crate::models::{OverallAverage, RankEntry, RankScope, StudentId};

/// Standard competition ranking ("1, 2, 2, 4") by descending overall average.
///
/// Only students that actually have an average belong in `averages`; the
/// cohort size is the number of entries handed in.
pub fn rank_cohort(scope: RankScope, averages: &[OverallAverage]) -> BTreeMap<StudentId, RankEntry> {
    let mut ordered: Vec<&OverallAverage> = averages.iter().collect();
    ordered.sort_by(|a, b| {
        b.average
            .cmp(&a.average)
            .then_with(|| a.student_id.cmp(&b.student_id))
    });

    let cohort_size = ordered.len() as u32;
    let mut ranks = BTreeMap::new();
    let mut current_rank = 0u32;
    let mut previous = None;

    for (position, average) in ordered.into_iter().enumerate() {
        if previous != Some(average.average) {
            current_rank = position as u32 + 1;
            previous = Some(average.average);
        }
        ranks.insert(
            average.student_id,
            RankEntry {
                student_id: average.student_id,
                scope,
                rank: current_rank,
                cohort_size,
            },
        );
    }

    ranks
}

/// Ranks in display order: best first, ties by student id.
pub fn ordered_ranks(ranks: &BTreeMap<StudentId, RankEntry>) -> Vec<&RankEntry> {
    let mut entries: Vec<&RankEntry> = ranks.values().collect();
    entries.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.student_id.cmp(&b.student_id)));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn average(trimester_id: Uuid, value: Decimal) -> OverallAverage {
        OverallAverage {
            student_id: Uuid::new_v4(),
            trimester_id,
            average: value,
            total_coefficient: dec!(10),
        }
    }

    #[test]
    fn tied_students_share_rank_and_next_rank_skips() {
        let trimester = Uuid::new_v4();
        let scope = RankScope::Class(Uuid::new_v4());
        let cohort = vec![
            average(trimester, dec!(15.00)),
            average(trimester, dec!(14.00)),
            average(trimester, dec!(15.00)),
        ];

        let ranks = rank_cohort(scope, &cohort);

        assert_eq!(ranks[&cohort[0].student_id].rank, 1);
        assert_eq!(ranks[&cohort[2].student_id].rank, 1);
        assert_eq!(ranks[&cohort[1].student_id].rank, 3);
        assert!(ranks.values().all(|entry| entry.cohort_size == 3));
    }

    #[test]
    fn ranks_follow_competition_pattern() {
        let trimester = Uuid::new_v4();
        let scope = RankScope::Level(Uuid::new_v4());
        let cohort = vec![
            average(trimester, dec!(18.5)),
            average(trimester, dec!(12)),
            average(trimester, dec!(12.00)),
            average(trimester, dec!(9.75)),
            average(trimester, dec!(16)),
        ];

        let ranks = rank_cohort(scope, &cohort);
        let ordered: Vec<u32> = ordered_ranks(&ranks).iter().map(|entry| entry.rank).collect();

        assert_eq!(ordered, vec![1, 2, 3, 3, 5]);
        assert_eq!(ranks[&cohort[3].student_id].rank, 5);
        assert!(ranks.values().all(|entry| entry.scope == scope));
    }

    #[test]
    fn ranking_is_idempotent_and_order_free() {
        let trimester = Uuid::new_v4();
        let scope = RankScope::Class(Uuid::new_v4());
        let mut cohort = vec![
            average(trimester, dec!(11.11)),
            average(trimester, dec!(13.5)),
            average(trimester, dec!(13.5)),
            average(trimester, dec!(7)),
        ];

        let first = rank_cohort(scope, &cohort);
        let second = rank_cohort(scope, &cohort);
        cohort.reverse();
        let reversed = rank_cohort(scope, &cohort);

        assert_eq!(first, second);
        assert_eq!(first, reversed);
    }

    #[test]
    fn empty_cohort_has_no_ranks() {
        let ranks = rank_cohort(RankScope::Class(Uuid::new_v4()), &[]);
        assert!(ranks.is_empty());
    }
}
