// src/services/ordering.rs

use std::collections::HashSet;

use rand::{Rng, seq::SliceRandom};

use crate::models::quiz::{Difficulty, QuizQuestion};

const ROUND: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

/// Picks `limit` question indices balanced across difficulties.
///
/// Each difficulty bucket is shuffled on its own, then picks rotate
/// easy -> medium -> hard. When the bucket whose turn it is has run dry the
/// pick falls back to the first bucket (in that same order) that still has
/// questions.
pub fn balanced_order<R: Rng + ?Sized>(
    questions: &[QuizQuestion],
    limit: usize,
    rng: &mut R,
) -> Vec<i32> {
    let mut buckets: [Vec<i32>; 3] = Default::default();
    for (idx, q) in questions.iter().enumerate() {
        let slot = ROUND.iter().position(|d| *d == q.difficulty()).unwrap_or(0);
        buckets[slot].push(idx as i32);
    }
    for bucket in buckets.iter_mut() {
        bucket.shuffle(rng);
    }

    let limit = limit.min(questions.len());
    let mut order = Vec::with_capacity(limit);
    let mut turn = 0;
    while order.len() < limit {
        let slot = turn % ROUND.len();
        turn += 1;
        let pick = match buckets[slot].pop() {
            Some(idx) => Some(idx),
            None => buckets.iter_mut().find_map(|b| b.pop()),
        };
        match pick {
            Some(idx) => order.push(idx),
            None => break,
        }
    }
    order
}

/// Checks a client-proposed order: `expected_len` entries, each a distinct
/// valid index into a bank of `bank_size` questions.
pub fn validate_order(order: &[i32], bank_size: usize, expected_len: usize) -> Result<(), String> {
    if order.len() != expected_len {
        return Err(format!(
            "questionOrder must have {} entries, got {}",
            expected_len,
            order.len()
        ));
    }
    let mut seen = HashSet::with_capacity(order.len());
    for &idx in order {
        if idx < 0 || idx as usize >= bank_size {
            return Err(format!("questionOrder index {} is out of range", idx));
        }
        if !seen.insert(idx) {
            return Err(format!("questionOrder index {} is repeated", idx));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    fn bank(easy: usize, medium: usize, hard: usize) -> Vec<QuizQuestion> {
        let mut out = Vec::new();
        let mut push = |d: Difficulty, n: usize| {
            for i in 0..n {
                out.push(QuizQuestion {
                    text: format!("{:?} {}", d, i),
                    options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                    correct_index: 0,
                    difficulty: Some(d),
                });
            }
        };
        push(Difficulty::Easy, easy);
        push(Difficulty::Medium, medium);
        push(Difficulty::Hard, hard);
        out
    }

    fn pattern(questions: &[QuizQuestion], order: &[i32]) -> Vec<Difficulty> {
        order
            .iter()
            .map(|&i| questions[i as usize].difficulty())
            .collect()
    }

    #[test]
    fn test_round_robin_within_limit() {
        use Difficulty::*;
        let questions = bank(6, 3, 1);
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let order = balanced_order(&questions, 5, &mut rng);
            assert_eq!(pattern(&questions, &order), vec![Easy, Medium, Hard, Easy, Medium]);
        }
    }

    #[test]
    fn test_falls_back_to_first_remaining_bucket() {
        use Difficulty::*;
        let questions = bank(6, 3, 1);
        let mut rng = StdRng::seed_from_u64(7);
        let order = balanced_order(&questions, 10, &mut rng);
        assert_eq!(
            pattern(&questions, &order),
            vec![Easy, Medium, Hard, Easy, Medium, Easy, Easy, Medium, Easy, Easy]
        );
    }

    #[test]
    fn test_order_is_distinct_and_clamped() {
        let questions = bank(2, 2, 0);
        let mut rng = StdRng::seed_from_u64(1);
        let order = balanced_order(&questions, 10, &mut rng);
        assert_eq!(order.len(), 4);
        assert!(validate_order(&order, questions.len(), 4).is_ok());
    }

    #[test]
    fn test_unset_difficulty_lands_in_easy_bucket() {
        let mut questions = bank(0, 1, 0);
        questions.push(QuizQuestion {
            text: "plain".into(),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_index: 1,
            difficulty: None,
        });
        let mut rng = StdRng::seed_from_u64(3);
        // Easy goes first, so the untagged question leads.
        assert_eq!(balanced_order(&questions, 2, &mut rng), vec![1, 0]);
    }

    #[test]
    fn test_validate_order_rejects_bad_input() {
        assert!(validate_order(&[0, 1], 3, 3).is_err());
        assert!(validate_order(&[0, 3], 3, 2).is_err());
        assert!(validate_order(&[1, 1], 3, 2).is_err());
        assert!(validate_order(&[-1, 0], 3, 2).is_err());
        assert!(validate_order(&[2, 0], 3, 2).is_ok());
    }
}
