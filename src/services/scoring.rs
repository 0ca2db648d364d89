/// Points awarded for any correct answer.
pub const BASE_POINTS: i64 = 1000;
/// Largest speed bonus, earned by answering instantly.
pub const MAX_SPEED_BONUS: i64 = 500;

/// Points for one answer.
///
/// Wrong answers score nothing. Correct answers earn [`BASE_POINTS`] plus a speed
/// bonus decaying linearly from [`MAX_SPEED_BONUS`] to zero over `max_time_ms`.
/// The bonus is clamped to `[0, MAX_SPEED_BONUS]`, so a correct answer submitted
/// after the window (clock skew, slow network) still earns exactly the base.
pub fn score(is_correct: bool, time_to_answer_ms: u64, max_time_ms: u64) -> i64 {
    if !is_correct {
        return 0;
    }
    if max_time_ms == 0 {
        return BASE_POINTS;
    }
    let remaining = 1.0 - time_to_answer_ms as f64 / max_time_ms as f64;
    let bonus = (MAX_SPEED_BONUS as f64 * remaining).floor() as i64;
    BASE_POINTS + bonus.clamp(0, MAX_SPEED_BONUS)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: u64 = 30_000;

    #[test]
    fn wrong_answers_score_zero() {
        assert_eq!(score(false, 0, MAX), 0);
        assert_eq!(score(false, 12_345, MAX), 0);
        assert_eq!(score(false, 90_000, MAX), 0);
    }

    #[test]
    fn bonus_decays_linearly() {
        assert_eq!(score(true, 0, MAX), 1500);
        assert_eq!(score(true, 15_000, MAX), 1250);
        assert_eq!(score(true, 30_000, MAX), 1000);
        assert_eq!(score(true, 1, MAX), 1499);
    }

    #[test]
    fn correct_scores_stay_in_range_and_never_increase_with_time() {
        let mut previous = i64::MAX;
        for time in (0..=MAX).step_by(250) {
            let points = score(true, time, MAX);
            assert!((500..=1500).contains(&points));
            assert!(points <= previous);
            previous = points;
        }
    }

    #[test]
    fn late_answers_keep_the_base() {
        assert_eq!(score(true, 45_000, MAX), 1000);
        assert_eq!(score(true, 10, 0), 1000);
    }
}
