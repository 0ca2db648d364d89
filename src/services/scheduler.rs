use std::{collections::HashSet, f64::consts::TAU};

use rand::{Rng, rng, seq::SliceRandom};

use crate::state::lobby::{Decoy, PlaybackMode, Track};

/// Rejection-sampling attempts before falling back to the clamped midpoint.
const MAX_SAMPLES: usize = 32;

/// Playback offset for `track`, shared by every client through `startPositions`.
///
/// Preview clips are already short excerpts and always start at zero; full tracks
/// get a mid-biased offset.
pub fn start_offset_for(mode: PlaybackMode, track: &Track, clip_length_ms: u64) -> u64 {
    match mode {
        PlaybackMode::Preview => 0,
        PlaybackMode::Sdk => choose_start_offset(track.duration_ms, clip_length_ms),
    }
}

/// Pick a clip start in `[0, duration_ms - clip_length_ms]`, biased toward the middle.
pub fn choose_start_offset(duration_ms: u64, clip_length_ms: u64) -> u64 {
    choose_start_offset_with(&mut rng(), duration_ms, clip_length_ms)
}

/// [`choose_start_offset`] drawing from the given generator.
///
/// Samples a normal distribution centred on the midpoint with a standard deviation
/// of a sixth of the duration, rejecting samples outside the feasible range. After
/// [`MAX_SAMPLES`] rejections the midpoint, clamped into range, is returned.
pub fn choose_start_offset_with<R: Rng + ?Sized>(
    rng: &mut R,
    duration_ms: u64,
    clip_length_ms: u64,
) -> u64 {
    if duration_ms <= clip_length_ms {
        return 0;
    }
    let latest = (duration_ms - clip_length_ms) as f64;
    let mean = duration_ms as f64 / 2.0;
    let std_dev = duration_ms as f64 / 6.0;

    for _ in 0..MAX_SAMPLES {
        let sample = mean + std_dev * standard_normal(rng);
        if (0.0..=latest).contains(&sample) {
            return sample as u64;
        }
    }
    mean.min(latest) as u64
}

/// Box-Muller transform over two uniform draws.
fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (TAU * u2).cos()
}

/// Build `count` shuffled options for `correct`, the correct title included exactly once.
pub fn choose_distractors(
    correct: &Track,
    pool: &[Decoy],
    excluded: &HashSet<String>,
    count: usize,
) -> Vec<String> {
    choose_distractors_with(&mut rng(), correct, pool, excluded, count)
}

/// [`choose_distractors`] drawing from the given generator.
///
/// Wrong options come from other track titles of the pool first, then from
/// `"{artist} - Unknown Track"` decoys. Names in `excluded` are skipped; if that
/// leaves the set short, excluded pool titles are admitted again as a last resort.
pub fn choose_distractors_with<R: Rng + ?Sized>(
    rng: &mut R,
    correct: &Track,
    pool: &[Decoy],
    excluded: &HashSet<String>,
    count: usize,
) -> Vec<String> {
    let mut options = vec![correct.name.clone()];
    let mut taken: HashSet<String> = HashSet::from([correct.name.clone()]);

    let mut candidates: Vec<&Decoy> = pool
        .iter()
        .filter(|track| track.id != correct.id)
        .collect();
    candidates.shuffle(rng);

    let mut push = |name: &str, options: &mut Vec<String>| {
        if options.len() < count && taken.insert(name.to_owned()) {
            options.push(name.to_owned());
        }
    };

    for track in &candidates {
        if !excluded.contains(&track.name) {
            push(&track.name, &mut options);
        }
    }

    if options.len() < count {
        let artists = correct
            .artists
            .iter()
            .chain(candidates.iter().flat_map(|track| track.artists.iter()));
        for artist in artists {
            let decoy = format!("{artist} - Unknown Track");
            if !excluded.contains(&decoy) {
                push(&decoy, &mut options);
            }
        }
    }

    if options.len() < count {
        for track in &candidates {
            push(&track.name, &mut options);
        }
    }

    options.shuffle(rng);
    options
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn track(id: &str, name: &str, artist: &str) -> Track {
        Track {
            id: id.to_owned(),
            name: name.to_owned(),
            artists: vec![artist.to_owned()],
            album: String::new(),
            preview_url: None,
            duration_ms: 200_000,
            uri: String::new(),
        }
    }

    fn pool(names: &[&str]) -> Vec<Track> {
        names
            .iter()
            .map(|name| track(&format!("id-{name}"), name, &format!("{name}-artist")))
            .collect()
    }

    fn decoys(pool: &[Track]) -> Vec<Decoy> {
        pool.iter().map(Decoy::from).collect()
    }

    #[test]
    fn start_offset_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for duration in [30_001, 45_000, 60_000, 180_000, 600_000] {
            for _ in 0..1000 {
                let offset = choose_start_offset_with(&mut rng, duration, 30_000);
                assert!(offset <= duration - 30_000, "{offset} out of range for {duration}");
            }
        }
    }

    #[test]
    fn start_offset_is_zero_when_track_fits_in_clip() {
        assert_eq!(choose_start_offset(30_000, 30_000), 0);
        assert_eq!(choose_start_offset(12_000, 30_000), 0);
        assert_eq!(choose_start_offset(0, 30_000), 0);
    }

    #[test]
    fn start_offset_clusters_around_midpoint() {
        let mut rng = StdRng::seed_from_u64(42);
        let duration = 300_000;
        let samples: Vec<u64> = (0..2000)
            .map(|_| choose_start_offset_with(&mut rng, duration, 30_000))
            .collect();
        let mean = samples.iter().sum::<u64>() as f64 / samples.len() as f64;
        assert!((mean - 150_000.0).abs() < 10_000.0, "mean {mean}");
    }

    #[test]
    fn preview_mode_always_starts_at_zero() {
        let song = track("a", "A", "x");
        assert_eq!(start_offset_for(PlaybackMode::Preview, &song, 30_000), 0);
    }

    #[test]
    fn correct_title_appears_exactly_once() {
        let mut rng = StdRng::seed_from_u64(1);
        let pool = pool(&["A", "B", "C", "D", "E", "F"]);
        for correct in &pool {
            let options =
                choose_distractors_with(&mut rng, correct, &decoys(&pool), &HashSet::new(), 4);
            assert_eq!(options.len(), 4);
            assert_eq!(options.iter().filter(|name| **name == correct.name).count(), 1);
            let unique: HashSet<_> = options.iter().collect();
            assert_eq!(unique.len(), 4);
        }
    }

    #[test]
    fn playlist_titles_fill_options_beyond_the_question_tracks() {
        let mut rng = StdRng::seed_from_u64(11);
        let playlist = pool(&["X", "A", "B", "C", "D", "E", "F", "G"]);
        for _ in 0..50 {
            let options = choose_distractors_with(
                &mut rng,
                &playlist[0],
                &decoys(&playlist),
                &HashSet::new(),
                4,
            );
            assert_eq!(options.len(), 4);
            assert!(options.iter().all(|name| !name.ends_with(" - Unknown Track")));
        }
    }

    #[test]
    fn small_pool_falls_back_to_artist_decoys() {
        let pool = pool(&["X", "A", "B"]);
        let options = choose_distractors(&pool[0], &decoys(&pool), &HashSet::new(), 4);

        assert_eq!(options.len(), 4);
        assert!(options.contains(&"X".to_owned()));
        assert!(options.contains(&"A".to_owned()));
        assert!(options.contains(&"B".to_owned()));
        assert!(options.iter().any(|name| name.ends_with(" - Unknown Track")));
        let unique: HashSet<_> = options.iter().collect();
        assert_eq!(unique.len(), 4);
    }

    #[test]
    fn excluded_names_are_avoided_when_possible() {
        let mut rng = StdRng::seed_from_u64(3);
        let pool = pool(&["X", "A", "B", "C", "D", "E"]);
        let excluded = HashSet::from(["A".to_owned(), "B".to_owned()]);
        for _ in 0..50 {
            let options = choose_distractors_with(&mut rng, &pool[0], &decoys(&pool), &excluded, 4);
            assert_eq!(options.len(), 4);
            assert!(!options.contains(&"A".to_owned()));
            assert!(!options.contains(&"B".to_owned()));
        }
    }

    #[test]
    fn decoys_never_collide_with_excluded_names() {
        let pool = pool(&["X", "A"]);
        let excluded = HashSet::from(["X-artist - Unknown Track".to_owned()]);
        let options = choose_distractors(&pool[0], &decoys(&pool), &excluded, 3);
        assert_eq!(options.len(), 3);
        assert!(!options.contains(&"X-artist - Unknown Track".to_owned()));
        assert!(options.contains(&"A-artist - Unknown Track".to_owned()));
    }

    #[test]
    fn exclusions_are_relaxed_rather_than_returning_too_few() {
        let mut pool = pool(&["X", "A", "B", "C"]);
        for track in &mut pool {
            track.artists.clear();
        }
        let excluded = HashSet::from(["A".to_owned(), "B".to_owned(), "C".to_owned()]);
        let options = choose_distractors(&pool[0], &decoys(&pool), &excluded, 4);
        assert_eq!(options.len(), 4);
    }

    #[test]
    fn correct_answer_position_is_shuffled() {
        let mut rng = StdRng::seed_from_u64(9);
        let pool = pool(&["X", "A", "B", "C", "D"]);
        let positions: HashSet<usize> = (0..200)
            .map(|_| {
                choose_distractors_with(&mut rng, &pool[0], &decoys(&pool), &HashSet::new(), 4)
                    .iter()
                    .position(|name| name == "X")
                    .unwrap()
            })
            .collect();
        assert!(positions.len() > 1);
    }
}
