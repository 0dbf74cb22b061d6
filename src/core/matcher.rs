use crate::core::capabilities::Embedding;

/// Outcome of matching a probe embedding against the enrolled population.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Accepted { username: String, distance: f32 },
    RejectedKnownPopulation { distance: f32 },
    RejectedEmptyPopulation,
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Two-stage accept rule over a population snapshot.
///
/// 1. Empty population rejects outright, no distance computed.
/// 2. The nearest neighbor is the argmin of Euclidean distances, ties broken
///    by the first entry encountered.
/// 3. Every entry independently gets a boolean same-identity verdict under
///    the looser `match_tolerance`.
/// 4. Accept only when the nearest neighbor's verdict is true and its
///    distance beats the strict `distance_threshold`; anything else is a
///    rejection carrying the minimum distance.
///
/// The conjunction keeps a globally-nearest neighbor outside the sanity
/// bound from being accepted, and keeps a tolerable-but-not-nearest entry
/// from winning.
pub fn classify(
    probe: &[f32],
    snapshot: &[(String, Embedding)],
    distance_threshold: f32,
    match_tolerance: f32,
) -> MatchOutcome {
    if snapshot.is_empty() {
        return MatchOutcome::RejectedEmptyPopulation;
    }

    let distances: Vec<f32> = snapshot
        .iter()
        .map(|(_, embedding)| euclidean_distance(probe, embedding))
        .collect();

    let mut best_index = 0;
    let mut min_distance = distances[0];
    for (i, &d) in distances.iter().enumerate().skip(1) {
        if d < min_distance {
            best_index = i;
            min_distance = d;
        }
    }

    let matches: Vec<bool> = distances.iter().map(|&d| d <= match_tolerance).collect();

    if matches[best_index] && min_distance < distance_threshold {
        MatchOutcome::Accepted {
            username: snapshot[best_index].0.clone(),
            distance: min_distance,
        }
    } else {
        MatchOutcome::RejectedKnownPopulation {
            distance: min_distance,
        }
    }
}

/// Duplicate check under the loose tolerance only, ignoring the primary
/// threshold. False for an empty population.
pub fn nearest_within(probe: &[f32], snapshot: &[(String, Embedding)], tolerance: f32) -> bool {
    snapshot
        .iter()
        .map(|(_, embedding)| euclidean_distance(probe, embedding))
        .fold(f32::INFINITY, f32::min)
        < tolerance
}
