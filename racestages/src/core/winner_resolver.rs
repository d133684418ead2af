use crate::core::telemetry::TelemetrySnapshot;
use helpers::general::argmax_where;

/// resolve_winners returns the cars that finished the stage since the last call, in crossing order.
///
/// A car qualifies if its laps-completed value is known (eligible) and at least the target lap and
/// it is not yet contained in `recorded`. The next winner is always the qualifying car with the
/// highest track-position fraction, since it crossed the stage line first. Ties keep the lowest
/// car index. At most `slots` cars are returned.
pub fn resolve_winners(
    lap_completed: &[Option<i32>],
    lap_dist_pct: &[f32],
    target_lap: i32,
    recorded: &[usize],
    slots: usize,
) -> Vec<usize> {
    let mut qualifying: Vec<bool> = lap_completed
        .iter()
        .enumerate()
        .map(|(idx, laps)| {
            matches!(laps, Some(laps) if *laps >= target_lap) && !recorded.contains(&idx)
        })
        .collect();

    let lap_dist_pct: Vec<f32> = lap_dist_pct
        .iter()
        .map(|&pct| if pct.is_nan() { f32::NEG_INFINITY } else { pct })
        .collect();

    let mut winners = Vec::new();

    while winners.len() < slots {
        let next_winner = argmax_where(&lap_dist_pct, |idx| {
            qualifying.get(idx).copied().unwrap_or(false)
        });

        match next_winner {
            Some(idx) => {
                qualifying[idx] = false;
                winners.push(idx);
            }
            None => break,
        }
    }

    winners
}

/// winners_by_position maps the official race positions 1..=count back to car indices. Positions
/// that no car holds are skipped.
pub fn winners_by_position(snapshot: &TelemetrySnapshot, count: usize) -> Vec<usize> {
    (1..=count as i32)
        .filter_map(|position| snapshot.car_idx_at_position(position))
        .collect()
}
