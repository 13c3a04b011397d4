use crate::core::rigidbody::RigidBody;

/// Horizontal extent of one body, widened by the detection margin.
#[derive(Debug, Clone, Copy)]
struct Interval {
    slot: usize,
    min_x: f64,
    max_x: f64,
    min_y: f64,
    max_y: f64,
}

/// Sort-and-sweep pruning on bounding circles.
///
/// Returns candidate slot pairs `(i, j)` with `i < j`, sorted, so the narrow
/// phase sees them in a deterministic order. Pairs of two static bodies are
/// never produced.
pub fn candidate_pairs(bodies: &[RigidBody], margin: f64) -> Vec<(usize, usize)> {
    let mut intervals: Vec<Interval> = bodies
        .iter()
        .enumerate()
        .map(|(slot, body)| {
            let reach = body.shape().bounding_radius() + margin;
            let p = body.position();
            Interval {
                slot,
                min_x: p.x - reach,
                max_x: p.x + reach,
                min_y: p.y - reach,
                max_y: p.y + reach,
            }
        })
        .collect();
    intervals.sort_by(|a, b| a.min_x.total_cmp(&b.min_x));

    let mut pairs = Vec::new();
    for (i, first) in intervals.iter().enumerate() {
        for second in &intervals[i + 1..] {
            if second.min_x > first.max_x {
                break;
            }
            if second.min_y > first.max_y || first.min_y > second.max_y {
                continue;
            }
            if bodies[first.slot].is_static() && bodies[second.slot].is_static() {
                continue;
            }
            let (a, b) = if first.slot < second.slot {
                (first.slot, second.slot)
            } else {
                (second.slot, first.slot)
            };
            pairs.push((a, b));
        }
    }
    pairs.sort_unstable();
    pairs
}
