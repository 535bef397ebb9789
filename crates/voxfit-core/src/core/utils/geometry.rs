use nalgebra::Point3;

/// RMSD between two equally long, identically ordered coordinate sets.
pub fn calculate_rmsd(coords1: &[Point3<f64>], coords2: &[Point3<f64>]) -> Option<f64> {
    if coords1.len() != coords2.len() || coords1.is_empty() {
        return None;
    }
    let n = coords1.len() as f64;
    let squared_dist_sum: f64 = coords1
        .iter()
        .zip(coords2.iter())
        .map(|(p1, p2)| (p1 - p2).norm_squared())
        .sum();
    Some((squared_dist_sum / n).sqrt())
}

/// RMSD under the optimal one-to-one assignment between the two sets.
///
/// Fitted atoms carry no inherent ordering relative to the source structure,
/// so positional deviation is only meaningful after matching atoms up. Sets
/// are matched exhaustively (the validation use case is small structures);
/// sets larger than `MAX_ASSIGNMENT_ATOMS` fall back to greedy matching.
pub fn calculate_assignment_rmsd(
    coords1: &[Point3<f64>],
    coords2: &[Point3<f64>],
) -> Option<f64> {
    if coords1.len() != coords2.len() || coords1.is_empty() {
        return None;
    }
    let n = coords1.len();
    let cost: Vec<Vec<f64>> = coords1
        .iter()
        .map(|p1| coords2.iter().map(|p2| (p1 - p2).norm_squared()).collect())
        .collect();

    let total = if n <= MAX_ASSIGNMENT_ATOMS {
        let mut used = vec![false; n];
        let mut best = f64::INFINITY;
        branch_and_bound(&cost, 0, 0.0, &mut used, &mut best);
        best
    } else {
        greedy_assignment_cost(&cost)
    };
    Some((total / n as f64).sqrt())
}

const MAX_ASSIGNMENT_ATOMS: usize = 10;

fn branch_and_bound(cost: &[Vec<f64>], row: usize, partial: f64, used: &mut [bool], best: &mut f64) {
    if partial >= *best {
        return;
    }
    if row == cost.len() {
        *best = partial;
        return;
    }
    for col in 0..cost.len() {
        if !used[col] {
            used[col] = true;
            branch_and_bound(cost, row + 1, partial + cost[row][col], used, best);
            used[col] = false;
        }
    }
}

fn greedy_assignment_cost(cost: &[Vec<f64>]) -> f64 {
    let n = cost.len();
    let mut pairs: Vec<(f64, usize, usize)> = (0..n)
        .flat_map(|i| (0..n).map(move |j| (cost[i][j], i, j)))
        .collect();
    pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut row_done = vec![false; n];
    let mut col_done = vec![false; n];
    let mut total = 0.0;
    for (c, i, j) in pairs {
        if !row_done[i] && !col_done[j] {
            row_done[i] = true;
            col_done[j] = true;
            total += c;
        }
    }
    total
}
