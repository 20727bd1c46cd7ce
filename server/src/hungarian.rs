//! Minimum-cost bipartite assignment via the Hungarian (Kuhn-Munkres) algorithm.
//!
//! No crate in this codebase's dependency stack solves general rectangular
//! assignment, so this is a small hand-rolled O(n^3) implementation (the design
//! notes accept any algorithm with that worst case, §9). Square padding handles the
//! rectangular case: dummy rows/columns carry cost 0 and are filtered out of the
//! result.

/// Solve minimum-cost assignment over an `n x m` cost matrix. Returns, for each row
/// `i` that was matched, `(i, j)` where `j` is the assigned column. Rows beyond
/// `min(n, m)` capacity may be left unmatched.
pub fn solve(cost: &[Vec<f64>]) -> Vec<(usize, usize)> {
    let rows = cost.len();
    if rows == 0 {
        return vec![];
    }
    let cols = cost[0].len();
    if cols == 0 {
        return vec![];
    }
    let n = rows.max(cols);

    // Pad to a square matrix; padding cells cost 0 so they never distort the
    // minimum over the real cells, and are dropped from the result afterward.
    let mut a = vec![vec![0.0_f64; n + 1]; n + 1];
    for i in 0..rows {
        for j in 0..cols {
            a[i + 1][j + 1] = cost[i][j];
        }
    }

    // Jonker-Volgenant style potentials formulation of the Hungarian algorithm,
    // 1-indexed as is conventional for this method.
    let mut u = vec![0.0_f64; n + 1];
    let mut v = vec![0.0_f64; n + 1];
    let mut p = vec![0usize; n + 1]; // p[j] = row assigned to column j
    let mut way = vec![0usize; n + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0 = 0usize;
        let mut minv = vec![f64::INFINITY; n + 1];
        let mut used = vec![false; n + 1];

        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0usize;
            for j in 1..=n {
                if used[j] {
                    continue;
                }
                let cur = a[i0][j] - u[i0] - v[j];
                if cur < minv[j] {
                    minv[j] = cur;
                    way[j] = j0;
                }
                if minv[j] < delta {
                    delta = minv[j];
                    j1 = j;
                }
            }
            for j in 0..=n {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }
            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }

        loop {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut result = Vec::new();
    for j in 1..=n {
        let i = p[j];
        if i >= 1 && i <= rows && j <= cols {
            result.push((i - 1, j - 1));
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trivial_single_pair() {
        let cost = vec![vec![3.0]];
        let assignment = solve(&cost);
        assert_eq!(assignment, vec![(0, 0)]);
    }

    #[test]
    fn picks_minimum_cost_assignment() {
        // Row 0 prefers col 1 (cost 1), row 1 prefers col 0 (cost 1); greedy would
        // clash, the optimum is the unique perfect matching with total cost 2.
        let cost = vec![vec![4.0, 1.0], vec![1.0, 4.0]];
        let mut assignment = solve(&cost);
        assignment.sort();
        assert_eq!(assignment, vec![(0, 1), (1, 0)]);
    }

    #[test]
    fn rectangular_more_rows_than_columns() {
        let cost = vec![vec![1.0], vec![2.0], vec![0.5]];
        let assignment = solve(&cost);
        // Exactly one row gets matched to the single column, and it is the cheapest.
        assert_eq!(assignment.len(), 1);
        assert_eq!(assignment[0].1, 0);
        assert_eq!(assignment[0].0, 2);
    }
}
