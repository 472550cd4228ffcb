/// Exact dynamic programming is affordable up to this many stops; beyond it
/// the construction + improvement heuristic takes over.
const EXACT_LIMIT: usize = 12;

/// Visiting order for an open TSP rooted at index 0: start at 0, visit every
/// other index once, no return leg.
pub fn open_route(distances: &[Vec<f64>]) -> Vec<usize> {
    let n = distances.len();
    if n <= 2 {
        return (0..n).collect();
    }
    if n <= EXACT_LIMIT {
        held_karp(distances)
    } else {
        let mut route = nearest_neighbour(distances);
        two_opt(&mut route, distances);
        route
    }
}

fn held_karp(distances: &[Vec<f64>]) -> Vec<usize> {
    let n = distances.len();
    let m = n - 1; // cities other than the root
    let full = 1usize << m;
    // cost[mask][j]: cheapest path from 0 through `mask`, ending at city j+1
    let mut cost = vec![vec![f64::INFINITY; m]; full];
    let mut parent = vec![vec![usize::MAX; m]; full];
    for j in 0..m {
        cost[1 << j][j] = distances[0][j + 1];
    }
    for mask in 1..full {
        for j in 0..m {
            if mask & (1 << j) == 0 || cost[mask][j].is_infinite() {
                continue;
            }
            for k in 0..m {
                if mask & (1 << k) != 0 {
                    continue;
                }
                let next_mask = mask | (1 << k);
                let candidate = cost[mask][j] + distances[j + 1][k + 1];
                if candidate < cost[next_mask][k] {
                    cost[next_mask][k] = candidate;
                    parent[next_mask][k] = j;
                }
            }
        }
    }

    let mut end = 0;
    for j in 1..m {
        if cost[full - 1][j] < cost[full - 1][end] {
            end = j;
        }
    }
    let mut route = Vec::with_capacity(n);
    let mut mask = full - 1;
    let mut j = end;
    while j != usize::MAX {
        route.push(j + 1);
        let prev = parent[mask][j];
        mask &= !(1 << j);
        j = prev;
    }
    route.push(0);
    route.reverse();
    route
}

fn nearest_neighbour(distances: &[Vec<f64>]) -> Vec<usize> {
    let n = distances.len();
    let mut visited = vec![false; n];
    let mut route = Vec::with_capacity(n);
    let mut current = 0;
    visited[0] = true;
    route.push(0);
    for _ in 1..n {
        let mut best = None;
        for candidate in 1..n {
            if visited[candidate] {
                continue;
            }
            match best {
                Some((_, d)) if distances[current][candidate] >= d => {}
                _ => best = Some((candidate, distances[current][candidate])),
            }
        }
        let (next, _) = best.expect("unvisited city must exist");
        visited[next] = true;
        route.push(next);
        current = next;
    }
    route
}

// 2-opt on an open path; the root stays fixed.
fn two_opt(route: &mut [usize], distances: &[Vec<f64>]) {
    let n = route.len();
    let mut improved = true;
    while improved {
        improved = false;
        for i in 1..n - 1 {
            for j in i + 1..n {
                let before = distances[route[i - 1]][route[i]]
                    + if j + 1 < n {
                        distances[route[j]][route[j + 1]]
                    } else {
                        0.0
                    };
                let after = distances[route[i - 1]][route[j]]
                    + if j + 1 < n {
                        distances[route[i]][route[j + 1]]
                    } else {
                        0.0
                    };
                if after + 1e-12 < before {
                    route[i..=j].reverse();
                    improved = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path_length(route: &[usize], distances: &[Vec<f64>]) -> f64 {
        route
            .windows(2)
            .map(|pair| distances[pair[0]][pair[1]])
            .sum()
    }

    fn matrix_of_points(points: &[(f64, f64)]) -> Vec<Vec<f64>> {
        points
            .iter()
            .map(|a| {
                points
                    .iter()
                    .map(|b| ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt())
                    .collect()
            })
            .collect()
    }

    fn brute_force(distances: &[Vec<f64>]) -> f64 {
        fn recurse(
            distances: &[Vec<f64>],
            current: usize,
            remaining: &mut Vec<usize>,
            acc: f64,
            best: &mut f64,
        ) {
            if remaining.is_empty() {
                *best = best.min(acc);
                return;
            }
            for i in 0..remaining.len() {
                let next = remaining.remove(i);
                recurse(distances, next, remaining, acc + distances[current][next], best);
                remaining.insert(i, next);
            }
        }
        let mut best = f64::INFINITY;
        let mut remaining: Vec<usize> = (1..distances.len()).collect();
        recurse(distances, 0, &mut remaining, 0.0, &mut best);
        best
    }

    #[test]
    fn exact_route_matches_brute_force() {
        let points = [
            (0.0, 0.0),
            (3.0, 1.0),
            (1.0, 4.0),
            (5.0, 5.0),
            (2.0, 2.0),
            (4.0, 0.5),
        ];
        let matrix = matrix_of_points(&points);
        let route = open_route(&matrix);
        assert_eq!(route[0], 0);
        let mut sorted = route.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..points.len()).collect::<Vec<_>>());
        assert!((path_length(&route, &matrix) - brute_force(&matrix)).abs() < 1e-9);
    }

    #[test]
    fn heuristic_route_is_a_rooted_permutation() {
        let points: Vec<(f64, f64)> = (0..20)
            .map(|i| ((i * 7 % 13) as f64, (i * 11 % 17) as f64))
            .collect();
        let matrix = matrix_of_points(&points);
        let route = open_route(&matrix);
        assert_eq!(route[0], 0);
        let mut sorted = route.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..points.len()).collect::<Vec<_>>());
    }

    #[test]
    fn trivial_sizes() {
        assert_eq!(open_route(&[]), Vec::<usize>::new());
        assert_eq!(open_route(&[vec![0.0]]), vec![0]);
        assert_eq!(open_route(&[vec![0.0, 1.0], vec![1.0, 0.0]]), vec![0, 1]);
    }
}
