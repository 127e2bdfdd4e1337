//! Backend selection strategies.

use rand::Rng;

use switchboard_core::StrategyKind;

/// An eligible backend as seen by the selector.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Candidate {
    /// Position in the pool (insertion order).
    pub index: usize,
    pub weight: u32,
    pub in_flight: usize,
}

/// Picks one backend out of the eligible candidates.
///
/// Candidates are always passed in insertion order; every tie goes to the
/// lowest index.
#[derive(Debug)]
pub(crate) struct Selector {
    kind: StrategyKind,
    /// Round-robin: pool index to start the next scan from.
    cursor: usize,
    /// Weighted: smooth round-robin running weights, one per pool slot.
    current: Vec<i64>,
}

impl Selector {
    pub fn new(kind: StrategyKind) -> Self {
        Self {
            kind,
            cursor: 0,
            current: Vec::new(),
        }
    }

    pub fn kind(&self) -> StrategyKind {
        self.kind
    }

    /// A backend was appended to the pool.
    pub fn added(&mut self) {
        self.current.push(0);
    }

    /// The backend at `index` was removed from the pool.
    pub fn removed(&mut self, index: usize) {
        if index < self.current.len() {
            self.current.remove(index);
        }
        if self.cursor > index {
            self.cursor -= 1;
        }
    }

    pub fn pick(&mut self, candidates: &[Candidate]) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }
        let index = match self.kind {
            StrategyKind::RoundRobin => self.round_robin(candidates),
            StrategyKind::LeastConnections => least_connections(candidates),
            StrategyKind::Weighted => self.smooth_weighted(candidates),
            StrategyKind::Random => {
                candidates[rand::thread_rng().gen_range(0..candidates.len())].index
            }
        };
        Some(index)
    }

    fn round_robin(&mut self, candidates: &[Candidate]) -> usize {
        let chosen = candidates
            .iter()
            .find(|c| c.index >= self.cursor)
            .unwrap_or(&candidates[0])
            .index;
        self.cursor = chosen + 1;
        chosen
    }

    /// Nginx-style smooth weighted round-robin: every candidate gains its
    /// weight, the largest running total wins and pays back the sum.
    fn smooth_weighted(&mut self, candidates: &[Candidate]) -> usize {
        let mut total = 0i64;
        let mut best: Option<(usize, i64)> = None;
        for c in candidates {
            let weight = i64::from(c.weight.max(1));
            total += weight;
            let slot = &mut self.current[c.index];
            *slot += weight;
            if best.map_or(true, |(_, score)| *slot > score) {
                best = Some((c.index, *slot));
            }
        }
        let (chosen, _) = best.unwrap_or((candidates[0].index, 0));
        self.current[chosen] -= total;
        chosen
    }
}

fn least_connections(candidates: &[Candidate]) -> usize {
    let mut best = candidates[0];
    for c in &candidates[1..] {
        if c.in_flight < best.in_flight {
            best = *c;
        }
    }
    best.index
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(weights: &[u32]) -> Vec<Candidate> {
        weights
            .iter()
            .enumerate()
            .map(|(index, &weight)| Candidate {
                index,
                weight,
                in_flight: 0,
            })
            .collect()
    }

    fn selector(kind: StrategyKind, n: usize) -> Selector {
        let mut s = Selector::new(kind);
        for _ in 0..n {
            s.added();
        }
        s
    }

    #[test]
    fn test_round_robin_rotates() {
        let mut s = selector(StrategyKind::RoundRobin, 3);
        let all = candidates(&[1, 1, 1]);
        let picks: Vec<_> = (0..6).map(|_| s.pick(&all).unwrap()).collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn test_round_robin_skips_ineligible() {
        let mut s = selector(StrategyKind::RoundRobin, 3);
        let all = candidates(&[1, 1, 1]);
        assert_eq!(s.pick(&all), Some(0));
        let without_1: Vec<_> = all.iter().copied().filter(|c| c.index != 1).collect();
        assert_eq!(s.pick(&without_1), Some(2));
        assert_eq!(s.pick(&without_1), Some(0));
    }

    #[test]
    fn test_round_robin_cursor_survives_removal() {
        let mut s = selector(StrategyKind::RoundRobin, 3);
        let all = candidates(&[1, 1, 1]);
        s.pick(&all);
        s.pick(&all);
        // Cursor now points at index 2; removing index 0 shifts it to 1.
        s.removed(0);
        assert_eq!(s.pick(&candidates(&[1, 1])), Some(1));
    }

    #[test]
    fn test_least_connections_ties_to_lowest_index() {
        let mut s = selector(StrategyKind::LeastConnections, 3);
        let mut all = candidates(&[1, 1, 1]);
        assert_eq!(s.pick(&all), Some(0));
        all[0].in_flight = 2;
        all[1].in_flight = 1;
        all[2].in_flight = 1;
        assert_eq!(s.pick(&all), Some(1));
    }

    #[test]
    fn test_smooth_weighted_sequence() {
        let mut s = selector(StrategyKind::Weighted, 2);
        let all = candidates(&[3, 1]);
        let picks: Vec<_> = (0..8).map(|_| s.pick(&all).unwrap()).collect();
        assert_eq!(picks, vec![0, 0, 1, 0, 0, 0, 1, 0]);
    }

    #[test]
    fn test_random_only_picks_candidates() {
        let mut s = selector(StrategyKind::Random, 4);
        let some: Vec<_> = candidates(&[1, 1, 1, 1])
            .into_iter()
            .filter(|c| c.index % 2 == 1)
            .collect();
        for _ in 0..50 {
            let pick = s.pick(&some).unwrap();
            assert!(pick == 1 || pick == 3);
        }
    }

    #[test]
    fn test_empty_candidates() {
        let mut s = selector(StrategyKind::RoundRobin, 0);
        assert_eq!(s.pick(&[]), None);
    }
}
