use crate::solution::Solution;

#[derive(Debug, Clone)]
struct PoolEntry {
    solution: Solution,
    polished: bool,
}

/// Bounded collection of feasible solutions ordered by objective.
///
/// Duplicate coefficient vectors are stored once. When full, adding a
/// solution evicts the worst entry if the newcomer is better.
#[derive(Debug, Clone)]
pub struct SolutionPool {
    capacity: usize,
    entries: Vec<PoolEntry>,
}

impl SolutionPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a feasible solution. Returns false if it was infeasible, a
    /// duplicate, or worse than every entry of a full pool.
    pub fn add(&mut self, solution: Solution) -> bool {
        if !solution.feasible || self.capacity == 0 {
            return false;
        }
        if self
            .entries
            .iter()
            .any(|e| e.solution.coefficients == solution.coefficients)
        {
            return false;
        }
        let pos = self
            .entries
            .partition_point(|e| e.solution.objective <= solution.objective);
        if pos >= self.capacity {
            return false;
        }
        self.entries.insert(
            pos,
            PoolEntry {
                solution,
                polished: false,
            },
        );
        self.entries.truncate(self.capacity);
        true
    }

    /// The best solution in the pool.
    pub fn best(&self) -> Option<&Solution> {
        self.entries.first().map(|e| &e.solution)
    }

    /// Solutions in objective order.
    pub fn iter(&self) -> impl Iterator<Item = &Solution> {
        self.entries.iter().map(|e| &e.solution)
    }

    /// Up to `max` unpolished solutions with objective at most `threshold`,
    /// best first. They are marked as polished.
    pub fn take_unpolished(&mut self, threshold: f64, max: usize) -> Vec<Solution> {
        let mut taken = Vec::new();
        for entry in self.entries.iter_mut() {
            if taken.len() >= max || entry.solution.objective > threshold {
                break;
            }
            if !entry.polished {
                entry.polished = true;
                taken.push(entry.solution.clone());
            }
        }
        taken
    }

    /// Clone the pool contents, best first.
    pub fn to_vec(&self) -> Vec<Solution> {
        self.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solution(rho: &[f64], objective: f64) -> Solution {
        Solution {
            coefficients: rho.to_vec(),
            loss: objective,
            l0_norm: rho.iter().skip(1).filter(|&&r| r != 0.0).count(),
            objective,
            feasible: true,
        }
    }

    #[test]
    fn test_ordered_deduplicated_and_bounded() {
        let mut pool = SolutionPool::new(2);
        assert!(pool.add(solution(&[0.0, 1.0], 0.5)));
        assert!(pool.add(solution(&[0.0, 2.0], 0.3)));
        assert!(!pool.add(solution(&[0.0, 1.0], 0.5)));
        assert!(!pool.add(solution(&[1.0, 1.0], 0.9)));
        assert!(pool.add(solution(&[1.0, 0.0], 0.4)));

        let objectives: Vec<f64> = pool.iter().map(|s| s.objective).collect();
        assert_eq!(objectives, vec![0.3, 0.4]);
        assert_eq!(pool.best().unwrap().coefficients, vec![0.0, 2.0]);
    }

    #[test]
    fn test_rejects_infeasible() {
        let mut pool = SolutionPool::new(3);
        let mut bad = solution(&[0.0, 1.0], 0.1);
        bad.feasible = false;
        assert!(!pool.add(bad));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_take_unpolished_once() {
        let mut pool = SolutionPool::new(5);
        pool.add(solution(&[0.0, 1.0], 0.30));
        pool.add(solution(&[0.0, 2.0], 0.31));
        pool.add(solution(&[0.0, 3.0], 0.50));

        let first = pool.take_unpolished(0.4, 5);
        assert_eq!(first.len(), 2);
        assert!(pool.take_unpolished(0.4, 5).is_empty());
        assert_eq!(pool.take_unpolished(1.0, 5).len(), 1);
        assert_eq!(pool.len(), 3);
    }
}
