use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;

use crate::config::LoadBalanceStrategy;

/// Picks one slot out of a candidate set of `len` entries.
///
/// Strategies only see the size of the set so that they hold no knowledge of
/// which instances exist; the set may change between calls.
pub trait LoadBalancingStrategy: Send + Sync + 'static {
    /// Select an index in `0..len`, or `None` when the set is empty
    fn select_index(&self, len: usize) -> Option<usize>;
    /// Create a new instance of this strategy as a boxed trait object
    fn boxed(self) -> Box<dyn LoadBalancingStrategy>
    where
        Self: Sized,
    {
        Box::new(self)
    }
}

/// Round-robin load balancing strategy
pub struct RoundRobinStrategy {
    counter: AtomicUsize,
}

impl Default for RoundRobinStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl RoundRobinStrategy {
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }
}

impl LoadBalancingStrategy for RoundRobinStrategy {
    fn select_index(&self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        let count = self.counter.fetch_add(1, Ordering::Relaxed);
        Some(count % len)
    }
}

/// Uniform random selection
#[derive(Default)]
pub struct RandomStrategy;

impl LoadBalancingStrategy for RandomStrategy {
    fn select_index(&self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        Some(rand::rng().random_range(0..len))
    }
}

/// Factory for creating load balancing strategies from configuration
pub struct LoadBalancerFactory;

impl LoadBalancerFactory {
    pub fn create_strategy(strategy: LoadBalanceStrategy) -> Box<dyn LoadBalancingStrategy> {
        match strategy {
            LoadBalanceStrategy::RoundRobin => RoundRobinStrategy::new().boxed(),
            LoadBalanceStrategy::Random => RandomStrategy.boxed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_robin_strategy() {
        let strategy = RoundRobinStrategy::new();

        assert_eq!(strategy.select_index(3), Some(0));
        assert_eq!(strategy.select_index(3), Some(1));
        assert_eq!(strategy.select_index(3), Some(2));
        assert_eq!(strategy.select_index(3), Some(0)); // Wraps around
    }

    #[test]
    fn test_round_robin_tolerates_shrinking_set() {
        let strategy = RoundRobinStrategy::new();
        for _ in 0..5 {
            strategy.select_index(4);
        }
        // counter is past the new length, index must still be in range
        assert_eq!(strategy.select_index(2), Some(1));
    }

    #[test]
    fn test_empty_set() {
        assert_eq!(RoundRobinStrategy::new().select_index(0), None);
        assert_eq!(RandomStrategy.select_index(0), None);
    }

    #[test]
    fn test_random_strategy_in_range() {
        let strategy = RandomStrategy;
        for _ in 0..50 {
            let index = strategy.select_index(3).unwrap();
            assert!(index < 3);
        }
    }

    #[test]
    fn test_load_balancer_factory() {
        let rr = LoadBalancerFactory::create_strategy(LoadBalanceStrategy::RoundRobin);
        assert_eq!(rr.select_index(2), Some(0));
        assert_eq!(rr.select_index(2), Some(1));

        let random = LoadBalancerFactory::create_strategy(LoadBalanceStrategy::Random);
        assert!(random.select_index(2).is_some());
    }
}
