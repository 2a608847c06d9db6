//! Fixed-capacity ring of active decoy ports.
//!
//! # Responsibilities
//! - Hold at most `capacity` unique ports, oldest first
//! - Draw fresh candidates from the configured range
//! - Weighted random read favouring recently enqueued ports
//!
//! # Design Decisions
//! - One reader/writer lock guards the whole ring
//! - Candidate search is bounded so a crowded range cannot hang a caller

use std::collections::VecDeque;
use std::ops::RangeInclusive;

use parking_lot::RwLock;
use rand::Rng;

/// Attempts made to find a port that is not already resident.
pub const MAX_DRAW_ATTEMPTS: usize = 100;

/// A bounded FIFO of unique ports.
#[derive(Debug)]
pub struct RingPool {
    ports: RwLock<VecDeque<u16>>,
    capacity: usize,
    range: RangeInclusive<u16>,
}

impl RingPool {
    /// Create an empty pool holding at most `capacity` ports from `min..=max`.
    pub fn new(capacity: usize, min: u16, max: u16) -> Self {
        Self {
            ports: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
            range: min..=max,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn range(&self) -> RangeInclusive<u16> {
        self.range.clone()
    }

    pub fn len(&self) -> usize {
        self.ports.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.read().is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.ports.read().len() >= self.capacity
    }

    pub fn contains(&self, port: u16) -> bool {
        self.ports.read().contains(&port)
    }

    /// Drop every resident port.
    pub fn clear(&self) {
        self.ports.write().clear();
    }

    /// Append `port` as the newest entry.
    ///
    /// Returns false if the pool is full or the port is already resident.
    pub fn enqueue(&self, port: u16) -> bool {
        let mut ports = self.ports.write();
        if ports.len() >= self.capacity || ports.contains(&port) {
            return false;
        }
        ports.push_back(port);
        true
    }

    /// Remove and return the oldest entry.
    pub fn dequeue(&self) -> Option<u16> {
        self.ports.write().pop_front()
    }

    /// Resident ports, oldest first.
    pub fn snapshot(&self) -> Vec<u16> {
        self.ports.read().iter().copied().collect()
    }

    /// Pick a uniformly random port in range that is not resident.
    ///
    /// Returns `None` when `MAX_DRAW_ATTEMPTS` candidates all collide.
    pub fn generate_unique(&self) -> Option<u16> {
        let ports = self.ports.read();
        let mut rng = rand::thread_rng();
        (0..MAX_DRAW_ATTEMPTS)
            .map(|_| rng.gen_range(self.range.clone()))
            .find(|candidate| !ports.contains(candidate))
    }

    /// Draw one resident port.
    ///
    /// Weights grow linearly from the second-oldest entry (weight 1) to the
    /// newest (weight n-1); the oldest entry, next in line for eviction, is
    /// never handed out once two or more ports are resident.
    pub fn draw(&self) -> Option<u16> {
        let ports = self.ports.read();
        match ports.len() {
            0 => None,
            1 => ports.front().copied(),
            2 => ports.back().copied(),
            n => {
                let ranked = n - 1;
                let total = ranked * (ranked + 1) / 2;
                let mut ticket = rand::thread_rng().gen_range(0..total);
                for weight in 1..=ranked {
                    if ticket < weight {
                        return ports.get(weight).copied();
                    }
                    ticket -= weight;
                }
                ports.back().copied()
            }
        }
    }
}
