/// Fixed-capacity circular history of waveform snapshots.
///
/// Not thread-safe by itself; the renderer keeps it behind a
/// `parking_lot::Mutex`.
///
/// Overflow behavior: drops the oldest entry. A capacity of 0 retains nothing.
#[derive(Debug)]
pub struct HistoryRing<T> {
    slots: Vec<Option<T>>,
    write_index: usize,
    available: usize,
    capacity: usize,
}

impl<T: Clone> HistoryRing<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            write_index: 0,
            available: 0,
            capacity,
        }
    }

    /// Append `item` as the newest entry, dropping the oldest if full.
    pub fn push(&mut self, item: T) {
        if self.capacity == 0 {
            return;
        }
        self.slots[self.write_index] = Some(item);
        self.write_index = (self.write_index + 1) % self.capacity;
        if self.available < self.capacity {
            self.available += 1;
        }
    }

    /// Entry at `position`, where 0 is the oldest retained entry.
    pub fn get(&self, position: usize) -> Option<&T> {
        if position >= self.available {
            return None;
        }
        let read_index = (self.write_index + self.capacity - self.available) % self.capacity;
        self.slots[(read_index + position) % self.capacity].as_ref()
    }

    /// Entries from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.available).filter_map(move |position| self.get(position))
    }

    /// Number of entries currently retained.
    pub fn len(&self) -> usize {
        self.available
    }

    pub fn is_empty(&self) -> bool {
        self.available == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Change the capacity, keeping the newest entries that still fit.
    pub fn set_capacity(&mut self, capacity: usize) {
        if capacity == self.capacity {
            return;
        }
        let keep = self.available.min(capacity);
        let kept: Vec<T> = self.iter().skip(self.available - keep).cloned().collect();

        self.slots = vec![None; capacity];
        self.capacity = capacity;
        self.write_index = 0;
        self.available = 0;
        for item in kept {
            self.push(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(ring: &HistoryRing<u32>) -> Vec<u32> {
        ring.iter().copied().collect()
    }

    #[test]
    fn push_in_arrival_order() {
        let mut ring = HistoryRing::new(4);
        ring.push(1);
        ring.push(2);
        ring.push(3);

        assert_eq!(ring.len(), 3);
        assert_eq!(contents(&ring), vec![1, 2, 3]);
        assert_eq!(ring.get(2), Some(&3));
    }

    #[test]
    fn overflow_drops_oldest() {
        let mut ring = HistoryRing::new(3);
        for i in 1..=5 {
            ring.push(i);
        }

        assert_eq!(ring.len(), ring.capacity());
        assert_eq!(contents(&ring), vec![3, 4, 5]);
        assert_eq!(ring.get(0), Some(&3));
        assert_eq!(ring.get(3), None);
    }

    #[test]
    fn zero_capacity_retains_nothing() {
        let mut ring = HistoryRing::new(0);
        ring.push(1);

        assert!(ring.is_empty());
        assert_eq!(ring.get(0), None);
    }

    #[test]
    fn shrink_keeps_newest() {
        let mut ring = HistoryRing::new(5);
        for i in 1..=5 {
            ring.push(i);
        }
        ring.set_capacity(2);

        assert_eq!(ring.capacity(), 2);
        assert_eq!(contents(&ring), vec![4, 5]);
    }

    #[test]
    fn grow_after_wraparound() {
        let mut ring = HistoryRing::new(3);
        for i in 1..=4 {
            ring.push(i);
        }
        ring.set_capacity(5);
        ring.push(5);
        ring.push(6);

        assert_eq!(contents(&ring), vec![2, 3, 4, 5, 6]);
    }
}
