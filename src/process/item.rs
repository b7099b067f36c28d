//! Work item contract and the cost-ordered queue shared by workers and the manager.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

/// A candidate node handed to the scheduler.
///
/// The scheduler never mutates items; it only moves them between queues and
/// hands them to the expansion callback. Lower cost means higher priority.
pub trait WorkItem {
    /// Priority key; lower is expanded first.
    fn cost(&self) -> u64;
    /// Set by the expansion callback on terminal, accepted items.
    fn is_solution(&self) -> bool;
}

impl<T: WorkItem + ?Sized> WorkItem for Arc<T> {
    fn cost(&self) -> u64 {
        (**self).cost()
    }

    fn is_solution(&self) -> bool {
        (**self).is_solution()
    }
}

impl<T: WorkItem + ?Sized> WorkItem for Box<T> {
    fn cost(&self) -> u64 {
        (**self).cost()
    }

    fn is_solution(&self) -> bool {
        (**self).is_solution()
    }
}

struct Entry<D> {
    cost: u64,
    sequence: u64,
    item: D,
}

impl<D> PartialEq for Entry<D> {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost && self.sequence == other.sequence
    }
}

impl<D> Eq for Entry<D> {}

impl<D> PartialOrd for Entry<D> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<D> Ord for Entry<D> {
    // BinaryHeap is a max-heap: invert so the cheapest, oldest entry is on top.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Min-cost priority queue. Items of equal cost pop in insertion order.
pub struct CostQueue<D> {
    heap: BinaryHeap<Entry<D>>,
    next_sequence: u64,
}

impl<D: WorkItem> CostQueue<D> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_sequence: 0,
        }
    }

    pub fn push(&mut self, item: D) {
        let entry = Entry {
            cost: item.cost(),
            sequence: self.next_sequence,
            item,
        };
        self.next_sequence = self.next_sequence.wrapping_add(1);
        self.heap.push(entry);
    }

    /// Remove and return the lowest-cost item.
    pub fn pop(&mut self) -> Option<D> {
        self.heap.pop().map(|entry| entry.item)
    }

    /// Cost of the item `pop` would return next.
    pub fn peek_cost(&self) -> Option<u64> {
        self.heap.peek().map(|entry| entry.cost)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    /// Remove the `ceil(len * fraction)` cheapest items, returned in ascending cost order.
    ///
    /// `fraction` is clamped to `[0, 1]`.
    pub fn take_share(&mut self, fraction: f64) -> Vec<D> {
        let fraction = fraction.clamp(0.0, 1.0);
        let count = (self.heap.len() as f64 * fraction).ceil() as usize;
        let mut share = Vec::with_capacity(count);
        while share.len() < count {
            match self.pop() {
                Some(item) => share.push(item),
                None => break,
            }
        }
        share
    }

    /// Empty the queue, yielding items in ascending cost order.
    pub fn drain_ascending(&mut self) -> impl Iterator<Item = D> + '_ {
        std::iter::from_fn(move || self.pop())
    }
}

impl<D: WorkItem> Default for CostQueue<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: WorkItem> Extend<D> for CostQueue<D> {
    fn extend<I: IntoIterator<Item = D>>(&mut self, iter: I) {
        for item in iter {
            self.push(item);
        }
    }
}

impl<D: WorkItem> FromIterator<D> for CostQueue<D> {
    fn from_iter<I: IntoIterator<Item = D>>(iter: I) -> Self {
        let mut queue = Self::new();
        queue.extend(iter);
        queue
    }
}

impl<D> std::fmt::Debug for CostQueue<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CostQueue")
            .field("len", &self.heap.len())
            .field("min_cost", &self.heap.peek().map(|entry| entry.cost))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Item {
        cost: u64,
        tag: &'static str,
        solution: bool,
    }

    fn item(cost: u64, tag: &'static str) -> Item {
        Item {
            cost,
            tag,
            solution: false,
        }
    }

    impl WorkItem for Item {
        fn cost(&self) -> u64 {
            self.cost
        }

        fn is_solution(&self) -> bool {
            self.solution
        }
    }

    #[test]
    fn test_pop_in_ascending_cost() {
        let mut queue: CostQueue<Item> = [7, 3, 9, 1, 3, 0]
            .into_iter()
            .map(|cost| item(cost, "x"))
            .collect();

        let mut popped = Vec::new();
        while let Some(next) = queue.pop() {
            popped.push(next.cost);
        }

        assert_eq!(popped, vec![0, 1, 3, 3, 7, 9]);
    }

    #[test]
    fn test_equal_costs_pop_fifo() {
        let mut queue = CostQueue::new();
        queue.push(item(5, "first"));
        queue.push(item(5, "second"));
        queue.push(item(2, "cheap"));
        queue.push(item(5, "third"));

        let tags: Vec<_> = queue.drain_ascending().map(|i| i.tag).collect();
        assert_eq!(tags, vec!["cheap", "first", "second", "third"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_take_share_rounds_up() {
        let mut queue: CostQueue<Item> = (0..5).map(|cost| item(cost, "x")).collect();

        // ceil(5 * 0.6) = 3
        let share = queue.take_share(0.6);
        assert_eq!(share.iter().map(|i| i.cost).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.peek_cost(), Some(3));

        // ceil(2 * 0.6) = 2, the whole remainder
        assert_eq!(queue.take_share(0.6).len(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_take_share_single_item_and_empty() {
        let mut queue = CostQueue::new();
        assert!(queue.take_share(0.6).is_empty());

        queue.push(item(4, "only"));
        assert_eq!(queue.take_share(0.6).len(), 1);

        queue.push(item(4, "again"));
        assert!(queue.take_share(0.0).is_empty());
        assert_eq!(queue.take_share(1.0).len(), 1);
    }

    #[test]
    fn test_shared_items_use_inner_cost() {
        let shared = Arc::new(Item {
            cost: 11,
            tag: "arc",
            solution: true,
        });
        assert_eq!(shared.cost(), 11);
        assert!(shared.is_solution());

        let mut queue = CostQueue::new();
        queue.push(Arc::clone(&shared));
        queue.push(Arc::new(item(2, "cheaper")));
        assert_eq!(queue.pop().map(|i| i.tag), Some("cheaper"));
        assert_eq!(Arc::strong_count(&shared), 2);
        queue.clear();
        assert_eq!(Arc::strong_count(&shared), 1);
    }
}
