//! First-in first-out queue used for a flow's steps and events
//!
//! A thin wrapper over [`VecDeque`] that exposes exactly the operations the
//! scheduler needs. Both queues of a [`FlowState`](crate::FlowState) are
//! instances of this type.

use std::collections::vec_deque::{self, VecDeque};
use std::fmt;

/// Ordered FIFO container
///
/// `enqueue` appends to the tail, `dequeue` removes from the head. Iteration
/// walks the current contents head to tail and can be restarted any number
/// of times by calling [`iter`](Self::iter) again.
///
/// # Example
///
/// ```
/// use chatflow::FifoQueue;
///
/// let mut queue = FifoQueue::new();
/// queue.enqueue("a");
/// queue.enqueue("b");
///
/// assert_eq!(queue.peek_first(), Some(&"a"));
/// assert_eq!(queue.dequeue(), Some("a"));
/// assert_eq!(queue.len(), 1);
/// ```
pub struct FifoQueue<T> {
    items: VecDeque<T>,
}

impl<T> FifoQueue<T> {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    /// Create a queue holding `items` in iteration order
    pub fn with_items(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            items: items.into_iter().collect(),
        }
    }

    /// Append an element to the tail
    pub fn enqueue(&mut self, item: T) {
        self.items.push_back(item);
    }

    /// Remove and return the head, or `None` when empty
    pub fn dequeue(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// Borrow the head without removing it
    pub fn peek_first(&self) -> Option<&T> {
        self.items.front()
    }

    /// Number of queued elements
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Alias of [`len`](Self::len)
    pub fn size(&self) -> usize {
        self.len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Remove every element
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Iterate over the current contents in FIFO order
    pub fn iter(&self) -> vec_deque::Iter<'_, T> {
        self.items.iter()
    }
}

impl<T> Default for FifoQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for FifoQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.items.iter()).finish()
    }
}

impl<T> FromIterator<T> for FifoQueue<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::with_items(iter)
    }
}

impl<T> Extend<T> for FifoQueue<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.items.extend(iter);
    }
}

impl<'a, T> IntoIterator for &'a FifoQueue<T> {
    type Item = &'a T;
    type IntoIter = vec_deque::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T> IntoIterator for FifoQueue<T> {
    type Item = T;
    type IntoIter = vec_deque::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut queue = FifoQueue::new();
        queue.enqueue(1);
        queue.enqueue(2);
        queue.enqueue(3);

        assert_eq!(queue.dequeue(), Some(1));
        assert_eq!(queue.dequeue(), Some(2));
        assert_eq!(queue.dequeue(), Some(3));
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn test_peek_does_not_remove() {
        let mut queue = FifoQueue::with_items(["head", "tail"]);

        assert_eq!(queue.peek_first(), Some(&"head"));
        assert_eq!(queue.peek_first(), Some(&"head"));
        assert_eq!(queue.len(), 2);

        queue.dequeue();
        assert_eq!(queue.peek_first(), Some(&"tail"));
    }

    #[test]
    fn test_empty_queue() {
        let mut queue: FifoQueue<u8> = FifoQueue::default();

        assert!(queue.is_empty());
        assert_eq!(queue.size(), 0);
        assert_eq!(queue.peek_first(), None);
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn test_clear() {
        let mut queue: FifoQueue<_> = (0..5).collect();
        assert_eq!(queue.len(), 5);

        queue.clear();
        assert!(queue.is_empty());

        // Still usable after clearing
        queue.enqueue(42);
        assert_eq!(queue.peek_first(), Some(&42));
    }

    #[test]
    fn test_iteration_is_restartable() {
        let mut queue = FifoQueue::new();
        queue.extend(["x", "y", "z"]);

        let first: Vec<_> = queue.iter().copied().collect();
        let second: Vec<_> = (&queue).into_iter().copied().collect();

        assert_eq!(first, vec!["x", "y", "z"]);
        assert_eq!(first, second);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_iteration_reflects_current_contents() {
        let mut queue = FifoQueue::with_items([1, 2, 3]);
        queue.dequeue();
        queue.enqueue(4);

        let items: Vec<_> = queue.into_iter().collect();
        assert_eq!(items, vec![2, 3, 4]);
    }

    #[test]
    fn test_debug_lists_items() {
        let queue = FifoQueue::with_items(["a", "b"]);
        assert_eq!(format!("{:?}", queue), r#"["a", "b"]"#);
    }
}
