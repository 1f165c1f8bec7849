/// Anything that can be ordered inside a [`PriorityQueue`].
pub trait Prioritized {
    fn priority(&self) -> i32;
}

/// A queue kept sorted on insertion: descending priority first, then FIFO.
#[derive(Debug, Clone)]
pub struct PriorityQueue<T> {
    items: Vec<T>,
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Prioritized> PriorityQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert after every element of equal-or-higher priority and before the
    /// first element of strictly lower priority.
    pub fn enqueue(&mut self, item: T) {
        let priority = item.priority();
        let index = self
            .items
            .iter()
            .position(|queued| queued.priority() < priority)
            .unwrap_or(self.items.len());
        self.items.insert(index, item);
    }

    /// Remove the first element matching `pred`. Returns whether one was found.
    pub fn remove_first<F>(&mut self, pred: F) -> bool
    where
        F: Fn(&T) -> bool,
    {
        match self.items.iter().position(pred) {
            Some(index) => {
                self.items.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: Prioritized + Clone> PriorityQueue<T> {
    /// Clone the queue contents so they can be invoked without holding a lock.
    pub fn snapshot(&self) -> Vec<T> {
        self.items.clone()
    }
}
