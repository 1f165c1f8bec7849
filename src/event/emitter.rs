use std::collections::HashMap;
use std::hash::Hash;

use super::priority_queue::{PriorityQueue, Prioritized};

/// Handler registry keyed by event, each key owning its own [`PriorityQueue`].
///
/// Dispatch goes through [`EventEmitter::snapshot`]: callers take the
/// handlers in queue order and invoke them after releasing the registry.
/// Nothing a handler does is caught here; stage-level guarding belongs to the
/// activation pipeline.
#[derive(Debug, Clone)]
pub struct EventEmitter<K, H> {
    queues: HashMap<K, PriorityQueue<H>>,
}

impl<K, H> Default for EventEmitter<K, H> {
    fn default() -> Self {
        Self {
            queues: HashMap::new(),
        }
    }
}

impl<K, H> EventEmitter<K, H>
where
    K: Eq + Hash,
    H: Prioritized + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&mut self, event: K, handler: H) {
        self.queues.entry(event).or_default().enqueue(handler);
    }

    /// Remove the first registration for which `same` returns true.
    pub fn off<F>(&mut self, event: &K, same: F) -> bool
    where
        F: Fn(&H) -> bool,
    {
        match self.queues.get_mut(event) {
            Some(queue) => queue.remove_first(same),
            None => false,
        }
    }

    pub fn handler_count(&self, event: &K) -> usize {
        self.queues.get(event).map_or(0, |q| q.len())
    }

    /// Handlers for `event` in priority-then-FIFO order, cloned so callers
    /// can invoke them without holding the registry lock.
    pub fn snapshot(&self, event: &K) -> Vec<H> {
        self.queues
            .get(event)
            .map(|q| q.snapshot())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone)]
    struct Listener {
        priority: i32,
        label: &'static str,
        f: Arc<dyn Fn(&mut Vec<String>, &str) + Send + Sync>,
    }

    impl Prioritized for Listener {
        fn priority(&self) -> i32 {
            self.priority
        }
    }

    fn listener(priority: i32, label: &'static str) -> Listener {
        Listener {
            priority,
            label,
            f: Arc::new(move |log: &mut Vec<String>, arg: &str| {
                log.push(format!("{}:{}", label, arg));
            }),
        }
    }

    #[test]
    fn test_snapshot_in_priority_order() {
        let mut emitter = EventEmitter::new();
        emitter.on("tick", listener(5, "first-5"));
        emitter.on("tick", listener(15, "fifteen"));
        emitter.on("tick", listener(5, "second-5"));
        emitter.on("tick", listener(26, "system"));
        emitter.on("other", listener(100, "other"));

        let mut log = Vec::new();
        for l in emitter.snapshot(&"tick") {
            (l.f)(&mut log, "go");
        }
        assert_eq!(
            log,
            vec!["system:go", "fifteen:go", "first-5:go", "second-5:go"]
        );
    }

    #[test]
    fn test_off_removes_first_identical_registration() {
        let mut emitter = EventEmitter::new();
        let shared = listener(10, "shared");
        emitter.on("e", shared.clone());
        emitter.on("e", listener(10, "other"));
        emitter.on("e", shared.clone());

        let same = |h: &Listener| Arc::ptr_eq(&h.f, &shared.f);
        assert!(emitter.off(&"e", same));
        let labels: Vec<&str> = emitter.snapshot(&"e").iter().map(|l| l.label).collect();
        assert_eq!(labels, vec!["other", "shared"]);

        assert!(emitter.off(&"e", same));
        assert!(!emitter.off(&"e", same));
        assert!(!emitter.off(&"missing", same));
        assert_eq!(emitter.handler_count(&"e"), 1);
    }

    #[test]
    fn test_snapshot_without_handlers_is_empty() {
        let emitter: EventEmitter<&str, Listener> = EventEmitter::new();
        assert!(emitter.snapshot(&"nothing").is_empty());
        assert_eq!(emitter.handler_count(&"nothing"), 0);
    }
}
