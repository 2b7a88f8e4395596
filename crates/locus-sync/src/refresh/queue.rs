//! Priority queue of pending tasks.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use super::task::{Priority, TaskId};

#[derive(Debug, PartialEq, Eq)]
struct Queued {
    priority: Priority,
    seq: Reverse<u64>,
    id: TaskId,
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Max-heap on priority, FIFO within a priority.
///
/// Removal is lazy: upgrading a task pushes it again, and the caller skips
/// popped items that no longer match the task.
#[derive(Debug, Default)]
pub(crate) struct TaskQueue {
    heap: BinaryHeap<Queued>,
    seq: u64,
}

impl TaskQueue {
    pub fn push(&mut self, id: TaskId, priority: Priority) {
        self.seq += 1;
        self.heap.push(Queued {
            priority,
            seq: Reverse(self.seq),
            id,
        });
    }

    pub fn pop(&mut self) -> Option<(TaskId, Priority)> {
        self.heap.pop().map(|q| (q.id, q.priority))
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_then_fifo() {
        let mut queue = TaskQueue::default();
        let ids: Vec<TaskId> = (0..4).map(|_| TaskId::new()).collect();

        queue.push(ids[0], Priority::Background);
        queue.push(ids[1], Priority::Normal);
        queue.push(ids[2], Priority::Critical);
        queue.push(ids[3], Priority::Normal);

        assert_eq!(queue.len(), 4);
        assert_eq!(queue.pop(), Some((ids[2], Priority::Critical)));
        assert_eq!(queue.pop(), Some((ids[1], Priority::Normal)));
        assert_eq!(queue.pop(), Some((ids[3], Priority::Normal)));
        assert_eq!(queue.pop(), Some((ids[0], Priority::Background)));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_clear() {
        let mut queue = TaskQueue::default();
        queue.push(TaskId::new(), Priority::Normal);
        queue.clear();
        assert_eq!(queue.pop(), None);
    }
}
