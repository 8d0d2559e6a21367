//! Split an audio stream into multiple streams.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::error::Result;
use crate::module::{BoxedModule, Module};
use crate::sample::Sample;

/// Shared interior of a split: the source plus one queue per child.
///
/// The parent pulls exactly one source sample whenever a child with an empty
/// queue asks for more, and appends that sample to every attached child's
/// queue, so all children see the same sequence regardless of how unevenly
/// they are drained.
struct SplitterParent<'a, S: Sample> {
    source: BoxedModule<'a, S>,
    children: Vec<(usize, Rc<RefCell<VecDeque<S>>>)>,
    next_id: usize,
}

impl<'a, S: Sample> SplitterParent<'a, S> {
    /// Load one more sample into every child queue, if the source has one.
    fn feed_children(&mut self) -> Result<()> {
        let mut sample = S::ZERO;
        if self.source.next(&mut sample)? {
            for (_, queue) in &self.children {
                queue.borrow_mut().push_back(sample);
            }
        }
        Ok(())
    }

    fn attach(&mut self) -> (usize, Rc<RefCell<VecDeque<S>>>) {
        let id = self.next_id;
        self.next_id += 1;
        let queue = Rc::new(RefCell::new(VecDeque::new()));
        self.children.push((id, Rc::clone(&queue)));
        (id, queue)
    }

    fn detach(&mut self, id: usize) {
        self.children.retain(|(child_id, _)| *child_id != id);
    }
}

/// One stream of a split source.
///
/// Extra streams over the same source are created with [`Splitter::split`].
/// The source is owned by the split's shared interior and is released when
/// the last sibling is dropped. Streams created mid-flight only see samples
/// produced from that point on; there is no back-fill.
pub struct Splitter<'a, S: Sample> {
    parent: Rc<RefCell<SplitterParent<'a, S>>>,
    id: usize,
    queue: Rc<RefCell<VecDeque<S>>>,
}

impl<'a, S: Sample> Splitter<'a, S> {
    /// Take ownership of a source and open the first stream over it.
    pub fn new(source: BoxedModule<'a, S>) -> Self {
        let parent = Rc::new(RefCell::new(SplitterParent {
            source,
            children: Vec::new(),
            next_id: 0,
        }));
        let (id, queue) = parent.borrow_mut().attach();
        Self { parent, id, queue }
    }

    /// Split off another stream sharing the same source.
    pub fn split(&self) -> Splitter<'a, S> {
        let parent = Rc::clone(&self.parent);
        let (id, queue) = parent.borrow_mut().attach();
        Splitter { parent, id, queue }
    }
}

impl<'a, S: Sample> Drop for Splitter<'a, S> {
    fn drop(&mut self) {
        self.parent.borrow_mut().detach(self.id);
    }
}

impl<'a, S: Sample> Module<S> for Splitter<'a, S> {
    fn next(&mut self, out: &mut S) -> Result<bool> {
        if self.queue.borrow().is_empty() {
            self.parent.borrow_mut().feed_children()?;
        }
        match self.queue.borrow_mut().pop_front() {
            Some(sample) => {
                *out = sample;
                Ok(true)
            }
            None => {
                *out = S::ZERO;
                Ok(false)
            }
        }
    }

    fn is_running(&mut self) -> bool {
        !self.queue.borrow().is_empty() || self.parent.borrow_mut().source.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Mono;

    struct Counter {
        produced: u32,
        limit: u32,
    }

    impl Module<Mono> for Counter {
        fn next(&mut self, out: &mut Mono) -> Result<bool> {
            if self.produced >= self.limit {
                *out = 0.0;
                return Ok(false);
            }
            self.produced += 1;
            *out = self.produced as f32;
            Ok(true)
        }

        fn is_running(&mut self) -> bool {
            self.produced < self.limit
        }
    }

    fn counter(limit: u32) -> BoxedModule<'static, Mono> {
        Box::new(Counter { produced: 0, limit })
    }

    fn pull(splitter: &mut Splitter<'_, Mono>, count: usize) -> Vec<f32> {
        let mut output = Vec::new();
        let mut s = 0.0;
        for _ in 0..count {
            if !splitter.next(&mut s).unwrap() {
                break;
            }
            output.push(s);
        }
        output
    }

    #[test]
    fn children_see_identical_sequences() {
        let mut a = Splitter::new(counter(5));
        let mut b = a.split();
        let mut c = a.split();

        // Drain the children in different patterns.
        assert_eq!(pull(&mut a, 5), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(pull(&mut b, 2), vec![1.0, 2.0]);
        assert_eq!(pull(&mut c, 5), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(pull(&mut b, 3), vec![3.0, 4.0, 5.0]);

        let mut s = 0.0;
        assert!(!a.next(&mut s).unwrap());
        assert!(!b.next(&mut s).unwrap());
        assert!(!c.next(&mut s).unwrap());
    }

    #[test]
    fn each_source_sample_is_produced_once() {
        let mut a = Splitter::new(counter(3));
        let mut b = a.split();

        // Alternate pulls; the source must advance exactly once per step.
        let mut s = 0.0;
        a.next(&mut s).unwrap();
        assert_eq!(s, 1.0);
        b.next(&mut s).unwrap();
        assert_eq!(s, 1.0);
        b.next(&mut s).unwrap();
        assert_eq!(s, 2.0);
        a.next(&mut s).unwrap();
        assert_eq!(s, 2.0);
    }

    #[test]
    fn late_children_receive_no_backfill() {
        let mut a = Splitter::new(counter(4));
        assert_eq!(pull(&mut a, 2), vec![1.0, 2.0]);

        let mut late = a.split();
        assert_eq!(pull(&mut late, 10), vec![3.0, 4.0]);
        assert_eq!(pull(&mut a, 10), vec![3.0, 4.0]);
    }

    #[test]
    fn dropping_a_child_leaves_siblings_running() {
        let mut a = Splitter::new(counter(4));
        let b = a.split();
        assert_eq!(pull(&mut a, 1), vec![1.0]);
        drop(b);
        assert_eq!(pull(&mut a, 10), vec![2.0, 3.0, 4.0]);
        assert!(!a.is_running());
    }

    #[test]
    fn is_running_tracks_buffer_and_source() {
        let mut a = Splitter::new(counter(1));
        let mut b = a.split();
        assert!(a.is_running());
        assert_eq!(pull(&mut a, 1), vec![1.0]);

        // The source is exhausted, but b still has its buffered copy.
        assert!(!a.is_running());
        assert!(b.is_running());
        assert_eq!(pull(&mut b, 1), vec![1.0]);
        assert!(!b.is_running());
    }
}
