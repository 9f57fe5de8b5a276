//! Getter evaluation context
//!
//! While a getter body runs, every read through a reactive node must be
//! attributed to that getter so the engine knows what to invalidate later.
//! The attribution target lives on a thread-local stack of frames: entering
//! an evaluation pushes a frame, and reads consult the innermost one.
//!
//! # Implementation
//!
//! The stack nests (a getter may read another getter) and is maintained by
//! an RAII guard, so unwinding out of a panicking getter body still pops
//! its frame. Frames live in thread-local storage; getter evaluation never
//! crosses threads.

use std::cell::RefCell;

use crate::reactive::node::{NodeId, Reactive};
use crate::reactive::path::Path;

thread_local! {
    static FRAME_STACK: RefCell<Vec<Frame>> = RefCell::new(Vec::new());
}

/// One in-progress getter evaluation: the node that owns the getter slot
/// and the slot's path relative to that node.
#[derive(Clone)]
pub(crate) struct Frame {
    pub owner: Reactive,
    pub path: Path,
}

/// Guard that pops the evaluation frame when dropped.
pub(crate) struct EvalFrame {
    owner_id: NodeId,
}

impl EvalFrame {
    /// Push an evaluation frame for a getter slot.
    ///
    /// Panics if the same slot is already being evaluated further up the
    /// stack: a getter that (transitively) reads itself can never settle.
    pub fn enter(owner: Reactive, path: Path) -> EvalFrame {
        FRAME_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack
                .iter()
                .any(|f| f.owner.id() == owner.id() && f.path == path)
            {
                panic!("cyclic getter evaluation at {path}");
            }
            let owner_id = owner.id();
            stack.push(Frame { owner, path });
            EvalFrame { owner_id }
        })
    }
}

impl Drop for EvalFrame {
    fn drop(&mut self) {
        FRAME_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            // Verify frames unwind in stack order.
            if let Some(frame) = popped {
                debug_assert_eq!(
                    frame.owner.id(),
                    self.owner_id,
                    "evaluation frame mismatch: expected {:?}, got {:?}",
                    self.owner_id,
                    frame.owner.id()
                );
            }
        });
    }
}

/// Run `f` against the innermost frame, if a getter evaluation is in
/// progress on this thread.
pub(crate) fn with_current<R>(f: impl FnOnce(&Frame) -> R) -> Option<R> {
    FRAME_STACK.with(|stack| stack.borrow().last().map(f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::runtime::reactive;
    use crate::value::Value;

    fn new_node() -> Reactive {
        match reactive(Value::empty_object()) {
            Value::Node(n) => n,
            other => panic!("expected node, got {other:?}"),
        }
    }

    #[test]
    fn innermost_frame_wins() {
        let outer = new_node();
        let inner = new_node();

        assert!(with_current(|_| ()).is_none());

        {
            let _outer = EvalFrame::enter(outer.clone(), Path::root().key("a"));
            assert_eq!(
                with_current(|f| f.owner.id()),
                Some(outer.id())
            );

            {
                let _inner = EvalFrame::enter(inner.clone(), Path::root().key("b"));
                assert_eq!(
                    with_current(|f| f.owner.id()),
                    Some(inner.id())
                );
            }

            assert_eq!(
                with_current(|f| f.owner.id()),
                Some(outer.id())
            );
        }

        assert!(with_current(|_| ()).is_none());
    }

    #[test]
    #[should_panic(expected = "cyclic getter evaluation")]
    fn reentering_the_same_slot_panics() {
        let node = new_node();
        let path = Path::root().key("loop");
        let _a = EvalFrame::enter(node.clone(), path.clone());
        let _b = EvalFrame::enter(node, path);
    }
}
