//! Explicit traversal stack replacing recursive descent.
//!
//! One frame per open level of the document (stream, document, every open
//! mapping or sequence), so nesting depth is bounded by heap, not by the call stack.

use crate::codec::uint_max;
use crate::error::Error;
use crate::schema::{Field, SchemaKind, SchemaNode};
use crate::tree::Addr;

/// Frames are reserved this many at a time.
pub(crate) const STACK_CHUNK: usize = 16;

/// Placeholder node governing skip frames.
pub(crate) static IGNORE: SchemaNode = SchemaNode::ignore();

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Expect {
    Key,
    Value,
}

/// What to do with the value of the key just read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ValueAction {
    Read,
    /// Duplicate key, first occurrence wins.
    Skip,
    /// Duplicate key, release the earlier value and read this one.
    Replace,
}

#[derive(Debug)]
pub(crate) struct MappingState<'s> {
    pub(crate) fields: &'s [Field],
    pub(crate) expect: Expect,
    /// Field resolved from the last key.
    pub(crate) field: usize,
    /// Fields already populated in this mapping instance.
    pub(crate) seen: Vec<bool>,
    pub(crate) action: ValueAction,
}

#[derive(Debug)]
pub(crate) struct SequenceState<'s> {
    pub(crate) element: &'s SchemaNode,
    /// Bytes per element slot.
    pub(crate) stride: usize,
    /// Inline slot receiving the handle of the backing block (growable only).
    pub(crate) slot: Addr,
    /// Start of element storage; `None` until the first growable element.
    pub(crate) data: Option<Addr>,
    /// External counter and its width (growable only).
    pub(crate) count_field: Option<(Addr, usize)>,
    pub(crate) count: usize,
    pub(crate) min: usize,
    pub(crate) limit: usize,
}

#[derive(Debug)]
pub(crate) enum State<'s> {
    Start,
    InStream { loaded: bool },
    InDocument,
    InMapping(MappingState<'s>),
    InSequence(SequenceState<'s>),
    /// Skipping a subtree; `depth` counts open collections inside it.
    Ignoring { depth: usize },
}

impl State<'_> {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            State::Start => "START",
            State::InStream { .. } => "IN_STREAM",
            State::InDocument => "IN_DOCUMENT",
            State::InMapping(_) => "IN_MAPPING",
            State::InSequence(_) => "IN_SEQUENCE",
            State::Ignoring { .. } => "IGNORING",
        }
    }
}

#[derive(Debug)]
pub(crate) struct Frame<'s> {
    pub(crate) schema: &'s SchemaNode,
    pub(crate) base: Addr,
    pub(crate) state: State<'s>,
}

impl<'s> Frame<'s> {
    pub(crate) fn structural(schema: &'s SchemaNode, base: Addr, state: State<'s>) -> Self {
        Self { schema, base, state }
    }

    /// Frame for a mapping whose fields live at `base`.
    pub(crate) fn mapping(schema: &'s SchemaNode, base: Addr) -> Result<Self, Error> {
        let SchemaKind::Mapping(fields) = &schema.kind else {
            return Err(Error::internal("mapping frame for a non-mapping node"));
        };
        let mut seen = Vec::new();
        seen.try_reserve_exact(fields.len())
            .map_err(|_| Error::out_of_memory(fields.len()))?;
        seen.resize(fields.len(), false);
        Ok(Self {
            schema,
            base,
            state: State::InMapping(MappingState {
                fields,
                expect: Expect::Key,
                field: 0,
                seen,
                action: ValueAction::Read,
            }),
        })
    }

    /// Frame for a sequence.
    ///
    /// For a growable sequence `target` is the inline slot for the backing block
    /// handle and `container` is the enclosing mapping (home of the counter). For a
    /// fixed sequence `target` is where the elements start.
    pub(crate) fn sequence(
        schema: &'s SchemaNode,
        target: Addr,
        container: Addr,
    ) -> Result<Self, Error> {
        let state = match &schema.kind {
            SchemaKind::Sequence {
                element,
                count,
                min,
                max,
            } => {
                let capacity = usize::try_from(uint_max(count.width)).unwrap_or(usize::MAX);
                SequenceState {
                    element: element.as_ref(),
                    stride: element.slot_size(),
                    slot: target,
                    data: None,
                    count_field: Some((container.add(count.offset)?, count.width)),
                    count: 0,
                    min: *min,
                    limit: (*max).min(capacity),
                }
            }
            SchemaKind::FixedSequence { element, len } => SequenceState {
                element: element.as_ref(),
                stride: element.slot_size(),
                slot: target,
                data: Some(target),
                count_field: None,
                count: 0,
                min: 0,
                limit: *len,
            },
            _ => return Err(Error::internal("sequence frame for a non-sequence node")),
        };
        Ok(Self {
            schema,
            base: target,
            state: State::InSequence(state),
        })
    }

    pub(crate) fn ignoring(base: Addr) -> Self {
        Self {
            schema: &IGNORE,
            base,
            state: State::Ignoring { depth: 1 },
        }
    }
}

/// Growable stack of [`Frame`]s.
#[derive(Debug, Default)]
pub(crate) struct FrameStack<'s> {
    frames: Vec<Frame<'s>>,
}

impl<'s> FrameStack<'s> {
    pub(crate) fn new() -> Self {
        Self { frames: Vec::new() }
    }

    /// Push a frame, reserving another chunk when full. On allocation failure the
    /// existing frames are untouched.
    pub(crate) fn push(&mut self, frame: Frame<'s>) -> Result<(), Error> {
        if self.frames.len() == self.frames.capacity() {
            self.frames
                .try_reserve(STACK_CHUNK)
                .map_err(|_| Error::out_of_memory(STACK_CHUNK * std::mem::size_of::<Frame>()))?;
        }
        self.frames.push(frame);
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> Result<Frame<'s>, Error> {
        self.frames
            .pop()
            .ok_or_else(|| Error::internal("pop of an empty frame stack"))
    }

    pub(crate) fn top(&self) -> Result<&Frame<'s>, Error> {
        self.frames
            .last()
            .ok_or_else(|| Error::internal("empty frame stack"))
    }

    pub(crate) fn top_mut(&mut self) -> Result<&mut Frame<'s>, Error> {
        self.frames
            .last_mut()
            .ok_or_else(|| Error::internal("empty frame stack"))
    }

    pub(crate) fn len(&self) -> usize {
        self.frames.len()
    }

    /// Drop every open frame.
    pub(crate) fn clear(&mut self) {
        self.frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CountField;
    use crate::tree::ROOT;

    fn root() -> SchemaNode {
        SchemaNode::mapping(
            16,
            vec![
                Field::new("n", 0, SchemaNode::int(4)),
                Field::new("s", 8, SchemaNode::sequence(SchemaNode::int(2), CountField::new(4, 1))),
            ],
        )
    }

    #[test]
    fn pop_of_empty_stack_is_internal() {
        let mut stack = FrameStack::new();
        assert!(matches!(stack.pop(), Err(Error::Internal { .. })));
        assert!(stack.top().is_err());
    }

    #[test]
    fn push_grows_in_chunks() {
        let mut stack = FrameStack::new();
        for _ in 0..(STACK_CHUNK * 3 + 1) {
            stack.push(Frame::ignoring(Addr::block_start(ROOT))).unwrap();
        }
        assert_eq!(stack.len(), STACK_CHUNK * 3 + 1);
        assert!(stack.frames.capacity() >= stack.len());
        stack.clear();
        assert_eq!(stack.len(), 0);
    }

    #[test]
    fn mapping_frame_requires_mapping_node() {
        let int = SchemaNode::int(4);
        assert!(matches!(
            Frame::mapping(&int, Addr::block_start(ROOT)),
            Err(Error::Internal { .. })
        ));
        let schema = root();
        let frame = Frame::mapping(&schema, Addr::block_start(ROOT)).unwrap();
        let State::InMapping(m) = frame.state else {
            panic!("not a mapping frame")
        };
        assert_eq!(m.expect, Expect::Key);
        assert_eq!(m.seen, vec![false, false]);
    }

    #[test]
    fn growable_sequence_limit_respects_counter_width() {
        let schema = root();
        let SchemaKind::Mapping(fields) = &schema.kind else {
            unreachable!()
        };
        let seq = &fields[1].value;
        let frame = Frame::sequence(seq, Addr::new(ROOT, 8), Addr::block_start(ROOT)).unwrap();
        let State::InSequence(s) = frame.state else {
            panic!("not a sequence frame")
        };
        assert_eq!(s.limit, 255);
        assert_eq!(s.stride, 2);
        assert_eq!(s.count_field, Some((Addr::new(ROOT, 4), 1)));
        assert!(s.data.is_none());
    }
}
