//! Load engine: an iterative state machine over the frame stack.
//!
//! Each step pulls exactly one event, masked by what the top frame can accept,
//! and then updates that frame, pushes a child or pops. Nothing here recurses, so
//! document depth only costs heap. Any error aborts the loop; [`load`] then drops
//! the open frames and releases the partial tree before returning.

use log::Level;

use crate::alloc::{alloc_indirect, indirect_size, reserve_element};
use crate::codec::read_scalar;
use crate::error::Error;
use crate::events::{Ev, EventKind, EventMask, EventSource};
use crate::free::{free_tree, release_value};
use crate::location::Location;
use crate::options::{DuplicateKeyPolicy, Options};
use crate::schema::{resolve_key, Field, SchemaKind, SchemaNode};
use crate::stack::{Expect, Frame, FrameStack, State, ValueAction};
use crate::tree::{Addr, DestinationTree, ROOT};

/// Which handler the top frame needs.
#[derive(Clone, Copy, Debug)]
enum Step {
    Start,
    Stream { loaded: bool },
    Document,
    MappingKey,
    MappingValue,
    Sequence,
    Ignoring,
}

struct LoadContext<'s, 'a> {
    options: &'s Options,
    source: EventSource<'a>,
    stack: FrameStack<'s>,
    tree: DestinationTree,
}

/// Reject a schema that cannot drive a load, before any input is touched.
pub(crate) fn check_schema(options: &Options, schema: &SchemaNode) -> Result<(), Error> {
    if !matches!(schema.kind, SchemaKind::Mapping(_)) {
        diag!(
            options,
            Level::Error,
            "Load: top level schema must be a mapping, found {}",
            schema.kind_name()
        );
        return Err(Error::TopLevelType {
            found: schema.kind_name(),
            location: Location::UNKNOWN,
        });
    }
    schema.validate().inspect_err(|err| {
        diag!(options, Level::Error, "Load: {err}");
    })
}

/// Load one document from `source` into a new tree shaped by `schema`.
/// The root mapping is stored in block 0 whether or not its schema is indirect.
pub(crate) fn load(
    options: &Options,
    schema: &SchemaNode,
    source: EventSource<'_>,
) -> Result<DestinationTree, Error> {
    check_schema(options, schema)?;
    let tree = DestinationTree::with_root(schema.size)?;
    let mut ctx = LoadContext {
        options,
        source,
        stack: FrameStack::new(),
        tree,
    };
    match ctx.run(schema) {
        Ok(()) => Ok(ctx.tree),
        Err(err) => {
            let err = if err.location().is_some() {
                err
            } else {
                err.with_location(ctx.source.last_location())
            };
            diag!(options, Level::Error, "Load failed: {err}");
            ctx.stack.clear();
            free_tree(options, schema, &mut ctx.tree);
            debug_assert_eq!(ctx.tree.live_blocks(), 0, "failed load leaked blocks");
            Err(err)
        }
    }
}

impl<'s> LoadContext<'s, '_> {
    fn run(&mut self, schema: &'s SchemaNode) -> Result<(), Error> {
        self.push(Frame::structural(schema, Addr::block_start(ROOT), State::Start))?;
        loop {
            self.step()?;
            if matches!(self.stack.top()?.state, State::Start) {
                break;
            }
        }
        self.pop()?;
        self.source.finish();
        Ok(())
    }

    fn step(&mut self) -> Result<(), Error> {
        let step = match &self.stack.top()?.state {
            State::Start => Step::Start,
            State::InStream { loaded } => Step::Stream { loaded: *loaded },
            State::InDocument => Step::Document,
            State::InMapping(m) => match m.expect {
                Expect::Key => Step::MappingKey,
                Expect::Value => Step::MappingValue,
            },
            State::InSequence(_) => Step::Sequence,
            State::Ignoring { .. } => Step::Ignoring,
        };
        match step {
            Step::Start => self.on_start(),
            Step::Stream { loaded } => self.on_stream(loaded),
            Step::Document => self.on_document(),
            Step::MappingKey => self.on_mapping_key(),
            Step::MappingValue => self.on_mapping_value(),
            Step::Sequence => self.on_sequence(),
            Step::Ignoring => self.on_ignoring(),
        }
    }

    fn push(&mut self, frame: Frame<'s>) -> Result<(), Error> {
        diag!(
            self.options,
            Level::Debug,
            "PUSH[{}]: {} ({})",
            self.stack.len(),
            frame.state.name(),
            frame.schema.kind_name()
        );
        self.stack.push(frame)
    }

    fn pop(&mut self) -> Result<(), Error> {
        let frame = self.stack.pop()?;
        diag!(
            self.options,
            Level::Debug,
            "POP[{}]: {}",
            self.stack.len(),
            frame.state.name()
        );
        Ok(())
    }

    /// Push a structural frame sharing the top frame's schema and base.
    fn push_structural(&mut self, state: State<'s>) -> Result<(), Error> {
        let top = self.stack.top()?;
        let frame = Frame::structural(top.schema, top.base, state);
        self.push(frame)
    }

    fn on_start(&mut self) -> Result<(), Error> {
        self.source.next(EventMask::STREAM_START)?;
        self.push_structural(State::InStream { loaded: false })
    }

    fn on_stream(&mut self, loaded: bool) -> Result<(), Error> {
        // One document per load: once it is in, only the end of the stream may follow.
        let mask = if loaded {
            EventMask::STREAM_END
        } else {
            EventMask::DOCUMENT_START | EventMask::STREAM_END
        };
        let ev = self.source.next(mask)?;
        match ev.kind {
            EventKind::DocumentStart => {
                self.stack.top_mut()?.state = State::InStream { loaded: true };
                self.push_structural(State::InDocument)
            }
            EventKind::StreamEnd => self.pop(),
            _ => Err(Error::internal("stream event outside mask")),
        }
    }

    fn on_document(&mut self) -> Result<(), Error> {
        let mask = EventMask::MAPPING_START
            | EventMask::DOCUMENT_END
            | EventMask::SCALAR
            | EventMask::SEQUENCE_START;
        let ev = self.source.next(mask)?;
        match ev.kind {
            EventKind::MappingStart => {
                let top = self.stack.top()?;
                let frame = Frame::mapping(top.schema, top.base)?;
                self.push(frame)
            }
            EventKind::DocumentEnd => self.pop(),
            EventKind::Scalar | EventKind::SequenceStart => Err(Error::TopLevelType {
                found: ev.kind.name(),
                location: ev.location,
            }),
            _ => Err(Error::internal("document event outside mask")),
        }
    }

    fn on_mapping_key(&mut self) -> Result<(), Error> {
        let ev = self.source.next(EventMask::SCALAR | EventMask::MAPPING_END)?;
        if ev.kind == EventKind::MappingEnd {
            return self.pop();
        }
        let policy = self.options.duplicate_keys;
        let frame = self.stack.top_mut()?;
        let State::InMapping(m) = &mut frame.state else {
            return Err(Error::internal("key outside a mapping"));
        };
        let index = resolve_key(m.fields, &ev.value)
            .ok_or_else(|| Error::invalid_key(ev.value.as_str()).with_location(ev.location))?;
        let action = if !m.seen[index] {
            ValueAction::Read
        } else {
            match policy {
                DuplicateKeyPolicy::Error => {
                    return Err(Error::DuplicateKey {
                        key: ev.value,
                        location: ev.location,
                    });
                }
                DuplicateKeyPolicy::FirstWins => ValueAction::Skip,
                DuplicateKeyPolicy::LastWins => ValueAction::Replace,
            }
        };
        m.seen[index] = true;
        m.field = index;
        m.action = action;
        m.expect = Expect::Value;
        diag!(self.options, Level::Info, "[{}]:", ev.value);
        Ok(())
    }

    fn on_mapping_value(&mut self) -> Result<(), Error> {
        let ev = self.source.next(EventMask::VALUE)?;
        let frame = self.stack.top_mut()?;
        let base = frame.base;
        let State::InMapping(m) = &mut frame.state else {
            return Err(Error::internal("value outside a mapping"));
        };
        // Flip first: the value may push frames and move this one.
        m.expect = Expect::Key;
        let action = m.action;
        let fields: &'s [Field] = m.fields;
        let field = fields
            .get(m.field)
            .ok_or_else(|| Error::internal("resolved field index out of range"))?;
        let slot = base.add(field.offset)?;
        match action {
            ValueAction::Read => self.read_value(&field.value, slot, base, ev),
            ValueAction::Skip => {
                diag!(self.options, Level::Info, "  <duplicate {} ignored>", field.key);
                self.skip_value(&ev, slot)
            }
            ValueAction::Replace => {
                release_value(self.options, &mut self.tree, &field.value, slot, base)?;
                self.read_value(&field.value, slot, base, ev)
            }
        }
    }

    fn on_sequence(&mut self) -> Result<(), Error> {
        let ev = self.source.next(EventMask::VALUE | EventMask::SEQUENCE_END)?;
        let frame = self.stack.top_mut()?;
        let State::InSequence(seq) = &mut frame.state else {
            return Err(Error::internal("entry outside a sequence"));
        };
        if ev.kind == EventKind::SequenceEnd {
            if seq.count < seq.min {
                return Err(Error::invalid_value(format!(
                    "sequence has {} entries, at least {} required",
                    seq.count, seq.min
                ))
                .with_location(ev.location));
            }
            diag!(self.options, Level::Debug, "SEQ: {} entries", seq.count);
            return self.pop();
        }
        if seq.count >= seq.limit {
            return Err(Error::invalid_value(format!(
                "sequence has more than {} entries",
                seq.limit
            ))
            .with_location(ev.location));
        }
        let at = reserve_element(&mut self.tree, seq)?;
        seq.count += 1;
        // Counter first, so it never runs ahead of the elements actually present.
        if let Some((count_at, width)) = seq.count_field {
            self.tree.write_uint(count_at, seq.count as u64, width)?;
        }
        let element = seq.element;
        diag!(self.options, Level::Debug, "SEQ: entry {}", seq.count);
        self.read_value(element, at, at, ev)
    }

    fn on_ignoring(&mut self) -> Result<(), Error> {
        let ev = self
            .source
            .next(EventMask::VALUE | EventMask::SEQUENCE_END | EventMask::MAPPING_END)?;
        let frame = self.stack.top_mut()?;
        let State::Ignoring { depth } = &mut frame.state else {
            return Err(Error::internal("skip step outside an ignored value"));
        };
        match ev.kind {
            EventKind::Scalar => Ok(()),
            EventKind::SequenceStart | EventKind::MappingStart => {
                *depth += 1;
                Ok(())
            }
            _ => {
                *depth -= 1;
                if *depth == 0 { self.pop() } else { Ok(()) }
            }
        }
    }

    /// Consume a value without storing anything.
    fn skip_value(&mut self, ev: &Ev, base: Addr) -> Result<(), Error> {
        match ev.kind {
            EventKind::Scalar => Ok(()),
            _ => self.push(Frame::ignoring(base)),
        }
    }

    /// Store the value that starts with `ev` as described by `node`.
    ///
    /// `slot` is where the value (or its block handle) goes; `container` is the
    /// enclosing mapping, home of a growable sequence's counter.
    fn read_value(
        &mut self,
        node: &'s SchemaNode,
        slot: Addr,
        container: Addr,
        ev: Ev,
    ) -> Result<(), Error> {
        if let SchemaKind::Ignore = node.kind {
            return self.skip_value(&ev, slot);
        }
        let wanted = match node.kind {
            SchemaKind::Mapping(_) => EventKind::MappingStart,
            SchemaKind::Sequence { .. } | SchemaKind::FixedSequence { .. } => {
                EventKind::SequenceStart
            }
            _ => EventKind::Scalar,
        };
        if ev.kind != wanted {
            return Err(Error::invalid_value(format!(
                "expected {wanted} for {}, found {}",
                node.kind_name(),
                ev.kind
            ))
            .with_location(ev.location));
        }

        // Growable sequences allocate per element instead.
        let target = if node.indirect && !node.is_growable_sequence() {
            let size = indirect_size(node, &ev.value)?;
            alloc_indirect(&mut self.tree, slot, size)?
        } else {
            slot
        };

        match node.kind {
            SchemaKind::Mapping(_) => self.push(Frame::mapping(node, target)?),
            SchemaKind::Sequence { .. } | SchemaKind::FixedSequence { .. } => {
                self.push(Frame::sequence(node, target, container)?)
            }
            _ => {
                diag!(self.options, Level::Info, "  <{}>", ev.value);
                read_scalar(
                    self.options,
                    node,
                    &ev.value,
                    ev.tag.as_deref(),
                    &mut self.tree,
                    target,
                )
                .map_err(|err| err.with_location(ev.location))
            }
        }
    }
}
