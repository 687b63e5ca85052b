//!
//! Event source: a masked, pull-based layer over `saphyr_parser::Parser`.
//!
//! Responsibilities
//! - Pull one raw event at a time and translate it into an owned [`Ev`].
//! - Reject events the caller's [`EventMask`] does not allow, naming what was
//!   seen and what was expected.
//! - Report aliases as unsupported wherever they occur, before the mask check.
//! - Enforce the optional [`Budget`] on every raw event.
//! - Surface I/O failures parked by the reader input.
//!
//! Locations
//! - Each `Ev` carries the location of its raw event. The last one is kept for
//!   end-of-input errors.

use std::borrow::Cow;
use std::fmt;
use std::ops::BitOr;

use log::{Level, LevelFilter};
use saphyr_parser::{Event, Parser, ScanError, Span};

use crate::budget::{BudgetMeter, BudgetReport};
use crate::error::Error;
use crate::location::{location_from_span, Location};
use crate::options::Options;

#[cfg(feature = "reader")]
use crate::buffered_input::{reader_input, IoErrorCell};

/// Structural event kinds the engine distinguishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum EventKind {
    StreamStart,
    StreamEnd,
    DocumentStart,
    DocumentEnd,
    Alias,
    Scalar,
    SequenceStart,
    SequenceEnd,
    MappingStart,
    MappingEnd,
}

const ALL_KINDS: [EventKind; 10] = [
    EventKind::StreamStart,
    EventKind::StreamEnd,
    EventKind::DocumentStart,
    EventKind::DocumentEnd,
    EventKind::Alias,
    EventKind::Scalar,
    EventKind::SequenceStart,
    EventKind::SequenceEnd,
    EventKind::MappingStart,
    EventKind::MappingEnd,
];

impl EventKind {
    pub(crate) fn name(self) -> &'static str {
        match self {
            EventKind::StreamStart => "STREAM_START",
            EventKind::StreamEnd => "STREAM_END",
            EventKind::DocumentStart => "DOC_START",
            EventKind::DocumentEnd => "DOC_END",
            EventKind::Alias => "ALIAS",
            EventKind::Scalar => "SCALAR",
            EventKind::SequenceStart => "SEQ_START",
            EventKind::SequenceEnd => "SEQ_END",
            EventKind::MappingStart => "MAPPING_START",
            EventKind::MappingEnd => "MAPPING_END",
        }
    }

    const fn bit(self) -> u16 {
        1 << self as u16
    }

    fn of(raw: &Event<'_>) -> Option<Self> {
        Some(match raw {
            Event::StreamStart => EventKind::StreamStart,
            Event::StreamEnd => EventKind::StreamEnd,
            Event::DocumentStart(_) => EventKind::DocumentStart,
            Event::DocumentEnd => EventKind::DocumentEnd,
            Event::Alias(_) => EventKind::Alias,
            Event::Scalar(..) => EventKind::Scalar,
            Event::SequenceStart(..) => EventKind::SequenceStart,
            Event::SequenceEnd => EventKind::SequenceEnd,
            Event::MappingStart(..) => EventKind::MappingStart,
            Event::MappingEnd => EventKind::MappingEnd,
            Event::Nothing => return None,
        })
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Set of event kinds acceptable in the current state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct EventMask(u16);

impl EventMask {
    pub(crate) const STREAM_START: Self = Self(EventKind::StreamStart.bit());
    pub(crate) const STREAM_END: Self = Self(EventKind::StreamEnd.bit());
    pub(crate) const DOCUMENT_START: Self = Self(EventKind::DocumentStart.bit());
    pub(crate) const DOCUMENT_END: Self = Self(EventKind::DocumentEnd.bit());
    pub(crate) const SCALAR: Self = Self(EventKind::Scalar.bit());
    pub(crate) const SEQUENCE_START: Self = Self(EventKind::SequenceStart.bit());
    pub(crate) const SEQUENCE_END: Self = Self(EventKind::SequenceEnd.bit());
    pub(crate) const MAPPING_START: Self = Self(EventKind::MappingStart.bit());
    pub(crate) const MAPPING_END: Self = Self(EventKind::MappingEnd.bit());

    /// Anything that can start a value.
    pub(crate) const VALUE: Self =
        Self(Self::SCALAR.0 | Self::SEQUENCE_START.0 | Self::MAPPING_START.0);

    pub(crate) fn contains(self, kind: EventKind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// Human readable list of the kinds in the mask, e.g. `SCALAR or MAPPING_END`.
    pub(crate) fn describe(self) -> String {
        ALL_KINDS
            .iter()
            .filter(|k| self.contains(**k))
            .map(|k| k.name())
            .collect::<Vec<_>>()
            .join(" or ")
    }
}

impl BitOr for EventMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// One accepted event. `value` and `tag` are only set for scalars.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Ev {
    pub(crate) kind: EventKind,
    pub(crate) value: String,
    pub(crate) tag: Option<String>,
    pub(crate) location: Location,
}

type RawEvents<'a> = Box<dyn Iterator<Item = Result<(Event<'a>, Span), ScanError>> + 'a>;

/// Pull-based event source over a string or a reader.
pub(crate) struct EventSource<'a> {
    events: RawEvents<'a>,
    budget: Option<BudgetMeter>,
    budget_report: Option<fn(&BudgetReport)>,
    /// Read by `diag!`.
    log_level: LevelFilter,
    last_location: Location,
    #[cfg(feature = "reader")]
    io_error: Option<IoErrorCell>,
}

impl<'a> EventSource<'a> {
    fn with_events(events: RawEvents<'a>, options: &Options) -> Self {
        Self {
            events,
            budget: options.budget.clone().map(BudgetMeter::new),
            budget_report: options.budget_report,
            log_level: options.log_level,
            last_location: Location::UNKNOWN,
            #[cfg(feature = "reader")]
            io_error: None,
        }
    }

    /// Source over an in-memory document.
    pub(crate) fn for_str(input: &'a str, options: &Options) -> Self {
        Self::with_events(Box::new(Parser::new_from_str(input)), options)
    }

    /// Source over a reader, decoded incrementally.
    #[cfg(feature = "reader")]
    pub(crate) fn for_reader<R: std::io::Read + 'a>(reader: R, options: &Options) -> Self {
        let (input, cell) = reader_input(reader, options.input_limit);
        // Reader parsers yield `Event<'static>`; narrow each item to `'a`.
        let events = Parser::new(input)
            .map(|item| -> Result<(Event<'a>, Span), ScanError> { item });
        let mut source = Self::with_events(Box::new(events), options);
        source.io_error = Some(cell);
        source
    }

    #[cfg(feature = "reader")]
    fn take_io_error(&mut self) -> Option<Error> {
        let cause = self.io_error.as_ref()?.borrow_mut().take()?;
        Some(Error::Io { cause })
    }

    #[cfg(not(feature = "reader"))]
    fn take_io_error(&mut self) -> Option<Error> {
        None
    }

    pub(crate) fn last_location(&self) -> Location {
        self.last_location
    }

    /// Pull the next event, which must be one of `mask`.
    pub(crate) fn next(&mut self, mask: EventMask) -> Result<Ev, Error> {
        loop {
            let item = self.events.next();
            if let Some(err) = self.take_io_error() {
                return Err(err);
            }
            let (raw, span) = match item {
                Some(Ok(pair)) => pair,
                Some(Err(err)) => return Err(Error::from_scan_error(err)),
                None => {
                    return Err(Error::Eof {
                        location: self.last_location,
                    });
                }
            };
            let location = location_from_span(&span);
            self.last_location = location;

            if let Some(budget) = self.budget.as_mut() {
                budget
                    .observe(&raw)
                    .map_err(|breach| Error::Budget { breach, location })?;
            }

            let Some(kind) = EventKind::of(&raw) else {
                continue;
            };
            diag!(self, Level::Debug, "EVENT: {kind} at {}:{}", location.line, location.column);

            if kind == EventKind::Alias {
                return Err(Error::AliasUnsupported { location });
            }
            if !mask.contains(kind) {
                return Err(Error::UnexpectedEvent {
                    found: kind.name(),
                    expected: mask.describe(),
                    location,
                });
            }

            let (value, tag) = match raw {
                Event::Scalar(value, _style, _anchor, tag) => {
                    let value = match value {
                        Cow::Borrowed(v) => v.to_owned(),
                        Cow::Owned(v) => v,
                    };
                    (value, tag.map(|t| t.to_string()))
                }
                _ => (String::new(), None),
            };
            return Ok(Ev {
                kind,
                value,
                tag,
                location,
            });
        }
    }

    /// End of a successful load: hand the budget report to the callback.
    pub(crate) fn finish(&mut self) {
        if let (Some(meter), Some(callback)) = (self.budget.take(), self.budget_report) {
            callback(&meter.finish());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::{Budget, BudgetBreach};

    fn kinds(input: &str) -> Vec<EventKind> {
        let options = Options::default();
        let mut src = EventSource::for_str(input, &options);
        let all = EventMask(u16::MAX);
        let mut out = Vec::new();
        loop {
            let ev = src.next(all).unwrap();
            out.push(ev.kind);
            if ev.kind == EventKind::StreamEnd {
                return out;
            }
        }
    }

    #[test]
    fn flow_mapping_events() {
        use EventKind::*;
        assert_eq!(
            kinds("{a: [1]}"),
            [
                StreamStart,
                DocumentStart,
                MappingStart,
                Scalar,
                SequenceStart,
                Scalar,
                SequenceEnd,
                MappingEnd,
                DocumentEnd,
                StreamEnd
            ]
        );
    }

    #[test]
    fn mask_describes_expected_kinds() {
        let mask = EventMask::SCALAR | EventMask::MAPPING_END;
        assert_eq!(mask.describe(), "SCALAR or MAPPING_END");
        assert!(mask.contains(EventKind::Scalar));
        assert!(!mask.contains(EventKind::SequenceStart));
    }

    #[test]
    fn unexpected_event_names_what_was_seen() {
        let options = Options::default();
        let mut src = EventSource::for_str("a: 1", &options);
        let err = src.next(EventMask::STREAM_END).unwrap_err();
        match err {
            Error::UnexpectedEvent { found, expected, .. } => {
                assert_eq!(found, "STREAM_START");
                assert_eq!(expected, "STREAM_END");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn alias_beats_mask() {
        let options = Options::default();
        let mut src = EventSource::for_str("a: &x 1\nb: *x\n", &options);
        let mut result = Ok(());
        for _ in 0..8 {
            if let Err(err) = src.next(EventMask(u16::MAX & !EventKind::Alias.bit())) {
                result = Err(err);
                break;
            }
        }
        assert!(matches!(result, Err(Error::AliasUnsupported { .. })));
    }

    #[test]
    fn scalar_carries_text_tag_and_location() {
        let options = Options::default();
        let mut src = EventSource::for_str("k: !!int 12\n", &options);
        let all = EventMask(u16::MAX);
        for _ in 0..3 {
            src.next(all).unwrap();
        }
        let key = src.next(all).unwrap();
        assert_eq!(key.value, "k");
        assert_eq!(key.location, Location::new(1, 1));
        let value = src.next(all).unwrap();
        assert_eq!(value.value, "12");
        assert!(value.tag.as_deref().is_some_and(|t| t.ends_with("int")));
    }

    #[test]
    fn budget_breach_is_reported() {
        let options = Options {
            budget: Some(Budget {
                max_depth: 1,
                ..Budget::default()
            }),
            ..Options::default()
        };
        let mut src = EventSource::for_str("a: {b: 1}\n", &options);
        let all = EventMask(u16::MAX);
        let err = loop {
            if let Err(err) = src.next(all) {
                break err;
            }
        };
        assert!(matches!(
            err,
            Error::Budget {
                breach: BudgetBreach::Depth { depth: 2 },
                ..
            }
        ));
    }

    #[test]
    fn end_of_events_is_eof() {
        let options = Options::default();
        let mut src = EventSource::for_str("", &options);
        let all = EventMask(u16::MAX);
        assert_eq!(src.next(all).unwrap().kind, EventKind::StreamStart);
        assert_eq!(src.next(all).unwrap().kind, EventKind::StreamEnd);
        assert!(matches!(src.next(all), Err(Error::Eof { .. })));
    }
}
