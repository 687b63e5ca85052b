//! Opt-in limits on how much YAML one load may consume.
//!
//! Nesting lives on a heap frame stack, so a deep document cannot overflow the
//! call stack. A [`Budget`] adds hard caps for untrusted input. It meters the
//! raw parser events, so ignored subtrees and skipped duplicate values count
//! even though they never reach the destination tree.

use std::fmt;

use saphyr_parser::{Event, Parser};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Caps checked against every raw event of a load.
///
/// ```rust
/// use schema_saphyr::{Budget, Field, Options, SchemaNode};
///
/// let schema = SchemaNode::mapping(4, vec![Field::new("port", 0, SchemaNode::uint(2))]);
/// let options = schema_saphyr::options! {
///     budget: Some(Budget { max_depth: 1, ..Budget::default() }),
/// };
///
/// let tree = schema_saphyr::load_from_str("port: 8080\n", &options, &schema).unwrap();
/// assert_eq!(tree.view(&schema).field("port").and_then(|v| v.as_u64()), Some(8080));
///
/// let err = schema_saphyr::load_from_str("port: [8080]\n", &options, &schema).unwrap_err();
/// assert!(matches!(err, schema_saphyr::Error::Budget { .. }));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    /// Parser events of any kind, stream and document markers included.
    ///
    /// Default: 1,000,000
    pub max_events: usize,
    /// Collections open at the same time. The root mapping alone is depth 1.
    ///
    /// Default: 2,000
    pub max_depth: usize,
    /// Scalars (keys included) plus collections.
    ///
    /// Default: 250,000
    pub max_nodes: usize,
    /// Total bytes of scalar text, keys included.
    ///
    /// Default: 64 MiB
    pub max_scalar_bytes: usize,
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            max_events: 1_000_000,
            max_depth: 2_000,
            max_nodes: 250_000,
            max_scalar_bytes: 64 * 1024 * 1024,
        }
    }
}

/// The first limit a load went past, with the count that did it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BudgetBreach {
    Events { events: usize },
    Depth { depth: usize },
    Nodes { nodes: usize },
    ScalarBytes { bytes: usize },
}

impl fmt::Display for BudgetBreach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BudgetBreach::Events { events } => write!(f, "{events} events"),
            BudgetBreach::Depth { depth } => write!(f, "nesting depth {depth}"),
            BudgetBreach::Nodes { nodes } => write!(f, "{nodes} nodes"),
            BudgetBreach::ScalarBytes { bytes } => write!(f, "{bytes} bytes of scalar text"),
        }
    }
}

/// Counts gathered while metering a stream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BudgetReport {
    /// Set when metering stopped at a limit.
    pub breached: Option<BudgetBreach>,
    pub events: usize,
    pub nodes: usize,
    /// Deepest nesting seen.
    pub max_depth: usize,
    pub scalar_bytes: usize,
}

/// Running counters for one stream.
#[derive(Debug)]
pub(crate) struct BudgetMeter {
    budget: Budget,
    report: BudgetReport,
    open: usize,
}

impl BudgetMeter {
    pub(crate) fn new(budget: Budget) -> Self {
        Self {
            budget,
            report: BudgetReport::default(),
            open: 0,
        }
    }

    /// Count one raw event. Fails on the first event that goes past a limit.
    pub(crate) fn observe(&mut self, ev: &Event<'_>) -> Result<(), BudgetBreach> {
        self.meter(ev).inspect_err(|breach| self.report.breached = Some(*breach))
    }

    fn meter(&mut self, ev: &Event<'_>) -> Result<(), BudgetBreach> {
        let budget = &self.budget;
        let report = &mut self.report;
        report.events += 1;
        if report.events > budget.max_events {
            return Err(BudgetBreach::Events {
                events: report.events,
            });
        }

        let opens = match ev {
            Event::Scalar(text, ..) => {
                report.scalar_bytes = report.scalar_bytes.saturating_add(text.len());
                false
            }
            Event::SequenceStart(..) | Event::MappingStart(..) => true,
            Event::SequenceEnd | Event::MappingEnd => {
                // The parser keeps collections balanced.
                self.open = self.open.saturating_sub(1);
                return Ok(());
            }
            _ => return Ok(()),
        };

        report.nodes += 1;
        if report.nodes > budget.max_nodes {
            return Err(BudgetBreach::Nodes {
                nodes: report.nodes,
            });
        }
        if opens {
            self.open += 1;
            report.max_depth = report.max_depth.max(self.open);
            if self.open > budget.max_depth {
                return Err(BudgetBreach::Depth { depth: self.open });
            }
        } else if report.scalar_bytes > budget.max_scalar_bytes {
            return Err(BudgetBreach::ScalarBytes {
                bytes: report.scalar_bytes,
            });
        }
        Ok(())
    }

    pub(crate) fn finish(self) -> BudgetReport {
        self.report
    }
}

/// Meter `input` against `budget` without loading it or consulting a schema.
///
/// Scanning stops at the first breach, which is recorded in
/// [`BudgetReport::breached`]. Malformed YAML is an [`Error::Parser`].
pub fn check_yaml_budget(input: &str, budget: &Budget) -> Result<BudgetReport, Error> {
    let mut meter = BudgetMeter::new(budget.clone());
    for item in Parser::new_from_str(input) {
        let (ev, _) = item.map_err(Error::from_scan_error)?;
        if meter.observe(&ev).is_err() {
            break;
        }
    }
    Ok(meter.finish())
}
