use std::sync::atomic::{AtomicUsize, Ordering};

use schema_saphyr::{
    Budget, BudgetBreach, BudgetReport, Error, Field, Options, SchemaNode, check_yaml_budget,
    load_from_str, options,
};

const DEPTH: usize = 1_000;

/// `{n: {n: ... {v: int8} ...}}`, `levels` mappings deep, all inline.
fn chain(levels: usize) -> SchemaNode {
    let mut node = SchemaNode::mapping(1, vec![Field::new("v", 0, SchemaNode::int(1))]);
    for _ in 1..levels {
        node = SchemaNode::mapping(1, vec![Field::new("n", 0, node)]);
    }
    node
}

fn chain_yaml(levels: usize, value: &str) -> String {
    let mut yaml = "{n: ".repeat(levels - 1);
    yaml.push_str("{v: ");
    yaml.push_str(value);
    yaml.push_str(&"}".repeat(levels));
    yaml
}

#[test]
fn deep_documents_use_heap_frames() -> anyhow::Result<()> {
    let schema = chain(DEPTH);
    let tree = load_from_str(&chain_yaml(DEPTH, "7"), &Options::default(), &schema)?;
    assert_eq!(tree.root_bytes(), &[7u8][..]);

    let mut value = tree.view(&schema);
    for _ in 1..DEPTH {
        value = value.field("n").unwrap();
    }
    assert_eq!(value.field("v").and_then(|v| v.as_i64()), Some(7));
    Ok(())
}

#[test]
fn deep_failure_unwinds_without_recursion() {
    let schema = chain(DEPTH);
    let err = load_from_str(&chain_yaml(DEPTH, "300"), &Options::default(), &schema).unwrap_err();
    assert!(matches!(err, Error::InvalidValue { .. }), "{err}");
}

#[test]
fn deep_ignored_subtree() -> anyhow::Result<()> {
    let schema = SchemaNode::mapping(
        1,
        vec![
            Field::new("junk", 0, SchemaNode::ignore()),
            Field::new("keep", 0, SchemaNode::uint(1)),
        ],
    );
    let levels = 2_000;
    let yaml = format!("junk: {}x{}\nkeep: 9\n", "[".repeat(levels), "]".repeat(levels));
    let tree = load_from_str(&yaml, &Options::default(), &schema)?;
    assert_eq!(tree.root_bytes(), &[9u8][..]);
    Ok(())
}

#[test]
fn depth_budget_stops_the_load() {
    let schema = chain(5);
    let opts = options! {
        budget: Some(Budget { max_depth: 3, ..Budget::default() }),
    };
    let err = load_from_str(&chain_yaml(5, "1"), &opts, &schema).unwrap_err();
    match err {
        Error::Budget { breach, location } => {
            assert_eq!(breach, BudgetBreach::Depth { depth: 4 });
            assert!(location.is_known());
        }
        other => panic!("expected budget error, got {other}"),
    }

    assert!(load_from_str(&chain_yaml(3, "1"), &opts, &chain(3)).is_ok());
}

#[test]
fn scalar_bytes_budget() {
    let schema = SchemaNode::mapping(8, vec![Field::new("s", 0, SchemaNode::string())]);
    let opts = options! {
        budget: Some(Budget { max_scalar_bytes: 8, ..Budget::default() }),
    };
    let err = load_from_str("s: a-rather-long-value\n", &opts, &schema).unwrap_err();
    match err {
        Error::Budget { breach, .. } => {
            assert_eq!(breach, BudgetBreach::ScalarBytes { bytes: 20 });
        }
        other => panic!("expected budget error, got {other}"),
    }
}

#[test]
fn ignored_subtrees_are_metered() {
    let schema = SchemaNode::mapping(
        1,
        vec![
            Field::new("junk", 0, SchemaNode::ignore()),
            Field::new("keep", 0, SchemaNode::uint(1)),
        ],
    );
    let opts = options! {
        budget: Some(Budget { max_depth: 10, ..Budget::default() }),
    };
    let yaml = format!("junk: {}x{}\nkeep: 9\n", "[".repeat(20), "]".repeat(20));
    let err = load_from_str(&yaml, &opts, &schema).unwrap_err();
    assert!(
        matches!(err, Error::Budget { breach: BudgetBreach::Depth { depth: 11 }, .. }),
        "{err}"
    );
}

static REPORTED_NODES: AtomicUsize = AtomicUsize::new(0);

fn record(report: &BudgetReport) {
    REPORTED_NODES.store(report.nodes, Ordering::SeqCst);
}

#[test]
fn budget_report_reaches_the_callback() -> anyhow::Result<()> {
    let schema = chain(2);
    let opts = options! {
        budget: Some(Budget::default()),
        budget_report: Some(record),
    };
    load_from_str("{n: {v: 1}}", &opts, &schema)?;
    // two mappings, two keys, one value
    assert_eq!(REPORTED_NODES.load(Ordering::SeqCst), 5);
    Ok(())
}

#[test]
fn standalone_budget_check() -> anyhow::Result<()> {
    let budget = Budget {
        max_nodes: 3,
        ..Budget::default()
    };
    let report = check_yaml_budget("a: 1\nb: 2\n", &budget)?;
    assert_eq!(report.breached, Some(BudgetBreach::Nodes { nodes: 4 }));

    let report = check_yaml_budget("a: 1\n", &budget)?;
    assert_eq!(report.breached, None);
    assert_eq!(report.nodes, 3);
    Ok(())
}
