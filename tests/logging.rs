use log::LevelFilter;
use schema_saphyr::{CountField, Field, SchemaNode, load_from_str, options};

fn init_logger() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(LevelFilter::Trace)
        .try_init();
}

fn schema() -> SchemaNode {
    SchemaNode::mapping(
        16,
        vec![
            Field::new("id", 0, SchemaNode::int(4)),
            Field::new(
                "tags",
                8,
                SchemaNode::sequence(SchemaNode::string(), CountField::new(4, 2)),
            ),
        ],
    )
}

#[test]
fn verbosity_does_not_change_results() {
    init_logger();
    let schema = schema();
    for level in [LevelFilter::Off, LevelFilter::Error, LevelFilter::Info, LevelFilter::Trace] {
        let opts = options! { log_level: level };

        let tree = load_from_str("{id: 1, tags: [x, y]}", &opts, &schema).unwrap();
        assert_eq!(tree.live_blocks(), 4, "{level}");
        assert_eq!(tree.view(&schema).field("tags").and_then(|v| v.len()), Some(2));

        let err = load_from_str("{id: 1, tags: [x, 2], nope: 3}", &opts, &schema).unwrap_err();
        assert!(matches!(err, schema_saphyr::Error::InvalidKey { .. }), "{level}: {err}");
    }
}
