//! Whole-pipeline tests: analyze, generate and assemble one document that
//! exercises every cell kind.

use weft_core::{
    Cell, CellId, CellKind, Document, GeneratorOptions, Generator, Placement, analyze,
    placeholder,
};

fn cell(id: usize, source: &str) -> Cell {
    Cell {
        id: CellId::new(id),
        source_text: source.to_string(),
        is_expression: false,
        is_async: false,
        placement: Placement::Block,
        declared_names: Vec::new(),
        referenced_names: Vec::new(),
        import_specifiers: Vec::new(),
    }
}

fn names(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn sample_document() -> Document {
    // use charts::bar;
    let mut imports = cell(0, "use charts::bar;");
    imports.import_specifiers = names(&["charts::bar"]);

    // let x = 10;
    let mut producer = cell(1, "let x = 10;");
    producer.declared_names = names(&["x"]);

    // x * 2
    let mut doubled = cell(2, "x * 2");
    doubled.is_expression = true;
    doubled.referenced_names = names(&["x"]);

    // await wait(10).then(|| 7)
    let mut eventual = cell(3, "wait(10).then(|| 7)");
    eventual.is_expression = true;
    eventual.is_async = true;
    eventual.referenced_names = names(&["wait"]);

    // let lo = x - 1; let hi = x + 1;
    let mut bounds = cell(4, "let lo = x - 1;\nlet hi = x + 1;");
    bounds.declared_names = names(&["lo", "hi"]);
    bounds.referenced_names = names(&["x"]);

    // for i in 0..3 { display(i); }
    let mut shouting = cell(5, "for i in 0..3 {\n    display(i);\n}");
    shouting.referenced_names = names(&["display"]);

    // let t = view(slider(0, 100));
    let mut bound = cell(6, "let t = view(slider(0, 100));");
    bound.declared_names = names(&["t"]);
    bound.referenced_names = names(&["view", "slider"]);

    // inline, static: 6 * 7
    let mut static_inline = cell(7, "6 * 7");
    static_inline.is_expression = true;
    static_inline.placement = Placement::Inline;

    // inline, reactive: t + 1
    let mut reactive_inline = cell(8, "t + 1");
    reactive_inline.is_expression = true;
    reactive_inline.placement = Placement::Inline;
    reactive_inline.referenced_names = names(&["t"]);

    let body = format!(
        "<main>{}{}{}{}{}{}{}<p>static: {} and live: {}</p></main>",
        placeholder(CellId::new(0)),
        placeholder(CellId::new(1)),
        placeholder(CellId::new(2)),
        placeholder(CellId::new(3)),
        placeholder(CellId::new(4)),
        placeholder(CellId::new(5)),
        placeholder(CellId::new(6)),
        placeholder(CellId::new(7)),
        placeholder(CellId::new(8)),
    );

    Document {
        body,
        cells: vec![
            imports,
            producer,
            doubled,
            eventual,
            bounds,
            shouting,
            bound,
            static_inline,
            reactive_inline,
        ],
    }
}

#[test]
fn test_classification_of_sample() {
    let doc = sample_document();
    let analysis = analyze(&doc).unwrap();

    let kinds: Vec<CellKind> = analysis.cells.iter().map(|c| c.kind).collect();
    assert_eq!(
        kinds,
        vec![
            CellKind::ImportOnly,
            CellKind::Program,
            CellKind::Expression,
            CellKind::Expression,
            CellKind::Program,
            CellKind::Program,
            CellKind::ViewBinding,
            CellKind::Expression,
            CellKind::Expression,
        ]
    );

    // The inline consumer resolves `t` to the view binding.
    assert_eq!(analysis.cells[8].cell_refs, vec!["t"]);
    // `wait` is free and passes through.
    assert_eq!(analysis.cells[3].free_refs, vec!["wait"]);
}

#[test]
fn test_generated_module_structure() {
    let doc = sample_document();
    let analysis = analyze(&doc).unwrap();
    let options = GeneratorOptions::default();
    let module = Generator::new(&options).generate(&doc, &analysis).unwrap();
    let code = &module.code;

    // One unit per non-trivial cell; none for imports or static inline.
    for id in [1usize, 2, 3, 4, 5, 6, 8] {
        assert!(
            code.contains(&format!("fn unit_cell_{}() -> UnitDef", id)),
            "missing unit for cell_{}",
            id
        );
    }
    assert!(!code.contains("unit_cell_0"));
    assert!(!code.contains("unit_cell_7"));

    // Hoisted import.
    assert!(code.contains("use charts::bar;\n"));

    // Uniform wrapper: subscriptions only where sibling refs exist.
    let doubled = unit_source(code, 2);
    assert!(doubled.contains(".reads(&[\"x\"])"));
    let producer = unit_source(code, 1);
    assert!(!producer.contains(".reads("));

    // Multi-declaration program compiles to a single record block.
    let bounds = unit_source(code, 4);
    assert!(bounds.contains(".sync_block(&[\"lo\", \"hi\"], |scope|"));
    assert!(bounds.contains("weft_runtime::record"));

    // The display loop is a zero-declaration effect with the sink shim.
    let shouting = unit_source(code, 5);
    assert!(shouting.contains(".effect(|scope|"));
    assert!(shouting.contains("let display = |v| scope.display(Value::from(v));"));

    // The async expression runs inside a task.
    let eventual = unit_source(code, 3);
    assert!(eventual.contains(".async_expr(|scope, task|"));
    assert!(eventual.contains("task.run(async move {"));

    // The view binding publishes `t`.
    let bound = unit_source(code, 6);
    assert!(bound.contains(".view_binding(\"t\", |scope|"));
    assert!(bound.contains(".writes(&[\"t\"])"));
}

#[test]
fn test_assembled_template() {
    let doc = sample_document();
    let analysis = analyze(&doc).unwrap();
    let options = GeneratorOptions::default();
    let module = Generator::new(&options).generate(&doc, &analysis).unwrap();
    let code = &module.code;

    // Import placeholder removed, ordinary cells wrapped, inline cells
    // spliced or mounted bare.
    assert!(!code.contains("weft:cell_0"));
    assert!(code.contains(
        "<weft-boundary><weft-pending><weft-cell id=\"cell_1\"></weft-cell></weft-pending></weft-boundary>"
    ));
    assert!(code.contains("static: 6 * 7 and live: <weft-cell id=\"cell_8\"></weft-cell>"));
}

#[test]
fn test_unrecognized_shape_never_aborts() {
    // A cell with an odd mix of facts still compiles, as a program.
    let mut odd = cell(0, "weird ~~ syntax !!");
    odd.declared_names = names(&["w"]);
    odd.referenced_names = names(&["q"]);

    let doc = Document {
        body: placeholder(CellId::new(0)),
        cells: vec![odd],
    };
    let analysis = analyze(&doc).unwrap();
    assert_eq!(analysis.cells[0].kind, CellKind::Program);

    let options = GeneratorOptions::default();
    let module = Generator::new(&options).generate(&doc, &analysis).unwrap();
    assert!(module.code.contains("weird ~~ syntax !!"));
}

/// Extract one generated unit function's text.
fn unit_source(code: &str, id: usize) -> String {
    let marker = format!("fn unit_cell_{}() -> UnitDef", id);
    let start = code.find(&marker).unwrap();
    let rest = &code[start..];
    let end = rest.find("\n}\n").map(|i| i + 3).unwrap_or(rest.len());
    rest[..end].to_string()
}
