//! Criterion benchmarks for the harmonize evaluator, pure Rust, no PyO3.
//!
//! Mappings are compiled once outside the measured loop; each iteration is
//! one `execute` (or one direct built-in call) against a prebuilt input.
//!
//! Run:
//!   cargo bench
//!   cargo bench -- mapping     # one group
//!   cargo bench -- builtins

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use harmonize::ast::{Expr, ProjectorDecl, Statement, TargetNode, Unit};
use harmonize::value::Container;
use harmonize::{compile, Evaluator, Program, Registry, Token};

// ── Data builders ─────────────────────────────────────────────────────────────

/// `n` patient records: {id, first, last, born, codes}.
fn patients(n: usize) -> Token {
    let records: Vec<Token> = (0..n)
        .map(|i| {
            let mut m = Container::new();
            m.insert("id".to_string(), Token::from(format!("p{i}")));
            m.insert("first".to_string(), Token::from(format!("Name{i}")));
            m.insert("last".to_string(), Token::from(format!("Family{}", i % 17)));
            m.insert(
                "born".to_string(),
                Token::from(format!("19{:02}{:02}{:02}", i % 100, i % 12 + 1, i % 28 + 1)),
            );
            let codes: Vec<Token> = (0..3).map(|c| Token::from(format!("c{}", (i + c) % 7))).collect();
            m.insert("codes".to_string(), Token::array(codes));
            Token::container(m)
        })
        .collect();

    let mut root = Container::new();
    root.insert("patients".to_string(), Token::array(records));
    Token::container(root)
}

/// `n` coded items with heavy key overlap, for `$UnionBy`.
fn coded_items(n: usize) -> Token {
    let items: Vec<Token> = (0..n)
        .map(|i| {
            let mut m = Container::new();
            m.insert("system".to_string(), Token::from(format!("s{}", i % 5)));
            m.insert("code".to_string(), Token::from(format!("{}", i % 23)));
            m.insert("n".to_string(), Token::from(i));
            Token::container(m)
        })
        .collect();
    Token::array(items)
}

// ── Compiled mapping ──────────────────────────────────────────────────────────

fn bundle_evaluator() -> Evaluator {
    let unit = Unit {
        name: "Bundle".into(),
        params: vec!["src".into()],
        body: vec![
            Statement::assign(TargetNode::field("type"), Expr::constant("collection")),
            Statement::assign(
                TargetNode::field("entry[]"),
                Expr::call("Patient", vec![Expr::path("src.patients[]")]),
            ),
        ],
        projectors: vec![ProjectorDecl {
            name: "Patient".into(),
            params: vec!["p".into()],
            variadic: false,
            body: vec![
                Statement::assign(TargetNode::field("id"), Expr::call("$Hash", vec![Expr::path("p.id")])),
                Statement::assign(
                    TargetNode::field("name.family"),
                    Expr::call("$ToUpper", vec![Expr::path("p.last")]),
                ),
                Statement::assign(TargetNode::field("name.given[]"), Expr::path("p.first")),
                Statement::assign(
                    TargetNode::field("birthDate"),
                    Expr::call(
                        "$ReformatTime",
                        vec![
                            Expr::constant("%Y%m%d"),
                            Expr::path("p.born"),
                            Expr::constant("%Y-%m-%d"),
                        ],
                    ),
                ),
                Statement::assign(TargetNode::field("code[]"), Expr::path("p.codes[]")),
            ],
        }],
    };

    let mut registry = Registry::with_builtins().unwrap();
    let mut program = Program::new();
    compile(&unit, &mut registry, &mut program).unwrap();
    Evaluator::new(Arc::new(registry), Arc::new(program))
}

// ── Bench groups ──────────────────────────────────────────────────────────────

fn bench_mapping(c: &mut Criterion) {
    let ev = bundle_evaluator();
    let mut group = c.benchmark_group("mapping");

    for n in [1_usize, 100, 1_000] {
        let data = patients(n);
        group.bench_with_input(BenchmarkId::new("bundle", n), &data, |b, data| {
            b.iter(|| black_box(ev.execute("Bundle", black_box(data)).unwrap()))
        });
    }
    group.finish();
}

fn bench_builtins(c: &mut Criterion) {
    let ev = bundle_evaluator();
    let mut group = c.benchmark_group("builtins");

    let record = patients(50);
    group.bench_function("hash_50_records", |b| {
        b.iter(|| black_box(ev.call("$Hash", vec![black_box(record.clone())]).unwrap()))
    });

    for n in [100_usize, 1_000] {
        let items = coded_items(n);
        group.bench_with_input(BenchmarkId::new("union_by", n), &items, |b, items| {
            b.iter(|| {
                black_box(
                    ev.call(
                        "$UnionBy",
                        vec![items.clone(), Token::from("system"), Token::from("code")],
                    )
                    .unwrap(),
                )
            })
        });
    }

    let nested = Token::array(
        (0..100)
            .map(|i| Token::array(vec![Token::from(i), Token::array(vec![Token::from(i + 1)])]))
            .collect(),
    );
    group.bench_function("flatten_nested_100", |b| {
        b.iter(|| black_box(ev.call("$Flatten", vec![nested.clone()]).unwrap()))
    });
    group.finish();
}

criterion_group!(benches, bench_mapping, bench_builtins);
criterion_main!(benches);
