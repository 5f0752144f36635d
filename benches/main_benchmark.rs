use criterion::{Criterion, criterion_group, criterion_main};
use mkflow::args::{self, Arg};
use mkflow::config::{self, FlowConfig};
use mkflow::probe::{self, Capability};
use mkflow::rule::{self, Rule, Step};
use std::hint::black_box;
use std::path::Path;

const MOCK_FLOW: &str = r#"
[workflow]
title = "benchmark flow"

[run]
jobs = 4

[[step]]
cmds = ["gcc -c src/main.c -o build/main.o"]
inputs = "src/main.c"
outputs = "build/main.o"

[[step]]
cmds = ["gcc build/main.o -o build/app", "strip build/app"]
inputs = ["build/main.o"]
outputs = ["build/app", "build/app.map"]

[clean]
cmds = "rm -rf build"
"#;

const MAKE_VERSION: &str = "GNU Make 4.4.1\nBuilt for x86_64-pc-linux-gnu\n";

fn sample_rule() -> Rule {
    let step = Step::new(
        vec!["gcc -c a.c -o a.o", "echo 'done' > stamp"],
        vec!["a.c", "include/a.h"],
        vec!["a.o", "stamp", "a.d"],
    )
    .title("compile a")
    .soft_inputs("build");
    Rule::from_step(&step).unwrap()
}

fn bench_encode(c: &mut Criterion) {
    let rule = sample_rule();

    c.bench_function("encode_grouped", |b| {
        b.iter(|| rule::encode(black_box(&rule), black_box(Capability::GroupedTargets)))
    });

    c.bench_function("encode_legacy", |b| {
        b.iter(|| rule::encode(black_box(&rule), black_box(Capability::Legacy)))
    });
}

fn bench_normalize(c: &mut Criterion) {
    let paths = Arg::from(vec![
        "./src/../src/main.c",
        "build//obj/./main.o",
        "../shared/lib.a",
        "/usr/include/../lib/libc.so",
    ]);

    c.bench_function("normalize_paths", |b| {
        b.iter(|| args::normalize_paths(black_box(&paths)).unwrap())
    });
}

fn bench_escape(c: &mut Criterion) {
    c.bench_function("escape_text", |b| {
        b.iter(|| rule::escape_text(black_box("it's 100% \"$HOME\"\\n done")))
    });
}

fn bench_probe_parse(c: &mut Criterion) {
    c.bench_function("parse_version_output", |b| {
        b.iter(|| probe::parse_version_output(black_box(MAKE_VERSION)))
    });
}

fn bench_config_parse(c: &mut Criterion) {
    c.bench_function("parse_flow_toml", |b| {
        b.iter(|| {
            let _: FlowConfig =
                config::parse_config(black_box(MOCK_FLOW), Path::new("flow.toml")).unwrap();
        })
    });
}

criterion_group!(
    benches,
    bench_encode,
    bench_normalize,
    bench_escape,
    bench_probe_parse,
    bench_config_parse
);
criterion_main!(benches);
