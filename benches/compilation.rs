use criterion::{black_box, criterion_group, criterion_main, Criterion};

const PROGRAM: &str = "program bench;\n\
    const LIMIT = 20;\n\
    var total: integer;\n\
    function binary| 5 (a: integer; b: integer): integer; begin if a then a else b end;\n\
    function fib(n: integer): integer;\n\
    begin if n < 2 then n else fib(n - 1) + fib(n - 2) end;\n\
    begin\n\
      for i := 1 to LIMIT do begin total := total + (fib(i) | 1); end;\n\
      writeln(total);\n\
    end.";

fn pipeline_benchmark(c: &mut Criterion) {
    c.bench_function("compile_source", |b| {
        b.iter(|| mila::compile_source("bench", black_box(PROGRAM)))
    });

    let compilation = mila::compile_source("bench", PROGRAM).expect("benchmark program compiles");
    c.bench_function("print_ir", |b| b.iter(|| compilation.module.to_string()));
}

criterion_group!(benches, pipeline_benchmark);
criterion_main!(benches);
