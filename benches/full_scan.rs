use criterion::{Criterion, criterion_group, criterion_main};
use critmap::core::{
    DiffLineKind, FileChange, Hunk, HunkLine, ImportRecord, InjectionRecord, MethodRecord,
    ScanInput, SourceFile, SymbolTable,
};
use critmap::{ScoringConfig, analyze};
use std::hint::black_box;
use std::path::PathBuf;

fn method(name: &str, start: usize, signature: &str) -> MethodRecord {
    MethodRecord {
        name: name.to_string(),
        start_line: start,
        end_line: start + 8,
        signature: signature.to_string(),
        ..Default::default()
    }
}

fn line(kind: DiffLineKind, text: &str) -> HunkLine {
    HunkLine {
        kind,
        text: text.to_string(),
        old_line: None,
        new_line: None,
    }
}

/// `module_count` feature folders, each a controller injecting its service
/// and a service importing the previous feature's service. Every third
/// service changes a signature.
fn create_snapshot(module_count: usize) -> ScanInput {
    let mut sources = Vec::new();
    let mut changes = Vec::new();

    for i in 0..module_count {
        let service = PathBuf::from(format!("api/src/m{}/m{}.service.ts", i, i));
        let controller = PathBuf::from(format!("api/src/m{}/m{}.controller.ts", i, i));

        let mut service_table = SymbolTable {
            methods: vec![
                method("find", 1, "find(id: string, opts: Options)"),
                method("save", 11, "save(entity: Entity)"),
            ],
            ..Default::default()
        };
        if i > 0 {
            service_table.imports.push(ImportRecord {
                specifiers: vec!["find".to_string()],
                source: format!("../m{}/m{}.service", i - 1, i - 1),
            });
        }
        let controller_table = SymbolTable {
            methods: vec![method("get", 1, "get(id: string)")],
            injections: vec![InjectionRecord {
                param_name: "service".to_string(),
                type_name: format!("M{}Service", i),
            }],
            ..Default::default()
        };

        sources.push(SourceFile {
            repo: "api".to_string(),
            path: service.clone(),
            symbols: Some(service_table.clone()),
        });
        sources.push(SourceFile {
            repo: "api".to_string(),
            path: controller,
            symbols: Some(controller_table),
        });

        if i % 3 == 0 {
            let mut old_table = service_table.clone();
            old_table.methods[0].signature = "find(id: string)".to_string();
            changes.push(FileChange {
                repo: "api".to_string(),
                path: service,
                additions: 3,
                deletions: 2,
                hunks: vec![Hunk {
                    old_start: 1,
                    new_start: 1,
                    lines: vec![
                        line(DiffLineKind::Del, "async find(id: string) {"),
                        line(DiffLineKind::Add, "async find(id: string, opts: Options) {"),
                        line(DiffLineKind::Del, "return this.repo.findOne(id);"),
                        line(DiffLineKind::Add, "if (!opts) throw new BadRequestException();"),
                        line(DiffLineKind::Add, "return this.repo.findOne(id, opts);"),
                    ],
                }],
                old_symbols: Some(old_table),
                new_symbols: Some(service_table),
                deleted: false,
            });
        }
    }

    ScanInput { sources, changes }
}

fn full_scan_benchmark(c: &mut Criterion) {
    let config = ScoringConfig::default();

    let mut group = c.benchmark_group("full_scan");
    group.sample_size(20);

    for count in [10, 100, 500] {
        let input = create_snapshot(count);
        group.bench_function(format!("{}_modules", count), |b| {
            b.iter(|| analyze(black_box(&input), &config))
        });
    }

    group.finish();
}

criterion_group!(benches, full_scan_benchmark);
criterion_main!(benches);
