use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::fmt::Write as _;
use std::io::Cursor;

use gem_pipeline::junctions::JunctionSet;
use gem_pipeline::mapping::MappingFile;
use gem_pipeline::merge::Merger;

fn make_gtf(transcripts: usize, exons: usize) -> String {
    let mut gtf = String::new();
    let mut x: u32 = 42;
    for t in 0..transcripts {
        let strand = if t % 2 == 0 { '+' } else { '-' };
        let mut pos = 1_000 + (t as u64) * 50_000;
        for _ in 0..exons {
            x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let len = 50 + u64::from((x >> 16) % 200);
            let intron = 100 + u64::from((x >> 8) % 5_000);
            let _ = writeln!(
                gtf,
                "chr21\tbench\texon\t{}\t{}\t.\t{}\t.\tgene_id \"G{}\"; transcript_id \"T{}\";",
                pos,
                pos + len,
                strand,
                t / 3,
                t
            );
            pos += len + intron;
        }
    }
    gtf
}

fn bench_gtf_junctions(c: &mut Criterion) {
    let gtf = make_gtf(2_000, 8);
    c.bench_function("gtf_junctions_2k_transcripts", |b| {
        b.iter(|| {
            let set = JunctionSet::from_gtf_reader(Cursor::new(black_box(gtf.as_bytes()))).unwrap();
            black_box(set.filter_by_distance(500_000).len());
        })
    });
}

fn bench_merge(c: &mut Criterion) {
    let dir = tempfile::TempDir::new().unwrap();
    let n = 20_000;
    let mut primary = String::new();
    let mut supplement = String::new();
    for i in 0..n {
        if i % 3 == 0 {
            let _ = writeln!(primary, "r{}\tACGTACGTAC\tIIIIIIIIII\t0:1\tchr21:+:{}:10", i, i * 10 + 1);
        } else {
            let _ = writeln!(primary, "r{}\tACGTACGTAC\tIIIIIIIIII\t0:0\t-", i);
            let _ = writeln!(supplement, "r{}\tACGTACGTAC\tIIIIIIIIII\t0:1\tchr21:-:{}:10", i, i * 10 + 1);
        }
    }
    let p = dir.path().join("primary.map");
    let s = dir.path().join("supplement.map");
    std::fs::write(&p, primary).unwrap();
    std::fs::write(&s, supplement).unwrap();
    let primary = MappingFile::open(&p).unwrap();
    let supplement = MappingFile::open(&s).unwrap();
    let out = dir.path().join("merged.map");

    c.bench_function("merge_20k_reads", |b| {
        b.iter(|| {
            let (_, stats) = Merger::new(primary.clone()).with(supplement.clone()).merge(&out).unwrap();
            black_box(stats.rescued);
        })
    });
}

criterion_group!(benches, bench_gtf_junctions, bench_merge);
criterion_main!(benches);
