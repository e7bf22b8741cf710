use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use katiba_core::Article;
use katiba_search::fusion::{DEFAULT_RRF_K, rrf_fuse};
use katiba_search::semantic::knn::top_k;
use katiba_search::semantic::{Embedder, HashEmbedder};

const POOL_SIZES: [usize; 3] = [5, 50, 500];

fn ranked(count: usize, offset: u32) -> Vec<Article> {
    (0..count)
        .map(|i| {
            let number = u32::try_from(i).unwrap_or(u32::MAX).wrapping_add(offset);
            Article::new(format!("Article {number}"), "", "Chapter", number, None)
        })
        .collect()
}

fn bench_rrf_fuse(c: &mut Criterion) {
    let mut group = c.benchmark_group("fusion.rrf");

    for pool in POOL_SIZES {
        let lexical = ranked(pool, 0);
        let semantic = ranked(pool, u32::try_from(pool / 2).unwrap_or(0));
        group.throughput(Throughput::Elements((pool * 2) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(pool), &pool, |b, _| {
            b.iter(|| {
                black_box(rrf_fuse(&[lexical.as_slice(), semantic.as_slice()], DEFAULT_RRF_K)).len()
            });
        });
    }

    group.finish();
}

fn bench_knn(c: &mut Criterion) {
    let mut group = c.benchmark_group("semantic.knn");
    let embedder = HashEmbedder::default();

    // Roughly the size of the constitution (264 articles) and a larger corpus.
    for rows in [264_usize, 2_000] {
        let texts: Vec<String> = (0..rows)
            .map(|i| format!("article {i} on land rights, parliament and the judiciary"))
            .collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let matrix = embedder.embed_batch(&refs).expect("embed corpus");
        let query = embedder.embed("who holds sovereign power").expect("embed query");

        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rows), &rows, |b, _| {
            b.iter(|| black_box(top_k(&query, &matrix, 5, |pos| pos)).len());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_rrf_fuse, bench_knn);
criterion_main!(benches);
