use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use secure_transport::crypto::pipeline::CryptoPipeline;

#[allow(clippy::unwrap_used)]
fn bench_pipeline_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("crypto_pipeline");
    let key = [0x5Cu8; 32];
    let payload_sizes = [1024usize, 65536, 1024 * 1024];

    for &size in &payload_sizes {
        let plaintext = vec![0xA5u8; size];
        group.throughput(Throughput::Bytes(size as u64));

        for (label, keyed) in [("sha256", false), ("hmac", true)] {
            group.bench_function(format!("encrypt_{label}_{size}b"), |b| {
                b.iter(|| {
                    let mut pipeline = CryptoPipeline::encryptor(&key, keyed).unwrap();
                    let mut out = Vec::with_capacity(size + 48);
                    pipeline.update(&plaintext, &mut out).unwrap();
                    pipeline.finalize(&mut out).unwrap();
                    out
                })
            });

            let mut enc = CryptoPipeline::encryptor(&key, keyed).unwrap();
            let mut ciphertext = Vec::with_capacity(size + 48);
            enc.update(&plaintext, &mut ciphertext).unwrap();
            enc.finalize(&mut ciphertext).unwrap();

            group.bench_function(format!("decrypt_{label}_{size}b"), |b| {
                b.iter(|| {
                    let mut pipeline = CryptoPipeline::decryptor(&key, keyed);
                    let mut out = Vec::with_capacity(size);
                    pipeline.update(&ciphertext, &mut out).unwrap();
                    pipeline.finalize(&mut out).unwrap();
                    out
                })
            });
        }

        group.bench_function(format!("digest_only_{size}b"), |b| {
            b.iter(|| {
                let mut pipeline = CryptoPipeline::digest_only();
                let mut out = Vec::with_capacity(size);
                pipeline.update(&plaintext, &mut out).unwrap();
                pipeline.finalize(&mut out).unwrap();
                out
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_pipeline_throughput);
criterion_main!(benches);
