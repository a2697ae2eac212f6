//! Facade overhead benchmarks.
//!
//! Compares each wrapped call on its success path against the same raw
//! libc call, so the cost of the check and the cold fatal branch shows up
//! as the difference between the paired entries.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use xwrap_core::{xclose, xmalloc, xopen, xpipe, xread, xwrite};

fn bench_read_dev_zero(c: &mut Criterion) {
    let fd = xopen(c"/dev/zero", libc::O_RDONLY | libc::O_CLOEXEC);
    let mut buf = [0u8; 64];

    let mut group = c.benchmark_group("read_dev_zero_64");
    group.bench_function("raw", |b| {
        b.iter(|| {
            // SAFETY: buf is valid for 64 bytes; fd is open.
            black_box(unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) });
        });
    });
    group.bench_function("xread", |b| {
        b.iter(|| {
            black_box(xread(fd, &mut buf));
        });
    });
    group.finish();

    xclose(fd);
}

fn bench_write_pipe(c: &mut Criterion) {
    let [r, w] = xpipe();
    let payload = [0x5au8; 16];
    let mut sink = [0u8; 16];

    let mut group = c.benchmark_group("pipe_write_16");
    group.bench_function("raw", |b| {
        b.iter(|| {
            // SAFETY: payload and sink are valid for 16 bytes; both ends are open.
            unsafe {
                black_box(libc::write(w, payload.as_ptr().cast(), payload.len()));
                libc::read(r, sink.as_mut_ptr().cast(), sink.len());
            }
        });
    });
    group.bench_function("xwrite", |b| {
        b.iter(|| {
            black_box(xwrite(w, &payload));
            xread(r, &mut sink);
        });
    });
    group.finish();

    xclose(r);
    xclose(w);
}

fn bench_malloc(c: &mut Criterion) {
    let mut group = c.benchmark_group("malloc_free_256");
    group.bench_function("raw", |b| {
        b.iter(|| {
            // SAFETY: malloc/free pair on the C allocator.
            unsafe {
                let p = libc::malloc(black_box(256));
                libc::free(black_box(p));
            }
        });
    });
    group.bench_function("xmalloc", |b| {
        b.iter(|| {
            let p = xmalloc(black_box(256));
            // SAFETY: p came from the C allocator.
            unsafe { libc::free(black_box(p.as_ptr())) };
        });
    });
    group.finish();
}

criterion_group!(benches, bench_read_dev_zero, bench_write_pipe, bench_malloc);
criterion_main!(benches);
