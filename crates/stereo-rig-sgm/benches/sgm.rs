use criterion::{black_box, criterion_group, criterion_main, Criterion};
use stereo_rig_core::GrayImage;
use stereo_rig_sgm::{Directions, SgmMatcher, SgmParams};

fn textured(w: usize, h: usize, shift: usize) -> (GrayImage, GrayImage) {
    let f = |x: usize, y: usize| ((x * 7919 + y * 104_729) ^ (x * y)) as u8;
    (
        GrayImage::from_fn(w, h, f),
        GrayImage::from_fn(w, h, |x, y| f(x + shift, y)),
    )
}

fn bench_sgm(c: &mut Criterion) {
    let (left, right) = textured(320, 240, 30);
    let mut group = c.benchmark_group("sgm_320x240");
    group.sample_size(10);
    for directions in [Directions::Five, Directions::Eight] {
        let matcher = SgmMatcher::new(SgmParams {
            min_disparity: 0,
            num_disparities: 64,
            directions,
            ..Default::default()
        })
        .expect("params");
        group.bench_function(format!("{directions:?}"), |b| {
            b.iter(|| {
                matcher
                    .compute(black_box(&left.view()), black_box(&right.view()))
                    .expect("compute")
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_sgm);
criterion_main!(benches);
