use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lagvae::layers::{Conv2d, MaskKind};
use lagvae::math::Matrix;
use rand::Rng;

fn bench_matmul(c: &mut Criterion) {
    let size = 256;
    let mut rng = rand::thread_rng();
    let a_data: Vec<f32> = (0..size * size).map(|_| rng.gen()).collect();
    let b_data: Vec<f32> = (0..size * size).map(|_| rng.gen()).collect();
    let a = Matrix::from_vec(size, size, a_data);
    let b = Matrix::from_vec(size, size, b_data);

    c.bench_function("matmul_256", |bencher| {
        bencher.iter(|| {
            let res = Matrix::matmul(black_box(&a), black_box(&b));
            black_box(res);
        });
    });
}

fn bench_masked_conv(c: &mut Criterion) {
    let conv = Conv2d::new(1, 32, 7, 1, 3, MaskKind::A);
    let mut rng = rand::thread_rng();
    let img_data: Vec<f32> = (0..50 * 28 * 28)
        .map(|_| if rng.gen::<f32>() < 0.5 { 1.0 } else { 0.0 })
        .collect();
    let img = Matrix::from_vec(50, 28 * 28, img_data);

    c.bench_function("masked_conv_7x7_batch50", |bencher| {
        bencher.iter(|| {
            let res = conv.forward(black_box(&img)).unwrap();
            black_box(res);
        });
    });
}

criterion_group!(benches, bench_matmul, bench_masked_conv);
criterion_main!(benches);
