use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use image::{Rgb, RgbImage};
use inference::detection::normalize;
use inference::names::ClassNames;
use inference::processing::{PostProcessor, PreProcessor, TransformParams};
use ndarray::{Array, IxDyn};

const NUM_CLASSES: usize = 80;
const NUM_ANCHORS: usize = 8400;

/// Gradient test image so the resizer has real work to do
fn create_test_image(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    })
}

/// Mock YOLO head output with `num_detections` confident anchors spread on a grid
fn create_mock_yolo_output(num_detections: usize, oriented: bool) -> ndarray::ArrayD<f32> {
    let channels = 4 + NUM_CLASSES + usize::from(oriented);
    let mut output = Array::from_elem(IxDyn(&[1, channels, NUM_ANCHORS]), 0.001f32);

    for i in 0..num_detections.min(NUM_ANCHORS) {
        output[[0, 0, i]] = 20.0 + (i % 20) as f32 * 30.0;
        output[[0, 1, i]] = 20.0 + (i / 20) as f32 * 30.0;
        output[[0, 2, i]] = 25.0;
        output[[0, 3, i]] = 15.0;
        output[[0, 4 + i % NUM_CLASSES, i]] = 0.9;
        if oriented {
            output[[0, 4 + NUM_CLASSES, i]] = 0.3;
        }
    }

    output
}

fn transform() -> TransformParams {
    TransformParams {
        orig_width: 1920,
        orig_height: 1080,
        scale: 1.0 / 3.0,
        offset_x: 0.0,
        offset_y: 140.0,
    }
}

fn benchmark_preprocessing(c: &mut Criterion) {
    let mut group = c.benchmark_group("preprocessing");
    let preprocessor = PreProcessor::new(640);

    // Test different resolutions
    let resolutions = [(640, 480), (1280, 720), (1920, 1080)];

    for (width, height) in resolutions.iter() {
        let image = create_test_image(*width, *height);

        group.bench_with_input(
            BenchmarkId::new("rgb_letterbox", format!("{}x{}", width, height)),
            &image,
            |b, image| {
                b.iter(|| preprocessor.preprocess(black_box(image)).unwrap());
            },
        );
    }

    group.finish();
}

fn benchmark_postprocessing(c: &mut Criterion) {
    let mut group = c.benchmark_group("postprocessing");
    let post_processor = PostProcessor::new(0.25, 0.7, 300);
    let transform = transform();

    let detection_counts = [0, 5, 50, 300];

    for oriented in [false, true] {
        let label = if oriented { "oriented" } else { "axis_aligned" };
        for num_detections in detection_counts.iter() {
            let output = create_mock_yolo_output(*num_detections, oriented);

            group.bench_with_input(
                BenchmarkId::new(label, num_detections),
                &output,
                |b, output| {
                    b.iter(|| {
                        post_processor
                            .parse_detections(
                                black_box(&output.view()),
                                black_box(NUM_CLASSES),
                                black_box(&transform),
                            )
                            .unwrap()
                    });
                },
            );
        }
    }

    group.finish();
}

fn benchmark_normalization(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalization");
    let names: ClassNames = (0..NUM_CLASSES).map(|i| format!("class_{}", i)).collect();
    let post_processor = PostProcessor::new(0.25, 0.7, 300);
    let output = create_mock_yolo_output(300, true);
    let detections = post_processor
        .parse_detections(&output.view(), NUM_CLASSES, &transform())
        .unwrap();

    group.bench_function("oriented_300", |b| {
        b.iter(|| normalize(black_box(&detections), black_box(&names)).unwrap());
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_preprocessing,
    benchmark_postprocessing,
    benchmark_normalization
);
criterion_main!(benches);
