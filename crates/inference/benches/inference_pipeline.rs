use capture::Frame;
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use inference::{overlay::draw_detections, processing::post::PostProcessor};
use ndarray::{Array, IxDyn};
use preprocess::{CpuPreProcessor, Letterbox};

const NUM_ANCHORS: usize = 8400;
const NUM_CLASSES: usize = 80;

/// YOLO head output `[1, 4 + 80, 8400]` with `num_detections` confident anchors on a grid.
fn create_mock_yolo_output(num_detections: usize) -> Array<f32, IxDyn> {
    let channels = 4 + NUM_CLASSES;
    let mut data = vec![0.01f32; channels * NUM_ANCHORS];

    for i in 0..num_detections.min(NUM_ANCHORS) {
        let cx = 40.0 + (i % 10) as f32 * 60.0;
        let cy = 40.0 + (i / 10 % 10) as f32 * 60.0;
        data[i] = cx;
        data[NUM_ANCHORS + i] = cy;
        data[2 * NUM_ANCHORS + i] = 40.0;
        data[3 * NUM_ANCHORS + i] = 40.0;
        data[(4 + i % NUM_CLASSES) * NUM_ANCHORS + i] = 0.9;
    }

    Array::from_shape_vec(IxDyn(&[1, channels, NUM_ANCHORS]), data).unwrap()
}

fn letterbox_1080p() -> Letterbox {
    Letterbox {
        scale: 640.0 / 1920.0,
        offset_x: 0.0,
        offset_y: 140.0,
        orig_width: 1920,
        orig_height: 1080,
    }
}

fn benchmark_preprocessing(c: &mut Criterion) {
    let mut group = c.benchmark_group("preprocessing");

    let resolutions = [(640, 480), (1280, 720), (1920, 1080)];

    for (width, height) in resolutions.iter() {
        let frame = Frame::from_pixel(*width, *height, image::Rgb([128, 128, 128]));
        let mut preprocessor = CpuPreProcessor::new(640);

        group.bench_with_input(
            BenchmarkId::new("rgb_letterbox", format!("{}x{}", width, height)),
            &frame,
            |b, frame| {
                b.iter(|| {
                    preprocessor
                        .preprocess(
                            black_box(frame.as_raw()),
                            black_box(frame.width()),
                            black_box(frame.height()),
                        )
                        .unwrap()
                });
            },
        );
    }

    group.finish();
}

fn benchmark_postprocessing(c: &mut Criterion) {
    let mut group = c.benchmark_group("postprocessing");
    let post_processor = PostProcessor::new(0.7);
    let letterbox = letterbox_1080p();

    for num_detections in [0, 5, 20, 100].iter() {
        let predictions = create_mock_yolo_output(*num_detections);

        group.bench_with_input(
            BenchmarkId::new("decode_nms", num_detections),
            &predictions,
            |b, predictions| {
                b.iter(|| {
                    post_processor
                        .decode(
                            black_box(&predictions.view()),
                            black_box(&letterbox),
                            black_box(0.25),
                        )
                        .unwrap()
                });
            },
        );
    }

    group.finish();
}

fn benchmark_overlay(c: &mut Criterion) {
    let mut group = c.benchmark_group("overlay");

    let frame = Frame::new(1920, 1080);
    let predictions = create_mock_yolo_output(20);
    let detections = PostProcessor::new(0.7)
        .decode(&predictions.view(), &letterbox_1080p(), 0.25)
        .unwrap();

    group.bench_function("draw_20_boxes_1920x1080", |b| {
        b.iter(|| draw_detections(black_box(&frame), black_box(&detections)));
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_preprocessing,
    benchmark_postprocessing,
    benchmark_overlay
);
criterion_main!(benches);
