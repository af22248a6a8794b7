use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array2;
use olivewatch::encoder::{encode_training_matrix, FeatureSchema, TargetEncoders};
use olivewatch::{
    label_records, normalize, MultiOutputClassifier, MultiOutputTrainer, Predictor, RandomForest, RandomForestBuilder,
    WeatherRecord,
};
use serde_json::json;

fn synthetic_records(n: usize) -> Vec<WeatherRecord> {
    (0..n)
        .map(|i| {
            let mut r = WeatherRecord::empty(format!("2024-{:02}-{:02}", i % 12 + 1, i % 28 + 1), format!("city-{}", i % 8));
            let temp = (i * 7 % 45) as f64;
            r.temperature_c = temp;
            r.temperature_max_c = temp + (i % 7) as f64;
            r.temperature_min_c = temp - (i % 5) as f64;
            r.humidite_pct = (i * 13 % 100) as f64;
            r.pluie_mm = (i * 3 % 17) as f64 * 0.8;
            r.vitesse_vent_max_kmh = (i % 40) as f64;
            r.code_meteo_dominant = Some([0, 3, 61, 63][i % 4]);
            r
        })
        .collect()
}

fn training_set(n: usize) -> (Vec<WeatherRecord>, FeatureSchema, Array2<f64>, Array2<usize>, TargetEncoders) {
    let records = normalize(&synthetic_records(n));
    let labels = label_records(&records);
    let schema = FeatureSchema::from_records(&records);
    let x = encode_training_matrix(&records, &schema).unwrap();
    let encoders = TargetEncoders::fit(&labels);
    let y = encoders.encode_labels(&labels).unwrap();
    (records, schema, x, y, encoders)
}

fn bench_labeling(c: &mut Criterion) {
    let mut group = c.benchmark_group("Labeling");
    group.sample_size(50);
    group.warm_up_time(std::time::Duration::from_secs(1));

    for n in [1_000, 10_000] {
        let records = synthetic_records(n);
        group.bench_with_input(BenchmarkId::new("normalize_and_label", n), &records, |b, records| {
            b.iter(|| label_records(&normalize(black_box(records))))
        });
    }

    group.finish();
}

fn bench_training(c: &mut Criterion) {
    let mut group = c.benchmark_group("Training");
    group.sample_size(10);

    let (_, _, x, y, _) = training_set(2_000);
    for n_trees in [10, 50] {
        let trainer = RandomForestBuilder::new().n_trees(n_trees).build().unwrap();
        group.bench_function(BenchmarkId::new("fit", n_trees), |b| {
            b.iter(|| trainer.fit(black_box(x.view()), black_box(y.view())).unwrap())
        });
    }

    group.finish();
}

fn bench_prediction(c: &mut Criterion) {
    let mut group = c.benchmark_group("Prediction");
    group.sample_size(50);
    group.warm_up_time(std::time::Duration::from_secs(1));

    let (records, schema, x, y, encoders) = training_set(2_000);
    let forest: RandomForest = RandomForestBuilder::new().build().unwrap().fit(x.view(), y.view()).unwrap();

    group.bench_function("batch_matrix", |b| b.iter(|| forest.predict(black_box(x.view())).unwrap()));

    let predictor = Predictor::new(forest, encoders, schema).unwrap();
    group.bench_function("batch_records", |b| {
        b.iter(|| predictor.predict_records(black_box(&records)).unwrap())
    });

    let request = json!({"temp_c": 38, "temp_max_c": 42, "temp_min_c": 34, "humidite_pct": 30, "pluie_mm": 0});
    group.bench_function("single_request", |b| b.iter(|| predictor.respond(black_box(&request))));

    group.finish();
}

criterion_group!(benches, bench_labeling, bench_training, bench_prediction);
criterion_main!(benches);
