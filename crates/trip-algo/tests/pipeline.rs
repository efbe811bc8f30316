use std::fs;
use std::path::Path;
use tempfile::tempdir;

use trip_algo::pipeline::{features_key, load_data, Pipeline};
use trip_core::{LabelMode, Labels, MemoryStore, PipelineConfig, TripError};

const TRAIN_HEADER: &str = "id,vendor_id,pickup_datetime,dropoff_datetime,passenger_count,pickup_longitude,pickup_latitude,dropoff_longitude,dropoff_latitude,store_and_fwd_flag,trip_duration";
const TEST_HEADER: &str = "id,vendor_id,pickup_datetime,passenger_count,pickup_longitude,pickup_latitude,dropoff_longitude,dropoff_latitude,store_and_fwd_flag";
const ROUTE_HEADER: &str = "id,starting_street,end_street,total_distance,total_travel_time,number_of_steps";

/// Ten trips around Manhattan: eight with a duration, two without.
fn write_dataset(dir: &Path) {
    let mut train = vec![TRAIN_HEADER.to_string()];
    for i in 0..8 {
        let d = i as f64 * 0.007;
        train.push(format!(
            "id{i:02},{vendor},2016-0{month}-1{day} {hour:02}:{minute:02}:17,2016-0{month}-1{day} 23:59:00,{pax},{plng:.6},{plat:.6},{dlng:.6},{dlat:.6},N,{duration}",
            vendor = 1 + i % 2,
            month = 1 + i % 6,
            day = i % 9,
            hour = 6 + i,
            minute = 5 * i,
            pax = 1 + i % 3,
            plng = -73.99 + d,
            plat = 40.73 + d,
            dlng = -73.96 - d / 2.0,
            dlat = 40.78 - d,
            duration = 240 + 97 * i,
        ));
    }
    let mut test = vec![TEST_HEADER.to_string()];
    for i in 8..10 {
        test.push(format!(
            "id{i:02},1,2016-06-2{} 10:15:00,1,-73.975,40.751,-73.982,40.765,N",
            i - 8
        ));
    }
    fs::write(dir.join("train.csv"), train.join("\n") + "\n").unwrap();
    fs::write(dir.join("test.csv"), test.join("\n") + "\n").unwrap();

    fs::create_dir_all(dir.join("osrm")).unwrap();
    let route = |i: usize| {
        let (distance, time, steps) = (1000 + 150 * i, 100 + 20 * i, 3 + i);
        format!("id{i:02},A St,B St,{distance}.0,{time}.5,{steps}")
    };
    let part1: Vec<String> = (0..4).map(route).collect();
    // id07 has no route and is imputed.
    let part2: Vec<String> = (4..7).map(route).collect();
    fs::write(
        dir.join("osrm/fastest_routes_train_part_1.csv"),
        format!("{ROUTE_HEADER}\n{}\n", part1.join("\n")),
    )
    .unwrap();
    fs::write(
        dir.join("osrm/fastest_routes_train_part_2.csv"),
        format!("{ROUTE_HEADER}\n{}\n", part2.join("\n")),
    )
    .unwrap();
    // id09 has no route and is imputed from training statistics.
    fs::write(
        dir.join("osrm/fastest_routes_test.csv"),
        format!("{ROUTE_HEADER}\n{}\n", route(8)),
    )
    .unwrap();
}

fn config() -> PipelineConfig {
    PipelineConfig {
        valid_size: 0.25,
        output_size: 3,
        ..PipelineConfig::default()
    }
}

#[test]
fn ten_trip_scenario_shapes() {
    let data = tempdir().unwrap();
    write_dataset(data.path());
    let pipeline = Pipeline::new(MemoryStore::new(), config());
    let loaded = pipeline.load(data.path(), "train.csv", "test.csv").unwrap();

    let features = &loaded.features;
    assert_eq!(loaded.feature_count(), 22 + 2 * 12 + 3);
    assert_eq!(features.train.len(), 6);
    assert_eq!(features.valid.len(), 2);
    assert_eq!(features.test.len(), 2);
    assert_eq!(features.test_ids, vec!["id08", "id09"]);
    assert_eq!(features.train_targets.len(), 6);
    assert_eq!(features.valid_targets.len(), 2);
    for row in features.train.iter().chain(&features.valid).chain(&features.test) {
        assert_eq!(row.len(), loaded.feature_count());
        assert!(row.iter().all(|v| v.is_finite()));
    }

    let means = loaded.bucket_means();
    assert_eq!(means.len(), 3);
    assert!(means.windows(2).all(|w| w[0] < w[1]), "{means:?}");
    match &loaded.labels.train_labels {
        Labels::Hard(labels) => {
            assert_eq!(labels.len(), 6);
            assert!(labels.iter().all(|l| *l < 3));
        }
        other => panic!("expected hard labels, got {other:?}"),
    }
    assert_eq!(loaded.labels.valid_labels.len(), 2);
}

#[test]
fn training_split_is_standardized() {
    let data = tempdir().unwrap();
    write_dataset(data.path());
    let pipeline = Pipeline::new(MemoryStore::new(), config());
    let loaded = pipeline.load(data.path(), "train.csv", "test.csv").unwrap();

    let train = &loaded.features.train;
    let n = train.len() as f64;
    for col in 0..loaded.feature_count() {
        let mean = train.iter().map(|r| r[col]).sum::<f64>() / n;
        let var = train.iter().map(|r| (r[col] - mean).powi(2)).sum::<f64>() / n;
        assert!(mean.abs() < 1e-9, "column {col} mean {mean}");
        assert!(var.abs() < 1e-9 || (var - 1.0).abs() < 1e-9, "column {col} var {var}");
    }
}

#[test]
fn routing_misses_use_training_means() {
    let data = tempdir().unwrap();
    write_dataset(data.path());
    let pipeline = Pipeline::new(MemoryStore::new(), config());
    let loaded = pipeline.load(data.path(), "train.csv", "test.csv").unwrap();
    let features = &loaded.features;

    // Matched training routes are id00..id06.
    let expected_distance = (0..7).map(|i| 1000.0 + 150.0 * i as f64).sum::<f64>() / 7.0;
    let expected_steps = ((0..7).map(|i| 3.0 + i as f64).sum::<f64>() / 7.0).round_ties_even();
    assert!((features.imputer.mean_distance - expected_distance).abs() < 1e-9);
    assert_eq!(features.imputer.mean_steps, expected_steps);

    // id09 (second test row) was imputed; undo the scaling to check it.
    let col = features
        .feature_names
        .iter()
        .position(|n| n == "total_distance")
        .unwrap();
    let scaled = features.test[1][col];
    let raw = scaled * features.scaler.scale()[col] + features.scaler.mean()[col];
    assert!((raw - expected_distance).abs() < 1e-6, "{raw}");
}

#[test]
fn second_run_is_served_from_cache() {
    let data = tempdir().unwrap();
    write_dataset(data.path());
    let pipeline = Pipeline::new(MemoryStore::new(), config());

    let first = pipeline.load(data.path(), "train.csv", "test.csv").unwrap();
    assert_eq!(pipeline.cache().misses(), 2);
    assert_eq!(pipeline.cache().hits(), 0);

    let second = pipeline.load(data.path(), "train.csv", "test.csv").unwrap();
    assert_eq!(pipeline.cache().misses(), 2);
    assert_eq!(pipeline.cache().hits(), 2);
    assert_eq!(first, second);
}

#[test]
fn cache_key_ignores_data_location() {
    let data = tempdir().unwrap();
    write_dataset(data.path());
    let pipeline = Pipeline::new(MemoryStore::new(), config());
    pipeline.load(data.path(), "train.csv", "test.csv").unwrap();

    // The data is gone, but the cached result is keyed without the path.
    let moved = tempdir().unwrap();
    let again = pipeline.load(moved.path(), "train.csv", "test.csv").unwrap();
    assert_eq!(pipeline.cache().hits(), 2);
    assert_eq!(again.features.test.len(), 2);

    let mut other = config();
    other.geohash_precision = 8;
    assert_ne!(
        features_key("train.csv", "test.csv", &config()).digest(),
        features_key("train.csv", "test.csv", &other).digest()
    );
}

#[test]
fn soft_labels_are_distributions() {
    let data = tempdir().unwrap();
    write_dataset(data.path());
    let config = PipelineConfig {
        labels: LabelMode::Soft,
        ..config()
    };
    let loaded = Pipeline::new(MemoryStore::new(), config)
        .load(data.path(), "train.csv", "test.csv")
        .unwrap();
    let Labels::Soft(probs) = &loaded.labels.valid_labels else {
        panic!("expected soft labels");
    };
    for p in probs {
        assert_eq!(p.len(), 3);
        assert!(p.iter().all(|x| *x >= 0.0 && x.is_finite()));
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }
}

#[test]
fn disk_cache_lives_under_datadir() {
    let data = tempdir().unwrap();
    write_dataset(data.path());
    let first = load_data(data.path(), "train.csv", "test.csv", &config()).unwrap();
    assert!(data.path().join("cache/load_data").is_dir());
    assert!(data.path().join("cache/bucketize").is_dir());
    let second = load_data(data.path(), "train.csv", "test.csv", &config()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn read_only_input_is_copied_before_caching() {
    let data = tempdir().unwrap();
    write_dataset(data.path());
    let scratch = tempdir().unwrap();
    let config = PipelineConfig {
        cache_read_only: true,
        scratch_dir: scratch.path().join("copy"),
        ..config()
    };
    load_data(data.path(), "train.csv", "test.csv", &config).unwrap();
    assert!(!data.path().join("cache").exists());
    assert!(scratch.path().join("copy/train.csv").is_file());
    assert!(scratch.path().join("copy/cache").is_dir());
}

#[test]
fn failures_name_their_stage() {
    let data = tempdir().unwrap();
    write_dataset(data.path());
    fs::remove_file(data.path().join("osrm/fastest_routes_test.csv")).unwrap();
    let err = Pipeline::new(MemoryStore::new(), config())
        .load(data.path(), "train.csv", "test.csv")
        .unwrap_err();
    assert!(format!("{err:#}").contains("loading routing tables"));

    let data = tempdir().unwrap();
    write_dataset(data.path());
    let train = fs::read_to_string(data.path().join("train.csv")).unwrap();
    fs::write(
        data.path().join("train.csv"),
        train.replacen("40.730000", "140.730000", 1),
    )
    .unwrap();
    let err = Pipeline::new(MemoryStore::new(), config())
        .load(data.path(), "train.csv", "test.csv")
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TripError>(),
        Some(TripError::Validation(_))
    ));
    assert!(format!("{err:#}").contains("id00"));
}
