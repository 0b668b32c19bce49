//! Save/load tests for the bundle store.

use acqdata::prelude::*;
use acqdata::ErrorKind;
use time::OffsetDateTime;

fn config() -> StoreConfig {
    StoreConfig::default().with_mmap(false)
}

fn timestamp() -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
}

/// A bundle touching every stored feature.
fn sample_bundle(reg: &UnitRegistry) -> Bundle {
    let time = Axis::uniform("time", reg.parse("s").unwrap(), 0.0, 0.1, 4).unwrap();
    let trace = DataContainer::raw("trace", vec![NdArray::from_vec(vec![1.0, 2.0, 3.0, 4.0])])
        .unwrap()
        .with_unit(reg.parse("mV").unwrap())
        .with_axis(time)
        .unwrap()
        .with_origin("scope")
        .with_extra("channel", 2i64)
        .with_extra("coupling", "dc");

    let rows = Axis::explicit("x", reg.parse("mm").unwrap(), vec![0.0, 0.5, 2.0]).unwrap();
    let cols = Axis::irregular("theta", reg.parse("rad").unwrap(), vec![0.3, 0.1]).with_index(1);
    let image = DataContainer::calculated(
        "map",
        vec![
            NdArray::new((3, 2), vec![1.0, -2.0, 3.0, -4.0, 5.0, -6.0])
                .unwrap()
                .with_dtype(DType::Int16),
            NdArray::new((3, 2), vec![0.25, 0.5, 0.75, 1.0, 1.25, 1.5])
                .unwrap()
                .with_dtype(DType::Float32),
        ],
    )
    .unwrap()
    .with_units(vec![reg.parse("counts").unwrap(), reg.parse("V/m").unwrap()])
    .unwrap()
    .with_labels(["raw", "field"])
    .unwrap()
    .with_axis(rows)
    .unwrap()
    .with_axis(cols)
    .unwrap();

    let power = DataContainer::raw("power", vec![NdArray::scalar(3.5)])
        .unwrap()
        .with_unit(reg.parse("W").unwrap())
        .with_dimensionality(Dimensionality::Scalar)
        .unwrap();

    Bundle::with_timestamp("frame", timestamp())
        .with(trace)
        .unwrap()
        .with(image)
        .unwrap()
        .with(power)
        .unwrap()
}

#[test]
fn test_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let reg = UnitRegistry::with_si();
    let bundle = sample_bundle(&reg);

    let store = Store::create(dir.path().join("run.acq"), &config()).unwrap();
    let report = store.save_bundle(&bundle, SaveMode::Overwrite).unwrap();
    assert!(report.is_complete());
    assert_eq!(report.saved, 3);
    assert_eq!(report.path, "/frame");

    let loaded = store.load_bundle("frame").unwrap();
    assert!(loaded.is_complete());
    assert_eq!(loaded.schema_version, 3);
    assert_eq!(loaded.bundle, bundle);
    assert_eq!(loaded.bundle.names(), vec!["trace", "map", "power"]);
    assert_eq!(loaded.bundle.created(), timestamp());

    let map = loaded.bundle.get("map").unwrap();
    assert_eq!(map.array(0).unwrap().dtype(), DType::Int16);
    assert!(map.axis(1).unwrap().is_irregular());
    assert_eq!(map.labels(), &["raw", "field"]);
}

#[test]
fn test_reopen_with_mmap() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.acq");
    let reg = UnitRegistry::with_si();
    let bundle = sample_bundle(&reg);
    {
        let store = Store::create(&path, &config()).unwrap();
        store.save_bundle(&bundle, SaveMode::Overwrite).unwrap();
    }
    let store = Store::open(&path, &StoreConfig::default().with_mmap(true)).unwrap();
    assert_eq!(store.load_bundle("frame").unwrap().bundle, bundle);
}

/// Array [1, 2, 3, 4] over a 0.1 s time axis survives a save/load cycle.
#[test]
fn test_time_trace_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let reg = UnitRegistry::with_si();
    let axis = Axis::uniform("time", reg.parse("s").unwrap(), 0.0, 0.1, 4).unwrap();
    let trace = DataContainer::raw("trace", vec![NdArray::from_vec(vec![1.0, 2.0, 3.0, 4.0])])
        .unwrap()
        .with_axis(axis)
        .unwrap();
    assert_eq!(trace.dimensionality(), Dimensionality::Data1D);

    let store = Store::create(dir.path().join("s.acq"), &config()).unwrap();
    store
        .save_bundle(&Bundle::new("scan").with(trace).unwrap(), SaveMode::Overwrite)
        .unwrap();
    let loaded = store.load_bundle("scan").unwrap().bundle;
    let trace = loaded.get("trace").unwrap();
    assert_eq!(trace.array(0).unwrap().values(), &[1.0, 2.0, 3.0, 4.0]);
    let axis = trace.axis(0).unwrap();
    assert_eq!(axis.label(), "time");
    assert_eq!(axis.unit(), &reg.parse("s").unwrap());
    assert_eq!(axis.unit().symbol(), "s");
}

#[test]
fn test_overwrite_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let reg = UnitRegistry::with_si();
    let bundle = sample_bundle(&reg);

    let once = Store::create(dir.path().join("once.acq"), &config()).unwrap();
    once.save_bundle(&bundle, SaveMode::Overwrite).unwrap();

    let twice = Store::create(dir.path().join("twice.acq"), &config()).unwrap();
    twice.save_bundle(&bundle, SaveMode::Overwrite).unwrap();
    twice.save_bundle(&bundle, SaveMode::Overwrite).unwrap();

    assert_eq!(twice.list_bundles(), once.list_bundles());
    assert_eq!(
        twice.load_bundle("frame").unwrap().bundle,
        once.load_bundle("frame").unwrap().bundle
    );

    // the second save left dead blocks behind
    let before = twice.file_size();
    twice.compact().unwrap();
    assert!(twice.file_size() < before);
    assert_eq!(twice.load_bundle("frame").unwrap().bundle, bundle);
}

#[test]
fn test_append_mode_suffixes() {
    let dir = tempfile::tempdir().unwrap();
    let reg = UnitRegistry::with_si();
    let store = Store::create(dir.path().join("s.acq"), &config()).unwrap();
    let bundle = sample_bundle(&reg);

    store.save_bundle(&bundle, SaveMode::Append).unwrap();
    let second = store.save_bundle(&bundle, SaveMode::Append).unwrap();
    assert_eq!(second.node_name, "frame_001");
    assert_eq!(store.list_bundles(), vec!["frame", "frame_001"]);

    let loaded = store.load_bundle("frame_001").unwrap().bundle;
    assert_eq!(loaded.name(), "frame_001");
    assert_eq!(loaded.containers(), bundle.containers());
}

#[test]
fn test_corrupt_payload_is_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("s.acq");
    let marker = 12345.678_f64;

    let good = DataContainer::raw("good", vec![NdArray::from_vec(vec![1.0, 2.0])]).unwrap();
    let bad = DataContainer::raw("bad", vec![NdArray::from_vec(vec![marker, marker])]).unwrap();
    let bundle = Bundle::new("frame").with(good).unwrap().with(bad).unwrap();
    Store::create(&path, &config())
        .unwrap()
        .save_bundle(&bundle, SaveMode::Overwrite)
        .unwrap();

    let mut bytes = std::fs::read(&path).unwrap();
    let needle = marker.to_le_bytes();
    let at = bytes
        .windows(needle.len())
        .position(|w| w == needle)
        .expect("payload bytes present");
    bytes[at] ^= 0xFF;
    std::fs::write(&path, bytes).unwrap();

    let store = Store::open(&path, &config()).unwrap();
    let loaded = store.load_bundle("frame").unwrap();
    assert_eq!(loaded.bundle.names(), vec!["good"]);
    assert_eq!(loaded.failures.len(), 1);
    let failure = &loaded.failures[0];
    assert_eq!(failure.path, "/frame/bad");
    assert_eq!(failure.error.kind(), ErrorKind::CorruptStore);
    let message = failure.error.to_string();
    assert!(message.contains("/frame/bad/data00"), "{}", message);
    assert!(message.contains("checksum"), "{}", message);
    assert!(message.contains("v3"), "{}", message);
}

#[test]
fn test_corrupt_inflated_length_is_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("z.acq");
    let ramp = |n: usize| NdArray::from_vec((0..n).map(|i| (i % 8) as f64).collect());

    let good = DataContainer::raw("good", vec![ramp(512)]).unwrap();
    let bad = DataContainer::raw("bad", vec![ramp(1000)]).unwrap();
    let bundle = Bundle::new("frame").with(good).unwrap().with(bad).unwrap();
    Store::create(&path, &config().with_compression(6))
        .unwrap()
        .save_bundle(&bundle, SaveMode::Overwrite)
        .unwrap();

    // array header: name, codec byte (zlib), raw_len
    let mut needle = b"data00".to_vec();
    needle.push(1);
    needle.extend_from_slice(&8000u64.to_le_bytes());
    let mut bytes = std::fs::read(&path).unwrap();
    let at = bytes
        .windows(needle.len())
        .position(|w| w == needle.as_slice())
        .expect("compressed array header present")
        + 7;
    bytes[at..at + 8].copy_from_slice(&u64::MAX.to_le_bytes());
    std::fs::write(&path, bytes).unwrap();

    let store = Store::open(&path, &config()).unwrap();
    let loaded = store.load_bundle("frame").unwrap();
    assert_eq!(loaded.bundle.names(), vec!["good"]);
    assert_eq!(loaded.failures.len(), 1);
    assert_eq!(loaded.failures[0].path, "/frame/bad");
    assert_eq!(loaded.failures[0].error.kind(), ErrorKind::CorruptStore);
    let message = loaded.failures[0].error.to_string();
    assert!(message.contains("/frame/bad/data00"), "{}", message);
}

/// Rewrite the attributes of the array node at `target` in a node spec tree.
fn patch_array(spec: &mut acqdata::node::NodeSpec, path: &str, target: &str, f: &dyn Fn(&mut Attributes)) {
    use acqdata::node::NodeSpec;
    match spec {
        NodeSpec::Group { name, children, .. } => {
            let path = if path.ends_with('/') { format!("{}{}", path, name) } else { format!("{}/{}", path, name) };
            for child in children {
                patch_array(child, &path, target, f);
            }
        }
        NodeSpec::Array { name, attrs, .. } if format!("{}/{}", path, name) == target => f(attrs),
        _ => {}
    }
}

#[test]
fn test_overflowing_shape_is_isolated() {
    use acqdata::node::{NodeFile, NodeOptions};

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shape.acq");
    let det = DataContainer::raw("det", vec![NdArray::from_vec(vec![1.0, 2.0])]).unwrap();
    let ok = DataContainer::raw("ok", vec![NdArray::from_vec(vec![3.0])]).unwrap();
    let bundle = Bundle::new("frame").with(det).unwrap().with(ok).unwrap();
    Store::create(&path, &config())
        .unwrap()
        .save_bundle(&bundle, SaveMode::Overwrite)
        .unwrap();

    let options = NodeOptions { use_mmap: false, ..NodeOptions::default() };
    let mut file = NodeFile::open(&path, options).unwrap();
    let mut spec = file.to_spec(file.root()).unwrap();
    patch_array(&mut spec, "", "/frame/det/data00", &|attrs| {
        attrs.set("shape", vec![1i64 << 40, 1i64 << 40]);
    });
    file.commit(&spec).unwrap();
    drop(file);

    let store = Store::open(&path, &config()).unwrap();
    let loaded = store.load_bundle("frame").unwrap();
    assert_eq!(loaded.bundle.names(), vec!["ok"]);
    assert_eq!(loaded.failures.len(), 1);
    assert_eq!(loaded.failures[0].path, "/frame/det");
    assert_eq!(loaded.failures[0].error.kind(), ErrorKind::CorruptStore);
    let message = loaded.failures[0].error.to_string();
    assert!(message.contains("/frame/det/data00"), "{}", message);
    assert!(message.contains("overflows"), "{}", message);
}

#[test]
fn test_overwrite_keeps_position_past_broken_sibling() {
    use acqdata::node::{NodeFile, NodeOptions};

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("order.acq");
    let run = |name: &str, v: f64| {
        Bundle::new(name)
            .with(DataContainer::raw("det", vec![NdArray::from_vec(vec![v])]).unwrap())
            .unwrap()
    };
    let store = Store::create(&path, &config()).unwrap();
    for (i, name) in ["alpha_run", "beta_run", "gamma_run"].iter().enumerate() {
        store.save_bundle(&run(name, i as f64), SaveMode::Overwrite).unwrap();
    }
    drop(store);

    // group header: kind, name length, name
    let mut needle = vec![0u8, 9, 0];
    needle.extend_from_slice(b"alpha_run");
    let mut bytes = std::fs::read(&path).unwrap();
    let at = bytes
        .windows(needle.len())
        .position(|w| w == needle.as_slice())
        .expect("bundle header present");
    bytes[at] = 0xff;
    std::fs::write(&path, bytes).unwrap();

    let store = Store::open(&path, &config()).unwrap();
    assert_eq!(store.list_bundles(), vec!["beta_run", "gamma_run"]);
    store.save_bundle(&run("beta_run", 10.0), SaveMode::Overwrite).unwrap();
    drop(store);

    let options = NodeOptions { use_mmap: false, writable: false, ..NodeOptions::default() };
    let file = NodeFile::open(&path, options).unwrap();
    let names: Vec<&str> = file
        .root()
        .children
        .iter()
        .map(|c| c.name.as_str())
        .filter(|n| n.ends_with("_run"))
        .collect();
    assert_eq!(names, vec!["beta_run", "gamma_run"]);

    let store = Store::open(&path, &config()).unwrap();
    let beta = store.load_bundle("beta_run").unwrap().bundle;
    assert_eq!(beta.get("det").unwrap().array(0).unwrap().values(), &[10.0]);
}

#[test]
fn test_compressed_store() {
    let dir = tempfile::tempdir().unwrap();
    let values: Vec<f64> = (0..4096).map(|i| (i % 16) as f64).collect();
    let bundle = Bundle::new("frame")
        .with(DataContainer::raw("ramp", vec![NdArray::from_vec(values)]).unwrap())
        .unwrap();

    let plain = Store::create(dir.path().join("plain.acq"), &config()).unwrap();
    plain.save_bundle(&bundle, SaveMode::Overwrite).unwrap();
    let packed = Store::create(dir.path().join("packed.acq"), &config().with_compression(6)).unwrap();
    packed.save_bundle(&bundle, SaveMode::Overwrite).unwrap();

    assert!(packed.file_size() * 4 < plain.file_size());
    assert_eq!(packed.load_bundle("frame").unwrap().bundle, bundle);
}

#[test]
fn test_store_management() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("s.acq");
    let reg = UnitRegistry::with_si();
    let store = Store::create(&path, &config()).unwrap();

    store.set_file_attribute("operator", "jdoe").unwrap();
    store.set_file_attribute("run", 42i64).unwrap();
    store.add_log("session started").unwrap();
    store.save_bundle(&sample_bundle(&reg), SaveMode::Overwrite).unwrap();
    let dark = Bundle::new("dark")
        .with(DataContainer::raw("det", vec![NdArray::zeros(3)]).unwrap())
        .unwrap();
    store.save_bundle(&dark, SaveMode::Overwrite).unwrap();
    store.add_log("frames saved").unwrap();

    assert_eq!(store.list_bundles(), vec!["frame", "dark"]);
    let logs = store.logs();
    assert_eq!(logs.len(), 2);
    assert!(logs[0].ends_with("session started"));
    assert!(logs[1].ends_with("frames saved"));

    store.remove_bundle("frame").unwrap();
    assert_eq!(store.list_bundles(), vec!["dark"]);
    assert!(matches!(store.remove_bundle("frame"), Err(Error::NotFound(_))));
    assert!(matches!(store.load_bundle("frame"), Err(Error::NotFound(_))));
    store.compact().unwrap();
    drop(store);

    let store = Store::open_read_only(&path, &config()).unwrap();
    assert!(store.is_read_only());
    let attrs = store.file_attributes();
    assert_eq!(attrs.get_str("operator"), Some("jdoe"));
    assert_eq!(attrs.get_int("run"), Some(42));
    assert!(attrs.get("schema-version").is_none());
    assert_eq!(store.logs().len(), 2);
    assert!(store.contains_bundle("dark"));
    assert!(matches!(store.add_log("nope"), Err(Error::ReadOnly)));
    assert!(matches!(
        store.save_bundle(&Bundle::new("x"), SaveMode::Overwrite),
        Err(Error::ReadOnly)
    ));

    let all = store.load_all();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].0, "dark");
    assert!(all[0].1.is_ok());
}

#[test]
fn test_concurrent_readers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("s.acq");
    let reg = UnitRegistry::with_si();
    let bundle = sample_bundle(&reg);
    Store::create(&path, &config())
        .unwrap()
        .save_bundle(&bundle, SaveMode::Overwrite)
        .unwrap();

    let shared = Store::open_read_only(&path, &config()).unwrap();
    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                let own = Store::open_read_only(&path, &StoreConfig::default()).unwrap();
                assert_eq!(own.load_bundle("frame").unwrap().bundle, bundle);
                assert_eq!(shared.load_bundle("frame").unwrap().bundle, bundle);
            });
        }
    });
}

#[test]
fn test_open_errors() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        Store::open(dir.path().join("missing.acq"), &config()),
        Err(Error::FileNotFound(_))
    ));

    let junk = dir.path().join("junk.acq");
    std::fs::write(&junk, b"definitely not a store file").unwrap();
    assert!(matches!(Store::open(&junk, &config()), Err(Error::InvalidMagic)));
}

#[test]
fn test_open_default_location() {
    let dir = tempfile::tempdir().unwrap();
    let config = config().with_data_dir(dir.path().join("nested/data"));
    let store = Store::open_default(&config).unwrap();
    assert_eq!(store.path(), config.default_path());
    assert!(config.default_path().exists());
}
