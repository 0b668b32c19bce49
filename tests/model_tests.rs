//! Data model behaviour through the public API.

use acqdata::prelude::*;
use acqdata::ErrorKind;

#[test]
fn test_unit_conversion_roundtrip() {
    let reg = UnitRegistry::with_si();
    let pairs = [
        ("m", "um"),
        ("mV", "kV"),
        ("Hz", "1/ms"),
        ("W", "J/s"),
        ("bar", "Pa"),
        ("eV", "mJ"),
        ("deg", "rad"),
        ("min", "ms"),
    ];
    for (a, b) in pairs {
        let (ua, ub) = (reg.parse(a).unwrap(), reg.parse(b).unwrap());
        let q = Quantity::from_values(vec![-3.5, 0.0, 1.25, 1e6], ua.clone());
        let back = q.convert(&ub).unwrap().convert(&ua).unwrap();
        assert!(back.approx_eq(&q, 1e-12), "{} <-> {}", a, b);
    }

    let err = Quantity::new(1.0, reg.parse("s").unwrap())
        .convert(&reg.parse("m").unwrap())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unit);
    assert!(err.to_string().contains("'s'") && err.to_string().contains("'m'"));
}

#[test]
fn test_time_axis_scenario() {
    let reg = UnitRegistry::with_si();
    let axis = Axis::uniform("time", reg.parse("s").unwrap(), 0.0, 0.1, 5).unwrap();
    let expected = [0.0, 0.1, 0.2, 0.3, 0.4];
    for (i, v) in axis.values().iter().enumerate() {
        assert!((v - expected[i]).abs() < 1e-12);
    }

    let sliced = axis.slice(1..4).unwrap();
    assert_eq!(sliced.size(), 3);
    assert!((sliced.offset().unwrap() - 0.1).abs() < 1e-12);
    for (v, e) in sliced.values().iter().zip([0.1, 0.2, 0.3]) {
        assert!((v - e).abs() < 1e-12);
    }
}

#[test]
fn test_mismatched_axis_is_rejected() {
    let reg = UnitRegistry::with_si();
    let data = DataContainer::raw("trace", vec![NdArray::from_vec(vec![1.0, 2.0, 3.0, 4.0])]).unwrap();
    for size in [3, 5] {
        let axis = Axis::uniform("time", reg.parse("s").unwrap(), 0.0, 0.1, size).unwrap();
        let err = data.clone().with_axis(axis).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { axis_size, dim_size: 4, .. } if axis_size == size));
    }
    assert!(matches!(
        Axis::new("x", Unit::dimensionless(), AxisData::Explicit(vec![1.0, 2.0]), 3),
        Err(Error::AxisSize { expected: 3, actual: 2, .. })
    ));
}

#[test]
fn test_container_arithmetic_scenarios() {
    let reg = UnitRegistry::with_si();
    let trace = |n: usize, scaling: f64| {
        let axis = Axis::uniform("time", reg.parse("s").unwrap(), 0.0, scaling, n).unwrap();
        DataContainer::raw("trace", vec![NdArray::from_vec(vec![1.0; n])])
            .unwrap()
            .with_axis(axis)
            .unwrap()
    };

    let err = trace(4, 0.1).add(&trace(5, 0.1)).unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { .. }));
    assert!(err.to_string().contains("(4)") && err.to_string().contains("(5)"));

    let err = trace(4, 0.1).add(&trace(4, 0.2)).unwrap_err();
    assert!(matches!(err, Error::AxisMismatch { index: 0, .. }));

    let sum = trace(4, 0.1).add(&trace(4, 0.1)).unwrap();
    assert_eq!(sum.source(), Source::Calculated);
    assert_eq!(sum.dimensionality(), Dimensionality::Data1D);
    assert_eq!(sum.array(0).unwrap().values(), &[2.0; 4]);
}

#[test]
fn test_slice_then_store() {
    let dir = tempfile::tempdir().unwrap();
    let reg = UnitRegistry::with_si();
    let rows = Axis::uniform("y", reg.parse("um").unwrap(), 10.0, 2.0, 2).unwrap();
    let cols = Axis::explicit("x", reg.parse("um").unwrap(), vec![0.0, 1.0, 3.0])
        .unwrap()
        .with_index(1);
    let image = DataContainer::raw(
        "image",
        vec![NdArray::new((2, 3), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap()],
    )
    .unwrap()
    .with_axis(rows)
    .unwrap()
    .with_axis(cols)
    .unwrap();

    let line = image.slice_axis("y", SliceSpec::Index(1)).unwrap().with_name("line");
    assert_eq!(line.dimensionality(), Dimensionality::Data1D);
    assert_eq!(line.array(0).unwrap().values(), &[4.0, 5.0, 6.0]);
    assert_eq!(line.axis(0).unwrap().label(), "x");

    let bundle = Bundle::new("frame").with(image).unwrap().with(line).unwrap();
    let store = Store::create(dir.path().join("slice.acq"), &StoreConfig::default()).unwrap();
    store.save_bundle(&bundle, SaveMode::Overwrite).unwrap();
    assert_eq!(store.load_bundle("frame").unwrap().bundle, bundle);
}
