//! Run comparison tables and plot datasets.

mod common;

use std::collections::HashMap;

use common::run_with_data;
use trackview_core::actions::{Action, ActionPayload, Phase, RequestId};
use trackview_core::compare::{
    build_rows, default_contour_axes, default_parallel_selection, default_scatter_axes,
    parallel_coordinates, scatter_points, sort_keys, values_differ, Axis, AxisKey, CompareTable,
    ContourPlot, DimensionValues, PlotData, Section, CONTOUR_DISABLED_MESSAGE,
};
use trackview_core::models::{KeyValue, Run};
use trackview_core::store::EntityState;

fn state_with(runs: Vec<Run>) -> (EntityState, Vec<String>) {
    let mut state = EntityState::new();
    let mut ids = vec![];
    for r in runs {
        ids.push(r.info.run_uuid.clone());
        state
            .reduce(&Action::new(
                RequestId::new(),
                ActionPayload::GetRun {
                    run_uuid: r.info.run_uuid.clone(),
                    phase: Phase::Fulfilled(r),
                },
            ))
            .unwrap();
    }
    (state, ids)
}

fn strings(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_diff_flag_counts_missing_values() {
    assert!(values_differ(&[Some(0.1), Some(0.1), None]));
    assert!(!values_differ(&[Some(0.1), Some(0.1), Some(0.1)]));
    assert!(!values_differ::<f64>(&[None, None]));
    assert!(!values_differ(&[Some(1)]));
}

#[test]
fn test_table_rows_across_runs() {
    let (state, ids) = state_with(vec![
        run_with_data("a", &[("lr", "0.1"), ("bs", "32")], &[("loss", 0.5)]),
        run_with_data("b", &[("lr", "0.1"), ("bs", "64")], &[("loss", 0.5)]),
        run_with_data("c", &[("bs", "32")], &[("loss", 0.5)]),
    ]);
    let table = CompareTable::build(&state, &ids);

    let lr = table.params.iter().find(|r| r.key == "lr").unwrap();
    assert_eq!(lr.values, vec![Some("0.1".into()), Some("0.1".into()), None]);
    assert!(lr.diff);

    let loss = &table.metrics[0];
    assert_eq!(loss.key, "loss");
    assert!(!loss.diff);

    let diff_keys: Vec<&str> = table
        .rows(Section::Params, true)
        .iter()
        .map(|r| r.key.as_str())
        .collect();
    assert_eq!(diff_keys, vec!["bs", "lr"]);
    assert!(table.rows(Section::Metrics, true).is_empty());
    assert_eq!(table.rows(Section::Metrics, false).len(), 1);
}

#[test]
fn test_system_tags_are_hidden() {
    let mut r = run_with_data("a", &[], &[]);
    r.data.tags = vec![KeyValue::new("mlflow.user", "me"), KeyValue::new("team", "x")];
    let (state, ids) = state_with(vec![r]);
    let table = CompareTable::build(&state, &ids);
    let keys: Vec<&str> = table.tags.iter().map(|r| r.key.as_str()).collect();
    assert_eq!(keys, vec!["team"]);
}

#[test]
fn test_numeric_keys_sort_numerically() {
    let mut keys = strings(&["10", "9", "100", "1.5"]);
    sort_keys(&mut keys);
    assert_eq!(keys, strings(&["1.5", "9", "10", "100"]));

    let mut mixed = strings(&["10", "9", "b", "a"]);
    sort_keys(&mut mixed);
    assert_eq!(mixed, strings(&["10", "9", "a", "b"]));
}

#[test]
fn test_build_rows_from_maps() {
    let runs: Vec<HashMap<String, String>> = vec![
        HashMap::from([("2".to_string(), "x".to_string())]),
        HashMap::from([("10".to_string(), "y".to_string())]),
    ];
    let rows = build_rows(&runs);
    assert_eq!(rows.iter().map(|r| r.key.as_str()).collect::<Vec<_>>(), vec!["2", "10"]);
    assert!(rows.iter().all(|r| r.diff));
}

#[test]
fn test_contour_axis_defaults() {
    let p = |k: &str| AxisKey::Param(k.into());
    let m = |k: &str| AxisKey::Metric(k.into());

    let axes = default_contour_axes(&strings(&["a", "b", "c"]), &strings(&["x"])).unwrap();
    assert_eq!((axes.x, axes.y, axes.z), (p("a"), p("b"), m("x")));

    let axes = default_contour_axes(&strings(&["a"]), &strings(&["x", "y"])).unwrap();
    assert_eq!((axes.x, axes.y, axes.z), (p("a"), m("x"), m("y")));

    let axes = default_contour_axes(&[], &strings(&["x", "y", "z"])).unwrap();
    assert_eq!((axes.x, axes.y, axes.z), (m("x"), m("y"), m("z")));

    let axes = default_contour_axes(&strings(&["a", "b", "c"]), &[]).unwrap();
    assert_eq!((axes.x, axes.y, axes.z), (p("a"), p("b"), p("c")));

    assert!(default_contour_axes(&strings(&["a"]), &strings(&["x"])).is_none());
}

#[test]
fn test_contour_disabled_with_two_keys() {
    let (state, ids) = state_with(vec![
        run_with_data("a", &[("lr", "0.1")], &[("loss", 0.5)]),
        run_with_data("b", &[("lr", "0.2")], &[("loss", 0.4)]),
    ]);
    let data = PlotData::build(&state, &ids);
    assert_eq!(
        ContourPlot::build(&data, None),
        ContourPlot::Disabled {
            message: CONTOUR_DISABLED_MESSAGE.to_string()
        }
    );
}

#[test]
fn test_contour_x_axis_without_variance() {
    let (state, ids) = state_with(vec![
        run_with_data("a", &[("lr", "0.1"), ("bs", "32")], &[("loss", 0.5)]),
        run_with_data("b", &[("lr", "0.1"), ("bs", "64")], &[("loss", 0.4)]),
        run_with_data("c", &[("lr", "0.1"), ("bs", "128")], &[("loss", 0.3)]),
    ]);
    let data = PlotData::build(&state, &ids);
    // Defaults: x = bs, y = lr; pick lr as x explicitly.
    let axes = trackview_core::compare::ContourAxes {
        x: AxisKey::Param("lr".into()),
        y: AxisKey::Param("bs".into()),
        z: AxisKey::Metric("loss".into()),
    };
    assert_eq!(
        ContourPlot::build(&data, Some(&axes)),
        ContourPlot::InsufficientData {
            axis: Axis::X,
            message: "X axis doesn't have enough unique data points".into()
        }
    );
    match ContourPlot::build(&data, None) {
        ContourPlot::InsufficientData { axis, message } => {
            assert_eq!(axis, Axis::Y);
            assert_eq!(message, "Y axis doesn't have enough unique data points");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_contour_ready_skips_incomplete_runs() {
    let (state, ids) = state_with(vec![
        run_with_data("a", &[("lr", "0.1"), ("bs", "32")], &[("loss", 0.5)]),
        run_with_data("b", &[("lr", "0.2"), ("bs", "64")], &[("loss", 0.4)]),
        run_with_data("c", &[("lr", "0.3")], &[("loss", 0.3)]),
    ]);
    let data = PlotData::build(&state, &ids);
    match ContourPlot::build(&data, None) {
        ContourPlot::Ready { run_uuids, x, y, z } => {
            assert_eq!(run_uuids, vec!["a", "b"]);
            assert_eq!(x, vec![32.0, 64.0]);
            assert_eq!(y, vec![0.1, 0.2]);
            assert_eq!(z, vec![0.5, 0.4]);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_scatter_defaults_and_points() {
    let (state, ids) = state_with(vec![
        run_with_data("a", &[("lr", "0.1")], &[("loss", 0.5)]),
        run_with_data("b", &[("lr", "n/a")], &[("loss", 0.4)]),
    ]);
    let data = PlotData::build(&state, &ids);
    let (x, y) = default_scatter_axes(&data.param_keys(), &data.metric_keys()).unwrap();
    assert_eq!(x, AxisKey::Param("lr".into()));
    assert_eq!(y, AxisKey::Metric("loss".into()));

    let points = scatter_points(&data, &x, &y);
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].run_uuid, "a");

    let (x, y) = default_scatter_axes(&[], &strings(&["m1", "m2"])).unwrap();
    assert_eq!(x, AxisKey::Metric("m1".into()));
    assert_eq!(y, AxisKey::Metric("m2".into()));

    let (x, y) = default_scatter_axes(&strings(&["p1", "p2"]), &[]).unwrap();
    assert_eq!(x, AxisKey::Param("p1".into()));
    assert_eq!(y, AxisKey::Param("p2".into()));

    assert!(default_scatter_axes(&[], &strings(&["m1"])).is_none());
    assert!(default_scatter_axes(&[], &[]).is_none());
}

#[test]
fn test_parallel_coordinates_dimensions() {
    let (state, ids) = state_with(vec![
        run_with_data("a", &[("lr", "0.1"), ("opt", "adam")], &[("loss", 0.5)]),
        run_with_data("b", &[("lr", "0.3"), ("opt", "sgd")], &[("loss", 0.4)]),
        run_with_data("c", &[("opt", "adam")], &[("loss", 0.2)]),
    ]);
    let data = PlotData::build(&state, &ids);

    let (params, metrics) = default_parallel_selection(&data);
    assert_eq!(params, strings(&["opt"]));
    assert_eq!(metrics, strings(&["loss"]));

    let dims = parallel_coordinates(&data, &strings(&["lr", "opt"]), &metrics);
    assert_eq!(dims.len(), 3);
    assert_eq!(
        dims[0].values,
        DimensionValues::Numeric {
            values: vec![0.1, 0.3],
            range: (0.1, 0.3)
        }
    );
    assert_eq!(
        dims[1].values,
        DimensionValues::Categorical {
            values: vec![0, 1],
            tick_labels: strings(&["adam", "sgd"])
        }
    );
    assert_eq!(dims[2].label, "loss");
}
