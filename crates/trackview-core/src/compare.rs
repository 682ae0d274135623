//! Side-by-side comparison of N runs: diff tables and plot datasets.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::store::EntityState;

/// Tags with this prefix are written by the tracking client itself and are
/// left out of comparisons.
pub const SYSTEM_TAG_PREFIX: &str = "mlflow.";

pub const CONTOUR_DISABLED_MESSAGE: &str = "Contour plots can only be rendered when comparing a group of runs with three or more unique metrics or params. Log more metrics or params to your runs to visualize them using the contour plot.";

// ─── Tables ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Section {
    Params,
    Tags,
    Metrics,
}

/// One key across every compared run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompareRow {
    pub key: String,
    /// One entry per run, in run order; `None` where the run lacks the key.
    pub values: Vec<Option<String>>,
    /// Whether the runs disagree. A missing value differs from any present one.
    pub diff: bool,
}

/// Sort keys numerically when every key is a number, lexicographically otherwise.
pub fn sort_keys(keys: &mut [String]) {
    let numeric: Option<Vec<f64>> = keys.iter().map(|k| k.trim().parse::<f64>().ok()).collect();
    match numeric {
        Some(_) => keys.sort_by(|a, b| {
            let a: f64 = a.trim().parse().unwrap_or(f64::NAN);
            let b: f64 = b.trim().parse().unwrap_or(f64::NAN);
            a.total_cmp(&b)
        }),
        None => keys.sort(),
    }
}

pub fn values_differ<T: PartialEq>(values: &[Option<T>]) -> bool {
    !values.windows(2).all(|w| w[0] == w[1])
}

/// Build one row per key seen in any run.
pub fn build_rows(per_run: &[HashMap<String, String>]) -> Vec<CompareRow> {
    let mut keys: Vec<String> = per_run
        .iter()
        .flat_map(|m| m.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    sort_keys(&mut keys);

    keys.into_iter()
        .map(|key| {
            let values: Vec<Option<String>> = per_run.iter().map(|m| m.get(&key).cloned()).collect();
            CompareRow {
                diff: values_differ(&values),
                key,
                values,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompareTable {
    pub run_uuids: Vec<String>,
    pub params: Vec<CompareRow>,
    pub tags: Vec<CompareRow>,
    pub metrics: Vec<CompareRow>,
}

impl CompareTable {
    pub fn build(entities: &EntityState, run_uuids: &[String]) -> Self {
        let params: Vec<HashMap<String, String>> = run_uuids
            .iter()
            .map(|id| {
                entities
                    .params(id)
                    .map(|p| p.values().map(|kv| (kv.key.clone(), kv.value.clone())).collect())
                    .unwrap_or_default()
            })
            .collect();
        let tags: Vec<HashMap<String, String>> = run_uuids
            .iter()
            .map(|id| {
                entities
                    .run_tags(id)
                    .map(|t| {
                        t.values()
                            .filter(|kv| !kv.key.starts_with(SYSTEM_TAG_PREFIX))
                            .map(|kv| (kv.key.clone(), kv.value.clone()))
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .collect();
        let metrics: Vec<HashMap<String, String>> = run_uuids
            .iter()
            .map(|id| {
                entities
                    .latest_metrics(id)
                    .map(|m| m.values().map(|m| (m.key.clone(), m.value.to_string())).collect())
                    .unwrap_or_default()
            })
            .collect();

        Self {
            run_uuids: run_uuids.to_vec(),
            params: build_rows(&params),
            tags: build_rows(&tags),
            metrics: build_rows(&metrics),
        }
    }

    pub fn rows(&self, section: Section, diff_only: bool) -> Vec<&CompareRow> {
        let rows = match section {
            Section::Params => &self.params,
            Section::Tags => &self.tags,
            Section::Metrics => &self.metrics,
        };
        rows.iter().filter(|r| !diff_only || r.diff).collect()
    }
}

// ─── Plot data ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum AxisKey {
    Param(String),
    Metric(String),
}

impl AxisKey {
    pub fn name(&self) -> &str {
        match self {
            AxisKey::Param(k) | AxisKey::Metric(k) => k,
        }
    }
}

/// Per-run value vectors shared by every comparison plot.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlotData {
    pub run_uuids: Vec<String>,
    pub params: HashMap<String, Vec<Option<String>>>,
    pub metrics: HashMap<String, Vec<Option<f64>>>,
}

impl PlotData {
    pub fn build(entities: &EntityState, run_uuids: &[String]) -> Self {
        let mut params: HashMap<String, Vec<Option<String>>> = HashMap::new();
        let mut metrics: HashMap<String, Vec<Option<f64>>> = HashMap::new();
        let n = run_uuids.len();

        for (i, id) in run_uuids.iter().enumerate() {
            for kv in entities.params(id).into_iter().flat_map(|p| p.values()) {
                params.entry(kv.key.clone()).or_insert_with(|| vec![None; n])[i] = Some(kv.value.clone());
            }
            for m in entities.latest_metrics(id).into_iter().flat_map(|m| m.values()) {
                metrics.entry(m.key.clone()).or_insert_with(|| vec![None; n])[i] = Some(m.value);
            }
        }

        Self {
            run_uuids: run_uuids.to_vec(),
            params,
            metrics,
        }
    }

    pub fn param_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.params.keys().cloned().collect();
        sort_keys(&mut keys);
        keys
    }

    pub fn metric_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.metrics.keys().cloned().collect();
        sort_keys(&mut keys);
        keys
    }

    /// Keys present in every run, for plots that need a value per run.
    pub fn shared_param_keys(&self) -> Vec<String> {
        self.param_keys()
            .into_iter()
            .filter(|k| self.params[k].iter().all(Option::is_some))
            .collect()
    }

    pub fn shared_metric_keys(&self) -> Vec<String> {
        self.metric_keys()
            .into_iter()
            .filter(|k| self.metrics[k].iter().all(Option::is_some))
            .collect()
    }

    /// Raw values for `key`, one per run.
    pub fn raw(&self, key: &AxisKey) -> Vec<Option<String>> {
        match key {
            AxisKey::Param(k) => self
                .params
                .get(k)
                .cloned()
                .unwrap_or_else(|| vec![None; self.run_uuids.len()]),
            AxisKey::Metric(k) => self
                .metrics
                .get(k)
                .map(|v| v.iter().map(|x| x.map(|f| f.to_string())).collect())
                .unwrap_or_else(|| vec![None; self.run_uuids.len()]),
        }
    }

    /// Numeric values for `key`, one per run; params that do not parse are `None`.
    pub fn numeric(&self, key: &AxisKey) -> Vec<Option<f64>> {
        match key {
            AxisKey::Param(k) => self
                .params
                .get(k)
                .map(|v| {
                    v.iter()
                        .map(|x| x.as_deref().and_then(|s| s.trim().parse::<f64>().ok()))
                        .collect()
                })
                .unwrap_or_else(|| vec![None; self.run_uuids.len()]),
            AxisKey::Metric(k) => self
                .metrics
                .get(k)
                .cloned()
                .unwrap_or_else(|| vec![None; self.run_uuids.len()]),
        }
    }
}

// ─── Scatter ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterPoint {
    pub run_uuid: String,
    pub x: f64,
    pub y: f64,
}

/// Default scatter axes: first param against first metric. With no params
/// the first two metrics are used, with no metrics the first two params.
pub fn default_scatter_axes(param_keys: &[String], metric_keys: &[String]) -> Option<(AxisKey, AxisKey)> {
    let x = match (param_keys.first(), metric_keys.first()) {
        (Some(p), _) => AxisKey::Param(p.clone()),
        (None, Some(m)) => AxisKey::Metric(m.clone()),
        (None, None) => return None,
    };
    let y = metric_keys
        .iter()
        .map(|k| AxisKey::Metric(k.clone()))
        .chain(param_keys.iter().map(|k| AxisKey::Param(k.clone())))
        .find(|k| *k != x)?;
    Some((x, y))
}

pub fn scatter_points(data: &PlotData, x: &AxisKey, y: &AxisKey) -> Vec<ScatterPoint> {
    let xs = data.numeric(x);
    let ys = data.numeric(y);
    data.run_uuids
        .iter()
        .zip(xs.into_iter().zip(ys))
        .filter_map(|(id, pair)| match pair {
            (Some(x), Some(y)) => Some(ScatterPoint {
                run_uuid: id.clone(),
                x,
                y,
            }),
            _ => None,
        })
        .collect()
}

// ─── Contour ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Axis {
    X,
    Y,
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Axis::X => write!(f, "X"),
            Axis::Y => write!(f, "Y"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContourAxes {
    pub x: AxisKey,
    pub y: AxisKey,
    pub z: AxisKey,
}

/// Default contour axes, or `None` when fewer than three keys exist.
pub fn default_contour_axes(param_keys: &[String], metric_keys: &[String]) -> Option<ContourAxes> {
    if param_keys.len() + metric_keys.len() < 3 {
        return None;
    }
    let p = |i: usize| AxisKey::Param(param_keys[i].clone());
    let m = |i: usize| AxisKey::Metric(metric_keys[i].clone());
    let axes = if param_keys.is_empty() {
        ContourAxes { x: m(0), y: m(1), z: m(2) }
    } else if metric_keys.is_empty() {
        ContourAxes { x: p(0), y: p(1), z: p(2) }
    } else if param_keys.len() == 1 {
        ContourAxes { x: p(0), y: m(0), z: m(1) }
    } else {
        ContourAxes { x: p(0), y: p(1), z: m(0) }
    };
    Some(axes)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ContourPlot {
    /// Not enough keys to pick three axes.
    Disabled { message: String },
    /// An axis has fewer than two distinct values.
    InsufficientData { axis: Axis, message: String },
    Ready {
        run_uuids: Vec<String>,
        x: Vec<f64>,
        y: Vec<f64>,
        z: Vec<f64>,
    },
}

fn distinct_count(values: &[f64]) -> usize {
    let mut v = values.to_vec();
    v.sort_by(|a, b| a.total_cmp(b));
    v.dedup();
    v.len()
}

impl ContourPlot {
    /// Build the contour dataset. `axes` overrides the defaults.
    pub fn build(data: &PlotData, axes: Option<&ContourAxes>) -> Self {
        let param_keys = data.param_keys();
        let metric_keys = data.metric_keys();
        let defaults = default_contour_axes(&param_keys, &metric_keys);
        let axes = match (axes, defaults.as_ref()) {
            (_, None) => {
                return ContourPlot::Disabled {
                    message: CONTOUR_DISABLED_MESSAGE.to_string(),
                }
            }
            (Some(chosen), _) => chosen,
            (None, Some(d)) => d,
        };

        let (xs, ys, zs) = (data.numeric(&axes.x), data.numeric(&axes.y), data.numeric(&axes.z));
        let mut run_uuids = vec![];
        let (mut x, mut y, mut z) = (vec![], vec![], vec![]);
        for (i, id) in data.run_uuids.iter().enumerate() {
            if let (Some(a), Some(b), Some(c)) = (xs[i], ys[i], zs[i]) {
                run_uuids.push(id.clone());
                x.push(a);
                y.push(b);
                z.push(c);
            }
        }

        for (axis, values) in [(Axis::X, &x), (Axis::Y, &y)] {
            if distinct_count(values) < 2 {
                return ContourPlot::InsufficientData {
                    axis,
                    message: format!("{axis} axis doesn't have enough unique data points"),
                };
            }
        }

        ContourPlot::Ready { run_uuids, x, y, z }
    }
}

// ─── Parallel coordinates ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DimensionValues {
    Numeric {
        values: Vec<f64>,
        range: (f64, f64),
    },
    /// Indices into `tick_labels`.
    Categorical {
        values: Vec<usize>,
        tick_labels: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dimension {
    pub label: String,
    pub values: DimensionValues,
}

/// Default parallel coordinates selection: the first three shared params and
/// the first shared metric.
pub fn default_parallel_selection(data: &PlotData) -> (Vec<String>, Vec<String>) {
    let params = data.shared_param_keys().into_iter().take(3).collect();
    let metrics = data.shared_metric_keys().into_iter().take(1).collect();
    (params, metrics)
}

fn dimension(label: &str, raw: Vec<String>) -> Dimension {
    let numeric: Option<Vec<f64>> = raw.iter().map(|s| s.trim().parse::<f64>().ok()).collect();
    let values = match numeric {
        Some(values) => {
            let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
            let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            DimensionValues::Numeric {
                values,
                range: (lo, hi),
            }
        }
        None => {
            let tick_labels: Vec<String> = raw.iter().cloned().collect::<BTreeSet<_>>().into_iter().collect();
            let values = raw
                .iter()
                .map(|v| tick_labels.binary_search(v).unwrap_or_default())
                .collect();
            DimensionValues::Categorical {
                values,
                tick_labels,
            }
        }
    };
    Dimension {
        label: label.to_string(),
        values,
    }
}

/// One dimension per selected key, over the runs that have every key.
pub fn parallel_coordinates(data: &PlotData, params: &[String], metrics: &[String]) -> Vec<Dimension> {
    let keys: Vec<AxisKey> = params
        .iter()
        .map(|k| AxisKey::Param(k.clone()))
        .chain(metrics.iter().map(|k| AxisKey::Metric(k.clone())))
        .collect();
    let columns: Vec<Vec<Option<String>>> = keys.iter().map(|k| data.raw(k)).collect();
    let complete: Vec<usize> = (0..data.run_uuids.len())
        .filter(|&i| columns.iter().all(|c| c[i].is_some()))
        .collect();

    keys.iter()
        .zip(columns)
        .map(|(key, column)| {
            let raw = complete
                .iter()
                .filter_map(|&i| column[i].clone())
                .collect();
            dimension(key.name(), raw)
        })
        .collect()
}
