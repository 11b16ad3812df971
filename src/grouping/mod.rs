//! Partitions classified results by dimension tuples and pivots groups into series.

use chrono::NaiveDate;
use rustc_hash::FxHashMap;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::gain::GainResult;
use crate::record::ReducedRecord;

/// An `f64` usable as a key: equality, hashing and ordering follow `total_cmp`.
#[derive(Clone, Copy, Debug)]
pub struct Ratio(pub f64);

impl Ratio {
    fn normalized(&self) -> f64 {
        // -0.0 and 0.0 share a bucket
        if self.0 == 0.0 {
            0.0
        } else {
            self.0
        }
    }
}

impl PartialEq for Ratio {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ratio {}

impl PartialOrd for Ratio {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ratio {
    fn cmp(&self, other: &Self) -> Ordering {
        self.normalized().total_cmp(&other.normalized())
    }
}

impl Hash for Ratio {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized().to_bits().hash(state);
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Ratio {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.0)
    }
}

#[derive(Serialize, Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Branch,
    Agent,
    Family,
    Field,
    Algorithm,
    Density,
    ErasureRate,
    Symbols,
    SymbolSize,
    Date,
}

impl Dimension {
    pub fn name(&self) -> &'static str {
        match self {
            Dimension::Branch => "branch",
            Dimension::Agent => "agent",
            Dimension::Family => "family",
            Dimension::Field => "field",
            Dimension::Algorithm => "algorithm",
            Dimension::Density => "density",
            Dimension::ErasureRate => "erasure_rate",
            Dimension::Symbols => "symbols",
            Dimension::SymbolSize => "symbol_size",
            Dimension::Date => "date",
        }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(untagged)]
pub enum DimensionValue {
    Count(u64),
    Ratio(Ratio),
    Date(NaiveDate),
    Text(String),
}

impl fmt::Display for DimensionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DimensionValue::Count(n) => write!(f, "{n}"),
            DimensionValue::Ratio(r) => write!(f, "{r}"),
            DimensionValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            DimensionValue::Text(s) => f.write_str(s),
        }
    }
}

pub type GroupKey = Vec<DimensionValue>;

/// Renders a key as `a_b_c`, the stem used for per-group artifacts.
pub fn key_label(key: &[DimensionValue]) -> String {
    key.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("_")
}

/// Anything that exposes values along grouping dimensions.
pub trait Dimensioned {
    /// `None` when the item has no value for `dimension`.
    fn dimension(&self, dimension: Dimension) -> Option<DimensionValue>;
}

/// The number plotted for an item, and its spread if it has one.
pub trait Valued {
    fn value(&self) -> f64;

    fn spread(&self) -> Option<f64> {
        None
    }
}

fn text(s: &str) -> Option<DimensionValue> {
    Some(DimensionValue::Text(s.to_string()))
}

impl Dimensioned for ReducedRecord {
    fn dimension(&self, dimension: Dimension) -> Option<DimensionValue> {
        match dimension {
            Dimension::Branch => text(&self.record.branch),
            Dimension::Agent => text(&self.record.agent),
            Dimension::Family => text(self.labels.family.as_str()),
            Dimension::Field => text(self.labels.field),
            Dimension::Algorithm => text(self.labels.algorithm),
            Dimension::Density => self.record.density.map(|d| DimensionValue::Ratio(Ratio(d))),
            Dimension::ErasureRate => self
                .record
                .erasure_rate
                .map(|r| DimensionValue::Ratio(Ratio(r))),
            Dimension::Symbols => Some(DimensionValue::Count(self.record.symbols)),
            Dimension::SymbolSize => Some(DimensionValue::Count(self.record.symbol_size)),
            Dimension::Date => self
                .record
                .utc_date
                .map(|date| DimensionValue::Date(date.date_naive())),
        }
    }
}

impl Valued for ReducedRecord {
    fn value(&self) -> f64 {
        self.summary.mean
    }

    fn spread(&self) -> Option<f64> {
        Some(self.summary.std_dev)
    }
}

impl Dimensioned for GainResult {
    fn dimension(&self, dimension: Dimension) -> Option<DimensionValue> {
        match dimension {
            Dimension::Branch => text(&self.branch),
            Dimension::Agent => text(&self.agent),
            Dimension::Family => text(self.key.family.as_str()),
            Dimension::Field => text(self.key.field),
            Dimension::Algorithm => text(self.key.algorithm),
            Dimension::Density => self.key.density.map(DimensionValue::Ratio),
            Dimension::ErasureRate => self.key.erasure_rate.map(DimensionValue::Ratio),
            Dimension::Symbols => Some(DimensionValue::Count(self.key.symbols)),
            Dimension::SymbolSize => Some(DimensionValue::Count(self.key.symbol_size)),
            Dimension::Date => None,
        }
    }
}

impl Valued for GainResult {
    fn value(&self) -> f64 {
        self.gain_percent
    }
}

/// Result of [`group_by`]: groups in first-seen key order, members in input order.
#[derive(Debug)]
pub struct Grouping<'a, T> {
    keys: Vec<GroupKey>,
    members: Vec<Vec<&'a T>>,
    excluded: usize,
}

impl<'a, T> Grouping<'a, T> {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Items left out because they lacked a requested dimension.
    pub fn excluded(&self) -> usize {
        self.excluded
    }

    pub fn grouped(&self) -> usize {
        self.members.iter().map(Vec::len).sum()
    }

    pub fn get(&self, key: &[DimensionValue]) -> Option<&[&'a T]> {
        self.keys
            .iter()
            .position(|k| k.as_slice() == key)
            .map(|i| self.members[i].as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GroupKey, &[&'a T])> {
        self.keys
            .iter()
            .zip(self.members.iter().map(Vec::as_slice))
    }
}

fn key_of<T: Dimensioned>(item: &T, dimensions: &[Dimension]) -> Option<GroupKey> {
    dimensions.iter().map(|&d| item.dimension(d)).collect()
}

/// Partitions `items` by their values along `dimensions`.
///
/// An item missing any requested dimension is excluded and counted, never
/// placed in a default bucket.
pub fn group_by<'a, T, I>(items: I, dimensions: &[Dimension]) -> Grouping<'a, T>
where
    T: Dimensioned + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut index: FxHashMap<GroupKey, usize> = FxHashMap::default();
    let mut grouping = Grouping {
        keys: Vec::new(),
        members: Vec::new(),
        excluded: 0,
    };

    for item in items {
        let Some(key) = key_of(item, dimensions) else {
            grouping.excluded += 1;
            continue;
        };
        let slot = match index.get(&key) {
            Some(&slot) => slot,
            None => {
                let slot = grouping.keys.len();
                index.insert(key.clone(), slot);
                grouping.keys.push(key);
                grouping.members.push(Vec::new());
                slot
            }
        };
        grouping.members[slot].push(item);
    }

    grouping
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Point {
    pub x: DimensionValue,
    pub y: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spread: Option<f64>,
}

/// One plotted line: its legend key and points sorted by `x`.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Series {
    pub line: GroupKey,
    pub points: Vec<Point>,
}

/// Pivots group members into lines keyed by `line_dimensions` with points along `x`.
///
/// Members sharing a line and an `x` value are averaged, value and spread alike.
/// Lines with no member carrying an `x` value are dropped.
pub fn pivot<T>(members: &[&T], line_dimensions: &[Dimension], x: Dimension) -> Vec<Series>
where
    T: Dimensioned + Valued,
{
    let lines = group_by(members.iter().copied(), line_dimensions);
    let mut series: Vec<Series> = lines
        .iter()
        .filter_map(|(line, items)| {
            let mut by_x: Vec<(DimensionValue, Vec<&T>)> = Vec::new();
            for item in items.iter().copied() {
                let Some(value) = item.dimension(x) else {
                    continue;
                };
                match by_x.iter_mut().find(|(existing, _)| *existing == value) {
                    Some((_, bucket)) => bucket.push(item),
                    None => by_x.push((value, vec![item])),
                }
            }
            by_x.sort_by(|a, b| a.0.cmp(&b.0));

            if by_x.is_empty() {
                return None;
            }

            let points = by_x
                .into_iter()
                .map(|(x, bucket)| {
                    let n = bucket.len() as f64;
                    let y = bucket.iter().map(|i| i.value()).sum::<f64>() / n;
                    let spreads: Option<Vec<f64>> = bucket.iter().map(|i| i.spread()).collect();
                    Point {
                        x,
                        y,
                        spread: spreads.map(|s| s.iter().sum::<f64>() / n),
                    }
                })
                .collect();

            Some(Series {
                line: line.clone(),
                points,
            })
        })
        .collect();

    series.sort_by(|a, b| a.line.cmp(&b.line));
    series
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::BenchmarkRecord;
    use crate::stats::Summary;
    use crate::taxonomy::{CodeFamily, Labels};
    use proptest::prelude::*;

    fn reduced(agent: &str, symbols: u64, symbol_size: u64, density: Option<f64>, mean: f64) -> ReducedRecord {
        ReducedRecord {
            record: BenchmarkRecord {
                branch: "master".into(),
                agent: agent.into(),
                testcase: "FullRLNC".into(),
                benchmark: "Binary8".into(),
                symbols,
                symbol_size,
                density,
                sample_values: vec![mean],
                ..Default::default()
            },
            labels: Labels {
                field: "2^8",
                algorithm: "Standard",
                family: CodeFamily::Dense,
            },
            summary: Summary { mean, std_dev: 1.0 },
        }
    }

    #[test]
    fn groups_preserve_first_seen_and_input_order() {
        let records = vec![
            reduced("a2", 16, 1600, None, 1.0),
            reduced("a1", 16, 1600, None, 2.0),
            reduced("a2", 32, 1600, None, 3.0),
        ];
        let grouping = group_by(&records, &[Dimension::Agent, Dimension::SymbolSize]);

        assert_eq!(grouping.len(), 2);
        let keys: Vec<String> = grouping.iter().map(|(k, _)| key_label(k)).collect();
        assert_eq!(keys, vec!["a2_1600", "a1_1600"]);

        let a2 = grouping
            .get(&[DimensionValue::Text("a2".into()), DimensionValue::Count(1600)])
            .unwrap();
        let means: Vec<f64> = a2.iter().map(|r| r.mean()).collect();
        assert_eq!(means, vec![1.0, 3.0]);
    }

    #[test]
    fn missing_dimension_excludes_record() {
        let records = vec![
            reduced("a1", 16, 1600, Some(0.5), 1.0),
            reduced("a1", 16, 1600, None, 2.0),
        ];
        let grouping = group_by(&records, &[Dimension::Field, Dimension::Density]);
        assert_eq!(grouping.len(), 1);
        assert_eq!(grouping.grouped(), 1);
        assert_eq!(grouping.excluded(), 1);
    }

    #[test]
    fn pivot_sorts_points_and_averages_duplicates() {
        let records = vec![
            reduced("a1", 32, 1600, None, 4.0),
            reduced("a1", 16, 1600, None, 2.0),
            reduced("a1", 16, 1600, None, 6.0),
        ];
        let members: Vec<&ReducedRecord> = records.iter().collect();
        let series = pivot(&members, &[Dimension::Field, Dimension::Algorithm], Dimension::Symbols);

        assert_eq!(series.len(), 1);
        assert_eq!(key_label(&series[0].line), "2^8_Standard");
        let xs: Vec<String> = series[0].points.iter().map(|p| p.x.to_string()).collect();
        assert_eq!(xs, vec!["16", "32"]);
        assert_eq!(series[0].points[0].y, 4.0);
        assert_eq!(series[0].points[0].spread, Some(1.0));
    }

    #[test]
    fn ratio_keys_merge_signed_zero() {
        assert_eq!(Ratio(0.0), Ratio(-0.0));
        assert!(Ratio(0.1) < Ratio(0.5));
    }

    proptest! {
        #[test]
        fn grouping_is_a_partition(
            rows in prop::collection::vec((0u8..3, 0u64..4, prop::option::of(0u8..3)), 0..40)
        ) {
            let records: Vec<ReducedRecord> = rows
                .iter()
                .map(|&(agent, symbols, density)| {
                    reduced(
                        &format!("a{agent}"),
                        16 << symbols,
                        1600,
                        density.map(|d| f64::from(d) / 4.0),
                        1.0,
                    )
                })
                .collect();

            let grouping = group_by(&records, &[Dimension::Agent, Dimension::Density]);
            let with_density = records.iter().filter(|r| r.record.density.is_some()).count();
            prop_assert_eq!(grouping.grouped(), with_density);
            prop_assert_eq!(grouping.grouped() + grouping.excluded(), records.len());

            let mut seen: Vec<*const ReducedRecord> = grouping
                .iter()
                .flat_map(|(_, members)| members.iter().map(|r| *r as *const ReducedRecord))
                .collect();
            seen.sort();
            seen.dedup();
            prop_assert_eq!(seen.len(), with_density);
        }
    }
}
