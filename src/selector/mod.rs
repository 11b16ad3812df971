use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::record::{ReducedRecord, VariantKey};

/// Picks the record with the highest build number.
///
/// Ties keep the first record encountered, so the result only depends on input order.
pub fn select_latest<'a, I>(records: I) -> Option<&'a ReducedRecord>
where
    I: IntoIterator<Item = &'a ReducedRecord>,
{
    records.into_iter().fold(None, |best, record| match best {
        Some(best) if best.record.build_number >= record.record.build_number => Some(best),
        _ => Some(record),
    })
}

/// The latest build of one branch on one agent, one result per code variant.
#[derive(Serialize, Clone, Debug)]
pub struct AuthoritativeSet {
    pub branch: String,
    pub agent: String,
    pub build_number: u64,
    pub results: Vec<ReducedRecord>,
}

impl AuthoritativeSet {
    pub fn find(&self, key: &VariantKey) -> Option<&ReducedRecord> {
        self.results.iter().find(|r| &r.variant_key() == key)
    }
}

/// A second record for a variant already present in the same build.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct DuplicateVariant {
    pub branch: String,
    pub agent: String,
    pub build_number: u64,
    pub key: VariantKey,
}

#[derive(Debug, Default)]
pub struct Selection {
    pub sets: Vec<AuthoritativeSet>,
    pub duplicates: Vec<DuplicateVariant>,
}

impl Selection {
    pub fn for_agent(&self, agent: &str) -> Option<&AuthoritativeSet> {
        self.sets.iter().find(|set| set.agent == agent)
    }
}

/// Selects the authoritative result set for every (branch, agent) pair present.
///
/// Sets come out in the order their pair was first seen.
pub fn select_authoritative(records: &[ReducedRecord]) -> Selection {
    let mut index: FxHashMap<(&str, &str), usize> = FxHashMap::default();
    let mut partitions: Vec<Vec<&ReducedRecord>> = Vec::new();

    for record in records {
        let pair = (record.record.branch.as_str(), record.record.agent.as_str());
        let slot = *index.entry(pair).or_insert_with(|| {
            partitions.push(Vec::new());
            partitions.len() - 1
        });
        partitions[slot].push(record);
    }

    let mut selection = Selection::default();
    for partition in partitions {
        let Some(latest) = select_latest(partition.iter().copied()) else {
            continue;
        };
        let build_number = latest.record.build_number;

        let mut set = AuthoritativeSet {
            branch: latest.record.branch.clone(),
            agent: latest.record.agent.clone(),
            build_number,
            results: Vec::new(),
        };

        for record in partition.into_iter().filter(|r| r.record.build_number == build_number) {
            let key = record.variant_key();
            if set.find(&key).is_some() {
                selection.duplicates.push(DuplicateVariant {
                    branch: set.branch.clone(),
                    agent: set.agent.clone(),
                    build_number,
                    key,
                });
            } else {
                set.results.push(record.clone());
            }
        }

        selection.sets.push(set);
    }

    selection
}
