//! Dense id mapping for work items
//!
//! External ids can be large, sparse or negative. The model only ever sees
//! ids `1..=N`, which keeps prompts unambiguous and turns the completeness
//! check into a range check.

use crate::{Error, Result, WorkItem};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// A work item as exposed to the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SanitizedWorkItem {
    pub id: u32,
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
}

/// Bidirectional mapping between external ids and dense ids `1..=N`
#[derive(Debug, Clone, Default)]
pub struct IdMap {
    forward: HashMap<i64, u32>,
    inverse: Vec<i64>,
}

impl IdMap {
    /// Build the mapping; dense ids follow input order
    pub fn build<I>(external_ids: I) -> Result<Self>
    where
        I: IntoIterator<Item = i64>,
    {
        let mut map = Self::default();
        for external in external_ids {
            let dense = map.inverse.len() as u32 + 1;
            if map.forward.insert(external, dense).is_some() {
                return Err(Error::DuplicateItemId(external));
            }
            map.inverse.push(external);
        }
        Ok(map)
    }

    /// Number of mapped ids (N)
    pub fn len(&self) -> usize {
        self.inverse.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inverse.is_empty()
    }

    /// Whether `dense` lies in `1..=N`
    pub fn contains_dense(&self, dense: i64) -> bool {
        dense >= 1 && dense <= self.inverse.len() as i64
    }

    pub fn to_dense(&self, external: i64) -> Option<u32> {
        self.forward.get(&external).copied()
    }

    pub fn to_external(&self, dense: u32) -> Option<i64> {
        let index = (dense as usize).checked_sub(1)?;
        self.inverse.get(index).copied()
    }

    /// All dense ids in ascending order
    pub fn dense_ids(&self) -> impl Iterator<Item = u32> {
        1..=self.inverse.len() as u32
    }

    /// External ids in dense order
    pub fn external_ids(&self) -> &[i64] {
        &self.inverse
    }

    /// Human-readable description of the valid range, used in prompts
    pub fn describe_range(&self) -> String {
        match self.inverse.len() {
            0 => "there are no valid ids".to_string(),
            1 => "the only valid id is 1".to_string(),
            n => format!("valid ids are the integers 1 through {} inclusive", n),
        }
    }
}

/// Work items rewritten into the dense namespace
#[derive(Debug, Clone)]
pub struct SanitizedBatch {
    pub items: Vec<SanitizedWorkItem>,
    pub ids: IdMap,
}

/// Map a batch of work items to dense ids
///
/// Fails only if the same external id appears twice.
pub fn sanitize(items: &[WorkItem]) -> Result<SanitizedBatch> {
    let ids = IdMap::build(items.iter().map(|item| item.id))?;
    let items = items
        .iter()
        .zip(ids.dense_ids())
        .map(|(item, id)| SanitizedWorkItem {
            id,
            fields: item.fields.clone(),
        })
        .collect();

    Ok(SanitizedBatch { items, ids })
}
