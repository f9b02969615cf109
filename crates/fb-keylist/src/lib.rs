#![forbid(unsafe_code)]

use std::iter::FusedIterator;

use serde::{Deserialize, Serialize};

/// The records that share one grouping key, in the order the grouping
/// collaborator produced them (for overlap tools: every database feature hit
/// by a single query interval).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyList<R> {
    key: String,
    records: Vec<R>,
}

impl<R> Default for KeyList<R> {
    fn default() -> Self {
        Self {
            key: String::new(),
            records: Vec::new(),
        }
    }
}

impl<R> KeyList<R> {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            records: Vec::new(),
        }
    }

    #[must_use]
    pub fn from_records(key: impl Into<String>, records: Vec<R>) -> Self {
        Self {
            key: key.into(),
            records,
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn push(&mut self, record: R) {
        self.records.push(record);
    }

    /// Drop the records but keep the allocation, so one list can be refilled
    /// for each successive key.
    pub fn reset(&mut self, key: impl Into<String>) {
        self.key = key.into();
        self.records.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn records(&self) -> &[R] {
        &self.records
    }

    #[must_use]
    pub fn cursor(&self) -> GroupCursor<'_, R> {
        GroupCursor::over(&self.records)
    }
}

impl<R> FromIterator<R> for KeyList<R> {
    fn from_iter<I: IntoIterator<Item = R>>(iter: I) -> Self {
        Self {
            key: String::new(),
            records: iter.into_iter().collect(),
        }
    }
}

impl<R> Extend<R> for KeyList<R> {
    fn extend<I: IntoIterator<Item = R>>(&mut self, iter: I) {
        self.records.extend(iter);
    }
}

/// Forward cursor over one group.
///
/// `rewind` restarts from the first record at any point, so several passes
/// can be made over the same group (mean needs a sum pass, variance a second
/// pass over the deviations). Independent cursors over the same records may
/// coexist.
#[derive(Debug)]
pub struct GroupCursor<'a, R> {
    records: &'a [R],
    pos: usize,
}

impl<R> Clone for GroupCursor<'_, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for GroupCursor<'_, R> {}

impl<'a, R> GroupCursor<'a, R> {
    #[must_use]
    pub fn over(records: &'a [R]) -> Self {
        Self { records, pos: 0 }
    }

    pub fn rewind(&mut self) {
        self.pos = 0;
    }

    #[must_use]
    pub fn is_end(&self) -> bool {
        self.pos >= self.records.len()
    }

    pub fn advance(&mut self) {
        if !self.is_end() {
            self.pos += 1;
        }
    }

    #[must_use]
    pub fn current(&self) -> Option<&'a R> {
        self.records.get(self.pos)
    }

    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }
}

impl<'a, R> Iterator for GroupCursor<'a, R> {
    type Item = &'a R;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current()?;
        self.pos += 1;
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.records.len().saturating_sub(self.pos);
        (remaining, Some(remaining))
    }
}

impl<R> ExactSizeIterator for GroupCursor<'_, R> {}

impl<R> FusedIterator for GroupCursor<'_, R> {}
