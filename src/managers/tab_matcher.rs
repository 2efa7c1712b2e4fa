//! Maps one observed tab onto a position in an ordered list of stored records.
//!
//! Live tab handles and stored records live in different identity spaces. A
//! handle match is authoritative; a URL match is only trusted for update and
//! restore-rebind observations, where the stored record may not carry the
//! running handle yet.

use crate::types::tab::{LiveTab, TabHandle, TabRecord};

/// What triggered the observation being matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    Created,
    Activated,
    Updated,
    RestoreRebind,
}

impl EventSource {
    /// Created/activated observations always carry a fresh handle, so a URL
    /// coincidence there would attach a new tab to an unrelated record.
    pub fn allows_url_fallback(self) -> bool {
        matches!(self, EventSource::Updated | EventSource::RestoreRebind)
    }
}

/// How a stored record can be recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity<'a> {
    ById(TabHandle),
    ByUrl(&'a str),
    Unbound,
}

impl TabRecord {
    pub fn identity(&self) -> Identity<'_> {
        match (self.id, self.url.as_str()) {
            (Some(id), _) => Identity::ById(id),
            (None, "") => Identity::Unbound,
            (None, url) => Identity::ByUrl(url),
        }
    }
}

/// The parts of a live tab the matcher looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation<'a> {
    pub id: Option<TabHandle>,
    pub url: &'a str,
}

impl<'a> From<&'a LiveTab> for Observation<'a> {
    fn from(tab: &'a LiveTab) -> Self {
        Self {
            id: Some(tab.id),
            url: &tab.url,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Id,
    Url,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordMatch {
    pub index: usize,
    pub kind: MatchKind,
}

/// Finds the record an observation refers to, or `None` for the append path.
///
/// Order: handle equality, then (update/rebind only) URL equality. Among URL
/// matches a record without a live handle wins over one that is bound, so
/// several restored tabs sharing a URL bind to distinct records.
pub fn find_record_index(
    records: &[TabRecord],
    observed: Observation<'_>,
    source: EventSource,
) -> Option<RecordMatch> {
    if let Some(id) = observed.id {
        let by_id = records
            .iter()
            .position(|r| r.identity() == Identity::ById(id));
        if let Some(index) = by_id {
            return Some(RecordMatch {
                index,
                kind: MatchKind::Id,
            });
        }
    }

    if !source.allows_url_fallback() || observed.url.is_empty() {
        return None;
    }

    let unbound = records
        .iter()
        .position(|r| r.identity() == Identity::ByUrl(observed.url));
    let index = unbound.or_else(|| records.iter().position(|r| r.url == observed.url))?;
    Some(RecordMatch {
        index,
        kind: MatchKind::Url,
    })
}
