//! Offset pagination envelope.

use crate::collection::Collection;
use serde::Serialize;
use serde::ser::SerializeSeq;

/// One page of results plus navigation metadata.
///
/// The page number is supplied by the caller; the envelope derives the
/// offset bounds and navigation URLs from it.
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub current_page: u64,
    pub per_page: u64,
    pub total: u64,
    pub last_page: u64,
    /// 1-based index of the first record on this page, when non-empty.
    pub from: Option<u64>,
    /// 1-based index of the last record on this page, when non-empty.
    pub to: Option<u64>,
    pub path: String,
    pub first_page_url: String,
    pub last_page_url: String,
    pub prev_page_url: Option<String>,
    pub next_page_url: Option<String>,
    #[serde(serialize_with = "serialize_records")]
    pub data: Collection,
}

fn serialize_records<S: serde::Serializer>(
    collection: &Collection,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut seq = serializer.serialize_seq(Some(collection.len()))?;
    for record in collection.iter() {
        seq.serialize_element(&record.to_json())?;
    }
    seq.end()
}

impl Page {
    /// Build the envelope for one fetched page.
    #[must_use]
    pub fn new(data: Collection, total: u64, per_page: u64, current_page: u64, path: &str) -> Self {
        let last_page = (total.div_ceil(per_page)).max(1);
        let url = |page: u64| format!("{path}?page={page}");

        let (from, to) = if data.is_empty() {
            (None, None)
        } else {
            let from = (current_page - 1) * per_page + 1;
            (Some(from), Some(from + data.len() as u64 - 1))
        };

        Self {
            current_page,
            per_page,
            total,
            last_page,
            from,
            to,
            path: path.to_string(),
            first_page_url: url(1),
            last_page_url: url(last_page),
            prev_page_url: (current_page > 1).then(|| url(current_page - 1)),
            next_page_url: (current_page < last_page).then(|| url(current_page + 1)),
            data,
        }
    }
}
