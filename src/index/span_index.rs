use crate::index::error::IndexError;
use crate::index::FetchIndex;
use crate::types::region::BoundingBox;
use crate::types::time::TimeRange;
use async_trait::async_trait;
use bincode::config::{Configuration, Fixint, LittleEndian};
use log::{debug, info};
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const INDEX_FILE_NAME: &str = "fetch_index.bin";
const BINCODE_CONFIG: Configuration<LittleEndian, Fixint> =
    bincode::config::standard().with_fixed_int_encoding();

/// One recorded request: a lon/lat box over an interval of epoch hours.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FetchedSpan {
    pub region: BoundingBox,
    pub start_hours: f64,
    pub end_hours: f64,
}

impl FetchedSpan {
    pub fn new(region: &BoundingBox, range: &TimeRange) -> Self {
        Self {
            region: *region,
            start_hours: range.start_hours(),
            end_hours: range.end_hours(),
        }
    }

    pub fn contains(&self, other: &FetchedSpan) -> bool {
        self.region.encloses(&other.region)
            && self.start_hours <= other.start_hours
            && other.end_hours <= self.end_hours
    }
}

impl RTreeObject for FetchedSpan {
    /// (lon, lat, hour) box.
    type Envelope = AABB<[f64; 3]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.region.west(), self.region.south(), self.start_hours],
            [self.region.east(), self.region.north(), self.end_hours],
        )
    }
}

/// [`FetchIndex`] backed by one R-tree of [`FetchedSpan`]s per dataset.
///
/// A request counts as covered only when a single recorded span contains it;
/// the union of several smaller spans is not considered.
#[derive(Default)]
pub struct SpanIndex {
    spans: HashMap<String, RTree<FetchedSpan>>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for SpanIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpanIndex")
            .field("datasets", &self.spans.len())
            .field("path", &self.path)
            .finish()
    }
}

impl SpanIndex {
    /// Nothing is persisted.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads the index stored at `path`, or starts empty when there is none yet.
    /// Every [`FetchIndex::record`] rewrites the file.
    pub async fn open(path: &Path) -> Result<Self, IndexError> {
        let spans = match tokio::fs::read(path).await {
            Ok(bytes) => {
                let (stored, _): (HashMap<String, Vec<FetchedSpan>>, usize) =
                    bincode::serde::decode_from_slice(&bytes, BINCODE_CONFIG)
                        .map_err(|e| IndexError::Decode(path.to_path_buf(), Box::new(e)))?;
                info!(
                    "Loaded fetch index with {} datasets from {:?}",
                    stored.len(),
                    path
                );
                stored
                    .into_iter()
                    .map(|(dataset, spans)| (dataset, RTree::bulk_load(spans)))
                    .collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(IndexError::Read(path.to_path_buf(), e)),
        };
        Ok(Self {
            spans,
            path: Some(path.to_path_buf()),
        })
    }

    /// `<root>/fetch_index.bin`.
    pub async fn in_dir(root: &Path) -> Result<Self, IndexError> {
        Self::open(&root.join(INDEX_FILE_NAME)).await
    }

    pub fn span_count(&self, dataset: &str) -> usize {
        self.spans.get(dataset).map_or(0, |tree| tree.size())
    }

    async fn persist(&self) -> Result<(), IndexError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let stored: HashMap<&str, Vec<FetchedSpan>> = self
            .spans
            .iter()
            .map(|(dataset, tree)| (dataset.as_str(), tree.iter().copied().collect()))
            .collect();
        let bytes = bincode::serde::encode_to_vec(&stored, BINCODE_CONFIG)
            .map_err(|e| IndexError::Encode(Box::new(e)))?;
        tokio::fs::write(path, &bytes)
            .await
            .map_err(|e| IndexError::Write(path.clone(), e))
    }
}

#[async_trait]
impl FetchIndex for SpanIndex {
    fn covers(&self, dataset: &str, region: &BoundingBox, range: &TimeRange) -> bool {
        let Some(tree) = self.spans.get(dataset) else {
            return false;
        };
        let wanted = FetchedSpan::new(region, range);
        tree.locate_in_envelope_intersecting(&wanted.envelope())
            .any(|span| span.contains(&wanted))
    }

    async fn record(
        &mut self,
        dataset: &str,
        region: &BoundingBox,
        range: &TimeRange,
    ) -> Result<(), IndexError> {
        if self.covers(dataset, region, range) {
            debug!("{} already covers {} {}", dataset, region, range);
            return Ok(());
        }
        self.spans
            .entry(dataset.to_string())
            .or_default()
            .insert(FetchedSpan::new(region, range));
        self.persist().await
    }
}
