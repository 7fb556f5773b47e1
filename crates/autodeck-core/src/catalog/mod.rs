//! Read-only track catalog
//!
//! The catalog is populated by an external import process and exposed to the
//! core through the [`Catalog`] trait. It answers two kinds of questions:
//!
//! - which tracks fall in a tempo range / key set within a scope (matcher input)
//! - how a folder-name location maps to the index path the navigation
//!   controller walks (the browse tree mirrors the controlled application)
//!
//! [`InMemoryCatalog`] is the YAML-backed implementation used by the binary.

use crate::music::HarmonicKey;
use crate::types::{Track, TrackId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Errors raised while loading or validating a catalog
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid catalog: {0}")]
    Invalid(String),
}

/// A folder in the controlled application's browse tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderNode {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FolderNode>,
}

impl FolderNode {
    /// Create a leaf folder
    pub fn leaf(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    /// Create a folder with sub-folders
    pub fn with_children(name: impl Into<String>, children: Vec<FolderNode>) -> Self {
        Self {
            name: name.into(),
            children,
        }
    }
}

/// Subset of the catalog a session draws from (a genre's folder subtree)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogScope {
    /// Folder names of the subtree root; empty = whole catalog
    pub root: Vec<String>,
}

impl CatalogScope {
    /// Scope covering the whole catalog
    pub fn all() -> Self {
        Self::default()
    }

    /// Scope rooted at the given folder path
    pub fn under<I, S>(folders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            root: folders.into_iter().map(Into::into).collect(),
        }
    }

    /// Check whether a track belongs to this scope
    pub fn contains(&self, track: &Track) -> bool {
        track.location.is_under(&self.root)
    }
}

/// Tempo range + key set lookup
#[derive(Debug, Clone)]
pub struct CatalogQuery {
    pub scope: CatalogScope,
    /// Inclusive tempo bounds in BPM
    pub min_bpm: f64,
    pub max_bpm: f64,
    /// Restrict to these keys; `None` = any key
    pub keys: Option<Vec<HarmonicKey>>,
}

/// Read-only catalog access used by the matcher and the session
pub trait Catalog: Send + Sync {
    /// Tracks matching the query, in catalog insertion order
    fn query(&self, query: &CatalogQuery) -> Vec<Track>;

    /// All tracks inside a scope, in catalog insertion order
    fn tracks_in_scope(&self, scope: &CatalogScope) -> Vec<Track>;

    /// Look up a single track
    fn track(&self, id: TrackId) -> Option<Track>;

    /// Translate folder names into sibling indices from the hierarchy root
    ///
    /// Returns `None` if any folder along the path does not exist.
    fn resolve_folders(&self, folders: &[String]) -> Option<Vec<usize>>;
}

/// On-disk catalog document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogFile {
    /// Top-level folders of the browse tree, in display order
    pub folders: Vec<FolderNode>,
    /// Tracks in import order
    pub tracks: Vec<Track>,
}

/// Catalog held entirely in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    folders: Vec<FolderNode>,
    tracks: Vec<Track>,
}

impl InMemoryCatalog {
    /// Build a catalog, validating tempos, identifiers and locations
    pub fn new(folders: Vec<FolderNode>, tracks: Vec<Track>) -> Result<Self, CatalogError> {
        let catalog = Self { folders, tracks };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load a catalog from a YAML file
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        log::info!("InMemoryCatalog::load: Loading from {:?}", path);
        let contents = std::fs::read_to_string(path)?;
        let file: CatalogFile = serde_yaml::from_str(&contents)?;
        let catalog = Self::new(file.folders, file.tracks)?;
        log::info!(
            "InMemoryCatalog::load: {} tracks, {} top-level folders",
            catalog.tracks.len(),
            catalog.folders.len()
        );
        Ok(catalog)
    }

    /// Number of tracks
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Check if the catalog has no tracks
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Top-level folders of the browse tree
    pub fn folders(&self) -> &[FolderNode] {
        &self.folders
    }

    fn validate(&self) -> Result<(), CatalogError> {
        let mut seen = HashSet::new();
        for track in &self.tracks {
            if !seen.insert(track.id) {
                return Err(CatalogError::Invalid(format!("duplicate track id {}", track.id)));
            }
            if !(track.bpm.is_finite() && track.bpm > 0.0) {
                return Err(CatalogError::Invalid(format!(
                    "track {} has non-positive tempo {}",
                    track.id, track.bpm
                )));
            }
            if !(track.duration_secs > 0.0 && Duration::try_from_secs_f64(track.duration_secs).is_ok()) {
                return Err(CatalogError::Invalid(format!(
                    "track {} has unusable duration {}",
                    track.id, track.duration_secs
                )));
            }
            if self.resolve_folders(&track.location.folders).is_none() {
                return Err(CatalogError::Invalid(format!(
                    "track {} is located in unknown folder '{}'",
                    track.id,
                    track.location.folders.join("/")
                )));
            }
        }
        Ok(())
    }
}

impl Catalog for InMemoryCatalog {
    fn query(&self, query: &CatalogQuery) -> Vec<Track> {
        self.tracks
            .iter()
            .filter(|t| query.scope.contains(t))
            .filter(|t| t.bpm >= query.min_bpm && t.bpm <= query.max_bpm)
            .filter(|t| query.keys.as_ref().map_or(true, |keys| keys.contains(&t.key)))
            .cloned()
            .collect()
    }

    fn tracks_in_scope(&self, scope: &CatalogScope) -> Vec<Track> {
        self.tracks.iter().filter(|t| scope.contains(t)).cloned().collect()
    }

    fn track(&self, id: TrackId) -> Option<Track> {
        self.tracks.iter().find(|t| t.id == id).cloned()
    }

    fn resolve_folders(&self, folders: &[String]) -> Option<Vec<usize>> {
        let mut level: &[FolderNode] = &self.folders;
        let mut path = Vec::with_capacity(folders.len());
        for name in folders {
            let index = level.iter().position(|f| f.name.eq_ignore_ascii_case(name))?;
            path.push(index);
            level = &level[index].children;
        }
        Some(path)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::BrowseLocation;
    use std::path::PathBuf;

    pub(crate) fn track(id: u64, key: HarmonicKey, bpm: f64, folders: &[&str], index: usize) -> Track {
        Track {
            id: TrackId(id),
            title: format!("Track {}", id),
            artist: "Artist".to_string(),
            bpm,
            key,
            duration_secs: 300.0,
            path: PathBuf::from(format!("/music/{}.flac", id)),
            location: BrowseLocation {
                folders: folders.iter().map(|s| s.to_string()).collect(),
                index,
            },
        }
    }

    pub(crate) fn tree() -> Vec<FolderNode> {
        vec![
            FolderNode::with_children(
                "House",
                vec![FolderNode::leaf("Deep"), FolderNode::leaf("Tech")],
            ),
            FolderNode::leaf("Techno"),
        ]
    }

    #[test]
    fn test_resolve_folders() {
        let catalog = InMemoryCatalog::new(tree(), vec![]).unwrap();
        assert_eq!(catalog.resolve_folders(&["House".into(), "Tech".into()]), Some(vec![0, 1]));
        assert_eq!(catalog.resolve_folders(&["techno".into()]), Some(vec![1]));
        assert_eq!(catalog.resolve_folders(&[]), Some(vec![]));
        assert_eq!(catalog.resolve_folders(&["Jazz".into()]), None);
    }

    #[test]
    fn test_rejects_unknown_location() {
        let result = InMemoryCatalog::new(
            tree(),
            vec![track(1, HarmonicKey::minor(8), 128.0, &["Trance"], 0)],
        );
        assert!(matches!(result, Err(CatalogError::Invalid(_))));
    }

    #[test]
    fn test_rejects_duplicate_ids_and_bad_tempo() {
        let dup = InMemoryCatalog::new(
            tree(),
            vec![
                track(1, HarmonicKey::minor(8), 128.0, &["Techno"], 0),
                track(1, HarmonicKey::minor(8), 128.0, &["Techno"], 1),
            ],
        );
        assert!(dup.is_err());

        let zero = InMemoryCatalog::new(tree(), vec![track(2, HarmonicKey::minor(8), 0.0, &["Techno"], 0)]);
        assert!(zero.is_err());

        for length in [f64::INFINITY, f64::NAN, 0.0, -30.0, 1e300] {
            let mut bad = track(3, HarmonicKey::minor(8), 128.0, &["Techno"], 0);
            bad.duration_secs = length;
            assert!(
                matches!(InMemoryCatalog::new(tree(), vec![bad]), Err(CatalogError::Invalid(_))),
                "duration {} accepted",
                length
            );
        }
    }

    #[test]
    fn test_query_filters_scope_tempo_and_keys() {
        let catalog = InMemoryCatalog::new(
            tree(),
            vec![
                track(1, HarmonicKey::minor(8), 124.0, &["House", "Deep"], 0),
                track(2, HarmonicKey::minor(3), 125.0, &["House", "Tech"], 0),
                track(3, HarmonicKey::minor(8), 140.0, &["House", "Tech"], 1),
                track(4, HarmonicKey::minor(8), 126.0, &["Techno"], 0),
            ],
        )
        .unwrap();

        let found = catalog.query(&CatalogQuery {
            scope: CatalogScope::under(["House"]),
            min_bpm: 120.0,
            max_bpm: 130.0,
            keys: Some(vec![HarmonicKey::minor(8)]),
        });
        let ids: Vec<_> = found.iter().map(|t| t.id.0).collect();
        assert_eq!(ids, vec![1]);

        let any_key = catalog.query(&CatalogQuery {
            scope: CatalogScope::all(),
            min_bpm: 120.0,
            max_bpm: 130.0,
            keys: None,
        });
        let ids: Vec<_> = any_key.iter().map(|t| t.id.0).collect();
        assert_eq!(ids, vec![1, 2, 4]);
    }

    #[test]
    fn test_load_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.yaml");
        std::fs::write(
            &path,
            r#"
folders:
  - name: House
    children:
      - name: Deep
tracks:
  - id: 7
    title: Night Drive
    artist: Someone
    bpm: 122.0
    key: Am
    duration_secs: 312.5
    location:
      folders: [House, Deep]
      index: 4
"#,
        )
        .unwrap();

        let catalog = InMemoryCatalog::load(&path).unwrap();
        assert_eq!(catalog.len(), 1);
        let t = catalog.track(TrackId(7)).unwrap();
        assert_eq!(t.key, HarmonicKey::minor(8));
        assert_eq!(t.location.index, 4);
    }
}
