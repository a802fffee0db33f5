//! Reference database: named targets a tracker searches for.
//!
//! Targets are added in batches. A batch is validated as a whole before any
//! entry is inserted, so a failing batch leaves the database unchanged. Once
//! the owning tracker starts, the database is locked and rejects additions.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use image::GrayImage;

use crate::error::DatabaseError;

/// Smallest accepted reference image side, in pixels.
pub const MIN_TARGET_SIDE: u32 = 16;

/// Longest accepted target name, in bytes.
pub const MAX_TARGET_NAME_LEN: usize = 255;

/// A named reference image.
#[derive(Debug, Clone)]
pub struct ReferenceTarget {
    pub name: String,
    pub image: Arc<GrayImage>,
    /// Physical width of the printed target in metres, if known.
    pub physical_width: Option<f64>,
}

impl ReferenceTarget {
    pub fn new(name: impl Into<String>, image: GrayImage) -> Self {
        Self {
            name: name.into(),
            image: Arc::new(image),
            physical_width: None,
        }
    }

    pub fn with_physical_width(mut self, metres: f64) -> Self {
        self.physical_width = Some(metres);
        self
    }

    fn validate(&self) -> Result<(), DatabaseError> {
        let invalid = |reason: String| DatabaseError::InvalidTarget {
            name: self.name.clone(),
            reason,
        };
        if self.name.trim().is_empty() {
            return Err(invalid("name is empty".into()));
        }
        if self.name.len() > MAX_TARGET_NAME_LEN {
            return Err(invalid(format!("name longer than {} bytes", MAX_TARGET_NAME_LEN)));
        }
        if self.name.chars().any(char::is_control) {
            return Err(invalid("name contains control characters".into()));
        }
        let (w, h) = self.image.dimensions();
        if w < MIN_TARGET_SIDE || h < MIN_TARGET_SIDE {
            return Err(invalid(format!(
                "image is {}x{}, smaller than {}x{}",
                w, h, MIN_TARGET_SIDE, MIN_TARGET_SIDE
            )));
        }
        if let Some(width) = self.physical_width {
            if !width.is_finite() || width <= 0.0 {
                return Err(invalid(format!("physical width {} is not positive", width)));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct ReferenceDatabase {
    targets: Vec<ReferenceTarget>,
    index: HashMap<String, usize>,
    locked: bool,
}

impl ReferenceDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a batch of targets, all or nothing. Returns the number added.
    pub fn add<I>(&mut self, batch: I) -> Result<usize, DatabaseError>
    where
        I: IntoIterator<Item = ReferenceTarget>,
    {
        if self.locked {
            return Err(DatabaseError::Locked);
        }
        let batch: Vec<ReferenceTarget> = batch.into_iter().collect();

        let mut seen = HashSet::with_capacity(batch.len());
        for target in &batch {
            target.validate()?;
            if self.index.contains_key(&target.name) || !seen.insert(target.name.as_str()) {
                return Err(DatabaseError::DuplicateTargetName(target.name.clone()));
            }
        }

        let added = batch.len();
        for target in batch {
            self.index.insert(target.name.clone(), self.targets.len());
            self.targets.push(target);
        }
        Ok(added)
    }

    pub fn get(&self, name: &str) -> Option<&ReferenceTarget> {
        self.index.get(name).map(|&i| &self.targets[i])
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn targets(&self) -> &[ReferenceTarget] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Freeze the database. Called when the owning tracker starts.
    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(name: &str) -> ReferenceTarget {
        ReferenceTarget::new(name, GrayImage::new(32, 32))
    }

    #[test]
    fn test_add_batch_keeps_order() {
        let mut db = ReferenceDatabase::new();
        assert_eq!(db.add([target("a"), target("b")]).unwrap(), 2);
        assert_eq!(db.add([target("c")]).unwrap(), 1);

        let names: Vec<_> = db.targets().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(db.position("c"), Some(2));
        assert!(db.get("b").is_some());
    }

    #[test]
    fn test_duplicate_within_batch_adds_nothing() {
        let mut db = ReferenceDatabase::new();
        let err = db.add([target("mage"), target("cat"), target("mage")]).unwrap_err();
        assert_eq!(err, DatabaseError::DuplicateTargetName("mage".into()));
        assert!(db.is_empty());
        assert!(db.get("cat").is_none());
    }

    #[test]
    fn test_duplicate_against_existing_entry() {
        let mut db = ReferenceDatabase::new();
        db.add([target("mage")]).unwrap();
        let err = db.add([target("cat"), target("mage")]).unwrap_err();
        assert_eq!(err, DatabaseError::DuplicateTargetName("mage".into()));
        assert_eq!(db.len(), 1);
    }

    #[test]
    fn test_invalid_target_rejects_batch() {
        let mut db = ReferenceDatabase::new();
        let tiny = ReferenceTarget::new("tiny", GrayImage::new(4, 4));
        let err = db.add([target("ok"), tiny]).unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidTarget { ref name, .. } if name == "tiny"));
        assert!(db.is_empty());

        let nameless = target("  ");
        assert!(matches!(
            db.add([nameless]),
            Err(DatabaseError::InvalidTarget { .. })
        ));

        let bad_width = target("w").with_physical_width(-0.2);
        assert!(matches!(
            db.add([bad_width]),
            Err(DatabaseError::InvalidTarget { .. })
        ));
    }

    #[test]
    fn test_locked_database_rejects_additions() {
        let mut db = ReferenceDatabase::new();
        db.add([target("a")]).unwrap();
        db.lock();
        assert_eq!(db.add([target("b")]), Err(DatabaseError::Locked));
        assert_eq!(db.len(), 1);
    }
}
