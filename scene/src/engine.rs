//! Scene engine interface and an in-memory implementation.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{SceneError, SceneResult};
use crate::{ObjectId, PropertyValue};

/// The narrow interface the server uses to query and mutate the scene.
///
/// Implementations are not required to be thread-safe; the server drives a
/// scene from a single owner thread.
pub trait SceneEngine {
    /// Returns `true` if the object exists.
    fn contains(&self, id: ObjectId) -> bool;

    /// Returns all object IDs in ascending order.
    fn object_ids(&self) -> Vec<ObjectId>;

    /// Reads a property, including writes staged since the last commit.
    fn property(&self, id: ObjectId, name: &str) -> Option<PropertyValue>;

    /// Stages a property write. It becomes part of the scene on `commit`.
    fn set_property(&mut self, id: ObjectId, name: &str, value: PropertyValue) -> SceneResult<()>;

    /// Flags an object for redraw on the next frame.
    fn mark_dirty(&mut self, id: ObjectId) -> SceneResult<()>;

    /// Advances one frame. Returns `true` when every dirty object was processed.
    fn update_frame(&mut self) -> bool;

    /// Applies staged writes and reports which properties they touched.
    fn commit(&mut self) -> Commit;
}

/// Outcome of [`SceneEngine::commit`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Commit {
    /// Staged writes applied, counting repeated writes to one property.
    pub applied: usize,
    /// Property names written, per object.
    pub touched: BTreeMap<ObjectId, BTreeSet<String>>,
}

impl Commit {
    /// Records one applied write.
    pub fn record(&mut self, id: ObjectId, name: impl Into<String>) {
        self.applied += 1;
        self.touched.entry(id).or_default().insert(name.into());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.touched.is_empty()
    }

    #[must_use]
    pub fn touches(&self, id: ObjectId, name: &str) -> bool {
        self.touched.get(&id).is_some_and(|names| names.contains(name))
    }
}

/// An object stored by [`MemoryScene`].
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SceneObject {
    pub id: ObjectId,
    #[cfg_attr(feature = "serde", serde(default))]
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub properties: BTreeMap<String, PropertyValue>,
    #[cfg_attr(feature = "serde", serde(skip))]
    dirty: bool,
    #[cfg_attr(feature = "serde", serde(skip))]
    redraws: u64,
}

impl SceneObject {
    #[must_use]
    pub fn new(id: ObjectId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds an initial property value.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Number of frames in which this object was redrawn.
    #[must_use]
    pub const fn redraws(&self) -> u64 {
        self.redraws
    }
}

#[derive(Debug, Clone, PartialEq)]
struct StagedWrite {
    id: ObjectId,
    name: String,
    value: PropertyValue,
}

/// In-memory scene with staged writes and a per-frame redraw budget.
#[derive(Debug, Clone)]
pub struct MemoryScene {
    objects: BTreeMap<ObjectId, SceneObject>,
    staged: Vec<StagedWrite>,
    frame: u64,
    redraw_budget: usize,
}

impl Default for MemoryScene {
    fn default() -> Self {
        Self {
            objects: BTreeMap::new(),
            staged: Vec::new(),
            frame: 0,
            redraw_budget: usize::MAX,
        }
    }
}

impl MemoryScene {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a scene from objects, rejecting duplicate IDs.
    pub fn from_objects(objects: impl IntoIterator<Item = SceneObject>) -> SceneResult<Self> {
        let mut scene = Self::new();
        for object in objects {
            scene.insert(object)?;
        }
        Ok(scene)
    }

    /// Limits how many dirty objects are redrawn per frame.
    #[must_use]
    pub fn with_redraw_budget(mut self, budget: usize) -> Self {
        self.redraw_budget = budget.max(1);
        self
    }

    pub fn insert(&mut self, object: SceneObject) -> SceneResult<()> {
        if self.objects.contains_key(&object.id) {
            return Err(SceneError::DuplicateObject { id: object.id });
        }
        self.objects.insert(object.id, object);
        Ok(())
    }

    #[must_use]
    pub fn object(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.get(&id)
    }

    /// Number of frames advanced so far.
    #[must_use]
    pub const fn frame(&self) -> u64 {
        self.frame
    }

    /// Number of writes waiting for `commit`.
    #[must_use]
    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    fn object_mut(&mut self, id: ObjectId) -> SceneResult<&mut SceneObject> {
        self.objects
            .get_mut(&id)
            .ok_or(SceneError::UnknownObject { id })
    }
}

impl SceneEngine for MemoryScene {
    fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    fn object_ids(&self) -> Vec<ObjectId> {
        self.objects.keys().copied().collect()
    }

    fn property(&self, id: ObjectId, name: &str) -> Option<PropertyValue> {
        let staged = self
            .staged
            .iter()
            .rev()
            .find(|write| write.id == id && write.name == name);
        if let Some(write) = staged {
            return Some(write.value.clone());
        }
        self.objects.get(&id)?.properties.get(name).cloned()
    }

    fn set_property(&mut self, id: ObjectId, name: &str, value: PropertyValue) -> SceneResult<()> {
        if !self.contains(id) {
            return Err(SceneError::UnknownObject { id });
        }
        self.staged.push(StagedWrite {
            id,
            name: name.to_string(),
            value,
        });
        Ok(())
    }

    fn mark_dirty(&mut self, id: ObjectId) -> SceneResult<()> {
        self.object_mut(id)?.dirty = true;
        Ok(())
    }

    fn update_frame(&mut self) -> bool {
        self.frame += 1;
        let mut budget = self.redraw_budget;
        for object in self.objects.values_mut().filter(|object| object.dirty) {
            if budget == 0 {
                return false;
            }
            object.dirty = false;
            object.redraws += 1;
            budget -= 1;
        }
        true
    }

    fn commit(&mut self) -> Commit {
        let staged = std::mem::take(&mut self.staged);
        let mut commit = Commit::default();
        for write in staged {
            // Objects cannot be removed through this interface, so the lookup holds.
            if let Some(object) = self.objects.get_mut(&write.id) {
                commit.record(write.id, write.name.as_str());
                object.properties.insert(write.name, write.value);
                object.dirty = true;
            }
        }
        commit
    }
}
