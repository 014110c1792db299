//! # Shader-Bucketed Draw Batching
//!
//! Groups the renderables of a frame by shader program so that every program
//! is bound at most once per frame.
//!
//! ## Architecture
//!
//! - **ShaderCollection**: insertion-ordered bucket of renderables sharing one shader
//! - **DrawCollection**: buckets indexed by the registry's dense shader ids
//! - **SwapCollection**: the collection the update thread fills and the render
//!   thread draws, cleared by `swap` at the start of every update cycle
//!
//! Buckets hold [`ObjectKey`]s, not the renderables themselves; the scene
//! resolves keys while drawing.

use slotmap::SecondaryMap;
use thiserror::Error;

use crate::foundation::collections::OrderedBucket;
use crate::render::backend::GraphicsBackend;
use crate::render::shader::{report_unlinked, ShaderHandle, ShaderProgram, ShaderRegistry};
use crate::scene::ObjectKey;

/// Result type for batch operations
pub type BatchResult<T> = Result<T, BatchError>;

/// Errors that can occur while batching
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BatchError {
    /// The renderable's shader has no bucket in the current collection
    #[error("no draw bucket for shader {0:?}; register it as batched and rebind")]
    UnknownShader(ShaderHandle),
}

/// Statistics of one batched draw
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Renderables drawn
    pub renderables: usize,
    /// Shader programs bound
    pub programs_bound: usize,
    /// Buckets skipped because they were empty
    pub empty_buckets: usize,
}

/// Renderables sharing one shader, drawn in insertion order
#[derive(Debug, Clone)]
pub struct ShaderCollection {
    shader: ShaderHandle,
    members: OrderedBucket<ObjectKey>,
}

impl ShaderCollection {
    /// Create an empty bucket for `shader`
    pub fn new(shader: ShaderHandle, capacity: usize) -> Self {
        Self {
            shader,
            members: OrderedBucket::with_capacity(capacity),
        }
    }

    /// The shader every member uses
    pub fn shader(&self) -> ShaderHandle {
        self.shader
    }

    /// Append a renderable
    pub fn add(&mut self, key: ObjectKey) {
        self.members.push(key);
    }

    /// Remove a renderable, keeping the order of the others
    pub fn remove(&mut self, key: ObjectKey) -> bool {
        let removed = self.members.remove(&key);
        self.members.compact();
        removed
    }

    /// Members in draw order
    pub fn members(&self) -> impl Iterator<Item = ObjectKey> + '_ {
        self.members.iter().copied()
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check whether the bucket is empty
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Drop every member without releasing capacity
    pub fn clear(&mut self) {
        self.members.clear();
    }

    fn draw<F>(&self, shader: &ShaderProgram, backend: &mut dyn GraphicsBackend, draw_one: &mut F) -> usize
    where
        F: FnMut(ObjectKey, &ShaderProgram, &mut dyn GraphicsBackend),
    {
        backend.use_program(shader.program());
        let mut drawn = 0;
        for key in self.members.iter() {
            draw_one(*key, shader, backend);
            drawn += 1;
        }
        drawn
    }
}

/// Shader buckets indexed by dense shader id
#[derive(Debug, Clone, Default)]
pub struct DrawCollection {
    buckets: Vec<ShaderCollection>,
    index: SecondaryMap<ShaderHandle, usize>,
    generation: u64,
}

impl DrawCollection {
    /// Build empty buckets for every batched shader of `registry`
    pub fn from_registry(registry: &ShaderRegistry) -> Self {
        let mut collection = Self::default();
        collection.rebuild(registry);
        collection
    }

    /// Append a renderable to its shader's bucket
    pub fn add(&mut self, shader: ShaderHandle, key: ObjectKey) -> BatchResult<()> {
        let bucket = self.index.get(shader).copied().ok_or(BatchError::UnknownShader(shader))?;
        self.buckets[bucket].add(key);
        Ok(())
    }

    /// Remove a renderable from its shader's bucket
    pub fn remove(&mut self, shader: ShaderHandle, key: ObjectKey) -> bool {
        match self.index.get(shader) {
            Some(&bucket) => self.buckets[bucket].remove(key),
            None => false,
        }
    }

    /// Draw every bucket in ascending dense id
    ///
    /// Each non-empty bucket binds its program once and then draws its
    /// members in insertion order. Empty buckets cause no backend calls.
    pub fn draw<F>(&self, registry: &ShaderRegistry, backend: &mut dyn GraphicsBackend, mut draw_one: F) -> BatchStats
    where
        F: FnMut(ObjectKey, &ShaderProgram, &mut dyn GraphicsBackend),
    {
        let mut stats = BatchStats::default();
        for bucket in &self.buckets {
            if bucket.is_empty() {
                stats.empty_buckets += 1;
                continue;
            }

            let Some(shader) = registry.get(bucket.shader()) else {
                log::warn!(
                    "Skipping {} renderables of a shader removed without rebind",
                    bucket.len()
                );
                continue;
            };
            if !shader.is_linked() {
                report_unlinked(shader, bucket.len());
                continue;
            }

            stats.renderables += bucket.draw(shader, backend, &mut draw_one);
            stats.programs_bound += 1;
        }
        stats
    }

    /// Empty every bucket without touching backend state
    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
    }

    /// Rebuild the buckets after the registry changed
    ///
    /// Existing members move to the bucket of the same shader at its new
    /// dense id, in their original order. Members of shaders that are no
    /// longer batched are dropped.
    pub fn rebuild(&mut self, registry: &ShaderRegistry) {
        let mut previous: SecondaryMap<ShaderHandle, Vec<ObjectKey>> = SecondaryMap::new();
        for mut bucket in self.buckets.drain(..) {
            let members = bucket.members.take_all();
            if !members.is_empty() {
                previous.insert(bucket.shader, members);
            }
        }

        self.index.clear();
        for (dense_id, (handle, shader)) in registry.ordered().enumerate() {
            let mut bucket = ShaderCollection::new(handle, shader.bucket_capacity());
            if let Some(members) = previous.remove(handle) {
                for key in members {
                    bucket.add(key);
                }
            }
            self.buckets.push(bucket);
            self.index.insert(handle, dense_id);
        }

        let dropped: usize = previous.values().map(Vec::len).sum();
        if dropped > 0 {
            log::warn!("Shader rebind dropped {} renderables of unbatched shaders", dropped);
        }

        self.generation = registry.generation();
        log::debug!("Rebound draw collection with {} shader buckets", self.buckets.len());
    }

    /// Registry generation the buckets were built from
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Bucket of `shader`
    pub fn bucket(&self, shader: ShaderHandle) -> Option<&ShaderCollection> {
        self.index.get(shader).map(|&bucket| &self.buckets[bucket])
    }

    /// Buckets in dense-id order
    pub fn buckets(&self) -> &[ShaderCollection] {
        &self.buckets
    }

    /// Total number of members across all buckets
    pub fn len(&self) -> usize {
        self.buckets.iter().map(ShaderCollection::len).sum()
    }

    /// Check whether every bucket is empty
    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(ShaderCollection::is_empty)
    }
}

/// Phase of the frame batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapState {
    /// Accepting renderables for the next frame
    Accumulating,
    /// The contents were drawn and are waiting for `swap`
    Drawn,
}

/// The batch shared between the update and render threads
///
/// Holds a single active [`DrawCollection`]. `add` always targets it, `draw`
/// consumes it and `swap` clears it for the next cycle. A second slot for
/// true ping-pong buffering would slot in behind the same three calls; the
/// engine instead serialises access through the scene lock.
#[derive(Debug, Clone)]
pub struct SwapCollection {
    active: DrawCollection,
    state: SwapState,
}

impl SwapCollection {
    /// Create a batch for the shaders of `registry`
    pub fn new(registry: &ShaderRegistry) -> Self {
        Self {
            active: DrawCollection::from_registry(registry),
            state: SwapState::Accumulating,
        }
    }

    /// Add a renderable to the active collection
    pub fn add(&mut self, shader: ShaderHandle, key: ObjectKey) -> BatchResult<()> {
        if self.state == SwapState::Drawn {
            log::trace!("Renderable added after draw, it is cleared by the next swap");
        }
        self.active.add(shader, key)
    }

    /// Clear the collection that was just drawn and accept new renderables
    pub fn swap(&mut self) {
        self.active.clear();
        self.state = SwapState::Accumulating;
    }

    /// Draw the active collection
    pub fn draw<F>(&mut self, registry: &ShaderRegistry, backend: &mut dyn GraphicsBackend, draw_one: F) -> BatchStats
    where
        F: FnMut(ObjectKey, &ShaderProgram, &mut dyn GraphicsBackend),
    {
        let stats = self.active.draw(registry, backend, draw_one);
        self.state = SwapState::Drawn;
        stats
    }

    /// Rebuild the buckets for a changed registry, keeping membership
    pub fn rebind_collections(&mut self, registry: &ShaderRegistry) {
        self.active.rebuild(registry);
    }

    /// Check whether the registry changed since the last rebind
    pub fn is_stale(&self, registry: &ShaderRegistry) -> bool {
        self.active.generation() != registry.generation()
    }

    /// The active collection
    pub fn active(&self) -> &DrawCollection {
        &self.active
    }

    /// Mutable access to the active collection
    pub fn active_mut(&mut self) -> &mut DrawCollection {
        &mut self.active
    }

    /// Current phase
    pub fn state(&self) -> SwapState {
        self.state
    }

    /// Empty the batch without drawing
    pub fn clear(&mut self) {
        self.swap();
    }
}
