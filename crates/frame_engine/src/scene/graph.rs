//! # Scene Graph
//!
//! Arena of every updateable, renderable and group taking part in the frame
//! loop. Objects are owned by a slotmap and referenced by [`ObjectKey`];
//! groups hold keys of their children, so nesting never needs shared
//! ownership.
//!
//! The root pool is advanced once per update cycle. A built-in drawables
//! group lives in it and keeps its renderables in insertion order. Objects
//! marked unused are removed from their parent and destroyed the next time
//! the walk reaches them; in-use renderables are added to the frame batch
//! right after their update.
//!
//! Three more built-in groups sit outside the root pool:
//!
//! - **pre-updateables**: advanced by [`Scene::advance_pre_updateables`],
//!   before the application's update hook
//! - **pre-drawables**: drawn in insertion order before the batch
//! - **post-drawables**: drawn in insertion order after the batch
//!
//! Renderables of the pre/post layers are advanced with the root pool but
//! never batched; each binds its own program when drawn.

use slotmap::SlotMap;
use thiserror::Error;

use crate::core::config::EngineConfig;
use crate::foundation::collections::{OrderedBucket, UpdatePool};
use crate::foundation::time::FrameTime;
use crate::render::backend::{GraphicsBackend, ProgramId};
use crate::render::batch::{BatchError, BatchStats, SwapCollection};
use crate::render::shader::{report_unlinked, ShaderError, ShaderHandle, ShaderProgram, ShaderRegistry};
use crate::scene::object::{DrawContext, ObjectKey, Renderable, UpdateContext, Updateable};
use crate::scheduler::queue::TaskQueues;

/// Result type for scene operations
pub type SceneResult<T> = Result<T, SceneError>;

/// Errors that can occur while editing the scene
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// The key does not refer to a live object
    #[error("unknown scene object {0:?}")]
    UnknownObject(ObjectKey),

    /// A group operation targeted an object that is not a group
    #[error("scene object {0:?} is not a group")]
    NotAGroup(ObjectKey),

    /// A renderable operation targeted an object that does not draw
    #[error("scene object {0:?} is not renderable")]
    NotRenderable(ObjectKey),

    /// Built-in groups cannot be removed or retired
    #[error("built-in groups are owned by the scene")]
    ProtectedGroup,

    /// Groups cannot be detached, their members only live inside the scene
    #[error("scene object {0:?} is a group, destroy it instead")]
    GroupNotDetachable(ObjectKey),

    /// Batch error
    #[error(transparent)]
    Batch(#[from] BatchError),

    /// Shader registry error
    #[error(transparent)]
    Shader(#[from] ShaderError),
}

/// Object stored in the scene
pub enum SceneObject {
    /// Advanced every cycle, never drawn
    Updateable(Box<dyn Updateable>),
    /// Advanced every cycle and batched for drawing while in use
    Renderable(Box<dyn Renderable>),
    /// Collection of other objects
    Group(Group),
}

impl SceneObject {
    /// Short name of the variant for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Updateable(_) => "updateable",
            Self::Renderable(_) => "renderable",
            Self::Group(_) => "group",
        }
    }

    /// The renderable, if this object draws
    pub fn as_renderable(&self) -> Option<&dyn Renderable> {
        match self {
            Self::Renderable(object) => Some(object.as_ref()),
            _ => None,
        }
    }

    /// The group, if this object is one
    pub fn as_group(&self) -> Option<&Group> {
        match self {
            Self::Group(group) => Some(group),
            _ => None,
        }
    }
}

impl std::fmt::Debug for SceneObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Group(group) => f.debug_tuple("Group").field(group).finish(),
            other => f.write_str(other.kind()),
        }
    }
}

/// Advancing order of a group's members
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOrder {
    /// Members may be reordered by removal; O(1) removal
    Unordered,
    /// Members keep insertion order
    Insertion,
}

#[derive(Debug, Clone)]
enum Members {
    Pool(UpdatePool<ObjectKey>),
    Ordered(OrderedBucket<ObjectKey>),
}

/// Collection of scene objects advanced as one entry of its parent
#[derive(Debug, Clone)]
pub struct Group {
    members: Members,
}

impl Group {
    /// Create an empty group
    pub fn new(order: GroupOrder) -> Self {
        Self::with_capacity(order, 0)
    }

    /// Create an empty group with pre-allocated capacity
    pub fn with_capacity(order: GroupOrder, capacity: usize) -> Self {
        let members = match order {
            GroupOrder::Unordered => Members::Pool(UpdatePool::with_capacity(capacity)),
            GroupOrder::Insertion => Members::Ordered(OrderedBucket::with_capacity(capacity)),
        };
        Self { members }
    }

    /// Advancing order of the members
    pub fn order(&self) -> GroupOrder {
        match self.members {
            Members::Pool(_) => GroupOrder::Unordered,
            Members::Ordered(_) => GroupOrder::Insertion,
        }
    }

    /// Member keys in advancing order
    pub fn keys(&self) -> Vec<ObjectKey> {
        match &self.members {
            Members::Pool(pool) => pool.snapshot(),
            Members::Ordered(bucket) => bucket.snapshot(),
        }
    }

    /// Check whether `key` is a direct member
    pub fn contains(&self, key: ObjectKey) -> bool {
        match &self.members {
            Members::Pool(pool) => pool.contains(&key),
            Members::Ordered(bucket) => bucket.contains(&key),
        }
    }

    /// Number of direct members
    pub fn len(&self) -> usize {
        match &self.members {
            Members::Pool(pool) => pool.len(),
            Members::Ordered(bucket) => bucket.len(),
        }
    }

    /// Check whether the group has no members
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&mut self, key: ObjectKey) {
        match &mut self.members {
            Members::Pool(pool) => pool.push(key),
            Members::Ordered(bucket) => bucket.push(key),
        }
    }

    fn remove(&mut self, key: ObjectKey) -> bool {
        match &mut self.members {
            Members::Pool(pool) => pool.remove(&key).is_some(),
            Members::Ordered(bucket) => {
                let removed = bucket.remove(&key);
                bucket.compact();
                removed
            }
        }
    }

    fn retain(&mut self, keep: impl FnMut(&mut ObjectKey) -> bool) {
        match &mut self.members {
            Members::Pool(pool) => pool.retain_cursor(keep),
            Members::Ordered(bucket) => bucket.retain(keep),
        }
    }

    fn take(&mut self) -> Group {
        let empty = Group::new(self.order());
        std::mem::replace(self, empty)
    }
}

struct Slot {
    object: SceneObject,
    in_use: bool,
    parent: Option<ObjectKey>,
}

/// Counters of one [`Scene::advance`] pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdvanceStats {
    /// Leaf objects whose `update` ran
    pub updated: usize,
    /// Objects removed and destroyed because they were not in use
    pub retired: usize,
    /// Renderables added to the frame batch
    pub batched: usize,
}

/// Built-in groups, none of them removable
#[derive(Debug, Clone, Copy)]
struct Layers {
    drawables: ObjectKey,
    pre_updateables: ObjectKey,
    pre_drawables: ObjectKey,
    post_drawables: ObjectKey,
}

impl Layers {
    fn all(&self) -> [ObjectKey; 4] {
        [self.drawables, self.pre_updateables, self.pre_drawables, self.post_drawables]
    }

    fn contains(&self, key: ObjectKey) -> bool {
        self.all().contains(&key)
    }
}

/// Every object of a running application plus its draw batch
pub struct Scene {
    objects: SlotMap<ObjectKey, Slot>,
    root: UpdatePool<ObjectKey>,
    layers: Layers,
    shaders: ShaderRegistry,
    batch: SwapCollection,
    queues: TaskQueues,
    frame: FrameTime,
}

impl Scene {
    /// Create an empty scene sized from `config`
    pub fn new(config: &EngineConfig, queues: TaskQueues) -> Self {
        let shaders = ShaderRegistry::new(config.shader_capacity, config.bucket_capacity);
        let batch = SwapCollection::new(&shaders);
        let mut objects = SlotMap::with_capacity_and_key(config.updateable_capacity);
        let mut builtin = |capacity: usize| {
            objects.insert(Slot {
                object: SceneObject::Group(Group::with_capacity(GroupOrder::Insertion, capacity)),
                in_use: true,
                parent: None,
            })
        };
        let layers = Layers {
            drawables: builtin(config.bucket_capacity),
            pre_updateables: builtin(0),
            pre_drawables: builtin(0),
            post_drawables: builtin(0),
        };
        let mut root = UpdatePool::with_capacity(config.updateable_capacity);
        root.push(layers.drawables);

        Self {
            objects,
            root,
            layers,
            shaders,
            batch,
            queues,
            frame: FrameTime::zero(),
        }
    }

    // ---- Object management ----

    /// Add an updateable to the root pool
    pub fn add_updateable(&mut self, object: Box<dyn Updateable>) -> ObjectKey {
        let key = self.insert(SceneObject::Updateable(object), None);
        self.root.push(key);
        key
    }

    /// Add an updateable that is advanced before the existing root entries
    pub fn add_updateable_at_front(&mut self, object: Box<dyn Updateable>) -> ObjectKey {
        let key = self.insert(SceneObject::Updateable(object), None);
        self.root.push_front(key);
        key
    }

    /// Add an empty group to the root pool
    pub fn add_group(&mut self, order: GroupOrder) -> ObjectKey {
        let key = self.insert(SceneObject::Group(Group::new(order)), None);
        self.root.push(key);
        key
    }

    /// Add any object as a member of `group`
    pub fn add_to_group(&mut self, group: ObjectKey, object: SceneObject) -> SceneResult<ObjectKey> {
        self.group_mut(group)?;
        let key = self.insert(object, Some(group));
        self.group_mut(group)?.push(key);
        Ok(key)
    }

    /// Add a renderable to the drawables group
    pub fn add_drawable(&mut self, object: Box<dyn Renderable>) -> ObjectKey {
        self.push_builtin(self.layers.drawables, SceneObject::Renderable(object))
    }

    /// Add an updateable advanced before the application's update hook
    pub fn add_pre_updateable(&mut self, object: Box<dyn Updateable>) -> ObjectKey {
        self.push_builtin(self.layers.pre_updateables, SceneObject::Updateable(object))
    }

    /// Add a renderable drawn before the batch, in insertion order
    pub fn add_pre_drawable(&mut self, object: Box<dyn Renderable>) -> ObjectKey {
        self.push_builtin(self.layers.pre_drawables, SceneObject::Renderable(object))
    }

    /// Add a renderable drawn after the batch, in insertion order
    pub fn add_post_drawable(&mut self, object: Box<dyn Renderable>) -> ObjectKey {
        self.push_builtin(self.layers.post_drawables, SceneObject::Renderable(object))
    }

    /// Add several renderables to the drawables group, keeping their order
    pub fn add_drawables(&mut self, objects: impl IntoIterator<Item = Box<dyn Renderable>>) -> Vec<ObjectKey> {
        objects.into_iter().map(|object| self.add_drawable(object)).collect()
    }

    /// Put an existing renderable into the current frame's batch only
    pub fn add_renderable(&mut self, key: ObjectKey) -> SceneResult<()> {
        let shader = self.renderable_shader(key)?;
        self.batch.add(shader, key)?;
        Ok(())
    }

    /// Detach an updateable or renderable from the scene without destroying it
    ///
    /// Groups are refused with [`SceneError::GroupNotDetachable`]; their
    /// members only exist as keys into this scene, so use [`Scene::destroy`].
    pub fn remove(&mut self, key: ObjectKey) -> SceneResult<SceneObject> {
        if self.layers.contains(key) {
            return Err(SceneError::ProtectedGroup);
        }
        match self.objects.get(key) {
            None => return Err(SceneError::UnknownObject(key)),
            Some(Slot {
                object: SceneObject::Group(_),
                ..
            }) => return Err(SceneError::GroupNotDetachable(key)),
            Some(_) => {}
        }
        let slot = self.objects.remove(key).ok_or(SceneError::UnknownObject(key))?;
        self.detach(key, slot.parent);

        match slot.object {
            SceneObject::Renderable(object) => {
                self.batch.active_mut().remove(object.shader(), key);
                Ok(SceneObject::Renderable(object))
            }
            object => Ok(object),
        }
    }

    /// Detach an updateable from the scene without destroying it
    pub fn remove_updateable(&mut self, key: ObjectKey) -> SceneResult<SceneObject> {
        self.remove(key)
    }

    /// Detach a renderable from the scene and the batch without destroying it
    pub fn remove_drawable(&mut self, key: ObjectKey) -> SceneResult<Box<dyn Renderable>> {
        self.renderable_shader(key)?;
        match self.remove(key)? {
            SceneObject::Renderable(object) => Ok(object),
            _ => Err(SceneError::NotRenderable(key)),
        }
    }

    /// Detach an object and run its destroy hook, recursively for groups
    pub fn destroy(&mut self, key: ObjectKey) -> SceneResult<()> {
        if self.layers.contains(key) {
            return Err(SceneError::ProtectedGroup);
        }
        let parent = self.objects.get(key).ok_or(SceneError::UnknownObject(key))?.parent;
        self.detach(key, parent);
        self.retire(key);
        Ok(())
    }

    /// Detach a renderable and run its destroy hook
    pub fn destroy_drawable(&mut self, key: ObjectKey) -> SceneResult<()> {
        self.renderable_shader(key)?;
        self.destroy(key)
    }

    /// Empty the drawables group, running destroy hooks when `destroy` is set
    pub fn clear_drawables(&mut self, destroy: bool) -> usize {
        let cleared = self.clear_builtin(self.layers.drawables, destroy);
        log::debug!("Cleared {} drawables (destroyed: {})", cleared, destroy);
        cleared
    }

    /// Retire an object; it is removed and destroyed when the walk next reaches it
    pub fn mark_unused(&mut self, key: ObjectKey) -> SceneResult<()> {
        if self.layers.contains(key) {
            return Err(SceneError::ProtectedGroup);
        }
        self.objects.get_mut(key).ok_or(SceneError::UnknownObject(key))?.in_use = false;
        Ok(())
    }

    /// Undo [`Scene::mark_unused`] for an object that was not collected yet
    pub fn revive(&mut self, key: ObjectKey) -> SceneResult<()> {
        self.objects.get_mut(key).ok_or(SceneError::UnknownObject(key))?.in_use = true;
        Ok(())
    }

    /// Whether the object is still in use, `None` once it left the scene
    pub fn is_in_use(&self, key: ObjectKey) -> Option<bool> {
        self.objects.get(key).map(|slot| slot.in_use)
    }

    /// Check whether `key` refers to a live object
    pub fn contains(&self, key: ObjectKey) -> bool {
        self.objects.contains_key(key)
    }

    /// Look up an object
    pub fn get(&self, key: ObjectKey) -> Option<&SceneObject> {
        self.objects.get(key).map(|slot| &slot.object)
    }

    /// Look up an object mutably
    pub fn get_mut(&mut self, key: ObjectKey) -> Option<&mut SceneObject> {
        self.objects.get_mut(key).map(|slot| &mut slot.object)
    }

    /// Key of the built-in drawables group
    pub fn drawables_group(&self) -> ObjectKey {
        self.layers.drawables
    }

    /// Key of the built-in pre-updateables group
    pub fn pre_updateables_group(&self) -> ObjectKey {
        self.layers.pre_updateables
    }

    /// Key of the built-in group drawn before the batch
    pub fn pre_drawables_group(&self) -> ObjectKey {
        self.layers.pre_drawables
    }

    /// Key of the built-in group drawn after the batch
    pub fn post_drawables_group(&self) -> ObjectKey {
        self.layers.post_drawables
    }

    /// Every non-group object, depth first in advancing order
    ///
    /// Pre-updateables come first, then the pre-drawables, the root pool
    /// and the post-drawables.
    pub fn updateables(&self) -> Vec<ObjectKey> {
        self.collect_all(false)
    }

    /// Every renderable, depth first in advancing order
    pub fn drawables(&self) -> Vec<ObjectKey> {
        self.collect_all(true)
    }

    /// Number of live objects, groups included
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Check whether only the built-in groups are left
    pub fn is_empty(&self) -> bool {
        self.objects.len() <= self.layers.all().len()
    }

    /// Destroy every object and empty the batch
    pub fn destroy_all(&mut self) {
        let root = std::mem::take(&mut self.root);
        for key in root.iter() {
            if *key != self.layers.drawables {
                self.retire(*key);
            }
        }
        for layer in self.layers.all() {
            self.clear_builtin(layer, true);
        }
        self.root.push(self.layers.drawables);
        self.batch.clear();
        log::info!("Destroyed all scene objects");
    }

    // ---- Shaders ----

    /// Register a batched shader and rebind the batch
    pub fn register_shader(&mut self, name: impl Into<String>, program: ProgramId) -> ShaderHandle {
        let handle = self.shaders.register(name, program);
        self.rebind_shader_collection();
        handle
    }

    /// Register a shader drawn outside the bucketed batch
    pub fn register_unbatched_shader(&mut self, name: impl Into<String>, program: ProgramId) -> ShaderHandle {
        self.shaders.register_unbatched(name, program)
    }

    /// Draw a shader's bucket before every other bucket
    pub fn push_shader_to_front(&mut self, handle: ShaderHandle) -> SceneResult<()> {
        self.shaders.push_to_front(handle)?;
        self.rebind_shader_collection();
        Ok(())
    }

    /// Remove a shader; renderables batched under it are dropped from the batch
    pub fn remove_shader(&mut self, handle: ShaderHandle) -> SceneResult<ShaderProgram> {
        let shader = self.shaders.remove(handle)?;
        self.rebind_shader_collection();
        Ok(shader)
    }

    /// Attach a linked backend program to a registered shader
    pub fn set_shader_program(&mut self, handle: ShaderHandle, program: ProgramId) -> SceneResult<()> {
        self.shaders.set_program(handle, program)?;
        Ok(())
    }

    /// Rebuild the shader buckets from the registry, keeping batch membership
    pub fn rebind_shader_collection(&mut self) {
        self.batch.rebind_collections(&self.shaders);
    }

    /// The shader registry
    pub fn shaders(&self) -> &ShaderRegistry {
        &self.shaders
    }

    // ---- Frame ----

    /// Start an update cycle: clear the drawn batch and publish `frame`
    pub fn begin_frame(&mut self, frame: FrameTime) {
        self.batch.swap();
        if self.batch.is_stale(&self.shaders) {
            self.rebind_shader_collection();
        }
        self.frame = frame;
    }

    /// Advance the pre-updateables group; runs before the application's update hook
    pub fn advance_pre_updateables(&mut self) -> AdvanceStats {
        let mut stats = AdvanceStats::default();
        self.advance_entry(self.layers.pre_updateables, true, &mut stats);
        stats
    }

    /// Advance every object once and batch the renderables still in use
    ///
    /// Pre-updateables are left to [`Scene::advance_pre_updateables`].
    /// Pre/post drawables are advanced around the root pool and never batched.
    pub fn advance(&mut self) -> AdvanceStats {
        let mut stats = AdvanceStats::default();
        self.advance_entry(self.layers.pre_drawables, false, &mut stats);

        let mut root = std::mem::take(&mut self.root);
        root.retain_cursor(|key| self.advance_entry(*key, true, &mut stats));
        // Objects added to the root while it was taken out are kept.
        for key in std::mem::replace(&mut self.root, root).iter() {
            self.root.push(*key);
        }

        self.advance_entry(self.layers.post_drawables, false, &mut stats);

        if stats.retired > 0 {
            log::trace!("Retired {} scene objects", stats.retired);
        }
        stats
    }

    /// Draw the pre-drawables, the batch and the post-drawables through `backend`; render context only
    pub fn draw(&mut self, backend: &mut dyn GraphicsBackend) -> BatchStats {
        let pre = self.draw_layer(self.layers.pre_drawables, backend);

        let Self {
            objects,
            shaders,
            batch,
            frame,
            ..
        } = self;
        let frame: &FrameTime = frame;

        let mut stats = batch.draw(shaders, backend, |key, shader, backend| {
            if let Some(Slot {
                object: SceneObject::Renderable(object),
                ..
            }) = objects.get_mut(key)
            {
                let mut ctx = DrawContext::new(backend, shader, frame);
                object.draw(&mut ctx);
            }
        });

        let post = self.draw_layer(self.layers.post_drawables, backend);
        for layer in [pre, post] {
            stats.renderables += layer.renderables;
            stats.programs_bound += layer.programs_bound;
        }
        stats
    }

    /// Timing of the current cycle
    pub fn frame(&self) -> &FrameTime {
        &self.frame
    }

    /// The frame batch
    pub fn batch(&self) -> &SwapCollection {
        &self.batch
    }

    /// Deferred queues shared with every object
    pub fn queues(&self) -> &TaskQueues {
        &self.queues
    }

    // ---- Internals ----

    fn insert(&mut self, object: SceneObject, parent: Option<ObjectKey>) -> ObjectKey {
        log::trace!("Adding {} to the scene", object.kind());
        self.objects.insert(Slot {
            object,
            in_use: true,
            parent,
        })
    }

    fn push_builtin(&mut self, layer: ObjectKey, object: SceneObject) -> ObjectKey {
        let key = self.insert(object, Some(layer));
        if let Ok(group) = self.group_mut(layer) {
            group.push(key);
        }
        key
    }

    fn clear_builtin(&mut self, layer: ObjectKey, destroy: bool) -> usize {
        let members = match self.group_mut(layer) {
            Ok(group) => group.take().keys(),
            Err(_) => return 0,
        };

        for key in &members {
            if destroy {
                self.retire(*key);
            } else if let Some(slot) = self.objects.remove(*key) {
                self.unbatch(*key, &slot.object);
            }
        }
        members.len()
    }

    /// Draw the in-use renderables of a pre/post layer in order, rebinding on shader change
    fn draw_layer(&mut self, layer: ObjectKey, backend: &mut dyn GraphicsBackend) -> BatchStats {
        let mut keys = Vec::new();
        self.collect(layer, &mut keys, true);

        let mut stats = BatchStats::default();
        let mut bound = None;
        for key in keys {
            let Some(Slot {
                object: SceneObject::Renderable(object),
                in_use: true,
                ..
            }) = self.objects.get_mut(key)
            else {
                continue;
            };
            let Some(shader) = self.shaders.get(object.shader()) else {
                log::warn!("Skipping layered renderable {:?} with an unknown shader", key);
                continue;
            };
            if !shader.is_linked() {
                report_unlinked(shader, 1);
                continue;
            }

            if bound != Some(shader.program()) {
                backend.use_program(shader.program());
                bound = Some(shader.program());
                stats.programs_bound += 1;
            }
            let mut ctx = DrawContext::new(backend, shader, &self.frame);
            object.draw(&mut ctx);
            stats.renderables += 1;
        }
        stats
    }

    fn group_mut(&mut self, key: ObjectKey) -> SceneResult<&mut Group> {
        match self.objects.get_mut(key) {
            Some(Slot {
                object: SceneObject::Group(group),
                ..
            }) => Ok(group),
            Some(_) => Err(SceneError::NotAGroup(key)),
            None => Err(SceneError::UnknownObject(key)),
        }
    }

    fn renderable_shader(&self, key: ObjectKey) -> SceneResult<ShaderHandle> {
        match self.objects.get(key) {
            Some(Slot {
                object: SceneObject::Renderable(object),
                ..
            }) => Ok(object.shader()),
            Some(_) => Err(SceneError::NotRenderable(key)),
            None => Err(SceneError::UnknownObject(key)),
        }
    }

    fn detach(&mut self, key: ObjectKey, parent: Option<ObjectKey>) {
        match parent {
            None => {
                self.root.remove(&key);
            }
            Some(parent) => {
                if let Ok(group) = self.group_mut(parent) {
                    group.remove(key);
                }
            }
        }
    }

    fn unbatch(&mut self, key: ObjectKey, object: &SceneObject) {
        if let SceneObject::Renderable(object) = object {
            self.batch.active_mut().remove(object.shader(), key);
        }
    }

    /// Remove an object that is already detached from its parent and destroy it
    fn retire(&mut self, key: ObjectKey) {
        let Some(slot) = self.objects.remove(key) else {
            return;
        };
        self.unbatch(key, &slot.object);

        match slot.object {
            SceneObject::Updateable(mut object) => object.destroy(&self.queues),
            SceneObject::Renderable(mut object) => object.destroy(&self.queues),
            SceneObject::Group(group) => {
                for child in group.keys() {
                    self.retire(child);
                }
            }
        }
    }

    /// Advance one entry; renderables below it are batched only when `batched` is set
    fn advance_entry(&mut self, key: ObjectKey, batched: bool, stats: &mut AdvanceStats) -> bool {
        let Some(slot) = self.objects.get_mut(key) else {
            return false;
        };

        if !slot.in_use {
            self.retire(key);
            stats.retired += 1;
            return false;
        }

        match &mut slot.object {
            SceneObject::Group(group) => {
                let mut members = group.take();
                members.retain(|child| self.advance_entry(*child, batched, stats));
                if let Ok(group) = self.group_mut(key) {
                    // Keep members added while the group was taken out.
                    for added in group.keys() {
                        members.push(added);
                    }
                    *group = members;
                }
            }
            SceneObject::Updateable(object) => {
                let mut ctx = UpdateContext::new(&self.frame, &self.queues);
                object.update(&mut ctx);
                stats.updated += 1;
                if ctx.is_retired() {
                    slot.in_use = false;
                }
            }
            SceneObject::Renderable(object) => {
                let mut ctx = UpdateContext::new(&self.frame, &self.queues);
                object.update(&mut ctx);
                stats.updated += 1;
                if ctx.is_retired() {
                    slot.in_use = false;
                } else if batched {
                    match self.batch.add(object.shader(), key) {
                        Ok(()) => stats.batched += 1,
                        Err(err) => report_unbatched(key, &err),
                    }
                }
            }
        }
        true
    }

    fn collect_all(&self, renderables_only: bool) -> Vec<ObjectKey> {
        let mut out = Vec::new();
        self.collect(self.layers.pre_updateables, &mut out, renderables_only);
        self.collect(self.layers.pre_drawables, &mut out, renderables_only);
        for key in self.root.iter() {
            self.collect(*key, &mut out, renderables_only);
        }
        self.collect(self.layers.post_drawables, &mut out, renderables_only);
        out
    }

    fn collect(&self, key: ObjectKey, out: &mut Vec<ObjectKey>, renderables_only: bool) {
        let Some(slot) = self.objects.get(key) else {
            return;
        };
        match &slot.object {
            SceneObject::Group(group) => {
                for child in group.keys() {
                    self.collect(child, out, renderables_only);
                }
            }
            SceneObject::Renderable(_) => out.push(key),
            SceneObject::Updateable(_) if !renderables_only => out.push(key),
            SceneObject::Updateable(_) => {}
        }
    }
}

/// A renderable whose shader has no bucket is a setup error
fn report_unbatched(key: ObjectKey, err: &BatchError) {
    log::error!("Renderable {:?} was not batched: {}", key, err);
    debug_assert!(false, "renderable {key:?} was not batched: {err}");
}
