//! Shader registry
//!
//! Ordered list of shader programs with dense integer ids. The dense id of a
//! batched shader is its position in the registry and decides the order in
//! which shader buckets are drawn. Renderables refer to shaders by
//! [`ShaderHandle`], which stays valid when the dense ids are renumbered.
//!
//! Every mutation bumps [`ShaderRegistry::generation`]; draw collections
//! compare it against the generation they were built from to know when a
//! rebuild is due.

use slotmap::{new_key_type, SlotMap};
use thiserror::Error;

use crate::render::backend::ProgramId;

new_key_type! {
    /// Stable reference to a registered shader
    pub struct ShaderHandle;
}

/// Errors from shader registry operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShaderError {
    /// The handle does not belong to a registered shader
    #[error("unknown shader handle {0:?}")]
    UnknownShader(ShaderHandle),

    /// The shader exists but has no draw bucket
    #[error("shader '{0}' is not batched")]
    NotBatched(String),
}

/// A registered shader program
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderProgram {
    name: String,
    program: ProgramId,
    batched: bool,
    bucket_capacity: usize,
}

impl ShaderProgram {
    /// Shader name used in diagnostics
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backend program, `ProgramId(0)` until linked
    pub fn program(&self) -> ProgramId {
        self.program
    }

    /// Whether a backend program was linked for this shader
    pub fn is_linked(&self) -> bool {
        self.program != ProgramId::default()
    }

    /// Whether renderables using this shader are bucketed
    pub fn is_batched(&self) -> bool {
        self.batched
    }

    /// Initial capacity of this shader's bucket
    pub fn bucket_capacity(&self) -> usize {
        self.bucket_capacity
    }
}

/// Log a draw through an unlinked program; panics in debug builds
pub(crate) fn report_unlinked(shader: &ShaderProgram, renderables: usize) {
    log::error!(
        "Shader '{}' has no linked program, skipping {} renderables",
        shader.name(),
        renderables
    );
    debug_assert!(false, "shader '{}' drawn before its program was linked", shader.name());
}

/// Ordered registry of shader programs
#[derive(Debug, Clone)]
pub struct ShaderRegistry {
    shaders: SlotMap<ShaderHandle, ShaderProgram>,
    order: Vec<ShaderHandle>,
    generation: u64,
    default_bucket_capacity: usize,
}

impl ShaderRegistry {
    /// Create an empty registry
    pub fn new(capacity: usize, default_bucket_capacity: usize) -> Self {
        Self {
            shaders: SlotMap::with_capacity_and_key(capacity),
            order: Vec::with_capacity(capacity),
            generation: 0,
            default_bucket_capacity,
        }
    }

    /// Append a batched shader; its dense id is the current batched count
    pub fn register(&mut self, name: impl Into<String>, program: ProgramId) -> ShaderHandle {
        let handle = self.insert(name.into(), program, true);
        self.order.push(handle);
        handle
    }

    /// Register a shader that is drawn outside the bucketed batch
    pub fn register_unbatched(&mut self, name: impl Into<String>, program: ProgramId) -> ShaderHandle {
        self.insert(name.into(), program, false)
    }

    fn insert(&mut self, name: String, program: ProgramId, batched: bool) -> ShaderHandle {
        log::debug!("Registering shader '{}' (batched: {})", name, batched);
        self.generation += 1;
        self.shaders.insert(ShaderProgram {
            name,
            program,
            batched,
            bucket_capacity: self.default_bucket_capacity,
        })
    }

    /// Move a batched shader to dense id 0, renumbering the others
    pub fn push_to_front(&mut self, handle: ShaderHandle) -> Result<(), ShaderError> {
        let shader = self.shaders.get(handle).ok_or(ShaderError::UnknownShader(handle))?;
        let index = self
            .order
            .iter()
            .position(|candidate| *candidate == handle)
            .ok_or_else(|| ShaderError::NotBatched(shader.name.clone()))?;

        self.order.remove(index);
        self.order.insert(0, handle);
        self.generation += 1;
        Ok(())
    }

    /// Remove a shader from the registry
    pub fn remove(&mut self, handle: ShaderHandle) -> Result<ShaderProgram, ShaderError> {
        let shader = self.shaders.remove(handle).ok_or(ShaderError::UnknownShader(handle))?;
        self.order.retain(|candidate| *candidate != handle);
        self.generation += 1;
        Ok(shader)
    }

    /// Attach the linked backend program, e.g. from a GL-queue task
    ///
    /// Programs are looked up at draw time, so this does not require a rebuild.
    pub fn set_program(&mut self, handle: ShaderHandle, program: ProgramId) -> Result<(), ShaderError> {
        let shader = self.shaders.get_mut(handle).ok_or(ShaderError::UnknownShader(handle))?;
        shader.program = program;
        Ok(())
    }

    /// Change the initial capacity of a shader's bucket, effective on the next rebuild
    pub fn set_bucket_capacity(&mut self, handle: ShaderHandle, capacity: usize) -> Result<(), ShaderError> {
        let shader = self.shaders.get_mut(handle).ok_or(ShaderError::UnknownShader(handle))?;
        shader.bucket_capacity = capacity;
        self.generation += 1;
        Ok(())
    }

    /// Look up a shader
    pub fn get(&self, handle: ShaderHandle) -> Option<&ShaderProgram> {
        self.shaders.get(handle)
    }

    /// Dense id of a batched shader
    pub fn dense_id(&self, handle: ShaderHandle) -> Option<usize> {
        self.order.iter().position(|candidate| *candidate == handle)
    }

    /// Batched shaders in dense-id order
    pub fn ordered(&self) -> impl Iterator<Item = (ShaderHandle, &ShaderProgram)> + '_ {
        self.order
            .iter()
            .filter_map(move |handle| self.shaders.get(*handle).map(|shader| (*handle, shader)))
    }

    /// Number of batched shaders
    pub fn batched_len(&self) -> usize {
        self.order.len()
    }

    /// Number of registered shaders
    pub fn len(&self) -> usize {
        self.shaders.len()
    }

    /// Check whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.shaders.is_empty()
    }

    /// Counter bumped by every mutation that affects bucket layout
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Default for ShaderRegistry {
    fn default() -> Self {
        Self::new(32, 1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_ids_follow_registration() {
        let mut registry = ShaderRegistry::default();
        let a = registry.register("a", ProgramId(1));
        let unbatched = registry.register_unbatched("overlay", ProgramId(9));
        let b = registry.register("b", ProgramId(2));

        assert_eq!(registry.dense_id(a), Some(0));
        assert_eq!(registry.dense_id(b), Some(1));
        assert_eq!(registry.dense_id(unbatched), None);
        assert_eq!(registry.batched_len(), 2);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_push_to_front_renumbers() {
        let mut registry = ShaderRegistry::default();
        let a = registry.register("a", ProgramId(1));
        let b = registry.register("b", ProgramId(2));
        let c = registry.register("c", ProgramId(3));
        let before = registry.generation();

        registry.push_to_front(c).unwrap();

        assert_eq!(registry.dense_id(c), Some(0));
        assert_eq!(registry.dense_id(a), Some(1));
        assert_eq!(registry.dense_id(b), Some(2));
        assert!(registry.generation() > before);
    }

    #[test]
    fn test_push_unbatched_to_front_fails() {
        let mut registry = ShaderRegistry::default();
        let overlay = registry.register_unbatched("overlay", ProgramId(9));
        assert_eq!(
            registry.push_to_front(overlay),
            Err(ShaderError::NotBatched("overlay".to_string()))
        );
    }

    #[test]
    fn test_remove_and_unknown_handle() {
        let mut registry = ShaderRegistry::default();
        let a = registry.register("a", ProgramId(1));
        let b = registry.register("b", ProgramId(2));

        registry.remove(a).unwrap();
        assert_eq!(registry.dense_id(b), Some(0));
        assert_eq!(registry.remove(a), Err(ShaderError::UnknownShader(a)));
        assert!(registry.set_program(a, ProgramId(4)).is_err());
    }

    #[test]
    fn test_set_program_keeps_generation() {
        let mut registry = ShaderRegistry::default();
        let a = registry.register("a", ProgramId(0));
        let generation = registry.generation();
        assert_eq!(registry.get(a).map(ShaderProgram::is_linked), Some(false));

        registry.set_program(a, ProgramId(7)).unwrap();
        assert_eq!(registry.get(a).map(ShaderProgram::is_linked), Some(true));
        assert_eq!(registry.get(a).map(ShaderProgram::program), Some(ProgramId(7)));
        assert_eq!(registry.generation(), generation);
    }
}
