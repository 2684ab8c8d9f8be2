/// Context - accumulates draw state and resolves it against a backend
///
/// The scene renderer issues `bind_*` calls, then `flush` with a draw
/// descriptor. Binding only records state; nothing reaches the backend
/// until `flush`, which resolves everything in a fixed order:
///
/// 1. pending pipeline becomes current
/// 2. native pipeline bind
/// 3. blend state
/// 4. rasterization (culling)
/// 5. standalone uniforms
/// 6. textures (realized on demand, then prepared)
/// 7. vertex attributes (buffers realized on demand)
/// 8. draw
/// 9. transient state cleared (textures; attributes if `reset_after`)
///
/// A Context is used from a single render thread and has no internal locking.

use std::sync::Arc;
use rustc_hash::FxHashSet;
use crate::backend::{Backend, BufferTarget, Capability};
use crate::error::{BindingKind, Error, Result};
use crate::pipeline::{
    Pipeline, PipelineArena, PipelineDesc, PipelineKey, UniformUpload, VertexInputRate,
};
use crate::{prism_debug, prism_error, prism_trace};
use super::binding_slots::BindingSlots;
use super::bindings::{
    BoundUniformBuffer, BoundVertexBuffer, IndexBufferBinding, TextureBinding,
    UniformBufferBinding, VertexBufferBinding,
};
use super::config::{ContextConfig, ContextStats};
use super::draw_call::DrawCall;

const LOG_SOURCE: &str = "prism::Context";

pub struct Context {
    backend: Box<dyn Backend>,
    config: ContextConfig,
    pipelines: PipelineArena,
    /// Pipeline actually bound by the last flush
    current: Option<(PipelineKey, Arc<Pipeline>)>,
    /// Pipeline to switch to on the next flush
    pending: Option<PipelineKey>,
    textures: BindingSlots<TextureBinding>,
    vertex_buffers: BindingSlots<BoundVertexBuffer>,
    uniform_buffers: BindingSlots<BoundUniformBuffer>,
    index_buffer: Option<IndexBufferBinding>,
    standalone_uniforms: Option<BoundUniformBuffer>,
    /// Attribute locations currently enabled on the backend
    enabled_attributes: FxHashSet<u32>,
    stats: ContextStats,
}

impl Context {
    /// Create a context resolving into `backend`
    pub fn new(backend: Box<dyn Backend>, config: ContextConfig) -> Self {
        let max = config.max_binding_slots;
        prism_debug!(LOG_SOURCE, "Created '{}' ({} binding slots per table)", config.label, max);

        Self {
            backend,
            pipelines: PipelineArena::new(),
            current: None,
            pending: None,
            textures: BindingSlots::new(BindingKind::Texture, max),
            vertex_buffers: BindingSlots::new(BindingKind::VertexBuffer, max),
            uniform_buffers: BindingSlots::new(BindingKind::UniformBuffer, max),
            index_buffer: None,
            standalone_uniforms: None,
            enabled_attributes: FxHashSet::default(),
            stats: ContextStats::default(),
            config,
        }
    }

    // ===== PIPELINES =====

    /// Create a pipeline snapshot owned by this context
    pub fn create_pipeline(&mut self, desc: PipelineDesc) -> Result<PipelineKey> {
        let key = self.pipelines.insert(desc)?;
        prism_trace!(LOG_SOURCE, "Created pipeline {:?}", key);
        Ok(key)
    }

    /// Remove a pipeline snapshot
    ///
    /// If it is the current pipeline it stays alive until the next switch.
    pub fn destroy_pipeline(&mut self, key: PipelineKey) -> Result<()> {
        if self.pipelines.remove(key).is_none() {
            prism_error!(LOG_SOURCE, "destroy_pipeline: unknown pipeline {:?}", key);
            return Err(Error::PipelineNotFound);
        }
        if self.pending == Some(key) {
            self.pending = None;
        }
        Ok(())
    }

    pub fn pipeline(&self, key: PipelineKey) -> Option<&Arc<Pipeline>> {
        self.pipelines.get(key)
    }

    /// Select the pipeline for the next flush
    pub fn bind_pipeline(&mut self, key: PipelineKey) -> Result<()> {
        if !self.pipelines.contains(key) {
            prism_error!(LOG_SOURCE, "bind_pipeline: unknown pipeline {:?}", key);
            return Err(Error::PipelineNotFound);
        }
        self.pending = Some(key);
        Ok(())
    }

    pub fn current_pipeline(&self) -> Option<PipelineKey> {
        self.current.as_ref().map(|(key, _)| *key)
    }

    pub fn pending_pipeline(&self) -> Option<PipelineKey> {
        self.pending
    }

    // ===== BINDINGS =====

    /// Merge texture bindings into the texture table
    ///
    /// Indices are validated before anything is written.
    pub fn bind_textures(&mut self, bindings: &[TextureBinding]) -> Result<()> {
        for binding in bindings {
            self.check_index(&self.textures, binding.binding)?;
        }
        for binding in bindings {
            self.textures.set(binding.binding, binding.clone())?;
        }
        Ok(())
    }

    /// Merge vertex buffer bindings; entries without a buffer are ignored
    pub fn bind_vertex_buffers(&mut self, bindings: &[VertexBufferBinding]) -> Result<()> {
        for binding in bindings {
            self.check_index(&self.vertex_buffers, binding.binding)?;
        }
        for binding in bindings {
            if let Some(buffer) = &binding.buffer {
                self.vertex_buffers.set(
                    binding.binding,
                    BoundVertexBuffer {
                        buffer: buffer.clone(),
                        offset: binding.offset,
                    },
                )?;
            }
        }
        Ok(())
    }

    pub fn bind_index_buffer(&mut self, binding: IndexBufferBinding) {
        self.index_buffer = Some(binding);
    }

    /// Merge uniform block bindings and optionally replace the standalone uniform buffer
    ///
    /// Entries without a buffer are ignored, as is a standalone binding
    /// without one.
    pub fn bind_uniform_buffers(
        &mut self,
        bindings: &[UniformBufferBinding],
        standalone: Option<&UniformBufferBinding>,
    ) -> Result<()> {
        for binding in bindings {
            self.check_index(&self.uniform_buffers, binding.binding)?;
        }
        for binding in bindings {
            if let Some(buffer) = &binding.buffer {
                self.uniform_buffers.set(
                    binding.binding,
                    BoundUniformBuffer {
                        buffer: buffer.clone(),
                        offset: binding.offset,
                        size: binding.size,
                    },
                )?;
            }
        }
        if let Some(UniformBufferBinding { buffer: Some(buffer), offset, size, .. }) = standalone {
            self.standalone_uniforms = Some(BoundUniformBuffer {
                buffer: buffer.clone(),
                offset: *offset,
                size: *size,
            });
        }
        Ok(())
    }

    /// Drop every binding (render target change)
    pub fn reset_bindings(&mut self) {
        self.textures.clear();
        self.vertex_buffers.clear();
        self.uniform_buffers.clear();
        self.index_buffer = None;
        self.standalone_uniforms = None;
    }

    fn check_index<T>(&self, slots: &BindingSlots<T>, index: u32) -> Result<()> {
        slots.check_index(index).inspect_err(|err| {
            prism_error!(LOG_SOURCE, "'{}': {}", self.config.label, err);
        })
    }

    // ===== ACCESSORS =====

    pub fn textures(&self) -> &BindingSlots<TextureBinding> {
        &self.textures
    }

    pub fn vertex_buffers(&self) -> &BindingSlots<BoundVertexBuffer> {
        &self.vertex_buffers
    }

    pub fn uniform_buffers(&self) -> &BindingSlots<BoundUniformBuffer> {
        &self.uniform_buffers
    }

    pub fn index_buffer(&self) -> Option<&IndexBufferBinding> {
        self.index_buffer.as_ref()
    }

    pub fn standalone_uniform_buffer(&self) -> Option<&BoundUniformBuffer> {
        self.standalone_uniforms.as_ref()
    }

    /// Attribute locations left enabled on the backend
    pub fn enabled_attributes(&self) -> &FxHashSet<u32> {
        &self.enabled_attributes
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn stats(&self) -> ContextStats {
        self.stats
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn backend_mut(&mut self) -> &mut dyn Backend {
        self.backend.as_mut()
    }

    // ===== FLUSH =====

    /// Resolve all bound state against the backend and issue `draw_call`
    ///
    /// Fails with `NoPipelineBound` if no pipeline was ever bound. With
    /// `reset_after`, the attribute locations enabled by this flush are
    /// disabled again once the draw is issued.
    ///
    /// Transient state is cleared whether or not resolution succeeds:
    /// texture bindings are dropped and, with `reset_after`, every location
    /// enabled before the failure is disabled. The first error is returned.
    pub fn flush(&mut self, reset_after: bool, draw_call: &DrawCall) -> Result<()> {
        let mut enabled = Vec::new();
        let resolved = self.resolve(draw_call, &mut enabled);

        self.textures.clear();
        let reset = if reset_after {
            self.disable_attributes(&enabled)
        } else {
            Ok(())
        };

        resolved?;
        reset?;
        self.stats.flushes += 1;
        Ok(())
    }

    /// Steps 1-8; `enabled` collects attribute locations as they are enabled
    fn resolve(&mut self, draw_call: &DrawCall, enabled: &mut Vec<u32>) -> Result<()> {
        let pipeline = self.switch_pipeline()?;

        self.backend.bind_pipeline(pipeline.native())?;
        self.apply_blend(&pipeline)?;
        self.apply_rasterization(&pipeline)?;
        self.upload_standalone_uniforms(&pipeline)?;
        self.bind_textures_for_draw()?;
        self.bind_vertex_attributes(&pipeline, enabled)?;
        self.issue_draw(&pipeline, draw_call)
    }

    /// Step 9 with `reset_after`; keeps going past a failing location
    fn disable_attributes(&mut self, locations: &[u32]) -> Result<()> {
        let mut result = Ok(());
        for &location in locations {
            self.enabled_attributes.remove(&location);
            if let Err(err) = self.backend.disable_vertex_attribute(location) {
                prism_error!(LOG_SOURCE, "Failed to disable attribute {}: {}", location, err);
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }

    /// Step 1: promote the pending pipeline, or reuse the current one
    fn switch_pipeline(&mut self) -> Result<Arc<Pipeline>> {
        if let Some(key) = self.pending.take() {
            let Some(pipeline) = self.pipelines.get(key).cloned() else {
                prism_error!(LOG_SOURCE, "flush: pending pipeline {:?} was destroyed", key);
                return Err(Error::PipelineNotFound);
            };
            prism_trace!(LOG_SOURCE, "Switching to pipeline '{}'", pipeline.label());
            self.current = Some((key, pipeline));
            self.stats.pipeline_switches += 1;
        }

        match &self.current {
            Some((_, pipeline)) => Ok(pipeline.clone()),
            None => {
                prism_error!(LOG_SOURCE, "'{}': flush before any pipeline was bound", self.config.label);
                Err(Error::NoPipelineBound)
            }
        }
    }

    /// Step 3
    fn apply_blend(&mut self, pipeline: &Pipeline) -> Result<()> {
        let Some(blend) = pipeline.color_blend() else {
            return Ok(());
        };

        self.backend.set_capability(Capability::Blend, blend.blend_enable)?;
        if !blend.blend_enable {
            return Ok(());
        }

        if blend.factors_match() {
            self.backend.blend_func(blend.src_color_factor, blend.dst_color_factor)?;
        } else {
            self.backend.blend_func_separate(
                blend.src_color_factor,
                blend.dst_color_factor,
                blend.src_alpha_factor,
                blend.dst_alpha_factor,
            )?;
        }

        if blend.ops_match() {
            self.backend.blend_equation(blend.color_blend_op)
        } else {
            self.backend.blend_equation_separate(blend.color_blend_op, blend.alpha_blend_op)
        }
    }

    /// Step 4
    fn apply_rasterization(&mut self, pipeline: &Pipeline) -> Result<()> {
        let Some(raster) = pipeline.rasterization() else {
            return Ok(());
        };

        match raster.cull_mode.face() {
            None => self.backend.set_capability(Capability::CullFace, false)?,
            Some(face) => {
                self.backend.set_capability(Capability::CullFace, true)?;
                self.backend.cull_face(face)?;
            }
        }
        self.backend.front_face(raster.front_face)
    }

    /// Step 5: one typed upload per reflected standalone uniform
    fn upload_standalone_uniforms(&mut self, pipeline: &Pipeline) -> Result<()> {
        let Some(bound) = &self.standalone_uniforms else {
            return Ok(());
        };

        for uniform in pipeline.program().standalone_uniforms() {
            let upload = uniform.ty.upload();
            let count = uniform.array_size.max(1);
            let scalars = (upload.scalar_count() * count) as usize;
            let offset = uniform_read_offset(bound, &uniform.name, uniform.offset, scalars * 4)?;

            match upload {
                UniformUpload::Float { components } => {
                    let mut data = vec![0.0f32; scalars];
                    bound.buffer.read_host_memory(offset, bytemuck::cast_slice_mut(&mut data[..]))?;
                    self.backend.uniform_float(uniform.location, components, count, &data)?;
                }
                UniformUpload::Int { components } => {
                    let mut data = vec![0i32; scalars];
                    bound.buffer.read_host_memory(offset, bytemuck::cast_slice_mut(&mut data[..]))?;
                    self.backend.uniform_int(uniform.location, components, count, &data)?;
                }
                UniformUpload::Matrix { dimension } => {
                    let mut data = vec![0.0f32; scalars];
                    bound.buffer.read_host_memory(offset, bytemuck::cast_slice_mut(&mut data[..]))?;
                    self.backend.uniform_matrix(uniform.location, dimension, count, &data)?;
                }
                UniformUpload::Skip => {
                    prism_trace!(
                        LOG_SOURCE,
                        "Skipping uniform '{}' of unsupported type {:?}",
                        uniform.name, uniform.ty
                    );
                    self.stats.uniforms_skipped += 1;
                    continue;
                }
            }
            self.stats.uniforms_uploaded += 1;
        }
        Ok(())
    }

    /// Step 6: texture unit = binding index
    fn bind_textures_for_draw(&mut self) -> Result<()> {
        for (unit, binding) in self.textures.iter() {
            let texture = &binding.texture;
            if !texture.is_realized() {
                prism_trace!(LOG_SOURCE, "Realizing texture on unit {} at draw time", unit);
                texture.initialize_resource()?;
                self.stats.lazy_realizations += 1;
            }

            let Some(handle) = texture.native_handle() else {
                prism_error!(LOG_SOURCE, "Texture on unit {} still unrealized after initialization", unit);
                return Err(Error::ResourceNotRealized(format!("texture on unit {}", unit)));
            };
            let sampler = binding.sampler.as_ref().map(|s| s.native_handle());

            self.backend.bind_texture(unit, handle, sampler)?;
            texture.prepare()?;
        }
        Ok(())
    }

    /// Step 7: pushes each location onto `enabled`, in attribute order
    fn bind_vertex_attributes(&mut self, pipeline: &Pipeline, enabled: &mut Vec<u32>) -> Result<()> {
        for attribute in &pipeline.vertex_input().attributes {
            self.backend.enable_vertex_attribute(attribute.location)?;
            self.enabled_attributes.insert(attribute.location);
            enabled.push(attribute.location);

            let Some(bound) = self.vertex_buffers.get(attribute.binding) else {
                prism_error!(
                    LOG_SOURCE,
                    "Attribute at location {} reads binding {} but no vertex buffer is bound there",
                    attribute.location, attribute.binding
                );
                return Err(Error::MissingVertexBuffer {
                    location: attribute.location,
                    binding: attribute.binding,
                });
            };

            if !bound.buffer.is_realized() {
                prism_trace!(LOG_SOURCE, "Realizing vertex buffer at binding {} at draw time", attribute.binding);
                bound.buffer.initialize_resource()?;
                self.stats.lazy_realizations += 1;
            }
            let Some(handle) = bound.buffer.native_handle() else {
                return Err(Error::ResourceNotRealized(format!(
                    "vertex buffer at binding {}",
                    attribute.binding
                )));
            };

            // Present by construction: Pipeline::new rejects undeclared bindings
            let (stride, input_rate) = pipeline
                .buffer_layout(attribute.binding)
                .map(|layout| (layout.stride, layout.input_rate))
                .unwrap_or((0, VertexInputRate::Vertex));

            let Some(offset) = bound.offset.checked_add(attribute.offset as u64) else {
                prism_error!(
                    LOG_SOURCE,
                    "Attribute at location {}: offset {} + binding offset {} overflows",
                    attribute.location, attribute.offset, bound.offset
                );
                return Err(Error::InvalidResource(format!(
                    "vertex attribute {} offset overflows",
                    attribute.location
                )));
            };

            self.backend.bind_buffer(BufferTarget::Array, handle)?;
            self.backend.vertex_attribute_pointer(
                attribute.location,
                attribute.format,
                stride,
                input_rate,
                offset,
            )?;
        }
        Ok(())
    }

    /// Step 8
    fn issue_draw(&mut self, pipeline: &Pipeline, draw_call: &DrawCall) -> Result<()> {
        match draw_call {
            DrawCall::Draw { vertex_count, first_vertex } => {
                self.backend.draw_arrays(pipeline.topology(), *first_vertex, *vertex_count)?;
            }
            DrawCall::DrawIndexed { index_count } => {
                let Some(index) = &self.index_buffer else {
                    prism_error!(LOG_SOURCE, "'{}': indexed draw with no index buffer bound", self.config.label);
                    return Err(Error::MissingIndexBuffer);
                };
                if !index.buffer.is_realized() {
                    index.buffer.initialize_resource()?;
                    self.stats.lazy_realizations += 1;
                }
                let Some(handle) = index.buffer.native_handle() else {
                    return Err(Error::ResourceNotRealized("index buffer".to_string()));
                };

                self.backend.bind_buffer(BufferTarget::ElementArray, handle)?;
                self.backend.draw_elements(pipeline.topology(), *index_count, index.format, index.offset)?;
            }
            DrawCall::DrawIndexedIndirect { draw_count, .. } => {
                prism_trace!(LOG_SOURCE, "Ignoring indirect draw ({} draws)", draw_count);
                self.stats.ignored_indirect_draws += 1;
                return Ok(());
            }
        }
        self.stats.draws += 1;
        Ok(())
    }
}

/// Absolute byte offset of a standalone uniform read of `len` bytes
///
/// The read must fit inside the bound range `[offset, offset + size)`.
fn uniform_read_offset(bound: &BoundUniformBuffer, name: &str, offset: u32, len: usize) -> Result<u64> {
    let start = offset as u64;
    let in_range = start
        .checked_add(len as u64)
        .is_some_and(|end| end <= bound.size);
    let absolute = bound.offset.checked_add(start).filter(|_| in_range);

    absolute.ok_or_else(|| {
        prism_error!(
            LOG_SOURCE,
            "Uniform '{}' reads {} bytes at {} past the bound range (offset {}, size {})",
            name, len, offset, bound.offset, bound.size
        );
        Error::InvalidResource(format!("uniform '{}' outside bound range", name))
    })
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
