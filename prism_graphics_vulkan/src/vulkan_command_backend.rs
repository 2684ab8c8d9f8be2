/// VulkanCommandBackend - records resolved draw state into a VkCommandBuffer
///
/// Implements `Backend` on top of dynamic state: blending through
/// VK_EXT_extended_dynamic_state3, vertex input through
/// VK_EXT_vertex_input_dynamic_state, textures through push descriptors
/// (set 0, binding = texture unit) and uniforms through push constants
/// (offset = uniform location).
///
/// Culling and winding go through core Vulkan 1.3 dynamic state
/// (cmd_set_cull_mode, cmd_set_front_face).
///
/// Vertex attributes are accumulated and emitted at draw time, each
/// attribute sourcing its own vertex binding (binding = location) so that
/// per-attribute buffers, offsets and input rates map directly.

use ash::vk;
use prism_graphics::prism::backend::{BufferTarget, Capability};
use prism_graphics::prism::pipeline::{
    BlendFactor, BlendOp, CullFace, FrontFace, IndexFormat, NativePipeline, PrimitiveTopology,
    VertexFormat, VertexInputRate,
};
use prism_graphics::prism::resource::NativeHandle;
use prism_graphics::prism::{Backend, Error, Result};
use prism_graphics::{prism_error, prism_trace};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::vulkan_device::DeviceExtensions;
use crate::vulkan_format::{
    blend_factor_to_vk, blend_op_to_vk, cull_face_to_vk, front_face_to_vk, index_format_to_vk,
    input_rate_to_vk, topology_to_vk, vertex_format_to_vk,
};

const LOG_SOURCE: &str = "prism::vulkan::CommandBackend";

fn to_vk<H: vk::Handle>(handle: NativeHandle) -> H {
    H::from_raw(handle.0)
}

// ===== BLEND STATE =====

/// Color blend equation of attachment 0, rebuilt call by call
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct BlendTracker {
    pub(crate) src_color: BlendFactor,
    pub(crate) dst_color: BlendFactor,
    pub(crate) color_op: BlendOp,
    pub(crate) src_alpha: BlendFactor,
    pub(crate) dst_alpha: BlendFactor,
    pub(crate) alpha_op: BlendOp,
}

impl Default for BlendTracker {
    fn default() -> Self {
        Self {
            src_color: BlendFactor::One,
            dst_color: BlendFactor::Zero,
            color_op: BlendOp::Add,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::Zero,
            alpha_op: BlendOp::Add,
        }
    }
}

impl BlendTracker {
    pub(crate) fn equation(&self) -> vk::ColorBlendEquationEXT {
        vk::ColorBlendEquationEXT {
            src_color_blend_factor: blend_factor_to_vk(self.src_color),
            dst_color_blend_factor: blend_factor_to_vk(self.dst_color),
            color_blend_op: blend_op_to_vk(self.color_op),
            src_alpha_blend_factor: blend_factor_to_vk(self.src_alpha),
            dst_alpha_blend_factor: blend_factor_to_vk(self.dst_alpha),
            alpha_blend_op: blend_op_to_vk(self.alpha_op),
        }
    }
}

// ===== VERTEX INPUT =====

#[derive(Debug, Clone, Copy, PartialEq)]
struct AttributeSource {
    buffer: vk::Buffer,
    format: VertexFormat,
    stride: u32,
    input_rate: VertexInputRate,
    offset: u64,
}

/// Enabled attributes and the buffer each one reads
#[derive(Debug, Default)]
pub(crate) struct VertexInputTracker {
    enabled: FxHashSet<u32>,
    sources: FxHashMap<u32, AttributeSource>,
    array_buffer: Option<vk::Buffer>,
}

/// Vertex input ready to record: descriptions plus one buffer per binding
pub(crate) struct VertexInput {
    pub(crate) bindings: Vec<vk::VertexInputBindingDescription2EXT<'static>>,
    pub(crate) attributes: Vec<vk::VertexInputAttributeDescription2EXT<'static>>,
    pub(crate) buffers: Vec<(u32, vk::Buffer, u64)>,
}

impl VertexInputTracker {
    pub(crate) fn enable(&mut self, location: u32) {
        self.enabled.insert(location);
    }

    pub(crate) fn disable(&mut self, location: u32) {
        self.enabled.remove(&location);
        self.sources.remove(&location);
    }

    pub(crate) fn bind_array_buffer(&mut self, buffer: vk::Buffer) {
        self.array_buffer = Some(buffer);
    }

    pub(crate) fn set_pointer(
        &mut self,
        location: u32,
        format: VertexFormat,
        stride: u32,
        input_rate: VertexInputRate,
        offset: u64,
    ) -> Result<()> {
        let Some(buffer) = self.array_buffer else {
            return Err(backend_error(format!(
                "Attribute {} configured with no array buffer bound", location
            )));
        };
        self.sources.insert(location, AttributeSource { buffer, format, stride, input_rate, offset });
        Ok(())
    }

    /// Enabled and configured attributes, in location order
    ///
    /// The attribute offset is folded into the buffer binding offset.
    pub(crate) fn build(&self) -> VertexInput {
        let mut locations: Vec<u32> = self
            .enabled
            .iter()
            .copied()
            .filter(|location| self.sources.contains_key(location))
            .collect();
        locations.sort_unstable();

        let mut input = VertexInput {
            bindings: Vec::with_capacity(locations.len()),
            attributes: Vec::with_capacity(locations.len()),
            buffers: Vec::with_capacity(locations.len()),
        };
        for location in locations {
            let Some(source) = self.sources.get(&location) else {
                continue;
            };
            input.bindings.push(
                vk::VertexInputBindingDescription2EXT::default()
                    .binding(location)
                    .stride(source.stride)
                    .input_rate(input_rate_to_vk(source.input_rate))
                    .divisor(1),
            );
            input.attributes.push(
                vk::VertexInputAttributeDescription2EXT::default()
                    .location(location)
                    .binding(location)
                    .format(vertex_format_to_vk(source.format))
                    .offset(0),
            );
            input.buffers.push((location, source.buffer, source.offset));
        }
        input
    }
}

fn backend_error(message: String) -> Error {
    prism_error!(LOG_SOURCE, "{}", message);
    Error::BackendError(message)
}

// ===== BACKEND =====

pub struct VulkanCommandBackend {
    device: ash::Device,
    extensions: DeviceExtensions,
    command_buffer: vk::CommandBuffer,
    default_sampler: vk::Sampler,
    push_constant_stages: vk::ShaderStageFlags,

    layout: vk::PipelineLayout,
    blend: BlendTracker,
    cull_enabled: bool,
    cull_face: CullFace,
    vertex_input: VertexInputTracker,
    element_buffer: Option<vk::Buffer>,
}

impl VulkanCommandBackend {
    pub(crate) fn new(
        device: ash::Device,
        extensions: DeviceExtensions,
        command_buffer: vk::CommandBuffer,
        default_sampler: vk::Sampler,
    ) -> Self {
        Self {
            device,
            extensions,
            command_buffer,
            default_sampler,
            push_constant_stages: vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            layout: vk::PipelineLayout::null(),
            blend: BlendTracker::default(),
            cull_enabled: false,
            cull_face: CullFace::Back,
            vertex_input: VertexInputTracker::default(),
            element_buffer: None,
        }
    }

    /// Stages of the push-constant range every bound layout declares
    pub fn with_push_constant_stages(mut self, stages: vk::ShaderStageFlags) -> Self {
        self.push_constant_stages = stages;
        self
    }

    /// Command buffer being recorded
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    fn require_layout(&self) -> Result<vk::PipelineLayout> {
        if self.layout == vk::PipelineLayout::null() {
            return Err(backend_error("No pipeline layout bound".to_string()));
        }
        Ok(self.layout)
    }

    fn push_constants(&mut self, location: u32, bytes: &[u8]) -> Result<()> {
        let layout = self.require_layout()?;
        unsafe {
            self.device.cmd_push_constants(self.command_buffer, layout, self.push_constant_stages, location, bytes);
        }
        Ok(())
    }

    fn record_blend_equation(&self) {
        unsafe {
            self.extensions
                .dynamic_state3
                .cmd_set_color_blend_equation(self.command_buffer, 0, &[self.blend.equation()]);
        }
    }

    fn record_vertex_input(&self) {
        let input = self.vertex_input.build();
        unsafe {
            self.extensions
                .vertex_input
                .cmd_set_vertex_input(self.command_buffer, &input.bindings, &input.attributes);
            for (binding, buffer, offset) in input.buffers {
                self.device.cmd_bind_vertex_buffers(self.command_buffer, binding, &[buffer], &[offset]);
            }
        }
    }
}

impl Backend for VulkanCommandBackend {
    fn bind_pipeline(&mut self, pipeline: &NativePipeline) -> Result<()> {
        self.layout = to_vk(pipeline.layout);
        unsafe {
            self.device.cmd_bind_pipeline(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                to_vk(pipeline.pipeline),
            );
        }
        Ok(())
    }

    fn set_capability(&mut self, capability: Capability, enabled: bool) -> Result<()> {
        match capability {
            Capability::Blend => {
                unsafe {
                    self.extensions.dynamic_state3.cmd_set_color_blend_enable(
                        self.command_buffer,
                        0,
                        &[if enabled { vk::TRUE } else { vk::FALSE }],
                    );
                }
            }
            Capability::CullFace => {
                self.cull_enabled = enabled;
                let mode = if enabled { cull_face_to_vk(self.cull_face) } else { vk::CullModeFlags::NONE };
                unsafe {
                    self.device.cmd_set_cull_mode(self.command_buffer, mode);
                }
            }
        }
        Ok(())
    }

    fn blend_func(&mut self, src: BlendFactor, dst: BlendFactor) -> Result<()> {
        self.blend_func_separate(src, dst, src, dst)
    }

    fn blend_func_separate(
        &mut self,
        src_color: BlendFactor,
        dst_color: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    ) -> Result<()> {
        self.blend.src_color = src_color;
        self.blend.dst_color = dst_color;
        self.blend.src_alpha = src_alpha;
        self.blend.dst_alpha = dst_alpha;
        self.record_blend_equation();
        Ok(())
    }

    fn blend_equation(&mut self, op: BlendOp) -> Result<()> {
        self.blend_equation_separate(op, op)
    }

    fn blend_equation_separate(&mut self, color_op: BlendOp, alpha_op: BlendOp) -> Result<()> {
        self.blend.color_op = color_op;
        self.blend.alpha_op = alpha_op;
        self.record_blend_equation();
        Ok(())
    }

    fn cull_face(&mut self, face: CullFace) -> Result<()> {
        self.cull_face = face;
        if self.cull_enabled {
            unsafe {
                self.device.cmd_set_cull_mode(self.command_buffer, cull_face_to_vk(face));
            }
        }
        Ok(())
    }

    fn front_face(&mut self, face: FrontFace) -> Result<()> {
        unsafe {
            self.device.cmd_set_front_face(self.command_buffer, front_face_to_vk(face));
        }
        Ok(())
    }

    fn uniform_float(&mut self, location: u32, _components: u32, _count: u32, data: &[f32]) -> Result<()> {
        self.push_constants(location, bytemuck::cast_slice(data))
    }

    fn uniform_int(&mut self, location: u32, _components: u32, _count: u32, data: &[i32]) -> Result<()> {
        self.push_constants(location, bytemuck::cast_slice(data))
    }

    fn uniform_matrix(&mut self, location: u32, _dimension: u32, _count: u32, data: &[f32]) -> Result<()> {
        // Column-major on both sides
        self.push_constants(location, bytemuck::cast_slice(data))
    }

    fn bind_texture(&mut self, unit: u32, texture: NativeHandle, sampler: Option<NativeHandle>) -> Result<()> {
        let layout = self.require_layout()?;
        let image_info = [vk::DescriptorImageInfo::default()
            .sampler(sampler.map(to_vk).unwrap_or(self.default_sampler))
            .image_view(to_vk(texture))
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)];

        let write = vk::WriteDescriptorSet::default()
            .dst_binding(unit)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(&image_info);

        unsafe {
            self.extensions.push_descriptor.cmd_push_descriptor_set(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                &[write],
            );
        }
        Ok(())
    }

    fn enable_vertex_attribute(&mut self, location: u32) -> Result<()> {
        self.vertex_input.enable(location);
        Ok(())
    }

    fn disable_vertex_attribute(&mut self, location: u32) -> Result<()> {
        self.vertex_input.disable(location);
        Ok(())
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: NativeHandle) -> Result<()> {
        match target {
            BufferTarget::Array => self.vertex_input.bind_array_buffer(to_vk(buffer)),
            BufferTarget::ElementArray => self.element_buffer = Some(to_vk(buffer)),
        }
        Ok(())
    }

    fn vertex_attribute_pointer(
        &mut self,
        location: u32,
        format: VertexFormat,
        stride: u32,
        input_rate: VertexInputRate,
        offset: u64,
    ) -> Result<()> {
        self.vertex_input.set_pointer(location, format, stride, input_rate, offset)
    }

    fn draw_arrays(&mut self, topology: PrimitiveTopology, first: u32, count: u32) -> Result<()> {
        self.record_vertex_input();
        unsafe {
            self.device.cmd_set_primitive_topology(self.command_buffer, topology_to_vk(topology));
            self.device.cmd_draw(self.command_buffer, count, 1, first, 0);
        }
        prism_trace!(LOG_SOURCE, "draw {:?} first={} count={}", topology, first, count);
        Ok(())
    }

    fn draw_elements(
        &mut self,
        topology: PrimitiveTopology,
        count: u32,
        format: IndexFormat,
        offset: u64,
    ) -> Result<()> {
        let Some(element_buffer) = self.element_buffer else {
            return Err(backend_error("Indexed draw with no element buffer bound".to_string()));
        };

        self.record_vertex_input();
        unsafe {
            self.device.cmd_bind_index_buffer(self.command_buffer, element_buffer, offset, index_format_to_vk(format));
            self.device.cmd_set_primitive_topology(self.command_buffer, topology_to_vk(topology));
            self.device.cmd_draw_indexed(self.command_buffer, count, 1, 0, 0, 0);
        }
        prism_trace!(LOG_SOURCE, "draw_indexed {:?} count={} {:?}", topology, count, format);
        Ok(())
    }
}
