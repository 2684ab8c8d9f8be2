/// Mock backend, device layer and bindable objects for unit tests (no GPU required)
///
/// `MockBackend` records every call into a shared trace so tests can assert
/// the exact sequence a flush produced. `MockDevice` counts native object
/// creation and destruction.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use crate::backend::{Backend, BufferTarget, Capability};
use crate::error::{Error, Result};
use crate::pipeline::{
    BlendFactor, BlendOp, CullFace, FrontFace, IndexFormat, NativePipeline, PipelineDesc,
    PrimitiveTopology, Program, ProgramReflection, StandaloneUniform, UniformType,
    VertexAttribute, VertexBufferLayout, VertexFormat, VertexInputRate, VertexInputState,
};
use crate::resource::{
    Buffer, BufferDescriptor, DeviceLayer, ImageDescriptor, NativeHandle, Sampler, Texture,
};

// ============================================================================
// Mock Backend
// ============================================================================

/// One recorded backend call
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    BindPipeline(NativePipeline),
    SetCapability(Capability, bool),
    BlendFunc(BlendFactor, BlendFactor),
    BlendFuncSeparate(BlendFactor, BlendFactor, BlendFactor, BlendFactor),
    BlendEquation(BlendOp),
    BlendEquationSeparate(BlendOp, BlendOp),
    CullFace(CullFace),
    FrontFace(FrontFace),
    UniformFloat { location: u32, components: u32, count: u32, data: Vec<f32> },
    UniformInt { location: u32, components: u32, count: u32, data: Vec<i32> },
    UniformMatrix { location: u32, dimension: u32, count: u32, data: Vec<f32> },
    BindTexture { unit: u32, texture: NativeHandle, sampler: Option<NativeHandle> },
    EnableVertexAttribute(u32),
    DisableVertexAttribute(u32),
    BindBuffer(BufferTarget, NativeHandle),
    VertexAttributePointer {
        location: u32,
        format: VertexFormat,
        stride: u32,
        input_rate: VertexInputRate,
        offset: u64,
    },
    DrawArrays { topology: PrimitiveTopology, first: u32, count: u32 },
    DrawElements { topology: PrimitiveTopology, count: u32, format: IndexFormat, offset: u64 },
}

pub type CallTrace = Arc<Mutex<Vec<BackendCall>>>;

pub struct MockBackend {
    calls: CallTrace,
    /// When set, draw calls fail with this error
    fail_draws: Option<Error>,
}

impl MockBackend {
    /// Create a backend and the trace it records into
    pub fn new() -> (Self, CallTrace) {
        let calls: CallTrace = Arc::new(Mutex::new(Vec::new()));
        (Self { calls: calls.clone(), fail_draws: None }, calls)
    }

    /// Backend whose draw calls fail
    pub fn failing_draws(error: Error) -> (Self, CallTrace) {
        let (mut backend, calls) = Self::new();
        backend.fail_draws = Some(error);
        (backend, calls)
    }

    fn record(&mut self, call: BackendCall) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

impl Backend for MockBackend {
    fn bind_pipeline(&mut self, pipeline: &NativePipeline) -> Result<()> {
        self.record(BackendCall::BindPipeline(*pipeline))
    }

    fn set_capability(&mut self, capability: Capability, enabled: bool) -> Result<()> {
        self.record(BackendCall::SetCapability(capability, enabled))
    }

    fn blend_func(&mut self, src: BlendFactor, dst: BlendFactor) -> Result<()> {
        self.record(BackendCall::BlendFunc(src, dst))
    }

    fn blend_func_separate(
        &mut self,
        src_color: BlendFactor,
        dst_color: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    ) -> Result<()> {
        self.record(BackendCall::BlendFuncSeparate(src_color, dst_color, src_alpha, dst_alpha))
    }

    fn blend_equation(&mut self, op: BlendOp) -> Result<()> {
        self.record(BackendCall::BlendEquation(op))
    }

    fn blend_equation_separate(&mut self, color_op: BlendOp, alpha_op: BlendOp) -> Result<()> {
        self.record(BackendCall::BlendEquationSeparate(color_op, alpha_op))
    }

    fn cull_face(&mut self, face: CullFace) -> Result<()> {
        self.record(BackendCall::CullFace(face))
    }

    fn front_face(&mut self, face: FrontFace) -> Result<()> {
        self.record(BackendCall::FrontFace(face))
    }

    fn uniform_float(&mut self, location: u32, components: u32, count: u32, data: &[f32]) -> Result<()> {
        self.record(BackendCall::UniformFloat { location, components, count, data: data.to_vec() })
    }

    fn uniform_int(&mut self, location: u32, components: u32, count: u32, data: &[i32]) -> Result<()> {
        self.record(BackendCall::UniformInt { location, components, count, data: data.to_vec() })
    }

    fn uniform_matrix(&mut self, location: u32, dimension: u32, count: u32, data: &[f32]) -> Result<()> {
        self.record(BackendCall::UniformMatrix { location, dimension, count, data: data.to_vec() })
    }

    fn bind_texture(&mut self, unit: u32, texture: NativeHandle, sampler: Option<NativeHandle>) -> Result<()> {
        self.record(BackendCall::BindTexture { unit, texture, sampler })
    }

    fn enable_vertex_attribute(&mut self, location: u32) -> Result<()> {
        self.record(BackendCall::EnableVertexAttribute(location))
    }

    fn disable_vertex_attribute(&mut self, location: u32) -> Result<()> {
        self.record(BackendCall::DisableVertexAttribute(location))
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: NativeHandle) -> Result<()> {
        self.record(BackendCall::BindBuffer(target, buffer))
    }

    fn vertex_attribute_pointer(
        &mut self,
        location: u32,
        format: VertexFormat,
        stride: u32,
        input_rate: VertexInputRate,
        offset: u64,
    ) -> Result<()> {
        self.record(BackendCall::VertexAttributePointer { location, format, stride, input_rate, offset })
    }

    fn draw_arrays(&mut self, topology: PrimitiveTopology, first: u32, count: u32) -> Result<()> {
        if let Some(err) = &self.fail_draws {
            return Err(err.clone());
        }
        self.record(BackendCall::DrawArrays { topology, first, count })
    }

    fn draw_elements(
        &mut self,
        topology: PrimitiveTopology,
        count: u32,
        format: IndexFormat,
        offset: u64,
    ) -> Result<()> {
        if let Some(err) = &self.fail_draws {
            return Err(err.clone());
        }
        self.record(BackendCall::DrawElements { topology, count, format, offset })
    }
}

// ============================================================================
// Mock Device Layer
// ============================================================================

/// Fake device memory block
#[derive(Debug)]
pub struct MockMemory {
    pub size: u64,
}

pub struct MockDevice {
    next_id: AtomicU64,
    pub images_created: AtomicUsize,
    pub images_destroyed: AtomicUsize,
    pub buffers_created: AtomicUsize,
    pub buffers_destroyed: AtomicUsize,
    /// Ids passed to destroy_* in call order
    pub destroyed_ids: Mutex<Vec<u64>>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            images_created: AtomicUsize::new(0),
            images_destroyed: AtomicUsize::new(0),
            buffers_created: AtomicUsize::new(0),
            buffers_destroyed: AtomicUsize::new(0),
            destroyed_ids: Mutex::new(Vec::new()),
        }
    }

    pub fn images_destroyed(&self) -> usize {
        self.images_destroyed.load(Ordering::SeqCst)
    }

    pub fn buffers_destroyed(&self) -> usize {
        self.buffers_destroyed.load(Ordering::SeqCst)
    }
}

impl DeviceLayer for MockDevice {
    type Image = u64;
    type Buffer = u64;
    type Memory = MockMemory;

    fn create_image(&self, desc: &ImageDescriptor) -> Result<(u64, MockMemory)> {
        if desc.extent.width == 0 || desc.extent.height == 0 {
            return Err(Error::InvalidResource("zero-sized image".to_string()));
        }
        self.images_created.fetch_add(1, Ordering::SeqCst);
        let size = desc.extent.width as u64 * desc.extent.height as u64 * desc.format.texel_size() as u64;
        Ok((self.next_id.fetch_add(1, Ordering::SeqCst), MockMemory { size }))
    }

    fn destroy_image(&self, image: u64, _memory: MockMemory) {
        self.images_destroyed.fetch_add(1, Ordering::SeqCst);
        self.destroyed_ids.lock().unwrap().push(image);
    }

    fn create_buffer(&self, desc: &BufferDescriptor) -> Result<(u64, MockMemory)> {
        if desc.size == 0 {
            return Err(Error::InvalidResource("zero-sized buffer".to_string()));
        }
        self.buffers_created.fetch_add(1, Ordering::SeqCst);
        Ok((self.next_id.fetch_add(1, Ordering::SeqCst), MockMemory { size: desc.size }))
    }

    fn destroy_buffer(&self, buffer: u64, _memory: MockMemory) {
        self.buffers_destroyed.fetch_add(1, Ordering::SeqCst);
        self.destroyed_ids.lock().unwrap().push(buffer);
    }
}

// ============================================================================
// Mock Texture / Sampler / Buffer
// ============================================================================

pub struct MockTexture {
    id: u64,
    native: Mutex<Option<NativeHandle>>,
    pub init_count: AtomicUsize,
    pub prepare_count: AtomicUsize,
}

impl MockTexture {
    /// Texture that is not realized until first drawn
    pub fn lazy(id: u64) -> Arc<Self> {
        Arc::new(Self {
            id,
            native: Mutex::new(None),
            init_count: AtomicUsize::new(0),
            prepare_count: AtomicUsize::new(0),
        })
    }

    /// Texture whose native object already exists
    pub fn realized(id: u64) -> Arc<Self> {
        let texture = Self::lazy(id);
        *texture.native.lock().unwrap() = Some(NativeHandle(id));
        texture
    }
}

impl Texture for MockTexture {
    fn native_handle(&self) -> Option<NativeHandle> {
        *self.native.lock().unwrap()
    }

    fn initialize_resource(&self) -> Result<()> {
        let mut native = self.native.lock().unwrap();
        if native.is_none() {
            self.init_count.fetch_add(1, Ordering::SeqCst);
            *native = Some(NativeHandle(self.id));
        }
        Ok(())
    }

    fn prepare(&self) -> Result<()> {
        self.prepare_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct MockSampler(pub u64);

impl Sampler for MockSampler {
    fn native_handle(&self) -> NativeHandle {
        NativeHandle(self.0)
    }
}

pub struct MockBuffer {
    id: u64,
    native: Mutex<Option<NativeHandle>>,
    data: Mutex<Vec<u8>>,
    pub init_count: AtomicUsize,
}

impl MockBuffer {
    /// Buffer that is not realized until first drawn
    pub fn lazy(id: u64, data: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            id,
            native: Mutex::new(None),
            data: Mutex::new(data),
            init_count: AtomicUsize::new(0),
        })
    }

    /// Realized buffer holding `data`
    pub fn realized(id: u64, data: Vec<u8>) -> Arc<Self> {
        let buffer = Self::lazy(id, data);
        *buffer.native.lock().unwrap() = Some(NativeHandle(id));
        buffer
    }

    /// Realized buffer of `size` zero bytes
    pub fn zeroed(id: u64, size: usize) -> Arc<Self> {
        Self::realized(id, vec![0; size])
    }
}

impl Buffer for MockBuffer {
    fn native_handle(&self) -> Option<NativeHandle> {
        *self.native.lock().unwrap()
    }

    fn initialize_resource(&self) -> Result<()> {
        let mut native = self.native.lock().unwrap();
        if native.is_none() {
            self.init_count.fetch_add(1, Ordering::SeqCst);
            *native = Some(NativeHandle(self.id));
        }
        Ok(())
    }

    fn size(&self) -> u64 {
        self.data.lock().unwrap().len() as u64
    }

    fn read_host_memory(&self, offset: u64, dst: &mut [u8]) -> Result<()> {
        let data = self.data.lock().unwrap();
        let start = offset as usize;
        let end = start + dst.len();
        if end > data.len() {
            return Err(Error::InvalidResource(format!(
                "read of {} bytes at {} past end of {}-byte buffer",
                dst.len(), offset, data.len()
            )));
        }
        dst.copy_from_slice(&data[start..end]);
        Ok(())
    }
}

// ============================================================================
// Pipeline helpers
// ============================================================================

pub fn native_pipeline(id: u64) -> NativePipeline {
    NativePipeline {
        pipeline: NativeHandle(id),
        layout: NativeHandle(id + 1000),
    }
}

pub fn program(uniforms: Vec<StandaloneUniform>) -> Arc<Program> {
    Arc::new(Program::new(
        "mock_program",
        NativeHandle(77),
        ProgramReflection { standalone_uniforms: uniforms },
    ))
}

pub fn uniform(name: &str, ty: UniformType, offset: u32, array_size: u32, location: u32) -> StandaloneUniform {
    StandaloneUniform {
        name: name.to_string(),
        ty,
        offset,
        array_size,
        location,
    }
}

/// One binding (0, stride 12) feeding one vec3 attribute at location 0
pub fn position_only_input() -> VertexInputState {
    VertexInputState {
        buffer_layouts: vec![VertexBufferLayout {
            binding: 0,
            stride: 12,
            input_rate: VertexInputRate::Vertex,
        }],
        attributes: vec![VertexAttribute {
            location: 0,
            binding: 0,
            format: VertexFormat::R32G32B32_SFLOAT,
            offset: 0,
        }],
    }
}

/// Pipeline with no blend/raster descriptors and no vertex input
pub fn pipeline_desc(label: &str, id: u64) -> PipelineDesc {
    PipelineDesc {
        label: label.to_string(),
        native: native_pipeline(id),
        program: program(Vec::new()),
        color_blend: None,
        rasterization: None,
        vertex_input: VertexInputState::default(),
        topology: PrimitiveTopology::TriangleList,
    }
}
