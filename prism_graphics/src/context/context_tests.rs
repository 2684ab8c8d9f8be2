//! Unit tests for context.rs
//!
//! Every test drives a Context over a MockBackend and asserts on the
//! recorded call trace.

use super::*;
use crate::context::{
    DrawCall, IndexBufferBinding, TextureBinding, UniformBufferBinding, VertexBufferBinding,
};
use crate::mock::{self, BackendCall, CallTrace, MockBackend, MockBuffer, MockSampler, MockTexture};
use crate::pipeline::{
    BlendFactor, BlendOp, ColorBlendState, CullFace, CullMode, FrontFace, IndexFormat,
    PrimitiveTopology, RasterizationState, UniformType, VertexAttribute, VertexBufferLayout,
    VertexFormat, VertexInputRate, VertexInputState,
};
use crate::resource::{Buffer, NativeHandle};
use std::sync::atomic::Ordering;

// ============================================================================
// Helpers
// ============================================================================

fn setup() -> (Context, CallTrace) {
    let (backend, calls) = MockBackend::new();
    (Context::new(Box::new(backend), ContextConfig::default()), calls)
}

fn take_calls(calls: &CallTrace) -> Vec<BackendCall> {
    std::mem::take(&mut *calls.lock().unwrap())
}

fn draw3() -> DrawCall {
    DrawCall::Draw { vertex_count: 3, first_vertex: 0 }
}

fn vbo(binding: u32, buffer: &Arc<MockBuffer>, offset: u64) -> VertexBufferBinding {
    VertexBufferBinding {
        binding,
        buffer: Some(buffer.clone() as Arc<dyn Buffer>),
        offset,
    }
}

fn vbo_buffer_id(ctx: &Context, binding: u32) -> Option<NativeHandle> {
    ctx.vertex_buffers()
        .get(binding)
        .and_then(|bound| bound.buffer.native_handle())
}

fn bind_simple_pipeline(ctx: &mut Context) -> PipelineKey {
    let key = ctx.create_pipeline(mock::pipeline_desc("simple", 1)).unwrap();
    ctx.bind_pipeline(key).unwrap();
    key
}

fn f32_bytes(values: &[f32]) -> Vec<u8> {
    bytemuck::cast_slice::<f32, u8>(values).to_vec()
}

// ============================================================================
// Pipeline selection
// ============================================================================

#[test]
fn test_flush_without_pipeline_fails() {
    let (mut ctx, calls) = setup();
    assert_eq!(ctx.flush(false, &draw3()), Err(Error::NoPipelineBound));
    assert!(take_calls(&calls).is_empty());
    assert_eq!(ctx.stats().flushes, 0);
}

#[test]
fn test_bind_pipeline_is_deferred_until_flush() {
    let (mut ctx, calls) = setup();
    let key = bind_simple_pipeline(&mut ctx);

    assert_eq!(ctx.pending_pipeline(), Some(key));
    assert_eq!(ctx.current_pipeline(), None);
    assert!(take_calls(&calls).is_empty());

    ctx.flush(false, &draw3()).unwrap();
    assert_eq!(ctx.pending_pipeline(), None);
    assert_eq!(ctx.current_pipeline(), Some(key));
}

#[test]
fn test_second_flush_reuses_current_pipeline() {
    let (mut ctx, calls) = setup();
    let key = bind_simple_pipeline(&mut ctx);

    ctx.flush(false, &draw3()).unwrap();
    ctx.flush(false, &draw3()).unwrap();

    assert_eq!(ctx.current_pipeline(), Some(key));
    assert_eq!(ctx.pending_pipeline(), None);
    assert_eq!(ctx.stats().pipeline_switches, 1);
    assert_eq!(ctx.stats().flushes, 2);

    let binds = take_calls(&calls)
        .into_iter()
        .filter(|c| matches!(c, BackendCall::BindPipeline(_)))
        .count();
    assert_eq!(binds, 2);
}

#[test]
fn test_bind_unknown_pipeline_fails() {
    let (mut ctx, _calls) = setup();
    let key = ctx.create_pipeline(mock::pipeline_desc("gone", 1)).unwrap();
    ctx.destroy_pipeline(key).unwrap();

    assert_eq!(ctx.bind_pipeline(key), Err(Error::PipelineNotFound));
    assert_eq!(ctx.destroy_pipeline(key), Err(Error::PipelineNotFound));
}

#[test]
fn test_destroying_current_pipeline_keeps_it_usable() {
    let (mut ctx, calls) = setup();
    let key = bind_simple_pipeline(&mut ctx);
    ctx.flush(false, &draw3()).unwrap();

    ctx.destroy_pipeline(key).unwrap();
    take_calls(&calls);

    ctx.flush(false, &draw3()).unwrap();
    assert_eq!(take_calls(&calls)[0], BackendCall::BindPipeline(mock::native_pipeline(1)));
}

#[test]
fn test_destroying_pending_pipeline_clears_pending() {
    let (mut ctx, _calls) = setup();
    let key = bind_simple_pipeline(&mut ctx);
    ctx.destroy_pipeline(key).unwrap();

    assert_eq!(ctx.pending_pipeline(), None);
    assert_eq!(ctx.flush(false, &draw3()), Err(Error::NoPipelineBound));
}

#[test]
fn test_switching_pipelines_binds_new_native_object() {
    let (mut ctx, calls) = setup();
    let a = ctx.create_pipeline(mock::pipeline_desc("a", 10)).unwrap();
    let b = ctx.create_pipeline(mock::pipeline_desc("b", 20)).unwrap();

    ctx.bind_pipeline(a).unwrap();
    ctx.flush(false, &draw3()).unwrap();
    ctx.bind_pipeline(b).unwrap();
    ctx.flush(false, &draw3()).unwrap();

    let binds: Vec<BackendCall> = take_calls(&calls)
        .into_iter()
        .filter(|c| matches!(c, BackendCall::BindPipeline(_)))
        .collect();
    assert_eq!(
        binds,
        vec![
            BackendCall::BindPipeline(mock::native_pipeline(10)),
            BackendCall::BindPipeline(mock::native_pipeline(20)),
        ]
    );
}

// ============================================================================
// Blend and rasterization
// ============================================================================

fn flush_with_blend(blend: Option<ColorBlendState>) -> Vec<BackendCall> {
    let (mut ctx, calls) = setup();
    let mut desc = mock::pipeline_desc("blend", 1);
    desc.color_blend = blend;
    let key = ctx.create_pipeline(desc).unwrap();
    ctx.bind_pipeline(key).unwrap();
    ctx.flush(false, &draw3()).unwrap();
    take_calls(&calls)
}

#[test]
fn test_equal_factors_use_combined_blend_func() {
    let calls = flush_with_blend(Some(ColorBlendState::alpha_blending()));
    assert_eq!(
        &calls[1..4],
        &[
            BackendCall::SetCapability(Capability::Blend, true),
            BackendCall::BlendFunc(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha),
            BackendCall::BlendEquation(BlendOp::Add),
        ]
    );
}

#[test]
fn test_unequal_factors_use_separate_blend_func() {
    let mut blend = ColorBlendState::alpha_blending();
    blend.src_alpha_factor = BlendFactor::One;
    blend.dst_alpha_factor = BlendFactor::Zero;
    blend.alpha_blend_op = BlendOp::Max;

    let calls = flush_with_blend(Some(blend));
    assert_eq!(
        &calls[1..4],
        &[
            BackendCall::SetCapability(Capability::Blend, true),
            BackendCall::BlendFuncSeparate(
                BlendFactor::SrcAlpha,
                BlendFactor::OneMinusSrcAlpha,
                BlendFactor::One,
                BlendFactor::Zero,
            ),
            BackendCall::BlendEquationSeparate(BlendOp::Add, BlendOp::Max),
        ]
    );
}

#[test]
fn test_disabled_blend_only_disables_capability() {
    let calls = flush_with_blend(Some(ColorBlendState::default()));
    assert_eq!(calls[1], BackendCall::SetCapability(Capability::Blend, false));
    assert!(!calls.iter().any(|c| matches!(
        c,
        BackendCall::BlendFunc(..) | BackendCall::BlendFuncSeparate(..) | BackendCall::BlendEquation(_)
    )));
}

#[test]
fn test_missing_blend_descriptor_issues_no_blend_calls() {
    let calls = flush_with_blend(None);
    assert!(!calls.iter().any(|c| matches!(c, BackendCall::SetCapability(Capability::Blend, _))));
}

#[test]
fn test_cull_mode_none_disables_culling() {
    let (mut ctx, calls) = setup();
    let mut desc = mock::pipeline_desc("nocull", 1);
    desc.rasterization = Some(RasterizationState {
        cull_mode: CullMode::None,
        front_face: FrontFace::CounterClockwise,
    });
    let key = ctx.create_pipeline(desc).unwrap();
    ctx.bind_pipeline(key).unwrap();
    ctx.flush(false, &draw3()).unwrap();

    let calls = take_calls(&calls);
    assert_eq!(calls[1], BackendCall::SetCapability(Capability::CullFace, false));
    assert_eq!(calls[2], BackendCall::FrontFace(FrontFace::CounterClockwise));
    assert!(!calls.iter().any(|c| matches!(c, BackendCall::CullFace(_))));
}

#[test]
fn test_cull_mode_back_enables_culling_and_sets_face() {
    let (mut ctx, calls) = setup();
    let mut desc = mock::pipeline_desc("cull", 1);
    desc.rasterization = Some(RasterizationState::default());
    let key = ctx.create_pipeline(desc).unwrap();
    ctx.bind_pipeline(key).unwrap();
    ctx.flush(false, &draw3()).unwrap();

    let calls = take_calls(&calls);
    assert_eq!(
        &calls[1..4],
        &[
            BackendCall::SetCapability(Capability::CullFace, true),
            BackendCall::CullFace(CullFace::Back),
            BackendCall::FrontFace(FrontFace::CounterClockwise),
        ]
    );
}

#[test]
fn test_clockwise_winding_reaches_backend() {
    let (mut ctx, calls) = setup();
    let mut desc = mock::pipeline_desc("cw", 1);
    desc.rasterization = Some(RasterizationState {
        cull_mode: CullMode::Front,
        front_face: FrontFace::Clockwise,
    });
    let key = ctx.create_pipeline(desc).unwrap();
    ctx.bind_pipeline(key).unwrap();
    ctx.flush(false, &draw3()).unwrap();

    let calls = take_calls(&calls);
    assert!(calls.contains(&BackendCall::CullFace(CullFace::Front)));
    assert!(calls.contains(&BackendCall::FrontFace(FrontFace::Clockwise)));
}

#[test]
fn test_missing_raster_descriptor_issues_no_winding() {
    let (mut ctx, calls) = setup();
    bind_simple_pipeline(&mut ctx);
    ctx.flush(false, &draw3()).unwrap();
    assert!(!take_calls(&calls).iter().any(|c| matches!(c, BackendCall::FrontFace(_))));
}

// ============================================================================
// Vertex buffer merge semantics
// ============================================================================

#[test]
fn test_vertex_buffer_binds_merge_by_index() {
    let (mut ctx, _calls) = setup();
    let a = MockBuffer::zeroed(100, 64);
    let b = MockBuffer::zeroed(200, 64);
    let c = MockBuffer::zeroed(300, 64);

    ctx.bind_vertex_buffers(&[vbo(0, &a, 0), vbo(2, &b, 0)]).unwrap();
    ctx.bind_vertex_buffers(&[vbo(1, &c, 0)]).unwrap();

    assert_eq!(vbo_buffer_id(&ctx, 0), Some(NativeHandle(100)));
    assert_eq!(vbo_buffer_id(&ctx, 1), Some(NativeHandle(300)));
    assert_eq!(vbo_buffer_id(&ctx, 2), Some(NativeHandle(200)));
}

#[test]
fn test_vertex_buffer_latest_bind_wins() {
    let (mut ctx, _calls) = setup();
    let a = MockBuffer::zeroed(100, 64);
    let b = MockBuffer::zeroed(200, 64);

    ctx.bind_vertex_buffers(&[vbo(0, &a, 0)]).unwrap();
    ctx.bind_vertex_buffers(&[vbo(0, &b, 16)]).unwrap();

    assert_eq!(vbo_buffer_id(&ctx, 0), Some(NativeHandle(200)));
    assert_eq!(ctx.vertex_buffers().get(0).unwrap().offset, 16);
}

#[test]
fn test_vertex_buffer_none_leaves_slot_untouched() {
    let (mut ctx, _calls) = setup();
    let a = MockBuffer::zeroed(100, 64);
    ctx.bind_vertex_buffers(&[vbo(0, &a, 8)]).unwrap();
    ctx.bind_vertex_buffers(&[VertexBufferBinding { binding: 0, buffer: None, offset: 0 }])
        .unwrap();

    assert_eq!(vbo_buffer_id(&ctx, 0), Some(NativeHandle(100)));
    assert_eq!(ctx.vertex_buffers().get(0).unwrap().offset, 8);
}

#[test]
fn test_out_of_range_binding_rejected_without_partial_update() {
    let (mut ctx, _calls) = setup();
    let a = MockBuffer::zeroed(100, 64);

    let result = ctx.bind_vertex_buffers(&[vbo(0, &a, 0), vbo(64, &a, 0)]);
    assert_eq!(
        result,
        Err(Error::BindingIndexOutOfRange { kind: BindingKind::VertexBuffer, index: 64, max: 64 })
    );
    assert!(ctx.vertex_buffers().is_empty());
}

#[test]
fn test_custom_slot_capacity() {
    let (backend, _calls) = MockBackend::new();
    let config = ContextConfig { max_binding_slots: 4, label: "small".to_string() };
    let mut ctx = Context::new(Box::new(backend), config);
    let tex = MockTexture::realized(1);

    let binding = TextureBinding { binding: 4, texture: tex, sampler: None };
    assert!(matches!(
        ctx.bind_textures(&[binding]),
        Err(Error::BindingIndexOutOfRange { kind: BindingKind::Texture, index: 4, max: 4 })
    ));
    assert_eq!(ctx.config().label, "small");
}

// ============================================================================
// Uniform buffers
// ============================================================================

#[test]
fn test_uniform_buffer_none_leaves_slot_untouched() {
    let (mut ctx, _calls) = setup();
    let ubo = MockBuffer::zeroed(500, 256);

    ctx.bind_uniform_buffers(
        &[UniformBufferBinding { binding: 2, buffer: Some(ubo.clone()), offset: 0, size: 256 }],
        None,
    )
    .unwrap();
    ctx.bind_uniform_buffers(
        &[UniformBufferBinding { binding: 2, buffer: None, offset: 64, size: 64 }],
        None,
    )
    .unwrap();

    let bound = ctx.uniform_buffers().get(2).unwrap();
    assert_eq!(bound.buffer.native_handle(), Some(NativeHandle(500)));
    assert_eq!(bound.size, 256);
}

#[test]
fn test_standalone_binding_replaced_only_with_buffer() {
    let (mut ctx, _calls) = setup();
    let first = MockBuffer::zeroed(1, 64);

    ctx.bind_uniform_buffers(
        &[],
        Some(&UniformBufferBinding { binding: 0, buffer: Some(first), offset: 0, size: 64 }),
    )
    .unwrap();
    ctx.bind_uniform_buffers(
        &[],
        Some(&UniformBufferBinding { binding: 0, buffer: None, offset: 0, size: 0 }),
    )
    .unwrap();

    let bound = ctx.standalone_uniform_buffer().unwrap();
    assert_eq!(bound.buffer.native_handle(), Some(NativeHandle(1)));
}

#[test]
fn test_standalone_uniforms_uploaded_by_type() {
    let (mut ctx, calls) = setup();

    let mut bytes = f32_bytes(&[1.0, 2.0, 3.0, 4.0]);
    bytes.extend_from_slice(bytemuck::cast_slice(&[7i32, 8]));
    bytes.extend_from_slice(bytemuck::cast_slice(&glam::Mat2::IDENTITY.to_cols_array()));
    let buffer = MockBuffer::realized(9, bytes);

    let mut desc = mock::pipeline_desc("uniforms", 1);
    desc.program = mock::program(vec![
        mock::uniform("u_color", UniformType::FloatVec4, 0, 1, 0),
        mock::uniform("u_flags", UniformType::IntVec2, 16, 1, 16),
        mock::uniform("u_rot", UniformType::FloatMat2, 24, 1, 24),
    ]);
    let key = ctx.create_pipeline(desc).unwrap();
    ctx.bind_pipeline(key).unwrap();
    ctx.bind_uniform_buffers(
        &[],
        Some(&UniformBufferBinding { binding: 0, buffer: Some(buffer), offset: 0, size: 40 }),
    )
    .unwrap();
    ctx.flush(false, &draw3()).unwrap();

    let uploads: Vec<BackendCall> = take_calls(&calls)
        .into_iter()
        .filter(|c| matches!(
            c,
            BackendCall::UniformFloat { .. } | BackendCall::UniformInt { .. } | BackendCall::UniformMatrix { .. }
        ))
        .collect();
    assert_eq!(
        uploads,
        vec![
            BackendCall::UniformFloat { location: 0, components: 4, count: 1, data: vec![1.0, 2.0, 3.0, 4.0] },
            BackendCall::UniformInt { location: 16, components: 2, count: 1, data: vec![7, 8] },
            BackendCall::UniformMatrix { location: 24, dimension: 2, count: 1, data: vec![1.0, 0.0, 0.0, 1.0] },
        ]
    );
    assert_eq!(ctx.stats().uniforms_uploaded, 3);
}

#[test]
fn test_uniform_read_honors_binding_offset_and_arrays() {
    let (mut ctx, calls) = setup();
    // 16 bytes of padding, then a vec2[2]
    let buffer = MockBuffer::realized(9, f32_bytes(&[0.0, 0.0, 0.0, 0.0, 1.0, 2.0, 3.0, 4.0]));

    let mut desc = mock::pipeline_desc("arrays", 1);
    desc.program = mock::program(vec![mock::uniform("u_pts", UniformType::FloatVec2, 0, 2, 3)]);
    let key = ctx.create_pipeline(desc).unwrap();
    ctx.bind_pipeline(key).unwrap();
    ctx.bind_uniform_buffers(
        &[],
        Some(&UniformBufferBinding { binding: 0, buffer: Some(buffer), offset: 16, size: 16 }),
    )
    .unwrap();
    ctx.flush(false, &draw3()).unwrap();

    assert!(take_calls(&calls).contains(&BackendCall::UniformFloat {
        location: 3,
        components: 2,
        count: 2,
        data: vec![1.0, 2.0, 3.0, 4.0],
    }));
}

#[test]
fn test_uniform_read_past_bound_range_rejected() {
    let (mut ctx, calls) = setup();
    // Buffer holds the data, but the bound range stops before u_tint
    let buffer = MockBuffer::zeroed(9, 64);

    let mut desc = mock::pipeline_desc("range", 1);
    desc.program = mock::program(vec![mock::uniform("u_tint", UniformType::FloatVec4, 16, 1, 16)]);
    let key = ctx.create_pipeline(desc).unwrap();
    ctx.bind_pipeline(key).unwrap();
    ctx.bind_uniform_buffers(
        &[],
        Some(&UniformBufferBinding { binding: 0, buffer: Some(buffer), offset: 0, size: 16 }),
    )
    .unwrap();

    assert!(matches!(ctx.flush(false, &draw3()), Err(Error::InvalidResource(_))));
    assert!(!take_calls(&calls).iter().any(|c| matches!(c, BackendCall::UniformFloat { .. })));
}

#[test]
fn test_overflowing_uniform_offset_rejected() {
    let (mut ctx, _calls) = setup();
    let buffer = MockBuffer::zeroed(9, 64);

    let mut desc = mock::pipeline_desc("overflow", 1);
    desc.program = mock::program(vec![mock::uniform("u_alpha", UniformType::Float, 4, 1, 4)]);
    let key = ctx.create_pipeline(desc).unwrap();
    ctx.bind_pipeline(key).unwrap();
    ctx.bind_uniform_buffers(
        &[],
        Some(&UniformBufferBinding { binding: 0, buffer: Some(buffer), offset: u64::MAX - 2, size: 64 }),
    )
    .unwrap();

    assert!(matches!(ctx.flush(false, &draw3()), Err(Error::InvalidResource(_))));
}

#[test]
fn test_unsupported_uniforms_silently_skipped() {
    let (mut ctx, calls) = setup();
    let buffer = MockBuffer::zeroed(9, 64);

    let mut desc = mock::pipeline_desc("skips", 1);
    desc.program = mock::program(vec![
        mock::uniform("u_enabled", UniformType::Bool, 0, 1, 0),
        mock::uniform("u_count", UniformType::Int, 4, 1, 4),
        mock::uniform("u_tex", UniformType::Sampler2D, 8, 1, 8),
        mock::uniform("u_alpha", UniformType::Float, 12, 1, 12),
    ]);
    let key = ctx.create_pipeline(desc).unwrap();
    ctx.bind_pipeline(key).unwrap();
    ctx.bind_uniform_buffers(
        &[],
        Some(&UniformBufferBinding { binding: 0, buffer: Some(buffer), offset: 0, size: 64 }),
    )
    .unwrap();

    assert!(ctx.flush(false, &draw3()).is_ok());
    let uploads: Vec<BackendCall> = take_calls(&calls)
        .into_iter()
        .filter(|c| matches!(c, BackendCall::UniformFloat { .. } | BackendCall::UniformInt { .. }))
        .collect();
    assert_eq!(
        uploads,
        vec![BackendCall::UniformFloat { location: 12, components: 1, count: 1, data: vec![0.0] }]
    );
    assert_eq!(ctx.stats().uniforms_skipped, 3);
}

#[test]
fn test_no_uniform_upload_without_standalone_binding() {
    let (mut ctx, calls) = setup();
    let mut desc = mock::pipeline_desc("nobuf", 1);
    desc.program = mock::program(vec![mock::uniform("u_alpha", UniformType::Float, 0, 1, 0)]);
    let key = ctx.create_pipeline(desc).unwrap();
    ctx.bind_pipeline(key).unwrap();
    ctx.flush(false, &draw3()).unwrap();

    assert!(!take_calls(&calls).iter().any(|c| matches!(c, BackendCall::UniformFloat { .. })));
}

// ============================================================================
// Textures
// ============================================================================

#[test]
fn test_textures_bound_on_unit_equal_to_binding_then_cleared() {
    let (mut ctx, calls) = setup();
    bind_simple_pipeline(&mut ctx);
    let tex = MockTexture::realized(40);
    let sampler = Arc::new(MockSampler(41));

    ctx.bind_textures(&[TextureBinding { binding: 3, texture: tex.clone(), sampler: Some(sampler) }])
        .unwrap();
    ctx.flush(false, &draw3()).unwrap();

    assert!(take_calls(&calls).contains(&BackendCall::BindTexture {
        unit: 3,
        texture: NativeHandle(40),
        sampler: Some(NativeHandle(41)),
    }));
    assert_eq!(tex.prepare_count.load(Ordering::SeqCst), 1);
    assert!(ctx.textures().is_empty());
}

#[test]
fn test_unrealized_texture_initialized_at_flush() {
    let (mut ctx, calls) = setup();
    bind_simple_pipeline(&mut ctx);
    let tex = MockTexture::lazy(50);

    ctx.bind_textures(&[TextureBinding { binding: 0, texture: tex.clone(), sampler: None }])
        .unwrap();
    // Binding alone never realizes
    assert_eq!(tex.init_count.load(Ordering::SeqCst), 0);

    ctx.flush(false, &draw3()).unwrap();
    assert_eq!(tex.init_count.load(Ordering::SeqCst), 1);
    assert_eq!(ctx.stats().lazy_realizations, 1);
    assert!(take_calls(&calls).contains(&BackendCall::BindTexture {
        unit: 0,
        texture: NativeHandle(50),
        sampler: None,
    }));
}

#[test]
fn test_texture_bindings_do_not_carry_over_to_next_flush() {
    let (mut ctx, calls) = setup();
    bind_simple_pipeline(&mut ctx);
    ctx.bind_textures(&[TextureBinding { binding: 0, texture: MockTexture::realized(1), sampler: None }])
        .unwrap();
    ctx.flush(false, &draw3()).unwrap();
    take_calls(&calls);

    ctx.flush(false, &draw3()).unwrap();
    assert!(!take_calls(&calls).iter().any(|c| matches!(c, BackendCall::BindTexture { .. })));
}

// ============================================================================
// Vertex attributes
// ============================================================================

fn two_attribute_input() -> VertexInputState {
    VertexInputState {
        buffer_layouts: vec![
            VertexBufferLayout { binding: 0, stride: 20, input_rate: VertexInputRate::Vertex },
            VertexBufferLayout { binding: 1, stride: 8, input_rate: VertexInputRate::Instance },
        ],
        attributes: vec![
            VertexAttribute { location: 0, binding: 0, format: VertexFormat::R32G32B32_SFLOAT, offset: 0 },
            VertexAttribute { location: 1, binding: 0, format: VertexFormat::R32G32_SFLOAT, offset: 12 },
            VertexAttribute { location: 2, binding: 1, format: VertexFormat::R32G32_SFLOAT, offset: 0 },
        ],
    }
}

#[test]
fn test_attributes_resolved_against_bound_buffers() {
    let (mut ctx, calls) = setup();
    let mut desc = mock::pipeline_desc("attrs", 1);
    desc.vertex_input = two_attribute_input();
    let key = ctx.create_pipeline(desc).unwrap();
    ctx.bind_pipeline(key).unwrap();

    let mesh = MockBuffer::zeroed(10, 200);
    let instances = MockBuffer::zeroed(11, 80);
    ctx.bind_vertex_buffers(&[vbo(0, &mesh, 40), vbo(1, &instances, 0)]).unwrap();
    ctx.flush(false, &draw3()).unwrap();

    let calls = take_calls(&calls);
    let start = calls
        .iter()
        .position(|c| *c == BackendCall::EnableVertexAttribute(0))
        .unwrap();
    assert_eq!(
        &calls[start..start + 9],
        &[
            BackendCall::EnableVertexAttribute(0),
            BackendCall::BindBuffer(BufferTarget::Array, NativeHandle(10)),
            BackendCall::VertexAttributePointer {
                location: 0,
                format: VertexFormat::R32G32B32_SFLOAT,
                stride: 20,
                input_rate: VertexInputRate::Vertex,
                offset: 40,
            },
            BackendCall::EnableVertexAttribute(1),
            BackendCall::BindBuffer(BufferTarget::Array, NativeHandle(10)),
            BackendCall::VertexAttributePointer {
                location: 1,
                format: VertexFormat::R32G32_SFLOAT,
                stride: 20,
                input_rate: VertexInputRate::Vertex,
                offset: 52,
            },
            BackendCall::EnableVertexAttribute(2),
            BackendCall::BindBuffer(BufferTarget::Array, NativeHandle(11)),
            // Binding 1 is declared per-instance
            BackendCall::VertexAttributePointer {
                location: 2,
                format: VertexFormat::R32G32_SFLOAT,
                stride: 8,
                input_rate: VertexInputRate::Instance,
                offset: 0,
            },
        ]
    );
}

#[test]
fn test_instance_rate_changes_attribute_pointer() {
    let mut traces = Vec::new();
    for rate in [VertexInputRate::Vertex, VertexInputRate::Instance] {
        let (mut ctx, calls) = setup();
        let mut desc = mock::pipeline_desc("rate", 1);
        desc.vertex_input = mock::position_only_input();
        desc.vertex_input.buffer_layouts[0].input_rate = rate;
        let key = ctx.create_pipeline(desc).unwrap();
        ctx.bind_pipeline(key).unwrap();
        ctx.bind_vertex_buffers(&[vbo(0, &MockBuffer::zeroed(10, 36), 0)]).unwrap();
        ctx.flush(false, &draw3()).unwrap();
        traces.push(take_calls(&calls));
    }

    assert_ne!(traces[0], traces[1]);
    assert!(traces[1].iter().any(|c| matches!(
        c,
        BackendCall::VertexAttributePointer { input_rate: VertexInputRate::Instance, .. }
    )));
}

#[test]
fn test_overflowing_vertex_offset_rejected() {
    let (mut ctx, calls) = setup();
    let mut desc = mock::pipeline_desc("attrs", 1);
    desc.vertex_input = two_attribute_input();
    let key = ctx.create_pipeline(desc).unwrap();
    ctx.bind_pipeline(key).unwrap();
    let mesh = MockBuffer::zeroed(10, 200);
    ctx.bind_vertex_buffers(&[vbo(0, &mesh, u64::MAX - 4), vbo(1, &mesh, 0)]).unwrap();

    // Location 1 reads at offset 12 past the binding offset
    assert!(matches!(ctx.flush(false, &draw3()), Err(Error::InvalidResource(_))));
    assert!(!take_calls(&calls).iter().any(|c| matches!(c, BackendCall::DrawArrays { .. })));
}

#[test]
fn test_missing_vertex_buffer_is_precondition_error() {
    let (mut ctx, _calls) = setup();
    let mut desc = mock::pipeline_desc("attrs", 1);
    desc.vertex_input = mock::position_only_input();
    let key = ctx.create_pipeline(desc).unwrap();
    ctx.bind_pipeline(key).unwrap();

    assert_eq!(
        ctx.flush(false, &draw3()),
        Err(Error::MissingVertexBuffer { location: 0, binding: 0 })
    );
}

#[test]
fn test_unrealized_vertex_buffer_initialized_at_flush() {
    let (mut ctx, _calls) = setup();
    let mut desc = mock::pipeline_desc("attrs", 1);
    desc.vertex_input = mock::position_only_input();
    let key = ctx.create_pipeline(desc).unwrap();
    ctx.bind_pipeline(key).unwrap();

    let buffer = MockBuffer::lazy(12, vec![0; 36]);
    ctx.bind_vertex_buffers(&[vbo(0, &buffer, 0)]).unwrap();
    ctx.flush(false, &draw3()).unwrap();

    assert_eq!(buffer.init_count.load(Ordering::SeqCst), 1);
    assert!(buffer.is_realized());
}

#[test]
fn test_reset_after_disables_enabled_attributes() {
    let (mut ctx, calls) = setup();
    let mut desc = mock::pipeline_desc("attrs", 1);
    desc.vertex_input = two_attribute_input();
    let key = ctx.create_pipeline(desc).unwrap();
    ctx.bind_pipeline(key).unwrap();
    let mesh = MockBuffer::zeroed(10, 200);
    ctx.bind_vertex_buffers(&[vbo(0, &mesh, 0), vbo(1, &mesh, 0)]).unwrap();

    ctx.flush(true, &draw3()).unwrap();
    let calls = take_calls(&calls);
    let draw = calls.iter().position(|c| matches!(c, BackendCall::DrawArrays { .. })).unwrap();
    assert_eq!(
        &calls[draw + 1..],
        &[
            BackendCall::DisableVertexAttribute(0),
            BackendCall::DisableVertexAttribute(1),
            BackendCall::DisableVertexAttribute(2),
        ]
    );
    assert!(ctx.enabled_attributes().is_empty());
}

#[test]
fn test_without_reset_attributes_stay_enabled() {
    let (mut ctx, calls) = setup();
    let mut desc = mock::pipeline_desc("attrs", 1);
    desc.vertex_input = mock::position_only_input();
    let key = ctx.create_pipeline(desc).unwrap();
    ctx.bind_pipeline(key).unwrap();
    ctx.bind_vertex_buffers(&[vbo(0, &MockBuffer::zeroed(10, 36), 0)]).unwrap();

    ctx.flush(false, &draw3()).unwrap();
    assert!(!take_calls(&calls).iter().any(|c| matches!(c, BackendCall::DisableVertexAttribute(_))));
    assert!(ctx.enabled_attributes().contains(&0));
}

// ============================================================================
// Draw calls
// ============================================================================

#[test]
fn test_draw_issues_exactly_one_draw_arrays() {
    let (mut ctx, calls) = setup();
    bind_simple_pipeline(&mut ctx);
    ctx.flush(false, &draw3()).unwrap();

    let calls = take_calls(&calls);
    let draws: Vec<&BackendCall> = calls
        .iter()
        .filter(|c| matches!(c, BackendCall::DrawArrays { .. } | BackendCall::DrawElements { .. }))
        .collect();
    assert_eq!(
        draws,
        vec![&BackendCall::DrawArrays { topology: PrimitiveTopology::TriangleList, first: 0, count: 3 }]
    );
    assert_eq!(ctx.stats().draws, 1);
}

#[test]
fn test_draw_indexed_uses_binding_offset_and_format() {
    let (mut ctx, calls) = setup();
    bind_simple_pipeline(&mut ctx);
    let indices = MockBuffer::zeroed(30, 64);
    ctx.bind_index_buffer(IndexBufferBinding { buffer: indices, offset: 12, format: IndexFormat::U16 });

    ctx.flush(false, &DrawCall::DrawIndexed { index_count: 6 }).unwrap();

    let calls = take_calls(&calls);
    let n = calls.len();
    assert_eq!(
        &calls[n - 2..],
        &[
            BackendCall::BindBuffer(BufferTarget::ElementArray, NativeHandle(30)),
            BackendCall::DrawElements {
                topology: PrimitiveTopology::TriangleList,
                count: 6,
                format: IndexFormat::U16,
                offset: 12,
            },
        ]
    );
    assert_eq!(calls.iter().filter(|c| matches!(c, BackendCall::DrawElements { .. })).count(), 1);
}

#[test]
fn test_draw_indexed_without_index_buffer_fails() {
    let (mut ctx, _calls) = setup();
    bind_simple_pipeline(&mut ctx);
    assert_eq!(
        ctx.flush(false, &DrawCall::DrawIndexed { index_count: 6 }),
        Err(Error::MissingIndexBuffer)
    );
}

#[test]
fn test_indirect_draw_is_accepted_and_ignored() {
    let (mut ctx, calls) = setup();
    bind_simple_pipeline(&mut ctx);
    let args = MockBuffer::zeroed(60, 40);

    let call = DrawCall::DrawIndexedIndirect { buffer: args, offset: 0, draw_count: 2, stride: 20 };
    assert!(ctx.flush(false, &call).is_ok());

    assert!(!take_calls(&calls).iter().any(|c| matches!(
        c,
        BackendCall::DrawArrays { .. } | BackendCall::DrawElements { .. }
    )));
    assert_eq!(ctx.stats().draws, 0);
    assert_eq!(ctx.stats().ignored_indirect_draws, 1);
    assert_eq!(call.name(), "DrawIndexedIndirect");
}

#[test]
fn test_backend_error_propagates_from_flush() {
    let (backend, _calls) = MockBackend::failing_draws(Error::OutOfMemory);
    let mut ctx = Context::new(Box::new(backend), ContextConfig::default());
    bind_simple_pipeline(&mut ctx);

    assert_eq!(ctx.flush(false, &draw3()), Err(Error::OutOfMemory));
    assert_eq!(ctx.stats().flushes, 0);
}

// ============================================================================
// Failed flush cleanup
// ============================================================================

#[test]
fn test_failed_flush_clears_textures_and_resets_attributes() {
    let (mut ctx, calls) = setup();
    let mut desc = mock::pipeline_desc("attrs", 1);
    desc.vertex_input = mock::position_only_input();
    let key = ctx.create_pipeline(desc).unwrap();
    ctx.bind_pipeline(key).unwrap();
    ctx.bind_textures(&[TextureBinding { binding: 0, texture: MockTexture::realized(77), sampler: None }])
        .unwrap();

    // No vertex buffer at binding 0
    assert_eq!(
        ctx.flush(true, &draw3()),
        Err(Error::MissingVertexBuffer { location: 0, binding: 0 })
    );
    assert!(ctx.textures().is_empty());
    assert!(ctx.enabled_attributes().is_empty());
    assert_eq!(take_calls(&calls).last(), Some(&BackendCall::DisableVertexAttribute(0)));

    // The next draw must not see the texture bound for the failed one
    ctx.bind_vertex_buffers(&[vbo(0, &MockBuffer::zeroed(10, 36), 0)]).unwrap();
    ctx.flush(false, &draw3()).unwrap();
    assert!(!take_calls(&calls).iter().any(|c| matches!(c, BackendCall::BindTexture { .. })));
    assert_eq!(ctx.stats().flushes, 1);
}

#[test]
fn test_failed_draw_still_disables_attributes() {
    let (backend, calls) = MockBackend::failing_draws(Error::OutOfMemory);
    let mut ctx = Context::new(Box::new(backend), ContextConfig::default());
    let mut desc = mock::pipeline_desc("attrs", 1);
    desc.vertex_input = two_attribute_input();
    let key = ctx.create_pipeline(desc).unwrap();
    ctx.bind_pipeline(key).unwrap();
    let mesh = MockBuffer::zeroed(10, 200);
    ctx.bind_vertex_buffers(&[vbo(0, &mesh, 0), vbo(1, &mesh, 0)]).unwrap();

    assert_eq!(ctx.flush(true, &draw3()), Err(Error::OutOfMemory));
    let disabled: Vec<BackendCall> = take_calls(&calls)
        .into_iter()
        .filter(|c| matches!(c, BackendCall::DisableVertexAttribute(_)))
        .collect();
    assert_eq!(disabled.len(), 3);
    assert!(ctx.enabled_attributes().is_empty());
}

#[test]
fn test_failed_flush_without_reset_keeps_attributes_enabled() {
    let (mut ctx, _calls) = setup();
    let mut desc = mock::pipeline_desc("attrs", 1);
    desc.vertex_input = mock::position_only_input();
    let key = ctx.create_pipeline(desc).unwrap();
    ctx.bind_pipeline(key).unwrap();
    ctx.bind_textures(&[TextureBinding { binding: 2, texture: MockTexture::realized(5), sampler: None }])
        .unwrap();

    assert!(ctx.flush(false, &draw3()).is_err());
    assert!(ctx.textures().is_empty());
    assert!(ctx.enabled_attributes().contains(&0));
}

// ============================================================================
// Persistence across flushes
// ============================================================================

#[test]
fn test_non_texture_bindings_persist_after_flush() {
    let (mut ctx, _calls) = setup();
    bind_simple_pipeline(&mut ctx);
    let buffer = MockBuffer::zeroed(1, 64);

    ctx.bind_vertex_buffers(&[vbo(0, &buffer, 0)]).unwrap();
    ctx.bind_index_buffer(IndexBufferBinding { buffer: buffer.clone(), offset: 0, format: IndexFormat::U32 });
    ctx.bind_uniform_buffers(
        &[UniformBufferBinding { binding: 1, buffer: Some(buffer.clone()), offset: 0, size: 64 }],
        Some(&UniformBufferBinding { binding: 0, buffer: Some(buffer.clone()), offset: 0, size: 64 }),
    )
    .unwrap();
    ctx.bind_textures(&[TextureBinding { binding: 0, texture: MockTexture::realized(2), sampler: None }])
        .unwrap();

    ctx.flush(false, &draw3()).unwrap();

    assert!(ctx.textures().is_empty());
    assert!(ctx.vertex_buffers().get(0).is_some());
    assert!(ctx.index_buffer().is_some());
    assert!(ctx.uniform_buffers().get(1).is_some());
    assert!(ctx.standalone_uniform_buffer().is_some());
}

#[test]
fn test_reset_bindings_drops_everything() {
    let (mut ctx, _calls) = setup();
    let buffer = MockBuffer::zeroed(1, 64);
    ctx.bind_vertex_buffers(&[vbo(0, &buffer, 0)]).unwrap();
    ctx.bind_index_buffer(IndexBufferBinding { buffer, offset: 0, format: IndexFormat::U16 });

    ctx.reset_bindings();
    assert!(ctx.vertex_buffers().is_empty());
    assert!(ctx.index_buffer().is_none());
    assert!(ctx.standalone_uniform_buffer().is_none());
}
