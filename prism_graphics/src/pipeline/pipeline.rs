/// Immutable pipeline snapshot
///
/// A pipeline bundles the fixed-function state the Context applies at
/// flush time with the program whose uniforms it uploads. Snapshots are
/// never mutated after creation; "did the pipeline change" is answered by
/// arena key identity, not by comparing state.

use std::sync::Arc;
use crate::error::{Error, Result};
use crate::prism_error;
use crate::resource::NativeHandle;
use super::pipeline_state::{
    ColorBlendState, PrimitiveTopology, RasterizationState, VertexInputState,
    VertexBufferLayout,
};
use super::program::Program;

/// Backend fixed-function object bound at the start of a flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativePipeline {
    /// Backend pipeline object
    pub pipeline: NativeHandle,
    /// Layout the program's uniforms are uploaded against
    pub layout: NativeHandle,
}

/// Descriptor for creating a pipeline snapshot
#[derive(Clone)]
pub struct PipelineDesc {
    /// Debug label
    pub label: String,
    pub native: NativePipeline,
    pub program: Arc<Program>,
    /// None = leave blend state untouched at flush
    pub color_blend: Option<ColorBlendState>,
    /// None = leave culling untouched at flush
    pub rasterization: Option<RasterizationState>,
    pub vertex_input: VertexInputState,
    pub topology: PrimitiveTopology,
}

pub struct Pipeline {
    label: String,
    native: NativePipeline,
    program: Arc<Program>,
    color_blend: Option<ColorBlendState>,
    rasterization: Option<RasterizationState>,
    vertex_input: VertexInputState,
    topology: PrimitiveTopology,
}

impl Pipeline {
    /// Build a snapshot, checking every attribute reads a declared binding
    pub fn new(desc: PipelineDesc) -> Result<Self> {
        for attribute in &desc.vertex_input.attributes {
            if desc.vertex_input.buffer_layout(attribute.binding).is_none() {
                prism_error!(
                    "prism::Pipeline",
                    "Pipeline '{}': attribute at location {} reads undeclared binding {}",
                    desc.label, attribute.location, attribute.binding
                );
                return Err(Error::InvalidResource(format!(
                    "pipeline '{}' attribute {} reads undeclared vertex binding {}",
                    desc.label, attribute.location, attribute.binding
                )));
            }
        }

        Ok(Self {
            label: desc.label,
            native: desc.native,
            program: desc.program,
            color_blend: desc.color_blend,
            rasterization: desc.rasterization,
            vertex_input: desc.vertex_input,
            topology: desc.topology,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn native(&self) -> &NativePipeline {
        &self.native
    }

    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    pub fn color_blend(&self) -> Option<&ColorBlendState> {
        self.color_blend.as_ref()
    }

    pub fn rasterization(&self) -> Option<&RasterizationState> {
        self.rasterization.as_ref()
    }

    pub fn vertex_input(&self) -> &VertexInputState {
        &self.vertex_input
    }

    /// Layout of a vertex buffer binding
    pub fn buffer_layout(&self, binding: u32) -> Option<&VertexBufferLayout> {
        self.vertex_input.buffer_layout(binding)
    }

    pub fn topology(&self) -> PrimitiveTopology {
        self.topology
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
