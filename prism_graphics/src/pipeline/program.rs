/// Shader program and its reflected standalone uniforms
///
/// Standalone uniforms are the loose (non-block) uniforms of a program.
/// At flush time the Context walks them in order and uploads each one
/// from the bound standalone uniform buffer.

use crate::resource::NativeHandle;

/// Type of a reflected standalone uniform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformType {
    Float,
    FloatVec2,
    FloatVec3,
    FloatVec4,
    Int,
    IntVec2,
    IntVec3,
    IntVec4,
    Bool,
    BoolVec2,
    BoolVec3,
    BoolVec4,
    FloatMat2,
    FloatMat3,
    FloatMat4,
    Sampler2D,
    SamplerCube,
    /// Anything reflection could not classify
    Other,
}

/// Backend call a uniform type resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformUpload {
    /// N-component float vector
    Float { components: u32 },
    /// N-component integer vector
    Int { components: u32 },
    /// Square float matrix of the given dimension
    Matrix { dimension: u32 },
    /// Not uploaded
    Skip,
}

impl UniformType {
    /// How this type is uploaded
    ///
    /// Integer scalars, booleans, samplers and unknown types are skipped.
    pub fn upload(&self) -> UniformUpload {
        match self {
            UniformType::Float => UniformUpload::Float { components: 1 },
            UniformType::FloatVec2 => UniformUpload::Float { components: 2 },
            UniformType::FloatVec3 => UniformUpload::Float { components: 3 },
            UniformType::FloatVec4 => UniformUpload::Float { components: 4 },
            UniformType::IntVec2 => UniformUpload::Int { components: 2 },
            UniformType::IntVec3 => UniformUpload::Int { components: 3 },
            UniformType::IntVec4 => UniformUpload::Int { components: 4 },
            UniformType::FloatMat2 => UniformUpload::Matrix { dimension: 2 },
            UniformType::FloatMat3 => UniformUpload::Matrix { dimension: 3 },
            UniformType::FloatMat4 => UniformUpload::Matrix { dimension: 4 },
            UniformType::Int
            | UniformType::Bool
            | UniformType::BoolVec2
            | UniformType::BoolVec3
            | UniformType::BoolVec4
            | UniformType::Sampler2D
            | UniformType::SamplerCube
            | UniformType::Other => UniformUpload::Skip,
        }
    }
}

impl UniformUpload {
    /// Number of 4-byte scalars per array element
    pub fn scalar_count(&self) -> u32 {
        match self {
            UniformUpload::Float { components } | UniformUpload::Int { components } => *components,
            UniformUpload::Matrix { dimension } => dimension * dimension,
            UniformUpload::Skip => 0,
        }
    }
}

/// One reflected standalone uniform
#[derive(Debug, Clone, PartialEq)]
pub struct StandaloneUniform {
    pub name: String,
    pub ty: UniformType,
    /// Byte offset of the value inside the standalone uniform buffer
    pub offset: u32,
    /// Element count (1 for non-arrays)
    pub array_size: u32,
    /// Backend location the value is uploaded to
    pub location: u32,
}

/// Reflection data of a program
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgramReflection {
    /// Standalone uniforms in upload order
    pub standalone_uniforms: Vec<StandaloneUniform>,
}

/// Linked shader program
#[derive(Debug, Clone)]
pub struct Program {
    pub name: String,
    pub native: NativeHandle,
    pub reflection: ProgramReflection,
}

impl Program {
    pub fn new(name: impl Into<String>, native: NativeHandle, reflection: ProgramReflection) -> Self {
        Self {
            name: name.into(),
            native,
            reflection,
        }
    }

    pub fn standalone_uniforms(&self) -> &[StandaloneUniform] {
        &self.reflection.standalone_uniforms
    }
}
