/// SPIR-V reflection of standalone uniforms
///
/// On Vulkan the loose uniforms of a program live in its push-constant
/// block. Each leaf member of that block becomes a `StandaloneUniform`
/// whose buffer offset and backend location are both its push-constant
/// offset, so a standalone uniform buffer laid out like the block is
/// uploaded member by member with `cmd_push_constants`.

use prism_graphics::prism::pipeline::{Program, ProgramReflection, StandaloneUniform, UniformType};
use prism_graphics::prism::resource::NativeHandle;
use prism_graphics::prism::{Error, Result};
use prism_graphics::{prism_debug, prism_err};

const LOG_SOURCE: &str = "prism::vulkan::Program";

/// Scalar category of a reflected member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Float32,
    Float64,
    Int,
    UInt,
    Bool,
}

/// Uniform type of a `columns` x `components` value of `kind`
///
/// Non-matrix values have `columns == 1`. Unsigned integers upload like
/// signed ones.
pub fn classify(kind: ScalarKind, components: u32, columns: u32) -> UniformType {
    match (kind, columns, components) {
        (ScalarKind::Float32, 1, 1) => UniformType::Float,
        (ScalarKind::Float32, 1, 2) => UniformType::FloatVec2,
        (ScalarKind::Float32, 1, 3) => UniformType::FloatVec3,
        (ScalarKind::Float32, 1, 4) => UniformType::FloatVec4,
        (ScalarKind::Float32, 2, 2) => UniformType::FloatMat2,
        (ScalarKind::Float32, 3, 3) => UniformType::FloatMat3,
        (ScalarKind::Float32, 4, 4) => UniformType::FloatMat4,
        (ScalarKind::Int | ScalarKind::UInt, 1, 1) => UniformType::Int,
        (ScalarKind::Int | ScalarKind::UInt, 1, 2) => UniformType::IntVec2,
        (ScalarKind::Int | ScalarKind::UInt, 1, 3) => UniformType::IntVec3,
        (ScalarKind::Int | ScalarKind::UInt, 1, 4) => UniformType::IntVec4,
        (ScalarKind::Bool, 1, 1) => UniformType::Bool,
        (ScalarKind::Bool, 1, 2) => UniformType::BoolVec2,
        (ScalarKind::Bool, 1, 3) => UniformType::BoolVec3,
        (ScalarKind::Bool, 1, 4) => UniformType::BoolVec4,
        _ => UniformType::Other,
    }
}

/// Reinterpret SPIR-V bytes as little-endian words
pub fn spirv_words(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        return Err(Error::InvalidResource(format!(
            "SPIR-V length {} is not a multiple of 4", bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le(bytemuck::pod_read_unaligned::<u32>(chunk)))
        .collect())
}

/// Merge per-stage uniform lists
///
/// A member shared by several stages appears once. The result is in
/// push-constant offset order.
pub fn merge_uniforms(stages: Vec<Vec<StandaloneUniform>>) -> Vec<StandaloneUniform> {
    let mut merged: Vec<StandaloneUniform> = Vec::new();
    for uniform in stages.into_iter().flatten() {
        if !merged.iter().any(|u| u.name == uniform.name && u.offset == uniform.offset) {
            merged.push(uniform);
        }
    }
    merged.sort_by_key(|u| u.offset);
    merged
}

fn scalar_kind(scalar_ty: &spirq::ty::ScalarType) -> Option<ScalarKind> {
    use spirq::ty::ScalarType;
    match scalar_ty {
        ScalarType::Float { bits: 64 } => Some(ScalarKind::Float64),
        ScalarType::Float { .. } => Some(ScalarKind::Float32),
        ScalarType::Integer { is_signed: true, .. } => Some(ScalarKind::Int),
        ScalarType::Integer { is_signed: false, .. } => Some(ScalarKind::UInt),
        ScalarType::Boolean => Some(ScalarKind::Bool),
        _ => None,
    }
}

/// Uniform type of a non-aggregate spirq type
fn leaf_type(ty: &spirq::ty::Type) -> UniformType {
    use spirq::ty::Type;
    let classified = match ty {
        Type::Scalar(s) => scalar_kind(s).map(|kind| classify(kind, 1, 1)),
        Type::Vector(v) => scalar_kind(&v.scalar_ty).map(|kind| classify(kind, v.nscalar, 1)),
        Type::Matrix(m) => {
            scalar_kind(&m.vector_ty.scalar_ty).map(|kind| classify(kind, m.vector_ty.nscalar, m.nvector))
        }
        _ => None,
    };
    let ty_class = classified.unwrap_or(UniformType::Other);

    // Values whose block layout is padded cannot be read back packed
    let packed = ty_class.upload().scalar_count() as usize * 4;
    match ty.nbyte() {
        Some(size) if packed != 0 && size != packed => UniformType::Other,
        _ => ty_class,
    }
}

fn flatten(name: String, offset: u32, ty: &spirq::ty::Type, out: &mut Vec<StandaloneUniform>) {
    use spirq::ty::Type;
    match ty {
        Type::Struct(st) => {
            for member in &st.members {
                let member_name = member.name.clone().unwrap_or_default();
                let full_name = if name.is_empty() { member_name } else { format!("{}.{}", name, member_name) };
                let member_offset = offset + member.offset.unwrap_or(0) as u32;
                flatten(full_name, member_offset, &member.ty, out);
            }
        }
        Type::Array(a) => {
            let count = a.nelement.unwrap_or(1);
            let element_ty = leaf_type(&a.element_ty);
            let packed_stride = element_ty.upload().scalar_count() as usize * 4;

            if !matches!(*a.element_ty, Type::Struct(_)) && a.stride.is_none_or(|s| s == packed_stride) {
                out.push(StandaloneUniform {
                    name,
                    ty: element_ty,
                    offset,
                    array_size: count,
                    location: offset,
                });
            } else {
                let stride = a.stride.or_else(|| a.element_ty.nbyte()).unwrap_or(0) as u32;
                for i in 0..count {
                    flatten(format!("{}[{}]", name, i), offset + i * stride, &a.element_ty, out);
                }
            }
        }
        _ => out.push(StandaloneUniform {
            name,
            ty: leaf_type(ty),
            offset,
            array_size: 1,
            location: offset,
        }),
    }
}

/// Standalone uniforms of one SPIR-V module
pub fn reflect_standalone_uniforms(words: &[u32]) -> Result<Vec<StandaloneUniform>> {
    let entry_points = spirq::ReflectConfig::new()
        .spv(words)
        .ref_all_rscs(true)
        .reflect()
        .map_err(|e| prism_err!(LOG_SOURCE, "SPIR-V reflection failed: {:?}", e))?;

    let mut uniforms = Vec::new();
    for entry_point in &entry_points {
        for var in entry_point.vars.iter() {
            if let spirq::var::Variable::PushConstant { ty, .. } = var {
                flatten(String::new(), 0, ty, &mut uniforms);
            }
        }
    }
    Ok(uniforms)
}

/// Build a `Program` from the SPIR-V of each of its stages
///
/// `native` is the handle the caller created the program's pipeline from;
/// it is carried as is.
pub fn reflect_program(name: &str, native: NativeHandle, stages: &[&[u8]]) -> Result<Program> {
    let mut per_stage = Vec::with_capacity(stages.len());
    for stage in stages {
        let words = spirv_words(stage)?;
        per_stage.push(reflect_standalone_uniforms(&words)?);
    }

    let standalone_uniforms = merge_uniforms(per_stage);
    prism_debug!(LOG_SOURCE, "Program '{}': {} standalone uniform(s)", name, standalone_uniforms.len());

    Ok(Program::new(name, native, ProgramReflection { standalone_uniforms }))
}

#[cfg(test)]
#[path = "vulkan_program_tests.rs"]
mod tests;
