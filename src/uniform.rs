//! Typed uniform declarations for the full-canvas shader.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::CanvasError;

/// Name of the screen resolution uniform every full-canvas shader receives.
pub const RESOLUTION_UNIFORM: &str = "u_resolution";
/// Suffix of the auto-generated resolution uniform paired with each sampler.
pub const TEXTURE_RESOLUTION_SUFFIX: &str = "_resolution";
const ARRAY_SUFFIX: &str = "_ARRAY";

/// GLSL shape of a single uniform element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Bool,
    BVec2,
    BVec3,
    BVec4,
    UInt,
    UVec2,
    UVec3,
    UVec4,
    Float,
    Vec2,
    Vec3,
    Vec4,
    Int,
    IVec2,
    IVec3,
    IVec4,
    Mat22,
    Mat23,
    Mat24,
    Mat32,
    Mat33,
    Mat34,
    Mat42,
    Mat43,
    Mat44,
    Sampler2D,
}

/// Scalar category of a uniform's components.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scalar {
    Bool,
    UInt,
    Int,
    Float,
    Sampler,
}

use UniformKind::*;

// (kind, tag, glsl names; the first glsl name is used for declarations)
static KIND_TABLE: [(UniformKind, &str, &[&str]); 26] = [
    (Bool, "BOOLEAN", &["bool"]),
    (BVec2, "BVEC2", &["bvec2"]),
    (BVec3, "BVEC3", &["bvec3"]),
    (BVec4, "BVEC4", &["bvec4"]),
    (UInt, "UINT", &["uint"]),
    (UVec2, "UVEC2", &["uvec2"]),
    (UVec3, "UVEC3", &["uvec3"]),
    (UVec4, "UVEC4", &["uvec4"]),
    (Float, "FLOAT", &["float"]),
    (Vec2, "VEC2", &["vec2"]),
    (Vec3, "VEC3", &["vec3"]),
    (Vec4, "VEC4", &["vec4"]),
    (Int, "INT", &["int"]),
    (IVec2, "IVEC2", &["ivec2"]),
    (IVec3, "IVEC3", &["ivec3"]),
    (IVec4, "IVEC4", &["ivec4"]),
    (Mat22, "MAT22", &["mat2", "mat2x2"]),
    (Mat23, "MAT23", &["mat2x3"]),
    (Mat24, "MAT24", &["mat2x4"]),
    (Mat32, "MAT32", &["mat3x2"]),
    (Mat33, "MAT33", &["mat3", "mat3x3"]),
    (Mat34, "MAT34", &["mat3x4"]),
    (Mat42, "MAT42", &["mat4x2"]),
    (Mat43, "MAT43", &["mat4x3"]),
    (Mat44, "MAT44", &["mat4", "mat4x4"]),
    (Sampler2D, "SAMPLER2D", &["sampler2D"]),
];

impl UniformKind {
    fn entry(&self) -> &'static (UniformKind, &'static str, &'static [&'static str]) {
        // every kind has exactly one row
        KIND_TABLE
            .iter()
            .find(|(kind, _, _)| kind == self)
            .unwrap_or(&KIND_TABLE[0])
    }

    pub fn tag(&self) -> &'static str {
        self.entry().1
    }

    pub fn glsl_name(&self) -> &'static str {
        self.entry().2[0]
    }

    pub fn from_glsl(name: &str) -> Option<UniformKind> {
        KIND_TABLE
            .iter()
            .find(|(_, _, names)| names.contains(&name))
            .map(|(kind, _, _)| *kind)
    }

    pub fn scalar(&self) -> Scalar {
        match self {
            Bool | BVec2 | BVec3 | BVec4 => Scalar::Bool,
            UInt | UVec2 | UVec3 | UVec4 => Scalar::UInt,
            Int | IVec2 | IVec3 | IVec4 => Scalar::Int,
            Sampler2D => Scalar::Sampler,
            _ => Scalar::Float,
        }
    }

    /// `(columns, rows)` for matrix kinds.
    pub fn matrix_shape(&self) -> Option<(u8, u8)> {
        match self {
            Mat22 => Some((2, 2)),
            Mat23 => Some((2, 3)),
            Mat24 => Some((2, 4)),
            Mat32 => Some((3, 2)),
            Mat33 => Some((3, 3)),
            Mat34 => Some((3, 4)),
            Mat42 => Some((4, 2)),
            Mat43 => Some((4, 3)),
            Mat44 => Some((4, 4)),
            _ => None,
        }
    }

    /// Number of scalar components in one element.
    pub fn components(&self) -> u8 {
        if let Some((cols, rows)) = self.matrix_shape() {
            return cols * rows;
        }
        match self {
            BVec2 | UVec2 | Vec2 | IVec2 => 2,
            BVec3 | UVec3 | Vec3 | IVec3 => 3,
            BVec4 | UVec4 | Vec4 | IVec4 => 4,
            _ => 1,
        }
    }
}

/// A uniform's declared GLSL type: a single element or an array of them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UniformType {
    Single(UniformKind),
    Array(UniformKind),
}

impl UniformType {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformType::Single(kind) | UniformType::Array(kind) => *kind,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, UniformType::Array(_))
    }
}

impl fmt::Display for UniformType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniformType::Single(kind) => f.write_str(kind.tag()),
            UniformType::Array(kind) => write!(f, "{}{}", kind.tag(), ARRAY_SUFFIX),
        }
    }
}

impl FromStr for UniformType {
    type Err = CanvasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (tag, array) = match s.strip_suffix(ARRAY_SUFFIX) {
            Some(tag) => (tag, true),
            None => (s, false),
        };
        let kind = KIND_TABLE
            .iter()
            .find(|(_, t, _)| *t == tag)
            .map(|(kind, _, _)| *kind)
            .ok_or_else(|| CanvasError::UnknownVariant {
                kind: "uniform type",
                value: s.to_string(),
            })?;
        Ok(if array {
            UniformType::Array(kind)
        } else {
            UniformType::Single(kind)
        })
    }
}

/// A validated uniform declaration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniformDescriptor {
    pub name: String,
    pub ty: UniformType,
    /// Present exactly when `ty` is an array type.
    pub length: Option<u32>,
    /// Generated by the session rather than declared by the caller.
    pub internal: bool,
}

impl UniformDescriptor {
    /// Number of scalar components a full write of this uniform carries.
    pub fn total_components(&self) -> usize {
        self.ty.kind().components() as usize * self.length.unwrap_or(1) as usize
    }

    /// `uniform <glsl type> <name>[<length>];`
    pub fn declaration(&self) -> String {
        match self.length {
            Some(length) => format!("uniform {} {}[{}];", self.ty.kind().glsl_name(), self.name, length),
            None => format!("uniform {} {};", self.ty.kind().glsl_name(), self.name),
        }
    }

    fn resolution_companion(&self) -> Option<UniformDescriptor> {
        let ty = match self.ty {
            UniformType::Single(Sampler2D) => UniformType::Single(Vec2),
            UniformType::Array(Sampler2D) => UniformType::Array(Vec2),
            _ => return None,
        };
        Some(UniformDescriptor {
            name: format!("{}{}", self.name, TEXTURE_RESOLUTION_SUFFIX),
            ty,
            length: self.length,
            internal: true,
        })
    }
}

/// A caller-supplied uniform declaration, either structured or in the
/// compact `"<glsl type> <name>[<length>]"` form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UniformDecl {
    Glsl(String),
    Structured {
        name: String,
        ty: UniformType,
        length: Option<u32>,
    },
}

impl From<&str> for UniformDecl {
    fn from(value: &str) -> Self {
        UniformDecl::Glsl(value.to_string())
    }
}

impl From<String> for UniformDecl {
    fn from(value: String) -> Self {
        UniformDecl::Glsl(value)
    }
}

fn valid_name(name: &str) -> bool {
    !name.is_empty() && !name.chars().any(|c| c.is_whitespace() || c == '[' || c == ']')
}

fn parse_glsl(text: &str) -> Result<UniformDescriptor, CanvasError> {
    let invalid = || CanvasError::validation(format!("uniformString invalid format: {}", text));
    let mut parts = text.split(' ');
    let (glsl_type, rest) = match (parts.next(), parts.next(), parts.next()) {
        (Some(glsl_type), Some(rest), None) => (glsl_type, rest),
        _ => return Err(invalid()),
    };
    let (name, length) = match rest.strip_suffix(']') {
        Some(head) => {
            let (name, digits) = head.split_once('[').ok_or_else(invalid)?;
            let well_formed = !digits.is_empty()
                && !digits.starts_with('0')
                && digits.chars().all(|c| c.is_ascii_digit());
            if !well_formed {
                return Err(invalid());
            }
            (name, Some(digits.parse::<u32>().map_err(|_| invalid())?))
        }
        None => (rest, None),
    };
    if !valid_name(name) {
        return Err(invalid());
    }
    let kind = UniformKind::from_glsl(glsl_type).ok_or_else(|| {
        CanvasError::validation(format!("uniformString type unrecognized: {}", glsl_type))
    })?;
    Ok(UniformDescriptor {
        name: name.to_string(),
        ty: if length.is_some() {
            UniformType::Array(kind)
        } else {
            UniformType::Single(kind)
        },
        length,
        internal: false,
    })
}

impl UniformDecl {
    pub fn parse(&self) -> Result<UniformDescriptor, CanvasError> {
        match self {
            UniformDecl::Glsl(text) => parse_glsl(text),
            UniformDecl::Structured { name, ty, length } => {
                if !valid_name(name) {
                    return Err(CanvasError::validation(format!("uniform name invalid: {:?}", name)));
                }
                let length = match (ty.is_array(), length) {
                    (true, Some(length)) if *length >= 1 => Some(*length),
                    (false, None) => None,
                    _ => {
                        return Err(CanvasError::validation(format!(
                            "uniform {} length invalid for type {}: {:?}",
                            name, ty, length
                        )))
                    }
                };
                Ok(UniformDescriptor {
                    name: name.clone(),
                    ty: *ty,
                    length,
                    internal: false,
                })
            }
        }
    }
}

/// Validates caller declarations and appends the `_resolution` companion
/// after every sampler uniform.
pub fn expand_uniforms(decls: &[UniformDecl]) -> Result<Vec<UniformDescriptor>, CanvasError> {
    let mut names = HashSet::new();
    let mut out = Vec::with_capacity(decls.len());
    for (i, decl) in decls.iter().enumerate() {
        let descriptor = decl.parse()?;
        if descriptor.name == RESOLUTION_UNIFORM {
            return Err(CanvasError::validation(format!(
                "uniforms[{}].name '{}' is internal, reserved for screen resolution",
                i, RESOLUTION_UNIFORM
            )));
        }
        if !names.insert(descriptor.name.clone()) {
            return Err(CanvasError::validation(format!(
                "uniforms[{}].name taken: {}",
                i, descriptor.name
            )));
        }
        let companion = descriptor.resolution_companion();
        out.push(descriptor);
        if let Some(companion) = companion {
            if !names.insert(companion.name.clone()) {
                return Err(CanvasError::validation(format!(
                    "uniforms[{}] resolution name taken: {}",
                    i, companion.name
                )));
            }
            out.push(companion);
        }
    }
    Ok(out)
}

/// A value written to or read from a uniform, flattened to its components.
#[derive(Clone, Debug, PartialEq)]
pub enum UniformValue {
    Bools(Vec<bool>),
    Ints(Vec<i32>),
    UInts(Vec<u32>),
    Floats(Vec<f32>),
    /// Texture aliases, for sampler uniforms.
    Textures(Vec<String>),
}

impl UniformValue {
    pub fn len(&self) -> usize {
        match self {
            UniformValue::Bools(v) => v.len(),
            UniformValue::Ints(v) => v.len(),
            UniformValue::UInts(v) => v.len(),
            UniformValue::Floats(v) => v.len(),
            UniformValue::Textures(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<bool> for UniformValue {
    fn from(value: bool) -> Self {
        UniformValue::Bools(vec![value])
    }
}

impl From<i32> for UniformValue {
    fn from(value: i32) -> Self {
        UniformValue::Ints(vec![value])
    }
}

impl From<u32> for UniformValue {
    fn from(value: u32) -> Self {
        UniformValue::UInts(vec![value])
    }
}

impl From<f32> for UniformValue {
    fn from(value: f32) -> Self {
        UniformValue::Floats(vec![value])
    }
}

impl<const N: usize> From<[f32; N]> for UniformValue {
    fn from(value: [f32; N]) -> Self {
        UniformValue::Floats(value.to_vec())
    }
}

impl<const N: usize> From<[i32; N]> for UniformValue {
    fn from(value: [i32; N]) -> Self {
        UniformValue::Ints(value.to_vec())
    }
}

impl From<&str> for UniformValue {
    fn from(alias: &str) -> Self {
        UniformValue::Textures(vec![alias.to_string()])
    }
}
