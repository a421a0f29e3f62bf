//! Shader uniform values

/// Location of a uniform inside a linked program. `None` when the program
/// does not use the uniform (the value is silently dropped).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub Option<u32>);

impl UniformLocation {
    pub const UNUSED: UniformLocation = UniformLocation(None);

    pub fn is_used(&self) -> bool {
        self.0.is_some()
    }
}

/// Value of a uniform, keyed by its GLSL type
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Int2([i32; 2]),
    Float(f32),
    Float2([f32; 2]),
    /// Column-major 3x2 matrix
    Mat3x2 { transpose: bool, value: [f32; 6] },
}

impl UniformValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            UniformValue::Int(_) => "int",
            UniformValue::Int2(_) => "ivec2",
            UniformValue::Float(_) => "float",
            UniformValue::Float2(_) => "vec2",
            UniformValue::Mat3x2 { .. } => "mat3x2",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Uniform {
    pub location: UniformLocation,
    pub value: UniformValue,
}

impl Uniform {
    pub fn new(location: UniformLocation, value: UniformValue) -> Self {
        Self { location, value }
    }
}
