use std::fmt;
use std::num::NonZeroU32;

/// Opaque native object name (program, shader stage, texture, buffer, vertex array).
///
/// GL reserves `0` for "no object". Owning wrappers model that state as
/// `Option<GlHandle>`, so a live handle is never zero.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlHandle(NonZeroU32);

impl GlHandle {
    /// Wraps a raw object name. Returns `None` for `0`.
    #[inline]
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    #[inline]
    pub fn get(self) -> u32 {
        self.0.get()
    }

    #[inline]
    pub fn non_zero(self) -> NonZeroU32 {
        self.0
    }
}

impl From<NonZeroU32> for GlHandle {
    #[inline]
    fn from(raw: NonZeroU32) -> Self {
        Self(raw)
    }
}

/// Raw object name of an optional handle; `0` when released.
#[inline]
pub(crate) fn raw_or_zero(handle: Option<GlHandle>) -> u32 {
    handle.map_or(0, GlHandle::get)
}

/// Resolved uniform location within a linked program.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UniformLocation(pub i32);

/// A native call reported an error (`glGetError` != `GL_NO_ERROR`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlError {
    /// Name of the GL entry point that failed, e.g. `"glBindTexture"`.
    pub call: &'static str,
    /// Raw GL error code. `0` when the backend could not report one.
    pub code: u32,
}

impl GlError {
    pub const INVALID_ENUM: u32 = 0x0500;
    pub const INVALID_VALUE: u32 = 0x0501;
    pub const INVALID_OPERATION: u32 = 0x0502;
    pub const OUT_OF_MEMORY: u32 = 0x0505;
    pub const INVALID_FRAMEBUFFER_OPERATION: u32 = 0x0506;

    #[inline]
    pub const fn new(call: &'static str, code: u32) -> Self {
        Self { call, code }
    }

    /// Symbolic name of the error code.
    pub fn code_name(&self) -> &'static str {
        match self.code {
            Self::INVALID_ENUM => "GL_INVALID_ENUM",
            Self::INVALID_VALUE => "GL_INVALID_VALUE",
            Self::INVALID_OPERATION => "GL_INVALID_OPERATION",
            Self::OUT_OF_MEMORY => "GL_OUT_OF_MEMORY",
            Self::INVALID_FRAMEBUFFER_OPERATION => "GL_INVALID_FRAMEBUFFER_OPERATION",
            _ => "unknown error",
        }
    }
}

impl fmt::Display for GlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} (0x{:04X})", self.call, self.code_name(), self.code)
    }
}

impl std::error::Error for GlError {}

pub type GlResult<T> = std::result::Result<T, GlError>;

// ── GL enumerations ───────────────────────────────────────────────────────
//
// Each enum maps to its GL constant through `gl_enum()`. Backends pass the
// raw value through; nothing above the backend sees GL constants.

/// One compiled half of a program.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub const fn gl_enum(self) -> u32 {
        match self {
            Self::Vertex => 0x8B31,
            Self::Fragment => 0x8B30,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
        })
    }
}

/// Target a texture object is bound to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TextureTarget {
    /// Regular 2D surface (`GL_TEXTURE_2D`).
    Texture2d,
    /// Externally produced image stream, e.g. a camera feed (`GL_TEXTURE_EXTERNAL_OES`).
    ExternalOes,
}

impl TextureTarget {
    pub const fn gl_enum(self) -> u32 {
        match self {
            Self::Texture2d => 0x0DE1,
            Self::ExternalOes => 0x8D65,
        }
    }
}

/// How sampling behaves past the texture edges.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum WrapMode {
    ClampToEdge,
    Repeat,
    MirroredRepeat,
}

impl WrapMode {
    pub const fn gl_enum(self) -> u32 {
        match self {
            Self::ClampToEdge => 0x812F,
            Self::Repeat => 0x2901,
            Self::MirroredRepeat => 0x8370,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TextureFilter {
    Nearest,
    Linear,
    LinearMipmapLinear,
}

impl TextureFilter {
    pub const fn gl_enum(self) -> u32 {
        match self {
            Self::Nearest => 0x2600,
            Self::Linear => 0x2601,
            Self::LinearMipmapLinear => 0x2703,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TextureParameter {
    MinFilter,
    MagFilter,
    WrapS,
    WrapT,
}

impl TextureParameter {
    pub const fn gl_enum(self) -> u32 {
        match self {
            Self::MinFilter => 0x2801,
            Self::MagFilter => 0x2800,
            Self::WrapS => 0x2802,
            Self::WrapT => 0x2803,
        }
    }
}

/// A factor used by the blend function.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
}

impl BlendFactor {
    pub const fn gl_enum(self) -> u32 {
        match self {
            Self::Zero => 0,
            Self::One => 1,
            Self::SrcColor => 0x0300,
            Self::OneMinusSrcColor => 0x0301,
            Self::SrcAlpha => 0x0302,
            Self::OneMinusSrcAlpha => 0x0303,
            Self::DstAlpha => 0x0304,
            Self::OneMinusDstAlpha => 0x0305,
            Self::DstColor => 0x0306,
            Self::OneMinusDstColor => 0x0307,
        }
    }
}

/// Primitive topology of a draw call.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PrimitiveMode {
    Points,
    Lines,
    LineLoop,
    LineStrip,
    Triangles,
    TriangleStrip,
    TriangleFan,
}

impl PrimitiveMode {
    pub const fn gl_enum(self) -> u32 {
        match self {
            Self::Points => 0x0000,
            Self::Lines => 0x0001,
            Self::LineLoop => 0x0002,
            Self::LineStrip => 0x0003,
            Self::Triangles => 0x0004,
            Self::TriangleStrip => 0x0005,
            Self::TriangleFan => 0x0006,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    /// Vertex attribute data.
    Array,
    /// Index data.
    ElementArray,
}

impl BufferTarget {
    pub const fn gl_enum(self) -> u32 {
        match self {
            Self::Array => 0x8892,
            Self::ElementArray => 0x8893,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    StaticDraw,
    DynamicDraw,
    StreamDraw,
}

impl BufferUsage {
    pub const fn gl_enum(self) -> u32 {
        match self {
            Self::StaticDraw => 0x88E4,
            Self::DynamicDraw => 0x88E8,
            Self::StreamDraw => 0x88E0,
        }
    }
}

/// Which framebuffer planes a clear touches.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ClearBuffers {
    Color,
    Depth,
    ColorAndDepth,
}

impl ClearBuffers {
    pub const fn gl_mask(self) -> u32 {
        const COLOR: u32 = 0x4000;
        const DEPTH: u32 = 0x0100;
        match self {
            Self::Color => COLOR,
            Self::Depth => DEPTH,
            Self::ColorAndDepth => COLOR | DEPTH,
        }
    }
}

/// A non-texture uniform value.
///
/// Matrices are column-major, as GL expects them.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Mat3([f32; 9]),
    Mat4([f32; 16]),
    IntArray(Vec<i32>),
    FloatArray(Vec<f32>),
}

impl From<bool> for UniformValue {
    fn from(v: bool) -> Self {
        Self::Int(i32::from(v))
    }
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}
