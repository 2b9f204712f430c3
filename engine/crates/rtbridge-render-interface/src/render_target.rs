use ash::vk;

use crate::error::{BridgeError, BridgeResult};

/// 渲染目标支持的像素格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetFormat {
    /// 每通道 8 bit 的 RGBA
    Rgba32,
}
impl TargetFormat {
    /// 宿主纹理格式枚举中 RGBA32 的取值
    pub const HOST_RGBA32: i32 = 4;

    pub fn from_host_code(code: i32) -> BridgeResult<Self> {
        match code {
            Self::HOST_RGBA32 => Ok(Self::Rgba32),
            _ => Err(BridgeError::InvalidRenderTarget(format!("unsupported texture format code {}", code))),
        }
    }

    #[inline]
    pub fn vk_format(self) -> vk::Format {
        match self {
            Self::Rgba32 => vk::Format::R8G8B8A8_UNORM,
        }
    }

    #[inline]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgba32 => 4,
        }
    }
}

/// 宿主持有的渲染目标句柄（例如原生纹理指针），对桥接层不透明
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawTargetHandle(pub u64);

/// 渲染目标描述，渲染器向其中写入像素，生命周期归宿主
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderTargetDesc {
    pub format: TargetFormat,
    pub extent: vk::Extent2D,
    pub handle: RawTargetHandle,
}
impl RenderTargetDesc {
    pub const MAX_EXTENT: u32 = 16384;

    pub fn new(format: TargetFormat, width: u32, height: u32, handle: RawTargetHandle) -> BridgeResult<Self> {
        if width == 0 || height == 0 {
            return Err(BridgeError::InvalidRenderTarget(format!("empty extent {}x{}", width, height)));
        }
        if width > Self::MAX_EXTENT || height > Self::MAX_EXTENT {
            return Err(BridgeError::InvalidRenderTarget(format!(
                "extent {}x{} exceeds {}",
                width,
                height,
                Self::MAX_EXTENT
            )));
        }
        if handle.0 == 0 {
            return Err(BridgeError::InvalidRenderTarget("null target handle".to_string()));
        }
        Ok(Self {
            format,
            extent: vk::Extent2D { width, height },
            handle,
        })
    }

    /// 使用宿主传入的原始数值构造
    pub fn from_host(format_code: i32, width: i32, height: i32, handle: u64) -> BridgeResult<Self> {
        let format = TargetFormat::from_host_code(format_code)?;
        let (Ok(width), Ok(height)) = (u32::try_from(width), u32::try_from(height)) else {
            return Err(BridgeError::InvalidRenderTarget(format!("negative extent {}x{}", width, height)));
        };
        Self::new(format, width, height, RawTargetHandle(handle))
    }

    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.extent.width as usize * self.extent.height as usize
    }

    #[inline]
    pub fn byte_size(&self) -> usize {
        self.pixel_count() * self.format.bytes_per_pixel()
    }
}
