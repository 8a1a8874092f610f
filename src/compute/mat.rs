// SPDX-License-Identifier: GPL-3.0-only

//! Typed image buffers
//!
//! Both residencies store elements little-endian and tightly packed in
//! row-major, channel-interleaved order, so moving a buffer across the bus
//! is a plain byte copy. Shaders view device buffers as `array<u32>` and
//! unpack by element tag.

use std::sync::Arc;

use crate::constants;
use crate::errors::{FilterError, FilterResult};
use crate::gpu::{Allocator, DeviceBuffer};

/// Element storage type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElemType {
    /// 8-bit unsigned, normalized by 255
    Int8,
    /// 16-bit unsigned, normalized by 65535
    Int16,
    Float16,
    Float32,
}

impl ElemType {
    /// Tag written into constant blocks and matched by the shader prelude
    pub fn tag(self) -> u32 {
        match self {
            ElemType::Int8 => 0,
            ElemType::Int16 => 1,
            ElemType::Float16 => 2,
            ElemType::Float32 => 3,
        }
    }

    /// Bytes per element
    pub fn size(self) -> usize {
        match self {
            ElemType::Int8 => 1,
            ElemType::Int16 | ElemType::Float16 => 2,
            ElemType::Float32 => 4,
        }
    }

    /// Read one element as a normalized value
    pub fn decode(self, bytes: &[u8]) -> f32 {
        match self {
            ElemType::Int8 => bytes[0] as f32 / 255.0,
            ElemType::Int16 => u16::from_le_bytes([bytes[0], bytes[1]]) as f32 / 65535.0,
            ElemType::Float16 => half::f16::from_le_bytes([bytes[0], bytes[1]]).to_f32(),
            ElemType::Float32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        }
    }

    /// Write one normalized value; integer types saturate
    pub fn encode(self, value: f32, out: &mut [u8]) {
        match self {
            ElemType::Int8 => out[0] = (value.clamp(0.0, 1.0) * 255.0).round() as u8,
            ElemType::Int16 => {
                let v = (value.clamp(0.0, 1.0) * 65535.0).round() as u16;
                out[..2].copy_from_slice(&v.to_le_bytes());
            }
            ElemType::Float16 => {
                out[..2].copy_from_slice(&half::f16::from_f32(value).to_le_bytes());
            }
            ElemType::Float32 => out[..4].copy_from_slice(&value.to_le_bytes()),
        }
    }
}

/// Channel order tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorFormat {
    Gray,
    Bgr,
    Abgr,
    Bgra,
    Rgb,
    Argb,
    Rgba,
}

impl ColorFormat {
    pub fn tag(self) -> u32 {
        match self {
            ColorFormat::Gray => 0,
            ColorFormat::Bgr => 1,
            ColorFormat::Abgr => 2,
            ColorFormat::Bgra => 3,
            ColorFormat::Rgb => 4,
            ColorFormat::Argb => 5,
            ColorFormat::Rgba => 6,
        }
    }

    /// Channel count the format normally carries
    pub fn channels(self) -> u32 {
        match self {
            ColorFormat::Gray => 1,
            ColorFormat::Bgr | ColorFormat::Rgb => 3,
            _ => 4,
        }
    }

    /// Reorder raw channels into RGBA; missing alpha is opaque
    pub fn to_rgba(self, px: &[f32]) -> [f32; 4] {
        let at = |i: usize| px.get(i).copied().unwrap_or(1.0);
        match self {
            ColorFormat::Gray => {
                let v = at(0);
                [v, v, v, 1.0]
            }
            ColorFormat::Bgr => [at(2), at(1), at(0), 1.0],
            ColorFormat::Abgr => [at(3), at(2), at(1), at(0)],
            ColorFormat::Bgra => [at(2), at(1), at(0), at(3)],
            ColorFormat::Rgb => [at(0), at(1), at(2), 1.0],
            ColorFormat::Argb => [at(1), at(2), at(3), at(0)],
            ColorFormat::Rgba => [at(0), at(1), at(2), at(3)],
        }
    }
}

/// Dimensions and type of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatShape {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub elem: ElemType,
    pub color: ColorFormat,
}

impl MatShape {
    pub fn new(width: u32, height: u32, channels: u32, elem: ElemType, color: ColorFormat) -> Self {
        Self {
            width,
            height,
            channels,
            elem,
            color,
        }
    }

    /// Same geometry with a different element type
    pub fn with_elem(self, elem: ElemType) -> Self {
        Self { elem, ..self }
    }

    pub fn validate(&self) -> FilterResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(FilterError::Shape(format!(
                "{}x{} has no pixels",
                self.width, self.height
            )));
        }
        if self.channels == 0 || self.channels > constants::mat::MAX_CHANNELS {
            return Err(FilterError::Shape(format!(
                "{} channels, expected 1..={}",
                self.channels,
                constants::mat::MAX_CHANNELS
            )));
        }
        Ok(())
    }

    pub fn element_count(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }

    /// Packed host size in bytes
    pub fn byte_len(&self) -> usize {
        self.element_count() * self.elem.size()
    }

    /// Device allocation size: whole 32-bit words, never zero
    pub fn device_len(&self) -> u64 {
        let word = constants::mat::WORD_BYTES;
        (self.byte_len() as u64).div_ceil(word).max(1) * word
    }

    fn offset(&self, x: u32, y: u32, k: u32) -> usize {
        ((y as usize * self.width as usize + x as usize) * self.channels as usize + k as usize)
            * self.elem.size()
    }
}

/// Host-resident buffer
#[derive(Debug, Clone, PartialEq)]
pub struct HostMat {
    shape: MatShape,
    data: Vec<u8>,
}

impl HostMat {
    /// Zero-filled buffer
    pub fn new(
        width: u32,
        height: u32,
        channels: u32,
        elem: ElemType,
        color: ColorFormat,
    ) -> FilterResult<Self> {
        let shape = MatShape::new(width, height, channels, elem, color);
        shape.validate()?;
        Ok(Self {
            shape,
            data: vec![0; shape.byte_len()],
        })
    }

    /// Placeholder with no pixels, to be shaped by a filter
    pub fn empty(elem: ElemType) -> Self {
        Self {
            shape: MatShape::new(0, 0, 1, elem, ColorFormat::Gray),
            data: Vec::new(),
        }
    }

    /// Wrap packed little-endian bytes
    pub fn from_bytes(shape: MatShape, data: Vec<u8>) -> FilterResult<Self> {
        shape.validate()?;
        if data.len() != shape.byte_len() {
            return Err(FilterError::Shape(format!(
                "expected {} bytes for {}x{}x{}, got {}",
                shape.byte_len(),
                shape.width,
                shape.height,
                shape.channels,
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// Build from normalized values, one per element
    pub fn from_values(shape: MatShape, values: &[f32]) -> FilterResult<Self> {
        shape.validate()?;
        if values.len() != shape.element_count() {
            return Err(FilterError::Shape(format!(
                "expected {} values, got {}",
                shape.element_count(),
                values.len()
            )));
        }
        let size = shape.elem.size();
        let mut data = vec![0; shape.byte_len()];
        for (v, out) in values.iter().zip(data.chunks_exact_mut(size)) {
            shape.elem.encode(*v, out);
        }
        Ok(Self { shape, data })
    }

    pub fn from_rgba8(image: &image::RgbaImage) -> FilterResult<Self> {
        let shape = MatShape::new(
            image.width(),
            image.height(),
            4,
            ElemType::Int8,
            ColorFormat::Rgba,
        );
        Self::from_bytes(shape, image.as_raw().clone())
    }

    /// Convert to 8-bit RGBA for writing with an image codec
    pub fn to_rgba8(&self) -> FilterResult<image::RgbaImage> {
        if self.is_empty() {
            return Err(FilterError::Shape("cannot convert an empty buffer".to_string()));
        }
        let MatShape { width, height, .. } = self.shape;
        let mut out = image::RgbaImage::new(width, height);
        let mut px = [0.0f32; 4];
        for (x, y, pixel) in out.enumerate_pixels_mut() {
            for k in 0..self.shape.channels {
                px[k as usize] = self.get(x, y, k);
            }
            let rgba = self.shape.color.to_rgba(&px[..self.shape.channels as usize]);
            pixel.0 = rgba.map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8);
        }
        Ok(out)
    }

    /// Reshape, reallocating only when the shape actually changes
    pub fn create_type(
        &mut self,
        width: u32,
        height: u32,
        channels: u32,
        elem: ElemType,
        color: ColorFormat,
    ) -> FilterResult<()> {
        let shape = MatShape::new(width, height, channels, elem, color);
        if shape == self.shape && self.data.len() == shape.byte_len() {
            return Ok(());
        }
        shape.validate()?;
        self.shape = shape;
        self.data = vec![0; shape.byte_len()];
        Ok(())
    }

    pub(crate) fn create_shape(&mut self, shape: MatShape) -> FilterResult<()> {
        self.create_type(
            shape.width,
            shape.height,
            shape.channels,
            shape.elem,
            shape.color,
        )
    }

    pub fn shape(&self) -> MatShape {
        self.shape
    }

    pub fn width(&self) -> u32 {
        self.shape.width
    }

    pub fn height(&self) -> u32 {
        self.shape.height
    }

    pub fn channels(&self) -> u32 {
        self.shape.channels
    }

    pub fn elem(&self) -> ElemType {
        self.shape.elem
    }

    pub fn color(&self) -> ColorFormat {
        self.shape.color
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Normalized value of channel `k` at (x, y)
    pub fn get(&self, x: u32, y: u32, k: u32) -> f32 {
        let at = self.shape.offset(x, y, k);
        self.shape.elem.decode(&self.data[at..at + self.shape.elem.size()])
    }

    pub fn set(&mut self, x: u32, y: u32, k: u32, value: f32) {
        let at = self.shape.offset(x, y, k);
        let size = self.shape.elem.size();
        self.shape.elem.encode(value, &mut self.data[at..at + size]);
    }

    /// Set every element to `value`
    pub fn fill(&mut self, value: f32) {
        let size = self.shape.elem.size();
        let mut encoded = [0u8; 4];
        self.shape.elem.encode(value, &mut encoded);
        for out in self.data.chunks_exact_mut(size) {
            out.copy_from_slice(&encoded[..size]);
        }
    }

    /// All elements as normalized values
    pub fn values(&self) -> Vec<f32> {
        self.data
            .chunks_exact(self.shape.elem.size())
            .map(|b| self.shape.elem.decode(b))
            .collect()
    }

    /// Copy packed bytes coming back from the device
    pub(crate) fn write_device_bytes(&mut self, shape: MatShape, bytes: &[u8]) -> FilterResult<()> {
        self.create_shape(shape)?;
        let len = shape.byte_len();
        if bytes.len() < len {
            return Err(FilterError::Map(format!(
                "readback returned {} bytes, expected {}",
                bytes.len(),
                len
            )));
        }
        self.data.copy_from_slice(&bytes[..len]);
        Ok(())
    }

    /// Packed bytes padded to the device allocation size
    pub(crate) fn device_bytes(&self) -> Vec<u8> {
        let mut bytes = self.data.clone();
        bytes.resize(self.shape.device_len() as usize, 0);
        bytes
    }
}

/// Device-resident buffer
///
/// Holds its backing buffer through the allocator that created it. The
/// contents can only reach the host through a recorded download or
/// [`Transfer`](super::Transfer).
#[derive(Debug)]
pub struct DeviceMat {
    shape: MatShape,
    buffer: Option<Arc<DeviceBuffer>>,
}

impl DeviceMat {
    /// Unallocated placeholder of the given element type
    pub fn empty(elem: ElemType) -> Self {
        Self {
            shape: MatShape::new(0, 0, 1, elem, ColorFormat::Gray),
            buffer: None,
        }
    }

    /// Allocate storage for `shape`
    ///
    /// Fails with [`FilterError::Shape`] when the buffer would exceed the
    /// device's buffer or storage binding limits.
    pub fn with_shape(shape: MatShape, allocator: &Allocator) -> FilterResult<Self> {
        shape.validate()?;
        let buffer = allocator.storage(shape.device_len(), "vkfilters mat")?;
        Ok(Self {
            shape,
            buffer: Some(Arc::new(buffer)),
        })
    }

    /// Second handle to the same storage, kept by the recorder until the
    /// work that uses it has completed
    pub(crate) fn share(&self) -> Self {
        Self {
            shape: self.shape,
            buffer: self.buffer.clone(),
        }
    }

    /// Allocate for the given shape unless already holding exactly that shape
    pub fn create_type(
        &mut self,
        width: u32,
        height: u32,
        channels: u32,
        elem: ElemType,
        color: ColorFormat,
        allocator: &Allocator,
    ) -> FilterResult<()> {
        self.create_shape(MatShape::new(width, height, channels, elem, color), allocator)
    }

    /// Allocate with the shape of `other`
    pub fn create_like(&mut self, other: &DeviceMat, allocator: &Allocator) -> FilterResult<()> {
        self.create_shape(other.shape, allocator)
    }

    pub(crate) fn create_shape(&mut self, shape: MatShape, allocator: &Allocator) -> FilterResult<()> {
        if shape == self.shape && self.buffer.is_some() {
            return Ok(());
        }
        *self = Self::with_shape(shape, allocator)?;
        Ok(())
    }

    pub fn shape(&self) -> MatShape {
        self.shape
    }

    pub fn width(&self) -> u32 {
        self.shape.width
    }

    pub fn height(&self) -> u32 {
        self.shape.height
    }

    pub fn channels(&self) -> u32 {
        self.shape.channels
    }

    pub fn elem(&self) -> ElemType {
        self.shape.elem
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_none()
    }

    pub(crate) fn buffer(&self) -> Option<&DeviceBuffer> {
        self.buffer.as_deref()
    }

    /// Backing buffer or a shape error naming the role
    pub(crate) fn require(&self, role: &str) -> FilterResult<&DeviceBuffer> {
        self.buffer()
            .ok_or_else(|| FilterError::Shape(format!("device buffer `{}` is not allocated", role)))
    }
}

/// Filter input in either residency
#[derive(Debug, Clone, Copy)]
pub enum MatSrc<'a> {
    Host(&'a HostMat),
    Device(&'a DeviceMat),
}

impl MatSrc<'_> {
    pub fn shape(&self) -> MatShape {
        match self {
            MatSrc::Host(m) => m.shape(),
            MatSrc::Device(m) => m.shape(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            MatSrc::Host(m) => m.is_empty(),
            MatSrc::Device(m) => m.is_empty(),
        }
    }
}

impl<'a> From<&'a HostMat> for MatSrc<'a> {
    fn from(m: &'a HostMat) -> Self {
        MatSrc::Host(m)
    }
}

impl<'a> From<&'a DeviceMat> for MatSrc<'a> {
    fn from(m: &'a DeviceMat) -> Self {
        MatSrc::Device(m)
    }
}

/// Filter output in either residency
#[derive(Debug)]
pub enum MatDst<'a> {
    Host(&'a mut HostMat),
    Device(&'a mut DeviceMat),
}

impl MatDst<'_> {
    /// Element type the caller wants the result in
    pub fn elem(&self) -> ElemType {
        match self {
            MatDst::Host(m) => m.elem(),
            MatDst::Device(m) => m.elem(),
        }
    }
}

impl<'a> From<&'a mut HostMat> for MatDst<'a> {
    fn from(m: &'a mut HostMat) -> Self {
        MatDst::Host(m)
    }
}

impl<'a> From<&'a mut DeviceMat> for MatDst<'a> {
    fn from(m: &'a mut DeviceMat) -> Self {
        MatDst::Device(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elem_tags_and_sizes() {
        let all = [
            ElemType::Int8,
            ElemType::Int16,
            ElemType::Float16,
            ElemType::Float32,
        ];
        let tags: Vec<u32> = all.iter().map(|e| e.tag()).collect();
        assert_eq!(tags, vec![0, 1, 2, 3]);
        let sizes: Vec<usize> = all.iter().map(|e| e.size()).collect();
        assert_eq!(sizes, vec![1, 2, 2, 4]);
    }

    #[test]
    fn test_color_tags() {
        assert_eq!(ColorFormat::Gray.tag(), 0);
        assert_eq!(ColorFormat::Bgra.tag(), 3);
        assert_eq!(ColorFormat::Rgba.tag(), 6);
    }

    #[test]
    fn test_device_len_word_aligned() {
        let shape = MatShape::new(3, 1, 1, ElemType::Int8, ColorFormat::Gray);
        assert_eq!(shape.byte_len(), 3);
        assert_eq!(shape.device_len(), 4);

        let shape = MatShape::new(5, 3, 3, ElemType::Float16, ColorFormat::Rgb);
        assert_eq!(shape.byte_len(), 90);
        assert_eq!(shape.device_len(), 92);

        let shape = MatShape::new(2, 2, 4, ElemType::Float32, ColorFormat::Rgba);
        assert_eq!(shape.device_len(), 64);
    }

    #[test]
    fn test_validate_rejects_bad_shapes() {
        assert!(MatShape::new(0, 4, 1, ElemType::Int8, ColorFormat::Gray).validate().is_err());
        assert!(MatShape::new(4, 4, 5, ElemType::Int8, ColorFormat::Rgba).validate().is_err());
        assert!(MatShape::new(4, 4, 0, ElemType::Int8, ColorFormat::Rgba).validate().is_err());
        assert!(MatShape::new(4, 4, 4, ElemType::Int8, ColorFormat::Rgba).validate().is_ok());
    }

    #[test]
    fn test_normalized_encoding() {
        let mut m = HostMat::new(2, 1, 1, ElemType::Int8, ColorFormat::Gray).unwrap();
        m.set(1, 0, 0, 1.0);
        assert_eq!(m.as_bytes(), &[0, 255]);
        assert_eq!(m.get(1, 0, 0), 1.0);

        let mut m = HostMat::new(1, 1, 1, ElemType::Int16, ColorFormat::Gray).unwrap();
        m.set(0, 0, 0, 2.0);
        assert_eq!(m.as_bytes(), &[0xff, 0xff]);

        let mut m = HostMat::new(1, 1, 2, ElemType::Float16, ColorFormat::Gray).unwrap();
        m.set(0, 0, 1, 0.5);
        assert_eq!(m.get(0, 0, 1), 0.5);
        assert_eq!(m.get(0, 0, 0), 0.0);
    }

    #[test]
    fn test_create_type_keeps_matching_storage() {
        let mut m = HostMat::new(4, 4, 1, ElemType::Float32, ColorFormat::Gray).unwrap();
        m.fill(0.25);
        m.create_type(4, 4, 1, ElemType::Float32, ColorFormat::Gray).unwrap();
        assert_eq!(m.get(3, 3, 0), 0.25);

        m.create_type(8, 2, 4, ElemType::Int8, ColorFormat::Rgba).unwrap();
        assert_eq!(m.as_bytes().len(), 64);
        assert_eq!(m.get(7, 1, 3), 0.0);
    }

    #[test]
    fn test_from_bytes_length_mismatch() {
        let shape = MatShape::new(2, 2, 1, ElemType::Int16, ColorFormat::Gray);
        assert!(HostMat::from_bytes(shape, vec![0; 7]).is_err());
        assert!(HostMat::from_bytes(shape, vec![0; 8]).is_ok());
    }

    #[test]
    fn test_rgba8_conversion_reorders_channels() {
        let shape = MatShape::new(1, 1, 3, ElemType::Float32, ColorFormat::Bgr);
        let m = HostMat::from_values(shape, &[1.0, 0.0, 0.5]).unwrap();
        let img = m.to_rgba8().unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [128, 0, 255, 255]);

        let mut rgba = image::RgbaImage::new(2, 1);
        rgba.put_pixel(1, 0, image::Rgba([10, 20, 30, 40]));
        let m = HostMat::from_rgba8(&rgba).unwrap();
        assert_eq!(m.shape().color, ColorFormat::Rgba);
        assert_eq!(m.to_rgba8().unwrap(), rgba);
    }

    #[test]
    fn test_device_bytes_padding() {
        let m = HostMat::new(3, 1, 1, ElemType::Int8, ColorFormat::Gray).unwrap();
        assert_eq!(m.device_bytes().len(), 4);
    }
}
