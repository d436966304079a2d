//! Texture resources.
//!
//! Texture library entries hold either a DirectDraw Surface (`mips`) with
//! DXT compressed or uncompressed mip levels, a set of Targa images
//! (`mip0`, `mip1`, ...) or a cube map, which is not supported. Texel data
//! stays in its stored form until [`Texture::to_rgba8`] expands a level for
//! upload.

use image::{ImageFormat, load_from_memory_with_format};

use crate::error::{Error, Result};
use crate::resources::dxt;
use crate::utf::{Cursor, Entry};

/// Stored pixel layout of every mip level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TextureKind {
    Rgb16_565 = 0,
    Rgba16_4444 = 1,
    Rgba16_5551 = 2,
    /// RGB byte order.
    Rgb24_888 = 3,
    /// RGBA byte order.
    Rgba32_8888 = 4,
    Dxt1 = 5,
    /// DXT1 with one bit alpha.
    Dxt1a = 6,
    Dxt3 = 7,
    Dxt5 = 8,
}

impl TextureKind {
    pub fn is_compressed(self) -> bool {
        matches!(self, Self::Dxt1 | Self::Dxt1a | Self::Dxt3 | Self::Dxt5)
    }

    /// `(red, green, blue, alpha)` masks of the 16-bit kinds.
    fn masks16(self) -> Option<[u16; 4]> {
        match self {
            Self::Rgb16_565 => Some([0xF800, 0x07E0, 0x001F, 0]),
            Self::Rgba16_4444 => Some([0x0F00, 0x00F0, 0x000F, 0xF000]),
            Self::Rgba16_5551 => Some([0x7C00, 0x03E0, 0x001F, 0x8000]),
            _ => None,
        }
    }
}

const DDS_SIGNATURE: u32 = 0x2053_4444;
const DDS_RESERVED: usize = 11 * 4;
const DDS_PIXEL_FORMAT: u32 = 0x1000;
const DDS_MIPMAP_COUNT: u32 = 0x2_0000;
const DDS_PIXELS_ALPHA: u32 = 0x1;
const DDS_PIXELS_FOURCC: u32 = 0x4;
const DDS_PIXELS_RGB: u32 = 0x40;
const DDS_FOURCC_DXT1: u32 = 0x3154_5844;
const DDS_FOURCC_DXT3: u32 = 0x3354_5844;
const DDS_FOURCC_DXT5: u32 = 0x3554_5844;

const TAG_MIPS: &str = "mips";
const TAG_CUBE: &str = "cube";

/// A texture with one or more mip levels, each half the size of the last.
#[derive(Clone, Debug, PartialEq)]
pub struct Texture {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub alpha: bool,
    pub kind: TextureKind,
    pub mipmaps: Vec<Vec<u8>>,
}

impl Default for Texture {
    /// The 1x1 placeholder used until a real texture is loaded.
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
            depth: 24,
            alpha: false,
            kind: TextureKind::Rgb24_888,
            mipmaps: vec![vec![1; 3]],
        }
    }
}

fn mip_size(size: u32, level: usize) -> u32 {
    (size >> level).max(1)
}

fn bytes_per_level(kind: TextureKind, width: u32, height: u32) -> usize {
    let (w, h) = (width as usize, height as usize);
    match kind {
        TextureKind::Rgb16_565 | TextureKind::Rgba16_4444 | TextureKind::Rgba16_5551 => w * h * 2,
        TextureKind::Rgb24_888 => w * h * 3,
        TextureKind::Rgba32_8888 => w * h * 4,
        TextureKind::Dxt1 | TextureKind::Dxt1a => w.div_ceil(4) * h.div_ceil(4) * 8,
        TextureKind::Dxt3 | TextureKind::Dxt5 => w.div_ceil(4) * h.div_ceil(4) * 16,
    }
}

/// Scales a masked 16-bit channel to 8 bits; an empty mask is opaque.
fn channel16(pixel: u16, mask: u16) -> u8 {
    if mask == 0 {
        return 0xFF;
    }
    let shift = mask.trailing_zeros();
    let max = (mask >> shift) as u32;
    (((pixel & mask) >> shift) as u32 * 255 / max) as u8
}

impl Texture {
    /// Iterates `(level, width, height, bytes)` for every stored level.
    pub fn mipmaps(&self) -> impl Iterator<Item = (usize, u32, u32, &[u8])> + '_ {
        let (width, height) = (self.width, self.height);
        self.mipmaps
            .iter()
            .enumerate()
            .take_while(move |(level, _)| {
                *level < 32 && (width >> level) > 0 && (height >> level) > 0
            })
            .map(move |(level, bytes)| (level, width >> level, height >> level, bytes.as_slice()))
    }

    /// Reads a DirectDraw Surface.
    pub fn from_dds(mut data: Cursor) -> Result<Self> {
        let mut pixels = data.clone();
        let header = data.read_u32s(8)?;
        let (signature, header_size, flags) = (header[0], header[1] as usize, header[2]);
        let (height, width) = (header[3], header[4]);
        let mut mipmap_count = header[7];

        if signature != DDS_SIGNATURE {
            return Err(Error::format("invalid DDS header"));
        }
        if flags & DDS_PIXEL_FORMAT == 0 {
            return Err(Error::format("DDS is missing pixel format header"));
        }
        if flags & DDS_MIPMAP_COUNT == 0 || mipmap_count == 0 {
            mipmap_count = 1;
        }

        pixels.skip(header_size + 4)?;
        data.skip(DDS_RESERVED)?;

        let format = data.read_u32s(8)?;
        let (pixel_flags, four_cc, bit_count) = (format[1], format[2], format[3]);
        let masks = [format[4], format[5], format[6], format[7]];

        let (kind, alpha, depth) = if pixel_flags & DDS_PIXELS_FOURCC != 0 {
            match four_cc {
                DDS_FOURCC_DXT1 if pixel_flags & DDS_PIXELS_ALPHA != 0 => {
                    (TextureKind::Dxt1a, true, 32)
                }
                DDS_FOURCC_DXT1 => (TextureKind::Dxt1, false, 24),
                DDS_FOURCC_DXT3 => (TextureKind::Dxt3, true, 32),
                DDS_FOURCC_DXT5 => (TextureKind::Dxt5, true, 32),
                other => {
                    return Err(Error::unsupported(format!("DDS compression {other:#010x}")));
                }
            }
        } else if pixel_flags & DDS_PIXELS_RGB != 0 {
            let kind = match (bit_count, masks) {
                (16, [0xF800, 0x07E0, 0x001F, 0]) => TextureKind::Rgb16_565,
                (16, [0x0F00, 0x00F0, 0x000F, 0xF000]) => TextureKind::Rgba16_4444,
                (16, [0x7C00, 0x03E0, 0x001F, 0x8000]) => TextureKind::Rgba16_5551,
                (24, [0xFF_0000, 0xFF00, 0xFF, 0]) => TextureKind::Rgb24_888,
                (32, [0xFF_0000, 0xFF00, 0xFF, 0xFF00_0000]) => TextureKind::Rgba32_8888,
                (16 | 24 | 32, _) => {
                    let message = format!("{bit_count}-bit color mask {masks:x?}");
                    return Err(Error::unsupported(message));
                }
                _ => return Err(Error::unsupported(format!("uncompressed bit depth {bit_count}"))),
            };
            (kind, masks[3] != 0, bit_count)
        } else {
            return Err(Error::unsupported("DDS pixel format is neither FourCC nor RGB"));
        };

        let mut mipmaps = Vec::with_capacity(mipmap_count as usize);
        for level in 0..mipmap_count as usize {
            let (w, h) = (mip_size(width, level), mip_size(height, level));
            let mut bytes = pixels.copy(bytes_per_level(kind, w, h))?;
            // Stored as little-endian BGR(A), kept in RGB(A) order.
            match kind {
                TextureKind::Rgb24_888 => bytes.chunks_exact_mut(3).for_each(|p| p.swap(0, 2)),
                TextureKind::Rgba32_8888 => bytes.chunks_exact_mut(4).for_each(|p| p.swap(0, 2)),
                _ => {}
            }
            mipmaps.push(bytes);
            if w == 1 && h == 1 {
                break;
            }
        }

        Ok(Self {
            width,
            height,
            depth,
            alpha,
            kind,
            mipmaps,
        })
    }

    /// Builds a texture from Targa files, one per mip level.
    pub fn from_targa(levels: &[Vec<u8>]) -> Result<Self> {
        let mut texture: Option<Texture> = None;

        for (level, bytes) in levels.iter().enumerate() {
            let image = load_from_memory_with_format(bytes, ImageFormat::Tga)
                .map_err(|e| Error::format(format!("invalid Targa image at mip {level}: {e}")))?;
            let (width, height) = (image.width(), image.height());

            match texture.as_mut() {
                None => {
                    let alpha = image.color().has_alpha();
                    let (kind, depth, pixels) = if alpha {
                        (TextureKind::Rgba32_8888, 32, image.to_rgba8().into_raw())
                    } else {
                        (TextureKind::Rgb24_888, 24, image.to_rgb8().into_raw())
                    };
                    texture = Some(Texture {
                        width,
                        height,
                        depth,
                        alpha,
                        kind,
                        mipmaps: vec![pixels],
                    });
                }
                Some(texture) => {
                    let expected =
                        (mip_size(texture.width, level), mip_size(texture.height, level));
                    if (width, height) != expected {
                        let message = format!("invalid mipmap ({level}) image resolution");
                        return Err(Error::range(message));
                    }
                    let pixels = match texture.kind {
                        TextureKind::Rgba32_8888 => image.to_rgba8().into_raw(),
                        _ => image.to_rgb8().into_raw(),
                    };
                    texture.mipmaps.push(pixels);
                }
            }
        }

        texture.ok_or_else(|| Error::range("no Targa images are specified"))
    }

    /// Expands one mip level to tightly packed RGBA8.
    pub fn to_rgba8(&self, level: usize) -> Result<(u32, u32, Vec<u8>)> {
        let bytes = self
            .mipmaps
            .get(level)
            .ok_or_else(|| Error::range(format!("texture has no mip level {level}")))?;
        let (width, height) = (mip_size(self.width, level), mip_size(self.height, level));
        let texels = width as usize * height as usize;
        if bytes.len() < bytes_per_level(self.kind, width, height) {
            return Err(Error::range(format!("mip level {level} is truncated")));
        }

        let rgba = match self.kind {
            TextureKind::Rgb24_888 => bytes[..texels * 3]
                .chunks_exact(3)
                .flat_map(|p| [p[0], p[1], p[2], 0xFF])
                .collect(),
            TextureKind::Rgba32_8888 => bytes[..texels * 4].to_vec(),
            kind if kind.is_compressed() => {
                // Blocks are 4x4, so the smallest levels decode padded and get cropped.
                let (padded_w, padded_h) = (width.next_multiple_of(4), height.next_multiple_of(4));
                let full = dxt::decompress(bytes, padded_w, padded_h, kind, true)?;
                let mut rgba = Vec::with_capacity(texels * 4);
                for row in full.chunks_exact(padded_w as usize * 4).take(height as usize) {
                    rgba.extend_from_slice(&row[..width as usize * 4]);
                }
                rgba
            }
            kind => {
                let [r, g, b, a] =
                    kind.masks16().ok_or_else(|| Error::unsupported(format!("{kind:?}")))?;
                bytes[..texels * 2]
                    .chunks_exact(2)
                    .map(|p| u16::from_le_bytes([p[0], p[1]]))
                    .flat_map(|p| {
                        [channel16(p, r), channel16(p, g), channel16(p, b), channel16(p, a)]
                    })
                    .collect()
            }
        };

        Ok((width, height, rgba))
    }
}

fn mip_level(tag: &str) -> Option<usize> {
    let digits = tag.strip_prefix("mip")?;
    if digits.len() == 1 {
        digits.parse().ok()
    } else {
        None
    }
}

/// Decodes one texture library entry, `None` when it holds no images.
pub fn load_texture(folder: Entry<'_>) -> Result<Option<Texture>> {
    let [mips, cube] = folder.find([TAG_MIPS, TAG_CUBE])?;

    if let Some(mips) = mips {
        return Texture::from_dds(mips.data()?).map(Some);
    }
    if cube.is_some() {
        return Err(Error::unsupported(format!("cube map texture {}", folder.name())));
    }

    let mut levels: Vec<Option<Vec<u8>>> = Vec::new();
    for child in folder.children() {
        let (tag, entry) = child?;
        if !entry.has_data() {
            continue;
        }
        if let Some(level) = mip_level(&tag) {
            if levels.len() <= level {
                levels.resize(level + 1, None);
            }
            levels[level] = Some(entry.data()?.copy(0)?);
        }
    }

    if levels.is_empty() {
        return Ok(None);
    }
    let levels = levels
        .into_iter()
        .enumerate()
        .map(|(level, bytes)| {
            bytes.ok_or_else(|| Error::range(format!("texture is missing mip{level}")))
        })
        .collect::<Result<Vec<_>>>()?;
    Texture::from_targa(&levels).map(Some)
}
