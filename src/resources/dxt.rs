//! S3TC (DXT1/3/5) block decompression.
//!
//! Textures are decompressed on load into plain RGB or RGBA buffers so every
//! backend can sample them and generate the mipmaps the files leave out.

use crate::error::{Error, Result};
use crate::resources::texture::TextureKind;

const BLOCK_TEXELS: usize = 16;

fn rgb_from_565(pixel: u16) -> [u8; 3] {
    let r = ((pixel >> 11) & 0x1F) as u8;
    let g = ((pixel >> 5) & 0x3F) as u8;
    let b = (pixel & 0x1F) as u8;
    [(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2)]
}

/// Decodes the color half of a block into 16 RGBA texels.
fn decode_colors(texels: &mut [[u8; 4]; BLOCK_TEXELS], block: &[u8]) {
    let a = u16::from_le_bytes([block[0], block[1]]);
    let b = u16::from_le_bytes([block[2], block[3]]);
    let punch_through = a <= b;

    let mut palette = [[0u8; 4]; 4];
    let [r0, g0, b0] = rgb_from_565(a);
    let [r1, g1, b1] = rgb_from_565(b);
    palette[0] = [r0, g0, b0, 0xFF];
    palette[1] = [r1, g1, b1, 0xFF];

    for channel in 0..3 {
        let c = palette[0][channel] as u32;
        let d = palette[1][channel] as u32;
        if punch_through {
            palette[2][channel] = ((c + d) / 2) as u8;
            palette[3][channel] = 0;
        } else {
            palette[2][channel] = ((2 * c + d) / 3) as u8;
            palette[3][channel] = ((c + 2 * d) / 3) as u8;
        }
    }
    palette[2][3] = 0xFF;
    palette[3][3] = if punch_through { 0 } else { 0xFF };

    for row in 0..4 {
        let bits = block[4 + row];
        for column in 0..4 {
            let index = (bits >> (2 * column)) & 0x3;
            texels[row * 4 + column] = palette[index as usize];
        }
    }
}

/// Explicit 4-bit alpha, two texels per byte.
fn decode_alpha_dxt3(texels: &mut [[u8; 4]; BLOCK_TEXELS], block: &[u8]) {
    for (i, &q) in block[..8].iter().enumerate() {
        let low = q & 0x0F;
        let high = q & 0xF0;
        texels[i * 2][3] = low | (low << 4);
        texels[i * 2 + 1][3] = high | (high >> 4);
    }
}

/// Interpolated alpha with 3-bit indices.
fn decode_alpha_dxt5(texels: &mut [[u8; 4]; BLOCK_TEXELS], block: &[u8]) {
    let alpha0 = block[0] as u32;
    let alpha1 = block[1] as u32;

    let mut alphas = [0u8; 8];
    alphas[0] = alpha0 as u8;
    alphas[1] = alpha1 as u8;
    alphas[6] = 0x00;
    alphas[7] = 0xFF;
    if alpha0 > alpha1 {
        for i in 1..7 {
            alphas[i + 1] = (((7 - i as u32) * alpha0 + i as u32 * alpha1) / 7) as u8;
        }
    } else {
        for i in 1..5 {
            alphas[i + 1] = (((5 - i as u32) * alpha0 + i as u32 * alpha1) / 5) as u8;
        }
    }

    for (group, bytes) in block[2..8].chunks_exact(3).enumerate() {
        let bits = bytes[0] as u32 | (bytes[1] as u32) << 8 | (bytes[2] as u32) << 16;
        for k in 0..8 {
            let index = (bits >> (3 * k)) & 0x7;
            texels[group * 8 + k][3] = alphas[index as usize];
        }
    }
}

/// Decompresses a DXT image into RGB (3 bytes per texel) or RGBA.
///
/// `width` and `height` must be multiples of 4. Only the blocks covering the
/// image are read; trailing bytes (such as further mip levels) are ignored.
pub fn decompress(
    source: &[u8],
    width: u32,
    height: u32,
    kind: TextureKind,
    alpha: bool,
) -> Result<Vec<u8>> {
    if width % 4 != 0 {
        return Err(Error::range(format!("invalid DXT image width {width}")));
    }
    if height % 4 != 0 {
        return Err(Error::range(format!("invalid DXT image height {height}")));
    }

    let block_length = match kind {
        TextureKind::Dxt1 | TextureKind::Dxt1a => 8,
        TextureKind::Dxt3 | TextureKind::Dxt5 => 16,
        other => {
            return Err(Error::unsupported(format!("{other:?} is not a DXT compression type")));
        }
    };

    let blocks_x = width as usize / 4;
    let blocks_y = height as usize / 4;
    let expected = blocks_x * blocks_y * block_length;
    if source.len() < expected {
        return Err(Error::range(format!(
            "DXT data holds {} bytes, {width}x{height} needs {expected}",
            source.len()
        )));
    }

    let channels = if alpha { 4 } else { 3 };
    let stride = width as usize * channels;
    let mut target = vec![0u8; stride * height as usize];
    let mut texels = [[0u8; 4]; BLOCK_TEXELS];

    for (n, block) in source[..expected].chunks_exact(block_length).enumerate() {
        match kind {
            TextureKind::Dxt3 => {
                decode_colors(&mut texels, &block[8..]);
                if alpha {
                    decode_alpha_dxt3(&mut texels, block);
                }
            }
            TextureKind::Dxt5 => {
                decode_colors(&mut texels, &block[8..]);
                if alpha {
                    decode_alpha_dxt5(&mut texels, block);
                }
            }
            _ => decode_colors(&mut texels, block),
        }

        let x = (n % blocks_x) * 4;
        let y = (n / blocks_x) * 4;
        for row in 0..4 {
            let start = (y + row) * stride + x * channels;
            let line = &mut target[start..start + 4 * channels];
            for (column, texel) in texels[row * 4..row * 4 + 4].iter().enumerate() {
                let at = column * channels;
                line[at..at + channels].copy_from_slice(&texel[..channels]);
            }
        }
    }

    Ok(target)
}
