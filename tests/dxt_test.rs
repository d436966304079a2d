use glancer::error::Error;
use glancer::resources::dxt::decompress;
use glancer::resources::texture::TextureKind;

/// Pure red and pure blue endpoints, each row selecting palette 0, 1, 2, 3.
const DXT1_BLOCK: [u8; 8] = [0x00, 0xF8, 0x1F, 0x00, 0xE4, 0xE4, 0xE4, 0xE4];

#[test]
fn dxt1_reference_block() {
    let rgb = decompress(&DXT1_BLOCK, 4, 4, TextureKind::Dxt1, false).unwrap();

    let row = [255, 0, 0, 0, 0, 255, 170, 0, 85, 85, 0, 170];
    assert_eq!(rgb.len(), 4 * 4 * 3);
    for line in rgb.chunks_exact(12) {
        assert_eq!(line, row);
    }
}

#[test]
fn dxt1_punch_through_is_transparent() {
    // Endpoints swapped so the first is not greater: index 3 becomes transparent black.
    let block = [0x1F, 0x00, 0x00, 0xF8, 0xFF, 0xFF, 0xFF, 0xFF];
    let rgba = decompress(&block, 4, 4, TextureKind::Dxt1a, true).unwrap();

    assert!(rgba.chunks_exact(4).all(|texel| texel == [0, 0, 0, 0]));
}

#[test]
fn dxt3_explicit_alpha() {
    let mut block = [0u8; 16];
    block[..8].fill(0x5A);
    block[8..].copy_from_slice(&DXT1_BLOCK);
    let rgba = decompress(&block, 4, 4, TextureKind::Dxt3, true).unwrap();

    let alphas: Vec<u8> = rgba.chunks_exact(4).map(|texel| texel[3]).collect();
    assert_eq!(&alphas[..4], [0xAA, 0x55, 0xAA, 0x55]);
    assert_eq!(&rgba[..3], [255, 0, 0]);
}

#[test]
fn blocks_land_at_their_image_position() {
    let black = [0u8; 8];
    let white = [0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0];
    let source = [black, white].concat();
    let rgb = decompress(&source, 8, 4, TextureKind::Dxt1, false).unwrap();

    let stride = 8 * 3;
    for row in rgb.chunks_exact(stride) {
        assert!(row[..12].iter().all(|&b| b == 0));
        assert!(row[12..].iter().all(|&b| b == 0xFF));
    }
}

#[test]
fn short_input_is_a_range_error() {
    let result = decompress(&DXT1_BLOCK, 8, 8, TextureKind::Dxt1, false);
    assert!(matches!(result, Err(Error::Range(_))));
}
