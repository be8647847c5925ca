//! Die face presentation.

use dice::DieFace;

/// Glyph for a die face: `U+2680` ("⚀") through `U+2685` ("⚅").
pub fn face_glyph(face: DieFace) -> char {
    // 0x267F + face lands in U+2680..=U+2685 for faces 1..=6.
    char::from_u32(0x267F + u32::from(face.value())).unwrap_or('?')
}
