//! ZX Spectrum 16-colour palette.
//!
//! 3-bit GRB with a BRIGHT modifier; black appears twice. Non-bright
//! colours use the lower 0xCD intensity, bright colours full 0xFF.

/// RGBA8888 palette: 16 entries (8 normal + 8 bright).
///
/// Index layout: `bright_bit << 3 | colour_3bit`.
///
/// Colours: black, blue, red, magenta, green, cyan, yellow, white.
pub const PALETTE: [u32; 16] = [
    // Normal (bright = 0)
    0x0000_00FF, // 0: Black
    0x0000_CDFF, // 1: Blue
    0xCD00_00FF, // 2: Red
    0xCD00_CDFF, // 3: Magenta
    0x00CD_00FF, // 4: Green
    0x00CD_CDFF, // 5: Cyan
    0xCDCD_00FF, // 6: Yellow
    0xCDCD_CDFF, // 7: White
    // Bright (bright = 1)
    0x0000_00FF, // 8: Black (same as normal)
    0x0000_FFFF, // 9: Bright Blue
    0xFF00_00FF, // 10: Bright Red
    0xFF00_FFFF, // 11: Bright Magenta
    0x00FF_00FF, // 12: Bright Green
    0x00FF_FFFF, // 13: Bright Cyan
    0xFFFF_00FF, // 14: Bright Yellow
    0xFFFF_FFFF, // 15: Bright White
];
