// SPDX-License-Identifier: CEPL-1.0

//! Packed 0xRRGGBB colors.

const NAMED: &[(&str, u32)] = &[
    ("black", 0x000000),
    ("white", 0xFFFFFF),
    ("red", 0xFF0000),
    ("lime", 0x00FF00),
    ("green", 0x008000),
    ("blue", 0x0000FF),
    ("yellow", 0xFFFF00),
    ("cyan", 0x00FFFF),
    ("magenta", 0xFF00FF),
    ("orange", 0xFFA500),
    ("purple", 0x800080),
    ("navy", 0x000080),
    ("gold", 0xFFD700),
    ("gray", 0x808080),
];

/// Splits a packed color into normalized channels.
pub fn unpack_rgb(c: u32) -> [f32; 3] {
    let r = (c >> 16) & 0xFF;
    let g = (c >> 8) & 0xFF;
    let b = c & 0xFF;
    [r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0]
}

/// Parses `#RRGGBB`, `0xRRGGBB`, bare hex, or a known color name.
pub fn parse_color(s: &str) -> Option<u32> {
    let s = s.trim();
    if let Some(&(_, c)) = NAMED.iter().find(|(n, _)| n.eq_ignore_ascii_case(s)) {
        return Some(c);
    }
    let hex = s
        .strip_prefix('#')
        .or_else(|| s.strip_prefix("0x"))
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if hex.is_empty() || hex.len() > 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(hex, 16).ok()
}
