use chess::{Color, Piece, Square};
use std::str::FromStr;

use crate::error::RejectedMove;

/// Convert a chess Color to the lowercase form used on the wire
pub fn color_to_string(color: Color) -> String {
    match color {
        Color::White => "white".to_string(),
        Color::Black => "black".to_string(),
    }
}

/// Capitalised colour name, as shown in results ("White wins")
pub fn color_name(color: Color) -> &'static str {
    match color {
        Color::White => "White",
        Color::Black => "Black",
    }
}

/// Parse a coordinate such as "e4", accepting either case
pub fn parse_square(text: &str) -> Result<Square, RejectedMove> {
    Square::from_str(&text.trim().to_lowercase())
        .map_err(|_| RejectedMove::BadSquare(text.to_string()))
}

/// Map a UCI promotion letter to a piece
pub fn parse_promotion(ch: char) -> Result<Piece, RejectedMove> {
    match ch.to_ascii_lowercase() {
        'q' => Ok(Piece::Queen),
        'r' => Ok(Piece::Rook),
        'b' => Ok(Piece::Bishop),
        'n' => Ok(Piece::Knight),
        _ => Err(RejectedMove::BadPromotion(ch)),
    }
}

pub fn promotion_char(piece: Piece) -> char {
    match piece {
        Piece::Rook => 'r',
        Piece::Bishop => 'b',
        Piece::Knight => 'n',
        _ => 'q',
    }
}

/// Render remaining clock time as `M:SS`, rounding up to the next second
pub fn format_clock(ms: u64) -> String {
    let total_seconds = ms.div_ceil(1000);
    format!("{}:{:02}", total_seconds / 60, total_seconds % 60)
}

/// How urgently a clock should be displayed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockWarning {
    Normal,
    Low,
    VeryLow,
}

impl ClockWarning {
    pub fn for_remaining(ms: u64) -> Self {
        if ms <= 10_000 {
            ClockWarning::VeryLow
        } else if ms <= 30_000 {
            ClockWarning::Low
        } else {
            ClockWarning::Normal
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ClockWarning::Normal => "normal",
            ClockWarning::Low => "low-time",
            ClockWarning::VeryLow => "very-low-time",
        }
    }
}

/// Percent-encode a URI component (same unreserved set as JavaScript's
/// `encodeURIComponent`)
pub fn encode_uri_component(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'-'
            | b'_'
            | b'.'
            | b'!'
            | b'~'
            | b'*'
            | b'\''
            | b'('
            | b')' => out.push(byte as char),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
