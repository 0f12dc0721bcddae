//! Legal-move oracle used by the session.
//!
//! The session only talks to the [`RulesEngine`] trait; [`ChessRules`] is the
//! implementation backed by the `chess` crate, extended with the draw rules
//! that crate does not track on its own (repetition, fifty moves,
//! insufficient material).

use chess::{Board, BoardStatus, ChessMove, Color, MoveGen, Piece, Rank, Square, EMPTY};
use std::str::FromStr;

use crate::game::notation::{is_capture, movetext, san};
use crate::game::utils::promotion_char;

/// A destination reachable from a selected square
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveTarget {
    pub to: Square,
    pub capture: bool,
}

/// A move that was accepted and applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayedMove {
    pub chess_move: ChessMove,
    pub color: Color,
    pub san: String,
    pub capture: bool,
}

impl PlayedMove {
    /// Coordinate form, e.g. "e7e8q"
    pub fn uci(&self) -> String {
        let mut out = format!(
            "{}{}",
            self.chess_move.get_source(),
            self.chess_move.get_dest()
        );
        if let Some(piece) = self.chess_move.get_promotion() {
            out.push(promotion_char(piece));
        }
        out
    }
}

pub trait RulesEngine {
    /// Back to the standard starting position with no history
    fn reset(&mut self);

    fn legal_targets(&self, from: Square) -> Vec<MoveTarget>;

    /// Apply a move for the side to move. Returns `None` when illegal.
    fn apply_move(&mut self, from: Square, to: Square, promotion: Option<Piece>)
        -> Option<PlayedMove>;

    fn is_check(&self) -> bool;
    fn is_checkmate(&self) -> bool;
    fn is_stalemate(&self) -> bool;
    fn is_threefold_repetition(&self) -> bool;
    fn is_insufficient_material(&self) -> bool;
    fn is_fifty_move_rule(&self) -> bool;

    fn is_draw(&self) -> bool {
        self.is_stalemate()
            || self.is_threefold_repetition()
            || self.is_insufficient_material()
            || self.is_fifty_move_rule()
    }

    fn turn(&self) -> Color;
    fn move_history_length(&self) -> usize;

    /// PGN movetext of the game so far
    fn export_notation(&self) -> String;

    fn fen(&self) -> String;

    /// Square of the side-to-move king when it is in check
    fn king_in_check(&self) -> Option<Square>;
}

pub struct ChessRules {
    board: Board,
    history: Vec<PlayedMove>,
    // Position hashes since the last pawn move or capture, current included
    repetition: Vec<u64>,
    halfmove_clock: u32,
    // Side to move and move number of the position play started from
    start_turn: Color,
    start_fullmove: u32,
}

impl ChessRules {
    pub fn new() -> Self {
        Self::from_board(Board::default(), 0, 1)
    }

    /// Start from a FEN position instead of the initial array. The move
    /// counters are optional and default to `0 1`.
    pub fn from_fen(fen: &str) -> Option<Self> {
        let board = Board::from_str(fen).ok()?;
        let mut counters = fen.split_whitespace().skip(4);
        let halfmove_clock = match counters.next() {
            Some(field) => field.parse().ok()?,
            None => 0,
        };
        let fullmove = match counters.next() {
            Some(field) => field.parse::<u32>().ok()?.max(1),
            None => 1,
        };
        Some(Self::from_board(board, halfmove_clock, fullmove))
    }

    fn from_board(board: Board, halfmove_clock: u32, start_fullmove: u32) -> Self {
        Self {
            board,
            history: Vec::new(),
            repetition: vec![board.get_hash()],
            halfmove_clock,
            start_turn: board.side_to_move(),
            start_fullmove,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn history(&self) -> &[PlayedMove] {
        &self.history
    }

    fn fullmove_number(&self) -> u32 {
        let black_started = u32::from(self.start_turn == Color::Black);
        self.start_fullmove + (self.history.len() as u32 + black_started) / 2
    }

    fn promotion_rank(color: Color) -> Rank {
        match color {
            Color::White => Rank::Eighth,
            Color::Black => Rank::First,
        }
    }
}

impl Default for ChessRules {
    fn default() -> Self {
        Self::new()
    }
}

impl RulesEngine for ChessRules {
    fn reset(&mut self) {
        *self = Self::new();
    }

    fn legal_targets(&self, from: Square) -> Vec<MoveTarget> {
        let mut targets: Vec<MoveTarget> = Vec::new();
        for m in MoveGen::new_legal(&self.board) {
            // Under-promotions share a destination with the queen promotion
            if m.get_source() != from || targets.iter().any(|t| t.to == m.get_dest()) {
                continue;
            }
            targets.push(MoveTarget {
                to: m.get_dest(),
                capture: is_capture(&self.board, m),
            });
        }
        targets
    }

    fn apply_move(
        &mut self,
        from: Square,
        to: Square,
        promotion: Option<Piece>,
    ) -> Option<PlayedMove> {
        let piece = self.board.piece_on(from)?;
        let color = self.board.side_to_move();

        let promotes = piece == Piece::Pawn && to.get_rank() == Self::promotion_rank(color);
        let promotion = match (promotes, promotion) {
            (true, None) => Some(Piece::Queen),
            (true, hint) => hint,
            (false, _) => None,
        };

        let chess_move = ChessMove::new(from, to, promotion);
        if !self.board.legal(chess_move) {
            return None;
        }

        let capture = is_capture(&self.board, chess_move);
        let played = PlayedMove {
            chess_move,
            color,
            san: san(&self.board, chess_move),
            capture,
        };

        self.board = self.board.make_move_new(chess_move);
        if piece == Piece::Pawn || capture {
            self.halfmove_clock = 0;
            self.repetition.clear();
        } else {
            self.halfmove_clock += 1;
        }
        self.repetition.push(self.board.get_hash());
        self.history.push(played.clone());
        Some(played)
    }

    fn is_check(&self) -> bool {
        *self.board.checkers() != EMPTY
    }

    fn is_checkmate(&self) -> bool {
        self.board.status() == BoardStatus::Checkmate
    }

    fn is_stalemate(&self) -> bool {
        self.board.status() == BoardStatus::Stalemate
    }

    fn is_threefold_repetition(&self) -> bool {
        let current = self.board.get_hash();
        self.repetition.iter().filter(|&&h| h == current).count() >= 3
    }

    fn is_insufficient_material(&self) -> bool {
        has_insufficient_material(&self.board)
    }

    fn is_fifty_move_rule(&self) -> bool {
        self.halfmove_clock >= 100
    }

    fn turn(&self) -> Color {
        self.board.side_to_move()
    }

    fn move_history_length(&self) -> usize {
        self.history.len()
    }

    fn export_notation(&self) -> String {
        movetext(self.start_turn, self.history.iter().map(|m| m.san.as_str()))
    }

    fn fen(&self) -> String {
        // The board only knows placement, side, castling and en passant
        let board_fen = self.board.to_string();
        let fields: Vec<&str> = board_fen.split_whitespace().take(4).collect();
        format!(
            "{} {} {}",
            fields.join(" "),
            self.halfmove_clock,
            self.fullmove_number()
        )
    }

    fn king_in_check(&self) -> Option<Square> {
        if self.is_check() {
            Some(self.board.king_square(self.board.side_to_move()))
        } else {
            None
        }
    }
}

/// Check if the board has insufficient material for checkmate
pub fn has_insufficient_material(board: &Board) -> bool {
    let majors = *board.pieces(Piece::Pawn) | *board.pieces(Piece::Rook) | *board.pieces(Piece::Queen);
    if majors != EMPTY {
        return false;
    }

    let knights = *board.pieces(Piece::Knight);
    let bishops = *board.pieces(Piece::Bishop);
    let minors = knights | bishops;
    let white_minors = (minors & *board.color_combined(Color::White)).popcnt();
    let black_minors = (minors & *board.color_combined(Color::Black)).popcnt();

    // King vs King, or a lone minor piece
    if white_minors + black_minors <= 1 {
        return true;
    }
    // Otherwise only bishops, any number on either side, all on one shade
    if knights != EMPTY {
        return false;
    }
    let mut shades = bishops.map(|sq| (sq.get_rank().to_index() + sq.get_file().to_index()) % 2);
    let first = shades.next();
    shades.all(|shade| Some(shade) == first)
}
