//! Standard algebraic notation and PGN movetext.

use chess::{Board, BoardStatus, ChessMove, Color, MoveGen, Piece, Square, EMPTY};

fn file_char(square: Square) -> char {
    (b'a' + square.get_file().to_index() as u8) as char
}

fn rank_char(square: Square) -> char {
    (b'1' + square.get_rank().to_index() as u8) as char
}

fn piece_letter(piece: Piece) -> &'static str {
    match piece {
        Piece::King => "K",
        Piece::Queen => "Q",
        Piece::Rook => "R",
        Piece::Bishop => "B",
        Piece::Knight => "N",
        Piece::Pawn => "",
    }
}

/// True when `mv` takes a piece on `board`, including en passant.
pub fn is_capture(board: &Board, mv: ChessMove) -> bool {
    if board.piece_on(mv.get_dest()).is_some() {
        return true;
    }
    board.piece_on(mv.get_source()) == Some(Piece::Pawn)
        && mv.get_source().get_file() != mv.get_dest().get_file()
}

/// Render a legal move in SAN. `board` is the position before the move.
pub fn san(board: &Board, mv: ChessMove) -> String {
    let source = mv.get_source();
    let dest = mv.get_dest();
    let piece = board.piece_on(source).unwrap_or(Piece::Pawn);

    let mut out = String::new();
    let file_distance =
        source.get_file().to_index() as i32 - dest.get_file().to_index() as i32;

    if piece == Piece::King && file_distance.abs() == 2 {
        out.push_str(if file_distance < 0 { "O-O" } else { "O-O-O" });
    } else {
        let capture = is_capture(board, mv);
        out.push_str(piece_letter(piece));

        if piece == Piece::Pawn {
            if capture {
                out.push(file_char(source));
            }
        } else {
            // Disambiguate against other pieces of the same kind reaching dest
            let rivals: Vec<Square> = MoveGen::new_legal(board)
                .filter(|m| {
                    m.get_dest() == dest
                        && m.get_source() != source
                        && board.piece_on(m.get_source()) == Some(piece)
                })
                .map(|m| m.get_source())
                .collect();
            if !rivals.is_empty() {
                let same_file = rivals.iter().any(|s| s.get_file() == source.get_file());
                let same_rank = rivals.iter().any(|s| s.get_rank() == source.get_rank());
                if !same_file {
                    out.push(file_char(source));
                } else if !same_rank {
                    out.push(rank_char(source));
                } else {
                    out.push(file_char(source));
                    out.push(rank_char(source));
                }
            }
        }

        if capture {
            out.push('x');
        }
        out.push(file_char(dest));
        out.push(rank_char(dest));

        if let Some(promotion) = mv.get_promotion() {
            out.push('=');
            out.push_str(piece_letter(promotion));
        }
    }

    let after = board.make_move_new(mv);
    if after.status() == BoardStatus::Checkmate {
        out.push('#');
    } else if *after.checkers() != EMPTY {
        out.push('+');
    }
    out
}

/// Numbered movetext ("1. e4 e5 2. Nf3") for moves played from a position
/// where `first_mover` was to move.
pub fn movetext<'a, I>(first_mover: Color, sans: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out = String::new();
    let mut number = 1;
    let mut to_move = first_mover;
    for (index, san) in sans.into_iter().enumerate() {
        if to_move == Color::White {
            if index > 0 {
                out.push(' ');
            }
            out.push_str(&format!("{}. {}", number, san));
        } else {
            if index == 0 {
                out.push_str(&format!("{}... {}", number, san));
            } else {
                out.push(' ');
                out.push_str(san);
            }
            number += 1;
        }
        to_move = !to_move;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn mv(text: &str) -> ChessMove {
        ChessMove::from_str(text).unwrap()
    }

    #[test]
    fn pawn_and_piece_moves() {
        let board = Board::default();
        assert_eq!(san(&board, mv("e2e4")), "e4");
        assert_eq!(san(&board, mv("g1f3")), "Nf3");
    }

    #[test]
    fn captures_and_checks() {
        let board =
            Board::from_str("rnbqkbnr/ppp2ppp/8/3pp3/4P3/5Q2/PPPP1PPP/RNB1KBNR w KQkq - 0 3")
                .unwrap();
        assert_eq!(san(&board, mv("e4d5")), "exd5");
        assert_eq!(san(&board, mv("f3f7")), "Qxf7+");
    }

    #[test]
    fn castling_and_mate() {
        let board = Board::from_str("4k3/8/8/8/8/8/8/4K2R w K - 0 1").unwrap();
        assert_eq!(san(&board, mv("e1g1")), "O-O");

        let board = Board::from_str("6k1/5ppp/8/8/8/8/8/R5K1 w - - 0 1").unwrap();
        assert_eq!(san(&board, mv("a1a8")), "Ra8#");
    }

    #[test]
    fn knights_are_disambiguated_by_file() {
        let board = Board::from_str("4k3/8/8/8/8/8/8/1N2KN2 w - - 0 1").unwrap();
        assert_eq!(san(&board, mv("b1d2")), "Nbd2");
        assert_eq!(san(&board, mv("f1g3")), "Ng3");
    }

    #[test]
    fn promotion_suffix() {
        let board = Board::from_str("k7/4P3/8/8/8/8/8/4K3 w - - 0 1").unwrap();
        assert_eq!(san(&board, mv("e7e8q")), "e8=Q+");
    }

    #[test]
    fn movetext_numbering() {
        assert_eq!(
            movetext(Color::White, ["e4", "e5", "Nf3"]),
            "1. e4 e5 2. Nf3"
        );
        assert_eq!(movetext(Color::Black, ["e5", "Nf3"]), "1... e5 2. Nf3");
        assert_eq!(movetext(Color::White, Vec::<&str>::new()), "");
    }
}
