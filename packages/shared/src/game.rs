//! Board model and the basic checkers rules.
//!
//! The rules are a deterministic function of `(board, player, move)`: they
//! never touch versions, persistence or the network. Coordinates use row 0 as
//! the top of the board. Black starts on rows 0-2 and moves down, red starts on
//! rows 5-7, moves up and plays first.
//!
//! Captures are not mandatory. After a capture, if the same piece can capture
//! again, the turn stays with the mover so a multi-jump is played as several
//! consecutive moves.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const BOARD_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Player {
    Red,
    Black,
}

impl Player {
    pub fn opponent(self) -> Self {
        match self {
            Player::Red => Player::Black,
            Player::Black => Player::Red,
        }
    }

    /// Row direction of forward movement for men of this color.
    fn forward(self) -> i8 {
        match self {
            Player::Red => -1,
            Player::Black => 1,
        }
    }

    /// Row on which men of this color are crowned.
    fn crown_row(self) -> u8 {
        match self {
            Player::Red => 0,
            Player::Black => (BOARD_SIZE - 1) as u8,
        }
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Player::Red => write!(f, "red"),
            Player::Black => write!(f, "black"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Piece {
    pub color: Player,
    #[serde(default)]
    pub king: bool,
}

impl Piece {
    pub fn man(color: Player) -> Self {
        Self { color, king: false }
    }

    pub fn king(color: Player) -> Self {
        Self { color, king: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawPosition")]
pub struct Position {
    pub row: u8,
    pub col: u8,
}

/// Unchecked wire form of [`Position`].
#[derive(Deserialize)]
struct RawPosition {
    row: u8,
    col: u8,
}

impl TryFrom<RawPosition> for Position {
    type Error = RuleError;

    fn try_from(raw: RawPosition) -> Result<Self, Self::Error> {
        let pos = Position::new(raw.row, raw.col);
        if pos.in_bounds() {
            Ok(pos)
        } else {
            Err(RuleError::OutOfBounds(pos))
        }
    }
}

impl Position {
    pub fn new(row: u8, col: u8) -> Self {
        Self { row, col }
    }

    fn offset(self, dr: i8, dc: i8) -> Option<Position> {
        let row = self.row as i8 + dr;
        let col = self.col as i8 + dc;
        if (0..BOARD_SIZE as i8).contains(&row) && (0..BOARD_SIZE as i8).contains(&col) {
            Some(Position::new(row as u8, col as u8))
        } else {
            None
        }
    }

    fn in_bounds(self) -> bool {
        (self.row as usize) < BOARD_SIZE && (self.col as usize) < BOARD_SIZE
    }
}

/// Algebraic notation: file `a`-`h` left to right, rank `1`-`8` bottom to top.
impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 盤外の座標は記法に直せない
        if !self.in_bounds() {
            return write!(f, "(row {}, col {})", self.row, self.col);
        }
        let file = (b'a' + self.col) as char;
        let rank = BOARD_SIZE as u8 - self.row;
        write!(f, "{}{}", file, rank)
    }
}

impl FromStr for Position {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.trim().as_bytes();
        if bytes.len() != 2 {
            return Err(RuleError::InvalidNotation(s.to_string()));
        }
        let file = bytes[0].to_ascii_lowercase();
        let rank = bytes[1];
        if !(b'a'..=b'h').contains(&file) || !(b'1'..=b'8').contains(&rank) {
            return Err(RuleError::InvalidNotation(s.to_string()));
        }
        Ok(Position::new(
            BOARD_SIZE as u8 - (rank - b'0'),
            file - b'a',
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Move {
    pub from: Position,
    pub to: Position,
}

impl Move {
    pub fn new(from: Position, to: Position) -> Self {
        Self { from, to }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.from, self.to)
    }
}

/// Parses `c3-d4` or `c3 d4`.
impl FromStr for Move {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s
            .split(|c: char| c == '-' || c.is_whitespace())
            .filter(|p| !p.is_empty());
        match (parts.next(), parts.next(), parts.next()) {
            (Some(from), Some(to), None) => Ok(Move::new(from.parse()?, to.parse()?)),
            _ => Err(RuleError::InvalidNotation(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("Invalid square notation: '{0}'")]
    InvalidNotation(String),
    #[error("Square {0} is off the board")]
    OutOfBounds(Position),
    #[error("No piece on {0}")]
    EmptySquare(Position),
    #[error("Piece on {0} does not belong to {1}")]
    NotYourPiece(Position, Player),
    #[error("Destination {0} is occupied")]
    Occupied(Position),
    #[error("Move {0} is not a legal diagonal step or jump")]
    IllegalMove(Move),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Board {
    squares: [[Option<Piece>; BOARD_SIZE]; BOARD_SIZE],
}

impl Default for Board {
    fn default() -> Self {
        Self::initial()
    }
}

impl Board {
    pub fn empty() -> Self {
        Self {
            squares: [[None; BOARD_SIZE]; BOARD_SIZE],
        }
    }

    /// Standard starting position.
    pub fn initial() -> Self {
        let mut board = Self::empty();
        for row in 0..BOARD_SIZE {
            for col in 0..BOARD_SIZE {
                if (row + col) % 2 == 0 {
                    continue;
                }
                let piece = match row {
                    0..=2 => Some(Piece::man(Player::Black)),
                    5..=7 => Some(Piece::man(Player::Red)),
                    _ => None,
                };
                board.squares[row][col] = piece;
            }
        }
        board
    }

    pub fn get(&self, pos: Position) -> Option<Piece> {
        if !pos.in_bounds() {
            return None;
        }
        self.squares[pos.row as usize][pos.col as usize]
    }

    pub fn set(&mut self, pos: Position, piece: Option<Piece>) {
        if pos.in_bounds() {
            self.squares[pos.row as usize][pos.col as usize] = piece;
        }
    }

    pub fn count(&self, color: Player) -> usize {
        self.squares
            .iter()
            .flatten()
            .filter(|p| p.is_some_and(|p| p.color == color))
            .count()
    }

    fn positions_of(&self, color: Player) -> impl Iterator<Item = Position> + '_ {
        (0..BOARD_SIZE as u8).flat_map(move |row| {
            (0..BOARD_SIZE as u8).filter_map(move |col| {
                let pos = Position::new(row, col);
                self.get(pos)
                    .filter(|p| p.color == color)
                    .map(|_| pos)
            })
        })
    }

    fn directions(piece: Piece) -> Vec<(i8, i8)> {
        if piece.king {
            vec![(-1, -1), (-1, 1), (1, -1), (1, 1)]
        } else {
            let f = piece.color.forward();
            vec![(f, -1), (f, 1)]
        }
    }

    fn can_capture_from(&self, pos: Position) -> bool {
        let Some(piece) = self.get(pos) else {
            return false;
        };
        Self::directions(piece).into_iter().any(|(dr, dc)| {
            match (pos.offset(dr, dc), pos.offset(dr * 2, dc * 2)) {
                (Some(over), Some(land)) => {
                    self.get(over).is_some_and(|p| p.color != piece.color)
                        && self.get(land).is_none()
                }
                _ => false,
            }
        })
    }

    /// Whether `color` has at least one legal step or jump.
    pub fn has_legal_move(&self, color: Player) -> bool {
        self.positions_of(color).any(|pos| {
            let Some(piece) = self.get(pos) else {
                return false;
            };
            self.can_capture_from(pos)
                || Self::directions(piece)
                    .into_iter()
                    .any(|(dr, dc)| pos.offset(dr, dc).is_some_and(|to| self.get(to).is_none()))
        })
    }

    /// Render as eight text rows, `r`/`b` for men and `R`/`B` for kings.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for row in 0..BOARD_SIZE {
            out.push_str(&format!("{} ", BOARD_SIZE - row));
            for col in 0..BOARD_SIZE {
                let c = match self.squares[row][col] {
                    Some(Piece { color: Player::Red, king: false }) => 'r',
                    Some(Piece { color: Player::Red, king: true }) => 'R',
                    Some(Piece { color: Player::Black, king: false }) => 'b',
                    Some(Piece { color: Player::Black, king: true }) => 'B',
                    None if (row + col) % 2 == 1 => '.',
                    None => ' ',
                };
                out.push(c);
                out.push(' ');
            }
            out.push('\n');
        }
        out.push_str("  a b c d e f g h\n");
        out
    }
}

/// Result of applying one move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    pub board: Board,
    pub next_player: Player,
    pub captured: Option<Position>,
    pub crowned: bool,
    pub winner: Option<Player>,
}

/// Apply `mv` for `player` on `board`.
pub fn apply_move(board: &Board, player: Player, mv: Move) -> Result<MoveOutcome, RuleError> {
    if !mv.from.in_bounds() {
        return Err(RuleError::OutOfBounds(mv.from));
    }
    if !mv.to.in_bounds() {
        return Err(RuleError::OutOfBounds(mv.to));
    }
    let piece = board.get(mv.from).ok_or(RuleError::EmptySquare(mv.from))?;
    if piece.color != player {
        return Err(RuleError::NotYourPiece(mv.from, player));
    }
    if board.get(mv.to).is_some() {
        return Err(RuleError::Occupied(mv.to));
    }

    let dr = mv.to.row as i8 - mv.from.row as i8;
    let dc = mv.to.col as i8 - mv.from.col as i8;
    let allowed = Board::directions(piece);

    let captured = match (dr.abs(), dc.abs()) {
        (1, 1) if allowed.contains(&(dr, dc)) => None,
        (2, 2) if allowed.contains(&(dr / 2, dc / 2)) => {
            let over = mv
                .from
                .offset(dr / 2, dc / 2)
                .ok_or(RuleError::IllegalMove(mv))?;
            match board.get(over) {
                Some(p) if p.color != player => Some(over),
                _ => return Err(RuleError::IllegalMove(mv)),
            }
        }
        _ => return Err(RuleError::IllegalMove(mv)),
    };

    let mut next = board.clone();
    next.set(mv.from, None);
    if let Some(over) = captured {
        next.set(over, None);
    }
    let crowned = !piece.king && mv.to.row == player.crown_row();
    let landed = Piece {
        color: player,
        king: piece.king || crowned,
    };
    next.set(mv.to, Some(landed));

    let continues_jump = captured.is_some() && !crowned && next.can_capture_from(mv.to);
    let next_player = if continues_jump {
        player
    } else {
        player.opponent()
    };

    let opponent = player.opponent();
    let winner = (next.count(opponent) == 0 || !next.has_legal_move(opponent)).then_some(player);

    Ok(MoveOutcome {
        board: next,
        next_player,
        captured,
        crowned,
        winner,
    })
}
