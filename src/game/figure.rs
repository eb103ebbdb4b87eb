//! Falling figures: the seven shapes and their movement rules

use rand::Rng;

use crate::ws::protocol::FigureInfo;

use super::board::{Board, CellState};

/// Cell offsets of a shape in orientation 0, `y` pointing down
type Shape = [(i32, i32); 4];

/// Piece kinds, numbered as on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum FigureKind {
    Square = 1,
    Line = 2,
    S = 3,
    Z = 4,
    RightAngle = 5,
    LeftAngle = 6,
    Triangle = 7,
}

impl FigureKind {
    pub const ALL: [FigureKind; 7] = [
        FigureKind::Square,
        FigureKind::Line,
        FigureKind::S,
        FigureKind::Z,
        FigureKind::RightAngle,
        FigureKind::LeftAngle,
        FigureKind::Triangle,
    ];

    pub fn from_i32(value: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| *k as i32 == value)
    }

    /// Uniformly random kind
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }

    pub fn shape(self) -> Shape {
        match self {
            FigureKind::Square => [(-1, 0), (0, 0), (-1, 1), (0, 1)],
            FigureKind::Line => [(-2, 0), (-1, 0), (0, 0), (1, 0)],
            FigureKind::S => [(0, 0), (1, 0), (-1, 1), (0, 1)],
            FigureKind::Z => [(-1, 0), (0, 0), (0, 1), (1, 1)],
            FigureKind::RightAngle => [(-1, 0), (0, 0), (1, 0), (1, 1)],
            FigureKind::LeftAngle => [(-1, 0), (0, 0), (1, 0), (-1, 1)],
            FigureKind::Triangle => [(-1, 0), (0, 0), (1, 0), (0, 1)],
        }
    }

    /// Number of distinct orientations
    pub fn max_orientation(self) -> i32 {
        match self {
            FigureKind::Square => 1,
            FigureKind::Line | FigureKind::S | FigureKind::Z => 2,
            FigureKind::RightAngle | FigureKind::LeftAngle | FigureKind::Triangle => 4,
        }
    }
}

/// Rotate an orientation-0 offset into `orientation` (quarter turns)
pub fn rotate_offset((dx, dy): (i32, i32), orientation: i32) -> (i32, i32) {
    match orientation.rem_euclid(4) {
        0 => (dx, dy),
        1 => (-dy, dx),
        2 => (-dx, -dy),
        _ => (dy, -dx),
    }
}

/// A player's piece.
///
/// The figure does not hold on to the board; every operation that reads or
/// paints cells takes it as an argument. While attached, the figure's four
/// cells are painted `Occupied` on that board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Figure {
    kind: FigureKind,
    orientation: i32,
    x: i32,
    y: i32,
    color: u32,
    attached: bool,
}

impl Figure {
    pub fn new(kind: FigureKind, color: u32) -> Self {
        Self {
            kind,
            orientation: 0,
            x: 0,
            y: 0,
            color,
            attached: false,
        }
    }

    pub fn kind(&self) -> FigureKind {
        self.kind
    }

    pub fn orientation(&self) -> i32 {
        self.orientation
    }

    pub fn position(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    pub fn color(&self) -> u32 {
        self.color
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Absolute cells of this figure if it stood at `(x, y, orientation)`
    pub fn cells_at(&self, x: i32, y: i32, orientation: i32) -> [(i32, i32); 4] {
        self.kind.shape().map(|offset| {
            let (dx, dy) = rotate_offset(offset, orientation);
            (x + dx, y + dy)
        })
    }

    /// Current absolute cells
    pub fn cells(&self) -> [(i32, i32); 4] {
        self.cells_at(self.x, self.y, self.orientation)
    }

    fn contains(&self, x: i32, y: i32) -> bool {
        self.cells().contains(&(x, y))
    }

    /// Whether the figure fits at `(x, y, orientation)`.
    ///
    /// Cells the figure covers right now count as free, so a figure never
    /// blocks its own move.
    pub fn can_place(&self, board: &Board, x: i32, y: i32, orientation: i32) -> bool {
        self.cells_at(x, y, orientation).iter().all(|&(cx, cy)| {
            cx >= 0
                && cx < board.width()
                && cy < board.height()
                && ((self.attached && self.contains(cx, cy)) || board.is_empty_at(cx, cy))
        })
    }

    pub fn can_move_left(&self, board: &Board) -> bool {
        self.attached && self.can_place(board, self.x - 1, self.y, self.orientation)
    }

    pub fn can_move_right(&self, board: &Board) -> bool {
        self.attached && self.can_place(board, self.x + 1, self.y, self.orientation)
    }

    pub fn can_move_down(&self, board: &Board) -> bool {
        self.attached && self.can_place(board, self.x, self.y + 1, self.orientation)
    }

    pub fn can_rotate(&self, board: &Board) -> bool {
        self.attached
            && self.kind.max_orientation() > 1
            && self.can_place(board, self.x, self.y, self.next_orientation())
    }

    fn next_orientation(&self) -> i32 {
        (self.orientation + 1) % self.kind.max_orientation()
    }

    fn paint(&self, board: &mut Board, state: CellState) {
        for (x, y) in self.cells() {
            board.set_cell_state(x, y, state);
        }
    }

    fn shift(&mut self, board: &mut Board, dx: i32, dy: i32) {
        self.paint(board, CellState::Empty);
        self.x += dx;
        self.y += dy;
        self.paint(board, CellState::Occupied);
    }

    /// Shift one column left. Legality is the caller's business.
    pub fn move_left(&mut self, board: &mut Board) {
        self.shift(board, -1, 0);
    }

    pub fn move_right(&mut self, board: &mut Board) {
        self.shift(board, 1, 0);
    }

    pub fn move_down(&mut self, board: &mut Board) {
        self.shift(board, 0, 1);
    }

    /// Turn a quarter clockwise if the new orientation fits; no-op otherwise
    pub fn rotate(&mut self, board: &mut Board) {
        if !self.can_rotate(board) {
            return;
        }
        self.paint(board, CellState::Empty);
        self.orientation = self.next_orientation();
        self.paint(board, CellState::Occupied);
    }

    /// Landed: some cell directly below the figure is a landed cell or the
    /// floor. Another player's live figure underneath does not count.
    pub fn is_resting(&self, board: &Board) -> bool {
        self.attached
            && self.cells().iter().any(|&(x, y)| {
                !self.contains(x, y + 1) && board.cell_state(x, y + 1) == CellState::Fixed
            })
    }

    /// Drop straight down as far as possible; returns the rows travelled
    pub fn drop_down(&mut self, board: &mut Board) -> i32 {
        let mut rows = 0;
        while self.can_move_down(board) {
            self.move_down(board);
            rows += 1;
        }
        rows
    }

    /// Where `attach` would put the figure, without painting anything.
    ///
    /// Starts at the row that puts the topmost cell on row 0 and scans left
    /// from `column`, then right. When no column fits, it tries one row
    /// higher, so a spawn is always found; a crowded board pushes it above
    /// the visible area.
    pub fn spawn_position(&self, board: &Board, column: i32) -> (i32, i32) {
        let probe = Figure {
            attached: false,
            ..self.clone()
        };
        let top = probe
            .kind
            .shape()
            .iter()
            .map(|o| rotate_offset(*o, probe.orientation).1)
            .min()
            .unwrap_or(0);
        let column = column.clamp(0, board.width() - 1);

        let mut y = -top;
        loop {
            let fits = |x: i32| probe.can_place(board, x, y, probe.orientation);
            if let Some(x) = (0..=column).rev().find(|x| fits(*x)) {
                return (x, y);
            }
            if let Some(x) = (column..board.width()).find(|x| fits(*x)) {
                return (x, y);
            }
            y -= 1;
        }
    }

    /// Place the figure on the board near `column` and paint it
    pub fn attach(&mut self, board: &mut Board, column: i32) {
        if self.attached {
            self.paint(board, CellState::Empty);
            self.attached = false;
        }
        let (x, y) = self.spawn_position(board, column);
        self.x = x;
        self.y = y;
        self.attached = true;
        self.paint(board, CellState::Occupied);
    }

    /// All four cells are inside the visible board
    pub fn is_all_visible(&self) -> bool {
        self.attached && self.cells().iter().all(|&(_, y)| y >= 0)
    }

    /// Land the figure: its cells become `Fixed` and it detaches
    pub fn fix(&mut self, board: &mut Board) {
        if !self.attached {
            return;
        }
        self.paint(board, CellState::Fixed);
        self.attached = false;
    }

    /// Take the figure off the board, leaving empty cells behind
    pub fn clear(&mut self, board: &mut Board) {
        if !self.attached {
            return;
        }
        self.paint(board, CellState::Empty);
        self.attached = false;
    }

    /// Wire view
    pub fn info(&self) -> FigureInfo {
        FigureInfo {
            kind: self.kind as i32,
            x: self.x,
            y: self.y,
            rotation: self.orientation,
            color: self.color,
        }
    }

    /// The wire view names this figure in its current state
    pub fn matches(&self, info: &FigureInfo) -> bool {
        self.info() == *info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::board::BOARD_HEIGHT;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    const RED: u32 = 0xFFFF_0000;

    fn attached(board: &mut Board, kind: FigureKind, column: i32) -> Figure {
        let mut figure = Figure::new(kind, RED);
        figure.attach(board, column);
        figure
    }

    #[test]
    fn kinds_round_trip_through_ids() {
        for (i, kind) in FigureKind::ALL.iter().enumerate() {
            assert_eq!(*kind as i32, i as i32 + 1);
            assert_eq!(FigureKind::from_i32(i as i32 + 1), Some(*kind));
        }
        assert_eq!(FigureKind::from_i32(0), None);
        assert_eq!(FigureKind::from_i32(8), None);
    }

    #[test]
    fn random_kind_covers_all_shapes() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..500 {
            seen.insert(FigureKind::random(&mut rng));
        }
        assert_eq!(seen.len(), 7);
    }

    #[test]
    fn rotation_transform() {
        assert_eq!(rotate_offset((1, 2), 0), (1, 2));
        assert_eq!(rotate_offset((1, 2), 1), (-2, 1));
        assert_eq!(rotate_offset((1, 2), 2), (-1, -2));
        assert_eq!(rotate_offset((1, 2), 3), (2, -1));
    }

    #[test]
    fn attach_paints_four_occupied_cells() {
        let mut board = Board::new(8, BOARD_HEIGHT);
        let figure = attached(&mut board, FigureKind::Triangle, 3);
        assert!(figure.is_attached());
        assert_eq!(figure.position(), (3, 0));
        assert_eq!(board.count(CellState::Occupied), 4);
        assert!(figure.is_all_visible());
    }

    #[test]
    fn attach_scans_left_before_right() {
        let mut board = Board::new(12, BOARD_HEIGHT);
        // block column 5 and 6 on row 0 and 1
        for y in 0..2 {
            board.set_cell_state(5, y, CellState::Fixed);
            board.set_cell_state(6, y, CellState::Fixed);
        }
        let figure = attached(&mut board, FigureKind::Square, 6);
        // square spans x-1..=x, so x = 4 is the first fit scanning left
        assert_eq!(figure.position(), (4, 0));

        let mut board = Board::new(12, BOARD_HEIGHT);
        for x in 0..7 {
            board.set_cell_state(x, 0, CellState::Fixed);
        }
        let figure = attached(&mut board, FigureKind::Square, 3);
        assert_eq!(figure.position(), (8, 0));
    }

    #[test]
    fn attach_climbs_above_a_full_top_row() {
        let mut board = Board::new(8, BOARD_HEIGHT);
        for x in 0..8 {
            board.set_cell_state(x, 0, CellState::Fixed);
        }
        let figure = attached(&mut board, FigureKind::Line, 3);
        assert_eq!(figure.position(), (3, -1));
        assert!(!figure.is_all_visible());
        // cells above the board are not stored
        assert_eq!(board.count(CellState::Occupied), 0);
    }

    #[test]
    fn spawn_position_does_not_paint() {
        let board = Board::new(8, BOARD_HEIGHT);
        let figure = Figure::new(FigureKind::S, RED);
        assert_eq!(figure.spawn_position(&board, 3), (3, 0));
        assert_eq!(board.count(CellState::Empty), 8 * BOARD_HEIGHT as usize);
    }

    #[test]
    fn walls_block_sideways_moves() {
        let mut board = Board::new(8, BOARD_HEIGHT);
        let mut figure = attached(&mut board, FigureKind::Line, 2);
        assert_eq!(figure.position(), (2, 0));
        assert!(!figure.can_move_left(&board));
        assert!(figure.can_move_right(&board));
        figure.move_right(&mut board);
        assert_eq!(figure.position(), (3, 0));
        assert_eq!(board.cell_state(0, 0), CellState::Empty);
        assert_eq!(board.cell_state(4, 0), CellState::Occupied);
    }

    #[test]
    fn can_place_rejects_every_edge() {
        let board = Board::new(8, BOARD_HEIGHT);
        let line = Figure::new(FigureKind::Line, RED);
        // horizontal line covers x - 2 ..= x + 1
        assert!(line.can_place(&board, 2, 0, 0));
        assert!(line.can_place(&board, 6, BOARD_HEIGHT - 1, 0));
        assert!(!line.can_place(&board, 1, 5, 0));
        assert!(!line.can_place(&board, 7, 5, 0));
        assert!(!line.can_place(&board, 4, BOARD_HEIGHT, 0));
        // vertical line covers y - 2 ..= y + 1
        assert!(!line.can_place(&board, 4, BOARD_HEIGHT - 1, 1));
        assert!(line.can_place(&board, 4, BOARD_HEIGHT - 2, 1));
        // rows above the board are open
        assert!(line.can_place(&board, 4, -3, 0));
    }

    #[test]
    fn attach_avoids_a_live_figure() {
        let mut board = Board::new(8, BOARD_HEIGHT);
        let first = attached(&mut board, FigureKind::Square, 3);
        let second = attached(&mut board, FigureKind::Square, 3);

        assert_eq!(first.position(), (3, 0));
        assert_eq!(second.position(), (1, 0));
        for cell in second.cells() {
            assert!(!first.cells().contains(&cell));
        }
        assert_eq!(board.count(CellState::Occupied), 8);
    }

    #[test]
    fn square_never_rotates() {
        let mut board = Board::new(8, BOARD_HEIGHT);
        let mut figure = attached(&mut board, FigureKind::Square, 3);
        assert!(!figure.can_rotate(&board));
        figure.rotate(&mut board);
        assert_eq!(figure.orientation(), 0);
    }

    #[test]
    fn blocked_rotation_is_a_no_op() {
        let mut board = Board::new(8, BOARD_HEIGHT);
        let mut figure = attached(&mut board, FigureKind::Line, 3);
        figure.move_down(&mut board);
        figure.move_down(&mut board);
        // vertical line at x = 3 needs rows 0..=3 (dy from -2 to 1)
        board.set_cell_state(3, 3, CellState::Fixed);
        let before = figure.clone();
        figure.rotate(&mut board);
        assert_eq!(figure, before);

        board.set_cell_state(3, 3, CellState::Empty);
        figure.rotate(&mut board);
        assert_eq!(figure.orientation(), 1);
        assert_eq!(board.count(CellState::Occupied), 4);
    }

    #[test]
    fn line_lands_on_the_floor() {
        let mut board = Board::new(12, BOARD_HEIGHT);
        let mut figure = attached(&mut board, FigureKind::Line, 5);
        assert_eq!(figure.position(), (5, 0));
        assert!(!figure.is_resting(&board));

        let rows = figure.drop_down(&mut board);
        assert_eq!(rows, BOARD_HEIGHT - 1);
        assert!(figure.is_resting(&board));
        assert!(!figure.can_move_down(&board));

        figure.fix(&mut board);
        assert!(!figure.is_attached());
        for x in 3..=6 {
            assert_eq!(board.cell_state(x, BOARD_HEIGHT - 1), CellState::Fixed);
        }
        assert_eq!(board.count(CellState::Fixed), 4);
        assert_eq!(board.count(CellState::Occupied), 0);
    }

    #[test]
    fn live_neighbour_blocks_without_resting() {
        let mut board = Board::new(12, BOARD_HEIGHT);
        let mut lower = attached(&mut board, FigureKind::Line, 5);
        lower.move_down(&mut board);
        lower.move_down(&mut board);
        let upper = attached(&mut board, FigureKind::Line, 5);
        assert_eq!(upper.position(), (5, 0));
        // row 1 free, so one step is still possible
        assert!(upper.can_move_down(&board));

        let mut upper = upper;
        upper.move_down(&mut board);
        assert!(!upper.can_move_down(&board));
        assert!(!upper.is_resting(&board));
    }

    #[test]
    fn clear_removes_the_figure() {
        let mut board = Board::new(8, BOARD_HEIGHT);
        let mut figure = attached(&mut board, FigureKind::Z, 3);
        figure.clear(&mut board);
        assert!(!figure.is_attached());
        assert_eq!(board.count(CellState::Empty), 8 * BOARD_HEIGHT as usize);
        // detached figures cannot move
        assert!(!figure.can_move_down(&board));
    }

    #[test]
    fn info_reports_wire_fields() {
        let mut board = Board::new(8, BOARD_HEIGHT);
        let figure = attached(&mut board, FigureKind::RightAngle, 3);
        let info = figure.info();
        assert_eq!(info.kind, 5);
        assert_eq!((info.x, info.y, info.rotation), (3, 0, 0));
        assert_eq!(info.color, RED);
        assert!(figure.matches(&info));
        assert!(!figure.matches(&FigureInfo { x: 4, ..info }));
    }
}
