//! Game Session: the single orchestration point for a clocked game.
//!
//! Every mutation of the position, the clocks and the hint budgets goes
//! through a `&mut GameSession`, so moves, clock ticks and engine output
//! are serialised by construction.

use chess::{Color, Piece};
use log::{info, warn};
use serde::Serialize;

use crate::engine::EngineProcess;
use crate::error::{EngineError, RejectedMove};
use crate::game::archive::{ArchiveStore, ArchivedGame};
use crate::game::broker::{EngineBroker, EngineEvent, EngineTicket, RequestState, UciMove};
use crate::game::clock::{ClockController, TimeSource};
use crate::game::rules::{ChessRules, MoveTarget, RulesEngine};
use crate::game::utils::{
    color_name, color_to_string, format_clock, parse_promotion, parse_square, ClockWarning,
};
use crate::models::config::GameOptions;
use crate::models::game_state::{EndReason, GameOutcome, GameState, SessionPhase, ABANDONED};

/// Engine-assisted moves each side may still request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveBudget {
    remaining: [u8; 2],
}

impl MoveBudget {
    pub fn new(remaining: [u8; 2]) -> Self {
        Self { remaining }
    }

    pub fn remaining(&self, side: Color) -> u8 {
        self.remaining[side.to_index()]
    }

    fn consume(&mut self, side: Color) {
        let left = &mut self.remaining[side.to_index()];
        *left = left.saturating_sub(1);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveSource {
    Human,
    Engine,
}

/// A move the session accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMove {
    pub side: Color,
    pub source: MoveSource,
    pub san: String,
    pub uci: String,
    /// Set when this move ended the game
    pub outcome: Option<GameOutcome>,
}

/// What came of a line of engine output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineUpdate {
    Progress { side: Color, percent: u8 },
    Moved(AppliedMove),
    Rejected(RejectedMove),
    Failed(String),
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ThinkingSnapshot {
    pub side: String,
    pub progress: u8,
}

/// Everything the UI renders
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub fen: String,
    pub pgn: String,
    pub turn: String,
    pub move_count: usize,
    pub white_time_ms: u64,
    pub black_time_ms: u64,
    pub white_clock: String,
    pub black_clock: String,
    pub white_clock_warning: &'static str,
    pub black_clock_warning: &'static str,
    pub clock_running: bool,
    pub white_engine_moves: u8,
    pub black_engine_moves: u8,
    pub engine_ready: bool,
    pub white_engine_enabled: bool,
    pub black_engine_enabled: bool,
    pub thinking: Option<ThinkingSnapshot>,
    pub check_square: Option<String>,
    pub result: Option<String>,
}

pub struct GameSession<R: RulesEngine = ChessRules> {
    game: GameState<R>,
    clock: ClockController,
    budget: MoveBudget,
    broker: EngineBroker,
    archive: ArchiveStore,
    options: GameOptions,
    pending_options: GameOptions,
    engine_depth: u8,
}

impl GameSession<ChessRules> {
    pub fn standard(options: GameOptions, time: Box<dyn TimeSource>, archive: ArchiveStore) -> Self {
        Self::new(ChessRules::new(), options, time, archive)
    }
}

impl<R: RulesEngine> GameSession<R> {
    pub const DEFAULT_ENGINE_DEPTH: u8 = 20;

    pub fn new(
        mut position: R,
        options: GameOptions,
        time: Box<dyn TimeSource>,
        archive: ArchiveStore,
    ) -> Self {
        position.reset();
        Self::from_position(position, options, time, archive)
    }

    /// Play on from `position` as given. A restart still returns to the
    /// initial array.
    pub fn from_position(
        position: R,
        options: GameOptions,
        time: Box<dyn TimeSource>,
        archive: ArchiveStore,
    ) -> Self {
        let options = options.clamped();
        Self {
            game: GameState::new(position),
            clock: ClockController::new(options.initial_ms(), options.increment_ms(), time),
            budget: MoveBudget::new(options.engine_moves()),
            broker: EngineBroker::new(),
            archive,
            options,
            pending_options: options,
            engine_depth: Self::DEFAULT_ENGINE_DEPTH,
        }
    }

    pub fn with_engine_depth(mut self, depth: u8) -> Self {
        self.engine_depth = depth.max(1);
        self
    }

    // ---- queries -------------------------------------------------------

    pub fn phase(&self) -> SessionPhase {
        self.game.phase()
    }

    pub fn turn(&self) -> Color {
        self.game.turn()
    }

    pub fn move_count(&self) -> usize {
        self.game.move_count()
    }

    pub fn is_terminal(&self) -> bool {
        self.game.is_terminal()
    }

    pub fn result(&self) -> Option<GameOutcome> {
        self.game.result
    }

    pub fn position(&self) -> &R {
        &self.game.position
    }

    pub fn clock(&self) -> &ClockController {
        &self.clock
    }

    pub fn budget(&self) -> &MoveBudget {
        &self.budget
    }

    pub fn broker(&self) -> &EngineBroker {
        &self.broker
    }

    pub fn archive(&self) -> &ArchiveStore {
        &self.archive
    }

    /// Configuration of the game in progress
    pub fn options(&self) -> &GameOptions {
        &self.options
    }

    /// Configuration the next game will use
    pub fn pending_options(&self) -> &GameOptions {
        &self.pending_options
    }

    pub fn set_pending_options(&mut self, options: GameOptions) {
        self.pending_options = options.clamped();
    }

    /// Destinations for the piece on `square`, empty when it cannot move
    pub fn legal_targets(&self, square: &str) -> Result<Vec<MoveTarget>, RejectedMove> {
        let square = parse_square(square)?;
        if self.is_terminal() {
            return Ok(Vec::new());
        }
        Ok(self.game.position.legal_targets(square))
    }

    pub fn king_in_check(&self) -> Option<chess::Square> {
        self.game.position.king_in_check()
    }

    /// Whether `side` could ask the engine for a move right now
    pub fn engine_enabled_for(&self, side: Color) -> bool {
        self.broker.is_available()
            && !self.is_terminal()
            && self.turn() == side
            && self.budget.remaining(side) > 0
            && self.broker.state() != RequestState::Thinking
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let position = &self.game.position;
        SessionSnapshot {
            fen: position.fen(),
            pgn: position.export_notation(),
            turn: color_to_string(self.turn()),
            move_count: self.move_count(),
            white_time_ms: self.clock.remaining(Color::White),
            black_time_ms: self.clock.remaining(Color::Black),
            white_clock: format_clock(self.clock.remaining(Color::White)),
            black_clock: format_clock(self.clock.remaining(Color::Black)),
            white_clock_warning: ClockWarning::for_remaining(self.clock.remaining(Color::White))
                .as_str(),
            black_clock_warning: ClockWarning::for_remaining(self.clock.remaining(Color::Black))
                .as_str(),
            clock_running: self.clock.is_running(),
            white_engine_moves: self.budget.remaining(Color::White),
            black_engine_moves: self.budget.remaining(Color::Black),
            engine_ready: self.broker.is_available(),
            white_engine_enabled: self.engine_enabled_for(Color::White),
            black_engine_enabled: self.engine_enabled_for(Color::Black),
            thinking: self.broker.current().map(|r| ThinkingSnapshot {
                side: color_to_string(r.side),
                progress: r.progress,
            }),
            check_square: self.king_in_check().map(|sq| sq.to_string()),
            result: self.result().map(|outcome| outcome.summary()),
        }
    }

    // ---- moves ---------------------------------------------------------

    pub fn apply_human_move(
        &mut self,
        from: &str,
        to: &str,
        promotion: Option<char>,
    ) -> Result<AppliedMove, RejectedMove> {
        if self.is_terminal() {
            return Err(RejectedMove::GameOver);
        }
        let from_sq = parse_square(from)?;
        let to_sq = parse_square(to)?;
        let promotion = promotion.map(parse_promotion).transpose()?;
        let applied = self.commit(from_sq, to_sq, promotion, MoveSource::Human)?;

        // A hint computed for the previous position is worthless now
        if self.broker.state() == RequestState::Thinking {
            self.broker.cancel();
        }
        Ok(applied)
    }

    pub fn apply_engine_move(&mut self, mv: UciMove) -> Result<AppliedMove, RejectedMove> {
        if self.is_terminal() {
            return Err(RejectedMove::GameOver);
        }
        self.commit(mv.from, mv.to, mv.promotion, MoveSource::Engine)
    }

    fn commit(
        &mut self,
        from: chess::Square,
        to: chess::Square,
        promotion: Option<Piece>,
        source: MoveSource,
    ) -> Result<AppliedMove, RejectedMove> {
        let mover = self.turn();

        // Time spent thinking is charged before the move lands
        if let Some(forfeit) = self.clock.poll(mover) {
            self.finish(GameOutcome::win(forfeit.winner(), EndReason::Timeout));
            return Err(RejectedMove::ClockExpired);
        }

        let played = match self.game.position.apply_move(from, to, promotion) {
            Some(played) => played,
            None => {
                info!("Rejected {} move {}{}", color_name(mover), from, to);
                return Err(RejectedMove::Illegal {
                    from: from.to_string(),
                    to: to.to_string(),
                });
            }
        };

        if source == MoveSource::Engine {
            self.budget.consume(mover);
        }
        self.clock.apply_increment(mover);
        if self.move_count() == 1 {
            self.clock.start();
        }
        info!("{} played {} ({:?})", color_name(mover), played.san, source);

        let outcome = self.evaluate();
        if let Some(outcome) = outcome {
            self.finish(outcome);
        }

        Ok(AppliedMove {
            side: mover,
            source,
            san: played.san.clone(),
            uci: played.uci(),
            outcome,
        })
    }

    /// Termination check, first match wins
    fn evaluate(&self) -> Option<GameOutcome> {
        let position = &self.game.position;
        if position.is_checkmate() {
            Some(GameOutcome::win(!position.turn(), EndReason::Checkmate))
        } else if position.is_stalemate() {
            Some(GameOutcome::draw(EndReason::Stalemate))
        } else if position.is_threefold_repetition() {
            Some(GameOutcome::draw(EndReason::Repetition))
        } else if position.is_insufficient_material() {
            Some(GameOutcome::draw(EndReason::InsufficientMaterial))
        } else if position.is_fifty_move_rule() {
            Some(GameOutcome::draw(EndReason::FiftyMoveRule))
        } else {
            None
        }
    }

    fn finish(&mut self, outcome: GameOutcome) {
        self.clock.stop();
        self.broker.cancel();
        self.game.result = Some(outcome);
        info!("Game over: {}", outcome.summary());
        // Written before anyone is told the game ended
        let entry = self.archive_entry(outcome.summary());
        self.archive.record(entry);
    }

    fn archive_entry(&self, winner: String) -> ArchivedGame {
        let engine_moves = self.options.engine_moves();
        ArchivedGame {
            pgn: self.game.position.export_notation(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            winner,
            white_time_control: self.options.time_control_label(Color::White),
            black_time_control: self.options.time_control_label(Color::Black),
            white_hints: engine_moves[0].saturating_sub(self.budget.remaining(Color::White)),
            black_hints: engine_moves[1].saturating_sub(self.budget.remaining(Color::Black)),
        }
    }

    // ---- clock ---------------------------------------------------------

    /// Start the clock for the side to move; no-op if running or over
    pub fn start_clock(&mut self) -> bool {
        !self.is_terminal() && self.clock.start()
    }

    /// Timer callback: charge the real time elapsed since the last sample
    pub fn poll_clock(&mut self) -> Option<GameOutcome> {
        if self.is_terminal() {
            return None;
        }
        let forfeit = self.clock.poll(self.turn())?;
        let outcome = GameOutcome::win(forfeit.winner(), EndReason::Timeout);
        self.finish(outcome);
        Some(outcome)
    }

    /// Charge an explicit amount of time to the side to move
    pub fn tick(&mut self, elapsed_ms: u64) -> Option<GameOutcome> {
        if self.is_terminal() {
            return None;
        }
        let forfeit = self.clock.tick(elapsed_ms, self.turn())?;
        let outcome = GameOutcome::win(forfeit.winner(), EndReason::Timeout);
        self.finish(outcome);
        Some(outcome)
    }

    // ---- engine --------------------------------------------------------

    /// Use `engine` from now on; a search on the previous engine fails
    pub fn attach_engine(&mut self, engine: Box<dyn EngineProcess>) -> Option<EngineUpdate> {
        match self.broker.attach(engine)? {
            EngineEvent::Failed { reason, .. } => Some(EngineUpdate::Failed(reason)),
            _ => None,
        }
    }

    pub fn engine_disconnected(&mut self, reason: &str) -> Option<EngineUpdate> {
        match self.broker.detach(reason)? {
            EngineEvent::Failed { reason, .. } => Some(EngineUpdate::Failed(reason)),
            _ => None,
        }
    }

    /// Ask the engine to play for the side to move
    pub fn request_engine_move(&mut self) -> Result<EngineTicket, EngineError> {
        if self.is_terminal() {
            return Err(EngineError::GameOver);
        }
        let side = self.turn();
        if self.budget.remaining(side) == 0 {
            return Err(EngineError::BudgetExhausted(side));
        }
        let fen = self.game.position.fen();
        self.broker.request_move(&fen, side, self.engine_depth)
    }

    /// Feed one line of engine output through the broker
    pub fn handle_engine_line(&mut self, line: &str) -> Option<EngineUpdate> {
        match self.broker.handle_line(line)? {
            EngineEvent::Progress { side, percent, .. } => {
                Some(EngineUpdate::Progress { side, percent })
            }
            EngineEvent::Completed { side, mv, .. } => {
                if side != self.turn() {
                    warn!("Dropping engine move {} for {}", mv, color_name(side));
                    return Some(EngineUpdate::Rejected(RejectedMove::StaleEngineMove(side)));
                }
                Some(match self.apply_engine_move(mv) {
                    Ok(applied) => EngineUpdate::Moved(applied),
                    Err(rejected) => {
                        warn!("Engine move {} rejected: {}", mv, rejected);
                        EngineUpdate::Rejected(rejected)
                    }
                })
            }
            EngineEvent::Failed { reason, .. } => Some(EngineUpdate::Failed(reason)),
            EngineEvent::Cancelled { .. } => None,
        }
    }

    // ---- restart -------------------------------------------------------

    /// Whether a restart needs the caller to confirm first
    pub fn restart_requires_confirmation(&self) -> bool {
        self.move_count() > 0
    }

    /// Restart without confirmation, only if no move has been made
    pub fn reset_if_empty(&mut self) -> bool {
        if self.move_count() > 0 {
            return false;
        }
        self.reset();
        true
    }

    /// Restart after the caller confirmed. An unfinished game with moves is
    /// archived as abandoned first; that entry is returned.
    pub fn confirmed_restart(&mut self) -> Option<ArchivedGame> {
        let abandoned = if self.move_count() > 0 && !self.is_terminal() {
            let entry = self.archive_entry(ABANDONED.to_string());
            info!("Abandoning game after {} moves", self.move_count());
            self.archive.record(entry.clone());
            Some(entry)
        } else {
            None
        };
        self.reset();
        abandoned
    }

    fn reset(&mut self) {
        self.broker.cancel();
        self.options = self.pending_options;
        self.game.position.reset();
        self.game.result = None;
        self.clock
            .reset(self.options.initial_ms(), self.options.increment_ms());
        self.budget = MoveBudget::new(self.options.engine_moves());
        info!(
            "New game: White {}, Black {}",
            self.options.time_control_label(Color::White),
            self.options.time_control_label(Color::Black)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::clock::ManualTime;
    use std::cell::RefCell;
    use std::io;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct Script(Rc<RefCell<Vec<String>>>);

    impl EngineProcess for Script {
        fn send(&mut self, command: &str) -> io::Result<()> {
            self.0.borrow_mut().push(command.to_string());
            Ok(())
        }
    }

    fn session() -> (GameSession, ManualTime) {
        let time = ManualTime::new();
        let session = GameSession::standard(
            GameOptions::default(),
            Box::new(time.clone()),
            ArchiveStore::in_memory(),
        );
        (session, time)
    }

    fn with_engine(session: &mut GameSession) -> Script {
        let script = Script::default();
        session.attach_engine(Box::new(script.clone()));
        session.handle_engine_line("readyok");
        script
    }

    #[test]
    fn first_move_starts_the_clock_once() {
        let (mut s, time) = session();
        assert!(!s.clock().is_running());
        s.apply_human_move("e2", "e4", None).unwrap();
        assert!(s.clock().is_running());
        // White's first move is free and earns the increment
        assert_eq!(s.clock().remaining(Color::White), 61_000);

        time.advance(2_000);
        s.apply_human_move("e7", "e5", Some('q')).unwrap();
        assert_eq!(s.clock().remaining(Color::Black), 59_000);
        assert!(s.clock().is_running());
    }

    #[test]
    fn rejected_moves_change_nothing() {
        let (mut s, _) = session();
        let before = s.snapshot();
        assert!(matches!(
            s.apply_human_move("e2", "e5", None),
            Err(RejectedMove::Illegal { .. })
        ));
        assert!(matches!(
            s.apply_human_move("e7", "e5", None),
            Err(RejectedMove::Illegal { .. })
        ));
        assert_eq!(
            s.apply_human_move("x9", "e5", None),
            Err(RejectedMove::BadSquare("x9".to_string()))
        );
        assert_eq!(
            s.apply_human_move("e2", "e4", Some('k')),
            Err(RejectedMove::BadPromotion('k'))
        );
        assert_eq!(s.snapshot(), before);
    }

    #[test]
    fn timeout_while_moving_rejects_the_move() {
        let (mut s, time) = session();
        s.apply_human_move("e2", "e4", None).unwrap();
        time.advance(60_000);
        assert_eq!(
            s.apply_human_move("e7", "e5", None),
            Err(RejectedMove::ClockExpired)
        );
        assert_eq!(
            s.result(),
            Some(GameOutcome::win(Color::White, EndReason::Timeout))
        );
        assert_eq!(s.move_count(), 1);
        assert_eq!(s.archive().list().len(), 1);
    }

    #[test]
    fn engine_request_guards() {
        let (mut s, _) = session();
        assert!(matches!(
            s.request_engine_move(),
            Err(EngineError::Unavailable(_))
        ));
        with_engine(&mut s);
        let mut opts = GameOptions::default();
        opts.white.engine_moves = 0;
        s.set_pending_options(opts);
        assert!(s.reset_if_empty());
        assert!(matches!(
            s.request_engine_move(),
            Err(EngineError::BudgetExhausted(Color::White))
        ));
    }

    #[test]
    fn engine_move_spends_budget_and_reports_progress() {
        let (mut s, _) = session();
        let script = with_engine(&mut s);
        s.request_engine_move().unwrap();
        assert!(script.0.borrow().iter().any(|c| c == "go depth 20"));
        assert!(!s.engine_enabled_for(Color::White));

        assert_eq!(
            s.handle_engine_line("info depth 10 score cp 20"),
            Some(EngineUpdate::Progress {
                side: Color::White,
                percent: 50
            })
        );
        match s.handle_engine_line("bestmove d2d4 ponder d7d5") {
            Some(EngineUpdate::Moved(applied)) => {
                assert_eq!(applied.san, "d4");
                assert_eq!(applied.source, MoveSource::Engine);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(s.budget().remaining(Color::White), 0);
        assert_eq!(s.budget().remaining(Color::Black), 1);
        assert_eq!(s.turn(), Color::Black);
    }

    #[test]
    fn failed_engine_request_is_inert() {
        let (mut s, _) = session();
        with_engine(&mut s);
        s.apply_human_move("e2", "e4", None).unwrap();
        let before = s.snapshot();
        s.request_engine_move().unwrap();
        assert_eq!(
            s.handle_engine_line("bestmove (none)"),
            Some(EngineUpdate::Failed("engine returned no move".to_string()))
        );
        assert_eq!(s.snapshot(), before);
    }

    #[test]
    fn human_move_supersedes_pending_hint() {
        let (mut s, _time) = session();
        let script = with_engine(&mut s);
        s.request_engine_move().unwrap();
        s.apply_human_move("e2", "e4", None).unwrap();
        assert!(script.0.borrow().iter().any(|c| c == "stop"));
        // Late answer for the old position is swallowed
        assert_eq!(s.handle_engine_line("bestmove d2d4"), None);
        assert_eq!(s.budget().remaining(Color::White), 1);
        assert_eq!(s.turn(), Color::Black);
    }

    #[test]
    fn restart_paths() {
        let (mut s, _) = session();
        assert!(!s.restart_requires_confirmation());
        assert!(s.reset_if_empty());
        assert_eq!(s.confirmed_restart(), None);
        assert!(s.archive().list().is_empty());

        s.apply_human_move("e2", "e4", None).unwrap();
        assert!(s.restart_requires_confirmation());
        assert!(!s.reset_if_empty());
        let entry = s.confirmed_restart().unwrap();
        assert_eq!(entry.winner, ABANDONED);
        assert_eq!(entry.pgn, "1. e4");
        assert_eq!(s.move_count(), 0);
        assert_eq!(s.archive().list().len(), 1);
    }

    #[test]
    fn pending_options_wait_for_restart() {
        let (mut s, _) = session();
        s.apply_human_move("e2", "e4", None).unwrap();
        let mut opts = GameOptions::default();
        opts.set_preset(5, 3);
        s.set_pending_options(opts);
        assert_eq!(s.options().time_control_label(Color::White), "1+1");
        assert_eq!(s.clock().increment(Color::Black), 1_000);

        s.confirmed_restart();
        assert_eq!(s.options().time_control_label(Color::Black), "5+3");
        assert_eq!(s.clock().remaining(Color::White), 300_000);
        assert_eq!(s.clock().increment(Color::Black), 3_000);
    }

    #[test]
    fn finished_game_is_not_archived_twice_on_restart() {
        let (mut s, _) = session();
        for (from, to) in [("f2", "f3"), ("e7", "e5"), ("g2", "g4"), ("d8", "h4")] {
            s.apply_human_move(from, to, None).unwrap();
        }
        assert!(s.is_terminal());
        assert_eq!(s.apply_human_move("a2", "a3", None), Err(RejectedMove::GameOver));
        assert_eq!(s.confirmed_restart(), None);
        assert_eq!(s.archive().list().len(), 1);
    }
}
