use std::cell::RefCell;
use std::io;
use std::rc::Rc;

use chess::Color;
use futures::executor::block_on;
use futures::StreamExt;

use one_hint_chess::engine::EngineProcess;
use one_hint_chess::error::{EngineError, RejectedMove};
use one_hint_chess::game::{
    ArchiveStore, ChessRules, EngineEvent, EngineUpdate, GameSession, JsonFileArchive,
    ManualTime, MoveSource, RequestState, RulesEngine,
};
use one_hint_chess::models::{EndReason, GameOptions, SessionPhase, SideOptions};

#[derive(Clone, Default)]
struct RecordingEngine(Rc<RefCell<Vec<String>>>);

impl RecordingEngine {
    fn sent(&self) -> Vec<String> {
        self.0.borrow().clone()
    }
}

impl EngineProcess for RecordingEngine {
    fn send(&mut self, command: &str) -> io::Result<()> {
        self.0.borrow_mut().push(command.to_string());
        Ok(())
    }
}

fn new_session() -> (GameSession, ManualTime) {
    let time = ManualTime::new();
    let session = GameSession::standard(
        GameOptions::default(),
        Box::new(time.clone()),
        ArchiveStore::in_memory(),
    );
    (session, time)
}

fn session_from(fen: &str) -> GameSession {
    GameSession::from_position(
        ChessRules::from_fen(fen).unwrap(),
        GameOptions::default(),
        Box::new(ManualTime::new()),
        ArchiveStore::in_memory(),
    )
}

fn ready_engine(session: &mut GameSession) -> RecordingEngine {
    let engine = RecordingEngine::default();
    session.attach_engine(Box::new(engine.clone()));
    session.handle_engine_line("readyok");
    engine
}

fn play(session: &mut GameSession, moves: &[(&str, &str)]) {
    for (from, to) in moves {
        session.apply_human_move(from, to, None).unwrap();
    }
}

#[test]
fn engine_hint_after_opening_moves() {
    let (mut session, time) = new_session();
    let engine = ready_engine(&mut session);
    play(&mut session, &[("e2", "e4")]);
    time.advance(3_000);
    play(&mut session, &[("e7", "e5")]);
    assert_eq!(session.clock().remaining(Color::Black), 58_000);

    let ticket = session.request_engine_move().unwrap();
    time.advance(2_000);
    let sent = engine.sent();
    assert!(sent.iter().any(|c| c.starts_with("position fen ")));
    assert!(sent.iter().any(|c| c == "go depth 20"));

    session.handle_engine_line("info depth 5 score cp 30 pv g1f3");
    session.handle_engine_line("info depth 10 score cp 28 pv g1f3");
    let update = session.handle_engine_line("bestmove g1f3 ponder b8c6");
    match update {
        Some(EngineUpdate::Moved(applied)) => {
            assert_eq!(applied.side, Color::White);
            assert_eq!(applied.source, MoveSource::Engine);
            assert_eq!(applied.san, "Nf3");
        }
        other => panic!("expected engine move, got {:?}", other),
    }

    assert_eq!(session.budget().remaining(Color::White), 0);
    assert_eq!(session.budget().remaining(Color::Black), 1);
    assert_eq!(session.turn(), Color::Black);
    assert!(session.clock().is_running());

    // Free first move, then 2s of thinking; each move earns the 1s increment
    let white = session.clock().remaining(Color::White);
    assert_eq!(white, 60_000 + 1_000 - 2_000 + 1_000);
    assert!(white > 60_000 - 2_000 + 1_000);
    assert_eq!(session.clock().remaining(Color::Black), 58_000);

    let events: Vec<EngineEvent> = block_on(ticket.events.collect());
    let percents: Vec<u8> = events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::Progress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect();
    assert_eq!(percents, vec![25, 50]);
    assert!(matches!(events.last(), Some(EngineEvent::Completed { .. })));

    // Budget spent: White may not ask again
    play(&mut session, &[("b8", "c6")]);
    assert!(matches!(
        session.request_engine_move(),
        Err(EngineError::BudgetExhausted(Color::White))
    ));
}

#[test]
fn fools_mate_is_archived_once() {
    let (mut session, _time) = new_session();
    play(&mut session, &[("f2", "f3"), ("e7", "e5"), ("g2", "g4")]);
    let applied = session.apply_human_move("d8", "h4", None).unwrap();

    let outcome = applied.outcome.unwrap();
    assert_eq!(outcome.winner, Some(Color::Black));
    assert_eq!(outcome.reason, EndReason::Checkmate);
    assert!(matches!(session.phase(), SessionPhase::Terminal(_)));
    assert!(!session.clock().is_running());

    let archive = session.archive().list();
    assert_eq!(archive.len(), 1);
    assert!(!archive[0].pgn.is_empty());
    assert_eq!(archive[0].winner, "Black wins by checkmate");

    // Nothing more happens once the game is over
    assert_eq!(
        session.apply_human_move("e2", "e4", None),
        Err(RejectedMove::GameOver)
    );
    assert!(session.poll_clock().is_none());
    assert_eq!(session.confirmed_restart(), None);
    assert_eq!(session.archive().list().len(), 1);
}

#[test]
fn white_flags_before_black_moves() {
    let (mut session, time) = new_session();
    assert!(session.start_clock());
    assert_eq!(session.snapshot().white_clock, "1:00");
    time.advance(59_999);
    assert!(session.poll_clock().is_none());
    let snapshot = session.snapshot();
    assert_eq!(snapshot.white_clock, "0:01");
    assert_eq!(snapshot.white_clock_warning, "very-low-time");
    assert_eq!(snapshot.black_clock_warning, "normal");
    time.advance(1);
    let outcome = session.poll_clock().unwrap();

    assert_eq!(outcome.summary(), "Black wins on time");
    assert!(!session.clock().is_running());
    assert_eq!(session.archive().list()[0].winner, "Black wins on time");
}

#[test]
fn late_move_loses_on_time() {
    let (mut session, time) = new_session();
    play(&mut session, &[("e2", "e4")]);
    time.advance(61_000);

    assert_eq!(
        session.apply_human_move("e7", "e5", None),
        Err(RejectedMove::ClockExpired)
    );
    assert_eq!(session.result().unwrap().summary(), "White wins on time");
    assert_eq!(session.move_count(), 1);
}

#[test]
fn human_move_supersedes_pending_hint() {
    let (mut session, _time) = new_session();
    ready_engine(&mut session);

    let ticket = session.request_engine_move().unwrap();
    session.handle_engine_line("info depth 4");
    play(&mut session, &[("d2", "d4")]);
    assert_eq!(
        session.broker().last().map(|r| r.state),
        Some(RequestState::Cancelled)
    );

    // The cancelled search still reports; none of it may land
    assert!(session.handle_engine_line("info depth 12").is_none());
    assert!(session.handle_engine_line("bestmove e2e4").is_none());
    assert_eq!(session.move_count(), 1);
    assert_eq!(session.budget().remaining(Color::White), 1);

    let events: Vec<EngineEvent> = block_on(ticket.events.collect());
    assert!(matches!(events.last(), Some(EngineEvent::Cancelled { .. })));
}

#[test]
fn abandoned_game_is_archived_with_pending_options() {
    let (mut session, _time) = new_session();
    let mut options = GameOptions::default();
    options.black = SideOptions {
        minutes: 5,
        increment_secs: 3,
        engine_moves: 2,
    };
    session.set_pending_options(options);
    play(&mut session, &[("e2", "e4")]);

    assert!(session.restart_requires_confirmation());
    assert!(!session.reset_if_empty());
    let abandoned = session.confirmed_restart().unwrap();
    assert_eq!(abandoned.winner, "Game abandoned");
    assert_eq!(abandoned.black_time_control, "1+1");

    assert_eq!(session.move_count(), 0);
    assert_eq!(session.clock().remaining(Color::Black), 300_000);
    assert_eq!(session.budget().remaining(Color::Black), 2);
    assert_eq!(session.archive().list().len(), 1);
}

#[test]
fn finished_games_survive_a_restart_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("archive.json");

    let time = ManualTime::new();
    let mut session = GameSession::standard(
        GameOptions::default(),
        Box::new(time.clone()),
        ArchiveStore::new(Box::new(JsonFileArchive::new(&path))),
    );
    play(
        &mut session,
        &[("f2", "f3"), ("e7", "e5"), ("g2", "g4"), ("d8", "h4")],
    );
    drop(session);

    let reopened = ArchiveStore::new(Box::new(JsonFileArchive::new(&path)));
    let games = reopened.list();
    assert_eq!(games.len(), 1);
    assert_eq!(games[0].pgn, "1. f3 e5 2. g4 Qh4#");
    assert_eq!(games[0].white_time_control, "1+1");
    assert_eq!(games[0].white_hints, 0);
}

#[test]
fn knight_shuffle_draws_by_repetition() {
    let (mut session, _time) = new_session();
    let cycle = [("g1", "f3"), ("g8", "f6"), ("f3", "g1"), ("f6", "g8")];
    play(&mut session, &cycle);
    play(&mut session, &cycle[..3]);
    assert!(!session.is_terminal());

    let applied = session.apply_human_move("f6", "g8", None).unwrap();
    assert_eq!(applied.outcome.unwrap().summary(), "Draw by repetition");
    assert!(!session.clock().is_running());

    let archive = session.archive().list();
    assert_eq!(archive.len(), 1);
    assert_eq!(archive[0].winner, "Draw by repetition");
    assert_eq!(archive[0].pgn, "1. Nf3 Nf6 2. Ng1 Ng8 3. Nf3 Nf6 4. Ng1 Ng8");
}

#[test]
fn stalemate_outranks_insufficient_material() {
    let mut session = session_from("k7/8/1K6/8/8/8/7B/8 w - - 0 1");
    let applied = session.apply_human_move("h2", "g3", None).unwrap();

    // K+B v K is also dead material; stalemate is checked first
    assert!(session.position().is_insufficient_material());
    assert!(session.position().is_stalemate());
    let outcome = applied.outcome.unwrap();
    assert_eq!(outcome.reason, EndReason::Stalemate);
    assert_eq!(outcome.winner, None);
    assert_eq!(session.archive().list()[0].winner, "Draw by stalemate");
}

#[test]
fn capture_down_to_bare_kings_is_a_draw() {
    let mut session = session_from("4k3/8/8/8/8/8/4r3/4K3 w - - 0 1");
    let applied = session.apply_human_move("e1", "e2", None).unwrap();

    assert_eq!(
        applied.outcome.unwrap().reason,
        EndReason::InsufficientMaterial
    );
    assert_eq!(
        session.archive().list()[0].winner,
        "Draw by insufficient material"
    );
}

#[test]
fn hundredth_quiet_half_move_draws() {
    let mut session = session_from("4k3/8/8/8/8/8/4P3/R3K3 w - - 99 60");
    assert!(!session.position().is_fifty_move_rule());

    let applied = session.apply_human_move("a1", "a2", None).unwrap();
    assert_eq!(applied.outcome.unwrap().reason, EndReason::FiftyMoveRule);
    assert!(session.snapshot().fen.ends_with(" 100 60"));

    let archive = session.archive().list();
    assert_eq!(archive[0].winner, "Draw by 50-move rule");
    assert_eq!(archive[0].pgn, "1. Ra2");

    // Restarting goes back to the initial array
    session.confirmed_restart();
    assert_eq!(session.move_count(), 0);
    assert_eq!(
        session.snapshot().fen,
        "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1"
    );
    assert_eq!(session.archive().list().len(), 1);
}
