use crate::{
    format::{
        format_account_address,
        format_amount,
        format_game_timer,
        start_time,
    },
    network::Network,
    state::{
        PendingAction,
        Standing,
        ViewState,
    },
};
use chrono::{
    DateTime,
    Local,
    Utc,
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use crossterm::{
    event::{
        Event,
        EventStream,
        KeyCode,
        KeyEventKind,
    },
    terminal::{
        disable_raw_mode,
        enable_raw_mode,
    },
};
use futures::StreamExt;
use itertools::Itertools;
use ratatui::{
    prelude::*,
    widgets::*,
};
use std::io::stdout;

pub type InputEvents = EventStream;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UserEvent {
    Quit,
    Redraw,
    Connect,
    PlaceBet(String),
    Withdraw,
    DismissAlert,
}

#[derive(Debug, Default)]
pub struct UiState {
    mode: Mode,
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
enum Mode {
    #[default]
    Normal,
    BetModal(BetState),
    QuitModal,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
struct BetState {
    input: String,
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::LeaveAlternateScreen)?;
    Ok(())
}

pub fn input_event_stream() -> InputEvents {
    EventStream::new()
}

pub async fn next_raw_event(events: &mut InputEvents) -> Result<Event> {
    match events.next().await {
        Some(event) => Ok(event?),
        None => Err(eyre!("terminal input closed")),
    }
}

pub fn draw(state: &mut UiState, view: &ViewState, now: DateTime<Utc>) -> Result<()> {
    if let Some(mut term) = state.terminal.take() {
        term.draw(|f| ui(f, state, view, now))?;
        state.terminal = Some(term);
    }
    Ok(())
}

/// Maps a terminal event to something the controller cares about. Modal
/// bookkeeping happens here.
pub fn interpret_event(state: &mut UiState, event: Event, view: &ViewState) -> Option<UserEvent> {
    let key = match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => key,
        Event::Resize(..) => return Some(UserEvent::Redraw),
        _ => return None,
    };

    if view.alert.is_some() {
        return match key.code {
            KeyCode::Enter | KeyCode::Esc | KeyCode::Char(' ') => Some(UserEvent::DismissAlert),
            _ => None,
        };
    }

    match &mut state.mode {
        Mode::BetModal(bet) => {
            return match key.code {
                KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                KeyCode::Enter => {
                    let input = std::mem::take(&mut bet.input);
                    state.mode = Mode::Normal;
                    Some(UserEvent::PlaceBet(input))
                }
                KeyCode::Backspace => {
                    bet.input.pop();
                    Some(UserEvent::Redraw)
                }
                KeyCode::Char(c) if c.is_ascii_digit() => {
                    bet.input.push(c);
                    Some(UserEvent::Redraw)
                }
                KeyCode::Char('.') if !bet.input.contains('.') => {
                    bet.input.push('.');
                    Some(UserEvent::Redraw)
                }
                _ => None,
            };
        }
        Mode::QuitModal => {
            return match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => Some(UserEvent::Quit),
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                _ => None,
            };
        }
        Mode::Normal => {}
    }

    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => {
            state.mode = Mode::QuitModal;
            Some(UserEvent::Redraw)
        }
        KeyCode::Char('c') => Some(UserEvent::Connect),
        KeyCode::Char('b') => {
            if view.session.account.is_none() {
                Some(UserEvent::Connect)
            } else if view.player_has_bet() || view.pending.is_some() {
                None
            } else {
                state.mode = Mode::BetModal(BetState::default());
                Some(UserEvent::Redraw)
            }
        }
        KeyCode::Char('w') => Some(UserEvent::Withdraw),
        _ => None,
    }
}

fn ui(f: &mut Frame, state: &UiState, view: &ViewState, now: DateTime<Utc>) {
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // account + network
            Constraint::Length(9), // game
            Constraint::Length(5), // player
            Constraint::Min(6),    // rules
            Constraint::Length(5), // status/errors
            Constraint::Length(3), // help
        ])
        .split(f.area());

    let header = Paragraph::new(header_line(view))
        .block(Block::default().borders(Borders::ALL).title("DiveBar"));
    f.render_widget(header, chunks[0]);

    let game_style = if view.is_stale() {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    let game = Paragraph::new(to_lines(game_lines(view, now)))
        .style(game_style)
        .block(Block::default().borders(Borders::ALL).title("Game"));
    f.render_widget(game, chunks[1]);

    let player = Paragraph::new(to_lines(player_lines(view)))
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Your bet"));
    f.render_widget(player, chunks[2]);

    let rules = Paragraph::new(to_lines(rules_lines(view)))
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("House rules"));
    f.render_widget(rules, chunks[3]);

    draw_status(f, chunks[4], view);

    let help = Paragraph::new("c connect | b bet | w withdraw | q/Esc quit")
        .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, chunks[5]);

    draw_modals(f, state, view);
}

fn to_lines(lines: Vec<String>) -> Vec<Line<'static>> {
    lines.into_iter().map(Line::from).collect()
}

fn draw_status(f: &mut Frame, area: Rect, view: &ViewState) {
    let widget = if view.errors.is_empty() {
        Paragraph::new(view.status.clone())
            .block(Block::default().borders(Borders::ALL).title("Status"))
            .style(Style::default().fg(Color::Green))
    } else {
        Paragraph::new(to_lines(view.errors.clone()))
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Errors"))
            .style(Style::default().fg(Color::Red))
    };
    f.render_widget(widget, area);
}

fn draw_modals(f: &mut Frame, state: &UiState, view: &ViewState) {
    if let Some(alert) = &view.alert {
        let area = centered_rect(50, 20, f.area());
        let block = Block::default().borders(Borders::ALL).title("Notice");
        let p = Paragraph::new(format!("{alert}\n\nEnter to dismiss")).wrap(Wrap { trim: true });
        f.render_widget(Clear, area);
        f.render_widget(block.clone(), area);
        f.render_widget(p, block.inner(area));
        return;
    }
    match &state.mode {
        Mode::BetModal(bet) => {
            let area = centered_rect(40, 25, f.area());
            let block = Block::default().borders(Borders::ALL).title("Place Bet");
            let placeholder = if bet.input.is_empty() { "0.001" } else { bet.input.as_str() };
            let p = Paragraph::new(format!(
                "Amount: {} {}\nEnter=confirm Esc=cancel digits/. to edit",
                placeholder,
                view.native_token_symbol()
            ));
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::QuitModal => {
            let area = centered_rect(40, 20, f.area());
            let block = Block::default().borders(Borders::ALL).title("Confirm Quit");
            let p = Paragraph::new("Leave the bar? (Y/N)");
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::Normal => {}
    }
}

fn centered_rect(w_percent: u16, h_percent: u16, r: Rect) -> Rect {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - h_percent) / 2),
            Constraint::Percentage(h_percent),
            Constraint::Percentage((100 - h_percent) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(rows[1])[1]
}

fn header_line(view: &ViewState) -> String {
    let account = match view.session.account {
        Some(account) => format_account_address(&account.to_string()),
        None if view.wallet_present => String::from("Not connected (press c)"),
        None => String::from("No wallet"),
    };
    let network = match &view.chain {
        Some(resolution) => resolution.label(),
        None => String::from("-"),
    };
    let winnings = match view.claimable {
        Some(balance) => format!(
            " | Winnings: {} {}",
            format_amount(balance),
            view.native_token_symbol()
        ),
        None => String::new(),
    };
    format!("Account: {account} | Network: {network}{winnings}")
}

fn local_clock(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M:%S").to_string()
}

fn game_lines(view: &ViewState, now: DateTime<Utc>) -> Vec<String> {
    if view.chain.is_some() && view.contract().is_none() {
        return vec![
            String::from("Wrong network."),
            format!(
                "Switch your wallet to one of: {}",
                Network::ALL.iter().join(", ")
            ),
        ];
    }
    let Some(game) = &view.game else {
        return vec![String::from("Waiting for game data...")];
    };
    let symbol = view.native_token_symbol();
    let started = start_time(game.created_at)
        .map(local_clock)
        .unwrap_or_else(|| String::from("?"));
    let standing = match view.standing() {
        Standing::NoBet => "No bet placed",
        Standing::Winner => "Winner",
        Standing::Loser => "Loser",
    };
    let mut lines = vec![
        format!("Game #{} | Started at {}", game.id, started),
        format!("Time left: {}", format_game_timer(game.ending_at, now)),
        format!("The bar is currently at {} {}", format_amount(game.average), symbol),
        format!(
            "Pot: {} {} | Current players: {}",
            format_amount(game.pot),
            symbol,
            game.player_count
        ),
        format!("Current status: {standing}"),
    ];
    if view.is_stale() {
        let last = view
            .last_game_poll
            .map(local_clock)
            .unwrap_or_else(|| String::from("never"));
        lines.push(format!(
            "Data may be out of date: last update {last}, {} failed refresh(es)",
            view.poll_failures
        ));
    }
    lines
}

fn player_lines(view: &ViewState) -> Vec<String> {
    if view.session.account.is_none() {
        return vec![String::from("Connect your wallet to play.")];
    }
    let symbol = view.native_token_symbol();
    let mut lines = Vec::new();
    match view.pending {
        Some(PendingAction::Bet) => lines.push(String::from("Placing your bet...")),
        Some(PendingAction::Withdraw) => lines.push(String::from("Withdrawing winnings...")),
        Some(PendingAction::Connect) => lines.push(String::from("Waiting for wallet...")),
        None => {}
    }
    match view.position {
        Some(position) if position.has_bet() => {
            lines.push(format!("Your bet: {} {}", format_amount(position.bet), symbol));
        }
        _ if view.player_has_bet() => lines.push(String::from("Your bet is in. Refreshing...")),
        _ if view.game.is_some() && view.pending.is_none() => {
            lines.push(String::from("No bet yet this game. Press b to bet."));
        }
        _ => {}
    }
    if let Some(balance) = view.claimable.filter(|b| !b.is_zero()) {
        lines.push(format!(
            "Winnings: {} {} (press w to withdraw)",
            format_amount(balance),
            symbol
        ));
    }
    lines
}

fn rules_lines(view: &ViewState) -> Vec<String> {
    let symbol = view.native_token_symbol();
    let mut lines = vec![String::from(
        "One bet per game. A bet cannot be taken back once placed.",
    )];
    if let Some(game) = &view.game {
        lines.push(format!(
            "Minimum bet: {} {}",
            format_amount(game.min_deposit),
            symbol
        ));
    }
    lines.push(String::from(
        "You win if your bet is at or above the bar (the average bet) when the timer runs out.",
    ));
    lines.push(String::from(
        "Winners get their bet back plus a share of the losing bets; earlier bets earn a larger share.",
    ));
    lines.push(String::from("The house keeps 1% of winnings."));
    if let Some(config) = view.contract() {
        lines.push(format!("Contract: {}", config.explorer_url()));
    }
    lines
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use crate::{
        contract::{
            GameState,
            PlayerPosition,
        },
        network::{
            ChainResolution,
            NetworkConfig,
        },
        session::Session,
    };
    use alloy_primitives::{
        U256,
        address,
    };
    use crossterm::event::{
        KeyEvent,
        KeyModifiers,
    };

    const ETHER: u64 = 1_000_000_000_000_000_000;

    fn key(code: KeyCode) -> Event {
        Event::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn playing_view() -> ViewState {
        let mut view = ViewState::new(true);
        view.session = Session {
            account: Some(address!("1234567890abcdef1234567890abcdef12341234")),
            chain_id: Some(42),
        };
        view.chain = Some(ChainResolution::Supported(NetworkConfig {
            network: Network::Kovan,
            contract_address: address!("00000000000000000000000000000000000000c0"),
        }));
        view.game = Some(GameState {
            id: U256::from(12u64),
            pot: U256::from(3 * ETHER),
            average: U256::from(ETHER),
            player_count: U256::from(3u64),
            min_deposit: U256::from(ETHER / 1_000),
            ending_at: U256::from(1_700_000_100u64),
            ..GameState::default()
        });
        view
    }

    fn now() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn game_lines__stale_notice_uses_local_time() {
        let mut view = playing_view();
        view.last_game_poll = Some(now());
        view.poll_failures = 2;

        let lines = game_lines(&view, now());

        let expected = now().with_timezone(&Local).format("%H:%M:%S").to_string();
        let notice = lines.last().unwrap();
        assert!(notice.contains(&format!("last update {expected},")), "{notice}");
    }

    #[test]
    fn interpret_event__bet_modal_collects_decimal_input() {
        let view = playing_view();
        let mut state = UiState::default();

        assert_eq!(
            interpret_event(&mut state, key(KeyCode::Char('b')), &view),
            Some(UserEvent::Redraw)
        );
        for c in ['0', '.', '5', '.', '1'] {
            interpret_event(&mut state, key(KeyCode::Char(c)), &view);
        }
        let event = interpret_event(&mut state, key(KeyCode::Enter), &view);

        assert_eq!(event, Some(UserEvent::PlaceBet(String::from("0.51"))));
        assert_eq!(state.mode, Mode::Normal);
    }

    #[test]
    fn interpret_event__bet_key_hidden_after_betting() {
        let mut view = playing_view();
        view.position = Some(PlayerPosition {
            bet: U256::from(ETHER),
            timestamp: U256::ZERO,
        });
        let mut state = UiState::default();

        let event = interpret_event(&mut state, key(KeyCode::Char('b')), &view);

        assert_eq!(event, None);
        assert_eq!(state.mode, Mode::Normal);
    }

    #[test]
    fn interpret_event__alert_swallows_keys_until_dismissed() {
        let mut view = playing_view();
        view.alert = Some(String::from("Please enter a bet amount!"));
        let mut state = UiState::default();

        assert_eq!(interpret_event(&mut state, key(KeyCode::Char('q')), &view), None);
        assert_eq!(
            interpret_event(&mut state, key(KeyCode::Enter), &view),
            Some(UserEvent::DismissAlert)
        );
    }

    #[test]
    fn interpret_event__quit_needs_confirmation() {
        let view = playing_view();
        let mut state = UiState::default();
        assert_eq!(
            interpret_event(&mut state, key(KeyCode::Char('q')), &view),
            Some(UserEvent::Redraw)
        );
        assert_eq!(
            interpret_event(&mut state, key(KeyCode::Char('y')), &view),
            Some(UserEvent::Quit)
        );
    }

    #[test]
    fn header_line__shows_short_account_and_network() {
        let line = header_line(&playing_view());
        assert_eq!(line, "Account: 0x1234...1234 | Network: Kovan");
    }

    #[test]
    fn game_lines__show_bar_pot_and_timer() {
        let lines = game_lines(&playing_view(), now());
        assert_eq!(lines[1], "Time left: 1m 40s");
        assert_eq!(lines[2], "The bar is currently at 1.000 ETH");
        assert_eq!(lines[3], "Pot: 3.000 ETH | Current players: 3");
    }

    #[test]
    fn game_lines__wrong_network_lists_supported_networks() {
        let mut view = playing_view();
        view.chain = Some(ChainResolution::Unsupported(1));
        let lines = game_lines(&view, now());
        assert_eq!(lines[0], "Wrong network.");
        assert!(lines[1].contains("Kovan"));
    }

    #[test]
    fn game_lines__flags_stale_data() {
        let mut view = playing_view();
        view.poll_failures = 2;
        let lines = game_lines(&view, now());
        assert!(lines.last().unwrap().contains("2 failed refresh"));
    }

    #[test]
    fn rules_lines__include_minimum_bet_and_explorer_link() {
        let lines = rules_lines(&playing_view());
        assert!(lines.contains(&String::from("Minimum bet: 0.001 ETH")));
        assert!(lines.iter().any(|l| l.contains("kovan.etherscan.io")));
    }
}
