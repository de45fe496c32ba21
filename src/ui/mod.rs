use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, AppState, InputMode};

pub fn draw(f: &mut Frame<'_>, app: &App) {
    let size = f.size();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Title bar
            Constraint::Min(0),    // Main content
            Constraint::Length(3), // Input area
        ])
        .split(size);

    draw_title_bar(f, app, chunks[0]);

    let main_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(75), Constraint::Percentage(25)])
        .split(chunks[1]);

    let chat_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(7)])
        .split(main_chunks[0]);

    draw_thread(f, app, chat_chunks[0]);
    draw_status_log(f, app, chat_chunks[1]);
    draw_side_panel(f, app, main_chunks[1]);
    draw_input_area(f, app, chunks[2]);
}

fn state_style(state: &AppState) -> Style {
    match state {
        AppState::Connected => Style::default().fg(Color::Green),
        AppState::Connecting => Style::default().fg(Color::Yellow),
        AppState::Offline | AppState::Disconnected(_) => Style::default().fg(Color::Red),
    }
}

fn state_label(state: &AppState) -> &str {
    match state {
        AppState::Connected => "live",
        AppState::Connecting => "connecting...",
        AppState::Offline => "offline",
        AppState::Disconnected(reason) => reason,
    }
}

fn draw_title_bar(f: &mut Frame, app: &App, area: Rect) {
    let peer = app
        .selected_peer()
        .map(|u| u.name.as_str())
        .unwrap_or("no conversation");
    let title = format!(
        " {} | {} | {} ",
        app.session.user.name,
        peer,
        state_label(&app.state)
    );

    let title_block = Block::default()
        .borders(Borders::ALL)
        .style(state_style(&app.state))
        .title(" NotebookChat ");

    let title_paragraph = Paragraph::new(title)
        .block(title_block)
        .alignment(Alignment::Center);

    f.render_widget(title_paragraph, area);
}

fn draw_thread(f: &mut Frame, app: &App, area: Rect) {
    let title = match app.selected_peer() {
        Some(peer) => format!(" {} - {} ", peer.name, peer.presence_label()),
        None => " Messages ".to_string(),
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .style(Style::default().fg(Color::Cyan));

    let inner = block.inner(area);
    f.render_widget(block, area);

    let me = app.session.user_id();
    let mut lines = Vec::new();
    for message in app.visible_messages(inner.height as usize) {
        let own = message.is_from(me);
        let author = if own {
            app.session.user.name.as_str()
        } else {
            app.roster
                .get(&message.sender_id)
                .map(|u| u.name.as_str())
                .unwrap_or("?")
        };
        let body_style = if message.is_confirmed() {
            Style::default().fg(Color::White)
        } else {
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC)
        };

        let mut spans = vec![
            Span::styled(format!("[{}] ", message.time_label()), Style::default().fg(Color::Gray)),
            Span::styled(
                format!("<{}> ", author),
                Style::default().fg(if own { Color::Green } else { Color::Magenta }),
            ),
            Span::styled(message.body.as_str(), body_style),
        ];
        if !message.is_confirmed() {
            spans.push(Span::styled(" …", Style::default().fg(Color::DarkGray)));
        }
        lines.push(Line::from(spans));
    }

    if lines.is_empty() {
        let hint_text = if app.loading_history {
            "Loading conversation..."
        } else if app.conversation().is_some() {
            "No messages yet. Press i, type a message and press Enter."
        } else {
            "Select a user with /open <name> to start chatting."
        };
        lines.push(Line::from(Span::styled(
            hint_text,
            Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC),
        )));
    }

    let messages_widget = Paragraph::new(lines).wrap(Wrap { trim: false });
    f.render_widget(messages_widget, inner);
}

fn draw_status_log(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Status ")
        .style(Style::default().fg(Color::Blue));
    let inner = block.inner(area);

    let lines: Vec<Line> = app
        .visible_status_messages(inner.height as usize)
        .iter()
        .map(|s| Line::from(Span::styled(s.as_str(), Style::default().fg(Color::Gray))))
        .collect();

    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_side_panel(f: &mut Frame<'_>, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(5), // Identity
            Constraint::Length(4), // Connection
            Constraint::Min(0),    // Users
        ])
        .split(area);

    let identity_block = Block::default()
        .borders(Borders::ALL)
        .title(" You ")
        .style(Style::default().fg(Color::Blue));
    let identity_text = vec![
        Line::from(vec![
            Span::raw("Name: "),
            Span::styled(&app.session.user.name, Style::default().fg(Color::Green)),
        ]),
        Line::from(vec![
            Span::raw("Email: "),
            Span::styled(
                app.session.user.email.as_deref().unwrap_or("-"),
                Style::default().fg(Color::Gray),
            ),
        ]),
    ];
    f.render_widget(Paragraph::new(identity_text).block(identity_block), chunks[0]);

    let connection_block = Block::default()
        .borders(Borders::ALL)
        .title(" Connection ")
        .style(Style::default().fg(Color::Blue));
    let pending = app.thread.pending_count();
    let connection_text = vec![
        Line::from(vec![
            Span::raw("Channel: "),
            Span::styled(state_label(&app.state), state_style(&app.state)),
        ]),
        Line::from(vec![
            Span::raw("Sending: "),
            Span::styled(pending.to_string(), Style::default().fg(Color::Cyan)),
        ]),
    ];
    f.render_widget(Paragraph::new(connection_text).block(connection_block), chunks[1]);

    let users_block = Block::default()
        .borders(Borders::ALL)
        .title(" Users ")
        .style(Style::default().fg(Color::Blue));

    let current_peer = app.conversation().map(|c| c.peer.as_str());
    let items: Vec<ListItem> = app
        .roster
        .iter()
        .enumerate()
        .map(|(i, user)| {
            let marker = if user.is_online { "●" } else { "○" };
            let unread = app.roster.unread_count(&user.id);
            let label = if unread > 0 {
                format!("{} {}. {} ({})", marker, i + 1, user.name, unread)
            } else {
                format!("{} {}. {}", marker, i + 1, user.name)
            };
            let style = if current_peer == Some(user.id.as_str()) {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else if unread > 0 {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default().fg(Color::White)
            };
            ListItem::new(label).style(style)
        })
        .collect();

    let users_list = if items.is_empty() {
        List::new(vec![ListItem::new("No users").style(Style::default().fg(Color::Gray))])
    } else {
        List::new(items)
    }
    .block(users_block);

    f.render_widget(users_list, chunks[2]);
}

fn draw_input_area(f: &mut Frame, app: &App, area: Rect) {
    let input_style = match app.input_mode {
        InputMode::Normal => Style::default().fg(Color::White),
        InputMode::Editing => Style::default().fg(Color::Green),
    };

    let mode_indicator = match app.input_mode {
        InputMode::Normal => " [NORMAL] Press 'i' to type ".to_string(),
        InputMode::Editing => match &app.tab_completion_state {
            Some(state) => format!(
                " [INPUT] TAB completion: {} ({}/{}) ",
                state.matches[state.current_match_index],
                state.current_match_index + 1,
                state.matches.len()
            ),
            None => " [INPUT] ESC=normal, ENTER=send, TAB=complete ".to_string(),
        },
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .title(mode_indicator)
        .style(input_style);

    let input_paragraph = Paragraph::new(app.input.as_str())
        .block(input_block)
        .wrap(Wrap { trim: false });

    f.render_widget(input_paragraph, area);

    if app.input_mode == InputMode::Editing {
        f.set_cursor(area.x + app.cursor_position as u16 + 1, area.y + 1);
    }
}
