use ratatui::{
    layout::{Constraint, Direction, Layout, Position, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap},
    Frame,
};
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

use crate::app::chat::MsgKind;
use crate::app::{App, ConfirmAction, Focus, RenameState};
use crate::strings::{
    build_stick_label, build_status_line, confirm_delete_message, help_lines_ascii, EMPTY_CHAT,
    INPUT_HINT, TITLE_CHAT, TITLE_CONFIRM, TITLE_CONVERSATIONS, TITLE_HELP, TITLE_INPUT,
    TITLE_RENAME,
};
use crate::theme::THEME;

pub fn draw(f: &mut Frame, app: &mut App) {
    let mut constraints: Vec<Constraint> = Vec::new();
    if app.show_sidebar {
        constraints.push(Constraint::Length(28));
    }
    constraints.push(Constraint::Min(10));
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(constraints)
        .split(f.area());
    let main_area = if app.show_sidebar {
        app.sidebar_area = Some(chunks[0]);
        app.ensure_sidebar_visible();
        draw_sidebar(f, chunks[0], app);
        chunks[1]
    } else {
        app.sidebar_area = None;
        chunks[0]
    };
    draw_main(f, main_area, app);

    if let Some(state) = &app.rename {
        draw_rename(f, f.area(), state);
    }
    if let Some(confirm) = &app.confirm {
        draw_confirm(f, f.area(), confirm, app);
    }
    if app.show_help {
        draw_help(f, f.area());
    }
}

fn draw_sidebar(f: &mut Frame, area: Rect, app: &App) {
    let focused = app.focus == Focus::Sidebar;
    let title = Span::styled(
        TITLE_CONVERSATIONS,
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    );
    let border_style = if focused {
        Style::default().fg(THEME.border_focus)
    } else {
        Style::default().fg(THEME.border_inactive)
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(border_style);
    let inner_h = area.height.saturating_sub(2) as usize;
    let start = app.sidebar_scroll as usize;
    let streaming_id = app.turn.as_ref().map(|t| t.conversation_id.as_str());
    let mut lines: Vec<Line> = Vec::new();
    for c in app.store.list().iter().skip(start).take(inner_h) {
        let selected = app.active.as_deref() == Some(c.id.as_str());
        let prefix = if selected { "> " } else { "  " };
        let marker = if streaming_id == Some(c.id.as_str()) { " *" } else { "" };
        let style = if selected {
            if focused {
                Style::default()
                    .fg(THEME.sidebar_selected_fg)
                    .bg(THEME.sidebar_selected_bg)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default()
                    .fg(THEME.border_focus)
                    .add_modifier(Modifier::BOLD)
            }
        } else {
            Style::default()
        };
        lines.push(Line::from(Span::styled(
            format!("{}{}{}", prefix, c.title, marker),
            style,
        )));
    }
    let para = Paragraph::new(lines).block(block);
    f.render_widget(para, area);

    let inner = inner_rect(area);
    let total = app.store.list().len();
    if total > inner.height as usize {
        let mut sb_state = ScrollbarState::new(total).position(app.sidebar_scroll as usize);
        let sb = Scrollbar::default().orientation(ScrollbarOrientation::VerticalRight);
        f.render_stateful_widget(sb, inner, &mut sb_state);
    }
}

fn draw_main(f: &mut Frame, area: Rect, app: &mut App) {
    let inner_width = area.width.saturating_sub(2);
    let input_total_lines = wrap_input(&app.input.text, inner_width).len() as u16;
    // Grow or shrink the input box one line per frame.
    let target_lines = input_total_lines.clamp(1, app.input_max_lines);
    let current = app.input_visible_lines.max(1);
    app.input_visible_lines = match current.cmp(&target_lines) {
        std::cmp::Ordering::Less => current + 1,
        std::cmp::Ordering::Greater => current - 1,
        std::cmp::Ordering::Equal => current,
    };
    let input_height = app.input_visible_lines + 2;

    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(5),
            Constraint::Length(1),
            Constraint::Length(input_height),
        ])
        .split(area);

    app.chat_area = Some(main_chunks[0]);
    draw_chat(f, main_chunks[0], app);
    draw_status(f, main_chunks[1], app);
    draw_input(f, main_chunks[2], app, inner_width);
}

fn draw_chat(f: &mut Frame, area: Rect, app: &mut App) {
    let title = match app.active_conversation() {
        Some(c) => format!("{}- {} ", TITLE_CHAT, c.title),
        None => TITLE_CHAT.to_string(),
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(THEME.chat_border));

    let inner = inner_rect(area);
    app.ensure_chat_wrapped(inner.width);
    app.chat_viewport = inner.height;
    let start = app.chat_start_line(inner.height);

    if app.chat_total_lines == 0 {
        let hint = Line::from(Span::styled(EMPTY_CHAT, Style::default().fg(THEME.hint)));
        f.render_widget(Paragraph::new(hint).block(block), area);
        return;
    }

    let mut vis_lines: Vec<Line> = Vec::new();
    let mut skip = start;
    for block_msg in app.chat_blocks() {
        if vis_lines.len() >= inner.height as usize {
            break;
        }
        if skip >= block_msg.lines.len() {
            skip -= block_msg.lines.len();
            continue;
        }
        let (prefix_style, body_style) = match block_msg.kind {
            MsgKind::User => (
                Style::default()
                    .fg(THEME.user_prefix)
                    .add_modifier(Modifier::BOLD),
                Style::default(),
            ),
            MsgKind::Assistant => (
                Style::default()
                    .fg(THEME.assistant_prefix)
                    .add_modifier(Modifier::BOLD),
                Style::default(),
            ),
            MsgKind::Streaming => (
                Style::default()
                    .fg(THEME.assistant_prefix)
                    .add_modifier(Modifier::BOLD),
                Style::default().fg(THEME.streaming_text),
            ),
            MsgKind::Error => (
                Style::default()
                    .fg(THEME.error_text)
                    .add_modifier(Modifier::BOLD),
                Style::default().fg(THEME.error_text),
            ),
        };
        for (i, line) in block_msg.lines.iter().enumerate().skip(skip) {
            if vis_lines.len() >= inner.height as usize {
                break;
            }
            let pw = if i == 0 { block_msg.prefix_width } else { 0 };
            let line = match (line.get(..pw), line.get(pw..)) {
                (Some(head), Some(rest)) if pw > 0 => Line::from(vec![
                    Span::styled(head.to_string(), prefix_style),
                    Span::styled(rest.to_string(), body_style),
                ]),
                _ => Line::from(Span::styled(line.clone(), body_style)),
            };
            vis_lines.push(line);
        }
        skip = 0;
    }

    f.render_widget(Paragraph::new(vis_lines).block(block), area);

    if app.chat_total_lines > inner.height as usize {
        let mut sb_state = ScrollbarState::new(app.chat_total_lines).position(start);
        let sb = Scrollbar::default().orientation(ScrollbarOrientation::VerticalRight);
        f.render_stateful_widget(sb, inner, &mut sb_state);
    }
}

fn draw_input(f: &mut Frame, area: Rect, app: &App, inner_width: u16) {
    let focused = app.focus == Focus::Input;
    let border_style = if focused {
        Style::default().fg(THEME.border_focus)
    } else {
        Style::default().fg(THEME.border_inactive)
    };
    let block = Block::default()
        .title(TITLE_INPUT)
        .borders(Borders::ALL)
        .border_style(border_style);
    let before = app.input.before_cursor();
    let (line_idx, col_width) = measure_prefix_line_col(&before, inner_width);
    let offset_y = line_idx.saturating_sub(app.input_visible_lines.saturating_sub(1));

    let para = if app.input.is_empty() {
        Paragraph::new(Line::from(Span::styled(
            INPUT_HINT,
            Style::default().fg(THEME.hint),
        )))
        .block(block)
        .wrap(Wrap { trim: false })
    } else {
        let lines = wrap_input(&app.input.text, inner_width)
            .into_iter()
            .map(Line::from)
            .collect::<Vec<_>>();
        Paragraph::new(lines).block(block).scroll((offset_y, 0))
    };
    f.render_widget(para, area);

    if focused && app.rename.is_none() && app.confirm.is_none() && !app.show_help {
        let cursor_x = area.x + 1 + col_width;
        let cursor_y = area.y + 1 + line_idx.saturating_sub(offset_y);
        f.set_cursor_position(Position::new(cursor_x, cursor_y));
    }
}

fn draw_status(f: &mut Frame, area: Rect, app: &App) {
    let stick = build_stick_label(app.chat_scroll);
    let text = build_status_line(
        &app.relay_url,
        &app.model,
        app.user_name.as_deref(),
        app.is_streaming(),
        &stick,
        app.notice.as_deref(),
        area.width,
    );
    let style = if app.is_streaming() {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(THEME.hint)
    };
    f.render_widget(Paragraph::new(Line::from(Span::styled(text, style))), area);
}

fn draw_help(f: &mut Frame, area: Rect) {
    let popup_area = centered_rect(70, 70, area);
    let block = Block::default()
        .title(Span::styled(
            TITLE_HELP,
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ))
        .borders(Borders::ALL);
    let lines = help_lines_ascii()
        .iter()
        .map(|s| Line::from(*s))
        .collect::<Vec<Line>>();
    let para = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false });
    f.render_widget(Clear, popup_area);
    f.render_widget(para, popup_area);
}

fn draw_rename(f: &mut Frame, area: Rect, state: &RenameState) {
    let popup_area = centered_rect(60, 30, area);
    let block = Block::default()
        .title(Span::styled(
            TITLE_RENAME,
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ))
        .borders(Borders::ALL);
    let lines = vec![
        Line::from("Enter new title, Enter to confirm, Esc to cancel:"),
        Line::from(format!(">> {}", state.buffer.text)),
    ];
    let para = Paragraph::new(lines).block(block);
    f.render_widget(Clear, popup_area);
    f.render_widget(para, popup_area);
    let cursor_x =
        popup_area.x + 4 + UnicodeWidthStr::width(state.buffer.before_cursor().as_str()) as u16;
    let cursor_y = popup_area.y + 2;
    f.set_cursor_position(Position::new(cursor_x, cursor_y));
}

fn draw_confirm(f: &mut Frame, area: Rect, confirm: &ConfirmAction, app: &App) {
    let popup_area = centered_rect(60, 30, area);
    let block = Block::default()
        .title(Span::styled(
            TITLE_CONFIRM,
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ))
        .borders(Borders::ALL);
    let message = match confirm {
        ConfirmAction::DeleteConversation(id) => {
            let title = app.store.get(id).map(|c| c.title.as_str()).unwrap_or_default();
            confirm_delete_message(title)
        }
    };
    let para = Paragraph::new(Line::from(message))
        .block(block)
        .wrap(Wrap { trim: false });
    f.render_widget(Clear, popup_area);
    f.render_widget(para, popup_area);
}

fn inner_rect(area: Rect) -> Rect {
    Rect {
        x: area.x.saturating_add(1),
        y: area.y.saturating_add(1),
        width: area.width.saturating_sub(2),
        height: area.height.saturating_sub(2),
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let vert = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);
    let horiz = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vert[1]);
    horiz[1]
}

/// Hard-wrap input text at `width` columns, breaking on newlines and
/// grapheme boundaries. The caret math below uses the same rules.
fn wrap_input(s: &str, width: u16) -> Vec<String> {
    let mut lines = vec![String::new()];
    let mut col = 0usize;
    for g in s.graphemes(true) {
        if g == "\n" {
            lines.push(String::new());
            col = 0;
            continue;
        }
        let w = UnicodeWidthStr::width(g);
        if width > 0 && col + w > width as usize {
            lines.push(String::new());
            col = 0;
        }
        if let Some(last) = lines.last_mut() {
            last.push_str(g);
        }
        col += w;
    }
    lines
}

fn measure_prefix_line_col(prefix: &str, width: u16) -> (u16, u16) {
    if width == 0 {
        return (0, 0);
    }
    let lines = wrap_input(prefix, width);
    let last = lines.last().map(|l| UnicodeWidthStr::width(l.as_str())).unwrap_or(0);
    ((lines.len() - 1) as u16, last as u16)
}
