use std::time::{Duration, Instant};

use crossterm::event::{self, Event, MouseButton, MouseEvent, MouseEventKind};
use ratatui::{backend::Backend, layout::Rect, Terminal};

use crate::app::{App, Focus};
use crate::ui;

pub fn run<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> anyhow::Result<()> {
    let mut last_draw = Instant::now();
    let heartbeat = Duration::from_millis(500);
    loop {
        if app.dirty || last_draw.elapsed() >= heartbeat {
            terminal.draw(|f| ui::draw(f, app))?;
            app.dirty = false;
            last_draw = Instant::now();
        }
        if app.focus == Focus::Input || app.rename.is_some() {
            let _ = terminal.show_cursor();
        } else {
            let _ = terminal.hide_cursor();
        }

        // Short poll so streamed fragments show up promptly.
        if event::poll(Duration::from_millis(50))? {
            match event::read()? {
                Event::Key(key) => app.on_key(key),
                Event::Paste(s) => app.on_paste(&s),
                Event::Resize(_, _) => app.dirty = true,
                Event::Mouse(me) => on_mouse(app, me),
                _ => {}
            }
        }

        app.on_tick();

        if app.should_quit {
            app.cancel_turn();
            app.save_ui_state();
            break;
        }
    }
    Ok(())
}

fn contains(area: Rect, x: u16, y: u16) -> bool {
    x >= area.x && x < area.x + area.width && y >= area.y && y < area.y + area.height
}

fn on_mouse(app: &mut App, me: MouseEvent) {
    if app.show_help || app.rename.is_some() || app.confirm.is_some() {
        return;
    }
    let (x, y) = (me.column, me.row);
    if app.chat_area.is_some_and(|a| contains(a, x, y)) {
        match me.kind {
            MouseEventKind::ScrollUp => app.scroll_chat_up(3),
            MouseEventKind::ScrollDown => app.scroll_chat_down(3),
            MouseEventKind::Down(MouseButton::Left) => app.focus = Focus::Input,
            _ => {}
        }
        app.dirty = true;
        return;
    }
    if let Some(area) = app.sidebar_area.filter(|a| contains(*a, x, y)) {
        match me.kind {
            MouseEventKind::ScrollUp => app.select_prev(),
            MouseEventKind::ScrollDown => app.select_next(),
            MouseEventKind::Down(MouseButton::Left) => {
                // Rows inside the border map to list entries.
                if y > area.y && y + 1 < area.y + area.height {
                    app.select_row((y - area.y - 1) as usize);
                    app.focus = Focus::Sidebar;
                }
            }
            _ => {}
        }
        app.dirty = true;
    }
}
