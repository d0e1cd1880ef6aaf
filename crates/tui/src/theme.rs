use ratatui::style::Color;

pub struct Theme {
    pub border_focus: Color,
    pub border_inactive: Color,
    pub chat_border: Color,
    pub sidebar_selected_fg: Color,
    pub sidebar_selected_bg: Color,
    pub user_prefix: Color,
    pub assistant_prefix: Color,
    pub streaming_text: Color,
    pub error_text: Color,
    pub hint: Color,
}

pub const THEME: Theme = Theme {
    border_focus: Color::Cyan,
    border_inactive: Color::DarkGray,
    chat_border: Color::DarkGray,
    sidebar_selected_fg: Color::Black,
    sidebar_selected_bg: Color::Cyan,
    user_prefix: Color::Green,
    assistant_prefix: Color::Magenta,
    streaming_text: Color::Gray,
    error_text: Color::Red,
    hint: Color::DarkGray,
};
