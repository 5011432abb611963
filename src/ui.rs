use crate::app::{Field, InputForm};
use crate::audio::ToneChannels;
use crate::fetch::FetchDispatcher;
use crate::grid::GridView;
use crate::model::{DAYS_PER_WEEK, WEEKS_PER_YEAR};
use crate::session::{ControlState, SessionController};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

const APP_TITLE_WITH_VERSION: &str = concat!("TonalHub v", env!("CARGO_PKG_VERSION"), "  ");
const DAY_LABELS: [&str; DAYS_PER_WEEK] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
const DAY_LABEL_WIDTH: u16 = 4;

#[derive(Clone, Copy)]
struct ThemePalette {
    bg: Color,
    panel_bg: Color,
    panel_alt_bg: Color,
    border: Color,
    text: Color,
    muted: Color,
    accent: Color,
    alert: Color,
    selected_bg: Color,
    playing: Color,
    idle_cell: Color,
}

const PALETTE: ThemePalette = ThemePalette {
    bg: Color::Rgb(10, 15, 24),
    panel_bg: Color::Rgb(19, 29, 43),
    panel_alt_bg: Color::Rgb(24, 38, 58),
    border: Color::Rgb(69, 121, 176),
    text: Color::Rgb(214, 228, 248),
    muted: Color::Rgb(149, 173, 204),
    accent: Color::Rgb(100, 203, 184),
    alert: Color::Rgb(249, 174, 88),
    selected_bg: Color::Rgb(34, 55, 82),
    playing: Color::Rgb(255, 122, 165),
    idle_cell: Color::Rgb(40, 56, 78),
};

pub fn draw<C, D>(
    frame: &mut Frame,
    controller: &SessionController<C, GridView, D>,
    form: &InputForm,
) where
    C: ToneChannels,
    D: FetchDispatcher,
{
    let colors = PALETTE;
    frame.render_widget(
        Block::default().style(Style::default().bg(colors.bg)),
        frame.area(),
    );

    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(4),
            Constraint::Min(9),
            Constraint::Length(3),
            Constraint::Length(3),
        ])
        .split(frame.area());

    draw_header(frame, vertical[0], controller, &colors);
    draw_form(frame, vertical[1], form, &colors);
    draw_grid(frame, vertical[2], controller.grid(), &colors);
    draw_status(frame, vertical[3], controller, &colors);
    draw_footer(frame, vertical[4], controller.control_state(), &colors);
}

fn draw_header<C, D>(
    frame: &mut Frame,
    area: Rect,
    controller: &SessionController<C, GridView, D>,
    colors: &ThemePalette,
) where
    C: ToneChannels,
    D: FetchDispatcher,
{
    frame.render_widget(
        panel_block("TonalHub", colors.panel_bg, colors.text, colors.border),
        area,
    );
    let inner = area.inner(Margin {
        vertical: 1,
        horizontal: 1,
    });
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(44), Constraint::Percentage(56)])
        .split(inner);

    let output = controller
        .channels()
        .output_name()
        .unwrap_or_else(|| String::from("silent"));
    let left = Paragraph::new(Line::from(vec![
        Span::styled(
            APP_TITLE_WITH_VERSION,
            Style::default()
                .fg(colors.accent)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(format!("Output {output}"), Style::default().fg(colors.muted)),
    ]));
    frame.render_widget(left, chunks[0]);

    let right = Paragraph::new(Span::styled(
        controller.location().as_str(),
        Style::default().fg(colors.muted),
    ))
    .alignment(Alignment::Right);
    frame.render_widget(right, chunks[1]);
}

fn draw_form(frame: &mut Frame, area: Rect, form: &InputForm, colors: &ThemePalette) {
    let block = panel_block("Repository", colors.panel_alt_bg, colors.text, colors.border);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let lines = vec![
        field_line("User", &form.user, form.focus == Field::User, colors),
        field_line(
            "Repository",
            &form.repository,
            form.focus == Field::Repository,
            colors,
        ),
    ];
    frame.render_widget(Paragraph::new(lines), inner);
}

fn field_line<'a>(
    label: &'a str,
    value: &'a str,
    focused: bool,
    colors: &ThemePalette,
) -> Line<'a> {
    let marker = if focused { "-> " } else { "   " };
    let value_style = if focused {
        Style::default()
            .bg(colors.selected_bg)
            .fg(Color::White)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(colors.text)
    };
    Line::from(vec![
        Span::styled(marker, Style::default().fg(colors.accent)),
        Span::styled(format!("{label:<11}"), Style::default().fg(colors.muted)),
        Span::styled(value, value_style),
        Span::styled(if focused { "_" } else { "" }, Style::default().fg(colors.accent)),
    ])
}

fn draw_grid(frame: &mut Frame, area: Rect, grid: &GridView, colors: &ThemePalette) {
    let title = match grid.playing_week() {
        Some(week) => format!("Commit activity / week {}", week + 1),
        None => String::from("Commit activity"),
    };
    let block = panel_block(&title, colors.panel_bg, colors.text, colors.border);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let cell_width = cell_width(inner.width);
    let lines: Vec<Line> = (0..DAYS_PER_WEEK)
        .map(|day| grid_row(grid, day, cell_width, colors))
        .collect();
    frame.render_widget(Paragraph::new(lines), inner);
}

/// Two columns per week when all 52 fit, otherwise one.
fn cell_width(available: u16) -> usize {
    let wide = DAY_LABEL_WIDTH as usize + WEEKS_PER_YEAR * 2;
    if available as usize >= wide { 2 } else { 1 }
}

fn grid_row(grid: &GridView, day: usize, cell_width: usize, colors: &ThemePalette) -> Line<'static> {
    let mut spans = Vec::with_capacity(WEEKS_PER_YEAR + 1);
    spans.push(Span::styled(
        format!("{:<width$}", DAY_LABELS[day], width = DAY_LABEL_WIDTH as usize),
        Style::default().fg(colors.muted),
    ));
    for week in 0..WEEKS_PER_YEAR {
        let active = grid.is_day_active(week, day);
        let playing = grid.is_week_playing(week);
        let glyph = if active { "■" } else { "·" };
        let fg = match (active, playing) {
            (true, true) => Color::White,
            (true, false) => colors.accent,
            (false, true) => colors.playing,
            (false, false) => colors.idle_cell,
        };
        let mut style = Style::default().fg(fg);
        if playing {
            style = style.bg(colors.selected_bg).add_modifier(Modifier::BOLD);
        }
        spans.push(Span::styled(format!("{glyph:<cell_width$}"), style));
    }
    Line::from(spans)
}

fn draw_status<C, D>(
    frame: &mut Frame,
    area: Rect,
    controller: &SessionController<C, GridView, D>,
    colors: &ThemePalette,
) where
    C: ToneChannels,
    D: FetchDispatcher,
{
    let (text, color) = match controller.error_message() {
        Some(message) => (message.to_string(), colors.alert),
        None => (status_text(controller), colors.text),
    };
    let status = Paragraph::new(Span::styled(text, Style::default().fg(color)))
        .wrap(Wrap { trim: true })
        .block(panel_block("Status", colors.panel_bg, colors.text, colors.border));
    frame.render_widget(status, area);
}

fn status_text<C, D>(controller: &SessionController<C, GridView, D>) -> String
where
    C: ToneChannels,
    D: FetchDispatcher,
{
    match controller.control_state() {
        ControlState::Busy => match controller.retries() {
            0 => String::from("Fetching commit activity..."),
            retries => format!("Fetching commit activity... GitHub is still computing (retry {retries})"),
        },
        ControlState::Playing => {
            let scheduler = controller.scheduler();
            match (scheduler.cursor(), scheduler.week_count()) {
                (Some(cursor), Some(total)) => {
                    format!("Week {}/{}", (cursor + 1).min(total), total)
                }
                _ => String::from("Playing"),
            }
        }
        ControlState::Idle => String::from("Ready"),
    }
}

fn draw_footer(frame: &mut Frame, area: Rect, control: ControlState, colors: &ThemePalette) {
    let (label, label_color) = match control {
        ControlState::Idle => ("[ Play ]", colors.accent),
        ControlState::Busy => ("[ ... ]", colors.muted),
        ControlState::Playing => ("[ Stop ]", colors.playing),
    };
    let footer = Paragraph::new(Line::from(vec![
        Span::styled(
            label,
            Style::default().fg(label_color).add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            "  Enter play/stop  Esc stop  Tab switch field  Ctrl-C quit",
            Style::default().fg(colors.muted),
        ),
    ]))
    .block(panel_block("Controls", colors.panel_bg, colors.text, colors.border));
    frame.render_widget(footer, area);
}

fn panel_block(title: &str, bg: Color, text: Color, border: Color) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .title(Span::styled(
            format!(" {title} "),
            Style::default().fg(text).add_modifier(Modifier::BOLD),
        ))
        .border_style(Style::default().fg(border))
        .style(Style::default().bg(bg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrow_areas_fall_back_to_single_width_cells() {
        assert_eq!(cell_width(200), 2);
        assert_eq!(cell_width(DAY_LABEL_WIDTH + 104), 2);
        assert_eq!(cell_width(DAY_LABEL_WIDTH + 103), 1);
        assert_eq!(cell_width(10), 1);
    }

    #[test]
    fn grid_row_has_one_cell_per_week() {
        let grid = GridView::new();
        let row = grid_row(&grid, 0, 2, &PALETTE);
        assert_eq!(row.spans.len(), WEEKS_PER_YEAR + 1);
        assert_eq!(row.spans[0].content, "Sun ");
        assert_eq!(row.spans[1].content, "· ");
    }
}
