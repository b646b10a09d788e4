use ratatui::{
    Frame,
    layout::{Constraint, Flex, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Cell, Clear, Paragraph, Row, Table, TableState, Wrap},
};

use crate::model::{ColumnView, Model, Status, UIData, UploadView};
use crate::record::NULL_PLACEHOLDER;
use crate::view::{SortButton, SortMode};

pub const UPLOAD_BAR_HEIGHT: usize = 3;
pub const FILTER_BAR_HEIGHT: usize = 3;
pub const STATUSLINE_HEIGHT: usize = 1;
// Table borders and the header row
pub const TABLE_CHROME_HEIGHT: usize = 3;
pub const COLUMN_WIDTH_MARGIN: usize = 2;

const NO_VALUE_STYLE: Style = Style::new()
    .fg(Color::DarkGray)
    .add_modifier(Modifier::ITALIC);

#[derive(Debug, Default)]
pub struct TableUI {
    table_state: TableState,
}

impl TableUI {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draw(&mut self, model: &Model, frame: &mut Frame) {
        let data = model.get_uidata();
        let area = frame.area();

        let mut constraints = Vec::with_capacity(4);
        if data.upload.is_some() {
            constraints.push(Constraint::Length(UPLOAD_BAR_HEIGHT as u16));
        }
        constraints.push(Constraint::Length(FILTER_BAR_HEIGHT as u16));
        constraints.push(Constraint::Min(0));
        constraints.push(Constraint::Length(STATUSLINE_HEIGHT as u16));
        let areas = Layout::vertical(constraints).split(area);

        let mut next = 0;
        if let Some(upload) = &data.upload {
            self.draw_upload_bar(upload, frame, areas[next]);
            next += 1;
        }
        self.draw_filter_bar(data, frame, areas[next]);
        self.draw_body(data, frame, areas[next + 1]);
        self.draw_statusline(data, frame, areas[next + 2]);

        if data.show_popup {
            self.draw_popup(&data.popup_message, frame, area);
        }
    }

    fn draw_upload_bar(&self, upload: &UploadView, frame: &mut Frame, area: Rect) {
        let mut block = Block::bordered().title(" Upload ");
        let line = if upload.editing {
            block = block.border_style(Style::new().fg(Color::Yellow));
            Line::from(vec!["file: ".into(), upload.input.input.clone().into()])
        } else if upload.in_flight {
            Line::from("Uploading ...".yellow())
        } else if let Some(result) = &upload.result {
            if result.success {
                Line::from(result.message.clone().green())
            } else {
                Line::from(result.message.clone().red())
            }
        } else {
            Line::from(vec![
                "Press ".dark_gray(),
                "<u>".blue().bold(),
                " to upload and parse a file".dark_gray(),
            ])
        };
        frame.render_widget(Paragraph::new(line).block(block), area);

        if upload.editing {
            let x = area
                .x
                .saturating_add(1 + "file: ".len() as u16)
                .saturating_add(cursor_offset(upload.input.curser_pos));
            frame.set_cursor_position((x.min(area.right().saturating_sub(2)), area.y + 1));
        }
    }

    fn draw_filter_bar(&self, data: &UIData, frame: &mut Frame, area: Rect) {
        let n = data.filters.len().max(1) as u32;
        let boxes = Layout::horizontal((0..n).map(|_| Constraint::Ratio(1, n))).split(area);

        for (filter, &rect) in data.filters.iter().zip(boxes.iter()) {
            let mut block = Block::bordered().title(format!(" {} ", filter.name));
            if filter.editing {
                block = block.border_style(Style::new().fg(Color::Yellow));
            } else if !filter.text.trim().is_empty() {
                block = block.border_style(Style::new().fg(Color::Cyan));
            }
            frame.render_widget(Paragraph::new(filter.text.as_str()).block(block), rect);

            if filter.editing {
                let x = rect
                    .x
                    .saturating_add(1)
                    .saturating_add(cursor_offset(filter.curser_pos));
                frame.set_cursor_position((x.min(rect.right().saturating_sub(2)), rect.y + 1));
            }
        }
    }

    fn sort_title(sort: SortMode) -> Line<'static> {
        let button = |label: &'static str, b: SortButton| {
            if sort.is_pressed(b) {
                let pressed = Style::new()
                    .fg(Color::Black)
                    .bg(Color::White)
                    .add_modifier(Modifier::BOLD);
                Span::styled(label, pressed)
            } else {
                Span::styled(label, Style::new().fg(Color::White))
            }
        };
        Line::from(vec![
            " bytes_used ".into(),
            button("[a ▲]", SortButton::Ascending),
            " ".into(),
            button("[d ▼]", SortButton::Descending),
            " ".into(),
        ])
    }

    fn draw_body(&mut self, data: &UIData, frame: &mut Frame, area: Rect) {
        let title = Line::from(vec![
            " Records ".bold(),
            format!("{}", data.nrows).yellow().bold(),
            format!(" of {} ", data.total_records).into(),
        ]);
        let block = Block::bordered()
            .title(title)
            .title_top(Self::sort_title(data.sort).right_aligned());

        let message = match data.status {
            Status::EMPTY => Some(Text::from("No records loaded")),
            Status::LOADING => Some(Text::from("Loading records ...".yellow())),
            Status::FAILED => Some(Text::from(vec![
                Line::from("Error".red().bold()),
                Line::from(data.error_message.clone().unwrap_or_default().red()),
            ])),
            Status::READY | Status::QUITTING if data.nrows == 0 => {
                Some(Text::from("No results".dark_gray()))
            }
            _ => None,
        };
        if let Some(text) = message {
            frame.render_widget(Paragraph::new(text).centered().block(block), area);
            return;
        }

        if let Some(record) = &data.record {
            self.draw_record(record, block, frame, area);
        } else {
            self.draw_table(&data.table, data.selected_row, block, frame, area);
        }
    }

    fn value_cell(value: &Option<String>) -> Cell<'_> {
        match value {
            Some(v) => Cell::from(v.as_str()),
            None => Cell::from(Span::styled(NULL_PLACEHOLDER, NO_VALUE_STYLE)),
        }
    }

    fn draw_table(
        &mut self,
        columns: &[ColumnView],
        selected_row: usize,
        block: Block,
        frame: &mut Frame,
        area: Rect,
    ) {
        let nrows = columns.first().map(|c| c.data.len()).unwrap_or(0);
        let header = Row::new(columns.iter().map(|c| Cell::from(c.name.as_str().bold())))
            .style(Style::new().fg(Color::Cyan));
        let rows = (0..nrows)
            .map(|r| Row::new(columns.iter().map(|c| Self::value_cell(&c.data[r]))));
        let widths = columns.iter().map(|c| Constraint::Length(c.width as u16));

        let table = Table::new(rows, widths)
            .header(header)
            .block(block)
            .row_highlight_style(Style::new().add_modifier(Modifier::REVERSED));

        self.table_state.select(Some(selected_row));
        frame.render_stateful_widget(table, area, &mut self.table_state);
    }

    fn draw_record(
        &self,
        record: &[(String, Option<String>)],
        block: Block,
        frame: &mut Frame,
        area: Rect,
    ) {
        let name_width = record.iter().map(|(n, _)| n.len()).max().unwrap_or(0) as u16;
        let rows = record.iter().map(|(name, value)| {
            Row::new(vec![
                Cell::from(name.as_str().cyan().bold()),
                Self::value_cell(value),
            ])
        });
        let block = block.title_bottom(Line::from(vec![
            " <Left>/<Right> ".blue().bold(),
            "previous/next ".into(),
            "<Esc> ".blue().bold(),
            "back ".into(),
        ]));
        let table = Table::new(rows, [Constraint::Length(name_width + 2), Constraint::Fill(1)])
            .block(block);
        frame.render_widget(table, area);
    }

    fn draw_statusline(&self, data: &UIData, frame: &mut Frame, area: Rect) {
        let position = if data.nrows > 0 {
            format!("{}/{} ", data.abs_selected_row + 1, data.nrows)
        } else {
            String::new()
        };
        let [left, right] = Layout::horizontal([
            Constraint::Fill(1),
            Constraint::Length(position.len() as u16),
        ])
        .areas(area);
        frame.render_widget(
            Paragraph::new(Line::from(vec![
                " ".into(),
                data.status_message.as_str().into(),
                "  <?> help".dark_gray(),
            ])),
            left,
        );
        frame.render_widget(Paragraph::new(position).right_aligned(), right);
    }

    fn draw_popup(&self, message: &str, frame: &mut Frame, area: Rect) {
        let [area] = Layout::vertical([Constraint::Percentage(80)])
            .flex(Flex::Center)
            .areas(area);
        let [area] = Layout::horizontal([Constraint::Percentage(60)])
            .flex(Flex::Center)
            .areas(area);
        let block = Block::bordered()
            .title(Line::from(" Help ".bold()).centered())
            .title_bottom(Line::from(" <Esc> close ".blue().bold()).centered());
        frame.render_widget(Clear, area);
        frame.render_widget(
            Paragraph::new(message)
                .wrap(Wrap { trim: false })
                .block(block),
            area,
        );
    }
}

// Cursor columns past the u16 range stick to the far edge
fn cursor_offset(pos: usize) -> u16 {
    u16::try_from(pos).unwrap_or(u16::MAX)
}
