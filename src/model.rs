use arboard::Clipboard;
use crossbeam_channel::Sender;
use ratatui::crossterm::event::{KeyCode, KeyEvent};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, trace};

use crate::backend::BackendCommand;
use crate::config::{ViewerConfig, expand_path};
use crate::domain::{FetchError, HELP_TEXT, Message, UploadError, UploadSummary, ViewerError};
use crate::inputter::{InputResult, Inputter};
use crate::record::{Field, NULL_PLACEHOLDER, Record, RecordStore};
use crate::ui::{
    COLUMN_WIDTH_MARGIN, FILTER_BAR_HEIGHT, STATUSLINE_HEIGHT, TABLE_CHROME_HEIGHT,
    UPLOAD_BAR_HEIGHT,
};
use crate::view::{FilterCriteria, SortButton, SortMode, derive_rows};

#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    EMPTY,
    LOADING,
    READY,
    FAILED,
    QUITTING,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Modus {
    TABLE,
    FILTER,
    UPLOAD,
    RECORD,
    POPUP,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnView {
    pub name: String,
    pub width: usize,
    pub data: Vec<Option<String>>, // None is rendered as the null placeholder
}

/// One filter box as shown in the filter bar.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterView {
    pub name: String,
    pub text: String,
    pub editing: bool,
    pub curser_pos: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UploadView {
    pub input: InputResult,
    pub editing: bool,
    pub in_flight: bool,
    pub result: Option<UploadOutcome>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UploadOutcome {
    pub message: String,
    pub success: bool,
}

/// Everything the ui needs for one frame. Rebuilt as a whole after every
/// change, the ui never sees a half updated view.
pub struct UIData {
    pub status: Status,
    pub error_message: Option<String>,
    pub table: Vec<ColumnView>,
    pub nrows: usize, // Rows in the derived view
    pub total_records: usize,
    pub selected_row: usize,
    pub abs_selected_row: usize,
    pub sort: SortMode,
    pub filters: Vec<FilterView>,
    pub upload: Option<UploadView>,
    pub record: Option<Vec<(String, Option<String>)>>,
    pub show_popup: bool,
    pub popup_message: String,
    pub layout: UILayout,
    pub status_message: String,
}

impl UIData {
    pub fn empty() -> Self {
        UIData {
            status: Status::EMPTY,
            error_message: None,
            table: Vec::new(),
            nrows: 0,
            total_records: 0,
            selected_row: 0,
            abs_selected_row: 0,
            sort: SortMode::None,
            filters: Vec::new(),
            upload: None,
            record: None,
            show_popup: false,
            popup_message: String::new(),
            layout: UILayout::default(),
            status_message: String::new(),
        }
    }
}

#[derive(Default, Clone, Debug, PartialEq)]
pub struct UILayout {
    pub width: usize,
    pub height: usize,
    pub upload_height: usize,
    pub filter_height: usize,
    pub table_height: usize, // Visible data rows
    pub statusline_height: usize,
}

impl UILayout {
    pub fn from_values(upload_enabled: bool, ui_width: usize, ui_height: usize) -> Self {
        let upload_height = if upload_enabled { UPLOAD_BAR_HEIGHT } else { 0 };
        let table_height = ui_height
            .saturating_sub(upload_height)
            .saturating_sub(FILTER_BAR_HEIGHT)
            .saturating_sub(STATUSLINE_HEIGHT)
            .saturating_sub(TABLE_CHROME_HEIGHT)
            .max(1);
        let layout = UILayout {
            width: ui_width,
            height: ui_height,
            upload_height,
            filter_height: FILTER_BAR_HEIGHT,
            table_height,
            statusline_height: STATUSLINE_HEIGHT,
        };
        trace!("Build UILayout: {:?}", layout);
        layout
    }
}

/// Row mapping of the derived view plus the scroll state over it.
struct TableView {
    rows: Arc<Vec<usize>>, // Derived view row index to store index
    curser_row: usize,
    offset_row: usize,
}

impl TableView {
    fn empty() -> Self {
        TableView {
            rows: Arc::new(Vec::new()),
            curser_row: 0,
            offset_row: 0,
        }
    }

    fn selected(&self) -> usize {
        self.offset_row + self.curser_row
    }

    fn reset_curser(&mut self) {
        self.curser_row = 0;
        self.offset_row = 0;
    }

    // Keep the curser inside the view after the row mapping changed
    fn clamp(&mut self, height: usize) {
        let nrows = self.rows.len();
        if nrows == 0 {
            self.reset_curser();
            return;
        }
        if self.selected() >= nrows {
            let last = nrows - 1;
            self.offset_row = last.saturating_sub(height.saturating_sub(1));
            self.curser_row = last - self.offset_row;
        }
    }
}

pub struct Model {
    config: ViewerConfig,
    pub status: Status,
    modus: Modus,
    previous_modus: Modus,
    store: RecordStore,
    criteria: FilterCriteria,
    sort: SortMode,
    table: TableView,
    record_idx: usize, // Index into the derived view
    filter_field: Field,
    input: Inputter,
    last_input: InputResult,
    upload_in_flight: bool,
    upload_result: Option<UploadOutcome>,
    error_message: Option<String>,
    commands: Sender<BackendCommand>,
    clipboard: Option<Clipboard>,
    uilayout: UILayout,
    uidata: UIData,
    status_message: String,
}

impl Model {
    pub fn init(
        config: &ViewerConfig,
        commands: Sender<BackendCommand>,
        ui_width: usize,
        ui_height: usize,
    ) -> Self {
        let mut model = Self {
            config: config.clone(),
            status: Status::EMPTY,
            modus: Modus::TABLE,
            previous_modus: Modus::TABLE,
            store: RecordStore::default(),
            criteria: FilterCriteria::default(),
            sort: SortMode::None,
            table: TableView::empty(),
            record_idx: 0,
            filter_field: Field::Id,
            input: Inputter::default(),
            last_input: InputResult::default(),
            upload_in_flight: false,
            upload_result: None,
            error_message: None,
            commands,
            clipboard: None,
            uilayout: UILayout::from_values(config.upload_enabled, ui_width, ui_height),
            uidata: UIData::empty(),
            status_message: "Started cdrview!".to_string(),
        };
        model.update_uidata();
        model
    }

    pub fn get_uidata(&self) -> &UIData {
        &self.uidata
    }

    /// Whether key events should go to the text input unmapped.
    pub fn raw_keyevents(&self) -> bool {
        matches!(self.modus, Modus::FILTER | Modus::UPLOAD)
    }

    pub fn sort_mode(&self) -> SortMode {
        self.sort
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    /// Records currently displayed, in display order.
    pub fn derived_view(&self) -> Vec<&Record> {
        let source = self.store.get();
        self.table.rows.iter().map(|&idx| &source[idx]).collect()
    }

    pub fn quit(&mut self) {
        self.status = Status::QUITTING;
    }

    pub fn update(&mut self, message: Option<Message>) -> Result<(), ViewerError> {
        let Some(msg) = message else {
            return Ok(());
        };
        if self.status == Status::QUITTING {
            return Ok(());
        }

        match msg {
            // Backend results are handled whatever the user is doing
            Message::RecordsLoaded(records) => self.records_loaded(records),
            Message::FetchFailed(e) => self.fetch_failed(e),
            Message::UploadFinished(summary) => self.upload_finished(summary),
            Message::UploadFailed(e) => self.upload_failed(e),
            Message::Resize(width, height) => self.ui_resize(width, height),
            msg => match self.modus {
                Modus::TABLE => match msg {
                    Message::Quit => self.quit(),
                    Message::MoveDown => self.move_table_selection_down(1),
                    Message::MoveUp => self.move_table_selection_up(1),
                    Message::MovePageUp => {
                        self.move_table_selection_up(self.uilayout.table_height)
                    }
                    Message::MovePageDown => {
                        self.move_table_selection_down(self.uilayout.table_height)
                    }
                    Message::MoveBeginning => self.move_table_selection_beginning(),
                    Message::MoveEnd => self.move_table_selection_end(),
                    Message::EditFilter => self.enter_filter_mode(),
                    Message::ClearFilters => self.clear_filters(),
                    Message::SortAscending => self.toggle_sort(SortButton::Ascending),
                    Message::SortDescending => self.toggle_sort(SortButton::Descending),
                    Message::Upload => self.enter_upload_mode(),
                    Message::Reload => self.reload(),
                    Message::CopyRow => self.copy_table_row(),
                    Message::Help => self.show_help(),
                    Message::Enter => self.enter(),
                    _ => (),
                },
                Modus::RECORD => match msg {
                    Message::Quit => self.quit(),
                    Message::MoveLeft | Message::MoveUp => self.previous_record(),
                    Message::MoveRight | Message::MoveDown => self.next_record(),
                    Message::CopyRow => self.copy_table_row(),
                    Message::Help => self.show_help(),
                    Message::Exit | Message::Enter => self.exit(),
                    _ => (),
                },
                Modus::POPUP => match msg {
                    Message::Quit => self.quit(),
                    Message::Exit | Message::Enter | Message::Help => self.exit(),
                    _ => (),
                },
                Modus::FILTER | Modus::UPLOAD => {
                    if let Message::RawKey(key) = msg {
                        self.raw_input(key)
                    }
                }
            },
        }
        Ok(())
    }

    // -------------------- Record source ---------------------- //

    /// Request a fresh copy of the record collection.
    pub fn reload(&mut self) {
        if self.status == Status::LOADING {
            debug!("Fetch already in flight, ignoring reload");
            return;
        }
        match self.commands.send(BackendCommand::FetchRecords) {
            Ok(()) => {
                self.status = Status::LOADING;
                self.error_message = None;
                self.set_status_message("Loading records ...");
            }
            Err(e) => {
                error!("Backend is gone: {e}");
                self.status = Status::FAILED;
                self.error_message = Some("Backend worker is not running".to_string());
            }
        }
        self.update_uidata();
    }

    fn records_loaded(&mut self, records: Vec<Record>) {
        info!("Loaded {} records", records.len());
        self.store.replace(records);
        self.status = Status::READY;
        self.error_message = None;
        self.table.reset_curser();
        self.record_idx = 0;
        if self.store.is_empty() {
            self.set_status_message("The service returned no records");
        } else {
            self.set_status_message(format!("Loaded {} records", self.store.len()));
        }
        self.recompute();
    }

    fn fetch_failed(&mut self, e: FetchError) {
        // No stale rows stay visible after a failed fetch
        self.store.clear();
        self.status = Status::FAILED;
        self.error_message = Some(e.to_string());
        if self.modus == Modus::RECORD {
            self.modus = Modus::TABLE;
        }
        self.set_status_message("Fetching records failed");
        self.recompute();
    }

    // -------------------- Derived view ---------------------- //

    fn recompute(&mut self) {
        let start_time = Instant::now();
        self.table.rows = Arc::new(derive_rows(self.store.get(), &self.criteria, self.sort));
        self.table.clamp(self.uilayout.table_height);
        trace!(
            "Recomputed view with {} rows in {}us",
            self.table.rows.len(),
            start_time.elapsed().as_micros()
        );
        self.update_uidata();
    }

    fn toggle_sort(&mut self, button: SortButton) {
        self.sort = self.sort.toggle(button);
        debug!("Sort mode is now {:?}", self.sort);
        self.recompute();
    }

    pub fn set_filter(&mut self, field: Field, text: &str) {
        if self.criteria.get(field) == text {
            return;
        }
        self.criteria.set(field, text);
        self.table.reset_curser();
        self.recompute();
    }

    fn clear_filters(&mut self) {
        self.criteria.clear();
        self.table.reset_curser();
        self.set_status_message("Filters cleared");
        self.recompute();
    }

    // -------------------- Text input ---------------------- //

    fn enter_filter_mode(&mut self) {
        trace!("Editing filter {}", self.filter_field.name());
        self.modus = Modus::FILTER;
        self.input.set(self.criteria.get(self.filter_field));
        self.last_input = self.input.get();
        self.update_uidata();
    }

    fn enter_upload_mode(&mut self) {
        if !self.config.upload_enabled {
            self.set_status_message("Uploading is disabled");
            self.update_uidata();
            return;
        }
        if self.upload_in_flight {
            self.set_status_message("Upload already in progress");
            self.update_uidata();
            return;
        }
        self.modus = Modus::UPLOAD;
        self.input.clear();
        self.last_input = self.input.get();
        self.update_uidata();
    }

    fn raw_input(&mut self, key: KeyEvent) {
        match self.modus {
            Modus::FILTER => self.filter_input(key),
            Modus::UPLOAD => self.upload_input(key),
            _ => {}
        }
    }

    fn filter_input(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Tab => self.select_filter_field(self.filter_field.next()),
            KeyCode::BackTab => self.select_filter_field(self.filter_field.previous()),
            _ => {
                self.last_input = self.input.read(key);
                if self.last_input.finished {
                    self.modus = Modus::TABLE;
                    self.input.clear();
                    self.update_uidata();
                } else {
                    let text = self.last_input.input.clone();
                    self.set_filter(self.filter_field, &text);
                    // set_filter skips the refresh for curser only moves
                    self.update_uidata();
                }
            }
        }
    }

    fn select_filter_field(&mut self, field: Field) {
        self.filter_field = field;
        self.input.set(self.criteria.get(field));
        self.last_input = self.input.get();
        self.update_uidata();
    }

    fn upload_input(&mut self, key: KeyEvent) {
        self.last_input = self.input.read(key);
        if self.last_input.finished {
            self.modus = Modus::TABLE;
            if !self.last_input.canceled {
                let raw = self.last_input.input.clone();
                self.submit_upload(&raw);
            }
            self.input.clear();
            self.last_input = self.input.get();
        }
        self.update_uidata();
    }

    // -------------------- Upload ---------------------- //

    fn submit_upload(&mut self, raw_path: &str) {
        if self.upload_in_flight {
            self.set_status_message("Upload already in progress");
            return;
        }
        if raw_path.trim().is_empty() {
            self.upload_result = Some(UploadOutcome {
                message: UploadError::NoFileSelected.to_string(),
                success: false,
            });
            return;
        }
        let path = match expand_path(raw_path) {
            Ok(path) => path,
            Err(e) => {
                self.upload_result = Some(UploadOutcome {
                    message: format!("Error: {e}"),
                    success: false,
                });
                return;
            }
        };
        info!("Uploading {}", path.display());
        match self.commands.send(BackendCommand::Upload(path)) {
            Ok(()) => {
                self.upload_in_flight = true;
                self.upload_result = None;
                self.set_status_message("Uploading ...");
            }
            Err(e) => {
                error!("Backend is gone: {e}");
                self.upload_result = Some(UploadOutcome {
                    message: "Error: backend worker is not running".to_string(),
                    success: false,
                });
            }
        }
    }

    fn upload_finished(&mut self, summary: UploadSummary) {
        self.upload_in_flight = false;
        self.upload_result = Some(UploadOutcome {
            message: format!(
                "Success! Processed {} records, stored {} records.",
                summary.records_processed, summary.records_stored
            ),
            success: true,
        });
        self.reload();
    }

    fn upload_failed(&mut self, e: UploadError) {
        self.upload_in_flight = false;
        self.upload_result = Some(UploadOutcome {
            message: format!("Error: {e}"),
            success: false,
        });
        self.update_uidata();
    }

    // -------------------- Control handling functions ---------------------- //

    fn enter(&mut self) {
        if self.table.rows.is_empty() {
            return;
        }
        self.record_idx = self.table.selected();
        self.previous_modus = self.modus;
        self.modus = Modus::RECORD;
        self.update_uidata();
    }

    fn exit(&mut self) {
        match self.modus {
            Modus::RECORD => {
                self.previous_modus = Modus::RECORD;
                self.modus = Modus::TABLE;
            }
            Modus::POPUP => {
                trace!("Close popup ...");
                self.modus = self.previous_modus;
                self.previous_modus = Modus::POPUP;
            }
            Modus::TABLE | Modus::FILTER | Modus::UPLOAD => {}
        }
        self.update_uidata();
    }

    fn show_help(&mut self) {
        self.previous_modus = self.modus;
        self.modus = Modus::POPUP;
        self.update_uidata();
    }

    fn ui_resize(&mut self, width: usize, height: usize) {
        trace!(
            "UI was resized! w:{}->{}, h:{}->{}",
            self.uilayout.width, width, self.uilayout.height, height
        );
        self.uilayout = UILayout::from_values(self.config.upload_enabled, width, height);
        self.table.clamp(self.uilayout.table_height);
        if self.table.curser_row >= self.uilayout.table_height {
            let selected = self.table.selected();
            self.table.curser_row = self.uilayout.table_height - 1;
            self.table.offset_row = selected - self.table.curser_row;
        }
        self.update_uidata();
    }

    fn move_table_selection_beginning(&mut self) {
        self.table.reset_curser();
        self.update_uidata();
    }

    fn move_table_selection_end(&mut self) {
        let nrows = self.table.rows.len();
        if nrows == 0 {
            return;
        }
        let height = self.uilayout.table_height;
        if nrows < height {
            self.table.offset_row = 0;
            self.table.curser_row = nrows - 1;
        } else {
            self.table.offset_row = nrows - height;
            self.table.curser_row = height - 1;
        }
        self.update_uidata();
    }

    fn move_table_selection_up(&mut self, size: usize) {
        let table = &mut self.table;
        let target = table.selected().saturating_sub(size);
        if target >= table.offset_row {
            table.curser_row = target - table.offset_row;
        } else {
            // Above the window, shift it up
            table.offset_row = target;
            table.curser_row = 0;
        }
        self.update_uidata();
    }

    fn move_table_selection_down(&mut self, size: usize) {
        let nrows = self.table.rows.len();
        let height = self.uilayout.table_height;
        let table = &mut self.table;
        if nrows == 0 || table.selected() + 1 >= nrows {
            return;
        }
        let target = std::cmp::min(table.selected() + size, nrows - 1);
        if target < table.offset_row + height {
            table.curser_row = target - table.offset_row;
        } else {
            // Past the bottom of the window, shift it down
            table.curser_row = height - 1;
            table.offset_row = target + 1 - height;
        }
        self.update_uidata();
    }

    fn previous_record(&mut self) {
        self.record_idx = self.record_idx.saturating_sub(1);
        self.update_uidata();
    }

    fn next_record(&mut self) {
        if self.record_idx + 1 < self.table.rows.len() {
            self.record_idx += 1;
        }
        self.update_uidata();
    }

    fn selected_record(&self) -> Option<&Record> {
        let idx = match self.modus {
            Modus::RECORD => self.record_idx,
            _ => self.table.selected(),
        };
        self.table.rows.get(idx).map(|&r| &self.store.get()[r])
    }

    fn wrap_cell_content(c: &str) -> String {
        let needs_escaping = c.contains('"');
        let needs_wrapping = c.chars().any(|c| c == ' ' || c == '\t' || c == ',');
        let mut out = String::from(c);

        if needs_escaping {
            out = out.replace('"', "\"\"");
        }
        if needs_wrapping || needs_escaping {
            out = format!("\"{out}\"");
        }
        out
    }

    /// Csv line of the selected record, nulls as empty cells.
    fn row_as_csv(record: &Record) -> String {
        Field::ALL
            .iter()
            .map(|&f| Model::wrap_cell_content(&record.text(f).unwrap_or_default()))
            .collect::<Vec<String>>()
            .join(",")
    }

    fn copy_table_row(&mut self) {
        let Some(content) = self.selected_record().map(Model::row_as_csv) else {
            return;
        };
        trace!("Row content: {}", content);

        if self.clipboard.is_none() {
            match Clipboard::new() {
                Ok(c) => self.clipboard = Some(c),
                Err(e) => {
                    error!("Clipboard unavailable: {e:?}");
                    self.set_status_message("Clipboard unavailable");
                    self.update_uidata();
                    return;
                }
            }
        }
        if let Some(clipboard) = self.clipboard.as_mut() {
            match clipboard.set_text(content) {
                Ok(_) => self.set_status_message("Copied row to clipboard"),
                Err(e) => {
                    error!("Error copying to clipboard: {e:?}");
                    self.set_status_message("Copying to clipboard failed");
                }
            }
        }
        self.update_uidata();
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
    }

    // -------------------- Render snapshot ---------------------- //

    fn calculate_column_width(name: &str, data: &[Option<String>], max_width: usize) -> usize {
        let widest = data
            .iter()
            .map(|v| v.as_deref().unwrap_or(NULL_PLACEHOLDER).chars().count())
            .max()
            .unwrap_or(0);
        std::cmp::min(
            std::cmp::max(name.chars().count(), widest) + COLUMN_WIDTH_MARGIN,
            max_width,
        )
    }

    fn build_columns(&self) -> Vec<ColumnView> {
        let source = self.store.get();
        let rbegin = self.table.offset_row;
        let rend = std::cmp::min(rbegin + self.uilayout.table_height, self.table.rows.len());
        let window = if rbegin < rend {
            &self.table.rows[rbegin..rend]
        } else {
            &[][..]
        };

        Field::ALL
            .iter()
            .map(|&field| {
                let data: Vec<Option<String>> = window
                    .iter()
                    .map(|&ridx| source[ridx].text(field))
                    .collect();
                let name = field.name().to_string();
                let width = Self::calculate_column_width(&name, &data, self.config.max_column_width);
                ColumnView { name, width, data }
            })
            .collect()
    }

    fn build_filters(&self) -> Vec<FilterView> {
        Field::ALL
            .iter()
            .map(|&field| {
                let editing = self.modus == Modus::FILTER && field == self.filter_field;
                FilterView {
                    name: field.name().to_string(),
                    text: self.criteria.get(field).to_string(),
                    editing,
                    curser_pos: if editing { self.last_input.curser_pos } else { 0 },
                }
            })
            .collect()
    }

    fn build_record(&self) -> Option<Vec<(String, Option<String>)>> {
        if self.modus != Modus::RECORD {
            return None;
        }
        self.selected_record().map(|record| {
            Field::ALL
                .iter()
                .map(|&f| (f.name().to_string(), record.text(f)))
                .collect()
        })
    }

    fn update_uidata(&mut self) {
        let upload = self.config.upload_enabled.then(|| UploadView {
            input: if self.modus == Modus::UPLOAD {
                self.last_input.clone()
            } else {
                InputResult::default()
            },
            editing: self.modus == Modus::UPLOAD,
            in_flight: self.upload_in_flight,
            result: self.upload_result.clone(),
        });

        self.uidata = UIData {
            status: self.status.clone(),
            error_message: self.error_message.clone(),
            table: self.build_columns(),
            nrows: self.table.rows.len(),
            total_records: self.store.len(),
            selected_row: self.table.curser_row,
            abs_selected_row: self.table.selected(),
            sort: self.sort,
            filters: self.build_filters(),
            upload,
            record: self.build_record(),
            show_popup: self.modus == Modus::POPUP,
            popup_message: HELP_TEXT.to_string(),
            layout: self.uilayout.clone(),
            status_message: self.status_message.clone(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{Receiver, unbounded};
    use ratatui::crossterm::event::KeyModifiers;
    use serde_json::json;

    fn model() -> (Model, Receiver<BackendCommand>) {
        let (tx, rx) = unbounded();
        let model = Model::init(&ViewerConfig::default(), tx, 120, 30);
        (model, rx)
    }

    fn records() -> Vec<Record> {
        serde_json::from_value(json!([
            {"id": 1, "bytes_used": 50, "ip": "10.0.0.1"},
            {"id": 2, "bytes_used": null, "ip": "10.0.0.2"},
            {"id": 3, "bytes_used": 10, "ip": null},
        ]))
        .unwrap()
    }

    fn loaded() -> (Model, Receiver<BackendCommand>) {
        let (mut model, rx) = model();
        model.reload();
        assert_eq!(rx.try_recv(), Ok(BackendCommand::FetchRecords));
        model
            .update(Some(Message::RecordsLoaded(records())))
            .unwrap();
        (model, rx)
    }

    fn ids(model: &Model) -> Vec<String> {
        model
            .derived_view()
            .iter()
            .map(|r| r.cell(Field::Id))
            .collect()
    }

    fn key(model: &mut Model, code: KeyCode) {
        model
            .update(Some(Message::RawKey(KeyEvent::new(code, KeyModifiers::NONE))))
            .unwrap();
    }

    fn type_str(model: &mut Model, s: &str) {
        for c in s.chars() {
            key(model, KeyCode::Char(c));
        }
    }

    #[test]
    fn reload_sets_loading_and_ignores_duplicates() {
        let (mut model, rx) = model();
        model.reload();
        model.reload();
        assert_eq!(model.status, Status::LOADING);
        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn loaded_records_are_shown_in_source_order() {
        let (model, _rx) = loaded();
        assert_eq!(model.status, Status::READY);
        assert_eq!(ids(&model), vec!["1", "2", "3"]);
        let ui = model.get_uidata();
        assert_eq!(ui.nrows, 3);
        assert_eq!(ui.table.len(), 6);
        assert_eq!(ui.table[5].data[2], None);
    }

    #[test]
    fn typing_a_filter_recomputes_on_every_key() {
        let (mut model, _rx) = loaded();
        model.update(Some(Message::EditFilter)).unwrap();
        assert!(model.raw_keyevents());
        // Move from id to ip
        for _ in 0..5 {
            key(&mut model, KeyCode::Tab);
        }
        type_str(&mut model, "10.0.0.");
        assert_eq!(ids(&model), vec!["1", "2"]);
        key(&mut model, KeyCode::Char('2'));
        assert_eq!(ids(&model), vec!["2"]);
        key(&mut model, KeyCode::Backspace);
        assert_eq!(ids(&model), vec!["1", "2"]);

        key(&mut model, KeyCode::Enter);
        assert!(!model.raw_keyevents());
        assert_eq!(model.criteria().get(Field::Ip), "10.0.0.");
        assert_eq!(ids(&model), vec!["1", "2"]);
    }

    #[test]
    fn sort_keys_share_one_mode() {
        let (mut model, _rx) = loaded();
        model.update(Some(Message::SortAscending)).unwrap();
        assert_eq!(ids(&model), vec!["2", "3", "1"]);
        model.update(Some(Message::SortDescending)).unwrap();
        assert_eq!(model.sort_mode(), SortMode::Descending);
        assert_eq!(ids(&model), vec!["1", "3", "2"]);
        model.update(Some(Message::SortDescending)).unwrap();
        assert_eq!(model.sort_mode(), SortMode::None);
        assert_eq!(ids(&model), vec!["1", "2", "3"]);
    }

    #[test]
    fn filter_then_sort_scenario() {
        let (mut model, _rx) = loaded();
        model.set_filter(Field::Ip, "10.0.0");
        model.update(Some(Message::SortAscending)).unwrap();
        assert_eq!(ids(&model), vec!["2", "1"]);
        model.update(Some(Message::ClearFilters)).unwrap();
        assert_eq!(ids(&model), vec!["2", "3", "1"]);
    }

    #[test]
    fn fetch_failure_drops_stale_rows() {
        let (mut model, _rx) = loaded();
        model.reload();
        model
            .update(Some(Message::FetchFailed(FetchError::Status(503))))
            .unwrap();
        assert_eq!(model.status, Status::FAILED);
        assert!(model.derived_view().is_empty());
        let ui = model.get_uidata();
        assert_eq!(ui.error_message.as_deref(), Some("HTTP error! status: 503"));
        assert_eq!(ui.total_records, 0);
    }

    #[test]
    fn new_source_keeps_filters_and_sort() {
        let (mut model, _rx) = loaded();
        model.set_filter(Field::Ip, "10.0.0");
        model.update(Some(Message::SortDescending)).unwrap();
        let mut next = records();
        next.push(
            serde_json::from_value(json!({"id": 4, "bytes_used": 99, "ip": "10.0.0.9"})).unwrap(),
        );
        model.update(Some(Message::RecordsLoaded(next))).unwrap();
        assert_eq!(ids(&model), vec!["4", "1", "2"]);
    }

    #[test]
    fn empty_upload_path_sends_nothing() {
        let (mut model, rx) = loaded();
        model.update(Some(Message::Upload)).unwrap();
        key(&mut model, KeyCode::Enter);
        assert!(rx.try_recv().is_err());
        let upload = model.get_uidata().upload.clone().unwrap();
        assert_eq!(
            upload.result,
            Some(UploadOutcome {
                message: "Please select a file".to_string(),
                success: false
            })
        );
    }

    #[test]
    fn successful_upload_triggers_refetch() {
        let (mut model, rx) = loaded();
        model.update(Some(Message::Upload)).unwrap();
        type_str(&mut model, "/tmp/cdr.txt");
        key(&mut model, KeyCode::Enter);
        assert_eq!(
            rx.try_recv(),
            Ok(BackendCommand::Upload("/tmp/cdr.txt".into()))
        );

        // A second upload is refused while the first is in flight
        model.update(Some(Message::Upload)).unwrap();
        assert!(!model.raw_keyevents());
        assert!(model.get_uidata().upload.as_ref().unwrap().in_flight);

        model
            .update(Some(Message::UploadFinished(UploadSummary {
                records_processed: 5,
                records_stored: 4,
                filename: None,
            })))
            .unwrap();
        assert_eq!(rx.try_recv(), Ok(BackendCommand::FetchRecords));
        assert_eq!(model.status, Status::LOADING);
        let upload = model.get_uidata().upload.clone().unwrap();
        assert!(!upload.in_flight);
        assert_eq!(
            upload.result.unwrap().message,
            "Success! Processed 5 records, stored 4 records."
        );
    }

    #[test]
    fn failed_upload_does_not_refetch() {
        let (mut model, rx) = loaded();
        model.update(Some(Message::Upload)).unwrap();
        type_str(&mut model, "cdr.txt");
        key(&mut model, KeyCode::Enter);
        let _ = rx.try_recv();
        model
            .update(Some(Message::UploadFailed(UploadError::Status(500))))
            .unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(model.status, Status::READY);
        let result = model.get_uidata().upload.clone().unwrap().result.unwrap();
        assert_eq!(result.message, "Error: Upload failed: 500");
        assert!(!result.success);
    }

    #[test]
    fn upload_can_be_disabled() {
        let (tx, _rx) = unbounded();
        let config = ViewerConfig::default().upload_enabled(false);
        let mut model = Model::init(&config, tx, 80, 24);
        model.update(Some(Message::Upload)).unwrap();
        assert!(!model.raw_keyevents());
        assert!(model.get_uidata().upload.is_none());
    }

    #[test]
    fn curser_stays_inside_the_view() {
        let (tx, _rx) = unbounded();
        let mut model = Model::init(&ViewerConfig::default(), tx, 80, 15);
        let many: Vec<Record> = (0..50)
            .map(|i| serde_json::from_value(json!({"id": i, "bytes_used": i})).unwrap())
            .collect();
        model.update(Some(Message::RecordsLoaded(many))).unwrap();
        let height = model.get_uidata().layout.table_height;

        model.update(Some(Message::MoveEnd)).unwrap();
        assert_eq!(model.get_uidata().abs_selected_row, 49);
        assert_eq!(model.get_uidata().selected_row, height - 1);
        model.update(Some(Message::MoveDown)).unwrap();
        assert_eq!(model.get_uidata().abs_selected_row, 49);

        model.set_filter(Field::Id, "4");
        // 4, 14, 24, 34, 40..49
        assert_eq!(model.get_uidata().nrows, 14);
        assert_eq!(model.get_uidata().abs_selected_row, 0);
        model.update(Some(Message::MovePageDown)).unwrap();
        assert_eq!(model.get_uidata().abs_selected_row, height);
        model.update(Some(Message::MoveBeginning)).unwrap();
        assert_eq!(model.get_uidata().abs_selected_row, 0);
        model.update(Some(Message::MoveUp)).unwrap();
        assert_eq!(model.get_uidata().abs_selected_row, 0);
    }

    #[test]
    fn record_view_walks_the_derived_view() {
        let (mut model, _rx) = loaded();
        model.update(Some(Message::SortAscending)).unwrap();
        model.update(Some(Message::Enter)).unwrap();
        let record = model.get_uidata().record.clone().unwrap();
        assert_eq!(record[0], ("id".to_string(), Some("2".to_string())));
        assert_eq!(record[2], ("bytes_used".to_string(), None));

        model.update(Some(Message::MoveRight)).unwrap();
        model.update(Some(Message::MoveRight)).unwrap();
        model.update(Some(Message::MoveRight)).unwrap();
        let record = model.get_uidata().record.clone().unwrap();
        assert_eq!(record[0].1.as_deref(), Some("1"));

        model.update(Some(Message::Exit)).unwrap();
        assert!(model.get_uidata().record.is_none());
    }

    #[test]
    fn help_popup_opens_and_closes() {
        let (mut model, _rx) = loaded();
        model.update(Some(Message::Help)).unwrap();
        assert!(model.get_uidata().show_popup);
        model.update(Some(Message::Exit)).unwrap();
        assert!(!model.get_uidata().show_popup);
    }

    #[test]
    fn quitting_ignores_late_results() {
        let (mut model, _rx) = loaded();
        model.update(Some(Message::Quit)).unwrap();
        model.update(Some(Message::RecordsLoaded(Vec::new()))).unwrap();
        assert_eq!(model.status, Status::QUITTING);
    }

    #[test]
    fn csv_row_escapes_cells() {
        let record: Record = serde_json::from_value(
            json!({"id": 9, "mnc": null, "dmcc": "a \"b\"", "ip": "1.2.3.4"}),
        )
        .unwrap();
        assert_eq!(Model::row_as_csv(&record), "9,,,\"a \"\"b\"\"\",,1.2.3.4");
    }
}
