use ratatui::crossterm::event::KeyEvent;
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::record::Record;

pub const HELP_TEXT: &str = "\
Navigation
  j / Down       next row
  k / Up         previous row
  PageDown/Up    move a page
  g / G          first / last row
  Enter          show record details
  Left / Right   previous / next record (details)

Filtering (matches any field)
  /  or  f       edit filters
  Tab / S-Tab    next / previous filter field
  Enter / Esc    leave filter editing
  c              clear all filters

Sorting by bytes_used
  a              ascending (press again to switch off)
  d              descending (press again to switch off)

Other
  u              upload a file
  r              reload records
  y              copy row to clipboard
  ?              this help
  Esc            close / back
  q              quit";

/// Failure while retrieving the record collection.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error! status: {0}")]
    Status(u16),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Failure while submitting a file for parsing.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Please select a file")]
    NoFileSelected,
    #[error("could not read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Upload failed: {0}")]
    Status(u16),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("could not parse config file: {0}")]
    ConfigFormat(#[from] toml::de::Error),
    #[error("could not build http client: {0}")]
    Http(#[from] reqwest::Error),
    #[error("could not set up logging: {0}")]
    Logging(String),
}

/// Response body of `POST {base}/upload`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UploadSummary {
    pub records_processed: u64,
    pub records_stored: u64,
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug)]
pub enum Message {
    Quit,
    MoveUp,
    MoveDown,
    MovePageUp,
    MovePageDown,
    MoveBeginning,
    MoveEnd,
    MoveLeft,
    MoveRight,
    Enter,
    Exit,
    Help,
    EditFilter,
    ClearFilters,
    SortAscending,
    SortDescending,
    Upload,
    Reload,
    CopyRow,
    Resize(usize, usize),
    RawKey(KeyEvent),
    RecordsLoaded(Vec<Record>),
    FetchFailed(FetchError),
    UploadFinished(UploadSummary),
    UploadFailed(UploadError),
}
