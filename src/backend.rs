//! Worker thread running the http calls on its own tokio runtime.
//!
//! The ui thread queues [`BackendCommand`]s and drains the resulting
//! [`Message`]s between frames, so derivation never waits on the network.

use crossbeam_channel::{Receiver, Sender};
use std::path::PathBuf;
use std::thread;
use tracing::{error, info, trace};

use crate::client::ApiClient;
use crate::domain::{Message, ViewerError};

#[derive(Debug, Clone, PartialEq)]
pub enum BackendCommand {
    FetchRecords,
    Upload(PathBuf),
}

pub fn spawn(
    client: ApiClient,
    cmd_rx: Receiver<BackendCommand>,
    event_tx: Sender<Message>,
) -> Result<thread::JoinHandle<()>, ViewerError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let handle = thread::Builder::new()
        .name("cdrview-backend".into())
        .spawn(move || {
            info!("Backend worker started for {}", client.base_url());
            // Commands run one at a time, the ui never has more than one
            // fetch and one upload outstanding.
            for command in cmd_rx.iter() {
                trace!("Backend command {command:?}");
                let message = runtime.block_on(execute(&client, command));
                if event_tx.send(message).is_err() {
                    break;
                }
            }
            info!("Backend worker stopped");
        })?;
    Ok(handle)
}

async fn execute(client: &ApiClient, command: BackendCommand) -> Message {
    match command {
        BackendCommand::FetchRecords => match client.fetch_records().await {
            Ok(records) => Message::RecordsLoaded(records),
            Err(e) => {
                error!("Fetching records failed: {e}");
                Message::FetchFailed(e)
            }
        },
        BackendCommand::Upload(path) => match client.upload(&path).await {
            Ok(summary) => Message::UploadFinished(summary),
            Err(e) => {
                error!("Upload of {} failed: {e}", path.display());
                Message::UploadFailed(e)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ViewerConfig;
    use crate::domain::{FetchError, UploadError};
    use std::time::Duration;

    #[test]
    fn worker_reports_failures_as_messages() {
        // Port 9 on localhost is not expected to serve http
        let config = ViewerConfig::default()
            .base_url("http://127.0.0.1:9/api")
            .request_timeout(2u64);
        let client = ApiClient::new(&config).unwrap();
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let handle = spawn(client, cmd_rx, event_tx).unwrap();

        cmd_tx.send(BackendCommand::Upload(PathBuf::new())).unwrap();
        cmd_tx.send(BackendCommand::FetchRecords).unwrap();

        let first = event_rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert!(matches!(
            first,
            Message::UploadFailed(UploadError::NoFileSelected)
        ));
        let second = event_rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert!(matches!(second, Message::FetchFailed(FetchError::Transport(_))));

        drop(cmd_tx);
        handle.join().unwrap();
    }
}
