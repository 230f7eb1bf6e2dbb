// Streamkeep - offline playback core for mobile video clients
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Byte transfer seam
//!
//! On mobile the platform's download service moves the encrypted stream to
//! disk; the core only consumes its event stream. [`HttpTransferClient`] is
//! the desktop implementation over reqwest.
//!
//! # Resume Mechanism
//! 1. If the destination already holds bytes, send `Range: bytes=<len>-`
//! 2. 206 Partial Content: append to the file
//! 3. 200 OK: the server ignored the range, start over
//!
//! Pausing flushes and drops the connection; resuming re-requests the rest
//! with a new range.

use crate::api::client::map_send_error;
use crate::download::progress::ByteProgress;
use crate::error::{Result, StreamkeepError};
use crate::models::ContentId;
use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use reqwest::header::RANGE;
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

const DOWNLOAD_BUFF_SZ: usize = 64 * 1024;
const EVENT_BUFFER: usize = 32;

/// One stream to move to disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub content_id: ContentId,
    pub url: String,
    pub destination: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    /// Fraction written (0.0 - 1.0)
    Progress(f64),
    Completed,
    Failed(String),
}

/// Platform download service
///
/// After `cancel` the event channel closes without `Completed`.
#[async_trait]
pub trait TransferClient: Send + Sync {
    async fn start(&self, request: &TransferRequest) -> Result<mpsc::Receiver<TransferEvent>>;
    async fn pause(&self, request: &TransferRequest) -> Result<()>;
    async fn resume(&self, request: &TransferRequest) -> Result<()>;
    async fn cancel(&self, request: &TransferRequest) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Run,
    Pause,
    Cancel,
}

enum WorkerExit {
    Completed,
    Cancelled,
}

struct ActiveTransfer {
    id: u64,
    control: watch::Sender<Control>,
}

/// reqwest-backed transfer client keyed by destination path
pub struct HttpTransferClient {
    client: Client,
    active: Arc<Mutex<HashMap<PathBuf, ActiveTransfer>>>,
    next_id: AtomicU64,
}

impl HttpTransferClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            active: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn is_active(&self, destination: &Path) -> bool {
        self.active.lock().contains_key(destination)
    }

    fn send_control(&self, request: &TransferRequest, control: Control) -> Result<()> {
        let active = self.active.lock();
        let transfer = active.get(&request.destination).ok_or_else(|| {
            StreamkeepError::not_found(format!("No transfer to {}", request.destination.display()))
        })?;
        transfer.control.send_replace(control);
        Ok(())
    }
}

#[async_trait]
impl TransferClient for HttpTransferClient {
    async fn start(&self, request: &TransferRequest) -> Result<mpsc::Receiver<TransferEvent>> {
        if let Some(parent) = request.destination.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let (control_tx, control_rx) = watch::channel(Control::Run);
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut active = self.active.lock();
            if active.contains_key(&request.destination) {
                return Err(StreamkeepError::invalid_state(format!(
                    "Transfer to {} already running",
                    request.destination.display()
                )));
            }
            active.insert(request.destination.clone(), ActiveTransfer { id, control: control_tx });
        }

        let client = self.client.clone();
        let active = Arc::clone(&self.active);
        let request = request.clone();
        tokio::spawn(async move {
            let result = transfer_worker(&client, &request, control_rx, &events_tx).await;
            {
                let mut active = active.lock();
                if active.get(&request.destination).map(|t| t.id) == Some(id) {
                    active.remove(&request.destination);
                }
            }

            match result {
                Ok(WorkerExit::Completed) => {
                    debug!(content_id = %request.content_id, "transfer completed");
                    let _ = events_tx.send(TransferEvent::Completed).await;
                }
                Ok(WorkerExit::Cancelled) => {
                    debug!(content_id = %request.content_id, "transfer cancelled");
                    if let Err(e) = tokio::fs::remove_file(&request.destination).await {
                        if e.kind() != std::io::ErrorKind::NotFound {
                            warn!(path = %request.destination.display(), error = %e, "failed to remove partial file");
                        }
                    }
                }
                Err(e) => {
                    warn!(content_id = %request.content_id, error = %e, "transfer failed");
                    let _ = events_tx.send(TransferEvent::Failed(e.to_string())).await;
                }
            }
        });

        Ok(events_rx)
    }

    async fn pause(&self, request: &TransferRequest) -> Result<()> {
        self.send_control(request, Control::Pause)
    }

    async fn resume(&self, request: &TransferRequest) -> Result<()> {
        self.send_control(request, Control::Run)
    }

    async fn cancel(&self, request: &TransferRequest) -> Result<()> {
        match self.send_control(request, Control::Cancel) {
            Err(StreamkeepError::RecordNotFound(_)) => Ok(()),
            other => other,
        }
    }
}

/// Move the stream to disk until it ends or is cancelled
async fn transfer_worker(
    client: &Client,
    request: &TransferRequest,
    mut control: watch::Receiver<Control>,
    events: &mpsc::Sender<TransferEvent>,
) -> Result<WorkerExit> {
    loop {
        let written = match tokio::fs::metadata(&request.destination).await {
            Ok(metadata) => metadata.len(),
            Err(_) => 0,
        };

        let mut http_request = client.get(&request.url);
        if written > 0 {
            http_request = http_request.header(RANGE, format!("bytes={}-", written));
        }
        let response = http_request.send().await.map_err(map_send_error)?;

        let status = response.status();
        if status == StatusCode::RANGE_NOT_SATISFIABLE && written > 0 {
            // Nothing left to fetch
            return Ok(WorkerExit::Completed);
        }
        if !status.is_success() {
            return Err(StreamkeepError::protocol(
                format!("Transfer request failed with {}", status),
                Some(status.as_u16()),
                None,
            ));
        }

        let resumed = status == StatusCode::PARTIAL_CONTENT;
        let offset = if resumed { written } else { 0 };
        let total = response.content_length().map(|len| len + offset).unwrap_or(0);
        if written > 0 && !resumed {
            debug!(content_id = %request.content_id, "server ignored range, restarting");
        }

        let paused = {
            let file = if resumed {
                OpenOptions::new().append(true).open(&request.destination).await?
            } else {
                File::create(&request.destination).await?
            };
            let mut writer = BufWriter::with_capacity(DOWNLOAD_BUFF_SZ, file);
            let mut progress = ByteProgress::new(offset, total);
            let mut stream = response.bytes_stream();

            loop {
                tokio::select! {
                    changed = control.changed() => {
                        let current = if changed.is_ok() { *control.borrow_and_update() } else { Control::Cancel };
                        match current {
                            Control::Run => continue,
                            Control::Cancel => return Ok(WorkerExit::Cancelled),
                            Control::Pause => {
                                writer.flush().await?;
                                break true;
                            }
                        }
                    }
                    chunk = stream.next() => match chunk {
                        Some(chunk) => {
                            let chunk = chunk.map_err(|e| StreamkeepError::transport(format!("Stream error: {}", e), true))?;
                            writer.write_all(&chunk).await?;
                            if let Some(fraction) = progress.advance(chunk.len() as u64) {
                                let _ = events.send(TransferEvent::Progress(fraction)).await;
                            }
                        }
                        None => {
                            writer.flush().await?;
                            break false;
                        }
                    }
                }
            }
        };

        if !paused {
            return Ok(WorkerExit::Completed);
        }

        debug!(content_id = %request.content_id, "transfer paused");
        loop {
            if control.changed().await.is_err() {
                return Ok(WorkerExit::Cancelled);
            }
            let current = *control.borrow_and_update();
            match current {
                Control::Pause => continue,
                Control::Run => break,
                Control::Cancel => return Ok(WorkerExit::Cancelled),
            }
        }
        debug!(content_id = %request.content_id, "transfer resumed");
    }
}
