//! Host-side scheduler simulator shared by the integration tests

#![allow(dead_code)]

use anyhow::{Context, Result};
use scheduler_bridge_protocol::{encode_line, BridgeRequest, BridgeResponse, LineReader};
use std::net::Shutdown;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;

/// A listening host socket in a private temp directory
pub struct HostSocket {
    dir: TempDir,
    pub path: PathBuf,
    listener: UnixListener,
}

impl HostSocket {
    pub fn bind() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("scheduler.sock");
        let listener = UnixListener::bind(&path)?;
        Ok(Self {
            dir,
            path,
            listener,
        })
    }

    /// Wait for the bridge to connect and hand the session to the test
    pub async fn accept(&self) -> Result<HostConn> {
        let (stream, _) = self.listener.accept().await?;
        let (reader, writer) = stream.into_split();
        Ok(HostConn {
            lines: LineReader::new(reader),
            writer,
        })
    }

    /// Accept the bridge and stop reading from it, so its writes fail
    pub async fn accept_refusing_input(&self) -> Result<UnixStream> {
        let (stream, _) = self.listener.accept().await?;
        let stream = stream.into_std()?;
        stream.shutdown(Shutdown::Read)?;
        Ok(UnixStream::from_std(stream)?)
    }

    /// Answer every request with `handler`, on any number of connections
    pub fn serve<F>(self, handler: F) -> ServedHost
    where
        F: Fn(&BridgeRequest) -> BridgeResponse + Send + Sync + 'static,
    {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(handler);

        let HostSocket {
            dir,
            path,
            listener,
        } = self;

        let task = {
            let requests = Arc::clone(&requests);
            let connections = Arc::clone(&connections);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    connections.fetch_add(1, Ordering::SeqCst);
                    let requests = Arc::clone(&requests);
                    let handler = Arc::clone(&handler);
                    tokio::spawn(async move {
                        let (reader, writer) = stream.into_split();
                        let mut conn = HostConn {
                            lines: LineReader::new(reader),
                            writer,
                        };
                        while let Ok(request) = conn.request().await {
                            let response = handler(&request);
                            requests.lock().unwrap().push(request);
                            if conn.reply(&response).await.is_err() {
                                break;
                            }
                        }
                    });
                }
            })
        };

        ServedHost {
            _dir: dir,
            path,
            requests,
            connections,
            task,
        }
    }
}

/// One accepted bridge connection, driven by the test
pub struct HostConn {
    lines: LineReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl HostConn {
    /// Next request line from the bridge
    pub async fn request(&mut self) -> Result<BridgeRequest> {
        let line = self
            .lines
            .next_line()
            .await?
            .context("bridge closed the socket")?;
        Ok(serde_json::from_str(&line)?)
    }

    pub async fn reply(&mut self, response: &BridgeResponse) -> Result<()> {
        self.writer.write_all(&encode_line(response)?).await?;
        Ok(())
    }

    /// Write an arbitrary line, valid or not
    pub async fn send_raw(&mut self, line: &str) -> Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        Ok(())
    }
}

/// A host answering requests in the background
pub struct ServedHost {
    _dir: TempDir,
    pub path: PathBuf,
    requests: Arc<Mutex<Vec<BridgeRequest>>>,
    connections: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl ServedHost {
    pub fn requests(&self) -> Vec<BridgeRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

impl Drop for ServedHost {
    fn drop(&mut self) {
        self.task.abort();
    }
}
