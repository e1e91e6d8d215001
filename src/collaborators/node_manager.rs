//! Node lifecycle management (C6 collaborator), ported from `NodeManager`
//! in `original_source/EZ_App/node_manager.py`. Still shells out to spawn
//! the P2P network process and tracks it by PID file; liveness uses
//! `kill(pid, 0)` via `libc` in place of `os.kill(pid, 0)`.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeManagerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    AlreadyRunning,
    Started,
    Stopped,
    NotRunning,
    Running,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeStatusReport {
    pub status: NodeStatus,
    pub pid: Option<u32>,
}

#[async_trait]
pub trait NodeManager: Send + Sync {
    async fn start(&self, consensus: u32, accounts: u32, start_port: u16) -> Result<NodeStatusReport, NodeManagerError>;
    async fn stop(&self) -> Result<NodeStatusReport, NodeManagerError>;
    async fn status(&self) -> Result<NodeStatusReport, NodeManagerError>;
}

pub struct FileNodeManager {
    pid_file: PathBuf,
    project_root: PathBuf,
}

impl FileNodeManager {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(data_dir: P, project_root: Q) -> Result<Self, NodeManagerError> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;
        Ok(Self {
            pid_file: data_dir.join("node.pid"),
            project_root: project_root.as_ref().to_path_buf(),
        })
    }

    fn read_pid(&self) -> Option<u32> {
        std::fs::read_to_string(&self.pid_file)
            .ok()
            .and_then(|text| text.trim().parse::<u32>().ok())
    }

    fn is_running(pid: u32) -> bool {
        // Signal 0 performs no action but still validates the PID exists
        // and is reachable.
        unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
    }
}

#[async_trait]
impl NodeManager for FileNodeManager {
    async fn start(&self, consensus: u32, accounts: u32, start_port: u16) -> Result<NodeStatusReport, NodeManagerError> {
        if let Some(pid) = self.read_pid() {
            if Self::is_running(pid) {
                return Ok(NodeStatusReport { status: NodeStatus::AlreadyRunning, pid: Some(pid) });
            }
        }

        let child = std::process::Command::new("run_ez_p2p_network")
            .arg("--consensus")
            .arg(consensus.to_string())
            .arg("--accounts")
            .arg(accounts.to_string())
            .arg("--waves")
            .arg("0")
            .arg("--start-port")
            .arg(start_port.to_string())
            .current_dir(&self.project_root)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        let pid = child.id();
        std::fs::write(&self.pid_file, pid.to_string())?;
        Ok(NodeStatusReport { status: NodeStatus::Started, pid: Some(pid) })
    }

    async fn stop(&self) -> Result<NodeStatusReport, NodeManagerError> {
        let Some(pid) = self.read_pid() else {
            return Ok(NodeStatusReport { status: NodeStatus::NotRunning, pid: None });
        };
        if !Self::is_running(pid) {
            let _ = std::fs::remove_file(&self.pid_file);
            return Ok(NodeStatusReport { status: NodeStatus::NotRunning, pid: None });
        }
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
        let _ = std::fs::remove_file(&self.pid_file);
        Ok(NodeStatusReport { status: NodeStatus::Stopped, pid: Some(pid) })
    }

    async fn status(&self) -> Result<NodeStatusReport, NodeManagerError> {
        let Some(pid) = self.read_pid() else {
            return Ok(NodeStatusReport { status: NodeStatus::Stopped, pid: None });
        };
        if Self::is_running(pid) {
            Ok(NodeStatusReport { status: NodeStatus::Running, pid: Some(pid) })
        } else {
            Ok(NodeStatusReport { status: NodeStatus::Stopped, pid: Some(pid) })
        }
    }
}
