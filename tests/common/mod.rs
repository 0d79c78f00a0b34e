#![allow(dead_code)]

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::{SystemTime, UNIX_EPOCH};

use recycle_keeper::index::entry::{CleanupRecord, LogEntry, STATUS_SUCCESS};
use recycle_keeper::index::log::IndexLog;

pub const DAY_MS: i64 = 86_400_000;
pub const GIB: u64 = 1024 * 1024 * 1024;
/// Fixed "now" for scenario tests: 2024-06-01T00:00:00Z.
pub const NOW: i64 = 1_717_200_000_000;

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

/// Temp recycle root, index, and a "home" tree for sources.
pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub root: PathBuf,
    pub index: PathBuf,
    pub home: PathBuf,
    pub state: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create tempdir");
        let root = dir.path().join("recycle");
        let home = dir.path().join("home");
        fs::create_dir_all(&home).expect("create home");
        Self {
            index: dir.path().join("index.jsonl"),
            state: dir.path().join("state.json"),
            root,
            home,
            dir,
        }
    }

    pub fn log(&self) -> IndexLog {
        IndexLog::new(&self.index).with_fsync(false)
    }

    /// Create `root/<id>/<name>` with `len` bytes per file and log one
    /// cleanup line per file at `time`.
    pub fn add_batch(&self, id: &str, files: &[(&str, u64)], time: i64) -> PathBuf {
        let batch_root = self.root.join(id);
        fs::create_dir_all(&batch_root).expect("create batch root");
        for (name, len) in files {
            let path = batch_root.join(name);
            fs::write(&path, vec![0_u8; usize::try_from(*len).expect("small file")])
                .expect("write file");
            self.log_entry(id, &path, *len, time);
        }
        batch_root
    }

    /// Like [`Fixture::add_batch`] with one sparse file of logical size `len`.
    pub fn add_sparse_batch(&self, id: &str, len: u64, time: i64) -> PathBuf {
        let batch_root = self.root.join(id);
        fs::create_dir_all(&batch_root).expect("create batch root");
        let path = batch_root.join("blob.bin");
        File::create(&path)
            .and_then(|f| f.set_len(len))
            .expect("create sparse file");
        self.log_entry(id, &path, len, time);
        batch_root
    }

    pub fn log_entry(&self, batch_id: &str, recycle_path: &Path, size: u64, time: i64) {
        let name = recycle_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.log()
            .append(&LogEntry::Cleanup(CleanupRecord {
                status: STATUS_SUCCESS.to_string(),
                batch_id: batch_id.to_string(),
                scope: "test".to_string(),
                source_path: self.home.join(batch_id).join(name),
                recycle_path: recycle_path.to_path_buf(),
                size_bytes: size,
                time,
                error: None,
                error_type: None,
            }))
            .expect("append cleanup line");
    }

    pub fn index_lines(&self) -> Vec<String> {
        fs::read_to_string(&self.index)
            .unwrap_or_default()
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Write a config file pointing every path into this fixture.
    pub fn write_config(&self, extra: &str) -> PathBuf {
        let path = self.dir.path().join("config.toml");
        let body = format!(
            "[paths]\nrecycle_root = {:?}\nindex_path = {:?}\nstate_file = {:?}\n\n[index]\nfsync_on_append = false\n\n{extra}\n",
            self.root.display().to_string(),
            self.index.display().to_string(),
            self.state.display().to_string(),
        );
        fs::write(&path, body).expect("write config");
        path
    }
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_rk") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) { "rk.exe" } else { "rk" };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve rk binary path for integration test"),
    }
}

pub fn run_cli_case(case_name: &str, args: &[&str]) -> CmdResult {
    let root = std::env::temp_dir().join("rk-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();

    let output = Command::new(&bin_path)
        .args(args)
        .env("RK_OUTPUT_FORMAT", "json")
        .env("RUST_BACKTRACE", "1")
        .output()
        .expect("execute rk command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("bin={}\n", bin_path.display()));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("status={}\n", output.status));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(&stdout);
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(&stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}
