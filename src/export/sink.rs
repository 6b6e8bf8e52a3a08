//! Destinations for the fast-import byte stream.
//!
//! The exporter only needs `Write` plus the two-operation mark-resolution
//! handshake. A live `git fast-import` subprocess provides replies; a plain
//! file or stdout target produces an identical stream with resolution
//! unavailable.

use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use anyhow::{bail, Context, Result};

/// Output stream of commit records with an optional mark-reply channel.
///
/// `request_mark` and `await_mark` form a strict request/response pair: no
/// other write may happen between them, or the protocol desynchronizes.
pub trait ImportSink: Write {
    /// Whether a live reply channel exists
    fn can_resolve(&self) -> bool;

    /// Write one resolution request for `mark` and flush
    fn request_mark(&mut self, mark: usize) -> io::Result<()>;

    /// Read exactly one reply line, without the trailing newline
    fn await_mark(&mut self) -> io::Result<String>;
}

/// Sink writing the stream verbatim to any `Write` target, for later replay.
/// No reply channel, so mark resolution is unavailable.
pub struct StreamSink<W: Write> {
    out: W,
}

impl<W: Write> StreamSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Write for StreamSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.out.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

impl<W: Write> ImportSink for StreamSink<W> {
    fn can_resolve(&self) -> bool {
        false
    }

    fn request_mark(&mut self, _mark: usize) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "stream target has no reply channel",
        ))
    }

    fn await_mark(&mut self) -> io::Result<String> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "stream target has no reply channel",
        ))
    }
}

/// A spawned `git fast-import` process consuming the stream live.
///
/// `get-mark` replies arrive on the child's stdout (its cat-blob channel).
pub struct GitImportSink {
    child: Child,
    stdin: Option<ChildStdin>,
    replies: BufReader<ChildStdout>,
    repo_dir: PathBuf,
}

impl GitImportSink {
    pub fn spawn(repo_dir: &Path) -> Result<Self> {
        let mut child = Command::new("git")
            .args(["fast-import", "--quiet", "--done"])
            .current_dir(repo_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .context("failed to start git fast-import")?;

        let stdin = child
            .stdin
            .take()
            .context("git fast-import has no stdin")?;
        let stdout = child
            .stdout
            .take()
            .context("git fast-import has no stdout")?;

        Ok(Self {
            child,
            stdin: Some(stdin),
            replies: BufReader::new(stdout),
            repo_dir: repo_dir.to_path_buf(),
        })
    }

    /// Close the stream and wait for the importer to finish
    pub fn finish(mut self) -> Result<()> {
        self.stdin.take();
        let status = self.child.wait().context("waiting for git fast-import")?;
        if !status.success() {
            bail!("git fast-import exited with {}", status);
        }
        Ok(())
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    fn pipe(&mut self) -> io::Result<&mut ChildStdin> {
        self.stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "import stream closed"))
    }
}

impl Write for GitImportSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pipe()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.pipe()?.flush()
    }
}

impl ImportSink for GitImportSink {
    fn can_resolve(&self) -> bool {
        true
    }

    fn request_mark(&mut self, mark: usize) -> io::Result<()> {
        let pipe = self.pipe()?;
        writeln!(pipe, "get-mark :{}", mark)?;
        pipe.flush()
    }

    fn await_mark(&mut self) -> io::Result<String> {
        let mut line = String::new();
        let read = self.replies.read_line(&mut line)?;
        if read == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "importer closed its reply channel",
            ));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

/// `git init` in a freshly created directory, with HEAD on the branch the
/// stream will populate
pub fn git_init(dir: &Path, bare: bool, branch: &str) -> Result<()> {
    let mut command = Command::new("git");
    command
        .arg("init")
        .arg("--quiet")
        .arg(format!("--initial-branch={}", branch));
    if bare {
        command.arg("--bare");
    }
    let status = command
        .current_dir(dir)
        .status()
        .context("failed to run git init")?;
    if !status.success() {
        bail!("git init exited with {}", status);
    }
    Ok(())
}

/// Populate the working tree after a non-bare import
pub fn git_checkout(dir: &Path, branch: &str) -> Result<()> {
    let status = Command::new("git")
        .args(["checkout", "--force", branch])
        .current_dir(dir)
        .status()
        .context("failed to run git checkout")?;
    if !status.success() {
        bail!("git checkout exited with {}", status);
    }
    Ok(())
}
