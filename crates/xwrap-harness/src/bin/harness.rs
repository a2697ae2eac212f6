//! CLI entrypoint for the xwrap scenario harness.
//!
//! Each subcommand runs one facade scenario and prints a JSON result on
//! stdout. When the scenario makes a wrapped call fail, the process is
//! terminated by the facade and nothing is printed.

use std::collections::BTreeSet;
use std::ffi::{CStr, CString};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde_json::json;
use xwrap_core::report::{self, DiagnosticReporter, FatalRecord};
use xwrap_core::{
    SockAddr, xaccept, xbind, xcalloc, xclose, xclosedir, xconnect, xfopen, xlisten, xmalloc,
    xopen, xopendir, xpipe, xread, xreaddir, xrealloc, xrecv_fd, xsend_fd, xsetcon, xsetns,
    xsetsid, xsocket, xwrite, xxread,
};

/// Fail-fast facade scenarios.
#[derive(Debug, Parser)]
#[command(name = "xwrap-harness")]
#[command(about = "Drive xwrap facade scenarios and validate fatal logs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Open a stream with fopen.
    Fopen {
        #[arg(long)]
        path: PathBuf,
        #[arg(long, default_value = "r")]
        mode: String,
    },
    /// Open a descriptor read-only.
    Open {
        #[arg(long)]
        path: PathBuf,
    },
    /// Tolerant read: one read of up to `len` bytes, 0 at end of stream.
    Read {
        #[arg(long)]
        path: PathBuf,
        #[arg(long, default_value_t = 4096)]
        len: usize,
        /// Keep reading until end of stream, then read once more.
        #[arg(long)]
        drain: bool,
    },
    /// Exact read of `len` bytes.
    ReadExact {
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        len: usize,
    },
    /// Exact write of `data` into `path` (created/truncated).
    WriteExact {
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        data: String,
    },
    /// Create a pipe and move `data` through it.
    Pipe {
        #[arg(long, default_value = "pipe")]
        data: String,
    },
    /// List a directory's entries.
    ListDir {
        #[arg(long)]
        path: PathBuf,
    },
    /// Start a new session.
    Setsid,
    /// Switch the security context.
    Setcon {
        #[arg(long)]
        context: String,
    },
    /// Join the namespace referred to by `path`.
    Setns {
        #[arg(long)]
        path: PathBuf,
        #[arg(long, default_value_t = 0)]
        nstype: i32,
    },
    /// Bind, listen, connect, accept, and pass a descriptor on a unix socket
    /// under `dir`.
    SocketPair {
        #[arg(long)]
        dir: PathBuf,
    },
    /// Connect a unix stream socket to `path`.
    Connect {
        #[arg(long)]
        path: PathBuf,
    },
    /// Allocate, fill, and resize a buffer.
    Alloc {
        #[arg(long)]
        size: usize,
        /// Use calloc(size, 1) and verify zero fill.
        #[arg(long)]
        zeroed: bool,
        /// Resize to this many bytes after filling.
        #[arg(long)]
        resize: Option<usize>,
    },
    /// Install a reporter that removes itself while reporting, then fail to
    /// open `path`.
    SwapReporter {
        #[arg(long)]
        path: PathBuf,
    },
    /// Validate a JSONL fatal log.
    ValidateLog {
        #[arg(long)]
        log: PathBuf,
    },
}

fn c_path(path: &Path) -> Result<CString, Box<dyn std::error::Error>> {
    Ok(CString::new(path.as_os_str().as_bytes())?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Fopen { path, mode } => {
            let fp = xfopen(&c_path(&path)?, &CString::new(mode)?);
            // SAFETY: fp is an open stream not used afterwards.
            unsafe { libc::fclose(fp.as_ptr()) };
            json!({ "op": "fopen", "ok": true })
        }
        Command::Open { path } => {
            let fd = xopen(&c_path(&path)?, libc::O_RDONLY | libc::O_CLOEXEC);
            xclose(fd);
            json!({ "op": "open", "fd": fd })
        }
        Command::Read { path, len, drain } => {
            let fd = xopen(&c_path(&path)?, libc::O_RDONLY | libc::O_CLOEXEC);
            let mut buf = vec![0u8; len];
            let mut total = 0usize;
            let mut last = xread(fd, &mut buf);
            total += last;
            while drain && last != 0 {
                last = xread(fd, &mut buf);
                total += last;
            }
            if drain {
                last = xread(fd, &mut buf);
            }
            xclose(fd);
            json!({ "op": "read", "total": total, "last": last })
        }
        Command::ReadExact { path, len } => {
            let fd = xopen(&c_path(&path)?, libc::O_RDONLY | libc::O_CLOEXEC);
            let mut buf = vec![0u8; len];
            let n = xxread(fd, &mut buf);
            xclose(fd);
            json!({ "op": "read_exact", "read": n })
        }
        Command::WriteExact { path, data } => {
            let fd = xopen(
                &c_path(&path)?,
                libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC | libc::O_CLOEXEC,
            );
            let n = xwrite(fd, data.as_bytes());
            xclose(fd);
            json!({ "op": "write_exact", "written": n })
        }
        Command::Pipe { data } => {
            let [r, w] = xpipe();
            xwrite(w, data.as_bytes());
            xclose(w);
            let mut buf = vec![0u8; data.len()];
            xxread(r, &mut buf);
            let eof = xread(r, &mut [0u8; 1]);
            xclose(r);
            json!({ "op": "pipe", "echo": String::from_utf8_lossy(&buf), "eof": eof == 0 })
        }
        Command::ListDir { path } => {
            let dir = xopendir(&c_path(&path)?);
            let mut names = BTreeSet::new();
            // SAFETY: dir stays open until xclosedir; each entry is copied
            // before the next readdir.
            while let Some(entry) = unsafe { xreaddir(dir) } {
                // SAFETY: entry points at a live dirent whose d_name is
                // NUL-terminated.
                let name = unsafe { CStr::from_ptr(entry.as_ref().d_name.as_ptr()) };
                names.insert(name.to_string_lossy().into_owned());
            }
            // SAFETY: dir is open and not used afterwards.
            unsafe { xclosedir(dir) };
            json!({ "op": "list_dir", "entries": names })
        }
        Command::Setsid => {
            let sid = xsetsid();
            json!({ "op": "setsid", "sid": sid, "pid": std::process::id() })
        }
        Command::Setcon { context } => {
            xsetcon(&CString::new(context.clone())?);
            json!({ "op": "setcon", "context": context })
        }
        Command::Setns { path, nstype } => {
            let fd = xopen(&c_path(&path)?, libc::O_RDONLY | libc::O_CLOEXEC);
            xsetns(fd, nstype);
            xclose(fd);
            json!({ "op": "setns", "ok": true })
        }
        Command::SocketPair { dir } => socket_pair(&dir)?,
        Command::Connect { path } => {
            let addr = SockAddr::unix(&path)?;
            let fd = xsocket(libc::AF_UNIX, libc::SOCK_STREAM | libc::SOCK_CLOEXEC, 0);
            xconnect(fd, &addr);
            xclose(fd);
            json!({ "op": "connect", "ok": true })
        }
        Command::Alloc {
            size,
            zeroed,
            resize,
        } => alloc(size, zeroed, resize),
        Command::SwapReporter { path } => {
            report::set_reporter(Box::new(SelfRemovingReporter));
            let fd = xopen(&c_path(&path)?, libc::O_RDONLY | libc::O_CLOEXEC);
            xclose(fd);
            json!({ "op": "swap_reporter", "ok": true })
        }
        Command::ValidateLog { log } => {
            let report = xwrap_harness::structured_log::validate_fatal_log_file(&log)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.ok {
                return Err(format!("{} invalid fatal log line(s)", report.violations.len()).into());
            }
            return Ok(());
        }
    };

    println!("{result}");
    Ok(())
}

/// Reports on stderr after uninstalling itself.
struct SelfRemovingReporter;

impl DiagnosticReporter for SelfRemovingReporter {
    fn report(&self, record: &FatalRecord) {
        report::reset_reporter();
        eprintln!("swapped reporter: {}", record.message);
    }
}

fn socket_pair(dir: &Path) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join("harness.sock");
    let _ = std::fs::remove_file(&path);
    let addr = SockAddr::unix(&path)?;

    let server = xsocket(libc::AF_UNIX, libc::SOCK_STREAM | libc::SOCK_CLOEXEC, 0);
    xbind(server, &addr);
    xlisten(server, 1);
    let client = xsocket(libc::AF_UNIX, libc::SOCK_STREAM | libc::SOCK_CLOEXEC, 0);
    xconnect(client, &addr);

    let mut peer = SockAddr::empty();
    let conn = xaccept(server, Some(&mut peer));

    let [r, w] = xpipe();
    xsend_fd(client, w);
    let passed = xrecv_fd(conn);
    xwrite(passed, b"fd");
    let mut buf = [0u8; 2];
    xxread(r, &mut buf);

    for fd in [passed, r, w, conn, client, server] {
        xclose(fd);
    }
    let _ = std::fs::remove_file(&path);
    Ok(json!({
        "op": "socket_pair",
        "accepted": conn,
        "peer_family": peer.family(),
        "passed_fd_works": &buf == b"fd",
    }))
}

fn alloc(size: usize, zeroed: bool, resize: Option<usize>) -> serde_json::Value {
    let ptr = if zeroed {
        xcalloc(size, 1)
    } else {
        xmalloc(size)
    };
    // SAFETY: the allocation holds `size` bytes.
    let bytes = unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr().cast::<u8>(), size) };
    let was_zero = bytes.iter().all(|b| *b == 0);
    for (i, b) in bytes.iter_mut().enumerate() {
        *b = i as u8;
    }

    let (ptr, preserved) = match resize {
        Some(new_size) => {
            // SAFETY: ptr is a live C allocation and is not used again.
            let grown = unsafe { xrealloc(ptr.as_ptr(), new_size) };
            let keep = size.min(new_size);
            // SAFETY: the first `keep` bytes are the preserved overlap.
            let kept = unsafe { std::slice::from_raw_parts(grown.as_ptr().cast::<u8>(), keep) };
            let preserved = kept.iter().enumerate().all(|(i, b)| *b == i as u8);
            (grown, preserved)
        }
        None => (ptr, true),
    };
    // SAFETY: allocated by the C allocator above.
    unsafe { libc::free(ptr.as_ptr()) };

    json!({
        "op": "alloc",
        "size": size,
        "zero_filled": zeroed && was_zero,
        "preserved": preserved,
    })
}
