//! Checked layer: one raw call per function, failure normalized.
//!
//! Each `try_*` function performs exactly one wrapped call (or, for
//! `setcon`, the fixed sequence the SELinux userspace library performs)
//! and turns its failure convention into `Result<T, SyscallError>`. The
//! two calls where end-of-data is not a failure return a [`Step`] instead.
//! Nothing here terminates the process; the facade does that.

use std::ffi::{CStr, c_int, c_void};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::os::fd::RawFd;
use std::ptr::NonNull;

use crate::errno;
use crate::error::SyscallError;
use crate::report::die;
use crate::sockaddr::SockAddr;

/// Outcome of a call where running out of data is a legitimate result.
#[derive(Debug)]
pub(crate) enum Step<T> {
    Value(T),
    End,
    Failed(SyscallError),
}

impl<T> Step<T> {
    /// `Some` for a value, `None` at end of data, fatal otherwise.
    #[inline]
    pub(crate) fn or_die(self) -> Option<T> {
        match self {
            Self::Value(value) => Some(value),
            Self::End => None,
            Self::Failed(err) => die(err),
        }
    }
}

fn check_fd(op: &'static str, ret: c_int) -> Result<RawFd, SyscallError> {
    if ret < 0 {
        Err(SyscallError::last_os(op))
    } else {
        Ok(ret)
    }
}

fn check_zero(op: &'static str, ret: c_int) -> Result<(), SyscallError> {
    if ret == -1 {
        Err(SyscallError::last_os(op))
    } else {
        Ok(())
    }
}

fn check_count(op: &'static str, ret: isize) -> Result<usize, SyscallError> {
    if ret < 0 {
        Err(SyscallError::last_os(op))
    } else {
        Ok(ret as usize)
    }
}

fn check_exact(op: &'static str, ret: isize, expected: usize) -> Result<usize, SyscallError> {
    let actual = check_count(op, ret)?;
    if actual == expected {
        Ok(actual)
    } else {
        Err(SyscallError::ShortTransfer {
            op,
            expected,
            actual,
        })
    }
}

// ---------------------------------------------------------------------------
// Files and descriptors
// ---------------------------------------------------------------------------

pub(crate) fn try_fopen(path: &CStr, mode: &CStr) -> Result<NonNull<libc::FILE>, SyscallError> {
    // SAFETY: both arguments are NUL-terminated C strings.
    let fp = unsafe { libc::fopen(path.as_ptr(), mode.as_ptr()) };
    NonNull::new(fp).ok_or_else(|| SyscallError::last_os("fopen").with_c_operand(path))
}

pub(crate) fn try_open(path: &CStr, flags: c_int) -> Result<RawFd, SyscallError> {
    // SAFETY: path is NUL-terminated. Mode is only read with O_CREAT/O_TMPFILE.
    let fd = unsafe { libc::open(path.as_ptr(), flags, 0o666 as libc::c_uint) };
    check_fd("open", fd).map_err(|e| e.with_c_operand(path))
}

pub(crate) fn try_write(fd: RawFd, buf: &[u8]) -> Result<usize, SyscallError> {
    // SAFETY: buf is valid for reads of buf.len() bytes.
    let ret = unsafe { libc::write(fd, buf.as_ptr().cast(), buf.len()) };
    check_exact("write", ret, buf.len())
}

pub(crate) fn try_read(fd: RawFd, buf: &mut [u8]) -> Step<usize> {
    // SAFETY: buf is valid for writes of buf.len() bytes.
    let ret = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
    match check_count("read", ret) {
        Ok(0) => Step::End,
        Ok(n) => Step::Value(n),
        Err(err) => Step::Failed(err),
    }
}

pub(crate) fn try_read_exact(fd: RawFd, buf: &mut [u8]) -> Result<usize, SyscallError> {
    // SAFETY: buf is valid for writes of buf.len() bytes.
    let ret = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
    check_exact("read", ret, buf.len())
}

pub(crate) fn try_pipe() -> Result<[RawFd; 2], SyscallError> {
    let mut fds = [-1 as RawFd; 2];
    // SAFETY: fds is a writable [c_int; 2].
    let ret = unsafe { libc::pipe(fds.as_mut_ptr()) };
    check_zero("pipe", ret).map(|()| fds)
}

pub(crate) fn try_close(fd: RawFd) -> Result<(), SyscallError> {
    // SAFETY: closing an arbitrary descriptor number is memory safe.
    let ret = unsafe { libc::close(fd) };
    check_zero("close", ret)
}

pub(crate) fn try_dup2(old: RawFd, new: RawFd) -> Result<RawFd, SyscallError> {
    // SAFETY: dup2 on arbitrary descriptor numbers is memory safe.
    let ret = unsafe { libc::dup2(old, new) };
    check_fd("dup2", ret)
}

// ---------------------------------------------------------------------------
// Directories
// ---------------------------------------------------------------------------

pub(crate) fn try_opendir(name: &CStr) -> Result<NonNull<libc::DIR>, SyscallError> {
    // SAFETY: name is NUL-terminated.
    let dir = unsafe { libc::opendir(name.as_ptr()) };
    NonNull::new(dir).ok_or_else(|| SyscallError::last_os("opendir").with_c_operand(name))
}

/// # Safety
///
/// `dir` must be an open stream returned by `opendir` and not yet closed.
pub(crate) unsafe fn try_readdir(dir: NonNull<libc::DIR>) -> Step<NonNull<libc::dirent>> {
    errno::clear_errno();
    // SAFETY: caller guarantees dir is an open directory stream.
    let entry = unsafe { libc::readdir(dir.as_ptr()) };
    classify_readdir(entry, errno::get_errno())
}

// Null with errno still clear is the end of the stream.
fn classify_readdir(entry: *mut libc::dirent, code: c_int) -> Step<NonNull<libc::dirent>> {
    match NonNull::new(entry) {
        Some(entry) => Step::Value(entry),
        None if code == 0 => Step::End,
        None => Step::Failed(SyscallError::from_errno("readdir", code)),
    }
}

/// # Safety
///
/// `dir` must be an open stream; it is invalid after this call.
pub(crate) unsafe fn try_closedir(dir: NonNull<libc::DIR>) -> Result<(), SyscallError> {
    // SAFETY: caller guarantees dir is open and gives up ownership.
    let ret = unsafe { libc::closedir(dir.as_ptr()) };
    check_zero("closedir", ret)
}

// ---------------------------------------------------------------------------
// Process and security
// ---------------------------------------------------------------------------

pub(crate) fn try_setsid() -> Result<libc::pid_t, SyscallError> {
    // SAFETY: setsid has no memory preconditions.
    let sid = unsafe { libc::setsid() };
    if sid == -1 {
        Err(SyscallError::last_os("setsid"))
    } else {
        Ok(sid)
    }
}

pub(crate) fn try_setns(fd: RawFd, nstype: c_int) -> Result<(), SyscallError> {
    // SAFETY: setns has no memory preconditions.
    let ret = unsafe { libc::setns(fd, nstype) };
    check_zero("setns", ret)
}

const THREAD_SELF_ATTR: &str = "/proc/thread-self/attr/current";

fn task_attr_path() -> String {
    // SAFETY: gettid has no preconditions.
    let tid = unsafe { libc::syscall(libc::SYS_gettid) };
    format!("/proc/self/task/{tid}/attr/current")
}

/// Switch the calling thread's security context.
///
/// Writes the NUL-terminated context to the thread's `attr/current`, the
/// same mechanism `setcon(3)` uses.
pub(crate) fn try_setcon(context: &CStr) -> Result<(), SyscallError> {
    let fail = |err: io::Error| SyscallError::from_io("setcon", err).with_c_operand(context);

    let mut attr = match OpenOptions::new().write(true).open(THREAD_SELF_ATTR) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => OpenOptions::new()
            .write(true)
            .open(task_attr_path())
            .map_err(fail)?,
        Err(err) => return Err(fail(err)),
    };

    let payload = context.to_bytes_with_nul();
    let written = attr.write(payload).map_err(fail)?;
    if written == payload.len() {
        Ok(())
    } else {
        Err(SyscallError::ShortTransfer {
            op: "setcon",
            expected: payload.len(),
            actual: written,
        })
    }
}

// ---------------------------------------------------------------------------
// Sockets
// ---------------------------------------------------------------------------

pub(crate) fn try_socket(
    domain: c_int,
    ty: c_int,
    protocol: c_int,
) -> Result<RawFd, SyscallError> {
    // SAFETY: socket has no memory preconditions.
    let fd = unsafe { libc::socket(domain, ty, protocol) };
    check_fd("socket", fd)
}

pub(crate) fn try_bind(fd: RawFd, addr: &SockAddr) -> Result<(), SyscallError> {
    // SAFETY: addr points at addr.len() initialized bytes.
    let ret = unsafe { libc::bind(fd, addr.as_ptr(), addr.len()) };
    check_zero("bind", ret)
}

pub(crate) fn try_connect(fd: RawFd, addr: &SockAddr) -> Result<(), SyscallError> {
    // SAFETY: addr points at addr.len() initialized bytes.
    let ret = unsafe { libc::connect(fd, addr.as_ptr(), addr.len()) };
    check_zero("connect", ret)
}

pub(crate) fn try_listen(fd: RawFd, backlog: c_int) -> Result<(), SyscallError> {
    // SAFETY: listen has no memory preconditions.
    let ret = unsafe { libc::listen(fd, backlog) };
    check_zero("listen", ret)
}

pub(crate) fn try_accept(fd: RawFd, peer: Option<&mut SockAddr>) -> Result<RawFd, SyscallError> {
    let ret = match peer {
        Some(peer) => {
            let (addr, len) = peer.as_mut_parts();
            // SAFETY: addr/len describe the peer's sockaddr_storage.
            unsafe { libc::accept(fd, addr, len) }
        }
        // SAFETY: null address and length are allowed.
        None => unsafe { libc::accept(fd, std::ptr::null_mut(), std::ptr::null_mut()) },
    };
    check_fd("accept", ret)
}

/// # Safety
///
/// Every pointer in `msg` (name, iovecs, control buffer) must be valid for
/// the lengths it declares.
pub(crate) unsafe fn try_sendmsg(
    fd: RawFd,
    msg: &libc::msghdr,
    flags: c_int,
) -> Result<usize, SyscallError> {
    // SAFETY: caller guarantees msg's buffers.
    let ret = unsafe { libc::sendmsg(fd, msg, flags) };
    check_count("sendmsg", ret)
}

/// # Safety
///
/// Every pointer in `msg` must be valid for writes of the lengths it
/// declares.
pub(crate) unsafe fn try_recvmsg(
    fd: RawFd,
    msg: &mut libc::msghdr,
    flags: c_int,
) -> Result<usize, SyscallError> {
    // SAFETY: caller guarantees msg's buffers.
    let ret = unsafe { libc::recvmsg(fd, msg, flags) };
    check_count("recvmsg", ret)
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

// Zero-size requests are served as one byte so that null always means
// failure, including for realloc(ptr, 0), which would otherwise free ptr.

pub(crate) fn try_malloc(size: usize) -> Result<NonNull<c_void>, SyscallError> {
    errno::clear_errno();
    // SAFETY: malloc has no preconditions.
    let p = unsafe { libc::malloc(size.max(1)) };
    NonNull::new(p).ok_or_else(|| alloc_failure("malloc", format!("{size} bytes")))
}

pub(crate) fn try_calloc(nmemb: usize, size: usize) -> Result<NonNull<c_void>, SyscallError> {
    let (n, sz) = if nmemb == 0 || size == 0 { (1, 1) } else { (nmemb, size) };
    errno::clear_errno();
    // SAFETY: calloc has no preconditions and checks n * sz overflow.
    let p = unsafe { libc::calloc(n, sz) };
    NonNull::new(p).ok_or_else(|| alloc_failure("calloc", format!("{nmemb} x {size} bytes")))
}

/// # Safety
///
/// `ptr` must be null or a live allocation from the C allocator. On success
/// it must no longer be used.
pub(crate) unsafe fn try_realloc(
    ptr: *mut c_void,
    size: usize,
) -> Result<NonNull<c_void>, SyscallError> {
    errno::clear_errno();
    // SAFETY: caller guarantees ptr provenance.
    let p = unsafe { libc::realloc(ptr, size.max(1)) };
    NonNull::new(p).ok_or_else(|| alloc_failure("realloc", format!("{size} bytes")))
}

// Allocators are not required to set errno on every platform; errno is
// cleared before each call so a stale value is never reported.
fn alloc_failure(op: &'static str, operand: String) -> SyscallError {
    let err = SyscallError::last_os(op);
    let err = match err.errno() {
        Some(0) | None => SyscallError::from_errno(op, libc::ENOMEM),
        Some(_) => err,
    };
    err.with_operand(operand)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;

    fn pipe_with(data: &[u8]) -> RawFd {
        let [r, w] = try_pipe().unwrap();
        if !data.is_empty() {
            try_write(w, data).unwrap();
        }
        try_close(w).unwrap();
        r
    }

    #[test]
    fn open_failure_names_path() {
        let err = try_open(c"/nonexistent/xwrap/file", libc::O_RDONLY).unwrap_err();
        assert_eq!(err.op(), "open");
        assert_eq!(err.operand(), Some("/nonexistent/xwrap/file"));
        assert_eq!(err.errno(), Some(libc::ENOENT));
    }

    #[test]
    fn fopen_failure_names_path() {
        let err = try_fopen(c"/nonexistent/xwrap/file", c"r").unwrap_err();
        assert_eq!(err.op(), "fopen");
        assert_eq!(err.operand(), Some("/nonexistent/xwrap/file"));
    }

    #[test]
    fn tolerant_read_distinguishes_eof() {
        let r = pipe_with(b"abc");
        let mut buf = [0u8; 8];
        assert!(matches!(try_read(r, &mut buf), Step::Value(3)));
        assert!(matches!(try_read(r, &mut buf), Step::End));
        try_close(r).unwrap();
    }

    #[test]
    fn tolerant_read_failure_is_failed() {
        let mut buf = [0u8; 4];
        match try_read(-1, &mut buf) {
            Step::Failed(err) => assert_eq!(err.errno(), Some(libc::EBADF)),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn exact_read_short_count_is_short_transfer() {
        let r = pipe_with(b"four");
        let mut buf = [0u8; 10];
        let err = try_read_exact(r, &mut buf).unwrap_err();
        assert_eq!(err.kind(), FailureKind::ShortTransfer);
        assert_eq!(err.to_string(), "read: short transfer (4 of 10 bytes)");
        try_close(r).unwrap();
    }

    #[test]
    fn exact_read_at_eof_is_short_transfer() {
        let r = pipe_with(b"");
        let mut buf = [0u8; 1];
        let err = try_read_exact(r, &mut buf).unwrap_err();
        assert!(matches!(
            err,
            SyscallError::ShortTransfer {
                expected: 1,
                actual: 0,
                ..
            }
        ));
        try_close(r).unwrap();
    }

    #[test]
    fn exact_write_bad_fd_is_os_error() {
        let err = try_write(-1, b"x").unwrap_err();
        assert_eq!(err.op(), "write");
        assert_eq!(err.errno(), Some(libc::EBADF));
    }

    #[test]
    fn readdir_end_is_not_failure() {
        let dir = try_opendir(c"/").unwrap();
        let mut seen = 0usize;
        loop {
            // SAFETY: dir is open until closedir below.
            match unsafe { try_readdir(dir) } {
                Step::Value(_) => seen += 1,
                Step::End => break,
                Step::Failed(err) => panic!("readdir failed: {err}"),
            }
        }
        assert!(seen >= 2, "expected at least . and ..");
        // SAFETY: dir is open and not used afterwards.
        unsafe { try_closedir(dir) }.unwrap();
    }

    #[test]
    fn opendir_failure_names_directory() {
        let err = try_opendir(c"/nonexistent/xwrap").unwrap_err();
        assert_eq!(err.op(), "opendir");
        assert_eq!(err.operand(), Some("/nonexistent/xwrap"));
    }

    #[test]
    fn socket_invalid_domain_fails() {
        let err = try_socket(-1, libc::SOCK_STREAM, 0).unwrap_err();
        assert_eq!(err.op(), "socket");
    }

    #[test]
    fn connect_failure_is_tagged_connect() {
        let fd = try_socket(libc::AF_UNIX, libc::SOCK_STREAM, 0).unwrap();
        let addr = SockAddr::unix("/nonexistent/xwrap.sock").unwrap();
        let err = try_connect(fd, &addr).unwrap_err();
        assert_eq!(err.op(), "connect");
        try_close(fd).unwrap();
    }

    #[test]
    fn listen_bad_fd_fails() {
        assert_eq!(try_listen(-1, 1).unwrap_err().errno(), Some(libc::EBADF));
    }

    #[test]
    fn setns_bad_fd_fails() {
        let err = try_setns(-1, 0).unwrap_err();
        assert_eq!(err.op(), "setns");
    }

    #[test]
    fn oversized_malloc_fails_with_size_operand() {
        let err = try_malloc(usize::MAX).unwrap_err();
        assert_eq!(err.op(), "malloc");
        assert_eq!(err.errno(), Some(libc::ENOMEM));
        assert_eq!(err.operand(), Some(format!("{} bytes", usize::MAX).as_str()));
    }

    #[test]
    fn overflowing_calloc_fails() {
        let err = try_calloc(usize::MAX, 2).unwrap_err();
        assert_eq!(err.op(), "calloc");
        assert_eq!(err.kind(), FailureKind::ResourceUnavailable);
    }

    #[test]
    fn zero_size_requests_are_non_null() {
        let p = try_malloc(0).unwrap();
        // SAFETY: p is a live C allocation; realloc takes ownership.
        let p = unsafe { try_realloc(p.as_ptr(), 0) }.unwrap();
        let q = try_calloc(0, 16).unwrap();
        // SAFETY: both came from the C allocator.
        unsafe {
            libc::free(p.as_ptr());
            libc::free(q.as_ptr());
        }
    }

    #[test]
    fn dup2_returns_target() {
        let [r, w] = try_pipe().unwrap();
        let [r2, w2] = try_pipe().unwrap();
        assert_eq!(try_dup2(w, w2).unwrap(), w2);

        // w2 now refers to the first pipe.
        try_write(w2, b"dup").unwrap();
        let mut buf = [0u8; 3];
        try_read_exact(r, &mut buf).unwrap();
        assert_eq!(&buf, b"dup");
        for fd in [r, w, r2, w2] {
            try_close(fd).unwrap();
        }
    }

    #[test]
    fn exact_write_partial_count_is_short_transfer() {
        let [r, w] = try_pipe().unwrap();
        // SAFETY: fcntl on a descriptor this test owns.
        let cap = unsafe {
            assert_eq!(libc::fcntl(w, libc::F_SETFL, libc::O_NONBLOCK), 0);
            libc::fcntl(w, libc::F_GETPIPE_SZ)
        };
        assert!(cap > 0);
        let cap = cap as usize;

        try_write(w, &vec![1u8; cap / 2]).unwrap();
        let err = try_write(w, &vec![2u8; cap]).unwrap_err();
        assert!(
            matches!(
                err,
                SyscallError::ShortTransfer { op: "write", expected, actual }
                    if expected == cap && actual == cap / 2
            ),
            "got {err:?}"
        );
        assert_eq!(err.kind(), FailureKind::ShortTransfer);
        try_close(r).unwrap();
        try_close(w).unwrap();
    }

    #[test]
    fn readdir_classification_arms() {
        // SAFETY: dirent is plain old data; all-zero is valid.
        let mut entry: libc::dirent = unsafe { std::mem::zeroed() };
        assert!(matches!(classify_readdir(&raw mut entry, 0), Step::Value(_)));
        assert!(matches!(
            classify_readdir(&raw mut entry, libc::EBADF),
            Step::Value(_)
        ));
        assert!(matches!(classify_readdir(std::ptr::null_mut(), 0), Step::End));
        match classify_readdir(std::ptr::null_mut(), libc::EBADF) {
            Step::Failed(err) => {
                assert_eq!(err.op(), "readdir");
                assert_eq!(err.errno(), Some(libc::EBADF));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn allocation_ignores_stale_errno() {
        errno::set_errno(libc::EBADF);
        let p = try_malloc(64).unwrap();
        // SAFETY: p came from the C allocator.
        unsafe { libc::free(p.as_ptr()) };

        errno::set_errno(libc::EBADF);
        let err = try_calloc(usize::MAX, 2).unwrap_err();
        assert_eq!(err.errno(), Some(libc::ENOMEM));
        errno::clear_errno();
    }

    #[test]
    fn close_bad_fd_fails() {
        assert_eq!(try_close(-1).unwrap_err().errno(), Some(libc::EBADF));
    }
}
