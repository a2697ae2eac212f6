//! The fail-fast facade.
//!
//! Every function here either returns a fully valid success value or does
//! not return at all: on failure the diagnostic reporter is invoked and the
//! process terminates. Callers never check for errors.

use std::ffi::{CStr, c_int, c_void};
use std::os::fd::RawFd;
use std::ptr::NonNull;

use crate::checked;
use crate::fdpass;
use crate::report::OrDie;
use crate::sockaddr::SockAddr;

// ---------------------------------------------------------------------------
// Files and descriptors
// ---------------------------------------------------------------------------

/// `fopen(path, mode)`.
pub fn xfopen(path: &CStr, mode: &CStr) -> NonNull<libc::FILE> {
    checked::try_fopen(path, mode).or_die()
}

/// `open(path, flags)`.
pub fn xopen(path: &CStr, flags: c_int) -> RawFd {
    checked::try_open(path, flags).or_die()
}

/// Write all of `buf` in a single `write`.
///
/// A short write is fatal, not retried.
pub fn xwrite(fd: RawFd, buf: &[u8]) -> usize {
    checked::try_write(fd, buf).or_die()
}

/// Read up to `buf.len()` bytes. Returns 0 at end of stream.
pub fn xread(fd: RawFd, buf: &mut [u8]) -> usize {
    checked::try_read(fd, buf).or_die().unwrap_or(0)
}

/// Read exactly `buf.len()` bytes in a single `read`.
///
/// Any shortfall, including a clean end of stream, is fatal.
pub fn xxread(fd: RawFd, buf: &mut [u8]) -> usize {
    checked::try_read_exact(fd, buf).or_die()
}

/// `pipe()`. Returns `[read_end, write_end]`.
pub fn xpipe() -> [RawFd; 2] {
    checked::try_pipe().or_die()
}

pub fn xclose(fd: RawFd) {
    checked::try_close(fd).or_die()
}

/// `dup2(old, new)`. Returns `new`.
pub fn xdup2(old: RawFd, new: RawFd) -> RawFd {
    checked::try_dup2(old, new).or_die()
}

// ---------------------------------------------------------------------------
// Directories
// ---------------------------------------------------------------------------

/// `opendir(name)`.
pub fn xopendir(name: &CStr) -> NonNull<libc::DIR> {
    checked::try_opendir(name).or_die()
}

/// Next entry of a directory stream, or `None` at the end.
///
/// End of directory is distinguished from failure through `errno`; only a
/// failure is fatal.
///
/// # Safety
///
/// `dir` must be an open stream returned by [`xopendir`] (or `opendir`)
/// and not yet closed. The returned entry is valid until the next
/// `readdir`/`closedir` on the same stream.
pub unsafe fn xreaddir(dir: NonNull<libc::DIR>) -> Option<NonNull<libc::dirent>> {
    // SAFETY: forwarded caller contract.
    unsafe { checked::try_readdir(dir) }.or_die()
}

/// `closedir(dir)`.
///
/// # Safety
///
/// `dir` must be an open stream; it must not be used afterwards.
pub unsafe fn xclosedir(dir: NonNull<libc::DIR>) {
    // SAFETY: forwarded caller contract.
    unsafe { checked::try_closedir(dir) }.or_die()
}

// ---------------------------------------------------------------------------
// Process and security
// ---------------------------------------------------------------------------

/// `setsid()`. Returns the new session id.
pub fn xsetsid() -> libc::pid_t {
    checked::try_setsid().or_die()
}

/// `setns(fd, nstype)`.
pub fn xsetns(fd: RawFd, nstype: c_int) {
    checked::try_setns(fd, nstype).or_die()
}

/// Switch the calling thread's SELinux context, e.g. `c"u:r:su:s0"`.
pub fn xsetcon(context: &CStr) {
    checked::try_setcon(context).or_die()
}

// ---------------------------------------------------------------------------
// Sockets
// ---------------------------------------------------------------------------

pub fn xsocket(domain: c_int, ty: c_int, protocol: c_int) -> RawFd {
    checked::try_socket(domain, ty, protocol).or_die()
}

pub fn xbind(fd: RawFd, addr: &SockAddr) {
    checked::try_bind(fd, addr).or_die()
}

pub fn xconnect(fd: RawFd, addr: &SockAddr) {
    checked::try_connect(fd, addr).or_die()
}

pub fn xlisten(fd: RawFd, backlog: c_int) {
    checked::try_listen(fd, backlog).or_die()
}

/// `accept(fd, ...)`. Returns the connection descriptor; fills `peer` when
/// given.
pub fn xaccept(fd: RawFd, peer: Option<&mut SockAddr>) -> RawFd {
    checked::try_accept(fd, peer).or_die()
}

/// `sendmsg(fd, msg, flags)`. Any non-negative count is success.
///
/// # Safety
///
/// Every pointer in `msg` must be valid for the length it declares.
pub unsafe fn xsendmsg(fd: RawFd, msg: &libc::msghdr, flags: c_int) -> usize {
    // SAFETY: forwarded caller contract.
    unsafe { checked::try_sendmsg(fd, msg, flags) }.or_die()
}

/// `recvmsg(fd, msg, flags)`. Any non-negative count is success.
///
/// # Safety
///
/// Every pointer in `msg` must be valid for writes of the length it
/// declares.
pub unsafe fn xrecvmsg(fd: RawFd, msg: &mut libc::msghdr, flags: c_int) -> usize {
    // SAFETY: forwarded caller contract.
    unsafe { checked::try_recvmsg(fd, msg, flags) }.or_die()
}

/// Send `fd` over the unix socket `sock`.
pub fn xsend_fd(sock: RawFd, fd: RawFd) {
    fdpass::try_send_fd(sock, fd).or_die()
}

/// Receive a descriptor sent with [`xsend_fd`]. A message without one is
/// fatal.
pub fn xrecv_fd(sock: RawFd) -> RawFd {
    fdpass::try_recv_fd(sock).or_die()
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

/// `malloc(size)`. Release with `libc::free`.
pub fn xmalloc(size: usize) -> NonNull<c_void> {
    checked::try_malloc(size).or_die()
}

/// `calloc(nmemb, size)`. Release with `libc::free`.
pub fn xcalloc(nmemb: usize, size: usize) -> NonNull<c_void> {
    checked::try_calloc(nmemb, size).or_die()
}

/// `realloc(ptr, size)`. Contents up to the smaller of the old and new
/// sizes are preserved.
///
/// # Safety
///
/// `ptr` must be null or a live allocation from the C allocator, and must
/// not be used after this call.
pub unsafe fn xrealloc(ptr: *mut c_void, size: usize) -> NonNull<c_void> {
    // SAFETY: forwarded caller contract.
    unsafe { checked::try_realloc(ptr, size) }.or_die()
}
