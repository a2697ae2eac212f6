//! Descriptor passing over unix sockets (`SCM_RIGHTS`).
//!
//! Each message carries a one-byte payload and exactly one descriptor in
//! its control data.

use std::mem;
use std::os::fd::RawFd;
use std::ptr;

use crate::checked::{try_recvmsg, try_sendmsg};
use crate::error::SyscallError;

const FD_SIZE: u32 = mem::size_of::<RawFd>() as u32;

// cmsghdr needs pointer alignment; CMSG_SPACE(4) is 24 bytes on 64-bit.
#[repr(C, align(8))]
struct ControlBuf([u8; 64]);

pub(crate) fn try_send_fd(sock: RawFd, fd: RawFd) -> Result<(), SyscallError> {
    let mut payload = [0u8; 1];
    let mut iov = libc::iovec {
        iov_base: payload.as_mut_ptr().cast(),
        iov_len: payload.len(),
    };
    let mut control = ControlBuf([0; 64]);
    // SAFETY: CMSG_SPACE is a pure size computation.
    let space = unsafe { libc::CMSG_SPACE(FD_SIZE) } as usize;

    // SAFETY: msghdr is plain old data; all-zero is a valid empty header.
    let mut msg: libc::msghdr = unsafe { mem::zeroed() };
    msg.msg_iov = &raw mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = control.0.as_mut_ptr().cast();
    msg.msg_controllen = space as _;

    // SAFETY: msg_control points at `space` writable bytes, enough for one
    // header carrying one descriptor.
    unsafe {
        let cmsg = libc::CMSG_FIRSTHDR(&msg);
        (*cmsg).cmsg_level = libc::SOL_SOCKET;
        (*cmsg).cmsg_type = libc::SCM_RIGHTS;
        (*cmsg).cmsg_len = libc::CMSG_LEN(FD_SIZE) as _;
        ptr::write_unaligned(libc::CMSG_DATA(cmsg).cast::<RawFd>(), fd);
    }

    // SAFETY: iov and control outlive the call and match their lengths.
    unsafe { try_sendmsg(sock, &msg, 0) }.map(|_| ())
}

pub(crate) fn try_recv_fd(sock: RawFd) -> Result<RawFd, SyscallError> {
    let mut payload = [0u8; 1];
    let mut iov = libc::iovec {
        iov_base: payload.as_mut_ptr().cast(),
        iov_len: payload.len(),
    };
    let mut control = ControlBuf([0; 64]);
    // SAFETY: CMSG_SPACE is a pure size computation.
    let space = unsafe { libc::CMSG_SPACE(FD_SIZE) } as usize;

    // SAFETY: msghdr is plain old data; all-zero is a valid empty header.
    let mut msg: libc::msghdr = unsafe { mem::zeroed() };
    msg.msg_iov = &raw mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = control.0.as_mut_ptr().cast();
    msg.msg_controllen = space as _;

    // SAFETY: iov and control outlive the call and match their lengths.
    unsafe { try_recvmsg(sock, &mut msg, libc::MSG_CMSG_CLOEXEC) }?;

    // SAFETY: the kernel filled msg_control/msg_controllen; CMSG_FIRSTHDR
    // returns null when no header fits.
    unsafe {
        let cmsg = libc::CMSG_FIRSTHDR(&msg);
        if cmsg.is_null()
            || (*cmsg).cmsg_level != libc::SOL_SOCKET
            || (*cmsg).cmsg_type != libc::SCM_RIGHTS
            || ((*cmsg).cmsg_len as usize) < libc::CMSG_LEN(FD_SIZE) as usize
        {
            return Err(SyscallError::MissingAncillary { op: "recvmsg" });
        }
        Ok(ptr::read_unaligned(libc::CMSG_DATA(cmsg).cast::<RawFd>()))
    }
}
