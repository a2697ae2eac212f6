//! Owned socket address passed to `bind`, `connect`, and `accept`.

use std::ffi::OsStr;
use std::io;
use std::mem::{self, offset_of};
use std::net::SocketAddrV4;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// A `sockaddr_storage` plus the length the kernel should look at.
#[derive(Clone, Copy)]
pub struct SockAddr {
    storage: libc::sockaddr_storage,
    len: libc::socklen_t,
}

const SUN_PATH_OFFSET: usize = offset_of!(libc::sockaddr_un, sun_path);

fn sun_path_capacity() -> usize {
    mem::size_of::<libc::sockaddr_un>() - SUN_PATH_OFFSET
}

impl SockAddr {
    /// An empty address with room for any family, for use as an `accept`
    /// out-parameter.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            // SAFETY: sockaddr_storage is plain old data; all-zero is valid.
            storage: unsafe { mem::zeroed() },
            len: mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t,
        }
    }

    /// A filesystem unix-domain address.
    ///
    /// Fails with `InvalidInput` if the path contains a NUL byte or does
    /// not fit in `sun_path` with its terminator.
    pub fn unix(path: impl AsRef<Path>) -> io::Result<Self> {
        let bytes = path.as_ref().as_os_str().as_bytes();
        if bytes.contains(&0) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "unix socket path contains a NUL byte",
            ));
        }
        if bytes.len() >= sun_path_capacity() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "unix socket path too long",
            ));
        }
        let mut addr = Self::unix_with_name(bytes, 0);
        // Count the terminating NUL, as the C convention does.
        addr.len += 1;
        Ok(addr)
    }

    /// A Linux abstract unix-domain address (leading NUL in `sun_path`).
    pub fn abstract_unix(name: &[u8]) -> io::Result<Self> {
        if name.len() + 1 > sun_path_capacity() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "abstract socket name too long",
            ));
        }
        Ok(Self::unix_with_name(name, 1))
    }

    fn unix_with_name(name: &[u8], lead: usize) -> Self {
        let mut addr = Self::empty();
        // SAFETY: sockaddr_storage is large enough and suitably aligned for
        // sockaddr_un.
        let un = unsafe { &mut *(&raw mut addr.storage).cast::<libc::sockaddr_un>() };
        un.sun_family = libc::AF_UNIX as libc::sa_family_t;
        for (dst, src) in un.sun_path[lead..].iter_mut().zip(name) {
            *dst = *src as libc::c_char;
        }
        addr.len = (SUN_PATH_OFFSET + lead + name.len()) as libc::socklen_t;
        addr
    }

    /// Address family stored in the header.
    #[must_use]
    pub fn family(&self) -> libc::sa_family_t {
        self.storage.ss_family
    }

    /// Number of meaningful bytes.
    #[must_use]
    pub fn len(&self) -> libc::socklen_t {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Filesystem path of a non-abstract unix address.
    #[must_use]
    pub fn unix_path(&self) -> Option<PathBuf> {
        if i32::from(self.family()) != libc::AF_UNIX {
            return None;
        }
        let used = (self.len as usize).checked_sub(SUN_PATH_OFFSET)?;
        // SAFETY: family is AF_UNIX, so the storage holds a sockaddr_un.
        let un = unsafe { &*(&raw const self.storage).cast::<libc::sockaddr_un>() };
        let raw: Vec<u8> = un.sun_path[..used.min(sun_path_capacity())]
            .iter()
            .map(|c| *c as u8)
            .collect();
        if raw.first().is_none_or(|b| *b == 0) {
            return None;
        }
        let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
        Some(PathBuf::from(OsStr::from_bytes(&raw[..end])))
    }

    pub(crate) fn as_ptr(&self) -> *const libc::sockaddr {
        (&raw const self.storage).cast()
    }

    pub(crate) fn as_mut_parts(&mut self) -> (*mut libc::sockaddr, *mut libc::socklen_t) {
        self.len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
        ((&raw mut self.storage).cast(), &raw mut self.len)
    }
}

impl From<SocketAddrV4> for SockAddr {
    fn from(v4: SocketAddrV4) -> Self {
        let mut addr = Self::empty();
        // SAFETY: sockaddr_storage is large enough and suitably aligned for
        // sockaddr_in.
        let sin = unsafe { &mut *(&raw mut addr.storage).cast::<libc::sockaddr_in>() };
        sin.sin_family = libc::AF_INET as libc::sa_family_t;
        sin.sin_port = v4.port().to_be();
        sin.sin_addr = libc::in_addr {
            s_addr: u32::from_ne_bytes(v4.ip().octets()),
        };
        addr.len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
        addr
    }
}

impl std::fmt::Debug for SockAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SockAddr")
            .field("family", &self.family())
            .field("len", &self.len)
            .finish()
    }
}
