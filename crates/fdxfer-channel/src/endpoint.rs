use std::io::{self, IoSlice};
use std::mem;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::os::unix::net::UnixStream;

use bytes::Bytes;
use fdxfer_codec::{rights_space, ControlBuffer, Envelope};
use tracing::{debug, trace};

use crate::error::{ChannelError, Result};

#[cfg(not(any(target_os = "macos", target_os = "ios")))]
const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
// Apple platforms lack MSG_NOSIGNAL; SO_NOSIGPIPE is set on the socket instead.
#[cfg(any(target_os = "macos", target_os = "ios"))]
const SEND_FLAGS: libc::c_int = 0;

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
const RECV_FLAGS: libc::c_int = libc::MSG_DONTWAIT | libc::MSG_CMSG_CLOEXEC;
#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
const RECV_FLAGS: libc::c_int = libc::MSG_DONTWAIT;

/// Result of a single non-blocking attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T> {
    /// The operation completed.
    Ready(T),
    /// The operation would have blocked; nothing was transferred.
    WouldBlock,
}

impl<T> Attempt<T> {
    pub fn is_would_block(&self) -> bool {
        matches!(self, Attempt::WouldBlock)
    }

    /// The completed value, if any.
    pub fn ready(self) -> Option<T> {
        match self {
            Attempt::Ready(value) => Some(value),
            Attempt::WouldBlock => None,
        }
    }
}

/// A pair of connected, non-blocking local stream endpoints.
///
/// The sending side owns `sender`, the receiving side owns `receiver`. Each
/// endpoint has its own bounded ancillary-data backlog in the kernel.
#[derive(Debug)]
pub struct Channel {
    sender: Endpoint,
    receiver: Endpoint,
}

impl Channel {
    /// Create a connected socketpair with both ends non-blocking.
    pub fn create() -> Result<Self> {
        let (a, b) = UnixStream::pair().map_err(ChannelError::from_create)?;
        let sender = Endpoint::configure(a)?;
        let receiver = Endpoint::configure(b)?;
        debug!(
            sender = sender.as_raw_fd(),
            receiver = receiver.as_raw_fd(),
            "created channel"
        );
        Ok(Self { sender, receiver })
    }

    pub fn sender(&self) -> &Endpoint {
        &self.sender
    }

    pub fn receiver(&self) -> &Endpoint {
        &self.receiver
    }

    /// Split into `(sender, receiver)`.
    pub fn into_parts(self) -> (Endpoint, Endpoint) {
        (self.sender, self.receiver)
    }
}

/// One end of a [`Channel`].
///
/// Every operation is a single non-blocking attempt; retry policy belongs to
/// the caller.
#[derive(Debug)]
pub struct Endpoint {
    stream: UnixStream,
}

impl Endpoint {
    fn configure(stream: UnixStream) -> Result<Self> {
        stream.set_nonblocking(true).map_err(ChannelError::Socket)?;
        #[cfg(any(target_os = "macos", target_os = "ios"))]
        set_socket_option(&stream, libc::SO_NOSIGPIPE, 1).map_err(ChannelError::Socket)?;
        Ok(Self { stream })
    }

    /// Send one envelope with a single `sendmsg` call.
    ///
    /// Returns the number of data bytes the kernel accepted. When the
    /// envelope carries ancillary data, a non-zero count means the control
    /// section was accepted along with it.
    pub fn send(&self, envelope: &Envelope) -> Result<Attempt<usize>> {
        let payload = envelope.payload();
        let mut iov = libc::iovec {
            iov_base: payload.as_ptr() as *mut libc::c_void,
            iov_len: payload.len(),
        };

        // SAFETY: msghdr is plain old data; zero is a valid bit pattern.
        let mut msg: libc::msghdr = unsafe { mem::zeroed() };
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        let control = envelope.control();
        if !control.is_empty() {
            msg.msg_control = control.as_bytes().as_ptr() as *mut libc::c_void;
            msg.msg_controllen = control.len() as _;
        }

        // SAFETY: every pointer in `msg` refers to memory borrowed from
        // `envelope` for the duration of the call; sendmsg only reads it.
        let rc = unsafe { libc::sendmsg(self.as_raw_fd(), &msg, SEND_FLAGS) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(Attempt::WouldBlock);
            }
            return Err(ChannelError::Send(err));
        }

        trace!(
            bytes = rc,
            control_len = control.len(),
            "sent envelope"
        );
        Ok(Attempt::Ready(rc as usize))
    }

    /// Receive one envelope with a single `recvmsg` call.
    ///
    /// Reads up to `max_data` data bytes and up to `max_descriptors`
    /// descriptors. Received descriptors are installed in this process and
    /// belong to the caller from here on.
    pub fn receive(&self, max_data: usize, max_descriptors: usize) -> Result<Attempt<Envelope>> {
        let mut data = vec![0u8; max_data.max(1)];
        let mut control = if max_descriptors == 0 {
            ControlBuffer::empty()
        } else {
            ControlBuffer::zeroed(rights_space(max_descriptors))
        };

        let mut iov = libc::iovec {
            iov_base: data.as_mut_ptr().cast::<libc::c_void>(),
            iov_len: data.len(),
        };

        // SAFETY: msghdr is plain old data; zero is a valid bit pattern.
        let mut msg: libc::msghdr = unsafe { mem::zeroed() };
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        if !control.is_empty() {
            msg.msg_control = control.as_bytes_mut().as_mut_ptr().cast::<libc::c_void>();
            msg.msg_controllen = control.len() as _;
        }

        // SAFETY: `data` and `control` outlive the call and their lengths
        // match what `msg` advertises.
        let rc = unsafe { libc::recvmsg(self.as_raw_fd(), &mut msg, RECV_FLAGS) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(Attempt::WouldBlock);
            }
            return Err(ChannelError::Receive(err));
        }

        let received = rc as usize;
        let control_len = msg.msg_controllen as usize;
        if received == 0 && control_len == 0 {
            return Err(ChannelError::Closed);
        }

        data.truncate(received);
        control.truncate(control_len);
        let truncated = msg.msg_flags & libc::MSG_CTRUNC != 0;

        trace!(bytes = received, control_len, truncated, "received envelope");
        Ok(Attempt::Ready(Envelope::from_received(
            Bytes::from(data),
            control,
            truncated,
        )))
    }

    /// Plain `send(2)` of a contiguous buffer.
    pub fn send_bytes(&self, buf: &[u8]) -> io::Result<usize> {
        // SAFETY: `buf` is valid for reads of `buf.len()` bytes.
        let rc = unsafe {
            libc::send(
                self.as_raw_fd(),
                buf.as_ptr().cast::<libc::c_void>(),
                buf.len(),
                SEND_FLAGS,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(rc as usize)
    }

    /// `sendmsg(2)` gathering `bufs`, with no control section.
    pub fn send_vectored(&self, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
        // SAFETY: msghdr is plain old data; zero is a valid bit pattern.
        let mut msg: libc::msghdr = unsafe { mem::zeroed() };
        // IoSlice is ABI-compatible with iovec on Unix.
        msg.msg_iov = bufs.as_ptr() as *mut libc::iovec;
        msg.msg_iovlen = bufs.len() as _;

        // SAFETY: the iovecs borrow `bufs` for the duration of the call.
        let rc = unsafe { libc::sendmsg(self.as_raw_fd(), &msg, SEND_FLAGS) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(rc as usize)
    }

    /// The underlying stream, for plain `read`/`write`/`writev` calls.
    pub fn stream(&self) -> &UnixStream {
        &self.stream
    }

    /// Kernel send buffer size (`SO_SNDBUF`).
    pub fn send_buffer_size(&self) -> Result<usize> {
        socket_option(&self.stream, libc::SO_SNDBUF).map_err(ChannelError::Socket)
    }

    /// Kernel receive buffer size (`SO_RCVBUF`).
    pub fn receive_buffer_size(&self) -> Result<usize> {
        socket_option(&self.stream, libc::SO_RCVBUF).map_err(ChannelError::Socket)
    }
}

impl AsFd for Endpoint {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.stream.as_fd()
    }
}

impl AsRawFd for Endpoint {
    fn as_raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}

fn socket_option(stream: &UnixStream, name: libc::c_int) -> io::Result<usize> {
    let mut value: libc::c_int = 0;
    let mut len = mem::size_of::<libc::c_int>() as libc::socklen_t;

    // SAFETY: `value` and `len` are valid writable pointers for the provided
    // sizes, and the descriptor is an open socket owned by `stream`.
    let rc = unsafe {
        libc::getsockopt(
            stream.as_raw_fd(),
            libc::SOL_SOCKET,
            name,
            (&mut value as *mut libc::c_int).cast::<libc::c_void>(),
            &mut len,
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(value.max(0) as usize)
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
fn set_socket_option(stream: &UnixStream, name: libc::c_int, value: libc::c_int) -> io::Result<()> {
    // SAFETY: `value` is a valid readable c_int for the provided size.
    let rc = unsafe {
        libc::setsockopt(
            stream.as_raw_fd(),
            libc::SOL_SOCKET,
            name,
            (&value as *const libc::c_int).cast::<libc::c_void>(),
            mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::{Read, Write};
    use std::os::fd::{FromRawFd, OwnedFd};

    use fdxfer_codec::{decode_rights, encode_rights, Envelope};

    use super::*;

    fn pipe() -> (File, File) {
        let mut fds = [0 as libc::c_int; 2];
        // SAFETY: `fds` is a valid two-element array.
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        assert_eq!(rc, 0, "pipe failed: {}", io::Error::last_os_error());
        // SAFETY: pipe() just returned two fresh descriptors we own.
        unsafe { (File::from_raw_fd(fds[0]), File::from_raw_fd(fds[1])) }
    }

    #[test]
    fn empty_receive_would_block() {
        let channel = Channel::create().unwrap();
        let attempt = channel.receiver().receive(16, 4).unwrap();
        assert!(attempt.is_would_block());
    }

    #[test]
    fn data_only_envelope_round_trip() {
        let channel = Channel::create().unwrap();
        let sent = channel
            .sender()
            .send(&Envelope::data_only(&b"x"[..]))
            .unwrap();
        assert_eq!(sent.ready(), Some(1));

        let envelope = channel.receiver().receive(16, 4).unwrap().ready().unwrap();
        assert_eq!(envelope.payload().as_ref(), b"x");
        assert!(!envelope.has_control());
        assert!(!envelope.is_truncated());
    }

    #[test]
    fn descriptors_keep_order_across_transfer() {
        let channel = Channel::create().unwrap();
        let pipes: Vec<(File, File)> = (0..3).map(|_| pipe()).collect();
        let write_ends: Vec<RawFd> = pipes.iter().map(|(_, w)| w.as_raw_fd()).collect();

        let envelope = encode_rights(&write_ends, b'x').unwrap();
        assert_eq!(channel.sender().send(&envelope).unwrap().ready(), Some(1));

        let received = channel.receiver().receive(16, 8).unwrap().ready().unwrap();
        let decoded = decode_rights(&received).unwrap();
        assert_eq!(decoded.payload.as_ref(), b"x");
        assert_eq!(decoded.descriptors.len(), 3);

        for (index, raw) in decoded.descriptors.iter().enumerate() {
            assert!(!write_ends.contains(raw));
            // SAFETY: recvmsg installed this descriptor for us; nothing else owns it.
            let mut file = File::from(unsafe { OwnedFd::from_raw_fd(*raw) });
            file.write_all(&[b'0' + index as u8]).unwrap();
        }

        for (index, (read_end, _)) in pipes.iter().enumerate() {
            let mut byte = [0u8; 1];
            (&*read_end).read_exact(&mut byte).unwrap();
            assert_eq!(byte[0], b'0' + index as u8);
        }
    }

    #[test]
    fn sender_keeps_its_descriptor_after_send() {
        let channel = Channel::create().unwrap();
        let (_read_end, write_end) = pipe();

        let envelope = encode_rights(&[write_end.as_raw_fd()], b'x').unwrap();
        channel.sender().send(&envelope).unwrap();

        // SAFETY: F_GETFD only inspects the descriptor.
        let flags = unsafe { libc::fcntl(write_end.as_raw_fd(), libc::F_GETFD) };
        assert_ne!(flags, -1, "sender descriptor unexpectedly closed");

        let received = channel.receiver().receive(16, 4).unwrap().ready().unwrap();
        for raw in decode_rights(&received).unwrap().descriptors {
            // SAFETY: received descriptor owned by this test.
            drop(unsafe { OwnedFd::from_raw_fd(raw) });
        }
    }

    #[test]
    fn closed_peer_reports_closed() {
        let (sender, receiver) = Channel::create().unwrap().into_parts();
        drop(sender);
        assert!(matches!(receiver.receive(16, 4), Err(ChannelError::Closed)));
    }

    #[test]
    fn send_to_closed_peer_is_an_error_not_a_signal() {
        let (sender, receiver) = Channel::create().unwrap().into_parts();
        drop(receiver);
        let result = sender.send(&Envelope::data_only(&b"x"[..]));
        assert!(matches!(result, Err(ChannelError::Send(_))));
    }

    #[test]
    fn buffer_sizes_are_reported() {
        let channel = Channel::create().unwrap();
        assert!(channel.sender().send_buffer_size().unwrap() > 0);
        assert!(channel.receiver().receive_buffer_size().unwrap() > 0);
    }

    #[test]
    fn vectored_send_gathers_segments() {
        let channel = Channel::create().unwrap();
        let written = channel
            .sender()
            .send_vectored(&[IoSlice::new(b"ab"), IoSlice::new(b"cde")])
            .unwrap();
        assert_eq!(written, 5);

        let mut buf = [0u8; 5];
        (&*channel.receiver().stream()).read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"abcde");
    }
}
