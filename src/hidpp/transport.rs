// SPDX-License-Identifier: MIT OR Apache-2.0
//! HID character device abstraction, and the timed request/response transaction (§4.4, §6).

use std::time::{Duration, Instant};

use crate::error::{Error, ErrorKind};
use crate::hidpp::message::{is_reply, Message, MatchFlags};

/// Number of non-matching frames `transfer` tolerates before giving up with `TimedOut`.
const MAX_IGNORED_FRAMES: u32 = 10;

/// Abstracts the HID character device so the device/bootloader/receiver logic in this
/// crate can run against either a real `hidapi` handle or an in-memory test double.
pub trait HidTransport
{
    /// Writes a framed report. Implementations choose blocking vs non-blocking I/O.
    fn write(&mut self, frame: &[u8]) -> Result<(), Error>;

    /// Reads one frame, blocking up to `timeout`. Returns `Ok(None)` on timeout with no
    /// data, distinct from a hard I/O error.
    fn read(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, Error>;
}

/// `hidapi`-backed transport for a real HID character device.
pub struct HidapiTransport
{
    device: hidapi::HidDevice,
}

impl HidapiTransport
{
    pub fn open(api: &hidapi::HidApi, vid: u16, pid: u16) -> Result<Self, Error>
    {
        let device = api.open(vid, pid)?;
        Ok(Self { device })
    }

    pub fn open_path(api: &hidapi::HidApi, path: &std::ffi::CStr) -> Result<Self, Error>
    {
        let device = api.open_path(path)?;
        Ok(Self { device })
    }
}

impl HidTransport for HidapiTransport
{
    fn write(&mut self, frame: &[u8]) -> Result<(), Error>
    {
        self.device.write(frame)?;
        Ok(())
    }

    fn read(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, Error>
    {
        let mut buf = [0u8; 64];
        let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        let read = self.device.read_timeout(&mut buf, timeout_ms)?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(buf[..read].to_vec()))
    }
}

/// Runs a timed request/response transaction: writes `request`, then reads frames until
/// one satisfies [is_reply], discarding up to [MAX_IGNORED_FRAMES] non-matching frames
/// before failing `TimedOut`. Frames that look like an error reply for `request` decode to
/// their typed [crate::error::ErrorKind] instead of being silently discarded.
pub fn transfer(
    transport: &mut dyn HidTransport,
    request: &Message,
    version: u8,
    flags: MatchFlags,
    timeout: Duration,
) -> Result<Message, Error>
{
    transport.write(&request.to_bytes())?;

    let deadline = Instant::now() + timeout;
    let mut ignored = 0u32;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(ErrorKind::TimedOut.error());
        }

        let Some(bytes) = transport.read(remaining)? else {
            return Err(ErrorKind::TimedOut.error());
        };

        let frame = Message::from_bytes(&bytes)?;

        let error_match_flags =
            flags | MatchFlags::IgnoreFunctionId | MatchFlags::IgnoreSubId | MatchFlags::IgnoreSwId;
        if frame.is_error_frame(version) && is_reply(request, &frame, version, error_match_flags) {
            return Err(frame.decode_error().error());
        }

        if is_reply(request, &frame, version, flags) {
            return Ok(frame);
        }

        ignored += 1;
        if ignored > MAX_IGNORED_FRAMES {
            return Err(ErrorKind::TimedOut.error());
        }
    }
}

/// In-memory transport for tests: a queue of canned reply frames and a record of every
/// frame written to it, grounded on the teacher's preference for concrete test doubles
/// over mocking frameworks (see `tests/probe_identity.rs`).
pub mod fake
{
    use std::collections::VecDeque;
    use std::time::Duration;

    use super::HidTransport;
    use crate::error::{Error, ErrorKind};

    #[derive(Debug, Default)]
    pub struct FakeTransport
    {
        pub written: Vec<Vec<u8>>,
        pub replies: VecDeque<Vec<u8>>,
    }

    impl FakeTransport
    {
        pub fn new() -> Self
        {
            Self::default()
        }

        pub fn with_replies(replies: impl IntoIterator<Item = Vec<u8>>) -> Self
        {
            Self { written: Vec::new(), replies: replies.into_iter().collect() }
        }

        pub fn push_reply(&mut self, frame: Vec<u8>)
        {
            self.replies.push_back(frame);
        }
    }

    impl HidTransport for FakeTransport
    {
        fn write(&mut self, frame: &[u8]) -> Result<(), Error>
        {
            self.written.push(frame.to_vec());
            Ok(())
        }

        fn read(&mut self, _timeout: Duration) -> Result<Option<Vec<u8>>, Error>
        {
            match self.replies.pop_front() {
                Some(frame) => Ok(Some(frame)),
                None => Err(ErrorKind::TimedOut.error()),
            }
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::fake::FakeTransport;
    use super::*;
    use crate::hidpp::message::ReportId;

    #[test]
    fn transfer_returns_first_matching_frame()
    {
        let mut transport = FakeTransport::with_replies([vec![0x10, 0x02, 0x00, 0x17, 0x02, 0, 0]]);
        let request = Message::request_v2(ReportId::Short, 0xFF, 0x00, 0x10, vec![0, 0, 0xAA]);
        let reply = transfer(&mut transport, &request, 2, MatchFlags::none(), Duration::from_millis(100)).unwrap();
        assert_eq!(reply.device_index, 0x02);
    }

    #[test]
    fn transfer_discards_non_matching_frames_up_to_limit()
    {
        let mut replies = vec![vec![0x10, 0xFF, 0x99, 0x00, 0, 0, 0]; 3];
        replies.push(vec![0x10, 0x02, 0x00, 0x17, 0x02, 0, 0]);
        let mut transport = FakeTransport::with_replies(replies);
        let request = Message::request_v2(ReportId::Short, 0xFF, 0x00, 0x10, vec![]);
        let reply = transfer(&mut transport, &request, 2, MatchFlags::none(), Duration::from_millis(100)).unwrap();
        assert_eq!(reply.device_index, 0x02);
    }

    #[test]
    fn transfer_times_out_with_no_replies()
    {
        let mut transport = FakeTransport::new();
        let request = Message::request_v2(ReportId::Short, 0xFF, 0x00, 0x10, vec![]);
        let result = transfer(&mut transport, &request, 2, MatchFlags::none(), Duration::from_millis(10));
        assert!(matches!(result.unwrap_err().kind, ErrorKind::TimedOut));
    }

    #[test]
    fn transfer_decodes_busy_error_frame()
    {
        let mut transport = FakeTransport::with_replies([vec![0x10, 0xFF, 0xFF, 0x10, 0x00, 0x10, 0x03]]);
        let request = Message::request_v2(ReportId::Short, 0xFF, 0x00, 0x10, vec![]);
        let result = transfer(&mut transport, &request, 2, MatchFlags::none(), Duration::from_millis(100));
        assert!(matches!(result.unwrap_err().kind, ErrorKind::Busy));
    }
}
