//! Chunked download/upload engine
//!
//! Fragments arbitrary-length files into mailbox-sized chunks, drives the
//! retry/abort policy and keeps the per-channel file table current. The
//! engine decides *what* is sent and *when*; moving the bytes is delegated
//! to an injected [`PacketTransport`], so low-level packet encoding never
//! appears here.
//!
//! Failed handshakes are retried per chunk up to [`TRANSFER_RETRY_COUNT`]
//! times. Once the budget is exhausted the whole transfer aborts and the
//! caller must restart the file from the beginning - there is no resume.

use crate::device::{ChannelInstance, FileEntry, LoadState};
use crate::error::{Error, Result};
use crate::file::{FileDescriptor, ShortName, TransferType};
use crate::mailbox::{self, Direction};
use crate::window::DpmWindow;

/// Handshake attempts per chunk before a transfer is aborted
pub const TRANSFER_RETRY_COUNT: u32 = 3;

/// One fragment of a file download
#[derive(Debug)]
pub struct DownloadChunk<'a> {
    /// Short name of the file being transferred
    pub file_name: &'a ShortName,
    /// How the device should interpret the file
    pub transfer_type: TransferType,
    /// Total file length in bytes
    pub total_size: u32,
    /// Offset of this fragment within the file
    pub offset: u32,
    /// Fragment payload
    pub data: &'a [u8],
    /// True for the final fragment
    pub last: bool,
}

/// Request for one fragment of a file upload
#[derive(Debug)]
pub struct ChunkRequest<'a> {
    /// Short name of the file to read back
    pub file_name: &'a ShortName,
    /// Transfer type recorded at download time
    pub transfer_type: TransferType,
    /// Offset of the requested fragment
    pub offset: u32,
    /// Requested fragment length
    pub len: u32,
}

/// A protocol command handed to the transport
#[derive(Debug)]
pub enum TransferCommand<'a> {
    /// Write one download fragment
    DownloadChunk(DownloadChunk<'a>),
    /// Ask the device to post one upload fragment
    UploadRequest(ChunkRequest<'a>),
    /// Remove a file from the device
    DeleteFile {
        /// Short name of the file to remove
        file_name: &'a ShortName,
    },
}

/// Packet-moving capability supplied by the caller.
///
/// Implementations encode commands into whatever packet format the
/// device side speaks and move them through the mailbox (or any other
/// channel). All calls are synchronous; a handshake that is not
/// acknowledged in time surfaces as [`Error::HandshakeTimeout`], which
/// the engine treats as retryable.
pub trait PacketTransport {
    /// Largest download fragment this transport can carry in one packet
    fn max_write_len(&self) -> usize;

    /// Largest upload fragment this transport can deliver in one packet
    fn max_read_len(&self) -> usize;

    /// Send one command to the device and wait for its acknowledgment
    fn transfer_packet(&mut self, cmd: &TransferCommand<'_>) -> Result<()>;

    /// Receive the payload posted in response to the previous
    /// [`TransferCommand::UploadRequest`]. Returns the payload length.
    fn receive_packet(&mut self, buf: &mut [u8]) -> Result<usize>;
}

/// Callback for transfer progress reporting
pub trait TransferProgress {
    /// Called after every acknowledged chunk with cumulative bytes sent.
    /// The value is strictly increasing and reaches `total` exactly when
    /// the transfer completes.
    fn progress(&mut self, transferred: u32, total: u32);
}

/// A no-op progress reporter
pub struct NoProgress;

impl TransferProgress for NoProgress {
    fn progress(&mut self, _transferred: u32, _total: u32) {}
}

/// Outcome of a download decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadDecision {
    /// File already present with identical size
    Skip,
    /// File absent or size differs
    Download,
}

/// Statistics of a completed download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DownloadStats {
    /// Bytes actually transferred (zero when skipped)
    pub bytes_transferred: u32,
    /// True when the file was already present and nothing was sent
    pub skipped: bool,
}

/// Decide whether a candidate file must be downloaded.
///
/// The identity check is short name (case-insensitive) plus byte size
/// only - content is never compared, so a same-size file with different
/// content is wrongly skipped. This mirrors the device's own bookkeeping
/// and is kept as is deliberately.
pub fn check_for_download(
    channel: &ChannelInstance,
    name: &str,
    size: u32,
) -> DownloadDecision {
    match channel.find_file(name) {
        Some(entry) if entry.descriptor.file_size() == size => DownloadDecision::Skip,
        _ => DownloadDecision::Download,
    }
}

fn send_with_retry<T: PacketTransport>(
    transport: &mut T,
    cmd: &TransferCommand<'_>,
) -> Result<()> {
    for attempt in 1..=TRANSFER_RETRY_COUNT {
        match transport.transfer_packet(cmd) {
            Ok(()) => return Ok(()),
            Err(Error::HandshakeTimeout) => {
                log::warn!(
                    "handshake timeout, attempt {}/{}",
                    attempt,
                    TRANSFER_RETRY_COUNT
                );
            }
            Err(e) => return Err(e),
        }
    }
    log::warn!("retry budget exhausted, aborting transfer");
    Err(Error::TransferAborted)
}

fn request_with_retry<T: PacketTransport>(
    transport: &mut T,
    cmd: &TransferCommand<'_>,
    buf: &mut [u8],
) -> Result<usize> {
    for attempt in 1..=TRANSFER_RETRY_COUNT {
        let outcome = transport
            .transfer_packet(cmd)
            .and_then(|()| transport.receive_packet(buf));
        match outcome {
            Ok(n) => return Ok(n),
            Err(Error::HandshakeTimeout) => {
                log::warn!(
                    "handshake timeout, attempt {}/{}",
                    attempt,
                    TRANSFER_RETRY_COUNT
                );
            }
            Err(e) => return Err(e),
        }
    }
    log::warn!("retry budget exhausted, aborting upload");
    Err(Error::TransferAborted)
}

fn negotiated_chunk(mailbox_size: u32, transport_limit: usize) -> Result<usize> {
    let chunk = (mailbox_size as usize).min(transport_limit);
    if chunk == 0 {
        return Err(Error::BufferTooSmall);
    }
    Ok(chunk)
}

/// Download a firmware or module file to a channel.
///
/// Classifies the file, skips it when the channel already holds an entry
/// with the same name and size, otherwise transfers it in negotiated
/// chunks. The channel lock is held for the whole multi-chunk operation.
/// On abort the load state stays at `Downloading`: the caller retries the
/// whole file, never a suffix.
pub fn process_fw_download<T, P>(
    channel: &mut ChannelInstance,
    name: &ShortName,
    full_name: &str,
    data: &[u8],
    transport: &mut T,
    progress: &mut P,
) -> Result<DownloadStats>
where
    T: PacketTransport,
    P: TransferProgress,
{
    let total = data.len() as u32;

    // Unrecognized extensions fail here; callers treat this as a
    // non-fatal skip decision.
    let descriptor = FileDescriptor::new(name.clone(), full_name, total)?;

    if check_for_download(channel, name.as_str(), total) == DownloadDecision::Skip {
        log::debug!("{} already loaded with {} bytes, skipping", name, total);
        return Ok(DownloadStats {
            bytes_transferred: 0,
            skipped: true,
        });
    }

    let _guard = channel.lock.try_acquire()?;
    let chunk = negotiated_chunk(channel.mailbox_size, transport.max_write_len())?;

    log::debug!(
        "downloading {} ({} bytes, {:?}, {} byte chunks)",
        name,
        total,
        descriptor.transfer_type(),
        chunk
    );
    channel.load_state = LoadState::Downloading;

    let mut sent: u32 = 0;
    for fragment in data.chunks(chunk) {
        let cmd = TransferCommand::DownloadChunk(DownloadChunk {
            file_name: name,
            transfer_type: descriptor.transfer_type(),
            total_size: total,
            offset: sent,
            data: fragment,
            last: sent + fragment.len() as u32 == total,
        });
        send_with_retry(transport, &cmd)?;
        sent += fragment.len() as u32;
        progress.progress(sent, total);
    }

    channel
        .files
        .retain(|e| !e.descriptor.short_name().matches(name.as_str()));
    channel.files.push(FileEntry { descriptor });
    channel.load_state = LoadState::Loaded;
    log::debug!("{} loaded", name);

    Ok(DownloadStats {
        bytes_transferred: total,
        skipped: false,
    })
}

/// Read a previously downloaded file back from the device.
///
/// The expected length comes from the channel's file table. A fragment
/// shorter than requested before that length is reached is a fatal
/// [`Error::ShortRead`]; the output is never silently padded.
pub fn upload_file<T: PacketTransport>(
    channel: &mut ChannelInstance,
    name: &ShortName,
    out: &mut [u8],
    transport: &mut T,
) -> Result<usize> {
    let (total, transfer_type) = {
        let entry = channel.find_file(name.as_str()).ok_or(Error::FileNotFound)?;
        (entry.descriptor.file_size(), entry.descriptor.transfer_type())
    };
    if (out.len() as u32) < total {
        return Err(Error::BufferTooSmall);
    }

    let _guard = channel.lock.try_acquire()?;
    let chunk = negotiated_chunk(channel.mailbox_size, transport.max_read_len())?;
    log::debug!("uploading {} ({} bytes, {} byte chunks)", name, total, chunk);

    let mut read: u32 = 0;
    while read < total {
        let want = (chunk as u32).min(total - read);
        let cmd = TransferCommand::UploadRequest(ChunkRequest {
            file_name: name,
            transfer_type,
            offset: read,
            len: want,
        });
        let span = read as usize..(read + want) as usize;
        let got = request_with_retry(transport, &cmd, &mut out[span])? as u32;
        if got < want {
            log::warn!("{}: device returned {} of {} bytes", name, got, want);
            return Err(Error::ShortRead {
                expected: want,
                got,
            });
        }
        read += want;
    }

    Ok(read as usize)
}

/// Delete one file from the device and the channel's file table.
///
/// The only way a channel's load state regresses: once the table is
/// empty the channel is `NotLoaded` again.
pub fn delete_file<T: PacketTransport>(
    channel: &mut ChannelInstance,
    name: &ShortName,
    transport: &mut T,
) -> Result<()> {
    if channel.find_file(name.as_str()).is_none() {
        return Err(Error::FileNotFound);
    }

    let _guard = channel.lock.try_acquire()?;
    send_with_retry(transport, &TransferCommand::DeleteFile { file_name: name })?;

    channel
        .files
        .retain(|e| !e.descriptor.short_name().matches(name.as_str()));
    if channel.files.is_empty() {
        channel.load_state = LoadState::NotLoaded;
    }
    log::debug!("{} deleted", name);
    Ok(())
}

/// Delete every file of a channel, optionally sparing one.
///
/// Returns the number of removed files.
pub fn remove_channel_files<T: PacketTransport>(
    channel: &mut ChannelInstance,
    except: Option<&ShortName>,
    transport: &mut T,
) -> Result<u32> {
    let names: alloc::vec::Vec<ShortName> = channel
        .files
        .iter()
        .map(|e| e.descriptor.short_name().clone())
        .filter(|n| except.map_or(true, |x| !x.matches(n.as_str())))
        .collect();

    let mut removed = 0;
    for name in &names {
        delete_file(channel, name, transport)?;
        removed += 1;
    }
    Ok(removed)
}

/// Delete every firmware file of a channel.
///
/// Returns the number of removed files.
pub fn remove_fw_files<T: PacketTransport>(
    channel: &mut ChannelInstance,
    transport: &mut T,
) -> Result<u32> {
    let names: alloc::vec::Vec<ShortName> = channel
        .files
        .iter()
        .map(|e| e.descriptor.short_name().clone())
        .filter(|n| n.category().is_firmware())
        .collect();

    let mut removed = 0;
    for name in &names {
        delete_file(channel, name, transport)?;
        removed += 1;
    }
    Ok(removed)
}

/// [`PacketTransport`] over the boot-stage mailbox.
///
/// Maps commands onto single mailbox messages: a fixed header carrying
/// the command, name and fragment geometry, followed by the fragment
/// payload for downloads. Upload responses arrive as raw payload in the
/// device-to-host buffer. This framing is private between host and ROM
/// loader; the engine above never sees it.
pub struct MailboxTransport<'a, W: DpmWindow> {
    win: &'a mut W,
    timeout_us: u32,
}

/// Header length of the mailbox packet framing
pub const FRAME_HEADER_LEN: usize = 32;

/// Frame command byte: write one download fragment
pub const CMD_DOWNLOAD: u8 = 1;
/// Frame command byte: request one upload fragment
pub const CMD_UPLOAD: u8 = 2;
/// Frame command byte: delete a file
pub const CMD_DELETE: u8 = 3;

impl<'a, W: DpmWindow> MailboxTransport<'a, W> {
    /// Create a transport over a window with a per-handshake timeout
    pub fn new(win: &'a mut W, timeout_us: u32) -> Self {
        Self { win, timeout_us }
    }

    fn encode_header(
        frame: &mut [u8],
        cmd: u8,
        name: &ShortName,
        transfer_type: u8,
        total: u32,
        offset: u32,
        len: u32,
    ) {
        frame[0] = cmd;
        frame[1] = transfer_type;
        // Name field is 16 bytes, zero padded
        let name = name.as_str().as_bytes();
        frame[4..4 + name.len()].copy_from_slice(name);
        frame[20..24].copy_from_slice(&total.to_le_bytes());
        frame[24..28].copy_from_slice(&offset.to_le_bytes());
        frame[28..32].copy_from_slice(&len.to_le_bytes());
    }
}

impl<W: DpmWindow> PacketTransport for MailboxTransport<'_, W> {
    fn max_write_len(&self) -> usize {
        crate::dpm::HOST_TO_NETX_BUFFER_SIZE as usize - FRAME_HEADER_LEN
    }

    fn max_read_len(&self) -> usize {
        crate::dpm::NETX_TO_HOST_BUFFER_SIZE as usize
    }

    fn transfer_packet(&mut self, cmd: &TransferCommand<'_>) -> Result<()> {
        let mut frame = [0u8; crate::dpm::HOST_TO_NETX_BUFFER_SIZE as usize];
        let total_len = match cmd {
            TransferCommand::DownloadChunk(chunk) => {
                if chunk.data.len() > self.max_write_len() {
                    return Err(Error::PayloadTooLarge);
                }
                Self::encode_header(
                    &mut frame,
                    CMD_DOWNLOAD,
                    chunk.file_name,
                    chunk.transfer_type as u8,
                    chunk.total_size,
                    chunk.offset,
                    chunk.data.len() as u32,
                );
                frame[FRAME_HEADER_LEN..FRAME_HEADER_LEN + chunk.data.len()]
                    .copy_from_slice(chunk.data);
                FRAME_HEADER_LEN + chunk.data.len()
            }
            TransferCommand::UploadRequest(req) => {
                Self::encode_header(
                    &mut frame,
                    CMD_UPLOAD,
                    req.file_name,
                    req.transfer_type as u8,
                    0,
                    req.offset,
                    req.len,
                );
                FRAME_HEADER_LEN
            }
            TransferCommand::DeleteFile { file_name } => {
                Self::encode_header(&mut frame, CMD_DELETE, file_name, 0, 0, 0, 0);
                FRAME_HEADER_LEN
            }
        };

        mailbox::send_and_await_ack(
            self.win,
            Direction::HostToDevice,
            &frame[..total_len],
            self.timeout_us,
        )
    }

    fn receive_packet(&mut self, buf: &mut [u8]) -> Result<usize> {
        mailbox::await_and_receive(self.win, Direction::DeviceToHost, buf, self.timeout_us)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{ChannelInstance, LoadState};
    use alloc::string::String;
    use alloc::vec;
    use alloc::vec::Vec;

    /// In-memory device side: stores downloads per name, serves uploads,
    /// and can fail the next N handshakes with a timeout.
    struct MockTransport {
        files: Vec<(String, Vec<u8>)>,
        pending: Option<Vec<u8>>,
        fail_next: u32,
        transfer_calls: u32,
        write_limit: usize,
    }

    impl MockTransport {
        fn new() -> Self {
            Self {
                files: Vec::new(),
                pending: None,
                fail_next: 0,
                transfer_calls: 0,
                write_limit: 992,
            }
        }

        fn stored(&self, name: &str) -> Option<&Vec<u8>> {
            self.files
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, d)| d)
        }

        fn store_mut(&mut self, name: &str) -> &mut Vec<u8> {
            if let Some(i) = self
                .files
                .iter()
                .position(|(n, _)| n.eq_ignore_ascii_case(name))
            {
                &mut self.files[i].1
            } else {
                self.files.push((String::from(name), Vec::new()));
                &mut self.files.last_mut().unwrap().1
            }
        }
    }

    impl PacketTransport for MockTransport {
        fn max_write_len(&self) -> usize {
            self.write_limit
        }

        fn max_read_len(&self) -> usize {
            512
        }

        fn transfer_packet(&mut self, cmd: &TransferCommand<'_>) -> Result<()> {
            self.transfer_calls += 1;
            if self.fail_next > 0 {
                self.fail_next -= 1;
                return Err(Error::HandshakeTimeout);
            }
            match cmd {
                TransferCommand::DownloadChunk(c) => {
                    assert_eq!(
                        c.last,
                        c.offset + c.data.len() as u32 == c.total_size
                    );
                    let store = self.store_mut(c.file_name.as_str());
                    if c.offset == 0 {
                        store.clear();
                    }
                    assert_eq!(store.len() as u32, c.offset);
                    store.extend_from_slice(c.data);
                }
                TransferCommand::UploadRequest(r) => {
                    let data = self
                        .stored(r.file_name.as_str())
                        .cloned()
                        .unwrap_or_default();
                    let start = (r.offset as usize).min(data.len());
                    let end = (r.offset as usize + r.len as usize).min(data.len());
                    self.pending = Some(data[start..end].to_vec());
                }
                TransferCommand::DeleteFile { file_name } => {
                    self.files
                        .retain(|(n, _)| !n.eq_ignore_ascii_case(file_name.as_str()));
                }
            }
            Ok(())
        }

        fn receive_packet(&mut self, buf: &mut [u8]) -> Result<usize> {
            let data = self.pending.take().ok_or(Error::HandshakeTimeout)?;
            let n = data.len().min(buf.len());
            buf[..n].copy_from_slice(&data[..n]);
            Ok(n)
        }
    }

    struct RecordingProgress {
        calls: Vec<(u32, u32)>,
    }

    impl TransferProgress for RecordingProgress {
        fn progress(&mut self, transferred: u32, total: u32) {
            self.calls.push((transferred, total));
        }
    }

    fn name(s: &str) -> ShortName {
        ShortName::new(s).unwrap()
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_download_then_upload_round_trip() {
        let mut channel = ChannelInstance::new(0, 1024);
        let mut transport = MockTransport::new();
        let data = pattern(3000);
        let fw = name("fw.nxf");

        let stats = process_fw_download(
            &mut channel,
            &fw,
            "/opt/fw/fw.nxf",
            &data,
            &mut transport,
            &mut NoProgress,
        )
        .unwrap();
        assert_eq!(stats.bytes_transferred, 3000);
        assert!(!stats.skipped);
        assert_eq!(channel.load_state, LoadState::Loaded);
        assert_eq!(
            channel.find_file("FW.NXF").unwrap().descriptor.file_size(),
            3000
        );

        let mut out = vec![0u8; 3000];
        let n = upload_file(&mut channel, &fw, &mut out, &mut transport).unwrap();
        assert_eq!(n, 3000);
        assert_eq!(out, data);
    }

    #[test]
    fn test_download_skips_identical_size() {
        let mut channel = ChannelInstance::new(0, 1024);
        let mut transport = MockTransport::new();
        let data = pattern(500);
        let fw = name("fw.nxf");

        process_fw_download(
            &mut channel,
            &fw,
            "fw.nxf",
            &data,
            &mut transport,
            &mut NoProgress,
        )
        .unwrap();
        let calls = transport.transfer_calls;

        let stats = process_fw_download(
            &mut channel,
            &fw,
            "fw.nxf",
            &data,
            &mut transport,
            &mut NoProgress,
        )
        .unwrap();
        assert!(stats.skipped);
        assert_eq!(stats.bytes_transferred, 0);
        assert_eq!(transport.transfer_calls, calls);

        // A different size forces a fresh download
        let bigger = pattern(501);
        let stats = process_fw_download(
            &mut channel,
            &fw,
            "fw.nxf",
            &bigger,
            &mut transport,
            &mut NoProgress,
        )
        .unwrap();
        assert!(!stats.skipped);
    }

    #[test]
    fn test_download_rejects_unknown_extension() {
        let mut channel = ChannelInstance::new(0, 1024);
        let mut transport = MockTransport::new();

        let err = process_fw_download(
            &mut channel,
            &name("data.bin"),
            "data.bin",
            &[1, 2, 3],
            &mut transport,
            &mut NoProgress,
        )
        .unwrap_err();
        assert_eq!(err, Error::UnknownFileType);
        assert_eq!(channel.load_state, LoadState::NotLoaded);
        assert_eq!(transport.transfer_calls, 0);
    }

    #[test]
    fn test_download_aborts_after_retry_budget() {
        let mut channel = ChannelInstance::new(0, 1024);
        let mut transport = MockTransport::new();
        transport.fail_next = TRANSFER_RETRY_COUNT;

        let err = process_fw_download(
            &mut channel,
            &name("fw.nxf"),
            "fw.nxf",
            &pattern(100),
            &mut transport,
            &mut NoProgress,
        )
        .unwrap_err();
        assert_eq!(err, Error::TransferAborted);
        assert_eq!(transport.transfer_calls, TRANSFER_RETRY_COUNT);
        // Aborted download is visible: the caller must restart the file
        assert_eq!(channel.load_state, LoadState::Downloading);
        assert!(channel.find_file("fw.nxf").is_none());
    }

    #[test]
    fn test_download_recovers_within_retry_budget() {
        let mut channel = ChannelInstance::new(0, 1024);
        let mut transport = MockTransport::new();
        transport.fail_next = TRANSFER_RETRY_COUNT - 1;

        let data = pattern(100);
        let stats = process_fw_download(
            &mut channel,
            &name("fw.nxf"),
            "fw.nxf",
            &data,
            &mut transport,
            &mut NoProgress,
        )
        .unwrap();
        assert_eq!(stats.bytes_transferred, 100);
        assert_eq!(channel.load_state, LoadState::Loaded);
        assert_eq!(transport.stored("fw.nxf").unwrap(), &data);
    }

    #[test]
    fn test_progress_reports_every_chunk() {
        // 256 byte chunks over 1000 bytes: 4 callbacks, last one exact
        let mut channel = ChannelInstance::new(0, 256);
        let mut transport = MockTransport::new();
        let mut progress = RecordingProgress { calls: Vec::new() };

        process_fw_download(
            &mut channel,
            &name("fw.nxf"),
            "fw.nxf",
            &pattern(1000),
            &mut transport,
            &mut progress,
        )
        .unwrap();

        assert_eq!(
            progress.calls,
            vec![(256, 1000), (512, 1000), (768, 1000), (1000, 1000)]
        );
    }

    #[test]
    fn test_upload_short_read() {
        let mut channel = ChannelInstance::new(0, 1024);
        let mut transport = MockTransport::new();
        let fw = name("fw.nxf");

        process_fw_download(
            &mut channel,
            &fw,
            "fw.nxf",
            &pattern(100),
            &mut transport,
            &mut NoProgress,
        )
        .unwrap();

        // Device lost part of the file
        transport.store_mut("fw.nxf").truncate(40);

        let mut out = [0u8; 100];
        let err = upload_file(&mut channel, &fw, &mut out, &mut transport).unwrap_err();
        assert_eq!(
            err,
            Error::ShortRead {
                expected: 100,
                got: 40
            }
        );
    }

    #[test]
    fn test_upload_errors() {
        let mut channel = ChannelInstance::new(0, 1024);
        let mut transport = MockTransport::new();
        let fw = name("fw.nxf");

        let mut out = [0u8; 16];
        assert_eq!(
            upload_file(&mut channel, &fw, &mut out, &mut transport),
            Err(Error::FileNotFound)
        );

        process_fw_download(
            &mut channel,
            &fw,
            "fw.nxf",
            &pattern(100),
            &mut transport,
            &mut NoProgress,
        )
        .unwrap();
        assert_eq!(
            upload_file(&mut channel, &fw, &mut out, &mut transport),
            Err(Error::BufferTooSmall)
        );
    }

    #[test]
    fn test_delete_file_regresses_load_state() {
        let mut channel = ChannelInstance::new(0, 1024);
        let mut transport = MockTransport::new();
        let fw = name("fw.nxf");

        process_fw_download(
            &mut channel,
            &fw,
            "fw.nxf",
            &pattern(100),
            &mut transport,
            &mut NoProgress,
        )
        .unwrap();
        assert_eq!(channel.load_state, LoadState::Loaded);

        delete_file(&mut channel, &fw, &mut transport).unwrap();
        assert!(channel.files.is_empty());
        assert_eq!(channel.load_state, LoadState::NotLoaded);
        assert!(transport.stored("fw.nxf").is_none());

        assert_eq!(
            delete_file(&mut channel, &fw, &mut transport),
            Err(Error::FileNotFound)
        );
    }

    #[test]
    fn test_remove_channel_files_with_exception() {
        let mut channel = ChannelInstance::new(0, 1024);
        let mut transport = MockTransport::new();
        let keep = name("boot.nxf");

        for n in ["boot.nxf", "mod1.nxo", "mod2.nxo"] {
            process_fw_download(
                &mut channel,
                &name(n),
                n,
                &pattern(64),
                &mut transport,
                &mut NoProgress,
            )
            .unwrap();
        }

        let removed =
            remove_channel_files(&mut channel, Some(&keep), &mut transport).unwrap();
        assert_eq!(removed, 2);
        assert!(channel.find_file("boot.nxf").is_some());
        assert_eq!(channel.load_state, LoadState::Loaded);

        let removed = remove_fw_files(&mut channel, &mut transport).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(channel.load_state, LoadState::NotLoaded);
    }

    #[test]
    fn test_busy_channel_is_rejected() {
        let mut channel = ChannelInstance::new(0, 1024);
        let mut transport = MockTransport::new();

        // Leak the guard to simulate a concurrent holder
        let guard = channel.lock.try_acquire().unwrap();
        core::mem::forget(guard);

        let err = process_fw_download(
            &mut channel,
            &name("fw.nxf"),
            "fw.nxf",
            &pattern(64),
            &mut transport,
            &mut NoProgress,
        )
        .unwrap_err();
        assert_eq!(err, Error::DeviceBusy);
        assert_eq!(transport.transfer_calls, 0);
    }

    #[test]
    fn test_mailbox_transport_limits() {
        use crate::testutil::MemWindow;
        let mut win = MemWindow::new(0x10000);
        let transport = MailboxTransport::new(&mut win, 1_000);
        assert_eq!(
            transport.max_write_len(),
            crate::dpm::HOST_TO_NETX_BUFFER_SIZE as usize - FRAME_HEADER_LEN
        );
        assert_eq!(
            transport.max_read_len(),
            crate::dpm::NETX_TO_HOST_BUFFER_SIZE as usize
        );
    }
}
