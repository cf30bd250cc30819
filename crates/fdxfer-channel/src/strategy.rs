//! Ways of pushing one `header ++ data` message through a channel.
//!
//! Used to compare the cost of a single contiguous write against split,
//! copied, gathered and `send`-family variants of the same transfer.

use std::fmt;
use std::io::{IoSlice, Read, Write};
use std::str::FromStr;

use crate::endpoint::{Channel, Endpoint};
use crate::error::BenchError;

/// Largest accepted header, in bytes.
pub const MAX_HEADER_SIZE: usize = 100 * 1024;
/// Largest accepted data segment, in bytes.
pub const MAX_DATA_SIZE: usize = 100 * 1024 * 1024;

const HEADER_FILL: u8 = b'h';
const DATA_FILL: u8 = b'd';

/// How one iteration writes its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteStrategy {
    /// One `write` of a pre-assembled buffer.
    OneWrite,
    /// Two `write`s: header, then data.
    TwoWrites,
    /// Copy header and data into one buffer, then one `write`.
    TwoCopiesOneWrite,
    /// One `writev` with two segments.
    OneWritev,
    /// One `writev` with three segments, the data split in half.
    OneWritevSplitData,
    /// One `writev` with a single pre-assembled segment.
    OneWritevOneBuffer,
    /// One `send` of a pre-assembled buffer.
    OneSend,
    /// One `sendmsg` with two segments and no control data.
    OneSendmsg,
}

impl WriteStrategy {
    pub const ALL: [WriteStrategy; 8] = [
        WriteStrategy::OneWrite,
        WriteStrategy::TwoWrites,
        WriteStrategy::TwoCopiesOneWrite,
        WriteStrategy::OneWritev,
        WriteStrategy::OneWritevSplitData,
        WriteStrategy::OneWritevOneBuffer,
        WriteStrategy::OneSend,
        WriteStrategy::OneSendmsg,
    ];

    /// Canonical mode name.
    pub fn name(self) -> &'static str {
        match self {
            WriteStrategy::OneWrite => "one_write",
            WriteStrategy::TwoWrites => "two_writes",
            WriteStrategy::TwoCopiesOneWrite => "two_copies_one_write",
            WriteStrategy::OneWritev => "one_writev",
            WriteStrategy::OneWritevSplitData => "one_writev_split_data",
            WriteStrategy::OneWritevOneBuffer => "one_writev_one_buffer",
            WriteStrategy::OneSend => "one_send",
            WriteStrategy::OneSendmsg => "one_sendmsg",
        }
    }

    /// Alternate descriptive name accepted when parsing.
    fn alias(self) -> &'static str {
        match self {
            WriteStrategy::OneWrite => "single-write",
            WriteStrategy::TwoWrites => "two-writes",
            WriteStrategy::TwoCopiesOneWrite => "two-copy-single-write",
            WriteStrategy::OneWritev => "single-scatter-write",
            WriteStrategy::OneWritevSplitData => "single-scatter-write-split-data",
            WriteStrategy::OneWritevOneBuffer => "single-scatter-write-one-segment",
            WriteStrategy::OneSend => "single-send",
            WriteStrategy::OneSendmsg => "single-scatter-send-with-control-data",
        }
    }

    /// Human-readable description, as shown in usage text.
    pub fn description(self) -> &'static str {
        match self {
            WriteStrategy::OneWrite => "one write()",
            WriteStrategy::TwoWrites => "two write()s",
            WriteStrategy::TwoCopiesOneWrite => "two memcpy()s and one write()",
            WriteStrategy::OneWritev => "one writev() (two buffers)",
            WriteStrategy::OneWritevSplitData => "one writev() (three buffers; data split)",
            WriteStrategy::OneWritevOneBuffer => "one writev() (one buffer)",
            WriteStrategy::OneSend => "one send()",
            WriteStrategy::OneSendmsg => "one sendmsg() (two buffers)",
        }
    }

    /// Number of write-family system calls issued per iteration.
    pub fn calls_per_iteration(self) -> usize {
        match self {
            WriteStrategy::TwoWrites => 2,
            _ => 1,
        }
    }

    /// Number of memory segments handed to the kernel per iteration.
    pub fn segments(self) -> usize {
        match self {
            WriteStrategy::TwoWrites | WriteStrategy::OneWritev | WriteStrategy::OneSendmsg => 2,
            WriteStrategy::OneWritevSplitData => 3,
            _ => 1,
        }
    }
}

impl fmt::Display for WriteStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WriteStrategy {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WriteStrategy::ALL
            .into_iter()
            .find(|strategy| strategy.name() == s || strategy.alias() == s)
            .ok_or_else(|| BenchError::UnknownStrategy(s.to_string()))
    }
}

/// Buffers for one benchmark run, sized once and reused every iteration.
#[derive(Debug)]
pub struct WriteBench {
    header: Vec<u8>,
    data: Vec<u8>,
    total: Vec<u8>,
    read_buffer: Vec<u8>,
}

impl WriteBench {
    /// Validate sizes and fill the header with `h` and the data with `d`.
    pub fn new(header_size: usize, data_size: usize) -> Result<Self, BenchError> {
        if header_size == 0 || header_size > MAX_HEADER_SIZE {
            return Err(BenchError::HeaderSize {
                size: header_size,
                max: MAX_HEADER_SIZE,
            });
        }
        if data_size == 0 || data_size > MAX_DATA_SIZE {
            return Err(BenchError::DataSize {
                size: data_size,
                max: MAX_DATA_SIZE,
            });
        }

        let header = vec![HEADER_FILL; header_size];
        let data = vec![DATA_FILL; data_size];
        let mut total = Vec::with_capacity(header_size + data_size);
        total.extend_from_slice(&header);
        total.extend_from_slice(&data);

        Ok(Self {
            header,
            data,
            read_buffer: vec![0; total.len()],
            total,
        })
    }

    pub fn header_size(&self) -> usize {
        self.header.len()
    }

    pub fn data_size(&self) -> usize {
        self.data.len()
    }

    /// Bytes moved per iteration.
    pub fn total_size(&self) -> usize {
        self.total.len()
    }

    /// Write one message on `endpoint` using `strategy`.
    ///
    /// Each call must move all of its bytes; anything less is an error.
    pub fn write_once(
        &mut self,
        endpoint: &Endpoint,
        strategy: WriteStrategy,
    ) -> Result<usize, BenchError> {
        let name = strategy.name();
        let mut stream = endpoint.stream();
        match strategy {
            WriteStrategy::OneWrite => {
                let n = stream.write(&self.total).map_err(io_error("write"))?;
                expect_written(name, n, self.total.len())?;
            }
            WriteStrategy::TwoWrites => {
                let n = stream.write(&self.header).map_err(io_error("write"))?;
                expect_written(name, n, self.header.len())?;
                let n = stream.write(&self.data).map_err(io_error("write"))?;
                expect_written(name, n, self.data.len())?;
            }
            WriteStrategy::TwoCopiesOneWrite => {
                let split = self.header.len();
                self.total[..split].copy_from_slice(&self.header);
                self.total[split..].copy_from_slice(&self.data);
                let n = stream.write(&self.total).map_err(io_error("write"))?;
                expect_written(name, n, self.total.len())?;
            }
            WriteStrategy::OneWritev => {
                let bufs = [IoSlice::new(&self.header), IoSlice::new(&self.data)];
                let n = stream.write_vectored(&bufs).map_err(io_error("writev"))?;
                expect_written(name, n, self.total.len())?;
            }
            WriteStrategy::OneWritevSplitData => {
                let (front, back) = self.data.split_at(self.data.len() / 2);
                let bufs = [
                    IoSlice::new(&self.header),
                    IoSlice::new(front),
                    IoSlice::new(back),
                ];
                let n = stream.write_vectored(&bufs).map_err(io_error("writev"))?;
                expect_written(name, n, self.total.len())?;
            }
            WriteStrategy::OneWritevOneBuffer => {
                let bufs = [IoSlice::new(&self.total)];
                let n = stream.write_vectored(&bufs).map_err(io_error("writev"))?;
                expect_written(name, n, self.total.len())?;
            }
            WriteStrategy::OneSend => {
                let n = endpoint.send_bytes(&self.total).map_err(io_error("send"))?;
                expect_written(name, n, self.total.len())?;
            }
            WriteStrategy::OneSendmsg => {
                let bufs = [IoSlice::new(&self.header), IoSlice::new(&self.data)];
                let n = endpoint.send_vectored(&bufs).map_err(io_error("sendmsg"))?;
                expect_written(name, n, self.total.len())?;
            }
        }
        Ok(self.total.len())
    }

    /// Read one iteration's worth of bytes from `endpoint` with one `read`.
    pub fn read_once(&mut self, endpoint: &Endpoint) -> Result<&[u8], BenchError> {
        let expected = self.read_buffer.len();
        let n = endpoint
            .stream()
            .read(&mut self.read_buffer)
            .map_err(io_error("read"))?;
        if n != expected {
            return Err(BenchError::ShortRead { read: n, expected });
        }
        Ok(self.read_buffer.as_slice())
    }

    /// One full iteration: write on the sender, read back on the receiver.
    pub fn round(&mut self, channel: &Channel, strategy: WriteStrategy) -> Result<usize, BenchError> {
        let written = self.write_once(channel.sender(), strategy)?;
        self.read_once(channel.receiver())?;
        Ok(written)
    }

    /// Bytes produced by the most recent [`read_once`](Self::read_once).
    pub fn last_read(&self) -> &[u8] {
        &self.read_buffer
    }
}

fn expect_written(strategy: &'static str, written: usize, expected: usize) -> Result<(), BenchError> {
    if written != expected {
        return Err(BenchError::ShortWrite {
            strategy,
            written,
            expected,
        });
    }
    Ok(())
}

fn io_error(operation: &'static str) -> impl Fn(std::io::Error) -> BenchError {
    move |source| BenchError::Io { operation, source }
}
