//! Data-phase transport abstractions
//!
//! A SCSI target moves data-in and data-out bytes over whatever carries its
//! commands, usually a pair of USB bulk endpoints. The target only needs to
//! know how many bytes actually went through.

use embedded_io::{Error as _, ErrorKind, Read, Write};

/// Byte stream used for SCSI data phases
pub trait ScsiTransport {
    /// Send `data` to the initiator
    ///
    /// Returns the number of bytes actually sent. A short count is reported
    /// to the host as residue.
    fn transmit(&mut self, data: &[u8]) -> usize;

    /// Receive up to `buf.len()` bytes from the initiator
    ///
    /// Returns the number of bytes actually received.
    fn receive(&mut self, buf: &mut [u8]) -> usize;
}

/// [`ScsiTransport`] over any blocking `embedded-io` stream
///
/// Transfers loop until the buffer is done, the stream reports end of data
/// or an error occurs. The kind of the last error is kept for diagnostics.
pub struct IoTransport<T> {
    inner: T,
    last_error: Option<ErrorKind>,
}

impl<T> IoTransport<T> {
    /// Wrap a stream
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            last_error: None,
        }
    }

    /// Error that ended the most recent short transfer, if any
    pub fn last_error(&self) -> Option<ErrorKind> {
        self.last_error
    }

    /// Access the wrapped stream
    pub fn inner_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Unwrap the stream
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Read + Write> ScsiTransport for IoTransport<T> {
    fn transmit(&mut self, data: &[u8]) -> usize {
        self.last_error = None;
        let mut sent = 0;
        while sent < data.len() {
            match self.inner.write(&data[sent..]) {
                Ok(0) => break,
                Ok(n) => sent += n,
                Err(e) => {
                    self.last_error = Some(e.kind());
                    break;
                }
            }
        }
        if let Err(e) = self.inner.flush() {
            self.last_error = Some(e.kind());
        }
        sent
    }

    fn receive(&mut self, buf: &mut [u8]) -> usize {
        self.last_error = None;
        let mut received = 0;
        while received < buf.len() {
            match self.inner.read(&mut buf[received..]) {
                Ok(0) => break,
                Ok(n) => received += n,
                Err(e) => {
                    self.last_error = Some(e.kind());
                    break;
                }
            }
        }
        received
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_io::ErrorType;

    /// Loopback stream that accepts at most `chunk` bytes per call
    struct Chunked {
        data: [u8; 32],
        len: usize,
        pos: usize,
        chunk: usize,
        capacity: usize,
    }

    impl Chunked {
        fn new(chunk: usize, capacity: usize) -> Self {
            Self {
                data: [0; 32],
                len: 0,
                pos: 0,
                chunk,
                capacity,
            }
        }
    }

    impl ErrorType for Chunked {
        type Error = ErrorKind;
    }

    impl Write for Chunked {
        fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            if self.len >= self.capacity {
                return Err(ErrorKind::OutOfMemory);
            }
            let n = buf.len().min(self.chunk).min(self.capacity - self.len);
            self.data[self.len..self.len + n].copy_from_slice(&buf[..n]);
            self.len += n;
            Ok(n)
        }

        fn flush(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    impl Read for Chunked {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
            let n = buf.len().min(self.chunk).min(self.len - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn test_transmit_loops_over_partial_writes() {
        let mut transport = IoTransport::new(Chunked::new(3, 32));
        assert_eq!(transport.transmit(&[1, 2, 3, 4, 5, 6, 7, 8]), 8);
        assert_eq!(transport.last_error(), None);
        assert_eq!(&transport.inner_mut().data[..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_transmit_reports_short_count_and_error() {
        let mut transport = IoTransport::new(Chunked::new(4, 6));
        assert_eq!(transport.transmit(&[0xAA; 10]), 6);
        assert_eq!(transport.last_error(), Some(ErrorKind::OutOfMemory));
    }

    #[test]
    fn test_receive_stops_at_end_of_data() {
        let mut stream = Chunked::new(2, 32);
        stream.write(&[9, 8]).unwrap();
        stream.write(&[7]).unwrap();
        let mut transport = IoTransport::new(stream);

        let mut buf = [0u8; 8];
        assert_eq!(transport.receive(&mut buf), 3);
        assert_eq!(&buf[..3], &[9, 8, 7]);
    }
}
