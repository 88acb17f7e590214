use crate::{
    buffers::{
        reader::{DidntRead, Reader},
        writer::{DidntWrite, Writer},
    },
    protocol::RdmaHeader,
};

mod be;

/// Encodes `Message` into the sink `Buffer`.
pub(crate) trait WCodec<Message, Buffer> {
    type Output;
    fn write(self, buffer: Buffer, message: Message) -> Self::Output;
}

/// Decodes a `Message` from the source `Buffer`.
pub(crate) trait RCodec<Message, Buffer> {
    type Error;
    fn read(self, buffer: Buffer) -> Result<Message, Self::Error>;
}

// Encoded size
pub(crate) trait LCodec<Message> {
    fn w_len(self, message: Message) -> usize;
}

/// Big-endian wire format.
#[derive(Clone, Copy, Default)]
pub(crate) struct WireCodec;

impl LCodec<&RdmaHeader> for WireCodec {
    fn w_len(self, _x: &RdmaHeader) -> usize {
        RdmaHeader::LEN
    }
}

impl<W> WCodec<&RdmaHeader, &mut W> for WireCodec
where
    W: Writer,
{
    type Output = Result<(), DidntWrite>;

    fn write(self, writer: &mut W, x: &RdmaHeader) -> Self::Output {
        let RdmaHeader {
            flags,
            status,
            length,
            remote_offset,
            id,
            local_offset,
        } = x;

        if writer.remaining() < self.w_len(x) {
            return Err(DidntWrite);
        }
        self.write(&mut *writer, *flags)?;
        self.write(&mut *writer, *status)?;
        self.write(&mut *writer, *length)?;
        self.write(&mut *writer, *remote_offset)?;
        self.write(&mut *writer, *id)?;
        // Reserved
        self.write(&mut *writer, 0u16)?;
        self.write(&mut *writer, *local_offset)?;

        Ok(())
    }
}

impl<R> RCodec<RdmaHeader, &mut R> for WireCodec
where
    R: Reader,
{
    type Error = DidntRead;

    fn read(self, reader: &mut R) -> Result<RdmaHeader, Self::Error> {
        if reader.remaining() < RdmaHeader::LEN {
            return Err(DidntRead);
        }
        let flags: u8 = self.read(&mut *reader)?;
        let status: u8 = self.read(&mut *reader)?;
        let length: u32 = self.read(&mut *reader)?;
        let remote_offset: u32 = self.read(&mut *reader)?;
        let id: u32 = self.read(&mut *reader)?;
        let _reserved: u16 = self.read(&mut *reader)?;
        let local_offset: u32 = self.read(&mut *reader)?;

        Ok(RdmaHeader {
            flags,
            status,
            length,
            remote_offset,
            id,
            local_offset,
        })
    }
}

impl RdmaHeader {
    /// Encodes the header into its fixed-size wire form.
    pub(crate) fn encode(&self) -> [u8; RdmaHeader::LEN] {
        let mut buf = [0u8; RdmaHeader::LEN];
        let mut writer = buf.as_mut_slice();
        // The buffer is exactly one header long
        let _ = WireCodec.write(&mut writer, self);
        buf
    }

    /// Decodes a header from the first [`RdmaHeader::LEN`] bytes of `buf`.
    pub(crate) fn decode(mut buf: &[u8]) -> Result<Self, DidntRead> {
        WireCodec.read(&mut buf)
    }
}
