use super::{LCodec, RCodec, WCodec, WireCodec};
use crate::buffers::{
    reader::{DidntRead, Reader},
    writer::{DidntWrite, Writer},
};

// Fixed-width unsigned integers, big-endian
macro_rules! be_impl {
    ($t:ty) => {
        impl<W> WCodec<$t, &mut W> for WireCodec
        where
            W: Writer,
        {
            type Output = Result<(), DidntWrite>;

            fn write(self, writer: &mut W, x: $t) -> Self::Output {
                writer.write_exact(&x.to_be_bytes())
            }
        }

        impl<R> RCodec<$t, &mut R> for WireCodec
        where
            R: Reader,
        {
            type Error = DidntRead;

            fn read(self, reader: &mut R) -> Result<$t, Self::Error> {
                let mut x = [0u8; size_of::<$t>()];
                reader.read_exact(&mut x)?;
                Ok(<$t>::from_be_bytes(x))
            }
        }

        impl LCodec<$t> for WireCodec {
            fn w_len(self, _: $t) -> usize {
                size_of::<$t>()
            }
        }
    };
}

be_impl!(u8);
be_impl!(u16);
be_impl!(u32);
