//! Complex sample types and their on-disk encoding

use byte_slice_cast::AsByteSlice;

#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Debug)]
#[repr(C)]
pub struct Complex<T> {
    pub re: T,
    pub im: T,
}

impl<T> Complex<T> {
    pub fn new(re: T, im: T) -> Self {
        Self { re, im }
    }
}

/// One IQ sample as stored in chunks: a pair of f32 (numpy's `complex64`)
pub type Complex32 = Complex<f32>;

/// The `dtype` tag written into chunk descriptors
pub const DTYPE: &str = "complex64";

/// Bytes per stored sample
pub const SAMPLE_SIZE: usize = 2 * std::mem::size_of::<f32>();

impl Complex32 {
    /// Convert one unsigned 8-bit IQ pair (RTL2832U output) into [-1.0, 1.0]
    pub fn from_cu8(i: u8, q: u8) -> Self {
        Self::new((i as f32 - 127.5) / 127.5, (q as f32 - 127.5) / 127.5)
    }
}

/// Unpack interleaved unsigned 8-bit IQ into `out`, appending.
/// A trailing odd byte is ignored.
pub fn unpack_cu8(raw: &[u8], out: &mut Vec<Complex32>) {
    out.reserve(raw.len() / 2);
    out.extend(raw.chunks_exact(2).map(|iq| Complex32::from_cu8(iq[0], iq[1])));
}

/// Encode samples as interleaved f32 pairs in native byte order, no header
pub fn encode_complex64(samples: &[Complex32]) -> Vec<u8> {
    let interleaved: Vec<f32> = samples.iter().flat_map(|s| [s.re, s.im]).collect();
    interleaved.as_byte_slice().to_vec()
}

/// Inverse of [`encode_complex64`]. Trailing bytes that don't form a whole
/// sample are dropped.
pub fn decode_complex64(bytes: &[u8]) -> Vec<Complex32> {
    bytes
        .chunks_exact(SAMPLE_SIZE)
        .map(|b| {
            Complex32::new(
                f32::from_ne_bytes([b[0], b[1], b[2], b[3]]),
                f32::from_ne_bytes([b[4], b[5], b[6], b[7]]),
            )
        })
        .collect()
}
