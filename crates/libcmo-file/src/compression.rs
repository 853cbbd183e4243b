//! zlib inflation of packed file regions
//!
//! Both the header region and the data region may be stored zlib-compressed.
//! The packed size and the unpacked size are declared in the file header, so
//! inflation is bounded on both ends: exactly `packed_len` input bytes are
//! consumed from the source, and the output must come out at exactly
//! `unpacked_len` bytes.

use crate::config::LoadOptions;
use crate::error::{CKError, CKResult};
use crate::source::{ByteSource, MaterializedBuffer, MaterializedSource};
use flate2::{Decompress, FlushDecompress, Status};
use tracing::debug;

/// Inflate `packed_len` bytes at `offset` of `source` into a new source
///
/// Any bytes that follow the end of the zlib stream inside the packed range
/// are ignored. The output buffer is sized up front from `unpacked_len`; its
/// placement (heap or anonymous map) follows
/// [`LoadOptions::anonymous_map_threshold`].
pub fn inflate(
    source: &dyn ByteSource,
    offset: usize,
    packed_len: usize,
    unpacked_len: usize,
    options: &LoadOptions,
) -> CKResult<MaterializedSource> {
    if unpacked_len > options.max_unpacked_size {
        return Err(CKError::corrupt(format!(
            "declared unpacked size {unpacked_len} exceeds limit of {} bytes",
            options.max_unpacked_size
        )));
    }

    let input = source.read(offset, packed_len)?;
    let mut output = MaterializedBuffer::allocate(unpacked_len, options.anonymous_map_threshold)?;
    inflate_into(input, output.as_mut_slice())?;

    debug!(
        "inflated {} bytes at offset {} into {} bytes",
        packed_len, offset, unpacked_len
    );
    output.freeze()
}

/// Inflate a complete zlib stream from `input` into exactly `output.len()` bytes
fn inflate_into(input: &[u8], output: &mut [u8]) -> CKResult<()> {
    let expected = output.len();
    let mut inflater = Decompress::new(true);

    let status = inflater
        .decompress(input, output, FlushDecompress::Finish)
        .map_err(|e| CKError::corrupt(format!("zlib inflate failed: {e}")))?;

    if status != Status::StreamEnd {
        // Output filled up or input ran out before the end marker. Probe for
        // one more byte to tell "stream is longer than declared" apart from
        // "stream is truncated".
        let consumed = inflater.total_in() as usize;
        let mut probe = [0u8; 1];
        let status = inflater
            .decompress(&input[consumed..], &mut probe, FlushDecompress::Finish)
            .map_err(|e| CKError::corrupt(format!("zlib inflate failed: {e}")))?;

        if inflater.total_out() as usize > expected {
            return Err(CKError::corrupt(format!(
                "stream inflates past the declared {expected} bytes"
            )));
        }
        if status != Status::StreamEnd {
            return Err(CKError::corrupt(format!(
                "stream ended early after {} of {expected} bytes",
                inflater.total_out()
            )));
        }
    }

    let produced = inflater.total_out() as usize;
    if produced != expected {
        return Err(CKError::corrupt(format!(
            "inflated {produced} bytes, header declares {expected}"
        )));
    }
    Ok(())
}
