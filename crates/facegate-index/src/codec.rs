//! Little-endian f32 blob encoding for stored vectors.

use facegate_core::IndexError;

const F32_BYTES: usize = std::mem::size_of::<f32>();

pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * F32_BYTES);
    for &value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decode a blob that must hold exactly `dimension` finite floats.
pub fn decode_vector(blob: &[u8], dimension: usize) -> Result<Vec<f32>, IndexError> {
    let expected = dimension
        .checked_mul(F32_BYTES)
        .ok_or_else(|| IndexError::Storage("vector blob length overflow".into()))?;
    if blob.len() != expected {
        return Err(IndexError::Storage(format!(
            "vector blob is {} bytes, expected {expected}",
            blob.len()
        )));
    }

    let mut out = Vec::with_capacity(dimension);
    for chunk in blob.chunks_exact(F32_BYTES) {
        let value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        if !value.is_finite() {
            return Err(IndexError::Storage("stored vector has non-finite values".into()));
        }
        out.push(value);
    }
    Ok(out)
}
