//! PADME padding (C10 ADDED glossary entry): rounds a plaintext length
//! up to a value with only its high bits significant, bounding the
//! information an observer can recover from ciphertext length to a
//! fixed multiplicative factor, regardless of the true message length.

/// Caller-selected padding policy for `encrypt`. `Off` emits the
/// unpadded *Simple* framing (version 3); `Auto`/`Step` both emit the
/// *Padded simple* framing (version 6), differing only in how the
/// padded length is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaddingStep {
    Off,
    Auto,
    Step(u32),
}

/// PADME: round `length` up to the next value whose low
/// `floor(log2(floor(log2(length))))+1` bits may vary, masking the rest
/// to zero. Monotonic, idempotent (`padme(padme(x)) == padme(x)`), and
/// never pads `0` or `1`.
pub fn padme(length: usize) -> usize {
    if length <= 1 {
        return length;
    }
    let e = usize::BITS - 1 - length.leading_zeros(); // floor(log2(length))
    let s = (u32::BITS - 1 - e.leading_zeros()) + 1; // floor(log2(e)) + 1
    let last_bits = e.saturating_sub(s);
    let bit_mask: usize = (1usize << last_bits) - 1;
    (length + bit_mask) & !bit_mask
}

/// The length a plaintext of `plaintext_len` bytes is padded to before
/// encryption, including the mandatory `0x80` terminator. `Off` returns
/// `plaintext_len` unchanged (the caller uses the unpadded framing
/// instead of appending a terminator).
pub fn padded_length(plaintext_len: usize, step: PaddingStep) -> usize {
    match step {
        PaddingStep::Off => plaintext_len,
        PaddingStep::Auto => padme(plaintext_len + 1),
        PaddingStep::Step(n) => {
            let n = n.max(2) as usize;
            let with_terminator = plaintext_len + 1;
            with_terminator.div_ceil(n) * n
        }
    }
}

/// Pad `plaintext` to `padded_length(plaintext.len(), step)` with
/// `0x80 || 0x00*`. Only called for `Auto`/`Step` — `Off` callers skip
/// padding entirely.
pub fn pad(plaintext: &[u8], step: PaddingStep) -> Vec<u8> {
    let target = padded_length(plaintext.len(), step);
    let mut out = Vec::with_capacity(target);
    out.extend_from_slice(plaintext);
    out.push(0x80);
    out.resize(target, 0x00);
    out
}

/// Strip the `0x80 || 0x00*` terminator, returning the original
/// plaintext. The terminator is unambiguous: it's the last non-zero
/// byte, which must be exactly `0x80`.
pub fn unpad(padded: &[u8]) -> Result<&[u8], crate::error::ResourceError> {
    let last_nonzero = padded
        .iter()
        .rposition(|&b| b != 0)
        .ok_or(crate::error::ResourceError::Truncated)?;
    if padded[last_nonzero] != 0x80 {
        return Err(crate::error::ResourceError::Truncated);
    }
    Ok(&padded[..last_nonzero])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padme_matches_spec_boundary_example() {
        // encrypt("my clear data is clear!") — 23 bytes plaintext — pads
        // (with terminator) to a 24-byte body.
        assert_eq!(padded_length(23, PaddingStep::Auto), 24);
    }

    #[test]
    fn padme_is_monotonic_and_idempotent() {
        let mut prev = 0;
        for len in 1..4096 {
            let padded = padme(len);
            assert!(padded >= len);
            assert!(padded >= prev);
            assert_eq!(padme(padded), padded);
            prev = padded;
        }
    }

    #[test]
    fn fixed_step_rounds_up_to_multiple() {
        let padded = padded_length(23, PaddingStep::Step(13));
        assert_eq!(padded % 13, 0);
        assert!(padded >= 24);
    }

    #[test]
    fn pad_unpad_roundtrip() {
        let data = b"some plaintext of arbitrary length";
        for step in [PaddingStep::Auto, PaddingStep::Step(2), PaddingStep::Step(4096)] {
            let padded = pad(data, step);
            assert_eq!(unpad(&padded).unwrap(), data);
        }
    }

    #[test]
    fn unpad_rejects_all_zero_input() {
        assert!(unpad(&[0u8; 8]).is_err());
    }
}
