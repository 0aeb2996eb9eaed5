//! Restartable multibyte decoder and encoder.
//!
//! [`decode_one`] and [`encode_one`] are the only places that know the byte
//! layout of an encoding. Everything else in the crate (wide streams,
//! `%lc`/`%ls`, `mbrtowc` and friends) goes through them.

use crate::locale::Encoding;

/// Longest multibyte sequence any supported encoding produces.
pub const MB_LEN_MAX: usize = 4;

/// Partially decoded multibyte character (C `mbstate_t`).
///
/// In the initial state no bytes are pending. After [`decode_one`] returns
/// [`Decoded::Incomplete`] the bytes seen so far live here until a later
/// call completes or rejects the character.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MbState {
    pending: [u8; MB_LEN_MAX - 1],
    count: u8,
    need: u8,
}

impl MbState {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: [0; MB_LEN_MAX - 1],
            count: 0,
            need: 0,
        }
    }

    /// `mbsinit`: true when no partial character is pending.
    #[must_use]
    pub const fn is_initial(&self) -> bool {
        self.count == 0
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Number of bytes held from an incomplete sequence.
    #[must_use]
    pub const fn pending_len(&self) -> usize {
        self.count as usize
    }

    /// Serialize into the 8 bytes of a C `mbstate_t`.
    #[must_use]
    pub const fn to_raw(&self) -> [u8; 8] {
        [
            self.count,
            self.need,
            self.pending[0],
            self.pending[1],
            self.pending[2],
            0,
            0,
            0,
        ]
    }

    /// Rebuild from a C `mbstate_t`. Bytes that could not have come from
    /// [`Self::to_raw`] yield the initial state.
    #[must_use]
    pub const fn from_raw(raw: [u8; 8]) -> Self {
        let (count, need) = (raw[0], raw[1]);
        if count == 0 || count as usize >= MB_LEN_MAX || need as usize > MB_LEN_MAX || count >= need {
            return Self::new();
        }
        Self {
            pending: [raw[2], raw[3], raw[4]],
            count,
            need,
        }
    }
}

/// Outcome of decoding one character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    /// A whole character; `consumed` counts bytes taken from this call's input.
    Char { consumed: usize, wc: u32 },
    /// Every byte was consumed into the state without completing a character.
    Incomplete { consumed: usize },
    /// Not a valid sequence (EILSEQ). The state is reset.
    Invalid,
    /// No input bytes were supplied. The state is unchanged.
    EndOfInput,
}

/// A wide character with no representation in the encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unrepresentable;

/// Single-byte mapping of high bytes into a private block.
const SINGLE_BYTE_BASE: u32 = 0xDF00;

fn utf8_sequence_len(lead: u8) -> Option<usize> {
    match lead {
        0x00..=0x7F => Some(1),
        0xC2..=0xDF => Some(2),
        0xE0..=0xEF => Some(3),
        0xF0..=0xF4 => Some(4),
        _ => None,
    }
}

/// Second-byte ranges exclude overlongs, surrogates and values past U+10FFFF.
fn valid_continuation(lead: u8, index: usize, b: u8) -> bool {
    if index == 1 {
        match lead {
            0xE0 => (0xA0..=0xBF).contains(&b),
            0xED => (0x80..=0x9F).contains(&b),
            0xF0 => (0x90..=0xBF).contains(&b),
            0xF4 => (0x80..=0x8F).contains(&b),
            _ => (0x80..=0xBF).contains(&b),
        }
    } else {
        (0x80..=0xBF).contains(&b)
    }
}

fn utf8_value(seq: &[u8]) -> u32 {
    let lead = u32::from(seq[0]);
    let mut wc = match seq.len() {
        1 => return lead,
        2 => lead & 0x1F,
        3 => lead & 0x0F,
        _ => lead & 0x07,
    };
    for &b in &seq[1..] {
        wc = (wc << 6) | u32::from(b & 0x3F);
    }
    wc
}

/// Decode at most one character from `bytes`, resuming from `state`.
pub fn decode_one(bytes: &[u8], state: &mut MbState, encoding: Encoding) -> Decoded {
    if bytes.is_empty() {
        return Decoded::EndOfInput;
    }
    match encoding {
        Encoding::SingleByte => {
            state.reset();
            let b = bytes[0];
            let wc = if b < 0x80 {
                u32::from(b)
            } else {
                SINGLE_BYTE_BASE + u32::from(b)
            };
            Decoded::Char { consumed: 1, wc }
        }
        Encoding::Utf8 => decode_utf8(bytes, state),
    }
}

fn decode_utf8(bytes: &[u8], state: &mut MbState) -> Decoded {
    let mut seq = [0u8; MB_LEN_MAX];
    let mut have = state.count as usize;
    seq[..have].copy_from_slice(&state.pending[..have]);
    let mut consumed = 0;

    let need = if have == 0 {
        let lead = bytes[0];
        let Some(need) = utf8_sequence_len(lead) else {
            state.reset();
            return Decoded::Invalid;
        };
        seq[0] = lead;
        have = 1;
        consumed = 1;
        need
    } else {
        state.need as usize
    };

    while have < need {
        let Some(&b) = bytes.get(consumed) else {
            state.pending[..have].copy_from_slice(&seq[..have]);
            state.count = have as u8;
            state.need = need as u8;
            return Decoded::Incomplete { consumed };
        };
        if !valid_continuation(seq[0], have, b) {
            state.reset();
            return Decoded::Invalid;
        }
        seq[have] = b;
        have += 1;
        consumed += 1;
    }

    state.reset();
    Decoded::Char {
        consumed,
        wc: utf8_value(&seq[..need]),
    }
}

/// Encode `wc` into `out`, returning the number of bytes written.
///
/// Stateless encodings only need the state to be reset; a pending partial
/// decode is discarded.
pub fn encode_one(
    wc: u32,
    state: &mut MbState,
    encoding: Encoding,
    out: &mut [u8; MB_LEN_MAX],
) -> Result<usize, Unrepresentable> {
    state.reset();
    match encoding {
        Encoding::SingleByte => {
            if wc < 0x80 {
                out[0] = wc as u8;
                Ok(1)
            } else if (SINGLE_BYTE_BASE + 0x80..=SINGLE_BYTE_BASE + 0xFF).contains(&wc) {
                out[0] = (wc - SINGLE_BYTE_BASE) as u8;
                Ok(1)
            } else {
                Err(Unrepresentable)
            }
        }
        Encoding::Utf8 => {
            let c = char::from_u32(wc).ok_or(Unrepresentable)?;
            Ok(c.encode_utf8(out).len())
        }
    }
}
